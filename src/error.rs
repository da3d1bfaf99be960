//! Application error types.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

/// Fleet error carrying a kind and a small key/value payload.
#[derive(Debug)]
pub struct AppError {
    payload: HashMap<String, String>,
    kind: ErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Instance id is not configured
    InstanceNotFound,
    /// Instance id does not follow `<location>_<role>[_<classifier>]`
    InvalidInstanceId,
    /// Local instance has not been unpacked yet
    InstanceNotCreated,
    /// Local instance is already unpacked
    InstanceAlreadyCreated,
    /// Instance is currently running
    InstanceRunning,
    /// Required distribution, license or JDK file is missing
    MissingArtifact,
    /// Configuration error
    Config,
    /// File system error
    Io,
    /// Network error
    Network,
    /// External process error
    Process,
    /// Idempotency lock error
    Lock,
    /// A checker aborted the whole await
    CheckAbort,
    /// General error
    Other,
}

impl ErrorKind {
    pub fn code(&self) -> u32 {
        match self {
            Self::InstanceNotFound => 1001,
            Self::InvalidInstanceId => 1002,
            Self::InstanceNotCreated => 1003,
            Self::InstanceAlreadyCreated => 1004,
            Self::InstanceRunning => 1005,
            Self::MissingArtifact => 1006,
            Self::Config => 2001,
            Self::Io => 2002,
            Self::Network => 2003,
            Self::Process => 3001,
            Self::Lock => 3002,
            Self::CheckAbort => 4001,
            Self::Other => 9999,
        }
    }
}

impl AppError {
    pub fn new(kind: ErrorKind, payload: HashMap<String, String>) -> Self {
        Self { payload, kind }
    }

    /// Create an error with a single "detail" key from a non-empty string,
    /// or an empty payload if the string is empty.
    fn with_detail(kind: ErrorKind, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        let payload = if detail.is_empty() {
            HashMap::new()
        } else {
            HashMap::from([("detail".to_string(), detail)])
        };
        Self::new(kind, payload)
    }

    fn for_instance(kind: ErrorKind, id: &str) -> Self {
        Self::new(kind, HashMap::from([("instance".to_string(), id.to_string())]))
    }

    pub fn instance_not_found(id: &str) -> Self {
        Self::for_instance(ErrorKind::InstanceNotFound, id)
    }

    pub fn invalid_instance_id(id: &str) -> Self {
        Self::for_instance(ErrorKind::InvalidInstanceId, id)
    }

    pub fn instance_not_created(id: &str) -> Self {
        Self::for_instance(ErrorKind::InstanceNotCreated, id)
    }

    pub fn instance_already_created(id: &str) -> Self {
        Self::for_instance(ErrorKind::InstanceAlreadyCreated, id)
    }

    pub fn instance_running(id: &str) -> Self {
        Self::for_instance(ErrorKind::InstanceRunning, id)
    }

    pub fn missing_artifact(what: &str, path: &std::path::Path) -> Self {
        Self::new(
            ErrorKind::MissingArtifact,
            HashMap::from([
                ("artifact".to_string(), what.to_string()),
                ("path".to_string(), path.display().to_string()),
            ]),
        )
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::with_detail(ErrorKind::Config, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::with_detail(ErrorKind::Io, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::with_detail(ErrorKind::Network, message)
    }

    pub fn network_with_url(url: &str, detail: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::Network,
            HashMap::from([
                ("url".to_string(), url.to_string()),
                ("detail".to_string(), detail.into()),
            ]),
        )
    }

    pub fn process(message: impl Into<String>) -> Self {
        Self::with_detail(ErrorKind::Process, message)
    }

    pub fn lock(path: &std::path::Path, detail: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::Lock,
            HashMap::from([
                ("path".to_string(), path.display().to_string()),
                ("detail".to_string(), detail.into()),
            ]),
        )
    }

    pub fn check_abort(id: &str, checker: &str, message: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::CheckAbort,
            HashMap::from([
                ("instance".to_string(), id.to_string()),
                ("checker".to_string(), checker.to_string()),
                ("detail".to_string(), message.into()),
            ]),
        )
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::with_detail(ErrorKind::Other, message)
    }

    /// Attach the id of the instance the failing operation ran against.
    pub fn with_instance(mut self, id: &str) -> Self {
        self.payload
            .entry("instance".to_string())
            .or_insert_with(|| id.to_string());
        self
    }

    /// Attach an extra payload entry, replacing any previous value.
    pub fn with_payload(mut self, key: &str, value: impl Into<String>) -> Self {
        self.payload.insert(key.to_string(), value.into());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn payload(&self, key: &str) -> Option<&str> {
        self.payload.get(key).map(String::as_str)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.payload.is_empty() {
            write!(f, "{:?}", self.kind)
        } else {
            let mut pairs: Vec<String> = self
                .payload
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            pairs.sort();
            write!(f, "{:?}: {}", self.kind, pairs.join(", "))
        }
    }
}

impl std::error::Error for AppError {}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct as _;
        let mut s = serializer.serialize_struct("AppError", 2)?;
        s.serialize_field("code", &self.kind.code())?;
        s.serialize_field("payload", &self.payload)?;
        s.end()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::config(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::config(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        Self::network(err.to_string())
    }
}

impl From<zip::result::ZipError> for AppError {
    fn from(err: zip::result::ZipError) -> Self {
        Self::io(err.to_string())
    }
}

impl From<walkdir::Error> for AppError {
    fn from(err: walkdir::Error) -> Self {
        Self::io(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::config(err.to_string())
    }
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_sorts_payload_keys() {
        let err = AppError::check_abort("local_author", "timeout", "timeout after 1s");
        assert_eq!(
            err.to_string(),
            "CheckAbort: checker=timeout, detail=timeout after 1s, instance=local_author"
        );
    }

    #[test]
    fn with_instance_keeps_existing_id() {
        let err = AppError::instance_running("local_author").with_instance("other");
        assert_eq!(err.payload("instance"), Some("local_author"));

        let err = AppError::process("exit 1").with_instance("local_publish");
        assert_eq!(err.payload("instance"), Some("local_publish"));
    }

    #[test]
    fn serializes_code_and_payload() {
        let err = AppError::instance_not_created("local_author");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], 1003);
        assert_eq!(json["payload"]["instance"], "local_author");
    }
}
