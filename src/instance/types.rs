//! Instance identity.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::InstanceConfig;
use crate::error::{AppError, Result};
use crate::local::{LocalInstance, LocalOpts};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Location {
    Local,
    Remote,
}

impl Location {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Author,
    Publish,
}

impl Role {
    /// Name used as the role's run mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Author => "author",
            Self::Publish => "publish",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

/// One managed deployment target, rebuilt from configuration on every run.
#[derive(Debug, Clone)]
pub struct Instance {
    id: String,
    location: Location,
    role: Role,
    classifier: Option<String>,
    http_url: String,
    credentials: Credentials,
    local: Option<LocalInstance>,
}

/// Split `<location>_<role>[_<classifier>]`.
pub fn parse_instance_id(id: &str) -> Result<(Location, Role, Option<String>)> {
    let mut parts = id.splitn(3, '_');
    let location = match parts.next() {
        Some("local") => Location::Local,
        Some("remote") => Location::Remote,
        _ => return Err(AppError::invalid_instance_id(id)),
    };
    let role = match parts.next() {
        Some("author") => Role::Author,
        Some("publish") => Role::Publish,
        _ => return Err(AppError::invalid_instance_id(id)),
    };
    let classifier = match parts.next() {
        None => None,
        Some("") => return Err(AppError::invalid_instance_id(id)),
        Some(c) => Some(c.to_string()),
    };
    Ok((location, role, classifier))
}

impl Instance {
    pub fn from_config(id: &str, cfg: &InstanceConfig, local_opts: &Arc<LocalOpts>) -> Result<Self> {
        let (location, role, classifier) = parse_instance_id(id)?;
        let http_url = cfg.http_url.trim_end_matches('/').to_string();
        reqwest::Url::parse(&http_url)
            .map_err(|e| AppError::config(format!("invalid http_url of {id}: {e}")))?;

        let local = match location {
            Location::Local => Some(LocalInstance::new(id, role, &http_url, cfg, Arc::clone(local_opts))?),
            Location::Remote => None,
        };

        Ok(Self {
            id: id.to_string(),
            location,
            role,
            classifier,
            http_url,
            credentials: Credentials {
                user: cfg.user.clone(),
                password: cfg.password.clone(),
            },
            local,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn classifier(&self) -> Option<&str> {
        self.classifier.as_deref()
    }

    pub fn http_url(&self) -> &str {
        &self.http_url
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn is_local(&self) -> bool {
        self.location == Location::Local
    }

    pub fn local(&self) -> Option<&LocalInstance> {
        self.local.as_ref()
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}
