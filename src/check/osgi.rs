//! Snapshots read from the OSGi web console and the Sling installer.

use serde::Deserialize;

pub(crate) const BUNDLES_PATH: &str = "/system/console/bundles.json";
pub(crate) const EVENTS_PATH: &str = "/system/console/events.json";
pub(crate) const INSTALLER_PATH: &str =
    "/system/sling/monitoring/mbeans/org/apache/sling/installer/Installer/Sling+OSGi+Installer.json";

/// Response of `/system/console/bundles.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct BundleList {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub data: Vec<Bundle>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    pub symbolic_name: String,
    pub state: String,
    #[serde(default)]
    pub fragment: bool,
}

impl Bundle {
    pub fn is_stable(&self) -> bool {
        self.fragment || self.state == "Active" || self.state == "Fragment"
    }
}

impl BundleList {
    /// Bundles that are not settled yet, skipping ignored symbolic names.
    pub fn unstable<'a>(&'a self, ignored: &'a [String]) -> impl Iterator<Item = &'a Bundle> + 'a {
        self.data.iter().filter(move |b| {
            !b.is_stable() && !ignored.iter().any(|p| glob_match(p, &b.symbolic_name))
        })
    }
}

/// Response of `/system/console/events.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct EventList {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub data: Vec<Event>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Event {
    /// Receive time in epoch milliseconds.
    pub received: i64,
    pub topic: String,
    #[serde(default)]
    pub info: String,
}

impl Event {
    fn is_ignored(&self, details_ignored: &[String]) -> bool {
        let tokens = self
            .info
            .split(|c: char| c.is_whitespace() || matches!(c, '[' | ']' | ','))
            .filter(|t| !t.is_empty());
        let mut candidates = std::iter::once(self.info.as_str()).chain(tokens);
        candidates.any(|t| details_ignored.iter().any(|p| glob_match(p, t)))
    }
}

impl EventList {
    /// Events received within `max_age_ms` of `now_ms` on an unstable topic.
    pub fn unstable<'a>(
        &'a self,
        now_ms: i64,
        max_age_ms: i64,
        topics_unstable: &'a [String],
        details_ignored: &'a [String],
    ) -> impl Iterator<Item = &'a Event> + 'a {
        self.data.iter().filter(move |e| {
            now_ms - e.received <= max_age_ms
                && topics_unstable.iter().any(|p| glob_match(p, &e.topic))
                && !e.is_ignored(details_ignored)
        })
    }
}

/// Sling OSGi installer MBean attributes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InstallerState {
    #[serde(rename = "Active", default)]
    pub active: bool,
    #[serde(rename = "ActiveResourceCount", default)]
    pub active_resource_count: u64,
}

impl InstallerState {
    pub fn is_busy(&self) -> bool {
        self.active || self.active_resource_count > 0
    }
}

/// `*`-only glob match over the whole text.
pub(crate) fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    let (first, last) = match (parts.first(), parts.last()) {
        (Some(first), Some(last)) if parts.len() > 1 => (*first, *last),
        _ => return pattern == text,
    };

    let Some(mut rest) = text.strip_prefix(first) else {
        return false;
    };
    for part in &parts[1..parts.len() - 1] {
        if part.is_empty() {
            continue;
        }
        match rest.find(part) {
            Some(index) => rest = &rest[index + part.len()..],
            None => return false,
        }
    }
    rest.ends_with(last)
}
