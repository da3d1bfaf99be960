//! Built-in checkers.

use std::time::{Duration, Instant};

use futures_util::future::BoxFuture;
use futures_util::FutureExt as _;

use super::osgi::{BundleList, EventList, InstallerState, BUNDLES_PATH, EVENTS_PATH, INSTALLER_PATH};
use super::{CheckResult, Checker};
use crate::instance::{Instance, InstanceClient};
use crate::local::Status;

/// How many offending names a not-ok message lists.
const MESSAGE_SAMPLE: usize = 5;

fn sample<'a>(names: impl Iterator<Item = &'a str>) -> String {
    names.take(MESSAGE_SAMPLE).collect::<Vec<_>>().join(", ")
}

/// Aborts the await once its duration has elapsed since creation.
#[derive(Debug, Clone)]
pub struct Timeout {
    started: Instant,
    duration: Duration,
}

impl Timeout {
    pub fn new(duration: Duration) -> Self {
        Self {
            started: Instant::now(),
            duration,
        }
    }
}

impl Checker for Timeout {
    fn name(&self) -> &str {
        "timeout"
    }

    fn check<'a>(&'a self, _instance: &'a Instance) -> BoxFuture<'a, CheckResult> {
        let elapsed = self.started.elapsed();
        let result = if elapsed >= self.duration {
            CheckResult::abort(format!("timeout after {:?}", self.duration))
        } else {
            CheckResult::ok("timeout not reached")
        };
        async move { result }.boxed()
    }
}

#[derive(Debug, Clone)]
pub struct Reachable {
    client: InstanceClient,
    timeout: Duration,
}

impl Reachable {
    pub fn new(client: InstanceClient, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

impl Checker for Reachable {
    fn name(&self) -> &str {
        "reachable"
    }

    fn check<'a>(&'a self, instance: &'a Instance) -> BoxFuture<'a, CheckResult> {
        async move {
            match self
                .client
                .get_with_timeout(instance, "/", Some(self.timeout))
                .await
            {
                Ok(_) => CheckResult::ok("reachable"),
                Err(_) => CheckResult::not_ok("not reachable"),
            }
        }
        .boxed()
    }
}

#[derive(Debug, Clone)]
pub struct Unreachable {
    client: InstanceClient,
    timeout: Duration,
}

impl Unreachable {
    pub fn new(client: InstanceClient, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

impl Checker for Unreachable {
    fn name(&self) -> &str {
        "unreachable"
    }

    fn check<'a>(&'a self, instance: &'a Instance) -> BoxFuture<'a, CheckResult> {
        async move {
            match self
                .client
                .get_with_timeout(instance, "/", Some(self.timeout))
                .await
            {
                Ok(_) => CheckResult::not_ok("still reachable"),
                Err(_) => CheckResult::ok("unreachable"),
            }
        }
        .boxed()
    }
}

#[derive(Debug, Clone)]
pub struct BundleStable {
    client: InstanceClient,
    symbolic_names_ignored: Vec<String>,
}

impl BundleStable {
    pub fn new(client: InstanceClient, symbolic_names_ignored: Vec<String>) -> Self {
        Self {
            client,
            symbolic_names_ignored,
        }
    }
}

impl Checker for BundleStable {
    fn name(&self) -> &str {
        "bundle_stable"
    }

    fn check<'a>(&'a self, instance: &'a Instance) -> BoxFuture<'a, CheckResult> {
        async move {
            let list: BundleList = match self.client.get_json(instance, BUNDLES_PATH).await {
                Ok(list) => list,
                Err(e) => return CheckResult::error("cannot read bundles", e),
            };
            let unstable: Vec<&str> = list
                .unstable(&self.symbolic_names_ignored)
                .map(|b| b.symbolic_name.as_str())
                .collect();
            let total = list.data.len();
            if unstable.is_empty() {
                CheckResult::ok(format!("all bundles stable ({total})"))
            } else {
                CheckResult::not_ok(format!(
                    "bundles stable ({}/{}) | unstable: {}",
                    total - unstable.len(),
                    total,
                    sample(unstable.iter().copied())
                ))
            }
        }
        .boxed()
    }
}

#[derive(Debug, Clone)]
pub struct EventStable {
    client: InstanceClient,
    max_age: Duration,
    topics_unstable: Vec<String>,
    details_ignored: Vec<String>,
}

impl EventStable {
    pub fn new(
        client: InstanceClient,
        max_age: Duration,
        topics_unstable: Vec<String>,
        details_ignored: Vec<String>,
    ) -> Self {
        Self {
            client,
            max_age,
            topics_unstable,
            details_ignored,
        }
    }
}

impl Checker for EventStable {
    fn name(&self) -> &str {
        "event_stable"
    }

    fn check<'a>(&'a self, instance: &'a Instance) -> BoxFuture<'a, CheckResult> {
        async move {
            let list: EventList = match self.client.get_json(instance, EVENTS_PATH).await {
                Ok(list) => list,
                Err(e) => return CheckResult::error("cannot read events", e),
            };
            let now_ms = chrono::Utc::now().timestamp_millis();
            let max_age_ms = i64::try_from(self.max_age.as_millis()).unwrap_or(i64::MAX);
            let unstable: Vec<&str> = list
                .unstable(now_ms, max_age_ms, &self.topics_unstable, &self.details_ignored)
                .map(|e| e.topic.as_str())
                .collect();
            if unstable.is_empty() {
                CheckResult::ok("no unstable events")
            } else {
                CheckResult::not_ok(format!(
                    "unstable events ({}) | topics: {}",
                    unstable.len(),
                    sample(unstable.iter().copied())
                ))
            }
        }
        .boxed()
    }
}

#[derive(Debug, Clone)]
pub struct InstallerIdle {
    client: InstanceClient,
}

impl InstallerIdle {
    pub fn new(client: InstanceClient) -> Self {
        Self { client }
    }
}

impl Checker for InstallerIdle {
    fn name(&self) -> &str {
        "installer"
    }

    fn check<'a>(&'a self, instance: &'a Instance) -> BoxFuture<'a, CheckResult> {
        async move {
            let state: InstallerState = match self.client.get_json(instance, INSTALLER_PATH).await {
                Ok(state) => state,
                Err(e) => return CheckResult::error("cannot read installer state", e),
            };
            if state.is_busy() {
                CheckResult::not_ok(format!(
                    "installer is busy (active resources: {})",
                    state.active_resource_count
                ))
            } else {
                CheckResult::ok("installer is idle")
            }
        }
        .boxed()
    }
}

#[derive(Debug, Clone)]
pub struct LoginPage {
    client: InstanceClient,
    path: String,
    status_code: u16,
    contained_text: String,
}

impl LoginPage {
    pub fn new(
        client: InstanceClient,
        path: impl Into<String>,
        status_code: u16,
        contained_text: impl Into<String>,
    ) -> Self {
        Self {
            client,
            path: path.into(),
            status_code,
            contained_text: contained_text.into(),
        }
    }
}

impl Checker for LoginPage {
    fn name(&self) -> &str {
        "login_page"
    }

    fn check<'a>(&'a self, instance: &'a Instance) -> BoxFuture<'a, CheckResult> {
        async move {
            let resp = match self.client.get(instance, &self.path).await {
                Ok(resp) => resp,
                Err(e) => return CheckResult::error("login page not reachable", e),
            };
            let status = resp.status().as_u16();
            if status != self.status_code {
                return CheckResult::not_ok(format!("login page returned status {status}"));
            }
            match resp.text().await {
                Ok(body) if body.contains(&self.contained_text) => CheckResult::ok("login page ready"),
                Ok(_) => CheckResult::not_ok("login page not ready"),
                Err(e) => CheckResult::error("cannot read login page", e),
            }
        }
        .boxed()
    }
}

/// Local instances must report a non-running status; remote ones always pass.
#[derive(Debug, Clone, Default)]
pub struct StatusStopped;

impl Checker for StatusStopped {
    fn name(&self) -> &str {
        "status_stopped"
    }

    fn check<'a>(&'a self, instance: &'a Instance) -> BoxFuture<'a, CheckResult> {
        async move {
            let Some(local) = instance.local() else {
                return CheckResult::ok("remote instance");
            };
            match local.status().await {
                Ok(Status::Running) => CheckResult::not_ok("still running"),
                Ok(status) => CheckResult::ok(format!("status {status:?}")),
                Err(e) => CheckResult::error("cannot read status", e),
            }
        }
        .boxed()
    }
}

/// Local instances must report a running status; remote ones always pass.
#[derive(Debug, Clone, Default)]
pub struct StatusRunning;

impl Checker for StatusRunning {
    fn name(&self) -> &str {
        "status_running"
    }

    fn check<'a>(&'a self, instance: &'a Instance) -> BoxFuture<'a, CheckResult> {
        async move {
            let Some(local) = instance.local() else {
                return CheckResult::ok("remote instance");
            };
            match local.status().await {
                Ok(Status::Running) => CheckResult::ok("running"),
                Ok(status) => CheckResult::not_ok(format!("status {status:?}")),
                Err(e) => CheckResult::error("cannot read status", e),
            }
        }
        .boxed()
    }
}
