use std::time::Duration;

use super::probes::{
    BundleStable, EventStable, InstallerIdle, LoginPage, Reachable, StatusStopped, Timeout,
    Unreachable,
};
use super::CheckSpec;
use crate::config::CheckConfig;
use crate::instance::InstanceClient;

/// Await settings plus the checker lists run for "started" and "stopped".
#[derive(Debug, Clone)]
pub struct CheckOpts {
    pub warmup: Duration,
    pub interval: Duration,
    /// Consecutive all-ok rounds required before an await completes.
    pub done_threshold: u32,
    /// Keep checking forever; used for continuous monitoring.
    pub done_never: bool,
    /// When false, an aborted await is logged and treated as success.
    pub await_strict: bool,
    pub skip: bool,
    pub started_timeout: Duration,
    pub stopped_timeout: Duration,
    pub started: Vec<CheckSpec>,
    pub stopped: Vec<CheckSpec>,
}

impl CheckOpts {
    pub fn from_config(cfg: &CheckConfig, client: &InstanceClient, service_mode: bool) -> Self {
        let reachable_timeout = Duration::from_millis(cfg.reachable_timeout_ms);
        let login_page = LoginPage::new(
            client.clone(),
            cfg.login_page_path.clone(),
            cfg.login_page_status_code,
            cfg.login_page_contained_text.clone(),
        );

        let started = if service_mode {
            vec![
                CheckSpec::mandatory(Reachable::new(client.clone(), reachable_timeout)),
                CheckSpec::optional(login_page),
            ]
        } else {
            vec![
                CheckSpec::mandatory(Reachable::new(client.clone(), reachable_timeout)),
                CheckSpec::mandatory(BundleStable::new(
                    client.clone(),
                    cfg.bundle_symbolic_names_ignored.clone(),
                )),
                CheckSpec::optional(EventStable::new(
                    client.clone(),
                    Duration::from_millis(cfg.event_max_age_ms),
                    cfg.event_topics_unstable.clone(),
                    cfg.event_details_ignored.clone(),
                )),
                CheckSpec::optional(InstallerIdle::new(client.clone())),
                CheckSpec::optional(login_page),
            ]
        };

        let stopped = vec![
            CheckSpec::mandatory(StatusStopped),
            CheckSpec::optional(Unreachable::new(client.clone(), reachable_timeout)),
        ];

        Self {
            warmup: Duration::from_millis(cfg.warmup_ms),
            interval: Duration::from_millis(cfg.interval_ms),
            done_threshold: cfg.done_threshold,
            done_never: cfg.done_never,
            await_strict: cfg.await_strict,
            skip: cfg.skip,
            started_timeout: Duration::from_secs(cfg.await_started_timeout_secs),
            stopped_timeout: Duration::from_secs(cfg.await_stopped_timeout_secs),
            started,
            stopped,
        }
    }

    /// Started checkers behind a timeout that begins counting now.
    pub fn started_checks(&self) -> Vec<CheckSpec> {
        with_timeout(self.started_timeout, &self.started)
    }

    /// Stopped checkers behind a timeout that begins counting now.
    pub fn stopped_checks(&self) -> Vec<CheckSpec> {
        with_timeout(self.stopped_timeout, &self.stopped)
    }
}

fn with_timeout(timeout: Duration, checks: &[CheckSpec]) -> Vec<CheckSpec> {
    std::iter::once(CheckSpec::optional(Timeout::new(timeout)))
        .chain(checks.iter().cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(checks: &[CheckSpec]) -> Vec<(&str, bool)> {
        checks
            .iter()
            .map(|c| (c.checker.name(), c.mandatory))
            .collect()
    }

    #[test]
    fn default_lists() {
        let client = InstanceClient::new(Duration::from_secs(1)).unwrap();
        let opts = CheckOpts::from_config(&CheckConfig::default(), &client, false);

        assert_eq!(opts.done_threshold, 3);
        assert_eq!(opts.interval, Duration::from_secs(6));
        assert_eq!(
            names(&opts.started_checks()),
            vec![
                ("timeout", false),
                ("reachable", true),
                ("bundle_stable", true),
                ("event_stable", false),
                ("installer", false),
                ("login_page", false),
            ]
        );
        assert_eq!(
            names(&opts.stopped_checks()),
            vec![("timeout", false), ("status_stopped", true), ("unreachable", false)]
        );
    }

    #[test]
    fn service_mode_checks_reachability_and_login_only() {
        let client = InstanceClient::new(Duration::from_secs(1)).unwrap();
        let opts = CheckOpts::from_config(&CheckConfig::default(), &client, true);
        assert_eq!(
            names(&opts.started),
            vec![("reachable", true), ("login_page", false)]
        );
    }
}
