//! Polling loop that waits for a batch of instances to settle.

use std::sync::Arc;
use std::time::Instant;

use super::{CheckOpts, CheckResult, CheckSpec};
use crate::error::{AppError, ErrorKind, Result};
use crate::fleet::Dispatcher;
use crate::instance::Instance;

/// Run the checkers against one instance in order.
///
/// A failing mandatory checker ends the round for this instance. An aborting
/// checker fails the call with [`ErrorKind::CheckAbort`].
pub async fn check_one(instance: &Instance, checks: &[CheckSpec]) -> Result<Vec<CheckResult>> {
    let mut results = Vec::with_capacity(checks.len());
    for spec in checks {
        let name = spec.checker.name();
        let result = spec.checker.check(instance).await;
        if result.abort {
            return Err(AppError::check_abort(instance.id(), name, result.message));
        }
        match &result.err {
            Some(err) => log::warn!("[{}] {}: {} ({})", instance.id(), name, result.message, err),
            None if result.ok => log::debug!("[{}] {}: {}", instance.id(), name, result.message),
            None => log::info!("[{}] {}: {}", instance.id(), name, result.message),
        }

        let short_circuit = spec.mandatory && !result.ok;
        results.push(result);
        if short_circuit {
            break;
        }
    }
    Ok(results)
}

/// True when every result of every instance is ok.
pub fn check_if_done(results: &[Vec<CheckResult>]) -> bool {
    results.iter().flatten().all(|r| r.ok)
}

/// Poll until `done_threshold` consecutive rounds are fully ok.
pub async fn check_until_done(
    dispatcher: &Dispatcher,
    instances: &[Instance],
    opts: &CheckOpts,
    checks: Vec<CheckSpec>,
) -> Result<()> {
    if instances.is_empty() {
        return Ok(());
    }

    let started = Instant::now();
    let checks = Arc::new(checks);
    let threshold = opts.done_threshold.max(1);
    let mut done_times = 0u32;

    tokio::time::sleep(opts.warmup).await;
    loop {
        let round_checks = Arc::clone(&checks);
        let round = dispatcher
            .process_parallel(instances, move |instance| {
                let checks = Arc::clone(&round_checks);
                async move { check_one(&instance, &checks).await }
            })
            .await;

        let results = match round {
            Ok(results) => results,
            Err(e) if e.kind() == ErrorKind::CheckAbort => {
                let elapsed = format!("{:?}", started.elapsed());
                if opts.await_strict {
                    return Err(e.with_payload("elapsed", elapsed));
                }
                log::warn!("Await aborted after {elapsed}, continuing anyway: {e}");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        if check_if_done(&results) {
            done_times += 1;
            if !opts.done_never && done_times >= threshold {
                log::info!(
                    "Instances {} stable after {:?}",
                    ids(instances),
                    started.elapsed()
                );
                return Ok(());
            }
        } else {
            done_times = 0;
        }

        tokio::time::sleep(opts.interval).await;
    }
}

fn ids(instances: &[Instance]) -> String {
    instances.iter().map(Instance::id).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use super::*;
    use crate::check::testing::Scripted;
    use crate::config::InstanceConfig;
    use crate::fleet::ProcessingMode;
    use crate::local::LocalOpts;

    fn remote(id: &str) -> Instance {
        Instance::from_config(
            id,
            &InstanceConfig::new("http://127.0.0.1:4502"),
            &Arc::new(LocalOpts::default()),
        )
        .unwrap()
    }

    fn opts(threshold: u32) -> CheckOpts {
        CheckOpts {
            warmup: Duration::ZERO,
            interval: Duration::ZERO,
            done_threshold: threshold,
            done_never: false,
            await_strict: true,
            skip: false,
            started_timeout: Duration::from_secs(60),
            stopped_timeout: Duration::from_secs(60),
            started: Vec::new(),
            stopped: Vec::new(),
        }
    }

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(ProcessingMode::Auto, 4)
    }

    #[tokio::test]
    async fn mandatory_failure_short_circuits() {
        let second = Scripted::from_bools("second", &[true]);
        let second_calls = second.calls();
        let checks = vec![
            CheckSpec::mandatory(Scripted::from_bools("first", &[false])),
            CheckSpec::optional(second),
        ];

        let results = check_one(&remote("remote_author"), &checks).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].message, "first not ok");
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn optional_failure_continues() {
        let checks = vec![
            CheckSpec::optional(Scripted::from_bools("first", &[false])),
            CheckSpec::optional(Scripted::from_bools("second", &[true])),
        ];
        let results = check_one(&remote("remote_author"), &checks).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(!results[0].ok);
        assert!(results[1].ok);
    }

    #[tokio::test]
    async fn errors_count_as_not_ok() {
        let checks = vec![CheckSpec::mandatory(Scripted::new(
            "bundles",
            vec![CheckResult::error("cannot read bundles", "connection refused")],
        ))];
        let results = check_one(&remote("remote_author"), &checks).await.unwrap();
        assert!(!check_if_done(&[results]));
    }

    #[test]
    fn done_requires_every_result_ok() {
        let ok = CheckResult::ok("ok");
        let bad = CheckResult::not_ok("bad");
        assert!(check_if_done(&[vec![ok.clone(), ok.clone()], vec![ok.clone()]]));
        assert!(!check_if_done(&[vec![ok.clone()], vec![ok.clone(), bad]]));
        assert!(check_if_done(&[]));
    }

    /// The counter reaches two on rounds 1 and 2, before the failing round.
    #[tokio::test]
    async fn threshold_two_stops_at_first_consecutive_pair() {
        let checker = Scripted::from_bools("flaky", &[true, true, false, true, true, true]);
        let calls = checker.calls();
        check_until_done(
            &dispatcher(),
            &[remote("remote_author")],
            &opts(2),
            vec![CheckSpec::mandatory(checker)],
        )
        .await
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_round_resets_debounce() {
        let checker = Scripted::from_bools("flaky", &[true, true, false, true, true, true]);
        let calls = checker.calls();
        check_until_done(
            &dispatcher(),
            &[remote("remote_author")],
            &opts(3),
            vec![CheckSpec::mandatory(checker)],
        )
        .await
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn one_unstable_instance_holds_back_the_batch() {
        let checker = Scripted::from_bools("shared", &[true, false, true, true, true, true]);
        let calls = checker.calls();
        check_until_done(
            &dispatcher(),
            &[remote("remote_author"), remote("remote_publish")],
            &opts(1),
            vec![CheckSpec::mandatory(checker)],
        )
        .await
        .unwrap();
        // Round 1 sees ok and not ok, round 2 is fully ok.
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn abort_fails_strict_await() {
        let checks = vec![CheckSpec::optional(Scripted::new(
            "timeout",
            vec![CheckResult::abort("timeout after 1s")],
        ))];
        let err = check_until_done(&dispatcher(), &[remote("remote_author")], &opts(3), checks)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CheckAbort);
        assert_eq!(err.payload("checker"), Some("timeout"));
        assert_eq!(err.payload("instance"), Some("remote_author"));
        assert!(err.payload("elapsed").is_some());
    }

    #[tokio::test]
    async fn abort_is_tolerated_when_not_strict() {
        let checks = vec![CheckSpec::optional(Scripted::new(
            "timeout",
            vec![CheckResult::abort("timeout after 1s")],
        ))];
        let mut lenient = opts(3);
        lenient.await_strict = false;
        check_until_done(&dispatcher(), &[remote("remote_author")], &lenient, checks)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn done_never_only_ends_on_abort() {
        let checks = vec![
            CheckSpec::optional(Scripted::new(
                "timeout",
                vec![
                    CheckResult::ok("waiting"),
                    CheckResult::ok("waiting"),
                    CheckResult::ok("waiting"),
                    CheckResult::abort("timeout after 1s"),
                ],
            )),
            CheckSpec::mandatory(Scripted::from_bools("stable", &[true])),
        ];
        let mut monitor = opts(1);
        monitor.done_never = true;
        let err = check_until_done(&dispatcher(), &[remote("remote_author")], &monitor, checks)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CheckAbort);
    }
}
