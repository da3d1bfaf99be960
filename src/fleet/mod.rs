//! Fleet-wide operations and the per-instance work dispatcher.

mod manager;

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::error::{AppError, Result};
use crate::instance::Instance;

pub use manager::{Fleet, InstanceState};

/// How per-instance work of one operation is scheduled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingMode {
    /// Parallel unless more than one local instance is targeted.
    #[default]
    Auto,
    Parallel,
    Serial,
}

#[derive(Debug, Clone)]
pub struct Dispatcher {
    mode: ProcessingMode,
    max_workers: usize,
}

impl Dispatcher {
    pub fn new(mode: ProcessingMode, max_workers: usize) -> Self {
        Self {
            mode,
            max_workers: max_workers.max(1),
        }
    }

    /// Resolve `Auto` against the targeted instances.
    pub fn resolve_mode(&self, instances: &[Instance]) -> ProcessingMode {
        match self.mode {
            ProcessingMode::Auto => {
                let locals = instances.iter().filter(|i| i.is_local()).count();
                if locals <= 1 {
                    ProcessingMode::Parallel
                } else {
                    ProcessingMode::Serial
                }
            }
            mode => mode,
        }
    }

    /// Run `f` for every instance in the resolved mode. Results keep input order.
    pub async fn process<F, Fut, R>(&self, instances: &[Instance], f: F) -> Result<Vec<R>>
    where
        F: Fn(Instance) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
        R: Send + 'static,
    {
        match self.resolve_mode(instances) {
            ProcessingMode::Serial => self.process_serial(instances, f).await,
            _ => self.process_parallel(instances, f).await,
        }
    }

    /// One instance after another; the first error skips the rest.
    pub async fn process_serial<F, Fut, R>(&self, instances: &[Instance], f: F) -> Result<Vec<R>>
    where
        F: Fn(Instance) -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        let mut results = Vec::with_capacity(instances.len());
        for instance in instances {
            let id = instance.id().to_string();
            let result = f(instance.clone()).await.map_err(|e| e.with_instance(&id))?;
            results.push(result);
        }
        Ok(results)
    }

    /// Up to `max_workers` instances at a time. After the first error no new
    /// unit starts; units already running are awaited before that error is
    /// returned, so no mutation is left half done in the background.
    pub async fn process_parallel<F, Fut, R>(&self, instances: &[Instance], f: F) -> Result<Vec<R>>
    where
        F: Fn(Instance) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
        R: Send + 'static,
    {
        let f = Arc::new(f);
        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let mut tasks = JoinSet::new();

        for (index, instance) in instances.iter().cloned().enumerate() {
            let f = Arc::clone(&f);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                // A closed pool means a sibling failed; skip without starting.
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return Ok(None);
                };
                let id = instance.id().to_string();
                let result = f(instance).await.map_err(|e| e.with_instance(&id))?;
                Ok::<_, AppError>(Some((index, result)))
            });
        }

        let mut slots: Vec<Option<R>> = std::iter::repeat_with(|| None).take(instances.len()).collect();
        let mut first_err = None;
        while let Some(joined) = tasks.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => Err(AppError::other(format!("worker task failed: {e}"))),
            };
            match outcome {
                Ok(Some((index, result))) => slots[index] = Some(result),
                Ok(None) => {}
                Err(e) => {
                    if first_err.is_none() {
                        semaphore.close();
                        first_err = Some(e);
                    } else {
                        log::debug!("Suppressed further error: {e}");
                    }
                }
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(slots.into_iter().flatten().collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::config::InstanceConfig;
    use crate::error::ErrorKind;
    use crate::local::LocalOpts;

    fn fleet(ids: &[&str]) -> Vec<Instance> {
        let opts = Arc::new(LocalOpts::default());
        ids.iter()
            .enumerate()
            .map(|(n, id)| {
                let cfg = InstanceConfig::new(format!("http://127.0.0.1:{}", 4502 + n));
                Instance::from_config(id, &cfg, &opts).unwrap()
            })
            .collect()
    }

    #[test]
    fn auto_mode_depends_on_local_count() {
        let dispatcher = Dispatcher::new(ProcessingMode::Auto, 8);
        assert_eq!(
            dispatcher.resolve_mode(&fleet(&["local_author", "remote_author_1", "remote_publish_2"])),
            ProcessingMode::Parallel
        );
        assert_eq!(
            dispatcher.resolve_mode(&fleet(&["local_author", "local_publish"])),
            ProcessingMode::Serial
        );
        assert_eq!(dispatcher.resolve_mode(&[]), ProcessingMode::Parallel);

        let forced = Dispatcher::new(ProcessingMode::Parallel, 8);
        assert_eq!(
            forced.resolve_mode(&fleet(&["local_author", "local_publish"])),
            ProcessingMode::Parallel
        );
    }

    #[tokio::test]
    async fn serial_stops_at_first_error() {
        let instances = fleet(&["local_author", "local_publish", "remote_author"]);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let err = Dispatcher::new(ProcessingMode::Serial, 8)
            .process(&instances, move |instance| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    if instance.id() == "local_publish" {
                        Err(AppError::process("exit status 1"))
                    } else {
                        Ok(instance.id().to_string())
                    }
                }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(err.kind(), ErrorKind::Process);
        assert_eq!(err.payload("instance"), Some("local_publish"));
    }

    #[tokio::test]
    async fn parallel_keeps_input_order() {
        let instances = fleet(&["remote_author", "remote_publish", "remote_publish_preview"]);
        let ids = Dispatcher::new(ProcessingMode::Parallel, 2)
            .process(&instances, |instance| async move {
                let delay = if instance.id() == "remote_author" { 30 } else { 1 };
                tokio::time::sleep(Duration::from_millis(delay)).await;
                Ok(instance.id().to_string())
            })
            .await
            .unwrap();
        assert_eq!(ids, vec!["remote_author", "remote_publish", "remote_publish_preview"]);
    }

    #[tokio::test]
    async fn parallel_error_skips_pending_units_and_drains_running_ones() {
        let instances = fleet(&["remote_author", "remote_publish", "remote_publish_preview"]);
        let started = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));
        let (started_counter, finished_counter) = (Arc::clone(&started), Arc::clone(&finished));
        let err = Dispatcher::new(ProcessingMode::Parallel, 1)
            .process(&instances, move |instance| {
                let started = Arc::clone(&started_counter);
                let finished = Arc::clone(&finished_counter);
                async move {
                    started.fetch_add(1, Ordering::SeqCst);
                    if instance.id() == "remote_author" {
                        return Err(AppError::network("connection refused"));
                    }
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    finished.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Network);
        assert_eq!(err.payload("instance"), Some("remote_author"));
        // The unit already running completes before the error is returned;
        // the one still waiting for a worker never starts.
        assert_eq!(started.load(Ordering::SeqCst), 2);
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }
}
