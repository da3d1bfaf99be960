//! Fleet-wide instance operations.
//!
//! Every mutating operation returns the instances it actually changed. The
//! stability await only runs when that list is non-empty, so re-running a
//! command against an already converged fleet does no polling at all.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use super::{Dispatcher, ProcessingMode};
use crate::check::{check_until_done, CheckOpts};
use crate::config::FleetConfig;
use crate::error::{AppError, Result};
use crate::instance::{Instance, InstanceClient, Location, Role};
use crate::local::{prepare_distribution, LocalInstance, LocalOpts, Status};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Point-in-time view of one instance, as printed by `status`.
#[derive(Debug, Clone, Serialize)]
pub struct InstanceState {
    pub id: String,
    pub location: Location,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classifier: Option<String>,
    pub http_url: String,
    pub reachable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub up_to_date: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_modes: Option<String>,
}

pub struct Fleet {
    instances: Vec<Instance>,
    dispatcher: Dispatcher,
    check_opts: Arc<CheckOpts>,
    local_opts: Arc<LocalOpts>,
    client: InstanceClient,
    reachable_timeout: Duration,
}

impl Fleet {
    /// Build the fleet from configuration. Inactive instances are left out.
    pub fn from_config(config: Arc<FleetConfig>) -> Result<Self> {
        let local_opts = Arc::new(LocalOpts::from_config(&config.local));
        let instances = config
            .instances
            .iter()
            .filter(|(_, cfg)| cfg.active)
            .map(|(id, cfg)| Instance::from_config(id, cfg, &local_opts))
            .collect::<Result<Vec<_>>>()?;
        let client = InstanceClient::new(HTTP_TIMEOUT)?;
        let check_opts = CheckOpts::from_config(&config.check, &client, config.local.service_mode);

        log::debug!("Loaded fleet of {} instance(s)", instances.len());
        Ok(Self {
            instances,
            dispatcher: Dispatcher::new(config.fleet.processing_mode, config.fleet.max_workers),
            check_opts: Arc::new(check_opts),
            local_opts,
            client,
            reachable_timeout: Duration::from_millis(config.check.reachable_timeout_ms),
        })
    }

    pub fn with_processing_mode(mut self, mode: ProcessingMode) -> Self {
        self.dispatcher = Dispatcher::new(mode, self.dispatcher.max_workers);
        self
    }

    pub fn with_check_opts(mut self, check_opts: CheckOpts) -> Self {
        self.check_opts = Arc::new(check_opts);
        self
    }

    pub fn check_opts(&self) -> &CheckOpts {
        &self.check_opts
    }

    /// Select instances by id; no ids selects the whole fleet.
    pub fn instances(&self, ids: &[String]) -> Result<Vec<Instance>> {
        if ids.is_empty() {
            return Ok(self.instances.clone());
        }
        ids.iter()
            .map(|id| {
                self.instances
                    .iter()
                    .find(|i| i.id() == id)
                    .cloned()
                    .ok_or_else(|| AppError::instance_not_found(id))
            })
            .collect()
    }

    /// Extract the SDK distribution when configured with a zip.
    pub async fn prepare(&self) -> Result<bool> {
        let opts = Arc::clone(&self.local_opts);
        tokio::task::spawn_blocking(move || prepare_distribution(&opts))
            .await
            .map_err(|e| AppError::other(format!("prepare task failed: {e}")))?
    }

    /// Unpack every targeted local instance not created yet.
    pub async fn create(&self, targets: &[Instance]) -> Result<Vec<Instance>> {
        let pending: Vec<Instance> = local_targets(targets)
            .into_iter()
            .filter(|i| i.local().is_some_and(|l| !l.is_created()))
            .collect();
        if pending.is_empty() {
            log::info!("All local instances already created");
            return Ok(Vec::new());
        }

        self.local_opts.validate_artifacts()?;
        self.prepare().await?;
        self.apply(&pending, |instance| async move {
            local_of(&instance)?.create().await?;
            Ok(true)
        })
        .await
    }

    /// Start stopped local instances and restart running ones whose settings
    /// changed since their last start, then await the whole batch.
    pub async fn start(&self, targets: &[Instance]) -> Result<Vec<Instance>> {
        let locals = local_targets(targets);
        require_created(&locals)?;

        let outdated: Vec<Instance> = self
            .dispatcher
            .process(&locals, |instance| async move {
                let local = local_of(&instance)?;
                let restart = local.is_running().await && local.out_of_date();
                Ok(restart.then_some(instance))
            })
            .await?
            .into_iter()
            .flatten()
            .collect();
        if !outdated.is_empty() {
            log::info!("Restarting out-of-date instances: {}", ids(&outdated));
            self.dispatcher
                .process(&outdated, |instance| async move { local_of(&instance)?.stop().await })
                .await?;
            self.await_stopped(&outdated).await?;
        }

        let changed = self
            .apply(&locals, |instance| async move {
                let local = local_of(&instance)?;
                if local.is_running().await {
                    return Ok(false);
                }
                local.start().await?;
                Ok(true)
            })
            .await?;
        if !changed.is_empty() {
            self.await_started(targets).await?;
        }
        Ok(changed)
    }

    /// Stop running local instances and await until they are down.
    pub async fn stop(&self, targets: &[Instance]) -> Result<Vec<Instance>> {
        let changed = self
            .apply(&local_targets(targets), |instance| async move {
                let local = local_of(&instance)?;
                if !local.is_created() || !local.is_running().await {
                    return Ok(false);
                }
                local.stop().await?;
                Ok(true)
            })
            .await?;
        if !changed.is_empty() {
            self.await_stopped(&changed).await?;
        }
        Ok(changed)
    }

    pub async fn restart(&self, targets: &[Instance]) -> Result<Vec<Instance>> {
        let stopped = self.stop(targets).await?;
        let started = self.start(targets).await?;
        let mut changed = stopped;
        for instance in started {
            if !changed.iter().any(|i| i.id() == instance.id()) {
                changed.push(instance);
            }
        }
        Ok(changed)
    }

    /// Force-kill local instance processes found through their PID files.
    pub async fn kill(&self, targets: &[Instance]) -> Result<Vec<Instance>> {
        self.apply(&local_targets(targets), |instance| async move {
            local_of(&instance)?.kill()
        })
        .await
    }

    /// Remove local instance directories, including ones left without a
    /// create-lock. Fails before deleting anything if one of them is still
    /// running.
    pub async fn delete(&self, targets: &[Instance]) -> Result<Vec<Instance>> {
        let locals = local_targets(targets);
        self.dispatcher
            .process(&locals, |instance| async move {
                if local_of(&instance)?.is_running().await {
                    return Err(AppError::instance_running(instance.id()));
                }
                Ok(())
            })
            .await?;

        self.apply(&locals, |instance| async move {
            let local = local_of(&instance)?;
            if !local.is_created() && !local.dir().is_dir() {
                return Ok(false);
            }
            local.delete().await?;
            Ok(true)
        })
        .await
    }

    pub async fn status(&self, targets: &[Instance]) -> Result<Vec<InstanceState>> {
        let client = self.client.clone();
        let timeout = self.reachable_timeout;
        self.dispatcher
            .process(targets, move |instance| {
                let client = client.clone();
                async move {
                    let reachable = client
                        .get_with_timeout(&instance, "/", Some(timeout))
                        .await
                        .is_ok();
                    let mut state = InstanceState {
                        id: instance.id().to_string(),
                        location: instance.location(),
                        role: instance.role(),
                        classifier: instance.classifier().map(str::to_string),
                        http_url: instance.http_url().to_string(),
                        reachable,
                        created: None,
                        status: None,
                        up_to_date: None,
                        run_modes: None,
                    };
                    if let Some(local) = instance.local() {
                        state.created = Some(local.is_created());
                        state.status = Some(local.status().await?);
                        state.up_to_date = Some(local.up_to_date());
                        state.run_modes = Some(local.run_modes());
                    }
                    Ok(state)
                }
            })
            .await
    }

    pub async fn await_started(&self, targets: &[Instance]) -> Result<()> {
        if self.check_opts.skip {
            log::info!("Skipping await started of {}", ids(targets));
            return Ok(());
        }
        log::info!("Awaiting started: {}", ids(targets));
        check_until_done(
            &self.dispatcher,
            targets,
            &self.check_opts,
            self.check_opts.started_checks(),
        )
        .await
    }

    pub async fn await_stopped(&self, targets: &[Instance]) -> Result<()> {
        if self.check_opts.skip {
            log::info!("Skipping await stopped of {}", ids(targets));
            return Ok(());
        }
        log::info!("Awaiting stopped: {}", ids(targets));
        check_until_done(
            &self.dispatcher,
            targets,
            &self.check_opts,
            self.check_opts.stopped_checks(),
        )
        .await
    }

    /// Run a mutation reporting `changed` per instance; returns the changed ones.
    async fn apply<F, Fut>(&self, targets: &[Instance], mutation: F) -> Result<Vec<Instance>>
    where
        F: Fn(Instance) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<bool>> + Send + 'static,
    {
        let outcomes = self
            .dispatcher
            .process(targets, move |instance| {
                let pending = mutation(instance.clone());
                async move { Ok((instance, pending.await?)) }
            })
            .await?;
        Ok(outcomes
            .into_iter()
            .filter_map(|(instance, changed)| changed.then_some(instance))
            .collect())
    }
}

fn local_targets(targets: &[Instance]) -> Vec<Instance> {
    targets.iter().filter(|i| i.is_local()).cloned().collect()
}

fn local_of(instance: &Instance) -> Result<&LocalInstance> {
    instance
        .local()
        .ok_or_else(|| AppError::other(format!("{} is not a local instance", instance.id())))
}

fn require_created(locals: &[Instance]) -> Result<()> {
    for instance in locals {
        if !local_of(instance)?.is_created() {
            return Err(AppError::instance_not_created(instance.id()));
        }
    }
    Ok(())
}

fn ids(instances: &[Instance]) -> String {
    instances.iter().map(Instance::id).collect::<Vec<_>>().join(", ")
}


#[cfg(all(test, unix))]
mod scenario_tests {
    use super::*;
    use crate::check::{CheckSpec, StatusRunning, StatusStopped};
    use crate::config::{InstanceConfig, LocalConfig};
    use crate::error::ErrorKind;
    use crate::local::fixture;

    fn process_checks() -> CheckOpts {
        CheckOpts {
            warmup: Duration::ZERO,
            interval: Duration::from_millis(10),
            done_threshold: 2,
            done_never: false,
            await_strict: true,
            skip: false,
            started_timeout: Duration::from_secs(30),
            stopped_timeout: Duration::from_secs(30),
            started: vec![CheckSpec::mandatory(StatusRunning)],
            stopped: vec![CheckSpec::mandatory(StatusStopped)],
        }
    }

    fn fleet(root: &std::path::Path, run_modes: &[&str]) -> Fleet {
        let opts = fixture::local_opts(root);
        let mut cfg = FleetConfig::default();
        cfg.local = LocalConfig {
            unpack_dir: opts.unpack_dir,
            java_home: opts.java_home,
            dist_file: opts.dist_file,
            license_file: opts.license_file,
            service_mode: false,
        };
        let mut author = InstanceConfig::new("http://127.0.0.1:4502");
        author.run_modes = run_modes.iter().map(|m| m.to_string()).collect();
        cfg.instances.insert("local_author".to_string(), author);
        cfg.instances
            .insert("local_publish".to_string(), InstanceConfig::new("http://127.0.0.1:4503"));

        Fleet::from_config(Arc::new(cfg))
            .unwrap()
            .with_check_opts(process_checks())
    }

    #[tokio::test]
    async fn lifecycle_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let fleet = fleet(root.path(), &["dev"]);
        let targets = fleet.instances(&[]).unwrap();

        let err = fleet.start(&targets).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InstanceNotCreated);

        assert_eq!(fleet.create(&targets).await.unwrap().len(), 2);
        assert!(fleet.create(&targets).await.unwrap().is_empty());

        assert_eq!(fleet.start(&targets).await.unwrap().len(), 2);
        assert!(fleet.start(&targets).await.unwrap().is_empty());

        let states = fleet.status(&targets).await.unwrap();
        assert!(states
            .iter()
            .all(|s| s.status == Some(Status::Running) && s.up_to_date == Some(true)));

        let err = fleet.delete(&targets).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InstanceRunning);
        assert!(targets.iter().all(|i| i.local().is_some_and(LocalInstance::is_created)));

        assert_eq!(fleet.stop(&targets).await.unwrap().len(), 2);
        assert!(fleet.stop(&targets).await.unwrap().is_empty());

        assert_eq!(fleet.delete(&targets).await.unwrap().len(), 2);
        assert!(fleet.delete(&targets).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn start_restarts_out_of_date_instances() {
        let root = tempfile::tempdir().unwrap();
        let fleet_dev = fleet(root.path(), &["dev"]);
        let targets = fleet_dev.instances(&[]).unwrap();
        fleet_dev.create(&targets).await.unwrap();
        fleet_dev.start(&targets).await.unwrap();

        let fleet_prod = fleet(root.path(), &["prod"]);
        let targets = fleet_prod.instances(&[]).unwrap();
        let changed = fleet_prod.start(&targets).await.unwrap();
        assert_eq!(ids(&changed), "local_author");

        let author = targets[0].local().unwrap();
        assert!(author.up_to_date());
        assert_eq!(author.started_with().unwrap().run_modes, "author,prod");

        fleet_prod.stop(&targets).await.unwrap();
    }

    #[tokio::test]
    async fn parallel_create_finishes_running_unpack_after_sibling_fails() {
        let root = tempfile::tempdir().unwrap();
        let fleet = fleet(root.path(), &[]).with_processing_mode(ProcessingMode::Parallel);
        let targets = fleet.instances(&[]).unwrap();

        let java = crate::paths::java_exe_path(&root.path().join("jdk"));
        let slow = std::fs::read_to_string(&java)
            .unwrap()
            .replacen("#!/bin/sh\n", "#!/bin/sh\nsleep 1\n", 1);
        std::fs::write(&java, slow).unwrap();
        let unpack_dir = root.path().join("instance");
        std::fs::create_dir_all(&unpack_dir).unwrap();
        std::fs::write(unpack_dir.join("local_publish"), b"in the way").unwrap();

        let err = fleet.create(&targets).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(err.payload("instance"), Some("local_publish"));

        let author = targets[0].local().unwrap();
        assert_eq!(author.id(), "local_author");
        assert!(author.is_created());
        assert!(author.dir().join("crx-quickstart/bin/start").is_file());
    }

    #[tokio::test]
    async fn kill_removes_pid_and_up_lock() {
        let root = tempfile::tempdir().unwrap();
        let fleet = fleet(root.path(), &[]);
        let targets = fleet.instances(&["local_author".to_string()]).unwrap();
        fleet.create(&targets).await.unwrap();
        fleet.start(&targets).await.unwrap();

        let killed = fleet.kill(&targets).await.unwrap();
        assert_eq!(killed.len(), 1);
        let author = targets[0].local().unwrap();
        assert!(author.started_with().is_none());
        assert!(fleet.kill(&targets).await.unwrap().is_empty());
    }
}
