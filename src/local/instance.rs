//! Lifecycle of one local instance: create, start, stop, kill, delete.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::process::Command;

use super::control::{force_kill, is_process_alive, read_pid_file, run_checked, run_script};
use super::sdk::quickstart_jar;
use super::LocalOpts;
use crate::config::InstanceConfig;
use crate::error::{AppError, Result};
use crate::instance::Role;
use crate::lock::Lock;
use crate::paths;

/// Status reported by the `status` control script through its exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Running,
    Dead,
    NotRunning,
    Unreachable,
    Error,
    Unknown,
}

impl Status {
    pub fn from_exit_code(code: i32) -> Self {
        match code {
            0 => Self::Running,
            1 => Self::Dead,
            3 => Self::NotRunning,
            4 => Self::Unreachable,
            127 => Self::Error,
            _ => Self::Unknown,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Running => 0,
            Self::Dead => 1,
            Self::NotRunning => 3,
            Self::Unreachable => 4,
            Self::Error => 127,
            Self::Unknown => -1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CreateLock {
    version: String,
    dist_file: String,
}

/// Settings an instance was last started with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpLock {
    pub version: String,
    pub http_port: u16,
    pub run_modes: String,
    pub jvm_opts: String,
}

#[derive(Debug, Clone)]
pub struct LocalInstance {
    id: String,
    dir: PathBuf,
    role: Role,
    http_port: u16,
    version: String,
    run_modes: Vec<String>,
    jvm_opts: Vec<String>,
    opts: Arc<LocalOpts>,
}

impl LocalInstance {
    pub fn new(
        id: &str,
        role: Role,
        http_url: &str,
        cfg: &InstanceConfig,
        opts: Arc<LocalOpts>,
    ) -> Result<Self> {
        let url = reqwest::Url::parse(http_url)
            .map_err(|e| AppError::config(format!("invalid http_url of {id}: {e}")))?;
        let http_port = url
            .port_or_known_default()
            .ok_or_else(|| AppError::config(format!("http_url of {id} has no port")))?;

        Ok(Self {
            id: id.to_string(),
            dir: paths::instance_dir(&opts.unpack_dir, id),
            role,
            http_port,
            version: cfg.version.clone(),
            run_modes: cfg.run_modes.clone(),
            jvm_opts: cfg.jvm_opts.clone(),
            opts,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    /// Role name plus configured run modes, deduplicated and sorted.
    pub fn run_modes(&self) -> String {
        let modes: BTreeSet<&str> = std::iter::once(self.role.as_str())
            .chain(self.run_modes.iter().map(String::as_str))
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .collect();
        modes.into_iter().collect::<Vec<_>>().join(",")
    }

    pub fn jvm_opts(&self) -> String {
        let opts: BTreeSet<&str> = self
            .jvm_opts
            .iter()
            .map(|o| o.trim())
            .filter(|o| !o.is_empty())
            .collect();
        opts.into_iter().collect::<Vec<_>>().join(" ")
    }

    fn create_lock(&self) -> Lock<CreateLock> {
        Lock::new(
            paths::create_lock_path(&self.dir),
            CreateLock {
                version: self.version.clone(),
                dist_file: self.opts.dist_file.display().to_string(),
            },
        )
    }

    fn up_lock(&self) -> Lock<UpLock> {
        Lock::new(
            paths::up_lock_path(&self.dir),
            UpLock {
                version: self.version.clone(),
                http_port: self.http_port,
                run_modes: self.run_modes(),
                jvm_opts: self.jvm_opts(),
            },
        )
    }

    fn script_env(&self) -> Vec<(&'static str, String)> {
        let mut env = vec![
            ("CQ_PORT", self.http_port.to_string()),
            ("CQ_RUNMODE", self.run_modes()),
            ("CQ_JVM_OPTS", self.jvm_opts()),
        ];
        if let Some(home) = &self.opts.java_home {
            env.push(("JAVA_HOME", home.display().to_string()));
        }
        env
    }

    pub fn is_created(&self) -> bool {
        self.create_lock().is_locked()
    }

    /// Unpack the quickstart into the instance directory. Any failure after
    /// the directory is made removes it again.
    pub async fn create(&self) -> Result<()> {
        if self.is_created() {
            return Err(AppError::instance_already_created(&self.id));
        }
        let jar = quickstart_jar(&self.opts)?;
        fs::create_dir_all(&self.dir)
            .map_err(|e| AppError::io(format!("Failed to create instance dir: {}", e)))
            .map_err(|e| e.with_instance(&self.id))?;

        log::info!("Creating instance {} in {}", self.id, self.dir.display());
        if let Err(e) = self.unpack(&jar).await {
            if let Err(clean_err) = fs::remove_dir_all(&self.dir) {
                log::warn!(
                    "Failed to clean up half-created instance {}: {}",
                    self.id,
                    clean_err
                );
            }
            return Err(e.with_instance(&self.id));
        }
        log::info!("Created instance {}", self.id);
        Ok(())
    }

    async fn unpack(&self, jar: &Path) -> Result<()> {
        let mut cmd = Command::new(self.opts.java_exe());
        cmd.arg("-jar")
            .arg(jar)
            .arg("-unpack")
            .current_dir(&self.dir)
            .stdin(std::process::Stdio::null());
        if let Some(home) = &self.opts.java_home {
            cmd.env("JAVA_HOME", home);
        }
        run_checked(&mut cmd, "quickstart unpack").await?;

        fs::copy(&self.opts.license_file, self.dir.join("license.properties"))
            .map_err(|e| AppError::io(format!("Failed to copy license file: {}", e)))?;
        self.create_lock().lock()
    }

    pub async fn start(&self) -> Result<()> {
        if !self.is_created() {
            return Err(AppError::instance_not_created(&self.id));
        }
        log::info!(
            "Starting instance {} (port: {}, run modes: {})",
            self.id,
            self.http_port,
            self.run_modes()
        );
        self.run_control("start").await?;
        self.up_lock().lock()
    }

    pub async fn stop(&self) -> Result<()> {
        if !self.is_created() {
            return Err(AppError::instance_not_created(&self.id));
        }
        log::info!("Stopping instance {}", self.id);
        self.run_control("stop").await?;
        self.up_lock().unlock()
    }

    async fn run_control(&self, name: &str) -> Result<()> {
        let script = paths::control_script_path(&self.dir, name);
        let status = run_script(&script, &self.dir, &self.script_env())
            .await
            .map_err(|e| e.with_instance(&self.id))?;
        if status.success() {
            Ok(())
        } else {
            Err(AppError::process(format!("{} script failed ({})", name, status))
                .with_instance(&self.id))
        }
    }

    /// Status according to the `status` control script's exit code.
    pub async fn status(&self) -> Result<Status> {
        if !self.is_created() {
            return Ok(Status::Unknown);
        }
        let script = paths::control_script_path(&self.dir, "status");
        let status = run_script(&script, &self.dir, &self.script_env())
            .await
            .map_err(|e| e.with_instance(&self.id))?;
        Ok(status
            .code()
            .map(Status::from_exit_code)
            .unwrap_or(Status::Unknown))
    }

    pub async fn is_running(&self) -> bool {
        match self.status().await {
            Ok(status) => status == Status::Running,
            Err(e) => {
                log::debug!("Cannot read status of instance {}: {}", self.id, e);
                false
            }
        }
    }

    /// Force-kill the process recorded in the PID file. Returns false when
    /// there is no PID file to act on.
    pub fn kill(&self) -> Result<bool> {
        let pid_file = paths::pid_file_path(&self.dir);
        let Some(pid) = read_pid_file(&pid_file).map_err(|e| e.with_instance(&self.id))? else {
            return Ok(false);
        };
        log::info!("Killing instance {} (pid: {})", self.id, pid);
        if let Err(e) = force_kill(pid) {
            if is_process_alive(pid) {
                return Err(e.with_instance(&self.id));
            }
            log::debug!("Instance {} pid {} already gone", self.id, pid);
        }
        if let Err(e) = fs::remove_file(&pid_file) {
            log::warn!("Failed to remove PID file of instance {}: {}", self.id, e);
        }
        self.up_lock().unlock()?;
        Ok(true)
    }

    pub async fn delete(&self) -> Result<()> {
        if self.is_running().await {
            return Err(AppError::instance_running(&self.id));
        }
        log::info!("Deleting instance {}", self.id);
        fs::remove_dir_all(&self.dir)
            .map_err(|e| AppError::io(format!("Failed to delete instance dir: {}", e)))
            .map_err(|e| e.with_instance(&self.id))
    }

    /// True when the running settings differ from the last start, or the
    /// up-lock is missing or unreadable.
    pub fn out_of_date(&self) -> bool {
        match self.up_lock().is_up_to_date() {
            Ok(up_to_date) => !up_to_date,
            Err(e) => {
                log::warn!("Cannot read up-lock of instance {}: {}", self.id, e);
                true
            }
        }
    }

    pub fn up_to_date(&self) -> bool {
        !self.out_of_date()
    }

    /// Settings recorded at the last start, if any.
    pub fn started_with(&self) -> Option<UpLock> {
        let lock = self.up_lock();
        if lock.is_locked() {
            lock.data_locked().ok()
        } else {
            None
        }
    }
}



#[cfg(all(test, unix))]
mod script_tests {
    use super::fixture::local_opts;
    use super::*;

    fn author(opts: &Arc<LocalOpts>, run_modes: &[&str]) -> LocalInstance {
        let mut cfg = InstanceConfig::new("http://127.0.0.1:4502");
        cfg.run_modes = run_modes.iter().map(|m| m.to_string()).collect();
        LocalInstance::new("local_author", Role::Author, &cfg.http_url, &cfg, Arc::clone(opts))
            .unwrap()
    }

    #[tokio::test]
    async fn create_start_stop_delete() {
        let root = tempfile::tempdir().unwrap();
        let opts = Arc::new(local_opts(root.path()));
        let local = author(&opts, &["dev"]);

        local.create().await.unwrap();
        assert!(local.is_created());
        assert!(local.dir().join("license.properties").is_file());
        assert_eq!(
            local.create().await.unwrap_err().kind(),
            crate::ErrorKind::InstanceAlreadyCreated
        );
        assert_eq!(local.status().await.unwrap(), Status::NotRunning);

        local.start().await.unwrap();
        assert!(local.is_running().await);
        assert!(local.up_to_date());
        let env = fs::read_to_string(local.dir().join("started.env")).unwrap();
        assert_eq!(env.trim(), "4502|author,dev|");

        assert_eq!(
            local.delete().await.unwrap_err().kind(),
            crate::ErrorKind::InstanceRunning
        );

        let reconfigured = author(&opts, &["prod"]);
        assert!(reconfigured.out_of_date());
        reconfigured.stop().await.unwrap();
        assert!(!reconfigured.is_running().await);
        reconfigured.start().await.unwrap();
        assert!(!reconfigured.out_of_date());

        reconfigured.stop().await.unwrap();
        assert!(reconfigured.started_with().is_none());
        reconfigured.delete().await.unwrap();
        assert!(!reconfigured.dir().exists());
    }

    #[tokio::test]
    async fn failed_license_copy_leaves_no_directory() {
        let root = tempfile::tempdir().unwrap();
        let mut opts = local_opts(root.path());
        let license_dir = root.path().join("license-as-dir");
        fs::create_dir_all(&license_dir).unwrap();
        opts.license_file = license_dir;
        let local = author(&Arc::new(opts), &[]);

        let err = local.create().await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Io);
        assert_eq!(err.payload("instance"), Some("local_author"));
        assert!(!local.dir().exists());
        assert!(!local.is_created());
    }

    #[tokio::test]
    async fn failed_unpack_leaves_no_directory() {
        let root = tempfile::tempdir().unwrap();
        let mut opts = local_opts(root.path());
        opts.java_home = Some(root.path().join("missing-jdk"));
        let local = author(&Arc::new(opts), &[]);

        let err = local.create().await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Process);
        assert!(!local.dir().exists());
        assert!(!local.is_created());
    }
}
