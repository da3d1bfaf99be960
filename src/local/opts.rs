use std::path::{Path, PathBuf};

use crate::config::LocalConfig;
use crate::error::{AppError, Result};
use crate::paths;

/// Settings shared by every local instance of one invocation.
#[derive(Debug, Clone)]
pub struct LocalOpts {
    pub unpack_dir: PathBuf,
    pub java_home: Option<PathBuf>,
    pub dist_file: PathBuf,
    pub license_file: PathBuf,
    pub service_mode: bool,
}

impl Default for LocalOpts {
    fn default() -> Self {
        Self::from_config(&LocalConfig::default())
    }
}

impl LocalOpts {
    pub fn from_config(cfg: &LocalConfig) -> Self {
        Self {
            unpack_dir: cfg.unpack_dir.clone(),
            java_home: cfg.java_home.clone(),
            dist_file: cfg.dist_file.clone(),
            license_file: cfg.license_file.clone(),
            service_mode: cfg.service_mode,
        }
    }

    /// Java executable from `java_home`, or plain `java` resolved through `PATH`.
    pub fn java_exe(&self) -> PathBuf {
        match &self.java_home {
            Some(home) => paths::java_exe_path(home),
            None => PathBuf::from("java"),
        }
    }

    pub fn is_sdk(&self) -> bool {
        self.dist_file
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("zip"))
            .unwrap_or(false)
    }

    /// Check every file a create needs. Runs before any instance is touched.
    pub fn validate_artifacts(&self) -> Result<()> {
        require_file("distribution", &self.dist_file)?;
        require_file("license", &self.license_file)?;
        if let Some(home) = &self.java_home {
            require_file("java", &paths::java_exe_path(home))?;
        }
        Ok(())
    }
}

fn require_file(what: &str, path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(AppError::missing_artifact(what, path))
    }
}
