use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::fleet::ProcessingMode;
use crate::logging::LogFormat;

/// Load the fleet configuration. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<Arc<FleetConfig>> {
    if !path.exists() {
        return Ok(Arc::new(FleetConfig::default()));
    }
    let content = fs::read_to_string(path)
        .map_err(|e| AppError::config(format!("{}: {}", path.display(), e)))?;
    parse_config(&content).map(Arc::new)
}

pub fn parse_config(content: &str) -> Result<FleetConfig> {
    toml::from_str(content).map_err(|e| AppError::config(e.to_string()))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetConfig {
    #[serde(default)]
    pub instances: BTreeMap<String, InstanceConfig>,
    #[serde(default)]
    pub local: LocalConfig,
    #[serde(default)]
    pub check: CheckConfig,
    #[serde(default)]
    pub fleet: FleetSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceConfig {
    pub http_url: String,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default = "default_password")]
    pub password: String,
    #[serde(default)]
    pub run_modes: Vec<String>,
    #[serde(default)]
    pub jvm_opts: Vec<String>,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_true")]
    pub active: bool,
}

impl InstanceConfig {
    pub fn new(http_url: impl Into<String>) -> Self {
        Self {
            http_url: http_url.into(),
            user: default_user(),
            password: default_password(),
            run_modes: Vec::new(),
            jvm_opts: Vec::new(),
            version: default_version(),
            active: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    #[serde(default = "default_unpack_dir")]
    pub unpack_dir: PathBuf,
    #[serde(default)]
    pub java_home: Option<PathBuf>,
    #[serde(default = "default_dist_file")]
    pub dist_file: PathBuf,
    #[serde(default = "default_license_file")]
    pub license_file: PathBuf,
    /// Instances run as managed services; awaits only check reachability and login.
    #[serde(default)]
    pub service_mode: bool,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            unpack_dir: default_unpack_dir(),
            java_home: None,
            dist_file: default_dist_file(),
            license_file: default_license_file(),
            service_mode: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckConfig {
    pub warmup_ms: u64,
    pub interval_ms: u64,
    pub done_threshold: u32,
    pub done_never: bool,
    pub await_strict: bool,
    pub skip: bool,
    pub await_started_timeout_secs: u64,
    pub await_stopped_timeout_secs: u64,
    pub reachable_timeout_ms: u64,
    pub event_max_age_ms: u64,
    pub bundle_symbolic_names_ignored: Vec<String>,
    pub event_topics_unstable: Vec<String>,
    pub event_details_ignored: Vec<String>,
    pub login_page_path: String,
    pub login_page_status_code: u16,
    pub login_page_contained_text: String,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            warmup_ms: 1_000,
            interval_ms: 6_000,
            done_threshold: 3,
            done_never: false,
            await_strict: true,
            skip: false,
            await_started_timeout_secs: 30 * 60,
            await_stopped_timeout_secs: 10 * 60,
            reachable_timeout_ms: 3_000,
            event_max_age_ms: 5_000,
            bundle_symbolic_names_ignored: Vec::new(),
            event_topics_unstable: vec![
                "org/osgi/framework/ServiceEvent/*".to_string(),
                "org/osgi/framework/FrameworkEvent/*".to_string(),
                "org/osgi/framework/BundleEvent/*".to_string(),
            ],
            event_details_ignored: vec![
                "*.*MBean".to_string(),
                "org.osgi.service.component.runtime.ServiceComponentRuntime".to_string(),
                "java.util.ResourceBundle".to_string(),
            ],
            login_page_path: "/libs/granite/core/content/login.html".to_string(),
            login_page_status_code: 200,
            login_page_contained_text: "QUICKSTART_HOMEPAGE".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetSettings {
    pub processing_mode: ProcessingMode,
    pub max_workers: usize,
}

impl Default for FleetSettings {
    fn default() -> Self {
        Self {
            processing_mode: ProcessingMode::Auto,
            max_workers: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_user() -> String {
    "admin".to_string()
}

fn default_password() -> String {
    "admin".to_string()
}

fn default_version() -> String {
    "1".to_string()
}

fn default_unpack_dir() -> PathBuf {
    PathBuf::from("aem/home/instance")
}

fn default_dist_file() -> PathBuf {
    PathBuf::from("aem/home/lib/aem-sdk-quickstart.jar")
}

fn default_license_file() -> PathBuf {
    PathBuf::from("aem/home/lib/license.properties")
}
