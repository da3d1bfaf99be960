//! Log subscriber setup for the binary.
//!
//! Library code logs through the `log` facade; the fmt subscriber installed
//! here bridges those records, so nothing else needs to know about it.

use serde::{Deserialize, Serialize};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer as _, SubscriberExt as _};
use tracing_subscriber::util::SubscriberInitExt as _;

use crate::config::LoggingConfig;

const LOG_ENV: &str = "AEMFLEET_LOG";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Install the global subscriber.
///
/// `AEMFLEET_LOG` wins over `RUST_LOG`, which wins over the configured level.
/// Calling this twice is harmless; the second install is ignored.
pub fn init_logging(config: &LoggingConfig) {
    let filter = resolve_filter(
        std::env::var(LOG_ENV).ok(),
        std::env::var("RUST_LOG").ok(),
        &config.level,
    );

    let layer = match config.format {
        LogFormat::Pretty => fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .with_target(true)
            .json()
            .with_writer(std::io::stderr)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()
        .ok();
}

fn resolve_filter(custom: Option<String>, standard: Option<String>, level: &str) -> EnvFilter {
    let fallback = || EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    match custom.or(standard) {
        Some(directive) => EnvFilter::try_new(&directive).unwrap_or_else(|err| {
            eprintln!("invalid log directive {directive:?} ({err}); using {level}");
            fallback()
        }),
        None => fallback(),
    }
}
