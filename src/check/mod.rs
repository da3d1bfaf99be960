//! Stability checks.
//!
//! A [`Checker`] probes one instance and reports a [`CheckResult`]. Checkers
//! are wrapped in a [`CheckSpec`] that marks them mandatory or not; the engine
//! stops evaluating an instance's list at the first failing mandatory check.

mod engine;
mod opts;
mod osgi;
mod probes;

use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::instance::Instance;

pub use engine::{check_if_done, check_one, check_until_done};
pub use opts::CheckOpts;
pub use osgi::{Bundle, BundleList, Event, EventList, InstallerState};
pub use probes::{
    BundleStable, EventStable, InstallerIdle, LoginPage, Reachable, StatusRunning, StatusStopped,
    Timeout, Unreachable,
};

/// Outcome of one checker against one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub ok: bool,
    pub message: String,
    /// Halts the whole await for every instance, not just this one.
    pub abort: bool,
    pub err: Option<String>,
}

impl CheckResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
            abort: false,
            err: None,
        }
    }

    pub fn not_ok(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
            abort: false,
            err: None,
        }
    }

    pub fn abort(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
            abort: true,
            err: None,
        }
    }

    pub fn error(message: impl Into<String>, err: impl fmt::Display) -> Self {
        Self {
            ok: false,
            message: message.into(),
            abort: false,
            err: Some(err.to_string()),
        }
    }
}

pub trait Checker: Send + Sync {
    fn name(&self) -> &str;

    fn check<'a>(&'a self, instance: &'a Instance) -> BoxFuture<'a, CheckResult>;
}

/// A checker tagged with whether later checks depend on it.
#[derive(Clone)]
pub struct CheckSpec {
    pub checker: Arc<dyn Checker>,
    pub mandatory: bool,
}

impl CheckSpec {
    pub fn mandatory(checker: impl Checker + 'static) -> Self {
        Self {
            checker: Arc::new(checker),
            mandatory: true,
        }
    }

    pub fn optional(checker: impl Checker + 'static) -> Self {
        Self {
            checker: Arc::new(checker),
            mandatory: false,
        }
    }
}

impl fmt::Debug for CheckSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckSpec")
            .field("checker", &self.checker.name())
            .field("mandatory", &self.mandatory)
            .finish()
    }
}
