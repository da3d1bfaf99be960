//! Lifecycle and stability-check engine for fleets of AEM instances.
//!
//! A [`Fleet`] is built from configuration, targets a subset of its
//! instances, and runs change-tracking operations on them through a
//! [`Dispatcher`]. Operations that changed anything wait for the batch to
//! settle using the checkers in [`check`].

mod archive;
pub mod check;
pub mod config;
pub mod error;
pub mod fleet;
pub mod instance;
pub mod local;
pub mod lock;
pub mod logging;
pub mod paths;

#[cfg(test)]
mod test_support;

pub use config::{load_config, FleetConfig};
pub use error::{AppError, ErrorKind, Result};
pub use fleet::{Dispatcher, Fleet, InstanceState, ProcessingMode};
pub use instance::Instance;
