//! Local instance management.
//!
//! Layout under the unpack directory:
//! - `{id}/crx-quickstart/` - unpacked quickstart, control scripts in `bin/`
//! - `{id}/lock/create.yml` - present once the instance is unpacked
//! - `{id}/lock/up.yml` - settings of the last start, removed on stop
//! - `../dist/sdk/` - extracted SDK distribution, shared by all instances

mod control;
mod instance;
mod opts;
mod sdk;

pub use instance::{LocalInstance, Status, UpLock};
pub use opts::LocalOpts;
pub use sdk::{prepare_distribution, quickstart_jar};

#[cfg(all(test, unix))]
pub(crate) use instance::fixture;
