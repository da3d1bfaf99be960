//! Managed instances.
//!
//! An instance is either local (a JVM process unpacked under the configured
//! unpack directory and driven through its control scripts) or remote (an
//! HTTP endpoint only). Both are reached over HTTP by the checkers.

mod http;
mod types;

pub use http::InstanceClient;
pub use types::{parse_instance_id, Credentials, Instance, Location, Role};
