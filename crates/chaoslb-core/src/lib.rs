//! chaoslb-core — the desired-state topology shared by every chaoslb crate.
//!
//! A [`Topology`] is loaded once at startup (JSON first, YAML second),
//! validated, and then treated as immutable for the lifetime of the
//! process. Readers never need a lock to consult it.

pub mod config;
pub mod error;
pub mod types;

pub use config::{BackendConfig, ServiceConfig, Topology};
pub use error::{ConfigError, ConfigResult};
pub use types::*;
