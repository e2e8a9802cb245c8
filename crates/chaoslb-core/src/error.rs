//! Topology loading and validation errors.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for topology operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config (JSON/YAML): json: {json}; yaml: {yaml}")]
    Parse { json: String, yaml: String },

    #[error("invalid service {service}: {reason}")]
    InvalidService { service: String, reason: String },

    #[error("invalid metrics port: {0}")]
    InvalidMetricsPort(u16),
}
