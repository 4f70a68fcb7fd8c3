// ABOUTME: Application-wide error types for bascule.
// ABOUTME: Uses thiserror for ergonomic error handling.

use std::path::PathBuf;
use thiserror::Error;

use crate::deploy::DeployError;
use crate::health::HealthError;
use crate::notify::NotifyError;
use crate::state::StateError;
use crate::topology::TopologyError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid value {value:?} for {var}: {reason}")]
    InvalidOverride {
        var: String,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error(transparent)]
    Deploy(#[from] DeployError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Health(#[from] HealthError),

    #[error(transparent)]
    Notify(#[from] NotifyError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
