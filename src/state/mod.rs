// ABOUTME: Persisted deployment state: the live-color record and history log.
// ABOUTME: Both live under the state directory and are only replaced atomically or appended.

mod history;
mod store;

pub use history::{DeploymentRecord, HistoryLog, Outcome};
pub use store::{DeploymentStateRecord, Reconciliation, StateStore};

use std::path::PathBuf;
use thiserror::Error;

/// Errors reading or writing persisted state.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("state file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to encode state: {0}")]
    Encode(#[from] serde_json::Error),
}
