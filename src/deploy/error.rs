// ABOUTME: Error types for deployment operations.
// ABOUTME: Covers locking, compose, topology, state, health and hook failures.

use chrono::{DateTime, Utc};
use std::path::PathBuf;

use crate::health::HealthError;
use crate::router::RouterError;
use crate::runtime::ComposeError;
use crate::state::StateError;
use crate::topology::TopologyError;

/// Who holds a deploy lock, as reported to a second caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHolderInfo {
    pub holder: String,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
}

/// Errors that can occur while preparing or running a deployment cycle.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// Another process holds the deploy lock.
    #[error(
        "deployment in progress: lock held by {} (pid {}) since {}",
        .0.holder,
        .0.pid,
        .0.started_at
    )]
    LockHeld(LockHolderInfo),

    /// A lock file exists but holds no readable holder info and is too
    /// recent to be abandoned.
    #[error(
        "deployment in progress: lock {} has no readable holder; use --force once no cycle is running",
        .0.display()
    )]
    LockUnreadable(PathBuf),

    /// Lock file could not be created, read or removed.
    #[error("deploy lock error: {0}")]
    Lock(String),

    /// A compose command failed.
    #[error("container runtime error: {0}")]
    Runtime(#[from] ComposeError),

    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Health(#[from] HealthError),

    #[error(transparent)]
    Router(#[from] RouterError),

    /// Persisted state and the runtime disagree and nothing safe can be inferred.
    #[error("inconsistent environment: {0}")]
    Inconsistent(String),

    /// The requested operation needs a live color and there is none.
    #[error("no color is live yet; run deploy first")]
    NothingLive,

    /// Manual rollback with no recorded previous color.
    #[error("no previous color recorded to roll back to")]
    NoPreviousColor,
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployErrorKind {
    LockHeld,
    Lock,
    Runtime,
    Topology,
    State,
    Health,
    Router,
    Inconsistent,
    NothingLive,
    NoPreviousColor,
}

impl DeployError {
    pub fn lock_held(holder: String, pid: u32, started_at: DateTime<Utc>) -> Self {
        DeployError::LockHeld(LockHolderInfo {
            holder,
            pid,
            started_at,
        })
    }

    pub fn lock_error(message: impl Into<String>) -> Self {
        DeployError::Lock(message.into())
    }

    pub fn kind(&self) -> DeployErrorKind {
        match self {
            DeployError::LockHeld(_) | DeployError::LockUnreadable(_) => DeployErrorKind::LockHeld,
            DeployError::Lock(_) => DeployErrorKind::Lock,
            DeployError::Runtime(_) => DeployErrorKind::Runtime,
            DeployError::Topology(_) => DeployErrorKind::Topology,
            DeployError::State(_) => DeployErrorKind::State,
            DeployError::Health(_) => DeployErrorKind::Health,
            DeployError::Router(_) => DeployErrorKind::Router,
            DeployError::Inconsistent(_) => DeployErrorKind::Inconsistent,
            DeployError::NothingLive => DeployErrorKind::NothingLive,
            DeployError::NoPreviousColor => DeployErrorKind::NoPreviousColor,
        }
    }

    pub fn lock_holder_info(&self) -> Option<&LockHolderInfo> {
        match self {
            DeployError::LockHeld(info) => Some(info),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_held_message_names_holder() {
        let err = DeployError::lock_held("build-01".into(), 4242, Utc::now());
        let msg = err.to_string();
        assert!(msg.starts_with("deployment in progress"));
        assert!(msg.contains("build-01"));
        assert!(msg.contains("4242"));
        assert_eq!(err.kind(), DeployErrorKind::LockHeld);
        assert_eq!(err.lock_holder_info().unwrap().pid, 4242);
    }

    #[test]
    fn other_errors_have_no_holder() {
        let err = DeployError::lock_error("disk full");
        assert_eq!(err.kind(), DeployErrorKind::Lock);
        assert!(err.lock_holder_info().is_none());
    }
}
