// ABOUTME: Deploy lock preventing concurrent cycles against the same project.
// ABOUTME: <state_dir>/deploy.lock holds JSON holder info, published whole with a no-clobber rename.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::types::ProjectName;

use super::DeployError;

const LOCK_FILENAME: &str = "deploy.lock";
const STALE_AFTER: Duration = Duration::from_secs(60 * 60);

/// Information about who holds a deploy lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    /// Hostname of the machine that holds the lock.
    pub holder: String,
    /// Process ID of the lock holder.
    pub pid: u32,
    /// When the lock was acquired.
    pub started_at: DateTime<Utc>,
    /// Project being deployed.
    pub project: String,
}

impl LockInfo {
    /// Create new lock info for the current process.
    pub fn new(project: &ProjectName) -> Self {
        Self {
            holder: gethostname::gethostname().to_string_lossy().into_owned(),
            pid: std::process::id(),
            started_at: Utc::now(),
            project: project.to_string(),
        }
    }

    /// Check if this lock is stale (older than 1 hour).
    pub fn is_stale(&self) -> bool {
        (Utc::now() - self.started_at)
            .to_std()
            .is_ok_and(|age| age >= STALE_AFTER)
    }

    /// Path to the lock file inside a state directory.
    pub fn lock_path(state_dir: &Path) -> PathBuf {
        state_dir.join(LOCK_FILENAME)
    }
}

/// A held deploy lock that releases on drop.
#[derive(Debug)]
pub struct DeployLock {
    path: PathBuf,
    released: bool,
}

/// What a failed create found at the lock path.
enum Existing {
    Held(LockInfo),
    Unreadable { modified: Option<SystemTime> },
    Gone,
}

impl Existing {
    fn inspect(path: &Path) -> Self {
        let content = match std::fs::read(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Existing::Gone,
            Err(_) => Vec::new(),
        };
        match serde_json::from_slice(&content) {
            Ok(info) => Existing::Held(info),
            Err(_) => Existing::Unreadable {
                modified: std::fs::metadata(path).and_then(|m| m.modified()).ok(),
            },
        }
    }

    fn is_stale(&self) -> bool {
        match self {
            Existing::Held(info) => info.is_stale(),
            Existing::Unreadable { modified } => modified
                .and_then(|m| SystemTime::now().duration_since(m).ok())
                .is_some_and(|age| age >= STALE_AFTER),
            Existing::Gone => true,
        }
    }

    fn same_as(&self, other: &Existing) -> bool {
        match (self, other) {
            (Existing::Held(a), Existing::Held(b)) => {
                a.pid == b.pid && a.holder == b.holder && a.started_at == b.started_at
            }
            (Existing::Unreadable { modified: a }, Existing::Unreadable { modified: b }) => a == b,
            (Existing::Gone, Existing::Gone) => true,
            _ => false,
        }
    }
}

impl DeployLock {
    /// Acquire the deploy lock for the project.
    ///
    /// The holder info is written to a temporary file and published with a
    /// no-clobber rename, so the lock file is never visible half-written and
    /// two processes can never both succeed. Stale locks (>1 hour, by holder
    /// timestamp or, for unreadable files, by modification time) are broken
    /// with a warning; `force` breaks a live one.
    pub fn acquire(
        state_dir: &Path,
        project: &ProjectName,
        force: bool,
    ) -> Result<Self, DeployError> {
        std::fs::create_dir_all(state_dir).map_err(|e| {
            DeployError::lock_error(format!(
                "failed to create state directory {}: {}",
                state_dir.display(),
                e
            ))
        })?;

        let path = LockInfo::lock_path(state_dir);
        let info = LockInfo::new(project);

        if Self::try_create(&path, &info)? {
            tracing::debug!("acquired deploy lock {}", path.display());
            return Ok(Self {
                path,
                released: false,
            });
        }

        let existing = Existing::inspect(&path);
        if !force && !existing.is_stale() {
            return Err(match existing {
                Existing::Held(held) => {
                    DeployError::lock_held(held.holder, held.pid, held.started_at)
                }
                _ => DeployError::LockUnreadable(path),
            });
        }

        match &existing {
            Existing::Held(held) if force && !held.is_stale() => tracing::warn!(
                "Breaking lock held by {} (pid {}) since {}",
                held.holder,
                held.pid,
                held.started_at
            ),
            Existing::Held(held) => tracing::warn!(
                "Auto-breaking stale lock held by {} (pid {}) since {}",
                held.holder,
                held.pid,
                held.started_at
            ),
            Existing::Unreadable { .. } => {
                tracing::warn!("Breaking unreadable lock {}", path.display())
            }
            Existing::Gone => {}
        }

        // Another breaker may have replaced the lock since it was inspected.
        if !Existing::inspect(&path).same_as(&existing) {
            return Err(DeployError::lock_error(
                "lock acquired by another process during break",
            ));
        }

        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(DeployError::lock_error(format!(
                    "failed to remove lock {}: {}",
                    path.display(),
                    e
                )));
            }
        }

        if Self::try_create(&path, &info)? {
            Ok(Self {
                path,
                released: false,
            })
        } else {
            Err(DeployError::lock_error(
                "lock acquired by another process during break",
            ))
        }
    }

    /// Returns `false` when the lock file already exists.
    fn try_create(path: &Path, info: &LockInfo) -> Result<bool, DeployError> {
        let json = serde_json::to_vec(info)
            .map_err(|e| DeployError::lock_error(format!("failed to serialize lock: {}", e)))?;
        let dir = path.parent().unwrap_or(Path::new("."));

        let staged = tempfile::NamedTempFile::new_in(dir)
            .and_then(|mut file| {
                file.write_all(&json)?;
                file.as_file().sync_all()?;
                Ok(file)
            })
            .map_err(|e| DeployError::lock_error(format!("failed to write lock: {}", e)))?;

        match staged.persist_noclobber(path) {
            Ok(_) => Ok(true),
            Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(DeployError::lock_error(format!(
                "failed to create lock {}: {}",
                path.display(),
                e.error
            ))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock, reporting a failure to remove it.
    pub fn release(mut self) -> Result<(), DeployError> {
        self.released = true;
        std::fs::remove_file(&self.path).map_err(|e| {
            DeployError::lock_error(format!(
                "failed to remove lock {}: {}",
                self.path.display(),
                e
            ))
        })
    }
}

impl Drop for DeployLock {
    fn drop(&mut self) {
        if !self.released
            && let Err(e) = std::fs::remove_file(&self.path)
        {
            tracing::warn!("failed to remove lock {}: {}", self.path.display(), e);
        }
    }
}
