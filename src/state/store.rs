// ABOUTME: Environment state store holding which color receives live traffic.
// ABOUTME: Atomic JSON record plus degraded-mode reconciliation from the runtime.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::StateError;
use crate::atomic::write_atomic;
use crate::deploy::{DeployError, Deployer};
use crate::runtime::ComposeOps;
use crate::types::Color;

const STATE_FILENAME: &str = "state.json";

/// The single piece of persisted process-wide state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentStateRecord {
    /// Color currently receiving production traffic. `None` means bootstrap.
    pub active_color: Option<Color>,
    /// Color that was live before the last switch, kept for manual rollback.
    #[serde(default)]
    pub previous_color: Option<Color>,
    #[serde(default)]
    pub last_transition: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_deployment_id: Option<String>,
}

impl DeploymentStateRecord {
    /// Target for the next deploy: the color that is not live (blue on bootstrap).
    pub fn next_target(&self) -> Color {
        self.active_color.map(Color::other).unwrap_or(Color::Blue)
    }

    pub fn active_label(&self) -> &'static str {
        self.active_color.map(Color::as_str).unwrap_or("none")
    }
}

/// Result of inspecting the runtime when no state file exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// Exactly one color has running containers.
    Single(Color),
    /// Nothing is running: a genuine bootstrap.
    Neither,
    /// Both colors are running and nothing says which is live.
    Both,
}

impl Reconciliation {
    pub fn color(&self) -> Option<Color> {
        match self {
            Reconciliation::Single(color) => Some(*color),
            Reconciliation::Neither | Reconciliation::Both => None,
        }
    }
}

/// Owner of the active-color record.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join(STATE_FILENAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Read the record, or `None` when no record has ever been written.
    ///
    /// A file that exists but cannot be parsed is an error, never a
    /// silently defaulted color.
    pub fn read(&self) -> Result<Option<DeploymentStateRecord>, StateError> {
        let content = match std::fs::read(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StateError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        serde_json::from_slice(&content)
            .map(Some)
            .map_err(|source| StateError::Corrupt {
                path: self.path.clone(),
                source,
            })
    }

    /// Read the record, falling back to the bootstrap record.
    pub fn read_or_default(&self) -> Result<DeploymentStateRecord, StateError> {
        Ok(self.read()?.unwrap_or_default())
    }

    /// Persist `color` as live. Only the traffic switcher calls this, and
    /// only once it has committed.
    pub(crate) fn write(
        &self,
        color: Color,
        deployment_id: Option<&str>,
    ) -> Result<DeploymentStateRecord, StateError> {
        let current = self.read_or_default()?;
        let previous_color = match current.active_color {
            Some(active) if active != color => Some(active),
            _ => current.previous_color.filter(|c| *c != color),
        };

        let record = DeploymentStateRecord {
            active_color: Some(color),
            previous_color,
            last_transition: Some(Utc::now()),
            last_deployment_id: deployment_id
                .map(str::to_string)
                .or(current.last_deployment_id),
        };

        let json = serde_json::to_vec_pretty(&record)?;
        write_atomic(&self.path, &json).map_err(|source| StateError::Io {
            path: self.path.clone(),
            source,
        })?;

        tracing::info!(active = %color, previous = ?record.previous_color, "active color updated");
        Ok(record)
    }

    /// Reconstruct the live color from what is running.
    ///
    /// Only meaningful when the state file is missing. Ambiguous results are
    /// logged as inconsistencies for an operator to resolve.
    pub async fn infer_from_runtime<R: ComposeOps>(
        deployer: &Deployer<R>,
    ) -> Result<Reconciliation, DeployError> {
        let blue = deployer.is_running(Color::Blue).await?;
        let green = deployer.is_running(Color::Green).await?;

        let result = match (blue, green) {
            (true, false) => Reconciliation::Single(Color::Blue),
            (false, true) => Reconciliation::Single(Color::Green),
            (false, false) => Reconciliation::Neither,
            (true, true) => Reconciliation::Both,
        };

        match result {
            Reconciliation::Single(color) => {
                tracing::warn!(
                    "state file missing; inferred {} as live from running containers",
                    color
                );
            }
            Reconciliation::Neither => {
                tracing::warn!("state file missing and no environment is running");
            }
            Reconciliation::Both => {
                tracing::warn!(
                    "state file missing and both blue and green are running; \
                     refusing to guess which is live, manual intervention required"
                );
            }
        }

        Ok(result)
    }
}
