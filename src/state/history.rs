// ABOUTME: Append-only deployment history, one JSON record per cycle.
// ABOUTME: Records are written once at the end of a cycle and never rewritten.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::StateError;
use crate::types::Color;

const HISTORY_FILENAME: &str = "history.jsonl";

/// Final outcome of a deployment cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    RolledBack,
    Failed,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Outcome::Success => "success",
            Outcome::RolledBack => "rolled_back",
            Outcome::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Audit entry for one deployment cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub source: Option<Color>,
    pub target: Color,
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub duration_ms: u64,
    #[serde(default)]
    pub images: BTreeMap<String, String>,
}

/// The append-only history file.
#[derive(Debug, Clone)]
pub struct HistoryLog {
    path: PathBuf,
}

impl HistoryLog {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join(HISTORY_FILENAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &DeploymentRecord) -> Result<(), StateError> {
        let io_err = |source: std::io::Error| StateError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(io_err)?;
        file.write_all(&line).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        Ok(())
    }

    /// All records, oldest first. Unparsable lines are skipped with a warning.
    pub fn read_all(&self) -> Result<Vec<DeploymentRecord>, StateError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StateError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        Ok(content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!("skipping unreadable history entry: {}", e);
                    None
                }
            })
            .collect())
    }

    pub fn last(&self) -> Result<Option<DeploymentRecord>, StateError> {
        Ok(self.read_all()?.pop())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, outcome: Outcome) -> DeploymentRecord {
        DeploymentRecord {
            id: id.to_string(),
            timestamp: Utc::now(),
            source: Some(Color::Blue),
            target: Color::Green,
            outcome,
            reason: None,
            duration_ms: 1200,
            images: BTreeMap::from([("backend".to_string(), "erp/backend:2".to_string())]),
        }
    }

    #[test]
    fn appends_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let log = HistoryLog::new(dir.path());

        log.append(&record("a", Outcome::Success)).unwrap();
        log.append(&record("b", Outcome::RolledBack)).unwrap();

        let all = log.read_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, "a");
        assert_eq!(all[1].outcome, Outcome::RolledBack);
        assert_eq!(log.last().unwrap().unwrap().id, "b");
    }

    #[test]
    fn missing_log_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = HistoryLog::new(dir.path());
        assert!(log.read_all().unwrap().is_empty());
    }

    #[test]
    fn outcome_serializes_snake_case() {
        let json = serde_json::to_string(&Outcome::RolledBack).unwrap();
        assert_eq!(json, "\"rolled_back\"");
    }
}
