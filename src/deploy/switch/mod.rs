// ABOUTME: Traffic switcher moving live traffic between colors through the router.
// ABOUTME: The state record changes only when a switch reaches Committed.

mod state;
mod transitions;

pub use state::{Applied, Committed, Idle, SwitchState, Switching, ValidatingTarget, Verifying};
pub use transitions::{Switch, SwitchTransitionResult};

use serde::Serialize;
use std::future::Future;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::health::{HealthVerdict, Probe, ProbeStatus};
use crate::router::{ProxyOps, RouterError, RouterFile, RouterSettings};
use crate::state::{StateError, StateStore};
use crate::topology::ColorPorts;
use crate::types::{Color, ProjectName};

const BACKUP_DIRNAME: &str = "backups";

#[derive(Debug, Error)]
pub enum SwitchError {
    #[error("target {color} is not healthy: {summary}")]
    TargetUnhealthy { color: Color, summary: String },

    #[error("failed to write router config: {0}")]
    Apply(RouterError),

    #[error("proxy rejected the new config: {0}")]
    ConfigRejected(RouterError),

    #[error("proxy reload failed: {0}")]
    Reload(RouterError),

    #[error("public endpoint {url} failed verification after {attempts} attempt(s): {last}")]
    VerifyFailed {
        url: String,
        attempts: u32,
        last: ProbeStatus,
    },

    #[error("switch aborted by operator")]
    Aborted,

    #[error("failed to record live color: {0}")]
    State(StateError),

    #[error(
        "restoring the previous router config failed ({restore}) after: {cause}; \
         manual intervention required"
    )]
    RestoreFailed {
        cause: Box<SwitchError>,
        restore: Box<SwitchError>,
    },
}

impl SwitchError {
    /// Whether the router is left in an unknown state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SwitchError::RestoreFailed { .. })
    }
}

/// What a switch attempt did.
#[derive(Debug, Clone, Serialize)]
pub struct SwitchReport {
    pub id: String,
    pub target: Color,
    pub source: Option<Color>,
    pub state: SwitchState,
    pub history: Vec<SwitchState>,
    /// Whether the live router config file was ever replaced.
    pub router_touched: bool,
    /// Whether the previous config was put back and verified.
    pub restored: bool,
}

#[derive(Debug, Error)]
#[error("switch to {} failed: {}", .report.target, .error)]
pub struct SwitchFailure {
    pub report: SwitchReport,
    pub error: SwitchError,
}

impl SwitchFailure {
    pub fn is_terminal(&self) -> bool {
        self.error.is_terminal()
    }
}

/// Owns everything a switch touches: the router file, the proxy, the public
/// verification probe and the state store.
pub struct TrafficSwitcher<P, Q> {
    project: ProjectName,
    ports: ColorPorts,
    settings: RouterSettings,
    router: RouterFile,
    proxy: P,
    probe: Q,
    store: StateStore,
    backup_root: PathBuf,
}

impl<P: ProxyOps, Q: Probe> TrafficSwitcher<P, Q> {
    pub fn new(
        project: ProjectName,
        ports: ColorPorts,
        settings: RouterSettings,
        state_dir: &Path,
        proxy: P,
        probe: Q,
    ) -> Self {
        Self {
            project,
            ports,
            router: RouterFile::new(settings.config_path.clone()),
            settings,
            proxy,
            probe,
            store: StateStore::new(state_dir),
            backup_root: state_dir.join(BACKUP_DIRNAME),
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn router(&self) -> &RouterFile {
        &self.router
    }

    pub fn ports(&self) -> &ColorPorts {
        &self.ports
    }

    pub fn backup_dir(&self, switch_id: &str) -> PathBuf {
        self.backup_root.join(switch_id)
    }

    /// Move live traffic to `target`.
    pub async fn switch(
        &self,
        target: Color,
        verdict: &HealthVerdict,
        deployment_id: Option<&str>,
    ) -> Result<SwitchReport, SwitchFailure> {
        self.switch_with_abort(target, verdict, deployment_id, std::future::pending())
            .await
    }

    /// As `switch`, but `abort` resolving while the router is being switched
    /// or verified takes the restore path.
    pub async fn switch_with_abort<F: Future<Output = ()>>(
        &self,
        target: Color,
        verdict: &HealthVerdict,
        deployment_id: Option<&str>,
        abort: F,
    ) -> Result<SwitchReport, SwitchFailure> {
        let source = match self.store.read_or_default() {
            Ok(record) => record.active_color,
            Err(e) => {
                let switch = Switch::new(target, None);
                return Err(SwitchFailure {
                    report: switch.failed_report(false, false),
                    error: SwitchError::State(e),
                });
            }
        };

        let switch = Switch::new(target, source);
        tracing::info!(switch = %switch.id(), %target, ?source, "switching traffic");

        let switch = match switch.validate(verdict) {
            Ok(switch) => switch,
            Err((switch, error)) => return Err(untouched(&switch, error)),
        };
        let switch = match switch.apply(self) {
            Ok(switch) => switch,
            Err((switch, error)) => return Err(untouched(&switch, error)),
        };

        let mut abort = std::pin::pin!(abort);

        let switch = match switch.reload(self, abort.as_mut()).await {
            Ok(switch) => switch,
            Err((switch, error)) => return Err(self.recover(&switch, error).await),
        };
        match switch.commit(self, deployment_id, abort.as_mut()).await {
            Ok(switch) => {
                tracing::info!(switch = %switch.id(), %target, "traffic switched");
                Ok(switch.finish())
            }
            Err((switch, error)) => Err(self.recover(&switch, error).await),
        }
    }

    async fn recover<S: Applied>(&self, switch: &Switch<S>, cause: SwitchError) -> SwitchFailure {
        tracing::warn!(switch = %switch.id(), "switch failed: {}", cause);
        match switch.restore(self).await {
            Ok(()) => {
                tracing::warn!(switch = %switch.id(), "previous router config restored");
                SwitchFailure {
                    report: switch.failed_report(true, true),
                    error: cause,
                }
            }
            Err(restore) => {
                tracing::error!(switch = %switch.id(), "router restore failed: {}", restore);
                SwitchFailure {
                    report: switch.failed_report(true, false),
                    error: SwitchError::RestoreFailed {
                        cause: Box::new(cause),
                        restore: Box::new(restore),
                    },
                }
            }
        }
    }

    async fn reload_proxy(&self) -> Result<(), SwitchError> {
        self.proxy
            .test_config()
            .await
            .map_err(SwitchError::ConfigRejected)?;
        self.proxy.reload().await.map_err(SwitchError::Reload)
    }

    async fn verify_public(&self) -> Result<(), SwitchError> {
        let url = &self.settings.public_url;
        let policy = &self.settings.verify;
        let probe = &self.probe;

        let outcome = policy
            .run(|attempt| async move {
                let status = probe.get(url, policy.timeout).await;
                tracing::debug!(attempt, %status, "verifying {}", url);
                if status.is_success() {
                    Ok(status)
                } else {
                    Err(status)
                }
            })
            .await;

        if outcome.succeeded() {
            return Ok(());
        }
        let attempts = outcome.attempts();
        Err(SwitchError::VerifyFailed {
            url: url.clone(),
            attempts,
            last: outcome
                .failures
                .into_iter()
                .last()
                .unwrap_or(ProbeStatus::Timeout),
        })
    }

    /// When no config existed before the switch there was nothing serving
    /// the public URL, so only the file and reload are restored.
    async fn restore_router(&self, backup: Option<&[u8]>) -> Result<(), SwitchError> {
        self.router.restore(backup).map_err(SwitchError::Apply)?;
        self.proxy.reload().await.map_err(SwitchError::Reload)?;
        if backup.is_some() {
            self.verify_public().await?;
        }
        Ok(())
    }
}

fn untouched<S>(switch: &Switch<S>, error: SwitchError) -> SwitchFailure {
    tracing::warn!(switch = %switch.id(), "switch refused: {}", error);
    SwitchFailure {
        report: switch.failed_report(false, false),
        error,
    }
}
