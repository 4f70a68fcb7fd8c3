// ABOUTME: Rollback controller returning live traffic to a known-good color.
// ABOUTME: Health-gated, never redeploys, never rewrites a restored router, and any failure is terminal.

use serde::Serialize;

use crate::health::{HealthChecker, HealthPlan, HealthVerdict, Probe};
use crate::router::ProxyOps;
use crate::runtime::ComposeOps;
use crate::types::Color;

use super::switch::{SwitchFailure, SwitchReport, TrafficSwitcher};
use super::{DeployError, Deployer};

/// Which color a rollback returns to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackMode {
    /// A switch failed and was restored: the record's active color is the
    /// one still known to be good and already serving again, so it is only
    /// health checked.
    AfterFailedSwitch,
    /// Operator request: go back to the record's previous color.
    Manual,
}

/// Rollback failures. All of them need an operator.
#[derive(Debug, thiserror::Error)]
pub enum RollbackError {
    #[error(transparent)]
    Deploy(#[from] DeployError),

    #[error("rollback target {color} failed health check: {summary}")]
    Unhealthy { color: Color, summary: String },

    #[error("rollback switch failed: {0}")]
    Switch(#[from] SwitchFailure),
}

#[derive(Debug, Clone, Serialize)]
pub struct RollbackReport {
    pub mode: RollbackMode,
    pub target: Color,
    pub verdict: HealthVerdict,
    /// `None` when traffic never left the target.
    pub switch: Option<SwitchReport>,
}

/// Brings a previously deployed color back into service.
pub struct RollbackController<'a, R, P, Q> {
    deployer: &'a Deployer<R>,
    checker: &'a HealthChecker<Q>,
    health: &'a HealthPlan,
    switcher: &'a TrafficSwitcher<P, Q>,
}

impl<'a, R: ComposeOps, P: ProxyOps, Q: Probe> RollbackController<'a, R, P, Q> {
    pub fn new(
        deployer: &'a Deployer<R>,
        checker: &'a HealthChecker<Q>,
        health: &'a HealthPlan,
        switcher: &'a TrafficSwitcher<P, Q>,
    ) -> Self {
        Self {
            deployer,
            checker,
            health,
            switcher,
        }
    }

    /// Color `mode` would return to, from the current state record.
    pub fn target(&self, mode: RollbackMode) -> Result<Color, DeployError> {
        let record = self.switcher.store().read_or_default()?;
        match mode {
            RollbackMode::AfterFailedSwitch => record.active_color.ok_or(DeployError::NothingLive),
            RollbackMode::Manual => record.previous_color.ok_or(DeployError::NoPreviousColor),
        }
    }

    /// Start the target if needed, health check it, and for a manual
    /// rollback switch to it only if it passes. Nothing is pulled or rebuilt.
    /// After a restored switch the router bytes and the state record are
    /// left as the restore put them.
    pub async fn run(
        &self,
        mode: RollbackMode,
        deployment_id: Option<&str>,
    ) -> Result<RollbackReport, RollbackError> {
        let target = self.target(mode)?;
        tracing::warn!(?mode, %target, "rolling back");

        self.deployer.start(target).await?;

        let verdict = self
            .checker
            .check_plan(target, self.health)
            .await
            .map_err(DeployError::from)?;
        if !verdict.passed() {
            return Err(RollbackError::Unhealthy {
                color: target,
                summary: verdict.failure_summary(),
            });
        }

        let switch = match mode {
            RollbackMode::AfterFailedSwitch => None,
            RollbackMode::Manual => {
                Some(self.switcher.switch(target, &verdict, deployment_id).await?)
            }
        };
        tracing::info!(%target, "rollback complete");

        Ok(RollbackReport {
            mode,
            target,
            verdict,
            switch,
        })
    }
}
