// ABOUTME: Observed lifecycle state of each color for the status command.
// ABOUTME: Derived from running containers, the state record and one health probe.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::health::HealthVerdict;
use crate::state::DeploymentRecord;
use crate::topology::PortMap;
use crate::types::{Color, ProjectName};

/// Where one color's stack is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentState {
    Stopped,
    /// Some but not all services are running.
    Starting,
    Healthy,
    Unhealthy,
    /// Receiving production traffic.
    Live,
    /// Being stopped by cleanup.
    Draining,
}

impl EnvironmentState {
    /// Classify a color from what is running and, when probed, its health.
    pub fn observe(live: bool, running: usize, expected: usize, healthy: Option<bool>) -> Self {
        if running == 0 {
            return EnvironmentState::Stopped;
        }
        if healthy == Some(false) {
            return EnvironmentState::Unhealthy;
        }
        if live {
            return EnvironmentState::Live;
        }
        if expected > 0 && running < expected {
            return EnvironmentState::Starting;
        }
        match healthy {
            Some(true) => EnvironmentState::Healthy,
            _ => EnvironmentState::Starting,
        }
    }
}

impl std::fmt::Display for EnvironmentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EnvironmentState::Stopped => "stopped",
            EnvironmentState::Starting => "starting",
            EnvironmentState::Healthy => "healthy",
            EnvironmentState::Unhealthy => "unhealthy",
            EnvironmentState::Live => "live",
            EnvironmentState::Draining => "draining",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EnvironmentStatus {
    pub color: Color,
    pub state: EnvironmentState,
    pub running_services: Vec<String>,
    pub ports: PortMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<HealthVerdict>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub project: ProjectName,
    pub active_color: Option<Color>,
    pub previous_color: Option<Color>,
    pub last_transition: Option<DateTime<Utc>>,
    /// Set when the state file is missing and the live color was guessed.
    pub inferred: bool,
    pub environments: Vec<EnvironmentStatus>,
    pub last_deployment: Option<DeploymentRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nothing_running_is_stopped() {
        assert_eq!(
            EnvironmentState::observe(true, 0, 3, None),
            EnvironmentState::Stopped
        );
    }

    #[test]
    fn live_color_stays_live_unless_probed_unhealthy() {
        assert_eq!(
            EnvironmentState::observe(true, 3, 3, Some(true)),
            EnvironmentState::Live
        );
        assert_eq!(
            EnvironmentState::observe(true, 3, 3, Some(false)),
            EnvironmentState::Unhealthy
        );
    }

    #[test]
    fn partial_stack_is_starting() {
        assert_eq!(
            EnvironmentState::observe(false, 1, 3, Some(true)),
            EnvironmentState::Starting
        );
        assert_eq!(
            EnvironmentState::observe(false, 3, 3, Some(true)),
            EnvironmentState::Healthy
        );
    }
}
