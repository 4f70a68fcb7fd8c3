// ABOUTME: State transition methods for the traffic switch.
// ABOUTME: Each method consumes self and returns the next state, or self and the error.

use chrono::Utc;
use std::future::Future;
use std::pin::Pin;

use crate::health::{HealthVerdict, Probe};
use crate::router::{ProxyOps, RouterConfig};
use crate::types::Color;

use super::state::{
    Applied, Committed, Idle, SwitchState, Switching, ValidatingTarget, Verifying,
};
use super::{SwitchError, SwitchReport, TrafficSwitcher};

/// Result type for transitions that may need a restore on failure.
pub type SwitchTransitionResult<T, S> = Result<Switch<T>, (Switch<S>, SwitchError)>;

/// One traffic switch in progress, parameterized by its current state.
#[derive(Debug)]
pub struct Switch<S> {
    pub(super) id: String,
    pub(super) target: Color,
    pub(super) source: Option<Color>,
    /// Router bytes before this switch; `None` when no config existed.
    pub(super) backup: Option<Vec<u8>>,
    pub(super) history: Vec<SwitchState>,
    pub(super) state: S,
}

impl<S> Switch<S> {
    fn transition<T>(mut self, state: T, label: SwitchState) -> Switch<T> {
        tracing::info!(switch = %self.id, target = %self.target, "switch state: {}", label);
        self.history.push(label);
        Switch {
            id: self.id,
            target: self.target,
            source: self.source,
            backup: self.backup,
            history: self.history,
            state,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn target(&self) -> Color {
        self.target
    }

    pub fn source(&self) -> Option<Color> {
        self.source
    }

    pub fn history(&self) -> &[SwitchState] {
        &self.history
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    /// Report for a switch that ended in `SwitchFailed`.
    pub(super) fn failed_report(&self, router_touched: bool, restored: bool) -> SwitchReport {
        let mut history = self.history.clone();
        history.push(SwitchState::SwitchFailed);
        SwitchReport {
            id: self.id.clone(),
            target: self.target,
            source: self.source,
            state: SwitchState::SwitchFailed,
            history,
            router_touched,
            restored,
        }
    }
}

impl Switch<Idle> {
    pub fn new(target: Color, source: Option<Color>) -> Self {
        Switch {
            id: format!("{}-{}", Utc::now().format("%Y%m%d%H%M%S%3f"), target),
            target,
            source,
            backup: None,
            history: vec![SwitchState::Idle],
            state: Idle,
        }
    }

    /// Accept the target only on a passing verdict for that same color.
    pub fn validate(
        self,
        verdict: &HealthVerdict,
    ) -> SwitchTransitionResult<ValidatingTarget, Idle> {
        if verdict.color != self.target {
            let error = SwitchError::TargetUnhealthy {
                color: self.target,
                summary: format!("health verdict is for {}", verdict.color),
            };
            return Err((self, error));
        }
        if !verdict.passed() {
            let error = SwitchError::TargetUnhealthy {
                color: self.target,
                summary: verdict.failure_summary(),
            };
            return Err((self, error));
        }
        Ok(self.transition(ValidatingTarget, SwitchState::ValidatingTarget))
    }
}

impl Switch<ValidatingTarget> {
    /// Back up the live router config and atomically replace it with the
    /// target's. On error the live file is untouched.
    pub fn apply<P: ProxyOps, Q: Probe>(
        self,
        switcher: &TrafficSwitcher<P, Q>,
    ) -> SwitchTransitionResult<Switching, ValidatingTarget> {
        let config = match RouterConfig::for_color(
            &switcher.project,
            self.target,
            switcher.ports.get(self.target),
            &switcher.settings,
        ) {
            Ok(config) => config,
            Err(e) => return Err((self, SwitchError::Apply(e))),
        };

        let backup = match switcher.router.backup(&switcher.backup_dir(&self.id)) {
            Ok(backup) => backup,
            Err(e) => return Err((self, SwitchError::Apply(e))),
        };

        if let Err(e) = switcher.router.replace(&config) {
            return Err((self, SwitchError::Apply(e)));
        }

        let mut next = self.transition(Switching, SwitchState::Switching);
        next.backup = backup;
        Ok(next)
    }
}

impl Switch<Switching> {
    /// Validate then reload the proxy. `abort` resolving first fails the step.
    pub async fn reload<P: ProxyOps, Q: Probe, F: Future<Output = ()>>(
        self,
        switcher: &TrafficSwitcher<P, Q>,
        abort: Pin<&mut F>,
    ) -> SwitchTransitionResult<Verifying, Switching> {
        let result = tokio::select! {
            result = switcher.reload_proxy() => result,
            _ = abort => Err(SwitchError::Aborted),
        };
        match result {
            Ok(()) => Ok(self.transition(Verifying, SwitchState::Verifying)),
            Err(e) => Err((self, e)),
        }
    }
}

impl Switch<Verifying> {
    /// Verify the public endpoint, then record the target as live.
    pub async fn commit<P: ProxyOps, Q: Probe, F: Future<Output = ()>>(
        self,
        switcher: &TrafficSwitcher<P, Q>,
        deployment_id: Option<&str>,
        abort: Pin<&mut F>,
    ) -> SwitchTransitionResult<Committed, Verifying> {
        let verified = tokio::select! {
            result = switcher.verify_public() => result,
            _ = abort => Err(SwitchError::Aborted),
        };
        if let Err(e) = verified {
            return Err((self, e));
        }

        if let Err(e) = switcher.store.write(self.target, deployment_id) {
            return Err((self, SwitchError::State(e)));
        }
        Ok(self.transition(Committed, SwitchState::Committed))
    }
}

impl<S: Applied> Switch<S> {
    /// Put back exactly the router bytes seen before `apply`, reload, and
    /// re-verify. The state record is never touched.
    pub async fn restore<P: ProxyOps, Q: Probe>(
        &self,
        switcher: &TrafficSwitcher<P, Q>,
    ) -> Result<(), SwitchError> {
        tracing::warn!(switch = %self.id, "restoring previous router config");
        switcher.restore_router(self.backup.as_deref()).await
    }
}

impl Switch<Committed> {
    pub fn finish(self) -> SwitchReport {
        SwitchReport {
            id: self.id,
            target: self.target,
            source: self.source,
            state: SwitchState::Committed,
            history: self.history,
            router_touched: true,
            restored: false,
        }
    }
}
