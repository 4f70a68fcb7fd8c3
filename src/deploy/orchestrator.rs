// ABOUTME: Orchestrator sequencing full deployment cycles and the operator commands.
// ABOUTME: Every cycle ends with exactly one history record, whatever its outcome.

use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::diagnostics::{Diagnostics, Warning};
use crate::health::{HealthChecker, HealthPlan, HealthVerdict, Probe, RetryPolicy};
use crate::hooks::{HookContext, HookPoint, HookResult, HookRunner};
use crate::notify::Notifier;
use crate::router::ProxyOps;
use crate::runtime::ComposeOps;
use crate::state::{
    DeploymentRecord, DeploymentStateRecord, HistoryLog, Outcome, Reconciliation, StateStore,
};
use crate::topology::{
    BaseTopology, ColorPorts, PortPlan, generate, write_color_config, write_color_configs,
};
use crate::types::{Color, ProjectName};

use super::rollback::{RollbackController, RollbackMode, RollbackReport};
use super::status::{EnvironmentState, EnvironmentStatus, StatusReport};
use super::switch::{SwitchError, SwitchReport, TrafficSwitcher};
use super::{DeployError, DeployLock, Deployer};

/// Which operator command produced a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleKind {
    Deploy,
    Switch,
    Rollback,
}

/// How a cycle ended, from the operator's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
    /// Traffic now goes to the target.
    Committed,
    /// Stopped before or during the switch; traffic is where it was.
    Aborted,
    /// The switch failed and traffic was returned to the previous color.
    RolledBack,
    /// The router or both colors are in a state that needs a human.
    Terminal,
}

impl CycleOutcome {
    pub fn exit_code(self) -> i32 {
        match self {
            CycleOutcome::Committed => 0,
            CycleOutcome::Aborted => 1,
            CycleOutcome::RolledBack => 2,
            CycleOutcome::Terminal => 3,
        }
    }

    fn history(self, kind: CycleKind) -> Outcome {
        match (self, kind) {
            (CycleOutcome::Committed, CycleKind::Rollback) => Outcome::RolledBack,
            (CycleOutcome::Committed, _) => Outcome::Success,
            (CycleOutcome::RolledBack, _) => Outcome::RolledBack,
            (CycleOutcome::Aborted | CycleOutcome::Terminal, _) => Outcome::Failed,
        }
    }
}

impl std::fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CycleOutcome::Committed => "committed",
            CycleOutcome::Aborted => "aborted",
            CycleOutcome::RolledBack => "rolled back",
            CycleOutcome::Terminal => "terminal",
        };
        f.write_str(s)
    }
}

/// Everything a finished cycle produced.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub kind: CycleKind,
    pub outcome: CycleOutcome,
    pub record: DeploymentRecord,
    /// Reference printed by the pre-deploy backup hook.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<HealthVerdict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub switch: Option<SwitchReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback: Option<RollbackReport>,
    pub warnings: Diagnostics,
}

impl CycleReport {
    pub fn exit_code(&self) -> i32 {
        self.outcome.exit_code()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CleanupReport {
    pub live: Color,
    /// The idle color, when it had anything running.
    pub stopped: Option<Color>,
}

type Ending = (CycleOutcome, Option<String>);

/// Accumulates a cycle's facts until its record is written.
struct Cycle {
    kind: CycleKind,
    id: String,
    started: Instant,
    source: Option<Color>,
    target: Color,
    images: BTreeMap<String, String>,
    snapshot: Option<String>,
    health: Option<HealthVerdict>,
    switch: Option<SwitchReport>,
    rollback: Option<RollbackReport>,
    diagnostics: Diagnostics,
}

impl Cycle {
    fn new(kind: CycleKind, source: Option<Color>, target: Color, diagnostics: Diagnostics) -> Self {
        Self {
            kind,
            id: deployment_id(),
            started: Instant::now(),
            source,
            target,
            images: BTreeMap::new(),
            snapshot: None,
            health: None,
            switch: None,
            rollback: None,
            diagnostics,
        }
    }

    fn hook_context(&self, project: &ProjectName) -> HookContext {
        HookContext {
            project: project.clone(),
            target: self.target,
            source: self.source,
            deployment_id: self.id.clone(),
        }
    }
}

static CYCLE_SEQ: AtomicU32 = AtomicU32::new(0);

/// Timestamp, pid and an in-process sequence, so cycles started within the
/// same second never share an id.
fn deployment_id() -> String {
    format!(
        "{}-{}-{}",
        Utc::now().format("%Y%m%d%H%M%S"),
        std::process::id(),
        CYCLE_SEQ.fetch_add(1, Ordering::Relaxed)
    )
}

/// Sequences the deployer, health checker, traffic switcher and rollback
/// controller for one project.
pub struct Orchestrator<R, P, Q> {
    project: ProjectName,
    state_dir: PathBuf,
    topology: BaseTopology,
    plan: PortPlan,
    ports: ColorPorts,
    deployer: Deployer<R>,
    checker: HealthChecker<Q>,
    health: HealthPlan,
    switcher: TrafficSwitcher<P, Q>,
    hooks: HookRunner,
    notifier: Option<Notifier>,
    history: HistoryLog,
}

impl<R: ComposeOps, P: ProxyOps, Q: Probe + Clone> Orchestrator<R, P, Q> {
    /// Load the base compose file named by `config` and wire every
    /// component to the given runtime, proxy and probe.
    pub fn new(config: &Config, runtime: R, proxy: P, probe: Q) -> crate::error::Result<Self> {
        let topology = BaseTopology::load(&config.compose_path())?;
        topology.validate(&config.offsets)?;
        let ports = topology.color_ports(&config.roles, &config.offsets)?;
        let state_dir = config.state_path();

        let services = topology.compose().services.keys().cloned().collect();
        let mut deployer = Deployer::new(runtime, config.project.clone(), &state_dir)
            .with_env_file(config.env_file_path())
            .with_services(services);
        if !config.base_dir.as_os_str().is_empty() {
            deployer = deployer.with_project_dir(&config.base_dir);
        }

        let switcher = TrafficSwitcher::new(
            config.project.clone(),
            ports,
            config.router_settings(),
            &state_dir,
            proxy,
            probe.clone(),
        );

        Ok(Self {
            project: config.project.clone(),
            history: HistoryLog::new(&state_dir),
            state_dir,
            topology,
            plan: config.offsets,
            ports,
            deployer,
            checker: HealthChecker::new(probe),
            health: config.health.plan(ports),
            switcher,
            hooks: HookRunner::new(config.hooks.clone(), &config.base_dir),
            notifier: Notifier::from_settings(&config.notify)?,
        })
    }

    pub fn project(&self) -> &ProjectName {
        &self.project
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn deployer(&self) -> &Deployer<R> {
        &self.deployer
    }

    pub fn switcher(&self) -> &TrafficSwitcher<P, Q> {
        &self.switcher
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    /// Run a full deployment cycle to the idle color.
    ///
    /// `abort` resolving (an operator interrupt) stops the cycle; once the
    /// router has been touched it takes the restore path.
    pub async fn deploy<F: Future<Output = ()>>(
        &self,
        force: bool,
        abort: F,
    ) -> Result<CycleReport, DeployError> {
        let lock = DeployLock::acquire(&self.state_dir, &self.project, force)?;
        let mut diagnostics = Diagnostics::default();
        let state = self.current_state(&mut diagnostics).await?;

        let mut cycle = Cycle::new(
            CycleKind::Deploy,
            state.active_color,
            state.next_target(),
            diagnostics,
        );
        tracing::info!(
            deployment = %cycle.id,
            target = %cycle.target,
            source = state.active_label(),
            "starting deployment"
        );

        let mut abort = std::pin::pin!(abort);
        let prepared = tokio::select! {
            result = self.prepare(&mut cycle) => Some(result),
            _ = abort.as_mut() => None,
        };
        let (outcome, reason) = match prepared {
            None => (
                CycleOutcome::Aborted,
                Some("aborted by operator before switching".to_string()),
            ),
            Some(Err(e)) => (CycleOutcome::Aborted, Some(e.to_string())),
            Some(Ok(Some(halted))) => (CycleOutcome::Aborted, Some(halted)),
            Some(Ok(None)) => self.cut_over(&mut cycle, abort.as_mut(), true).await,
        };

        Ok(self.finish(cycle, outcome, reason, lock).await)
    }

    /// Generate, snapshot, start and check the target. Returns why the cycle
    /// stopped, or `None` when the target is healthy and ready for traffic.
    async fn prepare(&self, cycle: &mut Cycle) -> Result<Option<String>, DeployError> {
        let target = cycle.target;
        let topology = generate(&self.topology, &self.project, target, &self.plan)?;
        write_color_config(&topology, &self.state_dir)?;
        cycle.images = topology.images();

        let context = cycle.hook_context(&self.project);
        if let Some(result) = self.hooks.run(HookPoint::PreDeploy, &context).await {
            if !result.success {
                return Ok(Some(hook_failure(HookPoint::PreDeploy, &result)));
            }
            cycle.snapshot = result.last_line().map(str::to_string);
            if let Some(ref snapshot) = cycle.snapshot {
                tracing::info!(%snapshot, "backup snapshot taken");
            }
        }

        self.deployer.pull_latest(target).await?;
        self.deployer.refresh(target).await?;

        let verdict = self.checker.check_plan(target, &self.health).await?;
        let halted = (!verdict.passed())
            .then(|| format!("health check failed: {}", verdict.failure_summary()));
        cycle.health = Some(verdict);
        Ok(halted)
    }

    /// Switch traffic to the checked target. With `roll_back`, a restored
    /// switch is followed by a rollback that confirms the previous live color
    /// is healthy, unless the operator aborted it.
    async fn cut_over<F: Future<Output = ()>>(
        &self,
        cycle: &mut Cycle,
        abort: Pin<&mut F>,
        roll_back: bool,
    ) -> Ending {
        let Some(verdict) = cycle.health.as_ref() else {
            return (
                CycleOutcome::Aborted,
                Some(format!("{} was not health checked", cycle.target)),
            );
        };

        let result = self
            .switcher
            .switch_with_abort(cycle.target, verdict, Some(&cycle.id), abort)
            .await;
        let failure = match result {
            Ok(report) => {
                cycle.switch = Some(report);
                return (CycleOutcome::Committed, None);
            }
            Err(failure) => failure,
        };

        let terminal = failure.is_terminal();
        let aborted = matches!(failure.error, SwitchError::Aborted);
        let reason = failure.to_string();
        let restored = failure.report.restored;
        let source = failure.report.source;
        cycle.switch = Some(failure.report);

        if terminal {
            return (CycleOutcome::Terminal, Some(reason));
        }
        if !restored || !roll_back || aborted || source.is_none() {
            return (CycleOutcome::Aborted, Some(reason));
        }

        match self
            .rollback_controller()
            .run(RollbackMode::AfterFailedSwitch, Some(&cycle.id))
            .await
        {
            Ok(report) => {
                cycle.rollback = Some(report);
                (CycleOutcome::RolledBack, Some(reason))
            }
            Err(e) => {
                tracing::error!("rollback failed: {}", e);
                (
                    CycleOutcome::Terminal,
                    Some(format!("{reason}; rollback failed: {e}")),
                )
            }
        }
    }

    /// Move traffic to `target` without deploying anything. The target must
    /// already be running and healthy.
    pub async fn switch_to<F: Future<Output = ()>>(
        &self,
        target: Color,
        force: bool,
        abort: F,
    ) -> Result<CycleReport, DeployError> {
        let lock = DeployLock::acquire(&self.state_dir, &self.project, force)?;
        let mut diagnostics = Diagnostics::default();
        let state = self.current_state(&mut diagnostics).await?;
        let mut cycle = Cycle::new(CycleKind::Switch, state.active_color, target, diagnostics);

        let mut abort = std::pin::pin!(abort);
        let checked = tokio::select! {
            result = self.checker.check_plan(target, &self.health) => Some(result),
            _ = abort.as_mut() => None,
        };
        let (outcome, reason) = match checked {
            None => (
                CycleOutcome::Aborted,
                Some("aborted by operator".to_string()),
            ),
            Some(Err(e)) => (CycleOutcome::Aborted, Some(e.to_string())),
            Some(Ok(verdict)) => {
                let passed = verdict.passed();
                let summary = verdict.failure_summary();
                cycle.health = Some(verdict);
                if passed {
                    self.cut_over(&mut cycle, abort.as_mut(), false).await
                } else {
                    (
                        CycleOutcome::Aborted,
                        Some(format!("health check failed: {summary}")),
                    )
                }
            }
        };

        Ok(self.finish(cycle, outcome, reason, lock).await)
    }

    /// Return traffic to the recorded previous color. Nothing is redeployed;
    /// any failure after the lock is taken is terminal.
    pub async fn rollback(&self, force: bool) -> Result<CycleReport, DeployError> {
        let lock = DeployLock::acquire(&self.state_dir, &self.project, force)?;
        let controller = self.rollback_controller();
        let target = controller.target(RollbackMode::Manual)?;
        let source = self.switcher.store().read_or_default()?.active_color;
        let mut cycle = Cycle::new(CycleKind::Rollback, source, target, Diagnostics::default());

        let (outcome, reason) = match controller.run(RollbackMode::Manual, Some(&cycle.id)).await {
            Ok(report) => {
                cycle.health = Some(report.verdict.clone());
                cycle.switch = report.switch.clone();
                cycle.rollback = Some(report);
                (CycleOutcome::Committed, Some("manual rollback".to_string()))
            }
            Err(e) => {
                tracing::error!("rollback failed: {}", e);
                (CycleOutcome::Terminal, Some(e.to_string()))
            }
        };

        Ok(self.finish(cycle, outcome, reason, lock).await)
    }

    /// Health check one color, or the live color, or both when nothing is live.
    pub async fn health(&self, color: Option<Color>) -> Result<Vec<HealthVerdict>, DeployError> {
        let colors = match color {
            Some(color) => vec![color],
            None => match self.switcher.store().read_or_default()?.active_color {
                Some(live) => vec![live],
                None => Color::ALL.to_vec(),
            },
        };

        let mut verdicts = Vec::with_capacity(colors.len());
        for color in colors {
            verdicts.push(self.checker.check_plan(color, &self.health).await?);
        }
        Ok(verdicts)
    }

    /// Live color, both environments and the last history record. Running
    /// colors get a single health probe each.
    pub async fn status(&self) -> Result<StatusReport, DeployError> {
        let (state, inferred) = match self.switcher.store().read()? {
            Some(state) => (state, false),
            None => match StateStore::infer_from_runtime(&self.deployer).await? {
                Reconciliation::Single(color) => (
                    DeploymentStateRecord {
                        active_color: Some(color),
                        ..DeploymentStateRecord::default()
                    },
                    true,
                ),
                Reconciliation::Neither | Reconciliation::Both => {
                    (DeploymentStateRecord::default(), false)
                }
            },
        };

        let quick = HealthPlan {
            policy: RetryPolicy::new(1, Duration::ZERO, self.health.policy.timeout),
            ..self.health.clone()
        };
        let expected = self.deployer.services().len();

        let mut environments = Vec::with_capacity(Color::ALL.len());
        for color in Color::ALL {
            let running = self.deployer.running_services(color).await?;
            let health = if running.is_empty() {
                None
            } else {
                Some(self.checker.check_plan(color, &quick).await?)
            };
            let live = state.active_color == Some(color);
            environments.push(EnvironmentStatus {
                color,
                state: EnvironmentState::observe(
                    live,
                    running.len(),
                    expected,
                    health.as_ref().map(HealthVerdict::passed),
                ),
                running_services: running,
                ports: *self.ports.get(color),
                health,
            });
        }

        Ok(StatusReport {
            project: self.project.clone(),
            active_color: state.active_color,
            previous_color: state.previous_color,
            last_transition: state.last_transition,
            inferred,
            environments,
            last_deployment: self.history.last()?,
        })
    }

    /// Stop the idle color once the live one is trusted. Refuses while
    /// nothing is live.
    pub async fn cleanup(&self, force: bool) -> Result<CleanupReport, DeployError> {
        let lock = DeployLock::acquire(&self.state_dir, &self.project, force)?;
        let mut diagnostics = Diagnostics::default();
        let live = self
            .current_state(&mut diagnostics)
            .await?
            .active_color
            .ok_or(DeployError::NothingLive)?;

        let idle = live.other();
        tracing::info!(color = %idle, state = %EnvironmentState::Draining, "stopping idle environment");
        let stopped = self.deployer.stop(idle).await?.then_some(idle);

        if let Err(e) = lock.release() {
            tracing::warn!("failed to release deploy lock: {}", e);
        }
        Ok(CleanupReport { live, stopped })
    }

    /// Write both colors' compose files without starting anything.
    pub fn init(&self) -> Result<Vec<(Color, PathBuf)>, DeployError> {
        Ok(write_color_configs(
            &self.topology,
            &self.project,
            &self.plan,
            &self.state_dir,
        )?)
    }

    fn rollback_controller(&self) -> RollbackController<'_, R, P, Q> {
        RollbackController::new(&self.deployer, &self.checker, &self.health, &self.switcher)
    }

    /// The stored record, or one reconstructed from running containers when
    /// the state file is missing. Both colors running is refused.
    async fn current_state(
        &self,
        diagnostics: &mut Diagnostics,
    ) -> Result<DeploymentStateRecord, DeployError> {
        if let Some(state) = self.switcher.store().read()? {
            return Ok(state);
        }

        match StateStore::infer_from_runtime(&self.deployer).await? {
            Reconciliation::Single(color) => {
                diagnostics.warn(Warning::reconciled(format!(
                    "no state record; treating the running {color} environment as live"
                )));
                Ok(DeploymentStateRecord {
                    active_color: Some(color),
                    ..DeploymentStateRecord::default()
                })
            }
            Reconciliation::Neither => Ok(DeploymentStateRecord::default()),
            Reconciliation::Both => Err(DeployError::Inconsistent(
                "state record missing and both blue and green are running; \
                 confirm the live color with `bascule switch <color>`"
                    .to_string(),
            )),
        }
    }

    /// Record, run closing hooks, release the lock and notify. Failures
    /// here become warnings; the outcome is already decided.
    async fn finish(
        &self,
        mut cycle: Cycle,
        outcome: CycleOutcome,
        reason: Option<String>,
        lock: DeployLock,
    ) -> CycleReport {
        let elapsed = cycle.started.elapsed();
        let record = DeploymentRecord {
            id: cycle.id.clone(),
            timestamp: Utc::now(),
            source: cycle.source,
            target: cycle.target,
            outcome: outcome.history(cycle.kind),
            reason,
            duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            images: std::mem::take(&mut cycle.images),
        };

        match outcome {
            CycleOutcome::Committed => {
                tracing::info!(deployment = %record.id, target = %record.target, "cycle committed")
            }
            CycleOutcome::Aborted | CycleOutcome::RolledBack => tracing::warn!(
                deployment = %record.id,
                %outcome,
                "cycle did not commit: {}",
                record.reason.as_deref().unwrap_or("unknown")
            ),
            CycleOutcome::Terminal => tracing::error!(
                deployment = %record.id,
                "manual intervention required: {}",
                record.reason.as_deref().unwrap_or("unknown")
            ),
        }

        if let Err(e) = self.history.append(&record) {
            cycle
                .diagnostics
                .warn(Warning::history(format!("failed to append history: {e}")));
        }

        if cycle.kind == CycleKind::Deploy {
            let point = if outcome == CycleOutcome::Committed {
                HookPoint::PostDeploy
            } else {
                HookPoint::OnError
            };
            let context = cycle.hook_context(&self.project);
            if let Some(result) = self.hooks.run(point, &context).await
                && !result.success
            {
                cycle
                    .diagnostics
                    .warn(Warning::hook(hook_failure(point, &result)));
            }
        }

        if let Err(e) = lock.release() {
            cycle.diagnostics.warn(Warning::lock_release(e.to_string()));
        }

        // The next cycle may start while the webhook is still in flight.
        if let Some(ref notifier) = self.notifier
            && let Err(e) = notifier.send(&record).await
        {
            cycle
                .diagnostics
                .warn(Warning::notify(format!("webhook not delivered: {e}")));
        }

        CycleReport {
            kind: cycle.kind,
            outcome,
            record,
            snapshot: cycle.snapshot,
            health: cycle.health,
            switch: cycle.switch,
            rollback: cycle.rollback,
            warnings: cycle.diagnostics,
        }
    }
}

fn hook_failure(point: HookPoint, result: &HookResult) -> String {
    let code = result
        .exit_code
        .map(|c| c.to_string())
        .unwrap_or_else(|| "signal".to_string());
    let detail = result.stderr.lines().rfind(|l| !l.trim().is_empty());
    match detail {
        Some(detail) => format!("{} hook failed (exit {}): {}", point.name(), code, detail.trim()),
        None => format!("{} hook failed (exit {})", point.name(), code),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_distinguish_outcomes() {
        assert_eq!(CycleOutcome::Committed.exit_code(), 0);
        assert_eq!(CycleOutcome::Aborted.exit_code(), 1);
        assert_eq!(CycleOutcome::RolledBack.exit_code(), 2);
        assert_eq!(CycleOutcome::Terminal.exit_code(), 3);
    }

    #[test]
    fn manual_rollback_is_recorded_as_rolled_back() {
        assert_eq!(
            CycleOutcome::Committed.history(CycleKind::Rollback),
            Outcome::RolledBack
        );
        assert_eq!(
            CycleOutcome::Committed.history(CycleKind::Deploy),
            Outcome::Success
        );
        assert_eq!(
            CycleOutcome::Terminal.history(CycleKind::Deploy),
            Outcome::Failed
        );
    }

    #[test]
    fn hook_failure_names_the_hook_and_last_stderr_line() {
        let result = HookResult {
            success: false,
            exit_code: Some(2),
            stdout: String::new(),
            stderr: "dumping\npg_dump: connection refused\n".to_string(),
        };
        assert_eq!(
            hook_failure(HookPoint::PreDeploy, &result),
            "pre-deploy hook failed (exit 2): pg_dump: connection refused"
        );
    }

    #[test]
    fn deployment_ids_are_unique_within_a_process() {
        let first = deployment_id();
        let second = deployment_id();
        assert!(first.contains(&format!("-{}-", std::process::id())));
        assert_ne!(first, second);
    }
}
