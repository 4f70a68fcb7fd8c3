// ABOUTME: Shared wiring for commands: config loading, the real orchestrator, interrupts.
// ABOUTME: Also renders finished cycles, which deploy, switch and rollback share.

use std::env;
use std::path::Path;

use bascule::config::Config;
use bascule::deploy::{CycleKind, CycleOutcome, CycleReport, Orchestrator};
use bascule::error::Result;
use bascule::health::HttpProbe;
use bascule::output::Output;
use bascule::router::ProxyCommand;
use bascule::runtime::ComposeCli;
use bascule::topology::PortMap;

pub type CliOrchestrator = Orchestrator<ComposeCli, ProxyCommand, HttpProbe>;

pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let cwd = env::current_dir()?;
    Config::resolve(&cwd, explicit)
}

pub fn orchestrator(config: &Config) -> Result<CliOrchestrator> {
    let runtime = config.runtime_type();
    tracing::debug!(%runtime, "using container runtime");
    Orchestrator::new(
        config,
        ComposeCli::new(runtime),
        ProxyCommand::from_settings(&config.router),
        HttpProbe::new(),
    )
}

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
pub async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
    tracing::warn!("interrupt received, aborting");
}

/// Print a finished cycle and return its exit code.
pub fn print_cycle(output: &Output, report: &CycleReport) -> i32 {
    output.data("cycle", report);

    if let Some(ref snapshot) = report.snapshot {
        output.progress(&format!("  backup snapshot: {snapshot}"));
    }
    if let Some(ref health) = report.health {
        let verdict = if health.passed() { "passed" } else { "failed" };
        output.progress(&format!(
            "  health check on {} {} after {} attempt(s)",
            health.color, verdict, health.attempts
        ));
    }
    if let Some(ref switch) = report.switch {
        let path: Vec<String> = switch.history.iter().map(ToString::to_string).collect();
        output.progress(&format!("  switch {}: {}", switch.id, path.join(" -> ")));
    }
    if let Some(ref rollback) = report.rollback {
        output.progress(&format!("  traffic returned to {}", rollback.target));
    }
    output.warnings(&report.warnings);

    let record = &report.record;
    let label = match report.kind {
        CycleKind::Deploy => "deployment",
        CycleKind::Switch => "switch",
        CycleKind::Rollback => "rollback",
    };
    let reason = record.reason.as_deref().unwrap_or("no reason recorded");

    match report.outcome {
        CycleOutcome::Committed => {
            output.success(&format!("{} is live ({} {})", record.target, label, record.id))
        }
        CycleOutcome::Aborted => output.failure(&format!(
            "{} {} aborted: {}; traffic unchanged",
            label, record.id, reason
        )),
        CycleOutcome::RolledBack => output.failure(&format!(
            "{} {} rolled back: {}",
            label, record.id, reason
        )),
        CycleOutcome::Terminal => output.failure(&format!(
            "{} {} needs manual intervention: {}",
            label, record.id, reason
        )),
    }
    report.exit_code()
}

pub fn format_ports(ports: &PortMap) -> String {
    let parts: Vec<String> = [
        ("frontend", ports.frontend),
        ("backend", ports.backend),
        ("http", ports.proxy_http),
        ("https", ports.proxy_https),
    ]
    .into_iter()
    .filter_map(|(name, port)| port.map(|p| format!("{name} {p}")))
    .collect();

    if parts.is_empty() {
        "-".to_string()
    } else {
        parts.join(", ")
    }
}
