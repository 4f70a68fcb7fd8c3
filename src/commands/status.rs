// ABOUTME: Status command implementation.
// ABOUTME: Shows the live color, both environments and the last recorded cycle.

use bascule::config::Config;
use bascule::error::Result;
use bascule::output::{Output, OutputMode};

use super::context::{format_ports, orchestrator};

pub async fn status(config: &Config, output: Output) -> Result<i32> {
    let report = orchestrator(config)?.status().await?;
    if output.mode() == OutputMode::Json {
        output.data("status", &report);
        return Ok(0);
    }

    let live = report
        .active_color
        .map(|c| c.to_string())
        .unwrap_or_else(|| "none".to_string());
    let inferred = if report.inferred {
        " (inferred from running containers)"
    } else {
        ""
    };
    output.success(&format!("{}: live color {}{}", report.project, live, inferred));

    if let Some(previous) = report.previous_color {
        output.progress(&format!("  previous: {previous}"));
    }
    if let Some(at) = report.last_transition {
        output.progress(&format!("  switched: {}", at.to_rfc3339()));
    }
    for env in &report.environments {
        let services = if env.running_services.is_empty() {
            "-".to_string()
        } else {
            env.running_services.join(", ")
        };
        output.progress(&format!(
            "  {:<6} {:<10} ports: {}  running: {}",
            env.color.to_string(),
            env.state.to_string(),
            format_ports(&env.ports),
            services
        ));
    }
    if let Some(ref last) = report.last_deployment {
        let source = last.source.map(|c| c.to_string()).unwrap_or_else(|| "none".to_string());
        output.progress(&format!(
            "  last cycle: {} {} -> {} {}",
            last.id, source, last.target, last.outcome
        ));
    }
    Ok(0)
}
