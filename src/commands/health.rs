// ABOUTME: Health command implementation.
// ABOUTME: Prints per-endpoint results of the last attempt and exits 1 on any failure.

use bascule::config::Config;
use bascule::error::Result;
use bascule::output::Output;
use bascule::types::Color;

use super::context::orchestrator;

pub async fn health(config: &Config, color: Option<Color>, mut output: Output) -> Result<i32> {
    output.start_timer();
    let verdicts = orchestrator(config)?.health(color).await?;
    output.data("health", &verdicts);

    let mut healthy = true;
    for verdict in &verdicts {
        for result in verdict.results.iter().filter(|r| r.attempt == verdict.attempts) {
            output.progress(&format!(
                "  {} {:<16} {} ({})",
                verdict.color, result.endpoint, result.url, result.status
            ));
        }
        if verdict.passed() {
            output.success(&format!(
                "{} is healthy ({} attempt(s))",
                verdict.color, verdict.attempts
            ));
        } else {
            healthy = false;
            output.failure(&format!(
                "{} is unhealthy: {}",
                verdict.color,
                verdict.failure_summary()
            ));
        }
    }

    Ok(if healthy { 0 } else { 1 })
}
