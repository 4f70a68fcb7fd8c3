// ABOUTME: Rollback command implementation.
// ABOUTME: Returns traffic to the previous color without redeploying it.

use bascule::config::Config;
use bascule::error::Result;
use bascule::output::Output;

use super::context::{orchestrator, print_cycle};

pub async fn rollback(config: &Config, force: bool, mut output: Output) -> Result<i32> {
    output.start_timer();
    let orchestrator = orchestrator(config)?;

    output.progress(&format!("Rolling back {}", config.project));
    let report = orchestrator.rollback(force).await?;
    Ok(print_cycle(&output, &report))
}
