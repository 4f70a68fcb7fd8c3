// ABOUTME: Deploy command implementation.
// ABOUTME: Runs one full cycle; Ctrl-C aborts it and, once traffic moved, restores the router.

use bascule::config::Config;
use bascule::error::Result;
use bascule::output::Output;

use super::context::{interrupted, orchestrator, print_cycle};

pub async fn deploy(config: &Config, force: bool, mut output: Output) -> Result<i32> {
    output.start_timer();
    let orchestrator = orchestrator(config)?;

    output.progress(&format!("Deploying {}", config.project));
    let report = orchestrator.deploy(force, interrupted()).await?;
    Ok(print_cycle(&output, &report))
}
