// ABOUTME: Switch command implementation.
// ABOUTME: Manual traffic override to a color that is already running.

use bascule::config::Config;
use bascule::error::Result;
use bascule::output::Output;
use bascule::types::Color;

use super::context::{interrupted, orchestrator, print_cycle};

pub async fn switch(config: &Config, color: Color, force: bool, mut output: Output) -> Result<i32> {
    output.start_timer();
    let orchestrator = orchestrator(config)?;

    output.progress(&format!("Switching {} to {}", config.project, color));
    let report = orchestrator.switch_to(color, force, interrupted()).await?;
    Ok(print_cycle(&output, &report))
}
