// ABOUTME: Cleanup command implementation.
// ABOUTME: Stops the idle color once the live one no longer needs a rollback target.

use bascule::config::Config;
use bascule::error::Result;
use bascule::output::Output;

use super::context::orchestrator;

pub async fn cleanup(config: &Config, force: bool, mut output: Output) -> Result<i32> {
    output.start_timer();
    let report = orchestrator(config)?.cleanup(force).await?;
    output.data("cleanup", &report);

    match report.stopped {
        Some(color) => output.success(&format!("stopped {}; {} stays live", color, report.live)),
        None => output.success(&format!(
            "{} was not running; {} stays live",
            report.live.other(),
            report.live
        )),
    }
    Ok(0)
}
