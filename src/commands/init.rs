// ABOUTME: Init command implementation.
// ABOUTME: Scaffolds bascule.yml when missing, then (re)generates both color compose files.

use std::env;
use std::path::Path;

use bascule::config::{Config, init_config};
use bascule::error::Result;
use bascule::output::Output;

use super::context::orchestrator;

pub fn init(
    explicit: Option<&Path>,
    project: Option<&str>,
    force: bool,
    output: Output,
) -> Result<i32> {
    let cwd = env::current_dir()?;

    let existing = explicit.map(Path::to_path_buf).or_else(|| Config::find(&cwd));
    match existing {
        Some(ref path) if !force || explicit.is_some() => {
            if project.is_some() {
                output.warning("--project ignored; edit the existing config instead");
            }
            output.progress(&format!("Using {}", path.display()));
        }
        _ => {
            let path = init_config(&cwd, project, force)?;
            output.progress(&format!("Wrote {}", path.display()));
        }
    }

    let config = Config::resolve(&cwd, explicit)?;
    let written = orchestrator(&config)?.init()?;
    output.data("init", &written);
    for (color, path) in &written {
        output.progress(&format!("  {}: {}", color, path.display()));
    }
    output.success(&format!(
        "Generated blue and green compose files for {}",
        config.project
    ));
    Ok(0)
}
