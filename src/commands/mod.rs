// ABOUTME: Command module aggregator for the bascule CLI.
// ABOUTME: Dispatches parsed subcommands and returns the process exit code.

mod cleanup;
mod context;
mod deploy;
mod health;
mod init;
mod rollback;
mod status;
mod switch;

use bascule::error::Result;
use bascule::output::Output;

use crate::cli::{Cli, Commands};
use context::load_config;

/// Run one subcommand. `Ok` carries the exit code; errors exit 1.
pub async fn run(cli: Cli) -> Result<i32> {
    let output = Output::new(cli.output_mode());
    let explicit = cli.config.as_deref();

    match cli.command {
        Commands::Deploy { force } => deploy::deploy(&load_config(explicit)?, force, output).await,
        Commands::Status => status::status(&load_config(explicit)?, output).await,
        Commands::Switch { color, force } => {
            switch::switch(&load_config(explicit)?, color, force, output).await
        }
        Commands::Rollback { force } => {
            rollback::rollback(&load_config(explicit)?, force, output).await
        }
        Commands::Health { color } => health::health(&load_config(explicit)?, color, output).await,
        Commands::Cleanup { force } => cleanup::cleanup(&load_config(explicit)?, force, output).await,
        Commands::Init { project, force } => init::init(explicit, project.as_deref(), force, output),
    }
}
