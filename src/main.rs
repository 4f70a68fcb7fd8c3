// ABOUTME: Entry point for the bascule CLI application.
// ABOUTME: Parses arguments, sets up logging and maps command results to exit codes.

mod cli;
mod commands;

use clap::Parser;
use cli::Cli;
use tracing_subscriber::EnvFilter;

use bascule::output::Output;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // --verbose wins over RUST_LOG; otherwise default to warnings only
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mode = cli.output_mode();
    let code = match commands::run(cli).await {
        Ok(code) => code,
        Err(e) => {
            Output::new(mode).error(&e.to_string());
            1
        }
    };
    std::process::exit(code);
}
