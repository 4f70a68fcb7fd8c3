// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use bascule::output::OutputMode;
use bascule::types::Color;

#[derive(Parser)]
#[command(name = "bascule")]
#[command(about = "Blue-green deployments for compose stacks behind a reverse proxy")]
#[command(version)]
pub struct Cli {
    /// Show debug logs
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print only the final result
    #[arg(short, long, global = true, conflicts_with = "json")]
    pub quiet: bool,

    /// Emit JSON lines instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Config file (default: bascule.yml in the current directory)
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn output_mode(&self) -> OutputMode {
        if self.json {
            OutputMode::Json
        } else if self.quiet {
            OutputMode::Quiet
        } else {
            OutputMode::Normal
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Deploy the latest images to the idle color and switch traffic to it
    Deploy {
        /// Break an existing deploy lock
        #[arg(long)]
        force: bool,
    },

    /// Show the live color and the state of both environments
    Status,

    /// Point traffic at an already running, healthy color
    Switch {
        /// Target color (blue or green)
        color: Color,

        /// Break an existing deploy lock
        #[arg(long)]
        force: bool,
    },

    /// Return traffic to the previously live color
    Rollback {
        /// Break an existing deploy lock
        #[arg(long)]
        force: bool,
    },

    /// Health check a color (default: the live one)
    Health {
        color: Option<Color>,
    },

    /// Stop the environment that is not live
    Cleanup {
        /// Break an existing deploy lock
        #[arg(long)]
        force: bool,
    },

    /// Write a starter bascule.yml and generate both color compose files
    Init {
        /// Project name used for compose namespaces
        #[arg(short, long)]
        project: Option<String>,

        /// Overwrite an existing bascule.yml
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_switch_color() {
        let cli = Cli::try_parse_from(["bascule", "switch", "green", "--force"]).unwrap();
        match cli.command {
            Commands::Switch { color, force } => {
                assert_eq!(color, Color::Green);
                assert!(force);
            }
            _ => panic!("expected switch"),
        }
    }

    #[test]
    fn rejects_unknown_color() {
        assert!(Cli::try_parse_from(["bascule", "switch", "red"]).is_err());
    }

    #[test]
    fn json_wins_output_mode() {
        let cli = Cli::try_parse_from(["bascule", "--json", "status"]).unwrap();
        assert_eq!(cli.output_mode(), OutputMode::Json);
    }
}
