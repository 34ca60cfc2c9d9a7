//! Command-line interface.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::run::RunArgs;
use commands::validate::ValidateArgs;

#[derive(Parser, Debug)]
#[command(name = "stablerun")]
#[command(about = "Stable runner for flaky external test tools", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration file to use instead of .stablerun/config.yaml
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the test tool under supervision, retrying failed runs
    Run(RunArgs),

    /// Run the test tool and every configured check, then report
    Validate(ValidateArgs),

    /// Print the effective configuration
    Config,
}

/// Print `err` the way the selected output mode expects.
pub fn handle_error(err: &anyhow::Error, json_mode: bool) {
    if json_mode {
        let payload = serde_json::json!({
            "success": false,
            "error": format!("{err:#}"),
        });
        output::print_stdout(&serde_json::to_string_pretty(&payload).unwrap_or_default());
    } else {
        output::print_stderr(&format!("Error: {err:#}"));
    }
}
