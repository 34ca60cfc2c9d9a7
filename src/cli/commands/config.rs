//! Implementation of the `stablerun config` command.

use anyhow::{Context, Result};

use crate::cli::output::print_stdout;
use crate::domain::models::Config;

/// Print the effective configuration as YAML, or JSON in JSON mode.
pub fn execute(config: &Config, json_mode: bool) -> Result<()> {
    let rendered = if json_mode {
        serde_json::to_string_pretty(config).context("Failed to render configuration")?
    } else {
        serde_yaml::to_string(config).context("Failed to render configuration")?
    };
    print_stdout(rendered.trim_end());
    Ok(())
}
