//! Implementation of the `stablerun run` command.

use clap::Args;

use crate::domain::models::{Config, ReportFormat};

/// Overrides shared by `run` and `validate`.
#[derive(Args, Debug, Default, Clone)]
pub struct RunOverrides {
    /// Maximum attempts for the test tool (overrides retry.max_attempts)
    #[arg(short, long, value_name = "N")]
    pub retries: Option<u32>,

    /// Per-run timeout in seconds (overrides supervisor.timeout_secs)
    #[arg(short, long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Delay between attempts in milliseconds (overrides retry.delay_ms)
    #[arg(long, value_name = "MS")]
    pub delay_ms: Option<u64>,

    /// What to print when the run finishes: json, human or both
    #[arg(long, value_name = "FORMAT")]
    pub report_format: Option<ReportFormat>,
}

impl RunOverrides {
    pub fn apply(&self, config: &mut Config) {
        if let Some(retries) = self.retries {
            config.retry.max_attempts = retries;
        }
        if let Some(timeout) = self.timeout {
            config.supervisor.timeout_secs = timeout;
        }
        if let Some(delay_ms) = self.delay_ms {
            config.retry.delay_ms = delay_ms;
        }
        if let Some(format) = self.report_format {
            config.report.format = format;
        }
    }
}

#[derive(Args, Debug, Default, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub overrides: RunOverrides,

    /// Arguments forwarded verbatim to the test tool (after `--`)
    #[arg(last = true, value_name = "TOOL_ARGS")]
    pub tool_args: Vec<String>,
}

impl RunArgs {
    /// The stable runner: only the test tool, never the configured checks.
    pub fn apply(&self, config: &mut Config) {
        self.overrides.apply(config);
        config.validation.include_tool = true;
        config.validation.checks.clear();
    }
}
