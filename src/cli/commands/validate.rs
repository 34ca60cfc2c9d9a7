//! Implementation of the `stablerun validate` command.

use clap::Args;

use super::run::RunOverrides;
use crate::domain::models::{Config, ExecutionMode};

#[derive(Args, Debug, Default, Clone)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub overrides: RunOverrides,

    /// Run validators in parallel or sequentially
    #[arg(short, long, value_name = "MODE")]
    pub mode: Option<ExecutionMode>,

    /// In sequential mode, skip remaining validators after a failure
    #[arg(long)]
    pub stop_on_failure: bool,

    /// Only run the configured checks, not the test tool
    #[arg(long)]
    pub skip_tool: bool,

    /// Arguments forwarded verbatim to the test tool (after `--`)
    #[arg(last = true, value_name = "TOOL_ARGS")]
    pub tool_args: Vec<String>,
}

impl ValidateArgs {
    pub fn apply(&self, config: &mut Config) {
        self.overrides.apply(config);
        if let Some(mode) = self.mode {
            config.validation.mode = mode;
        }
        if self.stop_on_failure {
            config.validation.stop_on_first_failure = true;
        }
        if self.skip_tool {
            config.validation.include_tool = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_only_tighten_config() {
        let mut config = Config::default();
        config.validation.stop_on_first_failure = true;

        ValidateArgs::default().apply(&mut config);
        assert!(config.validation.stop_on_first_failure);
        assert!(config.validation.include_tool);

        let args = ValidateArgs {
            mode: Some(ExecutionMode::Sequential),
            skip_tool: true,
            ..ValidateArgs::default()
        };
        args.apply(&mut config);
        assert_eq!(config.validation.mode, ExecutionMode::Sequential);
        assert!(!config.validation.include_tool);
    }
}
