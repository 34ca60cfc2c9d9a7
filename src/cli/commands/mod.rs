//! CLI command implementations.

pub mod config;
pub mod run;
pub mod validate;

use anyhow::anyhow;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, warn};

use super::output::{output, print_stderr, CommandOutput};
use super::{handle_error, Cli, Commands};
use crate::application::{RunOutcome, ValidationRun};
use crate::domain::models::{Config, ReportFormat, ValidationReport};
use crate::infrastructure::config::ConfigLoader;
use crate::infrastructure::logging::Logger;
use crate::services::{ReportAggregator, ShutdownTrigger, SignalCoordinator};

/// Execute the parsed command line and return the process exit code.
pub async fn dispatch(cli: Cli) -> i32 {
    let json = cli.json;

    let (config, passthrough) = match resolve_config(&cli) {
        Ok(resolved) => resolved,
        Err(err) => {
            handle_error(&err, json);
            return 1;
        }
    };

    let _logger = match Logger::init(&config.logging) {
        Ok(logger) => Some(logger),
        Err(err) => {
            print_stderr(&format!("Warning: logging disabled: {err:#}"));
            None
        }
    };

    match cli.command {
        Commands::Config => match self::config::execute(&config, json) {
            Ok(()) => 0,
            Err(err) => {
                handle_error(&err, json);
                1
            }
        },
        Commands::Run(_) | Commands::Validate(_) => supervise(config, passthrough, json).await,
    }
}

/// Merge config files and environment, layer the command-line overrides
/// on top, then validate the result once.
///
/// Returns the config together with the tool's passthrough arguments.
fn resolve_config(cli: &Cli) -> anyhow::Result<(Config, Vec<String>)> {
    let mut config = ConfigLoader::load_unvalidated(cli.config.as_deref())?;

    let passthrough = match &cli.command {
        Commands::Run(args) => {
            args.apply(&mut config);
            args.tool_args.clone()
        }
        Commands::Validate(args) => {
            args.apply(&mut config);
            args.tool_args.clone()
        }
        Commands::Config => Vec::new(),
    };

    ConfigLoader::validate(&config)?;
    Ok((config, passthrough))
}

/// Run the validation inside a spawned task so that an orchestration error
/// or panic still shuts down every tracked child before exiting.
async fn supervise(config: Config, passthrough: Vec<String>, json: bool) -> i32 {
    let format = if json { ReportFormat::Json } else { config.report.format };
    let display = config.output.display && format != ReportFormat::Json;
    let run = Arc::new(ValidationRun::new(config).display(display));

    if let Err(err) = run.install_signal_handlers() {
        handle_error(&anyhow::Error::from(err), json);
        return 1;
    }
    let coordinator = Arc::clone(run.coordinator());

    let task = {
        let run = Arc::clone(&run);
        tokio::spawn(async move { run.execute(&passthrough).await })
    };

    let result = match task.await {
        Ok(result) => result,
        Err(join_err) => Err(anyhow!("orchestration task failed: {join_err}")),
    };

    // A signal-driven shutdown decides the exit status
    if let Some(code) = coordinator.wait_for_shutdown().await {
        return code;
    }

    match result {
        Ok(outcome) => {
            output(&RunReport::new(&outcome, format), format == ReportFormat::Json);
            outcome.exit_code()
        }
        Err(err) => fatal(&coordinator, err, json).await,
    }
}

async fn fatal(coordinator: &SignalCoordinator, err: anyhow::Error, json: bool) -> i32 {
    error!(error = %format!("{err:#}"), "Orchestration failed, shutting down");
    match coordinator.shutdown(ShutdownTrigger::FatalError).await {
        Some(report) if !report.killed.is_empty() => {
            warn!(killed = ?report.killed, "Force-killed processes during fatal shutdown");
        }
        _ => {}
    }
    handle_error(&err, json);
    ShutdownTrigger::FatalError.exit_code()
}

/// What `run` and `validate` print once the report is persisted.
#[derive(Debug, Serialize)]
struct RunReport<'a> {
    #[serde(flatten)]
    report: &'a ValidationReport,
    #[serde(skip)]
    summary: String,
    #[serde(skip)]
    artifacts: Vec<String>,
}

impl<'a> RunReport<'a> {
    fn new(outcome: &'a RunOutcome, format: ReportFormat) -> Self {
        let mut artifacts = Vec::new();
        if format == ReportFormat::Both {
            if let Some(path) = &outcome.persisted.json_written {
                artifacts.push(format!("Report written to {}", path.display()));
            }
            if let Some(path) = &outcome.persisted.summary_written {
                artifacts.push(format!("Summary written to {}", path.display()));
            }
        }
        artifacts.extend(
            outcome
                .persisted
                .failures
                .iter()
                .map(|failure| format!("Could not write {failure}")),
        );

        Self {
            report: &outcome.report,
            summary: ReportAggregator::render_summary(&outcome.report),
            artifacts,
        }
    }
}

impl CommandOutput for RunReport<'_> {
    fn to_human(&self) -> String {
        let mut text = self.summary.trim_end().to_string();
        for line in &self.artifacts {
            text.push('\n');
            text.push_str(line);
        }
        text
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self.report).unwrap_or_default()
    }
}
