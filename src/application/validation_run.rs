use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use crate::domain::errors::DomainResult;
use crate::domain::models::{Config, ValidationReport};
use crate::domain::ports::{CleanupHook, ProcessRunner};
use crate::infrastructure::process::{
    LineClassifier, ProcessCleanup, ProcessSupervisor, ProcessTracker, SupervisorSettings,
};
use crate::infrastructure::validators::build_registry;
use crate::services::{
    PersistOutcome, ReportAggregator, RetryPolicy, SignalCoordinator, ValidationOrchestrator,
};

/// Result of one validation run, after its artifacts were written.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub report: ValidationReport,
    pub persisted: PersistOutcome,
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        self.report.overall_exit_code
    }
}

/// Wires configuration into the supervision tree for one process.
///
/// # Ownership
///
/// - The tracker is shared by every supervisor this run creates and by the
///   signal coordinator, so a shutdown reaches all live children.
/// - The cleanup hook is shared by the retry policy (between attempts)
///   and the coordinator (during shutdown).
/// - Configuration is read once here and passed down by value; nothing
///   below re-reads it.
pub struct ValidationRun {
    config: Config,
    tracker: Arc<ProcessTracker>,
    cleanup: Arc<dyn CleanupHook>,
    coordinator: Arc<SignalCoordinator>,
    display: bool,
}

impl ValidationRun {
    pub fn new(config: Config) -> Self {
        let tracker = Arc::new(ProcessTracker::new());
        let cleanup: Arc<dyn CleanupHook> = Arc::new(
            ProcessCleanup::from_config(&config.cleanup).with_tracker(Arc::clone(&tracker)),
        );
        Self::assemble(config, tracker, cleanup)
    }

    /// Use `cleanup` instead of the configured process cleanup.
    pub fn with_cleanup(config: Config, cleanup: Arc<dyn CleanupHook>) -> Self {
        Self::assemble(config, Arc::new(ProcessTracker::new()), cleanup)
    }

    fn assemble(
        config: Config,
        tracker: Arc<ProcessTracker>,
        cleanup: Arc<dyn CleanupHook>,
    ) -> Self {
        let coordinator = Arc::new(SignalCoordinator::new(
            Arc::clone(&tracker),
            Arc::clone(&cleanup),
            config.supervisor.grace_period(),
        ));
        let display = config.output.display;

        Self {
            config,
            tracker,
            cleanup,
            coordinator,
            display,
        }
    }

    /// Forward important tool lines to stdout (defaults to `output.display`).
    #[must_use]
    pub fn display(mut self, enabled: bool) -> Self {
        self.display = enabled;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn tracker(&self) -> &Arc<ProcessTracker> {
        &self.tracker
    }

    pub fn coordinator(&self) -> &Arc<SignalCoordinator> {
        &self.coordinator
    }

    /// Route SIGINT, SIGTERM and SIGQUIT to the coordinator.
    pub fn install_signal_handlers(&self) -> DomainResult<JoinHandle<()>> {
        self.coordinator.install()
    }

    fn supervisor(&self) -> Result<ProcessSupervisor> {
        let classifier = LineClassifier::new(
            &self.config.output.important_patterns,
            &self.config.output.noise_patterns,
        )
        .context("Invalid output classification pattern")?;

        let supervisor = ProcessSupervisor::new(
            SupervisorSettings::from_config(&self.config),
            Arc::new(classifier),
            Arc::clone(&self.tracker),
        );
        Ok(if self.display {
            supervisor.with_stdout_display()
        } else {
            supervisor
        })
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from_config(&self.config.retry, Arc::clone(&self.cleanup))
            .with_shutdown(self.coordinator.shutdown_flag())
    }

    /// Register the configured validators, run them, and persist the report.
    ///
    /// `passthrough` is appended verbatim to the test tool's arguments.
    ///
    /// # Errors
    /// Only orchestration failures are returned (invalid patterns, duplicate
    /// validator names, report rendering). Validator failures are part of
    /// the report.
    #[instrument(skip(self, passthrough), fields(mode = self.config.validation.mode.as_str()))]
    pub async fn execute(&self, passthrough: &[String]) -> Result<RunOutcome> {
        let runner: Arc<dyn ProcessRunner> = Arc::new(self.supervisor()?);
        let registry = build_registry(
            &self.config,
            passthrough,
            self.config.validation.include_tool,
            runner,
            self.retry_policy(),
        )
        .context("Failed to register validators")?;

        if registry.is_empty() {
            warn!("No validators configured; the report will be empty");
        }
        info!(validators = ?registry.names(), "Starting validation run");

        let orchestrator = ValidationOrchestrator::new()
            .stop_on_first_failure(self.config.validation.stop_on_first_failure)
            .with_shutdown(self.coordinator.shutdown_flag());
        let report = orchestrator
            .run(&registry, self.config.validation.mode)
            .await;

        let persisted = ReportAggregator::persist(&report, &self.config.report)
            .await
            .context("Failed to generate validation report")?;

        Ok(RunOutcome { report, persisted })
    }
}
