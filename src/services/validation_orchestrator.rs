//! Runs validator units and merges their results into one report.

use futures::future::join_all;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

use crate::domain::models::{ExecutionMode, ValidationReport, ValidatorResult};
use crate::domain::ports::Validator;
use crate::services::report_aggregator::{AggregationContext, ReportAggregator};
use crate::services::signal_coordinator::ShutdownFlag;
use crate::services::validator_registry::ValidatorRegistry;

/// Schedules validator units in parallel or in sequence.
///
/// A unit that returns `Err` or panics becomes a failed result carrying
/// the message as its only error; sibling units are unaffected.
#[derive(Debug, Clone, Default)]
pub struct ValidationOrchestrator {
    stop_on_first_failure: bool,
    shutdown: Option<ShutdownFlag>,
}

impl ValidationOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// In sequential mode, skip the remaining units after the first failure.
    #[must_use]
    pub fn stop_on_first_failure(mut self, stop: bool) -> Self {
        self.stop_on_first_failure = stop;
        self
    }

    /// In sequential mode, start no further units once `flag` is raised.
    #[must_use]
    pub fn with_shutdown(mut self, flag: ShutdownFlag) -> Self {
        self.shutdown = Some(flag);
        self
    }

    #[instrument(skip(self, registry), fields(units = registry.len(), mode = mode.as_str()))]
    pub async fn run(&self, registry: &ValidatorRegistry, mode: ExecutionMode) -> ValidationReport {
        let started = Instant::now();

        let (results, skipped) = match mode {
            ExecutionMode::Parallel => (self.run_parallel(registry).await, Vec::new()),
            ExecutionMode::Sequential => self.run_sequential(registry).await,
        };

        let report = ReportAggregator::aggregate_with(
            results,
            AggregationContext {
                mode,
                skipped,
                duration: started.elapsed(),
            },
        );

        info!(
            passed = report.passed,
            warned = report.warned,
            failed = report.failed,
            skipped = report.skipped.len(),
            exit_code = report.overall_exit_code,
            "Validation run complete"
        );
        report
    }

    async fn run_parallel(&self, registry: &ValidatorRegistry) -> Vec<ValidatorResult> {
        // join_all yields in input order, whatever order the units finish in
        join_all(registry.iter().map(|v| invoke(Arc::clone(v)))).await
    }

    async fn run_sequential(
        &self,
        registry: &ValidatorRegistry,
    ) -> (Vec<ValidatorResult>, Vec<String>) {
        let mut results = Vec::with_capacity(registry.len());
        let mut skipped = Vec::new();
        let mut halted = false;

        for validator in registry.iter() {
            if halted {
                skipped.push(validator.name().to_string());
                continue;
            }
            if self.shutdown.as_ref().is_some_and(ShutdownFlag::is_raised) {
                warn!(validator = validator.name(), "Shutdown requested, skipping");
                halted = true;
                skipped.push(validator.name().to_string());
                continue;
            }

            let result = invoke(Arc::clone(validator)).await;
            if !result.success && self.stop_on_first_failure {
                warn!(validator = %result.name, "Stopping after first failure");
                halted = true;
            }
            results.push(result);
        }

        (results, skipped)
    }
}

/// Run one unit, converting errors and panics into a failed result.
async fn invoke(validator: Arc<dyn Validator>) -> ValidatorResult {
    let name = validator.name().to_string();
    let started = Instant::now();
    info!(validator = %name, "Running validator");

    let outcome = AssertUnwindSafe(validator.validate()).catch_unwind().await;
    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    let mut result = match outcome {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => {
            warn!(validator = %name, error = %e, "Validator returned an error");
            ValidatorResult::failed(&name, format!("{e:#}"))
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!(validator = %name, panic = %message, "Validator panicked");
            ValidatorResult::failed(&name, format!("validator panicked: {message}"))
        }
    };

    result.name = name;
    result.duration_ms = elapsed_ms;
    result
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
