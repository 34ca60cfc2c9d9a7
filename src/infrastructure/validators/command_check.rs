//! Command checks: configured commands run once as validator units.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

use super::tool::stderr_context;
use crate::domain::models::{CheckConfig, CommandSpec, ValidatorResult};
use crate::domain::ports::{ProcessRunner, Validator};

/// Runs one command through the supervisor, without retries.
pub struct CommandCheckValidator {
    name: String,
    spec: CommandSpec,
    timeout: Duration,
    allow_failure: bool,
    runner: Arc<dyn ProcessRunner>,
}

impl CommandCheckValidator {
    pub fn new(
        name: impl Into<String>,
        spec: CommandSpec,
        timeout: Duration,
        runner: Arc<dyn ProcessRunner>,
    ) -> Self {
        Self {
            name: name.into(),
            spec,
            timeout,
            allow_failure: false,
            runner,
        }
    }

    /// `default_timeout` applies when the check sets none.
    pub fn from_config(
        check: &CheckConfig,
        default_timeout: Duration,
        runner: Arc<dyn ProcessRunner>,
    ) -> Self {
        let spec = CommandSpec::new(&check.command)
            .args(&check.args)
            .label(&check.name);
        let timeout = check
            .timeout_secs
            .map_or(default_timeout, Duration::from_secs);

        Self::new(&check.name, spec, timeout, runner).allow_failure(check.allow_failure)
    }

    /// Report a failing run as a warning on a passing result.
    #[must_use]
    pub fn allow_failure(mut self, allow: bool) -> Self {
        self.allow_failure = allow;
        self
    }
}

#[async_trait]
impl Validator for CommandCheckValidator {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self), fields(validator = %self.name))]
    async fn validate(&self) -> anyhow::Result<ValidatorResult> {
        let outcome = self.runner.run(&self.spec, self.timeout).await;

        let mut result = if outcome.success {
            ValidatorResult::passed(&self.name)
        } else if self.allow_failure {
            ValidatorResult::passed(&self.name)
                .with_warning(format!("{} (failure allowed)", outcome.disposition))
        } else {
            let mut failed = ValidatorResult::failed(
                &self.name,
                format!("{}: {}", self.spec.display(), outcome.disposition),
            );
            if let Some(context) = stderr_context(&outcome) {
                failed = failed.with_error(context);
            }
            failed.timed_out = outcome.timed_out();
            failed
        };

        if outcome.streams_truncated {
            result = result.with_warning("output still open after exit, capture truncated");
        }
        result.stream_write_failures = outcome.write_failures;
        Ok(result.with_details(serde_json::to_value(&outcome)?))
    }
}
