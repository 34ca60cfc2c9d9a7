//! The supervised test-tool validator: tool run under the retry policy.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

use crate::domain::models::{CommandSpec, Config, ExecutionOutcome, RetryRun, ValidatorResult};
use crate::domain::ports::{ProcessRunner, Validator};
use crate::services::RetryPolicy;

/// Report key of the test-tool validator.
pub const TOOL_VALIDATOR_NAME: &str = "test-tool";

/// Runs the external test tool through [`RetryPolicy`].
pub struct SupervisedToolValidator {
    name: String,
    spec: CommandSpec,
    timeout: Duration,
    runner: Arc<dyn ProcessRunner>,
    policy: RetryPolicy,
}

impl SupervisedToolValidator {
    pub fn new(
        name: impl Into<String>,
        spec: CommandSpec,
        timeout: Duration,
        runner: Arc<dyn ProcessRunner>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            name: name.into(),
            spec,
            timeout,
            runner,
            policy,
        }
    }

    /// Build the tool command from `config.tool`, appending `passthrough`
    /// verbatim.
    pub fn from_config(
        config: &Config,
        passthrough: &[String],
        runner: Arc<dyn ProcessRunner>,
        policy: RetryPolicy,
    ) -> Self {
        let mut spec = CommandSpec::new(&config.tool.command)
            .args(&config.tool.args)
            .args(passthrough)
            .label(TOOL_VALIDATOR_NAME);
        if let Some(dir) = &config.tool.working_dir {
            spec = spec.current_dir(dir);
        }

        Self::new(
            TOOL_VALIDATOR_NAME,
            spec,
            config.supervisor.timeout(),
            runner,
            policy,
        )
    }

    pub fn command(&self) -> &CommandSpec {
        &self.spec
    }

    fn summarize(&self, run: &RetryRun) -> ValidatorResult {
        let total = run.max_attempts;
        let succeeded = run.succeeded();

        let mut result = ValidatorResult::passed(&self.name);
        result.success = succeeded;

        for attempt in run.attempts.iter().filter(|a| !a.succeeded()) {
            let line = format!("attempt {}/{total}: {}", attempt.attempt, attempt.describe());
            // Attempts a later retry recovered from are not errors of the unit
            if succeeded {
                result.warnings.push(line);
            } else {
                result.errors.push(line);
            }
        }

        for attempt in &run.attempts {
            if let Some(cleanup) = &attempt.cleanup {
                for err in &cleanup.errors {
                    result
                        .warnings
                        .push(format!("cleanup after attempt {}: {err}", attempt.attempt));
                }
            }
            if attempt.outcome.as_ref().is_some_and(|o| o.streams_truncated) {
                result.warnings.push(format!(
                    "attempt {}: output still open after exit, capture truncated",
                    attempt.attempt
                ));
            }
        }

        if succeeded && run.attempts.len() > 1 {
            result
                .warnings
                .push(format!("passed after {} attempts", run.attempts.len()));
        }

        if !succeeded {
            if run.attempts.is_empty() {
                result
                    .errors
                    .push("not started: shutdown in progress".to_string());
            } else if run.interrupted {
                result.errors.push(format!(
                    "retrying stopped by shutdown after {} of {total} attempts",
                    run.attempts.len()
                ));
            }
            if let Some(context) = run.final_outcome().and_then(stderr_context) {
                result.errors.push(context);
            }
        }

        result.timed_out =
            !succeeded && run.final_outcome().is_some_and(ExecutionOutcome::timed_out);
        result.stream_write_failures = run
            .attempts
            .iter()
            .filter_map(|a| a.outcome.as_ref())
            .map(|o| o.write_failures)
            .sum();
        result
    }
}

#[async_trait]
impl Validator for SupervisedToolValidator {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self), fields(validator = %self.name, command = %self.spec.display()))]
    async fn validate(&self) -> anyhow::Result<ValidatorResult> {
        let runner = &self.runner;
        let spec = &self.spec;
        let timeout = self.timeout;

        let run = self
            .policy
            .run_with_retry(|_attempt| async move {
                Ok::<_, anyhow::Error>(runner.run(spec, timeout).await)
            })
            .await;

        info!(
            attempts = run.attempts.len(),
            succeeded = run.succeeded(),
            cleanups = run.cleanup_runs(),
            "Test tool finished"
        );

        let details = serde_json::to_value(&run)?;
        Ok(self.summarize(&run).with_details(details))
    }
}

/// Last stderr lines of a failed run, with the log file to read for more.
pub(crate) fn stderr_context(outcome: &ExecutionOutcome) -> Option<String> {
    if outcome.stderr_tail.is_empty() {
        return None;
    }
    Some(format!(
        "stderr (last {} lines, full log {}):\n{}",
        outcome.stderr_tail.len(),
        outcome.stderr_log.display(),
        outcome.stderr_tail.join("\n")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{CleanupOutcome, ExitDisposition};
    use crate::domain::ports::CleanupHook;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// Replays canned dispositions, one per run.
    struct Scripted {
        dispositions: Mutex<Vec<ExitDisposition>>,
    }

    impl Scripted {
        fn new(mut dispositions: Vec<ExitDisposition>) -> Arc<Self> {
            dispositions.reverse();
            Arc::new(Self {
                dispositions: Mutex::new(dispositions),
            })
        }
    }

    #[async_trait]
    impl ProcessRunner for Scripted {
        async fn run(&self, _spec: &CommandSpec, _timeout: Duration) -> ExecutionOutcome {
            let disposition = self
                .dispositions
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(ExitDisposition::Exited { code: 0 });
            ExecutionOutcome {
                success: disposition == ExitDisposition::Exited { code: 0 },
                disposition,
                duration: Duration::from_millis(5),
                stdout_log: PathBuf::from("test-tool.stdout.log"),
                stderr_log: PathBuf::from("test-tool.stderr.log"),
                stderr_tail: vec!["Error: page crashed".to_string()],
                streams_truncated: false,
                write_failures: 1,
            }
        }
    }

    struct FailingCleanup;

    #[async_trait]
    impl CleanupHook for FailingCleanup {
        async fn cleanup(&self) -> CleanupOutcome {
            CleanupOutcome {
                errors: vec!["remove test-results: permission denied".to_string()],
                ..CleanupOutcome::default()
            }
        }
    }

    fn validator(runner: Arc<Scripted>, attempts: u32) -> SupervisedToolValidator {
        SupervisedToolValidator::new(
            TOOL_VALIDATOR_NAME,
            CommandSpec::new("npx").args(["playwright", "test"]),
            Duration::from_secs(1),
            runner,
            RetryPolicy::new(attempts, Duration::ZERO, Arc::new(FailingCleanup)),
        )
    }

    #[tokio::test]
    async fn test_recovered_run_passes_with_warnings() {
        let runner = Scripted::new(vec![
            ExitDisposition::Exited { code: 1 },
            ExitDisposition::Exited { code: 0 },
        ]);

        let result = validator(runner, 3).validate().await.unwrap();

        assert!(result.success);
        assert!(result.errors.is_empty());
        assert!(result
            .warnings
            .contains(&"attempt 1/3: exited with code 1".to_string()));
        assert!(result.warnings.contains(&"passed after 2 attempts".to_string()));
        assert!(result
            .warnings
            .iter()
            .any(|w| w.starts_with("cleanup after attempt 1:")));
        assert_eq!(result.stream_write_failures, 2);
        assert_eq!(result.details.unwrap()["attempts"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_timeout_run_fails() {
        let runner = Scripted::new(vec![
            ExitDisposition::Exited { code: 1 },
            ExitDisposition::TimedOut { forced: true },
        ]);

        let result = validator(runner, 2).validate().await.unwrap();

        assert!(!result.success);
        assert!(result.timed_out);
        assert_eq!(result.errors[0], "attempt 1/2: exited with code 1");
        assert_eq!(result.errors[1], "attempt 2/2: timed out (killed)");
        assert!(result.errors[2].contains("Error: page crashed"));
    }

    #[test]
    fn test_from_config_appends_passthrough() {
        let config = Config::default();
        let validator = SupervisedToolValidator::from_config(
            &config,
            &["--project=chromium".to_string()],
            Scripted::new(Vec::new()),
            RetryPolicy::new(1, Duration::ZERO, Arc::new(FailingCleanup)),
        );

        assert_eq!(validator.command().program(), "npx");
        assert_eq!(
            validator.command().arguments(),
            &["playwright", "test", "--project=chromium"]
        );
        assert_eq!(validator.command().log_label(), TOOL_VALIDATOR_NAME);
    }
}
