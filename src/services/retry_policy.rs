//! Fixed-delay retry loop around supervised invocations.
//!
//! The delay between attempts is constant: the policy targets a handful
//! of attempts against a flaky local tool, not remote backpressure.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::domain::models::{ExecutionOutcome, RetryAttempt, RetryConfig, RetryRun};
use crate::domain::ports::CleanupHook;
use crate::services::signal_coordinator::ShutdownFlag;

/// Bounded retry loop with a cleanup hook between attempts.
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
    cleanup: Arc<dyn CleanupHook>,
    shutdown: Option<ShutdownFlag>,
}

impl RetryPolicy {
    /// `max_attempts` below 1 is treated as 1.
    pub fn new(max_attempts: u32, delay: Duration, cleanup: Arc<dyn CleanupHook>) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            cleanup,
            shutdown: None,
        }
    }

    pub fn from_config(config: &RetryConfig, cleanup: Arc<dyn CleanupHook>) -> Self {
        Self::new(config.max_attempts, config.delay(), cleanup)
    }

    /// Stop scheduling attempts once `flag` is raised.
    #[must_use]
    pub fn with_shutdown(mut self, flag: ShutdownFlag) -> Self {
        self.shutdown = Some(flag);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.as_ref().is_some_and(ShutdownFlag::is_raised)
    }

    /// Invoke `invocation` until one outcome succeeds or attempts run out.
    ///
    /// The closure receives the 1-based attempt number. An `Err` means no
    /// process outcome exists for that attempt; it is recorded and
    /// retried like any other failure. The cleanup hook runs after every
    /// failed attempt except the last, so a run of N attempts performs
    /// exactly N - 1 cleanups.
    pub async fn run_with_retry<F, Fut>(&self, mut invocation: F) -> RetryRun
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = anyhow::Result<ExecutionOutcome>>,
    {
        let mut run = RetryRun {
            max_attempts: self.max_attempts,
            attempts: Vec::with_capacity(self.max_attempts as usize),
            interrupted: false,
        };

        for attempt in 1..=self.max_attempts {
            if self.shutdown_requested() {
                warn!(attempt, "Shutdown requested, not starting attempt");
                run.interrupted = true;
                break;
            }

            info!(attempt, max_attempts = self.max_attempts, "Starting attempt");
            let mut record = match invocation(attempt).await {
                Ok(outcome) => RetryAttempt {
                    attempt,
                    outcome: Some(outcome),
                    error: None,
                    cleanup: None,
                },
                Err(e) => RetryAttempt {
                    attempt,
                    outcome: None,
                    error: Some(format!("{e:#}")),
                    cleanup: None,
                },
            };

            if record.succeeded() {
                if attempt > 1 {
                    info!(attempt, "Attempt succeeded after retries");
                }
                run.attempts.push(record);
                break;
            }

            warn!(attempt, result = %record.describe(), "Attempt failed");

            if attempt == self.max_attempts {
                warn!(max_attempts = self.max_attempts, "All attempts exhausted");
                run.attempts.push(record);
                break;
            }

            if self.shutdown_requested() {
                run.attempts.push(record);
                run.interrupted = true;
                break;
            }

            record.cleanup = Some(self.cleanup.cleanup().await);
            run.attempts.push(record);

            if !self.delay.is_zero() {
                info!(delay = ?self.delay, "Waiting before next attempt");
                sleep(self.delay).await;
            }
        }

        run
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{CleanupOutcome, ExitDisposition};
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingCleanup {
        runs: AtomicUsize,
    }

    #[async_trait]
    impl CleanupHook for CountingCleanup {
        async fn cleanup(&self) -> CleanupOutcome {
            self.runs.fetch_add(1, Ordering::SeqCst);
            CleanupOutcome::default()
        }
    }

    fn outcome(code: i32) -> ExecutionOutcome {
        ExecutionOutcome {
            disposition: ExitDisposition::Exited { code },
            duration: Duration::from_millis(1),
            stdout_log: PathBuf::from("out.log"),
            stderr_log: PathBuf::from("err.log"),
            success: code == 0,
            stderr_tail: Vec::new(),
            streams_truncated: false,
            write_failures: 0,
        }
    }

    #[tokio::test]
    async fn test_first_attempt_success_skips_cleanup() {
        let cleanup = Arc::new(CountingCleanup::default());
        let policy = RetryPolicy::new(3, Duration::ZERO, cleanup.clone());

        let run = policy.run_with_retry(|_| async { Ok::<_, anyhow::Error>(outcome(0)) }).await;

        assert_eq!(run.attempts.len(), 1);
        assert!(run.succeeded());
        assert_eq!(cleanup.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invocation_error_is_recorded_and_retried() {
        let cleanup = Arc::new(CountingCleanup::default());
        let policy = RetryPolicy::new(2, Duration::ZERO, cleanup.clone());

        let run = policy
            .run_with_retry(|attempt| async move {
                if attempt == 1 {
                    anyhow::bail!("log directory unavailable")
                }
                Ok(outcome(0))
            })
            .await;

        assert_eq!(run.attempts.len(), 2);
        assert!(run.attempts[0].outcome.is_none());
        assert_eq!(
            run.attempts[0].error.as_deref(),
            Some("log directory unavailable")
        );
        assert!(run.succeeded());
        assert_eq!(cleanup.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausted_run_keeps_final_failure() {
        let cleanup = Arc::new(CountingCleanup::default());
        let policy = RetryPolicy::new(3, Duration::ZERO, cleanup.clone());

        let run = policy.run_with_retry(|_| async { Ok::<_, anyhow::Error>(outcome(1)) }).await;

        assert!(run.exhausted());
        assert_eq!(run.attempts.len(), 3);
        assert!(run.final_attempt().unwrap().cleanup.is_none());
        assert_eq!(run.final_outcome().unwrap().exit_code(), 1);
        assert_eq!(cleanup.runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_shutdown_stops_retrying() {
        let cleanup = Arc::new(CountingCleanup::default());
        let flag = ShutdownFlag::new();
        let policy =
            RetryPolicy::new(5, Duration::ZERO, cleanup.clone()).with_shutdown(flag.clone());

        let run = policy
            .run_with_retry(|_| {
                flag.raise();
                async { Ok::<_, anyhow::Error>(outcome(1)) }
            })
            .await;

        assert_eq!(run.attempts.len(), 1);
        assert!(run.interrupted);
        assert_eq!(cleanup.runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_zero_attempts_clamped() {
        let policy = RetryPolicy::new(0, Duration::ZERO, Arc::new(CountingCleanup::default()));
        assert_eq!(policy.max_attempts(), 1);
    }
}
