//! Common test utilities for integration tests
//!
//! Provides shared fixtures, stub validators, stub cleanup hooks and
//! canned process outcomes used across multiple integration test files.

#![allow(dead_code)]

use async_trait::async_trait;
use stablerun::domain::models::{
    CleanupOutcome, ExecutionOutcome, ExitDisposition, ValidatorResult,
};
use stablerun::domain::ports::{CleanupHook, Validator};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

/// Create a temporary directory for test isolation
///
/// Returns a TempDir that will be cleaned up when dropped.
pub fn temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
/// Call this at the beginning of tests that need logging.
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Wait for a condition to be true with timeout
///
/// Polls the predicate every 20ms until it returns true or timeout is reached.
pub async fn wait_for<F>(mut predicate: F, timeout_ms: u64) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    let timeout = Duration::from_millis(timeout_ms);

    while start.elapsed() < timeout {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    false
}

/// A finished supervised run with the given exit code.
pub fn exited(code: i32) -> ExecutionOutcome {
    ExecutionOutcome {
        disposition: ExitDisposition::Exited { code },
        duration: Duration::from_millis(1),
        stdout_log: PathBuf::from("stub.stdout.log"),
        stderr_log: PathBuf::from("stub.stderr.log"),
        success: code == 0,
        stderr_tail: Vec::new(),
        streams_truncated: false,
        write_failures: 0,
    }
}

/// Cleanup hook that only counts its invocations.
#[derive(Debug, Default)]
pub struct CountingCleanup {
    runs: AtomicUsize,
}

impl CountingCleanup {
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CleanupHook for CountingCleanup {
    async fn cleanup(&self) -> CleanupOutcome {
        self.runs.fetch_add(1, Ordering::SeqCst);
        CleanupOutcome::default()
    }
}

/// How a [`StubValidator`] behaves when invoked.
#[derive(Debug, Clone)]
pub enum StubBehavior {
    Pass,
    PassWithWarning(&'static str),
    Fail(&'static str),
    Error(&'static str),
    Panic(&'static str),
}

/// Validator that sleeps, then behaves as told.
#[derive(Debug)]
pub struct StubValidator {
    pub name: String,
    pub delay: Duration,
    pub behavior: StubBehavior,
    pub calls: AtomicUsize,
}

impl StubValidator {
    pub fn new(name: &str, behavior: StubBehavior) -> Self {
        Self {
            name: name.to_string(),
            delay: Duration::ZERO,
            behavior,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Validator for StubValidator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn validate(&self) -> anyhow::Result<ValidatorResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.behavior {
            StubBehavior::Pass => Ok(ValidatorResult::passed(&self.name)),
            StubBehavior::PassWithWarning(w) => {
                Ok(ValidatorResult::passed(&self.name).with_warning(w))
            }
            StubBehavior::Fail(e) => Ok(ValidatorResult::failed(&self.name, e)),
            StubBehavior::Error(e) => anyhow::bail!(e),
            StubBehavior::Panic(msg) => panic!("{msg}"),
        }
    }
}
