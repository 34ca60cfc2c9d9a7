//! Retry attempt records.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::process::ExecutionOutcome;

/// What the cleanup hook did between two attempts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupOutcome {
    /// Orphaned descendant processes that were killed
    pub processes_killed: usize,
    /// Scratch directories that existed and were removed
    pub directories_removed: Vec<PathBuf>,
    /// Steps that failed; cleanup never aborts on them
    pub errors: Vec<String>,
}

impl CleanupOutcome {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// Fold another outcome into this one.
    pub fn merge(&mut self, other: Self) {
        self.processes_killed += other.processes_killed;
        self.directories_removed.extend(other.directories_removed);
        self.errors.extend(other.errors);
    }
}

/// One cycle of invoking the supervised process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryAttempt {
    /// 1-based attempt index
    pub attempt: u32,
    /// `None` when the invocation failed before a process outcome existed
    pub outcome: Option<ExecutionOutcome>,
    /// Error raised by the invocation when no outcome was produced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Cleanup run after this attempt; absent for the final attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleanup: Option<CleanupOutcome>,
}

impl RetryAttempt {
    pub fn succeeded(&self) -> bool {
        self.outcome.as_ref().is_some_and(|o| o.success)
    }

    /// Short human description of how this attempt ended.
    pub fn describe(&self) -> String {
        match (&self.outcome, &self.error) {
            (Some(outcome), _) => outcome.disposition.to_string(),
            (None, Some(error)) => format!("invocation failed: {error}"),
            (None, None) => "no outcome".to_string(),
        }
    }
}

/// Ordered attempts produced by one retry policy invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryRun {
    pub max_attempts: u32,
    pub attempts: Vec<RetryAttempt>,
    /// Retrying stopped early because shutdown was requested
    #[serde(default)]
    pub interrupted: bool,
}

impl RetryRun {
    pub fn succeeded(&self) -> bool {
        self.attempts.last().is_some_and(RetryAttempt::succeeded)
    }

    /// All attempts were used and none succeeded.
    pub fn exhausted(&self) -> bool {
        !self.succeeded() && self.attempts.len() >= self.max_attempts as usize
    }

    pub fn final_attempt(&self) -> Option<&RetryAttempt> {
        self.attempts.last()
    }

    pub fn final_outcome(&self) -> Option<&ExecutionOutcome> {
        self.final_attempt().and_then(|a| a.outcome.as_ref())
    }

    pub fn cleanup_runs(&self) -> usize {
        self.attempts.iter().filter(|a| a.cleanup.is_some()).count()
    }
}
