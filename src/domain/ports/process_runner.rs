//! Process runner port - the spawn boundary.

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::models::{CommandSpec, ExecutionOutcome};

/// Runs one command to completion under a timeout.
///
/// Implementations never fail: spawn errors and timeouts are encoded in
/// the returned outcome so callers branch on data only.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, spec: &CommandSpec, timeout: Duration) -> ExecutionOutcome;
}
