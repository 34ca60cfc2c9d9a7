//! Cleanup hook port.

use async_trait::async_trait;

use crate::domain::models::CleanupOutcome;

/// Best-effort environment reset run between retry attempts and during
/// shutdown. Implementations record failures in the outcome instead of
/// returning them.
#[async_trait]
pub trait CleanupHook: Send + Sync {
    async fn cleanup(&self) -> CleanupOutcome;
}

/// Cleanup hook that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCleanup;

#[async_trait]
impl CleanupHook for NoopCleanup {
    async fn cleanup(&self) -> CleanupOutcome {
        CleanupOutcome::default()
    }
}
