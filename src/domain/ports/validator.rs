//! Validator port - the contract every validation unit satisfies.

use async_trait::async_trait;

use crate::domain::models::ValidatorResult;

/// An independently invokable check.
///
/// The orchestrator only ever sees this trait; concrete validators are
/// registered by the caller at startup. Returning `Err` (or panicking)
/// is allowed: the orchestrator converts either into a failed
/// `ValidatorResult` without disturbing sibling units.
#[async_trait]
pub trait Validator: Send + Sync {
    /// Stable, unique name used as the report key.
    fn name(&self) -> &str;

    /// Run the check once.
    async fn validate(&self) -> anyhow::Result<ValidatorResult>;
}
