//! Domain errors for the stablerun orchestrator.

use thiserror::Error;

/// Domain-level errors raised by the orchestration machinery itself.
///
/// Failures of a single supervised run or a single validator are never
/// represented here; those are converted to data (`ExecutionOutcome`,
/// `ValidatorResult`) at the boundary of the unit that produced them.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Validator already registered: {0}")]
    DuplicateValidator(String),

    #[error("Validators '{first}' and '{second}' would share the log label '{label}'")]
    LogLabelCollision {
        label: String,
        first: String,
        second: String,
    },

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Report generation failed: {0}")]
    ReportGeneration(String),

    #[error("Signal handler installation failed: {0}")]
    SignalInstall(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}
