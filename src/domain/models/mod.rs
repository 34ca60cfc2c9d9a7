pub mod command;
pub mod config;
pub mod process;
pub mod retry;
pub mod validation;

pub use command::{sanitize_label, CommandSpec};
pub use config::{
    CheckConfig, CleanupConfig, Config, EnvironmentConfig, LoggingConfig, OutputConfig,
    ReportConfig, ReportFormat, RetryConfig, SupervisorConfig, ToolConfig, ValidationConfig,
};
pub use process::{
    ExecutionOutcome, ExitDisposition, ProcessHandle, ProcessState, SPAWN_FAILURE_EXIT_CODE,
    TIMEOUT_EXIT_CODE,
};
pub use retry::{CleanupOutcome, RetryAttempt, RetryRun};
pub use validation::{ExecutionMode, ValidationReport, ValidatorResult};
