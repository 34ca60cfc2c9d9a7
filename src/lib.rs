//! stablerun - resilient orchestration of flaky external test tools
//!
//! stablerun supervises a long-running external test tool as a child
//! process: it captures and filters its output without failing on broken
//! pipes, enforces timeouts with escalating signals, retries failed runs
//! with cleanup in between, and runs independent validators concurrently
//! while aggregating their results into one deterministic report.
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Models and port traits
//! - **Application Layer** (`application`): Wiring of one validation run
//! - **Service Layer** (`services`): Retry, shutdown, orchestration, reports
//! - **Infrastructure Layer** (`infrastructure`): Processes, config, logging, validators
//! - **CLI Layer** (`cli`): Command-line interface
//!
//! # Example
//!
//! ```no_run
//! use stablerun::application::ValidationRun;
//! use stablerun::infrastructure::config::ConfigLoader;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigLoader::load()?;
//!     let run = ValidationRun::new(config);
//!     run.install_signal_handlers()?;
//!
//!     let outcome = run.execute(&["--project=chromium".to_string()]).await?;
//!     std::process::exit(outcome.exit_code());
//! }
//! ```

pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use application::{RunOutcome, ValidationRun};
pub use domain::models::{
    CommandSpec, Config, ExecutionMode, ExecutionOutcome, ExitDisposition, RetryAttempt,
    RetryRun, ValidationReport, ValidatorResult,
};
pub use domain::ports::{CleanupHook, DisplaySink, ProcessRunner, Validator};
pub use domain::{DomainError, DomainResult};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use infrastructure::process::{OutputStreamManager, ProcessSupervisor, ProcessTracker};
pub use services::{
    ReportAggregator, RetryPolicy, SignalCoordinator, ValidationOrchestrator, ValidatorRegistry,
};
