//! Orchestration services
//!
//! Retry, shutdown coordination, validator scheduling and report
//! aggregation. Everything here works against the domain ports only.

pub mod report_aggregator;
pub mod retry_policy;
pub mod signal_coordinator;
pub mod validation_orchestrator;
pub mod validator_registry;

pub use report_aggregator::{AggregationContext, PersistOutcome, ReportAggregator};
pub use retry_policy::RetryPolicy;
pub use signal_coordinator::{ShutdownFlag, ShutdownReport, ShutdownTrigger, SignalCoordinator};
pub use validation_orchestrator::ValidationOrchestrator;
pub use validator_registry::ValidatorRegistry;
