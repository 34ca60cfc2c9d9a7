//! Process supervision infrastructure
//!
//! - Structured spawning in a dedicated process group
//! - Output capture with broken-pipe tolerant writes
//! - Timeout enforcement with escalating signals
//! - Tracking of live children for coordinated shutdown
//! - Cleanup of orphaned tool processes and scratch directories

pub mod cleanup;
pub mod output_stream;
pub mod signals;
pub mod supervisor;
pub mod tolerant_write;
pub mod tracker;

pub use cleanup::ProcessCleanup;
pub use output_stream::{LineClass, LineClassifier, OutputStreamManager, StreamSummary};
pub use supervisor::{ProcessSupervisor, SinkFactory, SupervisorSettings};
pub use tolerant_write::{tolerant_print, tolerant_write, OutputStats, WriteOutcome};
pub use tracker::ProcessTracker;
