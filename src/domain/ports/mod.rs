//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines the interfaces the orchestration core depends on:
//! - Validator: one independently invokable check
//! - ProcessRunner: the spawn boundary (supervised process execution)
//! - CleanupHook: environment reset between attempts and on shutdown
//! - DisplaySink: best-effort destination for forwarded output lines
//!
//! Services only see these traits, so they can be exercised with stubs
//! instead of real processes.

pub mod cleanup_hook;
pub mod display_sink;
pub mod process_runner;
pub mod validator;

pub use cleanup_hook::{CleanupHook, NoopCleanup};
pub use display_sink::{DisplaySink, NullSink, StdoutSink};
pub use process_runner::ProcessRunner;
pub use validator::Validator;
