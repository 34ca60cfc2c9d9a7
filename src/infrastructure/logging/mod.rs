//! Logging infrastructure
//!
//! Structured logging using tracing and tracing-subscriber:
//! - Pretty or JSON output on stderr
//! - Optional JSON log file with rotation (tracing-appender)
//! - `RUST_LOG` filter overrides

pub mod logger;

pub use logger::Logger;
