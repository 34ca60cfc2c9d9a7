//! Infrastructure layer module
//!
//! This module contains the adapters that touch the operating system:
//! - Configuration management (figment)
//! - Logging infrastructure (tracing)
//! - Process supervision, signals and cleanup
//! - Concrete validator units
//!
//! Infrastructure implementations satisfy the port traits defined in the domain layer.

pub mod config;
pub mod logging;
pub mod process;
pub mod validators;
