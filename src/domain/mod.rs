//! Domain layer for the stablerun orchestrator
//!
//! This module contains the core models and the port traits the
//! infrastructure layer implements.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
