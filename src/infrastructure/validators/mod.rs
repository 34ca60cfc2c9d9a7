//! Concrete validator units.
//!
//! The orchestrator only sees the `Validator` port; this module is the
//! registration-time plugin list that turns configuration into units.

pub mod command_check;
pub mod tool;

pub use command_check::CommandCheckValidator;
pub use tool::{SupervisedToolValidator, TOOL_VALIDATOR_NAME};

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{sanitize_label, Config};
use crate::domain::ports::ProcessRunner;
use crate::services::{RetryPolicy, ValidatorRegistry};

/// Register the test tool (when `include_tool`) followed by every
/// configured command check, in declaration order.
///
/// Units run concurrently write `<label>.stdout.log`, so two names that
/// sanitize to the same label are rejected.
pub fn build_registry(
    config: &Config,
    passthrough: &[String],
    include_tool: bool,
    runner: Arc<dyn ProcessRunner>,
    policy: RetryPolicy,
) -> DomainResult<ValidatorRegistry> {
    let mut registry = ValidatorRegistry::new();
    let mut labels = LabelSet::default();

    if include_tool {
        labels.claim(TOOL_VALIDATOR_NAME)?;
        registry.register(Arc::new(SupervisedToolValidator::from_config(
            config,
            passthrough,
            Arc::clone(&runner),
            policy,
        )))?;
    }

    for check in &config.validation.checks {
        labels.claim(&check.name)?;
        registry.register(Arc::new(CommandCheckValidator::from_config(
            check,
            config.supervisor.timeout(),
            Arc::clone(&runner),
        )))?;
    }

    Ok(registry)
}

/// Log labels already handed out, with the validator that owns each.
#[derive(Default)]
struct LabelSet(HashMap<String, String>);

impl LabelSet {
    fn claim(&mut self, name: &str) -> DomainResult<()> {
        let label = sanitize_label(name);
        match self.0.get(&label) {
            // Same name: the registry reports it as a duplicate
            Some(owner) if owner != name => Err(DomainError::LogLabelCollision {
                label,
                first: owner.clone(),
                second: name.to_string(),
            }),
            _ => {
                self.0.insert(label, name.to_string());
                Ok(())
            }
        }
    }
}
