//! Ordered registry of validator units.

use std::sync::Arc;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::Validator;

/// Validators in declaration order, keyed by unique name.
///
/// Built once by the caller and handed to the orchestrator.
#[derive(Default, Clone)]
pub struct ValidatorRegistry {
    validators: Vec<Arc<dyn Validator>>,
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a validator. Names must be unique.
    pub fn register(&mut self, validator: Arc<dyn Validator>) -> DomainResult<()> {
        if self.contains(validator.name()) {
            return Err(DomainError::DuplicateValidator(validator.name().to_string()));
        }
        self.validators.push(validator);
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, validator: Arc<dyn Validator>) -> DomainResult<Self> {
        self.register(validator)?;
        Ok(self)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.validators.iter().any(|v| v.name() == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.validators.iter().map(|v| v.name().to_string()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Validator>> {
        self.validators.iter()
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }
}

impl std::fmt::Debug for ValidatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidatorRegistry")
            .field("validators", &self.names())
            .finish()
    }
}
