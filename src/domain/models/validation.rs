//! Validator results and the aggregated validation report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How validator units are scheduled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Start every unit at once and await all of them
    #[default]
    Parallel,
    /// One unit at a time, in declaration order
    Sequential,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parallel => "parallel",
            Self::Sequential => "sequential",
        }
    }
}

impl std::str::FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "parallel" => Ok(Self::Parallel),
            "sequential" => Ok(Self::Sequential),
            other => Err(format!(
                "Invalid execution mode: {other}. Must be one of: parallel, sequential"
            )),
        }
    }
}

/// Outcome of one validator unit in one orchestrator run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatorResult {
    pub name: String,
    pub success: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(default)]
    pub duration_ms: u64,
    /// The unit's supervised process was killed by its timeout
    #[serde(default)]
    pub timed_out: bool,
    #[serde(default)]
    pub stream_write_failures: u64,
}

impl ValidatorResult {
    pub fn passed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            success: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            details: None,
            duration_ms: 0,
            timed_out: false,
            stream_write_failures: 0,
        }
    }

    pub fn failed(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            errors: vec![error.into()],
            ..Self::passed(name)
        }
    }

    #[must_use]
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.errors.push(error.into());
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// All validator results of one run plus derived counts.
///
/// Entries are in declaration order, never completion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub mode: ExecutionMode,
    pub results: Vec<ValidatorResult>,
    /// Succeeded without warnings
    pub passed: usize,
    /// Succeeded with at least one warning
    pub warned: usize,
    pub failed: usize,
    /// Units never started (sequential stop or shutdown)
    #[serde(default)]
    pub skipped: Vec<String>,
    pub overall_exit_code: i32,
    pub duration_ms: u64,
    #[serde(default)]
    pub stream_write_failures: u64,
}

impl ValidationReport {
    pub fn all_passed(&self) -> bool {
        self.overall_exit_code == 0
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn result(&self, name: &str) -> Option<&ValidatorResult> {
        self.results.iter().find(|r| r.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_builders() {
        let result = ValidatorResult::passed("env").with_warning("BASE_URL unset");
        assert!(result.success);
        assert!(result.has_warnings());

        let result = result.with_error("missing key");
        assert!(!result.success);
        assert_eq!(result.errors, vec!["missing key".to_string()]);
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("Parallel".parse::<ExecutionMode>(), Ok(ExecutionMode::Parallel));
        assert_eq!(
            "sequential".parse::<ExecutionMode>(),
            Ok(ExecutionMode::Sequential)
        );
        assert!("both".parse::<ExecutionMode>().is_err());
    }
}
