use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::domain::models::config::Config;

/// Project configuration file, created by hand or checked in
pub const PROJECT_CONFIG: &str = ".stablerun/config.yaml";

/// Local overrides, usually git-ignored
pub const LOCAL_CONFIG: &str = ".stablerun/local.yaml";

/// Prefix of environment overrides (`STABLERUN_RETRY__MAX_ATTEMPTS=5`)
pub const ENV_PREFIX: &str = "STABLERUN_";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid max_attempts: {0}. Must be at least 1")]
    InvalidMaxAttempts(u32),

    #[error("Invalid timeout_secs: {0}. Must be at least 1")]
    InvalidTimeout(u64),

    #[error("Tool command cannot be empty")]
    EmptyToolCommand,

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidRotation(String),

    #[error("Invalid {field} pattern '{pattern}': {reason}")]
    InvalidPattern {
        field: &'static str,
        pattern: String,
        reason: String,
    },

    #[error("Duplicate check name: {0}")]
    DuplicateCheck(String),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .stablerun/config.yaml
    /// 3. .stablerun/local.yaml (optional)
    /// 4. Environment variables (STABLERUN_* prefix, `__` for nesting)
    pub fn load() -> Result<Config> {
        Self::extract(&[PathBuf::from(PROJECT_CONFIG), PathBuf::from(LOCAL_CONFIG)])
    }

    /// Load configuration from a specific file instead of the project
    /// files. Environment overrides still apply.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config = Self::load_unvalidated(Some(path.as_ref()))?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// `load_from_file` when `path` is given, `load` otherwise.
    pub fn load_with(path: Option<&Path>) -> Result<Config> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Self::load(),
        }
    }

    /// Merge the same sources as `load_with` without validating, for
    /// callers that layer more overrides on top and validate afterwards.
    pub fn load_unvalidated(path: Option<&Path>) -> Result<Config> {
        match path {
            Some(path) => {
                if !path.is_file() {
                    anyhow::bail!("Config file not found: {}", path.display());
                }
                Self::merge(&[path.to_path_buf()])
                    .with_context(|| format!("Failed to load config from {}", path.display()))
            }
            None => Self::merge(&[PathBuf::from(PROJECT_CONFIG), PathBuf::from(LOCAL_CONFIG)]),
        }
    }

    fn figment(files: &[PathBuf]) -> Figment {
        let figment = files
            .iter()
            .fold(Figment::new().merge(Serialized::defaults(Config::default())), |f, file| {
                f.merge(Yaml::file(file))
            });
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    fn merge(files: &[PathBuf]) -> Result<Config> {
        Self::figment(files)
            .extract()
            .context("Failed to extract configuration from figment")
    }

    fn extract(files: &[PathBuf]) -> Result<Config> {
        let config = Self::merge(files)?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidMaxAttempts(config.retry.max_attempts));
        }

        if config.supervisor.timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout(config.supervisor.timeout_secs));
        }

        if config.tool.command.trim().is_empty() {
            return Err(ConfigError::EmptyToolCommand);
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidRotation(config.logging.rotation.clone()));
        }

        check_patterns("important", &config.output.important_patterns)?;
        check_patterns("noise", &config.output.noise_patterns)?;

        let mut names = HashSet::new();
        for check in &config.validation.checks {
            if check.name.trim().is_empty() {
                return Err(ConfigError::ValidationFailed(
                    "Check name cannot be empty".to_string(),
                ));
            }
            if check.command.trim().is_empty() {
                return Err(ConfigError::ValidationFailed(format!(
                    "Check '{}' command cannot be empty",
                    check.name
                )));
            }
            if check.timeout_secs == Some(0) {
                return Err(ConfigError::ValidationFailed(format!(
                    "Check '{}' timeout_secs must be at least 1",
                    check.name
                )));
            }
            if !names.insert(check.name.as_str()) {
                return Err(ConfigError::DuplicateCheck(check.name.clone()));
            }
        }

        Ok(())
    }
}

fn check_patterns(field: &'static str, patterns: &[String]) -> Result<(), ConfigError> {
    for pattern in patterns {
        Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
            field,
            pattern: pattern.clone(),
            reason: e.to_string(),
        })?;
    }
    Ok(())
}
