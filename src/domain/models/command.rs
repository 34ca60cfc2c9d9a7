//! Structured description of a process to spawn.
//!
//! The program and each argument stay separate all the way to the
//! `exec` call; nothing here is ever handed to a shell.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::domain::errors::{DomainError, DomainResult};

/// Program, argument vector and environment overlay for one spawn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    current_dir: Option<PathBuf>,
    label: String,
}

impl CommandSpec {
    /// Start a spec for `program`; the label defaults to its file name.
    pub fn new(program: impl Into<String>) -> Self {
        let program = program.into();
        let label = Path::new(&program)
            .file_name()
            .map_or_else(|| program.clone(), |n| n.to_string_lossy().into_owned());
        Self {
            program,
            args: Vec::new(),
            env: BTreeMap::new(),
            current_dir: None,
            label: sanitize_label(&label),
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Name used for capture log files; restricted to `[A-Za-z0-9_-]`.
    #[must_use]
    pub fn label(mut self, label: &str) -> Self {
        self.label = sanitize_label(label);
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    pub fn environment(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }

    pub fn log_label(&self) -> &str {
        &self.label
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.program.trim().is_empty() {
            return Err(DomainError::InvalidCommand(
                "program cannot be empty".to_string(),
            ));
        }
        if self.args.iter().any(|a| a.contains('\0')) {
            return Err(DomainError::InvalidCommand(format!(
                "argument for '{}' contains a NUL byte",
                self.program
            )));
        }
        Ok(())
    }

    /// Quoted rendering for logs and summaries.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(quote)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Map a name onto the `[A-Za-z0-9_-]` alphabet used for log file names.
pub fn sanitize_label(label: &str) -> String {
    let cleaned: String = label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "process".to_string()
    } else {
        cleaned
    }
}

fn quote(part: &str) -> String {
    let plain = !part.is_empty()
        && part
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@,+".contains(c));
    if plain {
        part.to_string()
    } else {
        format!("'{}'", part.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_keeps_arguments_separate() {
        let spec = CommandSpec::new("npx")
            .args(["playwright", "test"])
            .arg("--grep=login page; rm -rf /")
            .env("CI", "1");

        assert_eq!(spec.program(), "npx");
        assert_eq!(spec.arguments().len(), 3);
        assert_eq!(spec.arguments()[2], "--grep=login page; rm -rf /");
        assert_eq!(spec.environment().get("CI").map(String::as_str), Some("1"));
        assert_eq!(
            spec.display(),
            "npx playwright test '--grep=login page; rm -rf /'"
        );
    }

    #[test]
    fn test_label_sanitized() {
        let spec = CommandSpec::new("/usr/bin/node");
        assert_eq!(spec.log_label(), "node");

        let spec = spec.label("e2e tests/chrome");
        assert_eq!(spec.log_label(), "e2e_tests_chrome");

        assert_eq!(CommandSpec::new("x").label("").log_label(), "process");
    }

    #[test]
    fn test_validate_rejects_empty_program() {
        assert!(CommandSpec::new("  ").validate().is_err());
        assert!(CommandSpec::new("true").validate().is_ok());
    }
}
