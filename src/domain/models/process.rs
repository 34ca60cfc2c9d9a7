//! Supervised process domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Exit code reported for a run killed by its timeout.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Exit code reported when the executable could not be spawned.
pub const SPAWN_FAILURE_EXIT_CODE: i32 = 127;

/// Lifecycle state of a spawned child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    Starting,
    Running,
    Terminating,
    Exited,
}

impl ProcessState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Terminating => "terminating",
            Self::Exited => "exited",
        }
    }
}

/// Identifies one spawned child process.
///
/// The supervisor that spawned the process owns the child itself; the
/// handle is a plain description that other components may copy into
/// their tracking sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessHandle {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub program: String,
    pub args: Vec<String>,
    pub state: ProcessState,
}

impl ProcessHandle {
    pub fn new(pid: u32, program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            pid,
            started_at: Utc::now(),
            program: program.into(),
            args,
            state: ProcessState::Starting,
        }
    }
}

/// How a supervised run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExitDisposition {
    /// The process exited on its own with this code.
    Exited { code: i32 },
    /// The process was terminated by a signal it did not ask for.
    Signaled { signal: i32 },
    /// The timeout fired and the process was shut down.
    TimedOut { forced: bool },
    /// The executable could not be started.
    SpawnFailed { message: String },
}

impl ExitDisposition {
    /// Numeric exit code following shell conventions.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Exited { code } => *code,
            Self::Signaled { signal } => 128 + signal,
            Self::TimedOut { .. } => TIMEOUT_EXIT_CODE,
            Self::SpawnFailed { .. } => SPAWN_FAILURE_EXIT_CODE,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }

    pub fn is_spawn_failure(&self) -> bool {
        matches!(self, Self::SpawnFailed { .. })
    }
}

impl fmt::Display for ExitDisposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited { code } => write!(f, "exited with code {code}"),
            Self::Signaled { signal } => write!(f, "terminated by signal {signal}"),
            Self::TimedOut { forced: false } => write!(f, "timed out (terminated gracefully)"),
            Self::TimedOut { forced: true } => write!(f, "timed out (killed)"),
            Self::SpawnFailed { message } => write!(f, "failed to spawn: {message}"),
        }
    }
}

/// Result of one supervised run. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub disposition: ExitDisposition,
    #[serde(with = "duration_millis")]
    pub duration: Duration,
    pub stdout_log: PathBuf,
    pub stderr_log: PathBuf,
    pub success: bool,
    /// Last stderr lines, kept for error context.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stderr_tail: Vec<String>,
    /// Output readers were still running when the drain window closed.
    #[serde(default)]
    pub streams_truncated: bool,
    /// Display and log writes absorbed by the output boundary.
    #[serde(default)]
    pub write_failures: u64,
}

impl ExecutionOutcome {
    pub fn exit_code(&self) -> i32 {
        self.disposition.exit_code()
    }

    pub fn timed_out(&self) -> bool {
        self.disposition.is_timeout()
    }
}

pub(crate) mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
