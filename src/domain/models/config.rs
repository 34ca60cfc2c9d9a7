use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use super::validation::ExecutionMode;

/// Main configuration structure for stablerun
///
/// Built once at startup and handed to each component's constructor;
/// nothing reads configuration from ambient global state afterwards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// External test tool invocation
    #[serde(default)]
    pub tool: ToolConfig,

    /// Process supervision settings
    #[serde(default)]
    pub supervisor: SupervisorConfig,

    /// Retry policy configuration
    #[serde(default)]
    pub retry: RetryConfig,

    /// Cleanup run between attempts and on shutdown
    #[serde(default)]
    pub cleanup: CleanupConfig,

    /// Output line classification
    #[serde(default)]
    pub output: OutputConfig,

    /// Tuning values applied to the child environment
    #[serde(default)]
    pub environment: EnvironmentConfig,

    /// Validator selection and execution mode
    #[serde(default)]
    pub validation: ValidationConfig,

    /// Report artifacts
    #[serde(default)]
    pub report: ReportConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// External test tool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ToolConfig {
    /// Executable to spawn
    #[serde(default = "default_tool_command")]
    pub command: String,

    /// Arguments placed before any pass-through arguments
    #[serde(default = "default_tool_args")]
    pub args: Vec<String>,

    /// Working directory for the tool (defaults to current dir)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
}

fn default_tool_command() -> String {
    "npx".to_string()
}

fn default_tool_args() -> Vec<String> {
    vec!["playwright".to_string(), "test".to_string()]
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            command: default_tool_command(),
            args: default_tool_args(),
            working_dir: None,
        }
    }
}

/// Process supervision configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SupervisorConfig {
    /// Wall-clock timeout for one supervised run
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Window between the graceful and the forceful signal
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,

    /// How long to wait for output readers after the child exits
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,

    /// Directory receiving the per-run stdout/stderr capture logs
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Number of trailing stderr lines kept on the outcome
    #[serde(default = "default_stderr_tail_lines")]
    pub stderr_tail_lines: usize,
}

const fn default_timeout_secs() -> u64 {
    600
}

const fn default_grace_period_secs() -> u64 {
    5
}

const fn default_drain_timeout_ms() -> u64 {
    2000
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("test-logs")
}

const fn default_stderr_tail_lines() -> usize {
    20
}

impl SupervisorConfig {
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub const fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    pub const fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            grace_period_secs: default_grace_period_secs(),
            drain_timeout_ms: default_drain_timeout_ms(),
            log_dir: default_log_dir(),
            stderr_tail_lines: default_stderr_tail_lines(),
        }
    }
}

/// Retry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Maximum number of attempts, first attempt included
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Fixed delay between attempts in milliseconds
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_delay_ms() -> u64 {
    5000
}

impl RetryConfig {
    pub const fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_delay_ms(),
        }
    }
}

/// Cleanup hook configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CleanupConfig {
    /// Substrings matched against process command lines; matching
    /// processes are treated as orphans of the test tool and killed
    #[serde(default = "default_process_patterns")]
    pub process_patterns: Vec<String>,

    /// Scratch directories removed between attempts
    #[serde(default = "default_scratch_dirs")]
    pub scratch_dirs: Vec<PathBuf>,
}

fn default_process_patterns() -> Vec<String> {
    ["playwright", "chromium", "chrome", "firefox", "webkit", "headless_shell"]
        .iter()
        .map(ToString::to_string)
        .collect()
}

fn default_scratch_dirs() -> Vec<PathBuf> {
    vec![
        PathBuf::from("test-results"),
        PathBuf::from("playwright-report/.tmp"),
    ]
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            process_patterns: default_process_patterns(),
            scratch_dirs: default_scratch_dirs(),
        }
    }
}

/// Output line classification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OutputConfig {
    /// Lines matching any of these regexes are shown on the display sink
    #[serde(default = "default_important_patterns")]
    pub important_patterns: Vec<String>,

    /// Lines matching any of these regexes are never shown
    #[serde(default = "default_noise_patterns")]
    pub noise_patterns: Vec<String>,

    /// Forward important lines to stdout at all
    #[serde(default = "default_true")]
    pub display: bool,
}

fn default_important_patterns() -> Vec<String> {
    [
        r"✓|✘|passed|failed|flaky|skipped",
        r"(?i)\berror\b",
        r"Running \d+ tests?",
        r"^\s*\d+\)\s",
    ]
    .iter()
    .map(ToString::to_string)
    .collect()
}

fn default_noise_patterns() -> Vec<String> {
    [r"DeprecationWarning", r"ExperimentalWarning", r"^\s*at\s+.*node_modules"]
        .iter()
        .map(ToString::to_string)
        .collect()
}

const fn default_true() -> bool {
    true
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            important_patterns: default_important_patterns(),
            noise_patterns: default_noise_patterns(),
            display: true,
        }
    }
}

/// Process-wide tuning values applied to every child environment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EnvironmentConfig {
    /// Heap ceiling for the tool's runtime, in megabytes
    #[serde(default = "default_max_heap_mb")]
    pub max_heap_mb: Option<u32>,

    /// Worker thread pool size for the tool's runtime
    #[serde(default = "default_thread_pool_size")]
    pub thread_pool_size: Option<u32>,

    /// Disable telemetry in the tool and its dependencies
    #[serde(default = "default_true")]
    pub telemetry_opt_out: bool,

    /// Base URL of the system under test
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Additional variables passed through verbatim
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

#[allow(clippy::unnecessary_wraps)]
const fn default_max_heap_mb() -> Option<u32> {
    Some(4096)
}

#[allow(clippy::unnecessary_wraps)]
const fn default_thread_pool_size() -> Option<u32> {
    Some(4)
}

impl EnvironmentConfig {
    /// Build the environment overlay handed to every spawned child.
    pub fn overlay(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();

        if let Some(mb) = self.max_heap_mb {
            env.insert(
                "NODE_OPTIONS".to_string(),
                format!("--max-old-space-size={mb}"),
            );
        }
        if let Some(size) = self.thread_pool_size {
            env.insert("UV_THREADPOOL_SIZE".to_string(), size.to_string());
        }
        if self.telemetry_opt_out {
            env.insert("DO_NOT_TRACK".to_string(), "1".to_string());
            env.insert("NEXT_TELEMETRY_DISABLED".to_string(), "1".to_string());
        }
        if let Some(ref url) = self.base_url {
            env.insert("BASE_URL".to_string(), url.clone());
        }

        // Explicit entries win over derived ones
        for (key, value) in &self.extra {
            env.insert(key.clone(), value.clone());
        }

        env
    }
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            max_heap_mb: default_max_heap_mb(),
            thread_pool_size: default_thread_pool_size(),
            telemetry_opt_out: true,
            base_url: None,
            extra: BTreeMap::new(),
        }
    }
}

/// Validation run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ValidationConfig {
    /// Parallel or sequential execution of validator units
    #[serde(default)]
    pub mode: ExecutionMode,

    /// In sequential mode, stop after the first failing unit
    #[serde(default)]
    pub stop_on_first_failure: bool,

    /// Register the supervised test tool as a validator unit
    #[serde(default = "default_true")]
    pub include_tool: bool,

    /// Additional command checks
    #[serde(default)]
    pub checks: Vec<CheckConfig>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::default(),
            stop_on_first_failure: false,
            include_tool: true,
            checks: Vec::new(),
        }
    }
}

/// A command run once as an independent validator unit
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CheckConfig {
    /// Unique validator name
    pub name: String,

    /// Executable to spawn
    pub command: String,

    /// Command arguments
    #[serde(default)]
    pub args: Vec<String>,

    /// Per-check timeout (falls back to the supervisor timeout)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// Report a failure as a warning instead
    #[serde(default)]
    pub allow_failure: bool,
}

/// Report output format printed to stdout
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Json,
    Human,
    #[default]
    Both,
}

impl std::str::FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "human" => Ok(Self::Human),
            "both" => Ok(Self::Both),
            other => Err(format!("Invalid report format: {other}. Must be one of: json, human, both")),
        }
    }
}

/// Report artifact configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ReportConfig {
    /// Structured report path
    #[serde(default = "default_json_path")]
    pub json_path: PathBuf,

    /// Human-readable summary path
    #[serde(default = "default_summary_path")]
    pub summary_path: PathBuf,

    /// What to print on stdout once the run finishes
    #[serde(default)]
    pub format: ReportFormat,
}

fn default_json_path() -> PathBuf {
    PathBuf::from("validation-report.json")
}

fn default_summary_path() -> PathBuf {
    PathBuf::from("validation-summary.txt")
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            json_path: default_json_path(),
            summary_path: default_summary_path(),
            format: ReportFormat::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for orchestrator log files (stderr only when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,

    /// Log file rotation: daily, hourly, never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_rotation() -> String {
    "never".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}
