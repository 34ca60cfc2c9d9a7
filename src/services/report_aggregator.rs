//! Report aggregation and rendering.
//!
//! Counts results, derives the overall exit code, and renders the JSON
//! artifact and the human-readable summary. Persisting either artifact is
//! best-effort: a failed write is logged and never changes the exit code.

use chrono::Utc;
use comfy_table::{presets, Cell, CellAlignment, ContentArrangement, Table};
use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    ExecutionMode, ReportConfig, ValidationReport, ValidatorResult, TIMEOUT_EXIT_CODE,
};

/// Run-level facts the results alone do not carry.
#[derive(Debug, Clone, Default)]
pub struct AggregationContext {
    pub mode: ExecutionMode,
    pub skipped: Vec<String>,
    pub duration: Duration,
}

/// Which artifacts reached disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistOutcome {
    pub json_written: Option<PathBuf>,
    pub summary_written: Option<PathBuf>,
    pub failures: Vec<String>,
}

impl PersistOutcome {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct ReportAggregator;

impl ReportAggregator {
    pub fn aggregate(results: Vec<ValidatorResult>) -> ValidationReport {
        Self::aggregate_with(results, AggregationContext::default())
    }

    pub fn aggregate_with(
        results: Vec<ValidatorResult>,
        context: AggregationContext,
    ) -> ValidationReport {
        let passed = results.iter().filter(|r| r.success && !r.has_warnings()).count();
        let warned = results.iter().filter(|r| r.success && r.has_warnings()).count();
        let failed = results.iter().filter(|r| !r.success).count();
        let stream_write_failures = results.iter().map(|r| r.stream_write_failures).sum();

        ValidationReport {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            mode: context.mode,
            overall_exit_code: overall_exit_code(&results),
            results,
            passed,
            warned,
            failed,
            skipped: context.skipped,
            duration_ms: u64::try_from(context.duration.as_millis()).unwrap_or(u64::MAX),
            stream_write_failures,
        }
    }

    /// Structured artifact.
    pub fn render_json(report: &ValidationReport) -> DomainResult<String> {
        serde_json::to_string_pretty(report)
            .map_err(|e| DomainError::ReportGeneration(format!("JSON rendering failed: {e}")))
    }

    /// Human-readable summary: result table, errors, warnings, totals.
    pub fn render_summary(report: &ValidationReport) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Validation summary ({} mode, run {})",
            report.mode.as_str(),
            report.run_id
        );
        let _ = writeln!(out, "{}", results_table(report));

        let errors = dedup_prefixed(report.results.iter().map(|r| (&r.name, &r.errors)));
        if !errors.is_empty() {
            let _ = writeln!(out, "\nErrors:");
            for line in &errors {
                let _ = writeln!(out, "  - {line}");
            }
        }

        let warnings = dedup_prefixed(report.results.iter().map(|r| (&r.name, &r.warnings)));
        if !warnings.is_empty() {
            let _ = writeln!(out, "\nWarnings:");
            for line in &warnings {
                let _ = writeln!(out, "  - {line}");
            }
        }

        let _ = writeln!(
            out,
            "\nPassed: {}  Warned: {}  Failed: {}  Skipped: {}  Total time: {}",
            report.passed,
            report.warned,
            report.failed,
            report.skipped.len(),
            format_millis(report.duration_ms)
        );
        if report.stream_write_failures > 0 {
            let _ = writeln!(
                out,
                "Output write failures: {}",
                report.stream_write_failures
            );
        }
        let _ = writeln!(out, "Exit code: {}", report.overall_exit_code);
        out
    }

    /// Write the JSON report and the summary to the configured paths.
    pub async fn persist(report: &ValidationReport, config: &ReportConfig) -> DomainResult<PersistOutcome> {
        let json = Self::render_json(report)?;
        let summary = Self::render_summary(report);

        let mut outcome = PersistOutcome::default();
        match write_artifact(&config.json_path, json.as_bytes()).await {
            Ok(()) => outcome.json_written = Some(config.json_path.clone()),
            Err(e) => {
                warn!(path = %config.json_path.display(), error = %e, "Failed to write JSON report");
                outcome
                    .failures
                    .push(format!("{}: {e}", config.json_path.display()));
            }
        }
        match write_artifact(&config.summary_path, summary.as_bytes()).await {
            Ok(()) => outcome.summary_written = Some(config.summary_path.clone()),
            Err(e) => {
                warn!(path = %config.summary_path.display(), error = %e, "Failed to write summary");
                outcome
                    .failures
                    .push(format!("{}: {e}", config.summary_path.display()));
            }
        }

        Ok(outcome)
    }
}

/// 0 when every result succeeded, 124 when a failure was a timeout, else 1.
fn overall_exit_code(results: &[ValidatorResult]) -> i32 {
    let mut failures = results.iter().filter(|r| !r.success).peekable();
    if failures.peek().is_none() {
        0
    } else if failures.any(|r| r.timed_out) {
        TIMEOUT_EXIT_CODE
    } else {
        1
    }
}

fn results_table(report: &ValidationReport) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Validator", "Status", "Duration", "Errors", "Warnings"]);

    for result in &report.results {
        let status = match (result.success, result.has_warnings(), result.timed_out) {
            (true, false, _) => "PASS",
            (true, true, _) => "WARN",
            (false, _, true) => "TIMEOUT",
            (false, _, false) => "FAIL",
        };
        table.add_row(vec![
            Cell::new(&result.name),
            Cell::new(status),
            Cell::new(format_millis(result.duration_ms)).set_alignment(CellAlignment::Right),
            Cell::new(result.errors.len()).set_alignment(CellAlignment::Right),
            Cell::new(result.warnings.len()).set_alignment(CellAlignment::Right),
        ]);
    }
    for name in &report.skipped {
        table.add_row(vec![
            Cell::new(name),
            Cell::new("SKIPPED"),
            Cell::new("-"),
            Cell::new("-"),
            Cell::new("-"),
        ]);
    }
    table
}

fn dedup_prefixed<'a>(
    entries: impl Iterator<Item = (&'a String, &'a Vec<String>)>,
) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut lines = Vec::new();
    for (name, messages) in entries {
        for message in messages {
            let line = format!("[{name}] {message}");
            if seen.insert(line.clone()) {
                lines.push(line);
            }
        }
    }
    lines
}

fn format_millis(ms: u64) -> String {
    if ms < 1000 {
        format!("{ms}ms")
    } else {
        format!("{:.1}s", ms as f64 / 1000.0)
    }
}

async fn write_artifact(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, contents).await?;
    debug!(path = %path.display(), bytes = contents.len(), "Wrote report artifact");
    Ok(())
}
