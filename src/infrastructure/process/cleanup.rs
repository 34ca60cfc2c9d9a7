//! Cleanup run between retry attempts and during shutdown.
//!
//! Kills leftover processes spawned by the test tool (browsers, drivers)
//! and removes scratch directories so the next attempt starts clean.
//! Processes that belong to a supervised run still in progress are never
//! touched, so cleanup for one validator cannot kill a sibling's children.

use async_trait::async_trait;
use nix::sys::signal::Signal;
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::signals::{parse_stat, signal_process};
use super::tracker::ProcessTracker;
use crate::domain::models::{CleanupConfig, CleanupOutcome};
use crate::domain::ports::CleanupHook;

const PROC_ROOT: &str = "/proc";

/// A process visible in `/proc`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ProcEntry {
    pid: u32,
    ppid: u32,
    pgid: Option<u32>,
    uid: Option<u32>,
    cmdline: String,
}

/// Default cleanup hook: orphan reaping plus scratch directory removal.
#[derive(Debug, Clone)]
pub struct ProcessCleanup {
    process_patterns: Vec<String>,
    scratch_dirs: Vec<PathBuf>,
    proc_root: PathBuf,
    tracker: Option<Arc<ProcessTracker>>,
}

impl ProcessCleanup {
    pub fn new(process_patterns: Vec<String>, scratch_dirs: Vec<PathBuf>) -> Self {
        Self {
            process_patterns,
            scratch_dirs,
            proc_root: PathBuf::from(PROC_ROOT),
            tracker: None,
        }
    }

    /// Spare every process group still tracked as a live supervised run.
    #[must_use]
    pub fn with_tracker(mut self, tracker: Arc<ProcessTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn from_config(config: &CleanupConfig) -> Self {
        Self::new(config.process_patterns.clone(), config.scratch_dirs.clone())
    }

    /// Kill leftover processes matching the configured patterns.
    ///
    /// A match is only killed when it descends from this process, or when
    /// it has been re-parented to init and belongs to the same user.
    /// This process, its ancestors, and the process groups and
    /// descendants of tracked runs are never touched.
    async fn kill_orphans(&self) -> CleanupOutcome {
        let mut outcome = CleanupOutcome::default();
        if self.process_patterns.is_empty() {
            return outcome;
        }

        let proc_root = self.proc_root.clone();
        let patterns = self.process_patterns.clone();
        let live: HashSet<u32> = self
            .tracker
            .as_ref()
            .map(|t| t.pids().into_iter().collect())
            .unwrap_or_default();
        let candidates = tokio::task::spawn_blocking(move || {
            find_orphans(&proc_root, &patterns, std::process::id(), &live)
        })
        .await;

        let candidates = match candidates {
            Ok(Ok(found)) => found,
            Ok(Err(e)) => {
                outcome.errors.push(format!("process scan failed: {e}"));
                return outcome;
            }
            Err(e) => {
                outcome.errors.push(format!("process scan task failed: {e}"));
                return outcome;
            }
        };

        for entry in candidates {
            // A run may have started between the scan and now
            if self.is_live(&entry) {
                debug!(pid = entry.pid, "Process belongs to a live run, skipping");
                continue;
            }
            if signal_process(entry.pid, Signal::SIGKILL) {
                info!(pid = entry.pid, cmdline = %entry.cmdline, "Killed orphaned process");
                outcome.processes_killed += 1;
            } else {
                debug!(pid = entry.pid, "Orphan already gone");
            }
        }

        outcome
    }

    fn is_live(&self, entry: &ProcEntry) -> bool {
        self.tracker.as_ref().is_some_and(|t| {
            t.contains(entry.pid) || entry.pgid.is_some_and(|pgid| t.contains(pgid))
        })
    }

    async fn clear_scratch_dirs(&self) -> CleanupOutcome {
        let mut outcome = CleanupOutcome::default();

        for dir in &self.scratch_dirs {
            match tokio::fs::remove_dir_all(dir).await {
                Ok(()) => {
                    debug!(path = %dir.display(), "Removed scratch directory");
                    outcome.directories_removed.push(dir.clone());
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %dir.display(), error = %e, "Failed to remove scratch directory");
                    outcome
                        .errors
                        .push(format!("remove {}: {e}", dir.display()));
                }
            }
        }

        outcome
    }
}

#[async_trait]
impl CleanupHook for ProcessCleanup {
    async fn cleanup(&self) -> CleanupOutcome {
        let mut outcome = self.kill_orphans().await;
        outcome.merge(self.clear_scratch_dirs().await);

        info!(
            processes_killed = outcome.processes_killed,
            directories_removed = outcome.directories_removed.len(),
            errors = outcome.errors.len(),
            "Cleanup finished"
        );
        outcome
    }
}

fn find_orphans(
    proc_root: &Path,
    patterns: &[String],
    own_pid: u32,
    live: &HashSet<u32>,
) -> io::Result<Vec<ProcEntry>> {
    let entries = match std::fs::read_dir(proc_root) {
        Ok(entries) => entries,
        // No procfs on this platform, nothing to scan
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let processes: Vec<ProcEntry> = entries
        .filter_map(Result::ok)
        .filter_map(|e| e.file_name().to_str().and_then(|n| n.parse::<u32>().ok()))
        .filter_map(|pid| read_proc_entry(proc_root, pid))
        .collect();

    Ok(select_orphans(&processes, patterns, own_pid, live))
}

/// Pick the pattern-matching processes that are safe to kill.
///
/// `live` holds the pids of tracked runs. Each is a process group leader,
/// so anything in one of those groups or below one of those pids is
/// still owned by a running validator.
fn select_orphans(
    processes: &[ProcEntry],
    patterns: &[String],
    own_pid: u32,
    live: &HashSet<u32>,
) -> Vec<ProcEntry> {
    let parents: std::collections::HashMap<u32, u32> =
        processes.iter().map(|p| (p.pid, p.ppid)).collect();

    let mut protected = HashSet::from([own_pid]);
    let mut cursor = own_pid;
    while let Some(&parent) = parents.get(&cursor) {
        if parent == 0 || !protected.insert(parent) {
            break;
        }
        cursor = parent;
    }

    let own_uid = processes.iter().find(|p| p.pid == own_pid).and_then(|p| p.uid);

    let ancestors = |pid: u32| {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor = pid;
        while let Some(&parent) = parents.get(&cursor) {
            if parent == 0 || !seen.insert(parent) {
                break;
            }
            chain.push(parent);
            cursor = parent;
        }
        chain
    };
    let descends_from_us = |pid: u32| ancestors(pid).contains(&own_pid);
    let owned_by_live_run = |p: &ProcEntry| {
        live.contains(&p.pid)
            || p.pgid.is_some_and(|pgid| live.contains(&pgid))
            || ancestors(p.pid).iter().any(|a| live.contains(a))
    };

    processes
        .iter()
        .filter(|p| !protected.contains(&p.pid))
        .filter(|p| !owned_by_live_run(p))
        .filter(|p| patterns.iter().any(|pat| p.cmdline.contains(pat.as_str())))
        .filter(|p| descends_from_us(p.pid) || (p.ppid == 1 && own_uid.is_some() && p.uid == own_uid))
        .cloned()
        .collect()
}

fn read_proc_entry(proc_root: &Path, pid: u32) -> Option<ProcEntry> {
    let dir = proc_root.join(pid.to_string());
    let raw = std::fs::read(dir.join("cmdline")).ok()?;
    let cmdline = raw
        .split(|&b| b == 0)
        .filter(|part| !part.is_empty())
        .map(|part| String::from_utf8_lossy(part).into_owned())
        .collect::<Vec<_>>()
        .join(" ");

    let status = std::fs::read_to_string(dir.join("status")).ok()?;
    let field = |name: &str| {
        status
            .lines()
            .find_map(|l| l.strip_prefix(name))
            .and_then(|rest| rest.split_whitespace().next())
            .and_then(|v| v.parse::<u32>().ok())
    };

    let pgid = std::fs::read_to_string(dir.join("stat"))
        .ok()
        .and_then(|stat| parse_stat(&stat))
        .map(|stat| stat.pgid);

    Some(ProcEntry {
        pid,
        ppid: field("PPid:").unwrap_or(0),
        pgid,
        uid: field("Uid:"),
        cmdline,
    })
}
