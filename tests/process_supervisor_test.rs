#![cfg(unix)]

mod common;

use stablerun::domain::models::{CommandSpec, ExitDisposition};
use stablerun::domain::ports::CleanupHook;
use stablerun::infrastructure::process::{
    LineClassifier, ProcessCleanup, ProcessSupervisor, ProcessTracker, SupervisorSettings,
};
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

const GRACE: Duration = Duration::from_secs(1);

fn supervisor(log_dir: &Path) -> ProcessSupervisor {
    supervisor_with_tracker(log_dir, Arc::new(ProcessTracker::new()))
}

fn supervisor_with_tracker(log_dir: &Path, tracker: Arc<ProcessTracker>) -> ProcessSupervisor {
    ProcessSupervisor::new(
        SupervisorSettings {
            grace_period: GRACE,
            drain_timeout: Duration::from_millis(500),
            log_dir: log_dir.to_path_buf(),
            ..SupervisorSettings::default()
        },
        Arc::new(LineClassifier::silent()),
        tracker,
    )
}

/// Running and not a zombie, per procfs.
fn is_running(pid: u32) -> bool {
    std::fs::read_to_string(format!("/proc/{pid}/stat"))
        .ok()
        .and_then(|stat| {
            let rest = &stat[stat.rfind(')')? + 1..];
            rest.split_whitespace().next().map(|state| state != "Z")
        })
        .unwrap_or(false)
}

#[tokio::test]
async fn test_timeout_terminates_within_grace_window() {
    common::setup_test_logging();
    let dir = common::temp_dir();
    let supervisor = supervisor(dir.path());

    let started = Instant::now();
    let outcome = supervisor
        .run(
            &CommandSpec::new("sleep").arg("5").label("sleeper"),
            Duration::from_millis(200),
        )
        .await;
    let elapsed = started.elapsed();

    assert!(outcome.timed_out());
    assert!(!outcome.success);
    assert_eq!(outcome.exit_code(), 124);
    assert!(elapsed >= Duration::from_millis(200), "{elapsed:?}");
    // Timeout, grace window and drain window at most
    assert!(elapsed < Duration::from_millis(200) + GRACE + Duration::from_millis(500));
    assert!(supervisor.tracker().is_empty());
}

#[tokio::test]
async fn test_sigterm_ignoring_process_is_killed() {
    let dir = common::temp_dir();
    let outcome = supervisor(dir.path())
        .run(
            &CommandSpec::new("/bin/sh")
                .args(["-c", "trap '' TERM; while true; do sleep 0.1; done"])
                .label("stubborn"),
            Duration::from_millis(200),
        )
        .await;

    assert_eq!(outcome.disposition, ExitDisposition::TimedOut { forced: true });
    assert_eq!(outcome.exit_code(), 124);
}

#[tokio::test]
async fn test_stdout_log_holds_every_line() {
    let dir = common::temp_dir();
    let outcome = supervisor(dir.path())
        .run(
            &CommandSpec::new("printf").arg("line1\\nline2\\n").label("printer"),
            Duration::from_secs(10),
        )
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.stdout_log, dir.path().join("printer.stdout.log"));
    let log = std::fs::read_to_string(&outcome.stdout_log).unwrap();
    assert_eq!(log.lines().collect::<Vec<_>>(), vec!["line1", "line2"]);
    assert!(!outcome.streams_truncated);
}

#[tokio::test]
async fn test_missing_executable_exits_127() {
    let dir = common::temp_dir();
    let outcome = supervisor(dir.path())
        .run(
            &CommandSpec::new("stablerun-no-such-tool"),
            Duration::from_secs(1),
        )
        .await;

    assert!(outcome.disposition.is_spawn_failure());
    assert_eq!(outcome.exit_code(), 127);
    assert!(!outcome.success);
}

#[tokio::test]
async fn test_signaled_child_reports_128_plus_signal() {
    let dir = common::temp_dir();
    let outcome = supervisor(dir.path())
        .run(
            &CommandSpec::new("/bin/sh").args(["-c", "kill -9 $$"]),
            Duration::from_secs(10),
        )
        .await;

    assert_eq!(outcome.disposition, ExitDisposition::Signaled { signal: 9 });
    assert_eq!(outcome.exit_code(), 137);
}

#[tokio::test]
async fn test_timeout_kills_group_members_that_ignore_sigterm() {
    let dir = common::temp_dir();
    let pidfile = dir.path().join("straggler.pid");

    let started = Instant::now();
    let outcome = supervisor(dir.path())
        .run(
            &CommandSpec::new("/bin/sh")
                .args([
                    "-c",
                    "(trap '' TERM; exec sleep 30) & echo $! > \"$1\"; sleep 30",
                    "sh",
                ])
                .arg(pidfile.to_string_lossy())
                .label("straggler"),
            Duration::from_millis(300),
        )
        .await;
    let elapsed = started.elapsed();

    assert_eq!(outcome.disposition, ExitDisposition::TimedOut { forced: true });
    assert!(!outcome.streams_truncated);
    assert!(elapsed < Duration::from_millis(300) + GRACE + Duration::from_millis(500));

    let straggler: u32 = std::fs::read_to_string(&pidfile)
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    assert!(common::wait_for(|| !is_running(straggler), 1000).await);
}

#[tokio::test]
async fn test_cleanup_spares_live_sibling_run() {
    let dir = common::temp_dir();
    let tracker = Arc::new(ProcessTracker::new());
    let supervisor = Arc::new(supervisor_with_tracker(dir.path(), Arc::clone(&tracker)));

    let sibling = {
        let supervisor = Arc::clone(&supervisor);
        tokio::spawn(async move {
            supervisor
                .run(
                    &CommandSpec::new("/bin/sh")
                        .args(["-c", "sleep 1; : stablerun_cleanup_marker"])
                        .label("sibling"),
                    Duration::from_secs(10),
                )
                .await
        })
    };
    // Untracked leftover from an earlier attempt
    let mut leftover = tokio::process::Command::new("/bin/sh")
        .args(["-c", "while :; do sleep 0.1; done; : stablerun_cleanup_marker"])
        .kill_on_drop(true)
        .spawn()
        .unwrap();

    assert!(common::wait_for(|| tracker.len() == 1, 2000).await);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let cleanup = ProcessCleanup::new(vec!["stablerun_cleanup_marker".to_string()], Vec::new())
        .with_tracker(Arc::clone(&tracker));
    let cleaned = cleanup.cleanup().await;

    assert_eq!(cleaned.processes_killed, 1);
    assert_eq!(leftover.wait().await.unwrap().signal(), Some(9));

    let outcome = sibling.await.unwrap();
    assert!(outcome.success, "{:?}", outcome.disposition);
}
