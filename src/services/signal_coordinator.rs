//! Process-wide shutdown coordination.
//!
//! One coordinator owns every signal listener of the process. Whatever
//! triggers it (SIGINT, SIGTERM, SIGQUIT, or a fatal orchestration
//! error) runs the same sequence exactly once: SIGTERM every tracked
//! process group, wait out the grace window, SIGKILL the survivors, run the
//! cleanup hook, then exit non-zero.

use nix::sys::signal::Signal;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{CleanupOutcome, ProcessState};
use crate::domain::ports::CleanupHook;
use crate::infrastructure::process::signals::{group_is_running, signal_process_group};
use crate::infrastructure::process::ProcessTracker;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Shared "shutdown in progress" marker.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Raise the flag; `true` only for the caller that raised it first.
    pub fn try_raise(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What started a shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownTrigger {
    Interrupt,
    Terminate,
    Quit,
    FatalError,
}

impl ShutdownTrigger {
    /// Process exit status used after the shutdown sequence.
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Interrupt => 130,
            Self::Quit => 131,
            Self::Terminate => 143,
            Self::FatalError => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Interrupt => "interrupt",
            Self::Terminate => "terminate",
            Self::Quit => "quit",
            Self::FatalError => "fatal_error",
        }
    }
}

/// Record of one completed shutdown sequence.
#[derive(Debug, Clone, Serialize)]
pub struct ShutdownReport {
    pub trigger: ShutdownTrigger,
    /// Pids that were sent the graceful signal
    pub terminated: Vec<u32>,
    /// Process groups (by leader pid) still running after the grace window
    pub killed: Vec<u32>,
    pub cleanup: CleanupOutcome,
    pub exit_code: i32,
}

type ExitAction = Arc<dyn Fn(i32) + Send + Sync>;

/// Drives tracked children through the escalating shutdown sequence.
pub struct SignalCoordinator {
    tracker: Arc<ProcessTracker>,
    cleanup: Arc<dyn CleanupHook>,
    grace_period: Duration,
    flag: ShutdownFlag,
    /// Exit code of the finished shutdown sequence
    finished: watch::Sender<Option<i32>>,
    exit_action: ExitAction,
}

impl SignalCoordinator {
    pub fn new(
        tracker: Arc<ProcessTracker>,
        cleanup: Arc<dyn CleanupHook>,
        grace_period: Duration,
    ) -> Self {
        Self {
            tracker,
            cleanup,
            grace_period,
            flag: ShutdownFlag::new(),
            finished: watch::Sender::new(None),
            exit_action: Arc::new(|code| std::process::exit(code)),
        }
    }

    /// Replace the final `process::exit` call.
    #[must_use]
    pub fn with_exit_action(mut self, action: impl Fn(i32) + Send + Sync + 'static) -> Self {
        self.exit_action = Arc::new(action);
        self
    }

    pub fn shutdown_flag(&self) -> ShutdownFlag {
        self.flag.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.flag.is_raised()
    }

    /// Wait for a started shutdown to finish and return its exit code.
    ///
    /// Returns `None` immediately when no shutdown was started.
    pub async fn wait_for_shutdown(&self) -> Option<i32> {
        let mut finished = self.finished.subscribe();
        if !self.is_shutting_down() {
            return None;
        }
        let code = *finished.wait_for(Option::is_some).await.ok()?;
        code
    }

    /// Register SIGINT, SIGTERM and SIGQUIT listeners.
    ///
    /// Must be called from within a tokio runtime. The returned task runs
    /// for the life of the process.
    pub fn install(self: &Arc<Self>) -> DomainResult<JoinHandle<()>> {
        let listen = |kind: SignalKind, name: &str| {
            signal(kind).map_err(|e| DomainError::SignalInstall(format!("{name}: {e}")))
        };
        let mut sigint = listen(SignalKind::interrupt(), "SIGINT")?;
        let mut sigterm = listen(SignalKind::terminate(), "SIGTERM")?;
        let mut sigquit = listen(SignalKind::quit(), "SIGQUIT")?;

        let coordinator = Arc::clone(self);
        let task = tokio::spawn(async move {
            loop {
                let trigger = tokio::select! {
                    Some(()) = sigint.recv() => ShutdownTrigger::Interrupt,
                    Some(()) = sigterm.recv() => ShutdownTrigger::Terminate,
                    Some(()) = sigquit.recv() => ShutdownTrigger::Quit,
                    else => break,
                };
                coordinator.handle_trigger(trigger);
            }
        });

        debug!("Signal handlers installed");
        Ok(task)
    }

    /// React to a trigger without blocking the listener.
    ///
    /// Returns `false` when a shutdown is already in progress; the trigger
    /// is then ignored.
    pub fn handle_trigger(self: &Arc<Self>, trigger: ShutdownTrigger) -> bool {
        // Raised here so waiters see the shutdown before the task is polled
        if !self.flag.try_raise() {
            info!(trigger = trigger.as_str(), "Shutdown already in progress, ignoring");
            return false;
        }

        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            let report = coordinator.run_sequence(trigger).await;
            (coordinator.exit_action)(report.exit_code);
        });
        true
    }

    /// Run the shutdown sequence.
    ///
    /// Returns `None` without doing anything when another shutdown already
    /// started.
    pub async fn shutdown(&self, trigger: ShutdownTrigger) -> Option<ShutdownReport> {
        if !self.flag.try_raise() {
            debug!(trigger = trigger.as_str(), "Duplicate shutdown request ignored");
            return None;
        }
        Some(self.run_sequence(trigger).await)
    }

    async fn run_sequence(&self, trigger: ShutdownTrigger) -> ShutdownReport {
        let handles = self.tracker.snapshot();
        warn!(
            trigger = trigger.as_str(),
            tracked = handles.len(),
            "Shutting down supervised processes"
        );

        let mut terminated = Vec::with_capacity(handles.len());
        for handle in &handles {
            self.tracker.set_state(handle.pid, ProcessState::Terminating);
            if signal_process_group(handle.pid, Signal::SIGTERM) {
                terminated.push(handle.pid);
            }
        }

        let deadline = Instant::now() + self.grace_period;
        let mut survivors = Self::survivors(&terminated);
        while !survivors.is_empty() && Instant::now() < deadline {
            sleep(POLL_INTERVAL).await;
            survivors = Self::survivors(&survivors);
        }

        let mut killed = Vec::new();
        for pid in survivors {
            warn!(pid, "Process group survived grace window, sending SIGKILL");
            if signal_process_group(pid, Signal::SIGKILL) {
                killed.push(pid);
            }
        }

        let cleanup = self.cleanup.cleanup().await;
        if !cleanup.is_clean() {
            error!(errors = ?cleanup.errors, "Cleanup during shutdown reported errors");
        }

        let report = ShutdownReport {
            trigger,
            terminated,
            killed,
            cleanup,
            exit_code: trigger.exit_code(),
        };
        info!(
            terminated = report.terminated.len(),
            killed = report.killed.len(),
            exit_code = report.exit_code,
            "Shutdown sequence complete"
        );
        self.finished.send_replace(Some(report.exit_code));
        report
    }

    /// Groups with a live member. A leader that already exited and was
    /// untracked can still leave descendants behind in its group.
    fn survivors(pgids: &[u32]) -> Vec<u32> {
        pgids.iter().copied().filter(|&pgid| group_is_running(pgid)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::NoopCleanup;

    fn coordinator() -> SignalCoordinator {
        SignalCoordinator::new(
            Arc::new(ProcessTracker::new()),
            Arc::new(NoopCleanup),
            Duration::from_millis(100),
        )
    }

    #[tokio::test]
    async fn test_shutdown_runs_once() {
        let coordinator = coordinator();

        let first = coordinator.shutdown(ShutdownTrigger::Terminate).await;
        assert_eq!(first.map(|r| r.exit_code), Some(143));
        assert!(coordinator.is_shutting_down());

        assert!(coordinator.shutdown(ShutdownTrigger::Interrupt).await.is_none());
        assert_eq!(coordinator.wait_for_shutdown().await, Some(143));
    }

    #[tokio::test]
    async fn test_wait_without_shutdown_returns_immediately() {
        assert_eq!(coordinator().wait_for_shutdown().await, None);
    }

    #[test]
    fn test_flag_first_raiser_wins() {
        let flag = ShutdownFlag::new();
        assert!(flag.try_raise());
        assert!(!flag.try_raise());
        assert!(flag.is_raised());
    }

    #[test]
    fn test_trigger_exit_codes() {
        assert_eq!(ShutdownTrigger::Interrupt.exit_code(), 130);
        assert_eq!(ShutdownTrigger::Quit.exit_code(), 131);
        assert_eq!(ShutdownTrigger::FatalError.exit_code(), 1);
    }
}
