//! Process supervisor
//!
//! Spawns a command in its own process group, captures both output
//! streams, enforces a wall-clock timeout with escalating signals and
//! always resolves to an `ExecutionOutcome`.

use async_trait::async_trait;
use nix::sys::signal::Signal;
use std::collections::BTreeMap;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use super::output_stream::{open_log_file, LineClassifier, OutputStreamManager, StreamSummary};
use super::signals::{group_is_running, signal_process_group};
use super::tracker::ProcessTracker;
use crate::domain::models::{
    CommandSpec, Config, ExecutionOutcome, ExitDisposition, ProcessHandle, ProcessState,
};
use crate::domain::ports::{DisplaySink, NullSink, ProcessRunner, StdoutSink};

const GROUP_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Builds the display sink for one run from its log label.
pub type SinkFactory = Arc<dyn Fn(&str) -> Box<dyn DisplaySink> + Send + Sync>;

/// Supervisor settings derived once from configuration.
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub grace_period: Duration,
    pub drain_timeout: Duration,
    pub log_dir: PathBuf,
    pub stderr_tail_lines: usize,
    /// Overlay applied to every child before the command's own variables
    pub env_overlay: BTreeMap<String, String>,
}

impl SupervisorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            grace_period: config.supervisor.grace_period(),
            drain_timeout: config.supervisor.drain_timeout(),
            log_dir: config.supervisor.log_dir.clone(),
            stderr_tail_lines: config.supervisor.stderr_tail_lines,
            env_overlay: config.environment.overlay(),
        }
    }
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(5),
            drain_timeout: Duration::from_secs(2),
            log_dir: PathBuf::from("test-logs"),
            stderr_tail_lines: 20,
            env_overlay: BTreeMap::new(),
        }
    }
}

/// Supervises external processes.
pub struct ProcessSupervisor {
    settings: SupervisorSettings,
    classifier: Arc<LineClassifier>,
    tracker: Arc<ProcessTracker>,
    sink_factory: SinkFactory,
}

impl ProcessSupervisor {
    /// Create a supervisor that does not display any output.
    pub fn new(
        settings: SupervisorSettings,
        classifier: Arc<LineClassifier>,
        tracker: Arc<ProcessTracker>,
    ) -> Self {
        Self {
            settings,
            classifier,
            tracker,
            sink_factory: Arc::new(|_| Box::new(NullSink)),
        }
    }

    /// Forward important lines to stdout, prefixed with the run label.
    #[must_use]
    pub fn with_stdout_display(mut self) -> Self {
        self.sink_factory = Arc::new(|label| Box::new(StdoutSink::with_prefix(label)));
        self
    }

    #[must_use]
    pub fn with_sink_factory(mut self, factory: SinkFactory) -> Self {
        self.sink_factory = factory;
        self
    }

    pub fn tracker(&self) -> &Arc<ProcessTracker> {
        &self.tracker
    }

    pub fn settings(&self) -> &SupervisorSettings {
        &self.settings
    }

    fn log_paths(&self, spec: &CommandSpec) -> (PathBuf, PathBuf) {
        let label = spec.log_label();
        (
            self.settings.log_dir.join(format!("{label}.stdout.log")),
            self.settings.log_dir.join(format!("{label}.stderr.log")),
        )
    }

    fn build_command(&self, spec: &CommandSpec) -> Command {
        let mut cmd = Command::new(spec.program());
        cmd.args(spec.arguments())
            .envs(&self.settings.env_overlay)
            .envs(spec.environment())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            // Own process group so signals reach the tool's descendants
            .process_group(0);

        if let Some(dir) = spec.working_dir() {
            cmd.current_dir(dir);
        }

        cmd
    }

    /// Run `spec` to completion, never taking longer than `timeout` plus
    /// the grace window (plus the output drain window).
    #[instrument(skip(self, spec), fields(command = %spec.display(), timeout = ?timeout))]
    pub async fn run(&self, spec: &CommandSpec, timeout: Duration) -> ExecutionOutcome {
        let started = Instant::now();
        let (stdout_log, stderr_log) = self.log_paths(spec);

        if let Err(e) = spec.validate() {
            return spawn_failed(e.to_string(), started, stdout_log, stderr_log);
        }

        // Truncate both logs before spawning so a failed spawn never
        // leaves stale output from a previous run behind.
        let stdout_writer = open_log_file(&stdout_log).await;
        let stderr_writer = open_log_file(&stderr_log).await;

        let mut child = match self.build_command(spec).spawn() {
            Ok(child) => child,
            Err(e) => {
                error!(program = spec.program(), error = %e, "Failed to spawn process");
                return spawn_failed(
                    format!("{}: {e}", spec.program()),
                    started,
                    stdout_log,
                    stderr_log,
                );
            }
        };

        let pid = child.id().unwrap_or(0);
        let mut handle = ProcessHandle::new(pid, spec.program(), spec.arguments().to_vec());
        handle.state = ProcessState::Running;
        self.tracker.track(handle);
        info!(pid, "Process started");

        let label = spec.log_label();
        let stdout_manager = OutputStreamManager::new(
            Arc::clone(&self.classifier),
            Some((self.sink_factory)(label)),
            stdout_writer,
        );
        let stderr_manager = OutputStreamManager::new(
            Arc::clone(&self.classifier),
            Some((self.sink_factory)(label)),
            stderr_writer,
        )
        .with_tail(self.settings.stderr_tail_lines);

        let (stdout_stop, stdout_stop_rx) = oneshot::channel();
        let (stderr_stop, stderr_stop_rx) = oneshot::channel();
        let stdout_task = child
            .stdout
            .take()
            .map(|out| tokio::spawn(stdout_manager.consume(out, Some(stdout_stop_rx))));
        let stderr_task = child
            .stderr
            .take()
            .map(|err| tokio::spawn(stderr_manager.consume(err, Some(stderr_stop_rx))));

        let disposition = tokio::select! {
            status = child.wait() => disposition_from_wait(status),
            () = tokio::time::sleep(timeout) => self.escalate(&mut child, pid).await,
        };

        self.tracker.set_state(pid, ProcessState::Exited);
        self.tracker.untrack(pid);

        let (stdout, stderr) = self
            .drain(stdout_task, stderr_task, stdout_stop, stderr_stop)
            .await;

        let duration = started.elapsed();
        let success = disposition == ExitDisposition::Exited { code: 0 };
        let streams_truncated = stdout.truncated || stderr.truncated;
        let write_failures = stdout.stats.write_failures() + stderr.stats.write_failures();

        if success {
            info!(pid, duration = ?duration, "Process completed successfully");
        } else {
            warn!(pid, disposition = %disposition, duration = ?duration, "Process failed");
        }

        ExecutionOutcome {
            disposition,
            duration,
            stdout_log,
            stderr_log,
            success,
            stderr_tail: stderr.tail,
            streams_truncated,
            write_failures,
        }
    }

    /// Graceful termination, grace window, then forceful kill.
    ///
    /// The whole process group gets the grace window, not just the leader:
    /// members still running once it closes are killed even when the
    /// leader itself exited on SIGTERM.
    async fn escalate(&self, child: &mut Child, pid: u32) -> ExitDisposition {
        self.tracker.set_state(pid, ProcessState::Terminating);
        warn!(pid, grace = ?self.settings.grace_period, "Timeout reached, sending SIGTERM");
        signal_process_group(pid, Signal::SIGTERM);

        let deadline = Instant::now() + self.settings.grace_period;
        let leader_exited =
            match tokio::time::timeout(self.settings.grace_period, child.wait()).await {
                Ok(status) => {
                    if let Err(e) = status {
                        warn!(pid, error = %e, "Failed to reap terminated process");
                    }
                    true
                }
                Err(_) => false,
            };

        if leader_exited {
            while group_is_running(pid) && Instant::now() < deadline {
                tokio::time::sleep(GROUP_POLL_INTERVAL).await;
            }
            if !group_is_running(pid) {
                return ExitDisposition::TimedOut { forced: false };
            }
            warn!(pid, "Process group members ignored SIGTERM, sending SIGKILL");
            signal_process_group(pid, Signal::SIGKILL);
            return ExitDisposition::TimedOut { forced: true };
        }

        warn!(pid, "Process ignored SIGTERM, sending SIGKILL");
        signal_process_group(pid, Signal::SIGKILL);
        if let Err(e) = child.kill().await {
            warn!(pid, error = %e, "Failed to kill process");
        }
        ExitDisposition::TimedOut { forced: true }
    }

    /// Wait for both readers, closing them once the drain window passes.
    async fn drain(
        &self,
        stdout_task: Option<JoinHandle<StreamSummary>>,
        stderr_task: Option<JoinHandle<StreamSummary>>,
        stdout_stop: oneshot::Sender<()>,
        stderr_stop: oneshot::Sender<()>,
    ) -> (StreamSummary, StreamSummary) {
        let mut stdout_task = stdout_task;
        let mut stderr_task = stderr_task;

        let both = async {
            let out = join_summary(stdout_task.as_mut()).await;
            let err = join_summary(stderr_task.as_mut()).await;
            (out, err)
        };

        if let Ok(summaries) = tokio::time::timeout(self.settings.drain_timeout, both).await {
            return summaries;
        }

        warn!(
            drain = ?self.settings.drain_timeout,
            "Output streams still open after exit, closing readers"
        );
        let _ = stdout_stop.send(());
        let _ = stderr_stop.send(());
        (
            join_summary(stdout_task.as_mut()).await,
            join_summary(stderr_task.as_mut()).await,
        )
    }
}

async fn join_summary(task: Option<&mut JoinHandle<StreamSummary>>) -> StreamSummary {
    match task {
        Some(handle) => match handle.await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(error = %e, "Output reader task failed");
                StreamSummary {
                    truncated: true,
                    ..StreamSummary::default()
                }
            }
        },
        None => StreamSummary::default(),
    }
}

fn disposition_from_wait(status: std::io::Result<ExitStatus>) -> ExitDisposition {
    match status {
        Ok(status) => match (status.code(), status.signal()) {
            (Some(code), _) => ExitDisposition::Exited { code },
            (None, Some(signal)) => ExitDisposition::Signaled { signal },
            (None, None) => ExitDisposition::Exited { code: -1 },
        },
        Err(e) => {
            error!(error = %e, "Failed to wait for process");
            ExitDisposition::Exited { code: -1 }
        }
    }
}

fn spawn_failed(
    message: String,
    started: Instant,
    stdout_log: PathBuf,
    stderr_log: PathBuf,
) -> ExecutionOutcome {
    ExecutionOutcome {
        disposition: ExitDisposition::SpawnFailed { message },
        duration: started.elapsed(),
        stdout_log,
        stderr_log,
        success: false,
        stderr_tail: Vec::new(),
        streams_truncated: false,
        write_failures: 0,
    }
}

#[async_trait]
impl ProcessRunner for ProcessSupervisor {
    async fn run(&self, spec: &CommandSpec, timeout: Duration) -> ExecutionOutcome {
        Self::run(self, spec, timeout).await
    }
}
