//! Best-effort writes for captured process output.
//!
//! Every write on the output path goes through the helpers here. They
//! never return an error: the caller gets a `WriteOutcome` and bumps a
//! counter. A broken pipe is dropped, never re-opened or retried.

use serde::{Deserialize, Serialize};
use std::io;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::domain::ports::DisplaySink;

/// Result of a single best-effort write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    BrokenPipe,
    Failed(io::ErrorKind),
}

impl WriteOutcome {
    pub fn is_written(self) -> bool {
        matches!(self, Self::Written)
    }

    fn from_result(result: io::Result<()>) -> Self {
        match result {
            Ok(()) => Self::Written,
            Err(err) if is_broken_pipe(&err) => Self::BrokenPipe,
            Err(err) => Self::Failed(err.kind()),
        }
    }
}

/// Whether an error means the reader side has gone away.
pub fn is_broken_pipe(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset
    ) || err.raw_os_error() == Some(nix::libc::EPIPE)
}

/// Write `bytes` to an async writer, absorbing any failure.
pub async fn tolerant_write<W>(writer: &mut W, bytes: &[u8]) -> WriteOutcome
where
    W: AsyncWrite + Unpin + ?Sized,
{
    WriteOutcome::from_result(writer.write_all(bytes).await)
}

/// Flush an async writer, absorbing any failure.
pub async fn tolerant_flush<W>(writer: &mut W) -> WriteOutcome
where
    W: AsyncWrite + Unpin + ?Sized,
{
    WriteOutcome::from_result(writer.flush().await)
}

/// Forward one line to a display sink, absorbing any failure.
pub fn tolerant_display(sink: &mut dyn DisplaySink, line: &str) -> WriteOutcome {
    WriteOutcome::from_result(sink.write_line(line))
}

/// Write `text` and a newline to a blocking writer, then flush,
/// absorbing any failure.
pub fn tolerant_print<W>(writer: &mut W, text: &str) -> WriteOutcome
where
    W: io::Write + ?Sized,
{
    WriteOutcome::from_result(writeln!(writer, "{text}").and_then(|()| writer.flush()))
}

/// Counters kept by one output stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputStats {
    pub lines_total: u64,
    pub lines_displayed: u64,
    pub lines_suppressed_noise: u64,
    pub display_failures: u64,
    pub log_failures: u64,
    /// Subset of the failures above caused by a broken pipe
    pub broken_pipes: u64,
    /// The capture log could not be opened; counted as one failure
    #[serde(default)]
    pub log_unavailable: bool,
}

impl OutputStats {
    pub fn record_display(&mut self, outcome: WriteOutcome) {
        match outcome {
            WriteOutcome::Written => self.lines_displayed += 1,
            WriteOutcome::BrokenPipe => {
                self.display_failures += 1;
                self.broken_pipes += 1;
            }
            WriteOutcome::Failed(_) => self.display_failures += 1,
        }
    }

    pub fn record_log(&mut self, outcome: WriteOutcome) {
        match outcome {
            WriteOutcome::Written => {}
            WriteOutcome::BrokenPipe => {
                self.log_failures += 1;
                self.broken_pipes += 1;
            }
            WriteOutcome::Failed(_) => self.log_failures += 1,
        }
    }

    pub fn write_failures(&self) -> u64 {
        self.display_failures + self.log_failures + u64::from(self.log_unavailable)
    }

    pub fn merge(&mut self, other: &Self) {
        self.lines_total += other.lines_total;
        self.lines_displayed += other.lines_displayed;
        self.lines_suppressed_noise += other.lines_suppressed_noise;
        self.display_failures += other.display_failures;
        self.log_failures += other.log_failures;
        self.broken_pipes += other.broken_pipes;
        self.log_unavailable |= other.log_unavailable;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    struct ClosedPipe;

    impl AsyncWrite for ClosedPipe {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::from(io::ErrorKind::BrokenPipe)))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_broken_pipe_is_absorbed() {
        let mut writer = ClosedPipe;
        let outcome = tolerant_write(&mut writer, b"hello\n").await;
        assert_eq!(outcome, WriteOutcome::BrokenPipe);

        let mut stats = OutputStats::default();
        stats.record_log(outcome);
        assert_eq!(stats.log_failures, 1);
        assert_eq!(stats.broken_pipes, 1);
        assert_eq!(stats.write_failures(), 1);
    }

    #[tokio::test]
    async fn test_successful_write() {
        let mut buf: Vec<u8> = Vec::new();
        let outcome = tolerant_write(&mut buf, b"ok").await;
        assert!(outcome.is_written());
        assert_eq!(buf, b"ok");
    }

    struct ClosedStdout;

    impl io::Write for ClosedStdout {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from_raw_os_error(nix::libc::EPIPE))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_print_to_closed_stdout_is_absorbed() {
        assert_eq!(
            tolerant_print(&mut ClosedStdout, "report"),
            WriteOutcome::BrokenPipe
        );

        let mut buf: Vec<u8> = Vec::new();
        assert!(tolerant_print(&mut buf, "report").is_written());
        assert_eq!(buf, b"report\n");
    }

    #[test]
    fn test_raw_epipe_classified() {
        let err = io::Error::from_raw_os_error(nix::libc::EPIPE);
        assert!(is_broken_pipe(&err));
        assert!(!is_broken_pipe(&io::Error::from(io::ErrorKind::PermissionDenied)));
    }
}
