//! Display sink port for forwarded output lines.

use std::io::{self, Write};

/// Destination for important output lines.
///
/// Writes are best-effort: callers count failures and move on.
pub trait DisplaySink: Send {
    fn write_line(&mut self, line: &str) -> io::Result<()>;
}

/// Writes lines to the process's standard output.
#[derive(Debug, Default)]
pub struct StdoutSink {
    prefix: Option<String>,
}

impl StdoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefix every line, e.g. with the validator name.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }
}

impl DisplaySink for StdoutSink {
    fn write_line(&mut self, line: &str) -> io::Result<()> {
        let mut out = io::stdout().lock();
        match self.prefix {
            Some(ref prefix) => writeln!(out, "[{prefix}] {line}")?,
            None => writeln!(out, "{line}")?,
        }
        out.flush()
    }
}

/// Discards every line.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DisplaySink for NullSink {
    fn write_line(&mut self, _line: &str) -> io::Result<()> {
        Ok(())
    }
}
