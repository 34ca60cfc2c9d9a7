//! Output formatting utilities for the CLI.
//!
//! Everything printed here goes through `tolerant_print`: a reader that
//! closed stdout or stderr early must not change the exit code.

use serde::Serialize;
use std::io::{self, Write};
use tracing::debug;

use crate::infrastructure::process::{tolerant_print, WriteOutcome};

pub trait CommandOutput: Serialize {
    fn to_human(&self) -> String;
    fn to_json(&self) -> serde_json::Value;
}

/// Render `result` for the selected mode.
pub fn render<T: CommandOutput>(result: &T, json_mode: bool) -> String {
    if json_mode {
        serde_json::to_string_pretty(&result.to_json()).unwrap_or_default()
    } else {
        result.to_human()
    }
}

pub fn output<T: CommandOutput>(result: &T, json_mode: bool) {
    output_to(&mut io::stdout().lock(), result, json_mode);
}

/// Write `result` to `writer`, never failing.
pub fn output_to<T, W>(writer: &mut W, result: &T, json_mode: bool) -> WriteOutcome
where
    T: CommandOutput,
    W: Write + ?Sized,
{
    write_text(writer, &render(result, json_mode))
}

pub fn print_stdout(text: &str) -> WriteOutcome {
    write_text(&mut io::stdout().lock(), text)
}

pub fn print_stderr(text: &str) -> WriteOutcome {
    write_text(&mut io::stderr().lock(), text)
}

fn write_text<W: Write + ?Sized>(writer: &mut W, text: &str) -> WriteOutcome {
    let outcome = tolerant_print(writer, text);
    if !outcome.is_written() {
        debug!(?outcome, "Dropped command output");
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Summary {
        passed: usize,
    }

    impl CommandOutput for Summary {
        fn to_human(&self) -> String {
            format!("Passed: {}", self.passed)
        }

        fn to_json(&self) -> serde_json::Value {
            serde_json::json!({ "passed": self.passed })
        }
    }

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }
    }

    #[test]
    fn test_closed_pipe_does_not_panic() {
        let outcome = output_to(&mut ClosedPipe, &Summary { passed: 3 }, false);
        assert_eq!(outcome, WriteOutcome::BrokenPipe);
        let outcome = output_to(&mut ClosedPipe, &Summary { passed: 3 }, true);
        assert_eq!(outcome, WriteOutcome::BrokenPipe);
    }

    #[test]
    fn test_human_and_json_rendering() {
        let mut human = Vec::new();
        output_to(&mut human, &Summary { passed: 2 }, false);
        assert_eq!(String::from_utf8(human).unwrap(), "Passed: 2\n");

        let mut json = Vec::new();
        output_to(&mut json, &Summary { passed: 2 }, true);
        let value: serde_json::Value = serde_json::from_slice(&json).unwrap();
        assert_eq!(value["passed"], 2);
    }
}
