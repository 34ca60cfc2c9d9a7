//! Line buffering, classification and capture of child process output.

use regex::RegexSet;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, BufWriter};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::tolerant_write::{tolerant_display, tolerant_flush, tolerant_write, OutputStats};
use crate::domain::ports::DisplaySink;

/// Lines longer than this are split so a runaway writer cannot grow the buffer.
const MAX_LINE_BYTES: usize = 1024 * 1024;

const READ_CHUNK_BYTES: usize = 8192;

/// Log sink for one stream.
pub type LogWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Classification of a completed output line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineClass {
    /// Matches an important pattern and no noise pattern
    Important,
    /// Matches a noise pattern
    Noise,
    Plain,
}

/// Compiled important/noise pattern sets.
#[derive(Debug, Clone)]
pub struct LineClassifier {
    important: RegexSet,
    noise: RegexSet,
}

impl LineClassifier {
    pub fn new(important: &[String], noise: &[String]) -> Result<Self, regex::Error> {
        Ok(Self {
            important: RegexSet::new(important)?,
            noise: RegexSet::new(noise)?,
        })
    }

    /// Classifier that displays nothing.
    pub fn silent() -> Self {
        Self {
            important: RegexSet::empty(),
            noise: RegexSet::empty(),
        }
    }

    pub fn classify(&self, line: &str) -> LineClass {
        if self.noise.is_match(line) {
            LineClass::Noise
        } else if self.important.is_match(line) {
            LineClass::Important
        } else {
            LineClass::Plain
        }
    }
}

/// What one stream produced once it ended.
#[derive(Debug, Clone, Default)]
pub struct StreamSummary {
    pub stats: OutputStats,
    /// Trailing lines, when tail capture was enabled
    pub tail: Vec<String>,
    /// Reading stopped before end of stream
    pub truncated: bool,
}

/// Open a capture log, truncating whatever a previous run left behind.
pub async fn open_log_file(path: &Path) -> Option<LogWriter> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            warn!(path = %parent.display(), error = %e, "Failed to create log directory");
        }
    }
    match tokio::fs::File::create(path).await {
        Ok(file) => Some(Box::new(BufWriter::new(file))),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to open capture log, output will not be logged");
            None
        }
    }
}

/// Buffers one output stream into lines, forwards important lines to a
/// display sink and appends every line to a log.
///
/// Display and log writes are independent: a failure on one never
/// affects the other, and neither ever unwinds the caller.
pub struct OutputStreamManager {
    classifier: Arc<LineClassifier>,
    display: Option<Box<dyn DisplaySink>>,
    log: Option<LogWriter>,
    buffer: Vec<u8>,
    stats: OutputStats,
    tail: VecDeque<String>,
    tail_capacity: usize,
}

impl OutputStreamManager {
    pub fn new(
        classifier: Arc<LineClassifier>,
        display: Option<Box<dyn DisplaySink>>,
        log: Option<LogWriter>,
    ) -> Self {
        let stats = OutputStats {
            log_unavailable: log.is_none(),
            ..OutputStats::default()
        };
        Self {
            classifier,
            display,
            log,
            buffer: Vec::new(),
            stats,
            tail: VecDeque::new(),
            tail_capacity: 0,
        }
    }

    /// Keep the last `lines` lines for the summary.
    #[must_use]
    pub fn with_tail(mut self, lines: usize) -> Self {
        self.tail_capacity = lines;
        self
    }

    pub fn stats(&self) -> &OutputStats {
        &self.stats
    }

    /// Accept a chunk of raw bytes and process every completed line.
    pub async fn feed(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.process_line(&line[..line.len() - 1]).await;
        }

        if self.buffer.len() >= MAX_LINE_BYTES {
            let line = std::mem::take(&mut self.buffer);
            self.process_line(&line).await;
        }
    }

    /// Flush the partial trailing line and the log.
    pub async fn finish(mut self) -> StreamSummary {
        if !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            self.process_line(&line).await;
        }
        if let Some(log) = self.log.as_mut() {
            let outcome = tolerant_flush(log).await;
            self.stats.record_log(outcome);
        }
        StreamSummary {
            stats: self.stats,
            tail: self.tail.into_iter().collect(),
            truncated: false,
        }
    }

    /// Read `reader` to end of stream.
    ///
    /// When `stop` fires the manager stops reading, flushes what it has
    /// and reports the stream as truncated.
    pub async fn consume<R>(mut self, mut reader: R, stop: Option<oneshot::Receiver<()>>) -> StreamSummary
    where
        R: AsyncRead + Unpin,
    {
        let mut chunk = vec![0u8; READ_CHUNK_BYTES];
        let mut truncated = false;
        let mut stop_armed = stop.is_some();
        let mut stop = stop.unwrap_or_else(|| oneshot::channel().1);

        loop {
            tokio::select! {
                biased;
                signal = &mut stop, if stop_armed => {
                    if signal.is_ok() {
                        debug!("Stream drain window closed, stopping reader");
                        truncated = true;
                        break;
                    }
                    stop_armed = false;
                }
                read = reader.read(&mut chunk) => match read {
                    Ok(0) => break,
                    Ok(n) => self.feed(&chunk[..n]).await,
                    Err(e) => {
                        warn!(error = %e, "Failed to read child output stream");
                        break;
                    }
                },
            }
        }

        let mut summary = self.finish().await;
        summary.truncated = truncated;
        summary
    }

    async fn process_line(&mut self, raw: &[u8]) {
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        let line = String::from_utf8_lossy(raw);
        self.stats.lines_total += 1;

        match self.classifier.classify(&line) {
            LineClass::Important => {
                if let Some(sink) = self.display.as_deref_mut() {
                    let outcome = tolerant_display(sink, &line);
                    self.stats.record_display(outcome);
                }
            }
            LineClass::Noise => self.stats.lines_suppressed_noise += 1,
            LineClass::Plain => {}
        }

        if let Some(log) = self.log.as_mut() {
            let mut bytes = Vec::with_capacity(raw.len() + 1);
            bytes.extend_from_slice(raw);
            bytes.push(b'\n');
            let outcome = tolerant_write(log, &bytes).await;
            self.stats.record_log(outcome);
        }

        if self.tail_capacity > 0 {
            if self.tail.len() == self.tail_capacity {
                self.tail.pop_front();
            }
            self.tail.push_back(line.into_owned());
        }
    }
}
