//! Append-only JSON-lines access log.
//!
//! Requests never touch the file. [`AccessLog::record`] serializes the record
//! and hands the line to a bounded queue; a dedicated writer thread owns the
//! file and appends each line with a single `write_all`. A full queue drops
//! the record instead of waiting, so a stalled disk costs log lines, not
//! latency.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;

use tokio::sync::mpsc::{self, error::TrySendError};

use super::{AccessRecord, DecisionSink};
use crate::observability::metrics;

/// Lines buffered for the writer before new records are dropped.
pub const DEFAULT_QUEUE_CAPACITY: usize = 8192;

/// File sink writing one JSON object per line.
#[derive(Debug)]
pub struct AccessLog {
    path: PathBuf,
    queue: Option<mpsc::Sender<Vec<u8>>>,
    writer: Option<JoinHandle<()>>,
    dropped: AtomicU64,
}

impl AccessLog {
    /// Open (or create) the log file, creating parent directories as needed.
    pub fn open(path: impl AsRef<Path>, queue_capacity: usize) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let log = Self::with_writer(path, file, queue_capacity)?;
        tracing::info!(path = ?log.path, queue_capacity, "Access log opened");
        Ok(log)
    }

    /// Log to any writer. `path` only labels diagnostics.
    pub fn with_writer<W>(path: impl Into<PathBuf>, writer: W, queue_capacity: usize) -> io::Result<Self>
    where
        W: Write + Send + 'static,
    {
        let path = path.into();
        let (queue, lines) = mpsc::channel(queue_capacity.max(1));

        let label = path.clone();
        let writer = std::thread::Builder::new()
            .name("access-log".to_string())
            .spawn(move || drain(writer, lines, &label))?;

        Ok(Self {
            path,
            queue: Some(queue),
            writer: Some(writer),
            dropped: AtomicU64::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records dropped because the writer fell behind.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

fn drain<W: Write>(mut writer: W, mut lines: mpsc::Receiver<Vec<u8>>, path: &Path) {
    while let Some(line) = lines.blocking_recv() {
        if let Err(e) = writer.write_all(&line).and_then(|()| writer.flush()) {
            tracing::error!(path = ?path, error = %e, "Failed to write access log record");
        }
    }
    tracing::debug!(path = ?path, "Access log writer stopped");
}

impl DecisionSink for AccessLog {
    fn record(&self, record: &AccessRecord) {
        let mut line = match serde_json::to_vec(record) {
            Ok(line) => line,
            Err(e) => {
                tracing::error!(path = ?self.path, error = %e, "Failed to encode access log record");
                return;
            }
        };
        line.push(b'\n');

        let Some(queue) = &self.queue else {
            return;
        };
        match queue.try_send(line) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                metrics::record_access_log_drop();
                tracing::warn!(path = ?self.path, dropped, "Access log queue full; record dropped");
            }
            Err(TrySendError::Closed(_)) => {
                tracing::error!(path = ?self.path, "Access log writer is gone; record dropped");
            }
        }
    }
}

impl Drop for AccessLog {
    /// Closes the queue and waits for buffered lines to reach the writer.
    fn drop(&mut self) {
        self.queue.take();
        if let Some(writer) = self.writer.take() {
            if writer.join().is_err() {
                tracing::error!(path = ?self.path, "Access log writer panicked");
            }
        }
    }
}
