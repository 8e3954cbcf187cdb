//! Append-only session log recording.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use vigil_common::error::{VigilError, VigilResult};
use vigil_session_model::{
    Channel, SessionHeader, SessionRecord, TimestampNs, TrackerPhase, TransitionKind,
};

/// Sink for session audit records. Appends must preserve call order.
pub trait TransitionRecorder: Send {
    /// Append one record.
    fn record(&mut self, record: &SessionRecord) -> VigilResult<()>;

    /// Push buffered records to durable storage.
    fn flush(&mut self) -> VigilResult<()>;

    /// Append a sample as seen by one channel.
    fn record_observation(
        &mut self,
        seq: u64,
        channel: Channel,
        in_aoi: bool,
        arrival_ns: TimestampNs,
    ) -> VigilResult<()> {
        self.record(&SessionRecord::observation(arrival_ns, seq, channel, in_aoi))
    }

    /// Append a named state transition.
    fn record_transition(
        &mut self,
        channel: Channel,
        transition: TransitionKind,
        from: TrackerPhase,
        to: TrackerPhase,
        at: TimestampNs,
    ) -> VigilResult<()> {
        self.record(&SessionRecord::transition(at, channel, transition, from, to))
    }

    /// Append a payload that failed to decode.
    fn record_rejection(
        &mut self,
        seq: u64,
        reason: &str,
        arrival_ns: TimestampNs,
    ) -> VigilResult<()> {
        self.record(&SessionRecord::rejected(arrival_ns, seq, reason))
    }
}

/// Writes records to a JSONL file in append-only mode.
pub struct JsonlRecorder {
    writer: BufWriter<File>,
    path: PathBuf,
    records_written: u64,
    flush_every: u64,
}

impl JsonlRecorder {
    /// Create a new log at `path`, writing the header as the first line.
    pub fn new(path: PathBuf, header: &SessionHeader) -> VigilResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;

        let mut writer = BufWriter::new(file);

        // Write header as a comment line (prefixed with #)
        let header_json = serde_json::to_string(header)?;
        writeln!(writer, "# {header_json}")
            .map_err(|e| VigilError::recorder(format!("Failed to write header: {e}")))?;
        writer
            .flush()
            .map_err(|e| VigilError::recorder(format!("Failed to flush header: {e}")))?;

        Ok(Self {
            writer,
            path,
            records_written: 0,
            flush_every: 1,
        })
    }

    /// Create a run-scoped log in `dir`, named after the session stamp
    /// (`session-20260114-093012.jsonl`). An existing file is never
    /// overwritten; a numeric suffix is added instead.
    pub fn create_in(dir: &Path, stamp: &str, header: &SessionHeader) -> VigilResult<Self> {
        std::fs::create_dir_all(dir)?;
        let mut path = dir.join(format!("session-{stamp}.jsonl"));
        let mut attempt = 1;
        while path.exists() {
            path = dir.join(format!("session-{stamp}-{attempt}.jsonl"));
            attempt += 1;
        }
        Self::new(path, header)
    }

    /// Flush after every `n` records. Values below 1 are treated as 1.
    pub fn with_flush_every(mut self, n: u64) -> Self {
        self.flush_every = n.max(1);
        self
    }

    /// Number of records written.
    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    /// Path to the output file.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl TransitionRecorder for JsonlRecorder {
    fn record(&mut self, record: &SessionRecord) -> VigilResult<()> {
        let json = serde_json::to_string(record)?;
        writeln!(self.writer, "{json}")
            .map_err(|e| VigilError::recorder(format!("Failed to write record: {e}")))?;
        self.records_written += 1;

        if self.records_written % self.flush_every == 0 {
            self.flush()?;
        }

        Ok(())
    }

    fn flush(&mut self) -> VigilResult<()> {
        self.writer
            .flush()
            .map_err(|e| VigilError::recorder(format!("Failed to flush records: {e}")))?;
        Ok(())
    }
}

impl Drop for JsonlRecorder {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// In-memory recorder. Clones share the same buffer, so a test (or the
/// replay command) can keep a handle while the session owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecorder {
    records: Arc<Mutex<Vec<SessionRecord>>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn records(&self) -> Vec<SessionRecord> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TransitionRecorder for MemoryRecorder {
    fn record(&mut self, record: &SessionRecord) -> VigilResult<()> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(record.clone());
        Ok(())
    }

    fn flush(&mut self) -> VigilResult<()> {
        Ok(())
    }
}
