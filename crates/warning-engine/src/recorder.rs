//! Session recording off the poll loop.
//!
//! Log writes block on file I/O, so the recorder lives on a blocking worker
//! behind a bounded queue. The loop only enqueues; a full queue drops the
//! record and counts it rather than stalling the next receive.

use serde::Serialize;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use vigil_common::error::{VigilError, VigilResult};
use vigil_session_model::SessionRecord;
use vigil_telemetry::TransitionRecorder;

enum Command {
    Record(SessionRecord),
    Flush(oneshot::Sender<VigilResult<()>>),
}

/// Outcome counters of the recorder worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecorderStats {
    pub written: u64,
    /// Records or flushes the recorder itself failed on.
    pub failures: u64,
    /// Records never enqueued because the queue was full or the worker gone.
    pub dropped: u64,
}

/// Handle to the recorder worker.
pub struct RecorderHandle {
    queue: mpsc::Sender<Command>,
    task: JoinHandle<RecorderStats>,
    dropped: u64,
}

impl RecorderHandle {
    /// Move `recorder` onto a blocking worker fed by a queue of `capacity`
    /// records.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(recorder: Box<dyn TransitionRecorder>, capacity: usize) -> Self {
        let (queue, rx) = mpsc::channel(capacity.max(1));
        let task = tokio::task::spawn_blocking(move || drain(recorder, rx));
        Self {
            queue,
            task,
            dropped: 0,
        }
    }

    /// Enqueue a record. Never blocks.
    pub fn submit(&mut self, record: SessionRecord) {
        let reason = match self.queue.try_send(Command::Record(record)) {
            Ok(()) => return,
            Err(TrySendError::Full(_)) => "queue full",
            Err(TrySendError::Closed(_)) => "worker stopped",
        };
        self.dropped += 1;
        if self.dropped.is_power_of_two() {
            tracing::warn!(dropped = self.dropped, reason, "Dropping session records");
        }
    }

    /// Records dropped so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Wait until every record enqueued so far is written, then flush.
    pub async fn flush(&self) -> VigilResult<()> {
        let (reply, done) = oneshot::channel();
        self.queue
            .send(Command::Flush(reply))
            .await
            .map_err(|_| VigilError::recorder("recorder worker stopped"))?;
        done.await
            .map_err(|_| VigilError::recorder("recorder worker stopped"))?
    }

    /// Drain the queue, flush, stop the worker, and return its counters.
    pub async fn shutdown(self) -> RecorderStats {
        let dropped = self.dropped;
        drop(self.queue);
        let mut stats = match self.task.await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::warn!(error = %e, "Recorder worker join failed");
                RecorderStats::default()
            }
        };
        stats.dropped = dropped;
        stats
    }
}

fn drain(
    mut recorder: Box<dyn TransitionRecorder>,
    mut rx: mpsc::Receiver<Command>,
) -> RecorderStats {
    let mut stats = RecorderStats::default();

    while let Some(command) = rx.blocking_recv() {
        match command {
            Command::Record(record) => match recorder.record(&record) {
                Ok(()) => stats.written += 1,
                Err(e) => failed(&mut stats, e),
            },
            Command::Flush(reply) => {
                let result = recorder.flush();
                if let Err(e) = &result {
                    stats.failures += 1;
                    tracing::warn!(error = %e, "Session log flush failed");
                }
                let _ = reply.send(result);
            }
        }
    }

    if let Err(e) = recorder.flush() {
        failed(&mut stats, e);
    }
    stats
}

fn failed(stats: &mut RecorderStats, e: VigilError) {
    stats.failures += 1;
    if stats.failures.is_power_of_two() {
        tracing::warn!(failures = stats.failures, error = %e, "Failed to record session entry");
    } else {
        tracing::debug!(failures = stats.failures, error = %e, "Failed to record session entry");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};
    use vigil_session_model::Channel;
    use vigil_telemetry::MemoryRecorder;

    fn observation(seq: u64) -> SessionRecord {
        SessionRecord::observation(seq * 1_000_000, seq, Channel::Visual, false)
    }

    /// Holds every write until the gate is released.
    struct GatedRecorder {
        gate: Arc<Mutex<()>>,
        inner: MemoryRecorder,
    }

    impl TransitionRecorder for GatedRecorder {
        fn record(&mut self, record: &SessionRecord) -> VigilResult<()> {
            let _held = self.gate.lock().unwrap();
            self.inner.record(record)
        }

        fn flush(&mut self) -> VigilResult<()> {
            Ok(())
        }
    }

    struct BrokenRecorder;

    impl TransitionRecorder for BrokenRecorder {
        fn record(&mut self, _record: &SessionRecord) -> VigilResult<()> {
            Err(VigilError::recorder("disk full"))
        }

        fn flush(&mut self) -> VigilResult<()> {
            Err(VigilError::recorder("disk full"))
        }
    }

    #[tokio::test]
    async fn test_flush_waits_for_queued_records() {
        let memory = MemoryRecorder::new();
        let mut handle = RecorderHandle::spawn(Box::new(memory.clone()), 16);
        for seq in 0..5 {
            handle.submit(observation(seq));
        }
        handle.flush().await.unwrap();
        assert_eq!(memory.len(), 5);

        let stats = handle.shutdown().await;
        assert_eq!(stats.written, 5);
        assert_eq!(stats.dropped, 0);
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        let gate = Arc::new(Mutex::new(()));
        let memory = MemoryRecorder::new();
        let held = gate.lock().unwrap();
        let mut handle = RecorderHandle::spawn(
            Box::new(GatedRecorder {
                gate: gate.clone(),
                inner: memory.clone(),
            }),
            2,
        );

        let started = Instant::now();
        for seq in 0..10 {
            handle.submit(observation(seq));
        }
        assert!(started.elapsed() < Duration::from_millis(50));
        // At most one in the writer plus two queued.
        assert!(handle.dropped() >= 7);

        drop(held);
        let stats = handle.shutdown().await;
        assert_eq!(stats.written + stats.dropped, 10);
        assert_eq!(memory.len() as u64, stats.written);
    }

    #[tokio::test]
    async fn test_recorder_failures_are_counted() {
        let mut handle = RecorderHandle::spawn(Box::new(BrokenRecorder), 16);
        handle.submit(observation(0));
        handle.submit(observation(1));
        assert!(handle.flush().await.is_err());

        let stats = handle.shutdown().await;
        assert_eq!(stats.written, 0);
        // Two records, the explicit flush, and the final flush.
        assert_eq!(stats.failures, 4);
    }
}
