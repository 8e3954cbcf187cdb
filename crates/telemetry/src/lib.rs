//! Vigil Telemetry
//!
//! Delivers timestamped attention samples to the monitoring loop and keeps
//! the session's audit log. Uses a pluggable source architecture:
//!
//! - **UDP:** Live gaze feed, one datagram per sample
//! - **Scripted:** Pre-loaded payloads with fixed stamps (tests, demos)
//! - **Replay:** Observations re-read from a previous session log
//!
//! Records are written in append-only JSONL format for crash safety.

pub mod sources;
pub mod wire;
pub mod writer;

use async_trait::async_trait;
use vigil_common::error::VigilResult;
use vigil_session_model::{Sample, TimestampNs};

pub use sources::{ReplaySource, ScriptItem, ScriptedSource, UdpSource};
pub use wire::PayloadDecoder;
pub use writer::{JsonlRecorder, MemoryRecorder, TransitionRecorder};

/// Outcome of one receive.
#[derive(Debug, Clone, PartialEq)]
pub enum Received {
    /// A well-formed sample.
    Sample(Sample),

    /// A payload arrived but did not decode. It still consumes a seq.
    Rejected {
        seq: u64,
        arrival_ns: TimestampNs,
        reason: String,
    },

    /// The read timeout elapsed with nothing to deliver.
    TimedOut,

    /// The source has no further samples.
    Closed,
}

/// Trait for telemetry sources.
#[async_trait]
pub trait TelemetrySource: Send {
    /// Wait for the next sample. Arrival stamps must be taken as soon as
    /// the underlying receive returns.
    async fn recv(&mut self) -> VigilResult<Received>;

    /// Source description for logs and the session header.
    fn describe(&self) -> String;
}
