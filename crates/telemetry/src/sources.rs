//! Telemetry source implementations.
//!
//! Each source assigns receive-order sequence numbers and stamps arrival
//! times; decoding failures are surfaced as [`Received::Rejected`] so the
//! monitoring loop can record and skip them.

use std::collections::{HashSet, VecDeque};
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use vigil_common::clock::SessionClock;
use vigil_common::config::TelemetryConfig;
use vigil_common::error::{VigilError, VigilResult};
use vigil_session_model::{RecordKind, Sample, SessionLog, TimestampNs};

use crate::wire::PayloadDecoder;
use crate::{Received, TelemetrySource};

/// Live gaze feed over UDP, one sample per datagram.
pub struct UdpSource {
    socket: UdpSocket,
    /// One byte past the accepted payload size, so oversize datagrams show.
    buffer: Vec<u8>,
    max_payload: usize,
    decoder: PayloadDecoder,
    clock: SessionClock,
    read_timeout: Option<Duration>,
    next_seq: u64,
}

impl UdpSource {
    /// Bind the listener described by `config`. Arrival stamps are taken
    /// from `clock`.
    pub async fn bind(config: &TelemetryConfig, clock: SessionClock) -> VigilResult<Self> {
        let socket = UdpSocket::bind(config.bind).await.map_err(|e| {
            VigilError::telemetry(format!("Failed to bind UDP listener on {}: {e}", config.bind))
        })?;

        let local = socket.local_addr()?;
        tracing::info!(
            addr = %local,
            buffer_size = config.buffer_size,
            read_timeout_ms = ?config.read_timeout_ms,
            "UDP telemetry listener bound"
        );

        Ok(Self {
            socket,
            buffer: vec![0u8; config.buffer_size + 1],
            max_payload: config.buffer_size,
            decoder: PayloadDecoder::new(config.field.clone()),
            clock,
            read_timeout: config.read_timeout(),
            next_seq: 0,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> VigilResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

#[async_trait]
impl TelemetrySource for UdpSource {
    async fn recv(&mut self) -> VigilResult<Received> {
        let result = match self.read_timeout {
            Some(limit) => {
                match tokio::time::timeout(limit, self.socket.recv_from(&mut self.buffer)).await {
                    Ok(result) => result,
                    Err(_) => return Ok(Received::TimedOut),
                }
            }
            None => self.socket.recv_from(&mut self.buffer).await,
        };
        let arrival_ns = self.clock.elapsed_ns();

        let (len, peer) =
            result.map_err(|e| VigilError::telemetry(format!("UDP receive failed: {e}")))?;

        let seq = self.next_seq;
        self.next_seq += 1;

        if len > self.max_payload {
            return Ok(Received::Rejected {
                seq,
                arrival_ns,
                reason: format!("payload exceeds buffer_size ({} bytes)", self.max_payload),
            });
        }

        match self.decoder.decode(&self.buffer[..len]) {
            Ok(in_aoi) => {
                tracing::trace!(seq, %peer, in_aoi, "Sample received");
                Ok(Received::Sample(Sample::new(seq, in_aoi, arrival_ns)))
            }
            Err(e) => Ok(Received::Rejected {
                seq,
                arrival_ns,
                reason: e.to_string(),
            }),
        }
    }

    fn describe(&self) -> String {
        match self.socket.local_addr() {
            Ok(addr) => format!("udp://{addr}"),
            Err(_) => "udp://unbound".to_string(),
        }
    }
}

/// One step of a scripted feed.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptItem {
    /// A raw payload arriving at the given stamp.
    Payload(Vec<u8>, TimestampNs),
    /// A receive that times out.
    Timeout,
}

/// Source that plays back a fixed script, then closes.
pub struct ScriptedSource {
    items: VecDeque<ScriptItem>,
    decoder: PayloadDecoder,
    next_seq: u64,
}

impl ScriptedSource {
    /// Create a source from raw script items.
    pub fn new(items: Vec<ScriptItem>) -> Self {
        Self {
            items: items.into(),
            decoder: PayloadDecoder::default(),
            next_seq: 0,
        }
    }

    /// Create a source from well-formed `(in_aoi, arrival_ns)` samples.
    pub fn from_samples(samples: &[(bool, TimestampNs)]) -> Self {
        Self::new(
            samples
                .iter()
                .map(|&(in_aoi, at)| {
                    ScriptItem::Payload(PayloadDecoder::encode_literal(in_aoi).to_vec(), at)
                })
                .collect(),
        )
    }

    /// Use a custom decoder (e.g. a different JSON field name).
    pub fn with_decoder(mut self, decoder: PayloadDecoder) -> Self {
        self.decoder = decoder;
        self
    }

    /// Script items not yet delivered.
    pub fn remaining(&self) -> usize {
        self.items.len()
    }
}

#[async_trait]
impl TelemetrySource for ScriptedSource {
    async fn recv(&mut self) -> VigilResult<Received> {
        let Some(item) = self.items.pop_front() else {
            return Ok(Received::Closed);
        };

        match item {
            ScriptItem::Timeout => Ok(Received::TimedOut),
            ScriptItem::Payload(payload, arrival_ns) => {
                let seq = self.next_seq;
                self.next_seq += 1;
                Ok(match self.decoder.decode(&payload) {
                    Ok(in_aoi) => Received::Sample(Sample::new(seq, in_aoi, arrival_ns)),
                    Err(e) => Received::Rejected {
                        seq,
                        arrival_ns,
                        reason: e.to_string(),
                    },
                })
            }
        }
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

/// Source that re-feeds the samples of a previous session log with their
/// recorded stamps and sequence numbers.
///
/// Each sample appears once per channel in a log; only its first
/// occurrence is replayed.
pub struct ReplaySource {
    items: VecDeque<Received>,
    origin: String,
}

impl ReplaySource {
    pub fn from_log(log: &SessionLog, origin: impl Into<String>) -> Self {
        let mut seen = HashSet::new();
        let mut items = VecDeque::new();

        for record in &log.records {
            match &record.kind {
                RecordKind::Observation { seq, sample, .. } => {
                    if seen.insert(*seq) {
                        items.push_back(Received::Sample(Sample::new(
                            *seq,
                            *sample,
                            record.timestamp_ns,
                        )));
                    }
                }
                RecordKind::Rejected { seq, reason } => {
                    if seen.insert(*seq) {
                        items.push_back(Received::Rejected {
                            seq: *seq,
                            arrival_ns: record.timestamp_ns,
                            reason: reason.clone(),
                        });
                    }
                }
                RecordKind::Transition { .. } => {}
            }
        }

        Self {
            items,
            origin: origin.into(),
        }
    }

    /// Number of samples (including rejections) left to replay.
    pub fn remaining(&self) -> usize {
        self.items.len()
    }
}

#[async_trait]
impl TelemetrySource for ReplaySource {
    async fn recv(&mut self) -> VigilResult<Received> {
        Ok(self.items.pop_front().unwrap_or(Received::Closed))
    }

    fn describe(&self) -> String {
        format!("replay://{}", self.origin)
    }
}
