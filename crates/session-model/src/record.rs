//! Audit records for the Vigil session log.
//!
//! A session log is append-only JSONL: the first line is the session
//! header prefixed with `# `, followed by one [`SessionRecord`] per line.
//! Records are written for every observation a tracker receives, every
//! named state transition, and every sample rejected before reaching the
//! trackers.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::sample::{
    Channel, InvalidFlags, PhaseFlags, TimestampNs, TrackerPhase, TransitionKind,
};

/// Current log schema version.
pub const SCHEMA_VERSION: &str = "1.0";

/// Session metadata written as the first line of every log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionHeader {
    /// Schema version for forward compatibility.
    pub schema_version: String,

    /// Wall-clock time at session start (RFC 3339).
    pub epoch_wall: String,

    /// Human-readable description of the telemetry source.
    pub source: String,

    /// Thresholds each channel ran with.
    pub channels: Vec<ChannelThresholds>,
}

/// Thresholds of one channel, in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelThresholds {
    pub channel: Channel,
    pub glance_period_ns: u64,
    pub warning_period_ns: u64,
}

/// A single audit record with timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Monotonic nanoseconds since session start.
    #[serde(rename = "t")]
    pub timestamp_ns: TimestampNs,

    /// The record payload.
    #[serde(flatten)]
    pub kind: RecordKind,
}

/// Discriminated union of record types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecordKind {
    /// A sample as seen by one channel's tracker, before any transition.
    Observation {
        seq: u64,
        channel: Channel,
        sample: bool,
    },

    /// A named change of tracker state.
    Transition {
        channel: Channel,
        transition: TransitionKind,
        label: String,
        from: TrackerPhase,
        to: TrackerPhase,
        /// Flag view of `to`.
        flags: PhaseFlags,
    },

    /// A received payload that could not be decoded into a sample.
    Rejected { seq: u64, reason: String },
}

impl SessionRecord {
    /// Create an observation record.
    pub fn observation(timestamp_ns: TimestampNs, seq: u64, channel: Channel, sample: bool) -> Self {
        Self {
            timestamp_ns,
            kind: RecordKind::Observation {
                seq,
                channel,
                sample,
            },
        }
    }

    /// Create a transition record. The flag view is derived from `to`.
    pub fn transition(
        timestamp_ns: TimestampNs,
        channel: Channel,
        transition: TransitionKind,
        from: TrackerPhase,
        to: TrackerPhase,
    ) -> Self {
        Self {
            timestamp_ns,
            kind: RecordKind::Transition {
                channel,
                transition,
                label: transition.label().to_string(),
                from,
                to,
                flags: to.flags(),
            },
        }
    }

    /// Create a rejection record.
    pub fn rejected(timestamp_ns: TimestampNs, seq: u64, reason: impl Into<String>) -> Self {
        Self {
            timestamp_ns,
            kind: RecordKind::Rejected {
                seq,
                reason: reason.into(),
            },
        }
    }

    /// Timestamp as fractional seconds since session start.
    pub fn timestamp_secs(&self) -> f64 {
        self.timestamp_ns as f64 / 1_000_000_000.0
    }

    /// Channel this record belongs to, if any.
    pub fn channel(&self) -> Option<Channel> {
        match &self.kind {
            RecordKind::Observation { channel, .. } | RecordKind::Transition { channel, .. } => {
                Some(*channel)
            }
            RecordKind::Rejected { .. } => None,
        }
    }
}

/// Errors raised while reading a session log.
#[derive(Debug, thiserror::Error)]
pub enum LogParseError {
    #[error("session log is missing its '# ' header line")]
    MissingHeader,

    #[error("invalid header: {0}")]
    Header(#[source] serde_json::Error),

    #[error("invalid record on line {line}: {source}")]
    Record {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A fully parsed session log.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionLog {
    pub header: SessionHeader,
    pub records: Vec<SessionRecord>,
}

impl SessionLog {
    /// Parse log content: a `# {header}` line followed by JSONL records.
    pub fn parse(content: &str) -> Result<Self, LogParseError> {
        let mut lines = content
            .lines()
            .enumerate()
            .map(|(idx, line)| (idx + 1, line.trim()))
            .filter(|(_, line)| !line.is_empty());

        let header = match lines.next() {
            Some((_, line)) if line.starts_with('#') => {
                serde_json::from_str(line.trim_start_matches('#').trim())
                    .map_err(LogParseError::Header)?
            }
            _ => return Err(LogParseError::MissingHeader),
        };

        let records = lines
            .filter(|(_, line)| !line.starts_with('#'))
            .map(|(line, raw)| {
                serde_json::from_str(raw).map_err(|source| LogParseError::Record { line, source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { header, records })
    }

    /// Read and parse a log file.
    pub fn load(path: &Path) -> Result<Self, LogParseError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Thresholds recorded for a channel.
    pub fn thresholds(&self, channel: Channel) -> Option<ChannelThresholds> {
        self.header
            .channels
            .iter()
            .find(|c| c.channel == channel)
            .copied()
    }
}

/// Parse records from JSONL content (one JSON object per line).
/// Lines starting with `#` are skipped.
pub fn parse_records(jsonl: &str) -> Result<Vec<SessionRecord>, serde_json::Error> {
    jsonl
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(serde_json::from_str)
        .collect()
}

/// Serialize records to JSONL format.
pub fn serialize_records(records: &[SessionRecord]) -> Result<String, serde_json::Error> {
    let mut output = String::new();
    for record in records {
        output.push_str(&serde_json::to_string(record)?);
        output.push('\n');
    }
    Ok(output)
}

/// A problem found while auditing a session log.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LogIssue {
    #[error("record {index}: timestamp {timestamp_ns} is earlier than the previous record ({previous_ns})")]
    TimeWentBackwards {
        index: usize,
        timestamp_ns: TimestampNs,
        previous_ns: TimestampNs,
    },

    #[error("record {index}: {channel} skipped sample seq {missing} (jumped from {previous} to {seq})")]
    SequenceGap {
        index: usize,
        channel: Channel,
        previous: u64,
        seq: u64,
        missing: u64,
    },

    #[error("record {index}: {channel} observed sample seq {seq} out of order (last was {previous})")]
    SequenceOutOfOrder {
        index: usize,
        channel: Channel,
        previous: u64,
        seq: u64,
    },

    #[error("record {index}: {channel} {source}")]
    InvalidFlags {
        index: usize,
        channel: Channel,
        source: InvalidFlags,
    },

    #[error("record {index}: {channel} flags decode to {decoded} but transition targets {to}")]
    FlagsMismatch {
        index: usize,
        channel: Channel,
        decoded: TrackerPhase,
        to: TrackerPhase,
    },

    #[error("record {index}: {channel} transition starts from {from} but the tracker was {expected}")]
    BrokenChain {
        index: usize,
        channel: Channel,
        expected: TrackerPhase,
        from: TrackerPhase,
    },
}

impl LogIssue {
    /// Whether the issue indicates a tracker invariant violation, as
    /// opposed to a delivery or ordering problem.
    pub fn is_consistency_violation(&self) -> bool {
        matches!(
            self,
            LogIssue::InvalidFlags { .. }
                | LogIssue::FlagsMismatch { .. }
                | LogIssue::BrokenChain { .. }
        )
    }
}

/// Audit a record sequence. Returns every issue found, in log order.
///
/// Checks that timestamps never decrease, that each channel observes
/// every sample seq exactly once and in order (rejected samples count as
/// delivered), that every transition's flags decode to its target phase,
/// and that each channel's transitions chain from `Idle`.
pub fn validate_records(records: &[SessionRecord]) -> Vec<LogIssue> {
    let rejected: HashSet<u64> = records
        .iter()
        .filter_map(|r| match r.kind {
            RecordKind::Rejected { seq, .. } => Some(seq),
            _ => None,
        })
        .collect();

    let mut issues = Vec::new();
    let mut previous_ns: Option<TimestampNs> = None;
    let mut last_seq: HashMap<Channel, u64> = HashMap::new();
    let mut phase: HashMap<Channel, TrackerPhase> = HashMap::new();

    for (index, record) in records.iter().enumerate() {
        if let Some(prev) = previous_ns {
            if record.timestamp_ns < prev {
                issues.push(LogIssue::TimeWentBackwards {
                    index,
                    timestamp_ns: record.timestamp_ns,
                    previous_ns: prev,
                });
            }
        }
        previous_ns = Some(record.timestamp_ns);

        match &record.kind {
            RecordKind::Observation { seq, channel, .. } => {
                if let Some(&previous) = last_seq.get(channel) {
                    if *seq <= previous {
                        issues.push(LogIssue::SequenceOutOfOrder {
                            index,
                            channel: *channel,
                            previous,
                            seq: *seq,
                        });
                        continue;
                    }
                    if let Some(missing) = (previous + 1..*seq).find(|s| !rejected.contains(s)) {
                        issues.push(LogIssue::SequenceGap {
                            index,
                            channel: *channel,
                            previous,
                            seq: *seq,
                            missing,
                        });
                    }
                }
                last_seq.insert(*channel, *seq);
            }
            RecordKind::Transition {
                channel,
                from,
                to,
                flags,
                ..
            } => {
                match TrackerPhase::from_flags(*flags) {
                    Ok(decoded) if decoded != *to => issues.push(LogIssue::FlagsMismatch {
                        index,
                        channel: *channel,
                        decoded,
                        to: *to,
                    }),
                    Ok(_) => {}
                    Err(source) => issues.push(LogIssue::InvalidFlags {
                        index,
                        channel: *channel,
                        source,
                    }),
                }

                let expected = phase.get(channel).copied().unwrap_or_default();
                if expected != *from {
                    issues.push(LogIssue::BrokenChain {
                        index,
                        channel: *channel,
                        expected,
                        from: *from,
                    });
                }
                phase.insert(*channel, *to);
            }
            RecordKind::Rejected { .. } => {}
        }
    }

    issues
}

/// Per-channel activity totals for a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChannelSummary {
    pub observations: u64,
    pub transitions: u64,
    pub activations: u64,
    pub deactivations: u64,
    /// Total time the warning was on, closing any open warning at the
    /// last record's timestamp.
    pub warning_on_ns: u64,
}

/// Whole-session activity totals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub records: u64,
    pub rejected: u64,
    pub first_ns: Option<TimestampNs>,
    pub last_ns: Option<TimestampNs>,
    pub channels: BTreeMap<Channel, ChannelSummary>,
}

impl SessionSummary {
    /// Span between first and last record, in nanoseconds.
    pub fn duration_ns(&self) -> u64 {
        match (self.first_ns, self.last_ns) {
            (Some(first), Some(last)) => last.saturating_sub(first),
            _ => 0,
        }
    }
}

/// Compute activity totals from a record sequence.
pub fn summarize_records(records: &[SessionRecord]) -> SessionSummary {
    let mut summary = SessionSummary::default();
    let mut warning_since: HashMap<Channel, TimestampNs> = HashMap::new();

    for record in records {
        summary.records += 1;
        summary.first_ns.get_or_insert(record.timestamp_ns);
        summary.last_ns = Some(record.timestamp_ns);

        match &record.kind {
            RecordKind::Observation { channel, .. } => {
                summary.channels.entry(*channel).or_default().observations += 1;
            }
            RecordKind::Transition {
                channel,
                transition,
                ..
            } => {
                let entry = summary.channels.entry(*channel).or_default();
                entry.transitions += 1;
                match transition {
                    TransitionKind::WarningTriggered => {
                        entry.activations += 1;
                        warning_since.insert(*channel, record.timestamp_ns);
                    }
                    TransitionKind::WarningDisabled => {
                        entry.deactivations += 1;
                        if let Some(since) = warning_since.remove(channel) {
                            entry.warning_on_ns += record.timestamp_ns.saturating_sub(since);
                        }
                    }
                    _ => {}
                }
            }
            RecordKind::Rejected { .. } => summary.rejected += 1,
        }
    }

    if let Some(last) = summary.last_ns {
        for (channel, since) in warning_since {
            if let Some(entry) = summary.channels.get_mut(&channel) {
                entry.warning_on_ns += last.saturating_sub(since);
            }
        }
    }

    summary
}
