//! Samples, channels, and tracker phases.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Monotonic timestamp in nanoseconds since session start.
pub type TimestampNs = u64;

/// An independent warning modality. Each channel owns its own tracker,
/// thresholds, and actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Visual,
    Auditory,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Visual, Channel::Auditory];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Visual => "visual",
            Channel::Auditory => "auditory",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One attention observation as delivered by a telemetry source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    /// Position of this sample in the session's receive order.
    pub seq: u64,

    /// `true` when the operator's gaze is inside the area of interest.
    pub in_aoi: bool,

    /// Arrival time, stamped right after the receive returned.
    #[serde(rename = "t")]
    pub arrival_ns: TimestampNs,
}

impl Sample {
    pub fn new(seq: u64, in_aoi: bool, arrival_ns: TimestampNs) -> Self {
        Self {
            seq,
            in_aoi,
            arrival_ns,
        }
    }

    /// Arrival time as fractional seconds since session start.
    pub fn arrival_secs(&self) -> f64 {
        self.arrival_ns as f64 / 1_000_000_000.0
    }
}

/// Externally visible effect of a tracker step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actuation {
    Activate,
    Deactivate,
}

impl fmt::Display for Actuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actuation::Activate => f.write_str("activate"),
            Actuation::Deactivate => f.write_str("deactivate"),
        }
    }
}

/// The five valid attention-tracker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrackerPhase {
    /// No timers running, warning off.
    #[default]
    Idle,
    /// Timing sustained inattention.
    Pending,
    /// Inattention timer running, operator glanced back.
    PendingReprieve,
    /// Warning on, operator still away.
    Active,
    /// Warning on, operator glanced back.
    ActiveReprieve,
}

/// Flag view of a phase, as written to the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhaseFlags {
    pub warning_active: bool,
    pub in_warning_window: bool,
    pub in_glance_window: bool,
}

/// A flag triple that corresponds to none of the five valid phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error(
    "invalid tracker flags: warning_active={}, in_warning_window={}, in_glance_window={}",
    .0.warning_active,
    .0.in_warning_window,
    .0.in_glance_window
)]
pub struct InvalidFlags(pub PhaseFlags);

impl TrackerPhase {
    pub fn flags(&self) -> PhaseFlags {
        let (warning_active, in_warning_window, in_glance_window) = match self {
            TrackerPhase::Idle => (false, false, false),
            TrackerPhase::Pending => (false, true, false),
            TrackerPhase::PendingReprieve => (false, true, true),
            TrackerPhase::Active => (true, false, false),
            TrackerPhase::ActiveReprieve => (true, false, true),
        };
        PhaseFlags {
            warning_active,
            in_warning_window,
            in_glance_window,
        }
    }

    /// Decode a flag triple. Three of the eight combinations are invalid.
    pub fn from_flags(flags: PhaseFlags) -> Result<Self, InvalidFlags> {
        match (
            flags.warning_active,
            flags.in_warning_window,
            flags.in_glance_window,
        ) {
            (false, false, false) => Ok(TrackerPhase::Idle),
            (false, true, false) => Ok(TrackerPhase::Pending),
            (false, true, true) => Ok(TrackerPhase::PendingReprieve),
            (true, false, false) => Ok(TrackerPhase::Active),
            (true, false, true) => Ok(TrackerPhase::ActiveReprieve),
            _ => Err(InvalidFlags(flags)),
        }
    }

    /// Whether the channel's warning is currently on.
    pub fn is_warning_active(&self) -> bool {
        matches!(self, TrackerPhase::Active | TrackerPhase::ActiveReprieve)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TrackerPhase::Idle => "idle",
            TrackerPhase::Pending => "pending",
            TrackerPhase::PendingReprieve => "pending_reprieve",
            TrackerPhase::Active => "active",
            TrackerPhase::ActiveReprieve => "active_reprieve",
        }
    }
}

impl fmt::Display for TrackerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named state transitions, each with the human-readable audit label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    WarningDetectionStarted,
    GlanceDetectionStarted,
    WarningTriggered,
    GlanceDetectionEnded,
    WarningAverted,
    WarningDisabled,
}

impl TransitionKind {
    pub fn label(&self) -> &'static str {
        match self {
            TransitionKind::WarningDetectionStarted => "warning detection started",
            TransitionKind::GlanceDetectionStarted => "glance detection started",
            TransitionKind::WarningTriggered => "warning triggered",
            TransitionKind::GlanceDetectionEnded => "glance detection ended",
            TransitionKind::WarningAverted => "warning detection and glance detection ended",
            TransitionKind::WarningDisabled => "warning disabled",
        }
    }

    /// Actuation implied by this transition, if any.
    pub fn actuation(&self) -> Option<Actuation> {
        match self {
            TransitionKind::WarningTriggered => Some(Actuation::Activate),
            TransitionKind::WarningDisabled => Some(Actuation::Deactivate),
            _ => None,
        }
    }
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
