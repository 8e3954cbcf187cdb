//! Attention hysteresis state machine.
//!
//! ```text
//!            false                    elapsed(warning) >= warning_period
//!   Idle ───────────► Pending ─────────────────────────────────► Active
//!    ▲                 │   ▲                                    │   ▲
//!    │           true  │   │ false, glance too short      true  │   │ false, glance too short
//!    │    (in window)  ▼   │                                    ▼   │
//!    └─────────── PendingReprieve                         ActiveReprieve
//!     glance long enough                                        │
//!    ▲                                                          │
//!    └──────────────────────────────────────────────────────────┘
//!                 glance long enough (deactivate)
//! ```
//!
//! Elapsed times are measured between arrival timestamps. Thresholds are
//! inclusive: an elapsed time equal to the period fires. An aborted glance
//! returns to `Pending` with the original warning timer intact, so brief
//! glances never delay a trigger.

use vigil_session_model::{
    Actuation, Channel, SessionRecord, TimestampNs, TrackerPhase, TransitionKind,
};

use crate::thresholds::Thresholds;

/// Tracker state. Timer start stamps exist only in the states that run
/// that timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackerState {
    #[default]
    Idle,
    Pending {
        warning_start: TimestampNs,
    },
    PendingReprieve {
        warning_start: TimestampNs,
        glance_start: TimestampNs,
    },
    Active,
    ActiveReprieve {
        glance_start: TimestampNs,
    },
}

impl TrackerState {
    pub fn phase(&self) -> TrackerPhase {
        match self {
            TrackerState::Idle => TrackerPhase::Idle,
            TrackerState::Pending { .. } => TrackerPhase::Pending,
            TrackerState::PendingReprieve { .. } => TrackerPhase::PendingReprieve,
            TrackerState::Active => TrackerPhase::Active,
            TrackerState::ActiveReprieve { .. } => TrackerPhase::ActiveReprieve,
        }
    }

    /// Start of the running inattention timer, if any.
    pub fn warning_start(&self) -> Option<TimestampNs> {
        match self {
            TrackerState::Pending { warning_start }
            | TrackerState::PendingReprieve { warning_start, .. } => Some(*warning_start),
            _ => None,
        }
    }

    /// Start of the running attention timer, if any.
    pub fn glance_start(&self) -> Option<TimestampNs> {
        match self {
            TrackerState::PendingReprieve { glance_start, .. }
            | TrackerState::ActiveReprieve { glance_start } => Some(*glance_start),
            _ => None,
        }
    }
}

/// The sample a step was computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub in_aoi: bool,
    pub at: TimestampNs,
}

/// A named state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub kind: TransitionKind,
    pub from: TrackerPhase,
    pub to: TrackerPhase,
    pub at: TimestampNs,
}

/// Everything one `update` produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerStep {
    pub channel: Channel,
    pub observation: Observation,
    pub transition: Option<Transition>,
    pub actuation: Option<Actuation>,
}

impl TrackerStep {
    /// Audit records for this step: the observation first, then the
    /// transition if one fired.
    pub fn records(&self, seq: u64) -> Vec<SessionRecord> {
        let mut records = Vec::with_capacity(2);
        records.push(SessionRecord::observation(
            self.observation.at,
            seq,
            self.channel,
            self.observation.in_aoi,
        ));
        if let Some(t) = self.transition {
            records.push(SessionRecord::transition(
                t.at, self.channel, t.kind, t.from, t.to,
            ));
        }
        records
    }
}

/// Debounced warning decision for one channel.
#[derive(Debug, Clone)]
pub struct AttentionTracker {
    channel: Channel,
    thresholds: Thresholds,
    state: TrackerState,
}

impl AttentionTracker {
    /// Create a tracker in `Idle`.
    pub fn new(channel: Channel, thresholds: Thresholds) -> Self {
        Self {
            channel,
            thresholds,
            state: TrackerState::Idle,
        }
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    pub fn phase(&self) -> TrackerPhase {
        self.state.phase()
    }

    pub fn is_warning_active(&self) -> bool {
        self.phase().is_warning_active()
    }

    /// Feed one sample. `in_aoi` is `true` when the operator is looking at
    /// the area of interest; `now` is the sample's arrival stamp.
    ///
    /// At most one transition fires per sample. Timestamps earlier than a
    /// running timer's start count as zero elapsed time.
    pub fn update(&mut self, in_aoi: bool, now: TimestampNs) -> TrackerStep {
        let glance_ns = self.thresholds.glance_period_ns();
        let warning_ns = self.thresholds.warning_period_ns();
        let from = self.state.phase();

        let next = match self.state {
            TrackerState::Idle if !in_aoi => Some((
                TrackerState::Pending { warning_start: now },
                TransitionKind::WarningDetectionStarted,
            )),
            TrackerState::Idle => None,

            TrackerState::Pending { warning_start } => {
                let elapsed = now.saturating_sub(warning_start);
                if elapsed < warning_ns && in_aoi {
                    Some((
                        TrackerState::PendingReprieve {
                            warning_start,
                            glance_start: now,
                        },
                        TransitionKind::GlanceDetectionStarted,
                    ))
                } else if elapsed >= warning_ns {
                    Some((TrackerState::Active, TransitionKind::WarningTriggered))
                } else {
                    None
                }
            }

            TrackerState::PendingReprieve {
                warning_start,
                glance_start,
            } => {
                let elapsed = now.saturating_sub(glance_start);
                if elapsed < glance_ns && !in_aoi {
                    Some((
                        TrackerState::Pending { warning_start },
                        TransitionKind::GlanceDetectionEnded,
                    ))
                } else if elapsed >= glance_ns {
                    Some((TrackerState::Idle, TransitionKind::WarningAverted))
                } else {
                    None
                }
            }

            TrackerState::Active if in_aoi => Some((
                TrackerState::ActiveReprieve { glance_start: now },
                TransitionKind::GlanceDetectionStarted,
            )),
            TrackerState::Active => None,

            TrackerState::ActiveReprieve { glance_start } => {
                let elapsed = now.saturating_sub(glance_start);
                if elapsed < glance_ns && !in_aoi {
                    Some((TrackerState::Active, TransitionKind::GlanceDetectionEnded))
                } else if elapsed >= glance_ns {
                    Some((TrackerState::Idle, TransitionKind::WarningDisabled))
                } else {
                    None
                }
            }
        };

        let transition = next.map(|(state, kind)| {
            self.state = state;
            let transition = Transition {
                kind,
                from,
                to: state.phase(),
                at: now,
            };
            tracing::debug!(
                channel = %self.channel,
                from = %transition.from,
                to = %transition.to,
                label = kind.label(),
                "Tracker transition"
            );
            transition
        });

        TrackerStep {
            channel: self.channel,
            observation: Observation { in_aoi, at: now },
            transition,
            actuation: transition.and_then(|t| t.kind.actuation()),
        }
    }
}
