//! Vigil Warning Engine
//!
//! Wires telemetry sources, attention trackers, warning actuators, and the
//! session recorder into a monitoring session:
//!
//! - **Actuators:** Visual and auditory indicators behind one capability
//!   trait, driven from per-channel blocking workers so a slow or failing
//!   indicator never delays the next sample.
//! - **Recorder:** The session log writer behind a bounded queue.
//! - **Session:** The poll loop that delivers every sample, in order, to
//!   every channel's tracker.

pub mod actuator;
pub mod recorder;
pub mod session;

pub use actuator::{
    actuator_for, Actuator, ActuatorHandle, ActuatorStats, AuditoryActuator, LoggingActuator,
    VisualActuator,
};
pub use recorder::{RecorderHandle, RecorderStats};
pub use session::{
    build_trackers, session_header, ChannelReport, MonitorSession, SessionReport, SessionStats,
    StopSignal,
};
