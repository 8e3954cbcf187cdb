//! Vigil Attention Tracker
//!
//! Turns a noisy, sampled "operator is looking at the area of interest"
//! signal into debounced warning on/off decisions. One tracker runs per
//! warning channel, each with two independent time constants:
//!
//! - **Warning period:** sustained inattention needed to trigger.
//! - **Glance period:** sustained attention needed to cancel a pending or
//!   active warning.
//!
//! Trackers are pure: they compare arrival timestamps only and perform no
//! I/O. Callers forward the returned [`TrackerStep`] to actuators and
//! recorders.

pub mod thresholds;
pub mod tracker;

pub use thresholds::*;
pub use tracker::*;
