//! Session clock used to stamp sample arrival.
//!
//! Every sample is stamped with monotonic nanoseconds since the session
//! epoch, captured right after the receive returns. Debounce timing only
//! ever compares these arrival stamps, never the time a tracker happens to
//! process a sample.

use std::time::Instant;

use chrono::{DateTime, Duration as ChronoDuration, Local, Utc};

/// A monitoring clock that provides monotonic timestamps relative to
/// a fixed epoch (the moment the session started).
#[derive(Debug, Clone)]
pub struct SessionClock {
    /// The instant the session started.
    epoch: Instant,

    /// Wall-clock time at epoch.
    epoch_wall: DateTime<Utc>,
}

impl SessionClock {
    /// Create a new session clock anchored to now.
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
            epoch_wall: Utc::now(),
        }
    }

    /// Nanoseconds elapsed since session start.
    pub fn elapsed_ns(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    /// Seconds elapsed since session start.
    pub fn elapsed_secs(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    /// Wall-clock time at session start.
    pub fn epoch_wall(&self) -> DateTime<Utc> {
        self.epoch_wall
    }

    /// Wall-clock time at session start as an RFC 3339 string.
    pub fn epoch_wall_rfc3339(&self) -> String {
        self.epoch_wall.to_rfc3339()
    }

    /// Convert an elapsed nanosecond value to seconds.
    pub fn ns_to_secs(ns: u64) -> f64 {
        ns as f64 / 1_000_000_000.0
    }
}

/// Local wall-clock time of a session-relative timestamp.
pub fn local_time_at(epoch_wall: DateTime<Utc>, elapsed_ns: u64) -> DateTime<Local> {
    let offset = ChronoDuration::nanoseconds(elapsed_ns.min(i64::MAX as u64) as i64);
    (epoch_wall + offset).with_timezone(&Local)
}

/// File-name friendly stamp for a session started at `epoch_wall`,
/// e.g. `20260114-093012`.
pub fn session_stamp(epoch_wall: DateTime<Utc>) -> String {
    epoch_wall
        .with_timezone(&Local)
        .format("%Y%m%d-%H%M%S")
        .to_string()
}
