//! Per-channel debounce thresholds.

use std::time::Duration;

use serde::Serialize;
use vigil_common::config::ChannelConfig;
use vigil_common::error::{VigilError, VigilResult};
use vigil_session_model::{Channel, ChannelThresholds};

/// The two time constants of one tracker. Both are strictly positive and
/// fixed for the tracker's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Thresholds {
    glance_period: Duration,
    warning_period: Duration,
}

impl Thresholds {
    pub fn new(glance_period: Duration, warning_period: Duration) -> VigilResult<Self> {
        if glance_period.is_zero() {
            return Err(VigilError::config("glance period must be greater than zero"));
        }
        if warning_period.is_zero() {
            return Err(VigilError::config("warning period must be greater than zero"));
        }
        Ok(Self {
            glance_period,
            warning_period,
        })
    }

    /// Build from fractional seconds, rejecting non-finite or non-positive
    /// values.
    pub fn from_secs(glance_secs: f64, warning_secs: f64) -> VigilResult<Self> {
        let glance = Duration::try_from_secs_f64(glance_secs)
            .map_err(|e| VigilError::config(format!("glance period {glance_secs}: {e}")))?;
        let warning = Duration::try_from_secs_f64(warning_secs)
            .map_err(|e| VigilError::config(format!("warning period {warning_secs}: {e}")))?;
        Self::new(glance, warning)
    }

    pub fn from_config(config: &ChannelConfig) -> VigilResult<Self> {
        Self::from_secs(config.glance_period_secs, config.warning_period_secs)
    }

    pub fn glance_period(&self) -> Duration {
        self.glance_period
    }

    pub fn warning_period(&self) -> Duration {
        self.warning_period
    }

    pub(crate) fn glance_period_ns(&self) -> u64 {
        saturating_ns(self.glance_period)
    }

    pub(crate) fn warning_period_ns(&self) -> u64 {
        saturating_ns(self.warning_period)
    }

    /// Log-header view of these thresholds.
    pub fn describe(&self, channel: Channel) -> ChannelThresholds {
        ChannelThresholds {
            channel,
            glance_period_ns: self.glance_period_ns(),
            warning_period_ns: self.warning_period_ns(),
        }
    }

    /// Rebuild thresholds recorded in a log header.
    pub fn from_recorded(recorded: &ChannelThresholds) -> VigilResult<Self> {
        Self::new(
            Duration::from_nanos(recorded.glance_period_ns),
            Duration::from_nanos(recorded.warning_period_ns),
        )
    }
}

fn saturating_ns(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_zero_periods() {
        assert!(Thresholds::new(Duration::ZERO, Duration::from_secs(1)).is_err());
        assert!(Thresholds::new(Duration::from_secs(1), Duration::ZERO).is_err());
    }

    #[test]
    fn test_from_secs_rejects_negative_and_nan() {
        assert!(Thresholds::from_secs(-0.5, 1.0).is_err());
        assert!(Thresholds::from_secs(0.5, f64::NAN).is_err());
        assert!(Thresholds::from_secs(0.0, 1.0).is_err());
    }

    #[test]
    fn test_from_secs_keeps_millisecond_precision() {
        let t = Thresholds::from_secs(2.5, 0.16).unwrap();
        assert_eq!(t.glance_period(), Duration::from_millis(2500));
        assert_eq!(t.warning_period_ns(), 160_000_000);
    }

    #[test]
    fn test_recorded_roundtrip() {
        let t = Thresholds::from_secs(0.16, 3.5).unwrap();
        let recorded = t.describe(Channel::Auditory);
        assert_eq!(recorded.channel, Channel::Auditory);
        assert_eq!(Thresholds::from_recorded(&recorded).unwrap(), t);
    }

    #[test]
    fn test_from_config() {
        let config = ChannelConfig {
            channel: Channel::Visual,
            glance_period_secs: 0.16,
            warning_period_secs: 3.0,
        };
        let t = Thresholds::from_config(&config).unwrap();
        assert_eq!(t.warning_period(), Duration::from_secs(3));
    }
}
