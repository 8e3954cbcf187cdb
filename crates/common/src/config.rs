//! Application configuration.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use vigil_session_model::Channel;

use crate::error::{VigilError, VigilResult};

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Where samples come from.
    pub telemetry: TelemetryConfig,

    /// One entry per warning channel.
    pub channels: Vec<ChannelConfig>,

    /// Session log settings.
    pub recorder: RecorderConfig,

    /// Actuator dispatch settings.
    pub actuator: ActuatorConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Telemetry feed parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Local address the UDP listener binds to.
    pub bind: SocketAddr,

    /// Receive buffer size in bytes. Longer datagrams are truncated.
    pub buffer_size: usize,

    /// Upper bound on a single receive. `None` blocks until a sample arrives.
    pub read_timeout_ms: Option<u64>,

    /// Name of the boolean field when payloads are JSON objects.
    pub field: String,
}

/// Thresholds for one warning channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChannelConfig {
    pub channel: Channel,

    /// Minimum sustained attention that cancels a pending or active warning.
    pub glance_period_secs: f64,

    /// Minimum sustained inattention that triggers the warning.
    pub warning_period_secs: f64,
}

/// Session log configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// Directory where session logs are written.
    pub dir: PathBuf,

    /// Flush the log after this many records. 1 flushes every record.
    pub flush_every: u64,

    /// Records buffered between the poll loop and the log writer. Records
    /// arriving while the queue is full are dropped and counted.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

/// Actuator worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActuatorConfig {
    /// Additional attempts after a failed activate/deactivate.
    pub max_retries: u32,

    /// Pause between attempts (milliseconds).
    pub retry_backoff_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "vigil=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            telemetry: TelemetryConfig::default(),
            channels: vec![
                ChannelConfig {
                    channel: Channel::Visual,
                    glance_period_secs: 0.16,
                    warning_period_secs: 3.0,
                },
                ChannelConfig {
                    channel: Channel::Auditory,
                    glance_period_secs: 0.16,
                    warning_period_secs: 3.5,
                },
            ],
            recorder: RecorderConfig::default(),
            actuator: ActuatorConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 20001)),
            buffer_size: 1024,
            read_timeout_ms: Some(1000),
            field: "in_aoi".to_string(),
        }
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            dir: default_sessions_dir(),
            flush_every: 1,
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_queue_capacity() -> usize {
    1024
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_backoff_ms: 50,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl TelemetryConfig {
    /// Receive timeout as a duration.
    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_ms.map(Duration::from_millis)
    }
}

impl ActuatorConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl ChannelConfig {
    /// Check both periods are finite and strictly positive.
    pub fn validate(&self) -> VigilResult<()> {
        for (name, value) in [
            ("glance_period_secs", self.glance_period_secs),
            ("warning_period_secs", self.warning_period_secs),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(VigilError::config(format!(
                    "{} {name} must be a positive number of seconds, got {value}",
                    self.channel
                )));
            }
        }
        Ok(())
    }
}

impl AppConfig {
    /// Load and validate config from an explicit path.
    pub fn load_from(path: &std::path::Path) -> VigilResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to an explicit path.
    pub fn save_to(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    /// Reject configurations no session could run with.
    pub fn validate(&self) -> VigilResult<()> {
        if self.channels.is_empty() {
            return Err(VigilError::config("at least one warning channel is required"));
        }

        let mut seen = HashSet::new();
        for channel in &self.channels {
            channel.validate()?;
            if !seen.insert(channel.channel) {
                return Err(VigilError::config(format!(
                    "channel {} is configured more than once",
                    channel.channel
                )));
            }
        }

        if self.telemetry.buffer_size == 0 {
            return Err(VigilError::config("telemetry.buffer_size must be non-zero"));
        }
        if self.telemetry.read_timeout_ms == Some(0) {
            return Err(VigilError::config(
                "telemetry.read_timeout_ms must be non-zero (use null to block)",
            ));
        }
        if self.telemetry.field.is_empty() {
            return Err(VigilError::config("telemetry.field must not be empty"));
        }
        if self.recorder.flush_every == 0 {
            return Err(VigilError::config("recorder.flush_every must be at least 1"));
        }
        if self.recorder.queue_capacity == 0 {
            return Err(VigilError::config("recorder.queue_capacity must be non-zero"));
        }

        Ok(())
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("vigil").join("config.json")
}

/// Default session log directory.
fn default_sessions_dir() -> PathBuf {
    let base = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local").join("share")
        });
    base.join("vigil").join("sessions")
}
