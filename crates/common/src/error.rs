//! Error types shared across Vigil crates.

/// Top-level error type for Vigil operations.
#[derive(Debug, thiserror::Error)]
pub enum VigilError {
    #[error("Telemetry error: {message}")]
    Telemetry { message: String },

    #[error("Malformed sample payload: {message}")]
    Payload { message: String },

    #[error("Actuator error: {message}")]
    Actuator { message: String },

    #[error("Recorder error: {message}")]
    Recorder { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal consistency error: {message}")]
    Consistency { message: String },

    #[error("Session error: {message}")]
    Session { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using VigilError.
pub type VigilResult<T> = Result<T, VigilError>;

impl VigilError {
    pub fn telemetry(msg: impl Into<String>) -> Self {
        Self::Telemetry {
            message: msg.into(),
        }
    }

    pub fn payload(msg: impl Into<String>) -> Self {
        Self::Payload {
            message: msg.into(),
        }
    }

    pub fn actuator(msg: impl Into<String>) -> Self {
        Self::Actuator {
            message: msg.into(),
        }
    }

    pub fn recorder(msg: impl Into<String>) -> Self {
        Self::Recorder {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn consistency(msg: impl Into<String>) -> Self {
        Self::Consistency {
            message: msg.into(),
        }
    }

    pub fn session(msg: impl Into<String>) -> Self {
        Self::Session {
            message: msg.into(),
        }
    }
}
