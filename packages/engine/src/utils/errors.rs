// packages/engine/src/utils/errors.rs
//! Engine error types

use thiserror::Error;

/// Errors produced by the interception engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// A null/empty consumer or source handle was passed in
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The payload transform rejected an event; the event was not delivered
    #[error("Transform failed for sensor {sensor}: {reason}")]
    TransformFailed { sensor: String, reason: String },

    /// A wrapped consumer failed while handling a delivered event
    #[error("Listener {key} failed: {reason}")]
    ListenerFailed { key: String, reason: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Replay failed: {0}")]
    ReplayFailed(String),

    #[error("Observability setup failed: {0}")]
    ObservabilityError(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn transform(sensor: impl ToString, reason: impl Into<String>) -> Self {
        Self::TransformFailed {
            sensor: sensor.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether the error came out of the delivery path
    pub fn is_delivery_error(&self) -> bool {
        matches!(
            self,
            Self::TransformFailed { .. } | Self::ListenerFailed { .. }
        )
    }
}

impl From<config::ConfigError> for EngineError {
    fn from(err: config::ConfigError) -> Self {
        Self::ConfigError(err.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for EngineError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Engine result alias
pub type Result<T> = std::result::Result<T, EngineError>;
