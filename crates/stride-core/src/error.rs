//! Error types for stride-core.
//!
//! # Error Recovery
//!
//! | Error Type | Strategy |
//! |------------|----------|
//! | [`Error::PermissionDenied`] | Non-fatal; prompt the user and call `run` again |
//! | [`Error::SensorUnavailable`] | Show the last known total |
//! | [`Error::Sensor`] | Log; the tracker keeps the last known total |
//! | [`Error::Store`] | Log and drop; the in-memory total stays correct |
//! | [`Error::Remote`] | Retry per [`crate::RetryConfig`], then log and drop |
//! | [`Error::InvalidConfig`] | Fix configuration and restart |

use thiserror::Error;

use crate::permissions::Permission;

/// Errors that can occur while counting and reconciling steps.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A required runtime permission was not granted.
    #[error("Permission denied: {0}")]
    PermissionDenied(Permission),

    /// The device has no step counter.
    #[error("Step sensor unavailable: {0}")]
    SensorUnavailable(String),

    /// The step sensor reported a failure.
    #[error("Sensor error: {0}")]
    Sensor(String),

    /// The sensor was queried before counting started.
    #[error("Step sensor is not counting")]
    NotCounting,

    /// Local persistence failed.
    #[error("Local store error: {0}")]
    Store(#[from] stride_store::Error),

    /// A remote write failed.
    #[error("Remote store error: {0}")]
    Remote(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Failed to parse input data.
    #[error("Parse error: {0}")]
    Parse(#[from] stride_types::ParseError),

    /// Recorded readings could not be decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a sensor failure error.
    pub fn sensor(message: impl Into<String>) -> Self {
        Self::Sensor(message.into())
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Wrap a remote store failure.
    pub fn remote(err: impl std::fmt::Display) -> Self {
        Self::Remote(err.to_string())
    }
}

/// Result type alias using stride-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::PermissionDenied(Permission::ActivityRecognition);
        assert_eq!(err.to_string(), "Permission denied: activity recognition");

        let err = Error::sensor("counter vanished");
        assert_eq!(err.to_string(), "Sensor error: counter vanished");

        let err = Error::NotCounting;
        assert_eq!(err.to_string(), "Step sensor is not counting");

        let err = Error::invalid_config("bad offset");
        assert!(err.to_string().contains("bad offset"));
    }

    #[test]
    fn test_from_store_error() {
        let store_err = stride_store::Error::LockPoisoned("memory kv");
        let err: Error = store_err.into();
        assert!(matches!(err, Error::Store(_)));
    }

    #[test]
    fn test_from_parse_error() {
        let err: Error = stride_types::parse_day("nope").unwrap_err().into();
        assert!(matches!(err, Error::Parse(_)));
    }
}
