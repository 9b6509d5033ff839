//! Domain error types

use thiserror::Error;

use super::format::FormatId;

/// Errors reported by a capture session.
///
/// Misuse of the state machine is reported synchronously and never retried.
/// Device failures during an active recording are also delivered as an
/// `error` event after the session has been forced back to inactive.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecorderError {
    #[error("Recorder is already active")]
    AlreadyActive,

    #[error("Recorder is not recording")]
    NotRecording,

    #[error("Recorder is not paused")]
    NotPaused,

    #[error("Recorder is not active")]
    NotActive,

    #[error("Recorder is already stopping")]
    AlreadyStopping,

    #[error("Capture device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("No supported format: tried {preferred} and {} fallback(s)", .fallbacks.len())]
    UnsupportedFormat {
        preferred: FormatId,
        fallbacks: Vec<FormatId>,
    },

    #[error("Capture device failed: {0}")]
    DeviceFailure(String),

    #[error("Session was torn down while the operation was pending")]
    Aborted,
}

impl RecorderError {
    /// Whether this error reports caller misuse of the state machine
    pub fn is_misuse(&self) -> bool {
        matches!(
            self,
            Self::AlreadyActive
                | Self::NotRecording
                | Self::NotPaused
                | Self::NotActive
                | Self::AlreadyStopping
        )
    }
}

/// Errors from the transcoding entry point
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    #[error("Conversion failed: {0}")]
    ConversionFailed(String),

    #[error("Unknown target format: \"{0}\". Valid targets are: webm, ogg, wav, mp3, m4a, flac")]
    UnknownTarget(String),
}

/// Error when parsing a format identifier
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid format identifier: \"{input}\". Expected <type>/<subtype>[;param=value] (e.g., audio/wav)")]
pub struct InvalidFormatId {
    pub input: String,
}

/// Error when parsing a duration string
#[derive(Debug, Clone, Error)]
#[error("Invalid duration format: \"{input}\". Expected format: <number>ms, <number>s, <number>m, or <number>m<number>s (e.g., 250ms, 30s, 1m, 2m30s)")]
pub struct DurationParseError {
    pub input: String,
}

/// Error when configuration fails
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("Failed to parse config file: {0}")]
    ParseError(String),

    #[error("Failed to write config file: {0}")]
    WriteError(String),

    #[error("Invalid config value for '{key}': {message}")]
    ValidationError { key: String, message: String },

    #[error("Config file already exists at: {0}")]
    AlreadyExists(String),
}
