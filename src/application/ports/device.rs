//! Capture device port interfaces

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

/// Device acquisition errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("Permission to use the capture device was denied")]
    PermissionDenied,

    #[error("No audio input device available")]
    NotFound,

    #[error("{0}")]
    Other(String),
}

/// What a live stream delivers to its tap
#[derive(Debug)]
pub enum StreamFrame<'a> {
    /// Mono 16-bit samples at the stream's sample rate
    Samples(&'a [i16]),
    /// The device failed; the stream produces nothing further
    Fault(String),
}

/// Receiver for stream frames. Called from the device's audio thread.
pub type StreamTap = Arc<dyn Fn(StreamFrame<'_>) + Send + Sync>;

/// A live hardware audio input.
///
/// Owned exclusively by one capture session while it is active.
pub trait AudioStream: Send + Sync {
    /// Human-readable device label
    fn label(&self) -> &str;

    /// Native sample rate of delivered samples
    fn sample_rate(&self) -> u32;

    /// False once the stream has been released or has failed
    fn is_live(&self) -> bool;

    /// Route frames to `tap`, replacing any previous tap
    fn attach(&self, tap: StreamTap);

    /// Stop routing frames
    fn detach(&self);

    /// Halt all underlying tracks. Idempotent.
    fn release(&self);
}

/// Port for acquiring an audio input stream.
#[async_trait]
pub trait DeviceProvider: Send + Sync {
    /// Request the input device. May suspend while the platform asks the
    /// user for permission.
    async fn acquire(&self) -> Result<Arc<dyn AudioStream>, DeviceError>;
}
