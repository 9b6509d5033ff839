//! Encoder port interfaces

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::device::AudioStream;
use crate::domain::format::FormatId;

/// Encoder errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncoderError {
    #[error("Encoder does not support {0}")]
    Unsupported(FormatId),

    #[error("Encoder failed: {0}")]
    Failed(String),
}

/// Notifications an encoder relays to its session
#[derive(Debug)]
pub enum EncoderEvent {
    /// One encoded fragment; `timestamp` is the offset from `start()`
    Chunk { data: Vec<u8>, timestamp: Duration },
    /// The device or encoder failed mid-recording
    Error(String),
}

/// Where an encoder delivers its notifications.
pub type EncoderSink = Arc<dyn Fn(EncoderEvent) + Send + Sync>;

/// Parameters an encoder is constructed with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderSettings {
    pub format: FormatId,
    pub bits_per_second: u32,
}

/// A running encoder bound to one stream.
///
/// Contract: while started and not paused, one `Chunk` per timeslice (or a
/// single chunk at stop when the timeslice is zero); nothing while paused;
/// `stop()` resolves only after the final chunk has been handed to the
/// sink.
#[async_trait]
pub trait Encoder: Send + Sync {
    fn start(&self, timeslice: Duration) -> Result<(), EncoderError>;

    fn pause(&self) -> Result<(), EncoderError>;

    fn resume(&self) -> Result<(), EncoderError>;

    async fn stop(&self) -> Result<(), EncoderError>;
}

/// Port for constructing encoders
pub trait EncoderFactory: Send + Sync {
    fn create(
        &self,
        stream: Arc<dyn AudioStream>,
        settings: EncoderSettings,
        sink: EncoderSink,
    ) -> Result<Arc<dyn Encoder>, EncoderError>;
}
