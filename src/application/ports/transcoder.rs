//! Transcoding port interface

use async_trait::async_trait;

use crate::domain::error::ConversionError;
use crate::domain::format::{FormatId, TargetFormat};
use crate::domain::recording::Artifact;

/// Target descriptor for a conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvertOptions {
    pub format: TargetFormat,
    /// Bits per second for lossy targets; encoder default when `None`
    pub bitrate: Option<u32>,
}

impl ConvertOptions {
    pub fn new(format: TargetFormat) -> Self {
        Self {
            format,
            bitrate: None,
        }
    }

    pub fn with_bitrate(mut self, bitrate: u32) -> Self {
        self.bitrate = Some(bitrate);
        self
    }
}

/// Port for converting a finished artifact to another format
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &'static str;

    /// Whether this transcoder handles `source -> target`
    fn can_convert(&self, source: &FormatId, target: TargetFormat) -> bool;

    /// Produce a new artifact; `artifact` is never modified.
    async fn transcode(
        &self,
        artifact: &Artifact,
        options: &ConvertOptions,
    ) -> Result<Artifact, ConversionError>;
}
