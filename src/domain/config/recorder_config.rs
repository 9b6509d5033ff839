//! Capture session configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::format::{FormatId, TargetFormat};

/// Default target encoding bitrate in bits per second
pub const DEFAULT_BITS_PER_SECOND: u32 = 128_000;

/// Default chunking interval in milliseconds
pub const DEFAULT_TIMESLICE_MS: u64 = 1000;

/// Immutable configuration read when a session is created.
///
/// A session keeps its own copy for its whole lifetime, so later changes
/// to the value the caller holds never reach a running recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// Preferred encoding format
    pub mime_type: FormatId,
    /// Formats to try, in order, when the preferred one is unsupported
    #[serde(default)]
    pub fallbacks: Vec<FormatId>,
    /// Target encoding bitrate
    #[serde(default = "default_bits_per_second")]
    pub audio_bits_per_second: u32,
    /// Time between data events in milliseconds; 0 delivers a single chunk
    /// on stop
    #[serde(default = "default_timeslice_ms")]
    pub timeslice_ms: u64,
}

fn default_bits_per_second() -> u32 {
    DEFAULT_BITS_PER_SECOND
}

fn default_timeslice_ms() -> u64 {
    DEFAULT_TIMESLICE_MS
}

impl RecorderConfig {
    /// Config preferring `mime_type` with no fallbacks and default
    /// bitrate/interval
    pub fn new(mime_type: FormatId) -> Self {
        Self {
            mime_type,
            fallbacks: Vec::new(),
            audio_bits_per_second: DEFAULT_BITS_PER_SECOND,
            timeslice_ms: DEFAULT_TIMESLICE_MS,
        }
    }

    pub fn with_fallbacks(mut self, fallbacks: impl IntoIterator<Item = FormatId>) -> Self {
        self.fallbacks = fallbacks.into_iter().collect();
        self
    }

    pub fn with_bitrate(mut self, bits_per_second: u32) -> Self {
        self.audio_bits_per_second = bits_per_second;
        self
    }

    pub fn with_timeslice(mut self, timeslice: Duration) -> Self {
        self.timeslice_ms = u64::try_from(timeslice.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Chunking interval
    pub fn timeslice(&self) -> Duration {
        Duration::from_millis(self.timeslice_ms)
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            mime_type: TargetFormat::Webm.format_id(),
            fallbacks: vec![TargetFormat::Ogg.format_id(), TargetFormat::Wav.format_id()],
            audio_bits_per_second: DEFAULT_BITS_PER_SECOND,
            timeslice_ms: DEFAULT_TIMESLICE_MS,
        }
    }
}
