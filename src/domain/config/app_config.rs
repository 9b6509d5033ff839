//! Application configuration value object

use serde::{Deserialize, Serialize};

use super::recorder_config::{RecorderConfig, DEFAULT_BITS_PER_SECOND, DEFAULT_TIMESLICE_MS};
use crate::domain::format::FormatId;
use crate::domain::recording::Duration;

/// Application configuration as stored on disk.
/// All fields are optional to support partial configs and merging.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub mime_type: Option<String>,
    pub fallbacks: Option<Vec<String>>,
    pub bitrate: Option<u32>,
    pub timeslice_ms: Option<u64>,
    pub duration: Option<String>,
    pub output_dir: Option<String>,
}

impl AppConfig {
    /// Create config with default values
    pub fn defaults() -> Self {
        let recorder = RecorderConfig::default();
        Self {
            mime_type: Some(recorder.mime_type.to_string()),
            fallbacks: Some(recorder.fallbacks.iter().map(ToString::to_string).collect()),
            bitrate: Some(DEFAULT_BITS_PER_SECOND),
            timeslice_ms: Some(DEFAULT_TIMESLICE_MS),
            duration: Some("10s".to_string()),
            output_dir: None,
        }
    }

    /// Create an empty config (all None)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Merge this config with another, where other takes precedence.
    /// Only non-None values from other will override this.
    pub fn merge(self, other: Self) -> Self {
        Self {
            mime_type: other.mime_type.or(self.mime_type),
            fallbacks: other.fallbacks.or(self.fallbacks),
            bitrate: other.bitrate.or(self.bitrate),
            timeslice_ms: other.timeslice_ms.or(self.timeslice_ms),
            duration: other.duration.or(self.duration),
            output_dir: other.output_dir.or(self.output_dir),
        }
    }

    /// Get duration as parsed Duration, or default if not set/invalid
    pub fn duration_or_default(&self) -> Duration {
        self.duration
            .as_ref()
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(Duration::default_duration)
    }

    /// Build the session configuration. Unparsable format strings fall
    /// back to the defaults and are skipped in the fallback list.
    pub fn recorder_config(&self) -> RecorderConfig {
        let defaults = RecorderConfig::default();
        let mime_type = self
            .mime_type
            .as_deref()
            .and_then(|s| FormatId::parse(s).ok())
            .unwrap_or(defaults.mime_type);
        let fallbacks = match &self.fallbacks {
            Some(list) => list
                .iter()
                .filter_map(|s| FormatId::parse(s).ok())
                .collect(),
            None => defaults.fallbacks,
        };

        RecorderConfig {
            mime_type,
            fallbacks,
            audio_bits_per_second: self.bitrate.unwrap_or(defaults.audio_bits_per_second),
            timeslice_ms: self.timeslice_ms.unwrap_or(defaults.timeslice_ms),
        }
    }
}
