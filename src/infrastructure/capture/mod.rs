//! Native capture back-end
//!
//! Microphone access through cpal and an uncompressed PCM encoder. These
//! are the collaborators a [`Recorder`](crate::application::Recorder) gets when none are injected.

mod cpal_device;
mod pcm_encoder;
pub mod wav;

use std::sync::Arc;

pub use cpal_device::{CpalDevices, CpalStream};
pub use pcm_encoder::{
    target_sample_rate, PcmContainer, PcmEncoder, PcmEncoderFactory, StreamResampler,
    STANDARD_RATES,
};

use crate::application::ports::FormatSupport;
use crate::application::RecorderBuilder;
use crate::domain::config::RecorderConfig;
use crate::domain::format::FormatId;

/// Formats the native encoder can produce
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeFormats;

impl FormatSupport for NativeFormats {
    fn is_supported(&self, format: &FormatId) -> bool {
        PcmContainer::for_format(format).is_some()
    }
}

/// Session builder wired to the host's default input device
pub fn native_recorder(config: RecorderConfig) -> RecorderBuilder {
    RecorderBuilder::new(config)
        .devices(Arc::new(CpalDevices::new()))
        .encoders(Arc::new(PcmEncoderFactory::new()))
        .formats(Arc::new(NativeFormats))
}

/// Whether the native encoder can record `mime_type`.
///
/// Strings that do not parse as a format identifier are simply
/// unsupported.
pub fn is_format_supported(mime_type: &str) -> bool {
    FormatId::parse(mime_type).is_ok_and(|format| NativeFormats.is_supported(&format))
}
