//! Transcoding infrastructure module
//!
//! Uncompressed sources to WAV/FLAC are handled in-process; everything
//! else goes through FFmpeg.

mod ffmpeg;
mod flac_encoder;
mod native;

use std::sync::Arc;

pub use ffmpeg::FfmpegTranscoder;
pub use flac_encoder::{encode_to_flac, EncodingError};
pub use native::NativeTranscoder;

use crate::application::convert_with;
use crate::application::ports::{ConvertOptions, Transcoder};
use crate::domain::error::ConversionError;
use crate::domain::recording::Artifact;

/// Transcoders in preference order
pub fn default_transcoders() -> Vec<Arc<dyn Transcoder>> {
    vec![
        Arc::new(NativeTranscoder::new()),
        Arc::new(FfmpegTranscoder::new()),
    ]
}

/// Convert a finished artifact to `options.format`.
///
/// The back-end is chosen per call; `artifact` is left untouched.
pub async fn convert(
    artifact: &Artifact,
    options: &ConvertOptions,
) -> Result<Artifact, ConversionError> {
    convert_with(&default_transcoders(), artifact, options).await
}
