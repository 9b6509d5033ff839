//! FLAC encoding of 16-bit PCM via flacenc

use flacenc::bitsink::ByteSink;
use flacenc::component::BitRepr;
use flacenc::config;
use flacenc::error::Verify;
use flacenc::source::MemSource;

use crate::infrastructure::capture::wav::Pcm;

/// Bits per sample (16-bit audio)
const BITS_PER_SAMPLE: usize = 16;

/// Encode interleaved PCM to a FLAC stream
pub fn encode_to_flac(pcm: &Pcm) -> Result<Vec<u8>, EncodingError> {
    // flacenc works on i32 samples
    let samples_i32: Vec<i32> = pcm.samples.iter().map(|&s| s as i32).collect();

    let config = config::Encoder::default()
        .into_verified()
        .map_err(|(_, e)| EncodingError::Config(format!("{:?}", e)))?;

    let source = MemSource::from_samples(
        &samples_i32,
        pcm.channels as usize,
        BITS_PER_SAMPLE,
        pcm.sample_rate as usize,
    );

    let flac_stream = flacenc::encode_with_fixed_block_size(&config, source, config.block_size)
        .map_err(|e| EncodingError::Encode(format!("{:?}", e)))?;

    let mut sink = ByteSink::new();
    flac_stream
        .write(&mut sink)
        .map_err(|e| EncodingError::Write(e.to_string()))?;

    Ok(sink.into_inner())
}

/// FLAC encoding errors
#[derive(Debug, thiserror::Error)]
pub enum EncodingError {
    #[error("FLAC config error: {0}")]
    Config(String),

    #[error("FLAC encoding failed: {0}")]
    Encode(String),

    #[error("FLAC write failed: {0}")]
    Write(String),
}
