//! In-process transcoding for uncompressed sources

use std::io::Cursor;

use async_trait::async_trait;

use super::flac_encoder::encode_to_flac;
use crate::application::ports::{ConvertOptions, Transcoder};
use crate::domain::error::ConversionError;
use crate::domain::format::{FormatId, TargetFormat};
use crate::domain::recording::Artifact;
use crate::infrastructure::capture::wav::{self, Pcm};

/// WAV/L16 to WAV or FLAC without external tools
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeTranscoder;

impl NativeTranscoder {
    pub fn new() -> Self {
        Self
    }

    fn decode(artifact: &Artifact) -> Result<Pcm, ConversionError> {
        let format = artifact.format();
        match format.essence() {
            "audio/wav" | "audio/wave" | "audio/x-wav" => {
                wav::parse(artifact.data()).map_err(ConversionError::ConversionFailed)
            }
            "audio/l16" => Ok(Pcm {
                sample_rate: l16_rate(format).ok_or_else(|| {
                    ConversionError::ConversionFailed(format!("{format} is missing a rate"))
                })?,
                channels: format
                    .param("channels")
                    .and_then(|c| c.parse().ok())
                    .unwrap_or(1),
                samples: wav::le_bytes_to_samples(artifact.data()),
            }
            .whole_frames()),
            _ => Err(ConversionError::ConversionFailed(format!(
                "cannot decode {format} natively"
            ))),
        }
    }

    fn encode_wav(pcm: &Pcm) -> Result<Vec<u8>, ConversionError> {
        let spec = hound::WavSpec {
            channels: pcm.channels,
            sample_rate: pcm.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let failed = |e: hound::Error| ConversionError::ConversionFailed(e.to_string());

        let mut cursor = Cursor::new(Vec::new());
        let mut writer = hound::WavWriter::new(&mut cursor, spec).map_err(failed)?;
        for &sample in &pcm.samples {
            writer.write_sample(sample).map_err(failed)?;
        }
        writer.finalize().map_err(failed)?;
        Ok(cursor.into_inner())
    }
}

fn l16_rate(format: &FormatId) -> Option<u32> {
    format.param("rate")?.parse().ok().filter(|&r| r > 0)
}

fn is_native_source(format: &FormatId) -> bool {
    match format.essence() {
        "audio/wav" | "audio/wave" | "audio/x-wav" => true,
        "audio/l16" => l16_rate(format).is_some(),
        _ => false,
    }
}

#[async_trait]
impl Transcoder for NativeTranscoder {
    fn name(&self) -> &'static str {
        "native"
    }

    fn can_convert(&self, source: &FormatId, target: TargetFormat) -> bool {
        matches!(target, TargetFormat::Wav | TargetFormat::Flac) && is_native_source(source)
    }

    async fn transcode(
        &self,
        artifact: &Artifact,
        options: &ConvertOptions,
    ) -> Result<Artifact, ConversionError> {
        let artifact = artifact.clone();
        let target = options.format;

        tokio::task::spawn_blocking(move || {
            let pcm = Self::decode(&artifact)?;
            if pcm.samples.is_empty() {
                return Err(ConversionError::ConversionFailed(
                    "source artifact contains no audio samples".to_string(),
                ));
            }
            let data = match target {
                TargetFormat::Wav => Self::encode_wav(&pcm)?,
                TargetFormat::Flac => encode_to_flac(&pcm)
                    .map_err(|e| ConversionError::ConversionFailed(e.to_string()))?,
                other => {
                    return Err(ConversionError::ConversionFailed(format!(
                        "native transcoder cannot produce {other}"
                    )))
                }
            };
            Ok(Artifact::new(data, target.format_id()))
        })
        .await
        .map_err(|e| ConversionError::ConversionFailed(format!("Transcode task failed: {e}")))?
    }
}
