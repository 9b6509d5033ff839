//! FFmpeg-based transcoder adapter
//!
//! Pipes the artifact through `ffmpeg` on stdin/stdout, so no temp files
//! are involved.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::application::ports::{ConvertOptions, Transcoder};
use crate::domain::error::ConversionError;
use crate::domain::format::{FormatId, TargetFormat};
use crate::domain::recording::Artifact;

/// Transcoder backed by the `ffmpeg` binary on `PATH`
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    program: String,
}

impl FfmpegTranscoder {
    pub fn new() -> Self {
        Self::with_program("ffmpeg")
    }

    /// Use a specific ffmpeg executable
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Build FFmpeg args for a stdin -> stdout conversion
    fn build_args(source: &FormatId, options: &ConvertOptions) -> Vec<String> {
        let mut args: Vec<String> = ["-hide_banner", "-loglevel", "error"]
            .into_iter()
            .map(String::from)
            .collect();

        // Raw PCM has no header to sniff
        if source.essence() == "audio/l16" {
            args.extend(["-f".to_string(), "s16le".to_string()]);
            if let Some(rate) = source.param("rate") {
                args.extend(["-ar".to_string(), rate.to_string()]);
            }
            let channels = source.param("channels").unwrap_or("1");
            args.extend(["-ac".to_string(), channels.to_string()]);
        }
        args.extend(["-i", "pipe:0", "-vn"].into_iter().map(String::from));

        let codec: &[&str] = match options.format {
            TargetFormat::Webm => &["-c:a", "libopus", "-f", "webm"],
            TargetFormat::Ogg => &["-c:a", "libopus", "-f", "ogg"],
            TargetFormat::Wav => &["-c:a", "pcm_s16le", "-f", "wav"],
            TargetFormat::Mp3 => &["-c:a", "libmp3lame", "-f", "mp3"],
            // Non-seekable output needs a fragmented mp4
            TargetFormat::M4a => &[
                "-c:a",
                "aac",
                "-movflags",
                "frag_keyframe+empty_moov",
                "-f",
                "mp4",
            ],
            TargetFormat::Flac => &["-c:a", "flac", "-f", "flac"],
        };
        args.extend(codec.iter().map(|s| s.to_string()));

        if let Some(bitrate) = options.bitrate.filter(|_| !options.format.is_lossless()) {
            args.push("-b:a".to_string());
            args.push(bitrate.to_string());
        }

        args.push("pipe:1".to_string());
        args
    }
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    fn can_convert(&self, _source: &FormatId, _target: TargetFormat) -> bool {
        true
    }

    async fn transcode(
        &self,
        artifact: &Artifact,
        options: &ConvertOptions,
    ) -> Result<Artifact, ConversionError> {
        let args = Self::build_args(artifact.format(), options);
        debug!(program = %self.program, ?args, "spawning ffmpeg");

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ConversionError::ConversionFailed(format!(
                        "{} not found. Install FFmpeg to convert to {}",
                        self.program, options.format
                    ))
                } else {
                    ConversionError::ConversionFailed(format!("Failed to start ffmpeg: {e}"))
                }
            })?;

        // Feed stdin concurrently so a full stdout pipe cannot stall us
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| ConversionError::ConversionFailed("ffmpeg stdin unavailable".into()))?;
        let input = artifact.bytes();
        let writer = tokio::spawn(async move {
            let result = stdin.write_all(&input).await;
            drop(stdin);
            result
        });

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ConversionError::ConversionFailed(format!("ffmpeg failed: {e}")))?;

        match writer.await {
            Ok(Err(e)) if e.kind() != std::io::ErrorKind::BrokenPipe => {
                warn!(error = %e, "failed to write artifact to ffmpeg");
            }
            _ => {}
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ConversionError::ConversionFailed(format!(
                "ffmpeg exited with error: {}",
                stderr.lines().last().unwrap_or("unknown error")
            )));
        }
        if output.stdout.is_empty() {
            return Err(ConversionError::ConversionFailed(
                "ffmpeg produced no output".to_string(),
            ));
        }

        Ok(Artifact::new(output.stdout, options.format.format_id()))
    }
}
