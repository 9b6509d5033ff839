//! Artifact conversion use case

use std::sync::Arc;

use tracing::{debug, info};

use super::ports::{ConvertOptions, Transcoder};
use crate::domain::error::ConversionError;
use crate::domain::recording::Artifact;

/// Convert `artifact` with the first transcoder that handles the pair.
///
/// The source artifact is left untouched. An empty artifact is rejected
/// before any transcoder runs.
pub async fn convert_with(
    transcoders: &[Arc<dyn Transcoder>],
    artifact: &Artifact,
    options: &ConvertOptions,
) -> Result<Artifact, ConversionError> {
    if artifact.is_empty() {
        return Err(ConversionError::ConversionFailed(
            "source artifact contains no audio data".to_string(),
        ));
    }

    let source = artifact.format();
    let target = options.format;
    let transcoder = transcoders
        .iter()
        .find(|t| t.can_convert(source, target))
        .ok_or_else(|| {
            ConversionError::ConversionFailed(format!("no converter from {source} to {target}"))
        })?;

    debug!(
        transcoder = transcoder.name(),
        from = %source,
        to = %target,
        size = artifact.size_bytes(),
        "converting artifact"
    );
    let converted = transcoder.transcode(artifact, options).await?;
    info!(
        transcoder = transcoder.name(),
        to = %converted.format(),
        size = converted.size_bytes(),
        "conversion finished"
    );
    Ok(converted)
}
