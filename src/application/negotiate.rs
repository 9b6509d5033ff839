//! Format negotiation

use super::ports::FormatSupport;
use crate::domain::error::RecorderError;
use crate::domain::format::FormatId;

/// Pick the first usable format: `preferred`, then each fallback in order.
///
/// Deterministic and side-effect free; usable without a session.
pub fn negotiate(
    formats: &dyn FormatSupport,
    preferred: &FormatId,
    fallbacks: &[FormatId],
) -> Result<FormatId, RecorderError> {
    std::iter::once(preferred)
        .chain(fallbacks)
        .find(|format| formats.is_supported(format))
        .cloned()
        .ok_or_else(|| RecorderError::UnsupportedFormat {
            preferred: preferred.clone(),
            fallbacks: fallbacks.to_vec(),
        })
}
