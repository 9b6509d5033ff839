//! Format capability port

use crate::domain::format::FormatId;

/// Answers "is this encoding format usable here?".
///
/// Implementations must be pure: no side effects, no suspension.
pub trait FormatSupport: Send + Sync {
    fn is_supported(&self, format: &FormatId) -> bool;
}

impl<F> FormatSupport for F
where
    F: Fn(&FormatId) -> bool + Send + Sync,
{
    fn is_supported(&self, format: &FormatId) -> bool {
        self(format)
    }
}
