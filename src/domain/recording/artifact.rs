//! Artifact value object

use std::sync::Arc;

use crate::domain::format::FormatId;

/// The finished binary recording of one start/stop cycle (or the output of
/// a conversion), tagged with its format. Immutable; clones share the
/// underlying bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    data: Arc<[u8]>,
    format: FormatId,
}

impl Artifact {
    pub fn new(data: impl Into<Arc<[u8]>>, format: FormatId) -> Self {
        Self {
            data: data.into(),
            format,
        }
    }

    /// Get the raw bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Shared handle to the raw bytes
    pub fn bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.data)
    }

    /// Format this artifact is encoded in
    pub fn format(&self) -> &FormatId {
        &self.format
    }

    /// MIME string of the format
    pub fn mime_type(&self) -> &str {
        self.format.as_str()
    }

    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get human-readable size
    pub fn human_readable_size(&self) -> String {
        let bytes = self.size_bytes();
        if bytes < 1024 {
            format!("{} B", bytes)
        } else if bytes < 1024 * 1024 {
            format!("{:.1} KB", bytes as f64 / 1024.0)
        } else {
            format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
        }
    }
}
