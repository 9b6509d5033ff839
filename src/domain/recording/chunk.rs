//! Chunks and the per-session chunk buffer

use std::sync::Arc;
use std::time::Duration;

use super::artifact::Artifact;
use crate::domain::format::FormatId;

/// One incremental fragment of encoded audio plus its capture timestamp
/// (offset from the start of the recording).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    data: Arc<[u8]>,
    timestamp: Duration,
}

impl Chunk {
    pub fn new(data: impl Into<Arc<[u8]>>, timestamp: Duration) -> Self {
        Self {
            data: data.into(),
            timestamp,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn timestamp(&self) -> Duration {
        self.timestamp
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Append-only, arrival-ordered chunk sequence for one recording.
#[derive(Debug, Default)]
pub struct ChunkBuffer {
    chunks: Vec<Chunk>,
    total_bytes: usize,
}

impl ChunkBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk, clamping its timestamp so the sequence never goes
    /// backwards. Returns the chunk as stored.
    pub fn push(&mut self, data: Vec<u8>, timestamp: Duration) -> Chunk {
        let timestamp = self
            .last_timestamp()
            .map_or(timestamp, |last| timestamp.max(last));
        let chunk = Chunk::new(data, timestamp);
        self.total_bytes += chunk.len();
        self.chunks.push(chunk.clone());
        chunk
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
        self.total_bytes = 0;
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn last_timestamp(&self) -> Option<Duration> {
        self.chunks.last().map(Chunk::timestamp)
    }

    /// Concatenate every chunk, in arrival order, into one artifact
    pub fn into_artifact(self, format: FormatId) -> Artifact {
        let mut data = Vec::with_capacity(self.total_bytes);
        for chunk in &self.chunks {
            data.extend_from_slice(chunk.data());
        }
        Artifact::new(data, format)
    }
}
