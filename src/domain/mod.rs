//! Domain layer - Core business logic
//!
//! Contains value objects, the recorder state machine, and domain errors.
//! This layer has no dependencies on external systems.

pub mod config;
pub mod error;
pub mod format;
pub mod recording;

// Re-export common types
pub use config::{AppConfig, RecorderConfig};
pub use error::*;
pub use format::{FormatId, TargetFormat};
pub use recording::{Artifact, Chunk, ChunkBuffer, Duration, Lifecycle, RecorderState};
