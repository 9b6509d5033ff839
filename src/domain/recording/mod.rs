//! Recording value objects and the session state machine

pub mod artifact;
pub mod chunk;
pub mod duration;
pub mod state;

pub use artifact::Artifact;
pub use chunk::{Chunk, ChunkBuffer};
pub use duration::Duration;
pub use state::{Lifecycle, RecorderState};
