//! SmartRecorder - chunked microphone capture with post-hoc transcoding
//!
//! This crate provides a capture session that records from the default
//! input device, delivers encoded audio in timed chunks, and assembles a
//! final artifact that can be converted to other formats.
//!
//! # Architecture
//!
//! The crate follows hexagonal (ports & adapters) architecture:
//!
//! - **Domain**: Formats, the session state machine, value objects and errors
//! - **Application**: The [`Recorder`] session, its event hub, format
//!   negotiation, and port interfaces (traits)
//! - **Infrastructure**: Adapter implementations (cpal capture, PCM
//!   encoders, native and FFmpeg transcoding, XDG config)
//! - **CLI**: Command-line interface, argument parsing, and signal handling
//!
//! # Example
//!
//! ```no_run
//! use smart_recorder::{convert, native_recorder, ConvertOptions, EventKind, RecorderConfig, TargetFormat};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let recorder = native_recorder(RecorderConfig::default())
//!     .on(EventKind::Data, |event| println!("{:?}", event.kind()))
//!     .build()?;
//!
//! recorder.start().await?;
//! tokio::time::sleep(std::time::Duration::from_secs(3)).await;
//! let artifact = recorder.stop().await?;
//!
//! let flac = convert(&artifact, &ConvertOptions::new(TargetFormat::Flac)).await?;
//! println!("{} bytes of {}", flac.size_bytes(), flac.mime_type());
//! # Ok(())
//! # }
//! ```

pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;

pub use application::ports::ConvertOptions;
pub use application::{
    negotiate, EventKind, Recorder, RecorderBuilder, RecorderEvent, Subscription,
};
pub use domain::error::{ConversionError, RecorderError};
pub use domain::format::{FormatId, TargetFormat};
pub use domain::recording::{Artifact, Chunk, RecorderState};
pub use domain::config::RecorderConfig;
pub use infrastructure::{convert, is_format_supported, native_recorder};
