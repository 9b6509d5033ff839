//! Port interfaces (traits) for external systems
//!
//! These traits define the boundaries between the application
//! and infrastructure layers.

pub mod capability;
pub mod config;
pub mod device;
pub mod encoder;
pub mod transcoder;

// Re-export common types
pub use capability::FormatSupport;
pub use config::ConfigStore;
pub use device::{AudioStream, DeviceError, DeviceProvider, StreamFrame, StreamTap};
pub use encoder::{Encoder, EncoderError, EncoderEvent, EncoderFactory, EncoderSettings, EncoderSink};
pub use transcoder::{ConvertOptions, Transcoder};
