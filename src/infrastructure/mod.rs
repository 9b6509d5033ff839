//! Infrastructure layer - Adapter implementations
//!
//! Contains concrete implementations of the port interfaces,
//! integrating with external systems like cpal, FFmpeg and the
//! filesystem.

pub mod capture;
pub mod config;
pub mod transcoding;

// Re-export adapters
pub use capture::{
    is_format_supported, native_recorder, CpalDevices, NativeFormats, PcmEncoderFactory,
};
pub use config::XdgConfigStore;
pub use transcoding::{convert, default_transcoders, FfmpegTranscoder, NativeTranscoder};
