//! Configuration value objects

pub mod app_config;
pub mod recorder_config;

pub use app_config::AppConfig;
pub use recorder_config::{RecorderConfig, DEFAULT_BITS_PER_SECOND, DEFAULT_TIMESLICE_MS};
