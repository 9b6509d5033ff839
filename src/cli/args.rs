//! CLI argument definitions using Clap

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::domain::format::TargetFormat;
use crate::domain::recording::Duration;

/// Environment variable overriding the preferred recording format
pub const FORMAT_ENV: &str = "SMART_RECORDER_FORMAT";

/// SmartRecorder - chunked microphone capture
#[derive(Parser, Debug)]
#[command(name = "smart-recorder")]
#[command(version)]
#[command(about = "Record audio from the microphone in timed chunks and convert the result")]
#[command(long_about = None)]
pub struct Cli {
    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(flatten)]
    pub record: RecordArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Options for a recording run
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordArgs {
    /// Recording duration (e.g., 10s, 1m, 2m30s)
    #[arg(short = 'd', long, value_name = "TIME")]
    pub duration: Option<String>,

    /// Preferred recording format (MIME type)
    #[arg(short = 'f', long, value_name = "MIME", env = FORMAT_ENV)]
    pub format: Option<String>,

    /// Fallback format, tried in the order given
    #[arg(long = "fallback", value_name = "MIME")]
    pub fallbacks: Vec<String>,

    /// Target bitrate in bits per second
    #[arg(short = 'b', long, value_name = "BPS")]
    pub bitrate: Option<u32>,

    /// Chunk interval in milliseconds (0 = one chunk at stop)
    #[arg(long, value_name = "MS")]
    pub timeslice: Option<u64>,

    /// Output file (default: recording-<timestamp>.<ext> in the output dir)
    #[arg(short = 'o', long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Convert the recording before writing it
    #[arg(long, value_name = "TARGET")]
    pub convert: Option<TargetArg>,
}

/// Subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Record from the default input device (the default command)
    Record(RecordArgs),
    /// List which recording formats are supported natively
    Formats,
    /// Convert an audio file to another format
    Convert {
        /// Input audio file
        input: PathBuf,
        /// Target format
        target: TargetArg,
        /// Bitrate for lossy targets in bits per second
        #[arg(short = 'b', long, value_name = "BPS")]
        bitrate: Option<u32>,
        /// Output file (default: input name with the target extension)
        #[arg(short = 'o', long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config action subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Create config file with defaults
    Init,
    /// Set a config value
    Set {
        /// Config key
        key: String,
        /// Config value
        value: String,
    },
    /// Get a config value
    Get {
        /// Config key
        key: String,
    },
    /// List all config values
    List,
    /// Show config file path
    Path,
}

/// Conversion target for clap ValueEnum
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum TargetArg {
    Webm,
    Ogg,
    Wav,
    Mp3,
    M4a,
    Flac,
}

impl From<TargetArg> for TargetFormat {
    fn from(arg: TargetArg) -> Self {
        match arg {
            TargetArg::Webm => TargetFormat::Webm,
            TargetArg::Ogg => TargetFormat::Ogg,
            TargetArg::Wav => TargetFormat::Wav,
            TargetArg::Mp3 => TargetFormat::Mp3,
            TargetArg::M4a => TargetFormat::M4a,
            TargetArg::Flac => TargetFormat::Flac,
        }
    }
}

/// Parsed recording options after config merging
#[derive(Debug, Clone)]
pub struct RecordOptions {
    pub duration: Duration,
    pub output: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub convert: Option<TargetFormat>,
    pub bitrate: u32,
}

/// Valid config keys
pub const VALID_CONFIG_KEYS: &[&str] = &[
    "mime_type",
    "fallbacks",
    "bitrate",
    "timeslice_ms",
    "duration",
    "output_dir",
];

/// Check if a config key is valid
pub fn is_valid_config_key(key: &str) -> bool {
    VALID_CONFIG_KEYS.contains(&key)
}
