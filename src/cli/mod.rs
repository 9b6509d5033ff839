//! CLI layer - Command-line interface
//!
//! Contains argument parsing, output formatting, signal handling,
//! and the command runners.

pub mod app;
pub mod args;
pub mod config_cmd;
pub mod presenter;
pub mod signals;

// Re-export commonly used types
pub use app::{
    load_merged_config, run_convert, run_formats, run_record, EXIT_ERROR, EXIT_SUCCESS,
    EXIT_USAGE_ERROR,
};
pub use args::{Cli, Commands, ConfigAction, RecordArgs, RecordOptions, TargetArg};
pub use config_cmd::handle_config_command;
pub use presenter::Presenter;
pub use signals::ShutdownSignal;
