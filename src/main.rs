//! SmartRecorder CLI entry point

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use smart_recorder::cli::{
    handle_config_command, run_convert, run_formats, run_record, Cli, Commands, Presenter,
    EXIT_ERROR,
};
use smart_recorder::infrastructure::XdgConfigStore;

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Some(Commands::Config { action }) => {
            let presenter = Presenter::new();
            let store = XdgConfigStore::new();
            if let Err(e) = handle_config_command(action, &store, &presenter).await {
                presenter.error(&e.to_string());
                return ExitCode::from(EXIT_ERROR);
            }
            ExitCode::SUCCESS
        }
        Some(Commands::Formats) => run_formats().await,
        Some(Commands::Convert {
            input,
            target,
            bitrate,
            output,
        }) => run_convert(input, target, bitrate, output).await,
        Some(Commands::Record(args)) => run_record(args).await,
        None => run_record(cli.record).await,
    }
}

/// Logs go to stderr; `RUST_LOG` wins over `--verbose`
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
