//! Runners for the record, formats and convert commands

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::application::ports::{ConfigStore, ConvertOptions};
use crate::application::{EventKind, Recorder, RecorderEvent};
use crate::domain::config::AppConfig;
use crate::domain::error::RecorderError;
use crate::domain::format::{FormatId, TargetFormat};
use crate::domain::recording::{Artifact, Duration};
use crate::infrastructure::{convert, is_format_supported, native_recorder, XdgConfigStore};

use super::args::{RecordArgs, RecordOptions, TargetArg};
use super::presenter::Presenter;
use super::signals::ShutdownSignal;

/// Exit codes
pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_ERROR: u8 = 1;
pub const EXIT_USAGE_ERROR: u8 = 2;

/// How often the progress line is refreshed
const PROGRESS_TICK: StdDuration = StdDuration::from_millis(100);

/// Formats listed by `smart-recorder formats`
pub const COMMON_FORMATS: &[&str] = &[
    "audio/wav",
    "audio/x-wav",
    "audio/wave",
    "audio/l16;rate=16000",
    "audio/l16;rate=48000",
    "audio/l16",
    "audio/webm;codecs=opus",
    "audio/ogg;codecs=opus",
    "audio/mpeg",
    "audio/mp4",
    "audio/flac",
];

/// Record from the default input device and write the artifact
pub async fn run_record(args: RecordArgs) -> ExitCode {
    let mut presenter = Presenter::new();

    let config = load_merged_config(cli_config(&args)).await;
    let options = match resolve_record_options(&args, &config) {
        Ok(options) => options,
        Err(message) => {
            presenter.error(&message);
            return ExitCode::from(EXIT_USAGE_ERROR);
        }
    };

    let bytes = Arc::new(AtomicUsize::new(0));
    let failure: Arc<Mutex<Option<RecorderError>>> = Arc::new(Mutex::new(None));

    let builder = native_recorder(config.recorder_config())
        .on(EventKind::Data, {
            let bytes = Arc::clone(&bytes);
            move |event| {
                if let RecorderEvent::Data(chunk) = event {
                    bytes.fetch_add(chunk.len(), Ordering::Relaxed);
                }
            }
        })
        .on(EventKind::Error, {
            let failure = Arc::clone(&failure);
            move |event| {
                if let RecorderEvent::Error(e) = event {
                    *failure.lock() = Some(e.clone());
                }
            }
        });
    let recorder = match builder.build() {
        Ok(recorder) => recorder,
        Err(e) => {
            presenter.error(&e.to_string());
            return ExitCode::from(EXIT_ERROR);
        }
    };

    let shutdown = ShutdownSignal::new();
    shutdown.setup();

    presenter.start_spinner("Opening microphone...");
    if let Err(e) = recorder.start().await {
        presenter.spinner_fail(&e.to_string());
        return ExitCode::from(EXIT_ERROR);
    }
    if let Some(format) = recorder.mime_type() {
        info!(%format, "recording");
    }

    record_until_done(&recorder, &presenter, &shutdown, options.duration, &bytes).await;

    let artifact = match recorder.stop().await {
        Ok(artifact) => artifact,
        Err(e) => {
            let message = failure
                .lock()
                .take()
                .map(|f| f.to_string())
                .unwrap_or_else(|| e.to_string());
            presenter.spinner_fail(&message);
            recorder.dispose().await;
            return ExitCode::from(EXIT_ERROR);
        }
    };
    recorder.dispose().await;

    let artifact = match options.convert {
        Some(target) => {
            presenter.update_spinner(&format!("Converting to {}...", target));
            let convert_options = ConvertOptions::new(target).with_bitrate(options.bitrate);
            match convert(&artifact, &convert_options).await {
                Ok(converted) => converted,
                Err(e) => {
                    presenter.spinner_fail(&e.to_string());
                    return ExitCode::from(EXIT_ERROR);
                }
            }
        }
        None => artifact,
    };

    let path = options
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(options.output_dir.as_deref(), artifact.format()));

    match write_artifact(&path, &artifact).await {
        Ok(()) => {
            presenter.spinner_success(&format!(
                "Saved {} ({}, {})",
                path.display(),
                artifact.mime_type(),
                artifact.human_readable_size()
            ));
            presenter.output(&path.to_string_lossy());
            ExitCode::from(EXIT_SUCCESS)
        }
        Err(e) => {
            presenter.spinner_fail(&format!("Failed to write {}: {}", path.display(), e));
            ExitCode::from(EXIT_ERROR)
        }
    }
}

/// Tick the progress line until the duration elapses, Ctrl+C arrives or
/// the session is forced inactive by a device failure.
async fn record_until_done(
    recorder: &Recorder,
    presenter: &Presenter,
    shutdown: &ShutdownSignal,
    duration: Duration,
    bytes: &AtomicUsize,
) {
    let total = duration.as_std();
    let started = Instant::now();
    let mut ticker = tokio::time::interval(PROGRESS_TICK);

    loop {
        tokio::select! {
            _ = shutdown.wait() => {
                presenter.info("Interrupted, finishing recording");
                break;
            }
            _ = ticker.tick() => {
                let state = recorder.state();
                let elapsed = started.elapsed();
                if !state.is_active() || elapsed >= total {
                    break;
                }
                presenter.update_recording_progress(
                    state,
                    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                    duration.as_millis(),
                    bytes.load(Ordering::Relaxed),
                );
            }
        }
    }
}

/// Print native support for the common recording formats
pub async fn run_formats() -> ExitCode {
    let presenter = Presenter::new();
    for format in COMMON_FORMATS {
        presenter.format_support(format, is_format_supported(format));
    }
    ExitCode::from(EXIT_SUCCESS)
}

/// Convert an audio file on disk
pub async fn run_convert(
    input: PathBuf,
    target: TargetArg,
    bitrate: Option<u32>,
    output: Option<PathBuf>,
) -> ExitCode {
    let mut presenter = Presenter::new();
    let target = TargetFormat::from(target);

    let Some(source) = input
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(FormatId::from_extension)
    else {
        presenter.error(&format!(
            "Cannot determine the format of {} from its extension",
            input.display()
        ));
        return ExitCode::from(EXIT_USAGE_ERROR);
    };

    let data = match tokio::fs::read(&input).await {
        Ok(data) => data,
        Err(e) => {
            presenter.error(&format!("Failed to read {}: {}", input.display(), e));
            return ExitCode::from(EXIT_ERROR);
        }
    };
    let artifact = Artifact::new(data, source);
    debug!(input = %input.display(), format = %artifact.format(), %target, "converting file");

    let mut options = ConvertOptions::new(target);
    if let Some(bitrate) = bitrate {
        options = options.with_bitrate(bitrate);
    }

    presenter.start_spinner(&format!("Converting to {}...", target));
    let converted = match convert(&artifact, &options).await {
        Ok(converted) => converted,
        Err(e) => {
            presenter.spinner_fail(&e.to_string());
            return ExitCode::from(EXIT_ERROR);
        }
    };

    let path = output.unwrap_or_else(|| converted_path(&input, target));
    match write_artifact(&path, &converted).await {
        Ok(()) => {
            presenter.spinner_success(&format!(
                "Saved {} ({})",
                path.display(),
                converted.human_readable_size()
            ));
            presenter.output(&path.to_string_lossy());
            ExitCode::from(EXIT_SUCCESS)
        }
        Err(e) => {
            presenter.spinner_fail(&format!("Failed to write {}: {}", path.display(), e));
            ExitCode::from(EXIT_ERROR)
        }
    }
}

/// Settings supplied on the command line
pub fn cli_config(args: &RecordArgs) -> AppConfig {
    AppConfig {
        mime_type: args.format.clone(),
        fallbacks: if args.fallbacks.is_empty() {
            None
        } else {
            Some(args.fallbacks.clone())
        },
        bitrate: args.bitrate,
        timeslice_ms: args.timeslice,
        duration: args.duration.clone(),
        output_dir: None,
    }
}

/// Validate the merged settings for a recording run
pub fn resolve_record_options(
    args: &RecordArgs,
    config: &AppConfig,
) -> Result<RecordOptions, String> {
    let duration = match config.duration.as_deref() {
        Some(s) => s
            .parse::<Duration>()
            .map_err(|e| format!("Invalid duration: {}", e))?,
        None => Duration::default_duration(),
    };
    if duration.as_millis() == 0 {
        return Err("Invalid duration: must be greater than zero".to_string());
    }

    let formats = config
        .mime_type
        .iter()
        .chain(config.fallbacks.iter().flatten());
    for format in formats {
        FormatId::parse(format).map_err(|e| format!("Invalid format: {}", e))?;
    }

    let bitrate = config
        .bitrate
        .unwrap_or_else(|| config.recorder_config().audio_bits_per_second);
    if bitrate == 0 {
        return Err("Invalid bitrate: must be greater than zero".to_string());
    }

    Ok(RecordOptions {
        duration,
        output: args.output.clone(),
        output_dir: config.output_dir.as_ref().map(PathBuf::from),
        convert: args.convert.map(TargetFormat::from),
        bitrate,
    })
}

/// `<dir>/recording-<unix ms>.<ext>`
fn default_output_path(dir: Option<&Path>, format: &FormatId) -> PathBuf {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    dir.unwrap_or_else(|| Path::new("."))
        .join(format!("recording-{}.{}", stamp, format.extension()))
}

/// Input path with the target extension, never the input itself
fn converted_path(input: &Path, target: TargetFormat) -> PathBuf {
    let path = input.with_extension(target.extension());
    if path != input {
        return path;
    }
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    input.with_file_name(format!("{}.converted.{}", stem, target.extension()))
}

async fn write_artifact(path: &Path, artifact: &Artifact) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, artifact.data()).await
}

/// Load and merge configuration from file and CLI.
///
/// The format environment variable is resolved by clap into the CLI
/// layer, so the effective order is defaults < file < env < flags.
pub async fn load_merged_config(cli_config: AppConfig) -> AppConfig {
    let store = XdgConfigStore::new();
    let file_config = store.load_or_empty().await;

    AppConfig::defaults().merge(file_config).merge(cli_config)
}
