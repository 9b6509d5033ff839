//! Config command handler

use crate::application::ports::ConfigStore;
use crate::domain::config::AppConfig;
use crate::domain::error::ConfigError;
use crate::domain::format::FormatId;
use crate::domain::recording::Duration;

use super::args::{is_valid_config_key, ConfigAction, VALID_CONFIG_KEYS};
use super::presenter::Presenter;

const NOT_SET: &str = "(not set)";

/// Handle config subcommand
pub async fn handle_config_command<S: ConfigStore>(
    action: ConfigAction,
    store: &S,
    presenter: &Presenter,
) -> Result<(), ConfigError> {
    match action {
        ConfigAction::Init => handle_init(store, presenter).await,
        ConfigAction::Set { key, value } => handle_set(store, presenter, &key, &value).await,
        ConfigAction::Get { key } => handle_get(store, presenter, &key).await,
        ConfigAction::List => handle_list(store, presenter).await,
        ConfigAction::Path => handle_path(store, presenter),
    }
}

async fn handle_init<S: ConfigStore>(store: &S, presenter: &Presenter) -> Result<(), ConfigError> {
    store.init().await?;
    presenter.success(&format!(
        "Config file created at: {}",
        store.path().display()
    ));
    Ok(())
}

async fn handle_set<S: ConfigStore>(
    store: &S,
    presenter: &Presenter,
    key: &str,
    value: &str,
) -> Result<(), ConfigError> {
    check_key(key)?;
    let mut config = store.load().await?;
    apply_value(&mut config, key, value)?;
    store.save(&config).await?;
    presenter.success(&format!("{} = {}", key, value));
    Ok(())
}

async fn handle_get<S: ConfigStore>(
    store: &S,
    presenter: &Presenter,
    key: &str,
) -> Result<(), ConfigError> {
    check_key(key)?;
    let config = store.load().await?;
    presenter.output(display_value(&config, key).as_deref().unwrap_or(NOT_SET));
    Ok(())
}

async fn handle_list<S: ConfigStore>(store: &S, presenter: &Presenter) -> Result<(), ConfigError> {
    let config = store.load().await?;
    for key in VALID_CONFIG_KEYS {
        presenter.key_value(key, display_value(&config, key).as_deref().unwrap_or(NOT_SET));
    }
    Ok(())
}

fn handle_path<S: ConfigStore>(store: &S, presenter: &Presenter) -> Result<(), ConfigError> {
    presenter.output(&store.path().to_string_lossy());
    Ok(())
}

fn check_key(key: &str) -> Result<(), ConfigError> {
    if is_valid_config_key(key) {
        return Ok(());
    }
    Err(ConfigError::ValidationError {
        key: key.to_string(),
        message: format!("Unknown key. Valid keys: {}", VALID_CONFIG_KEYS.join(", ")),
    })
}

/// Validate `value` for `key` and store it in `config`
fn apply_value(config: &mut AppConfig, key: &str, value: &str) -> Result<(), ConfigError> {
    let invalid = |message: String| ConfigError::ValidationError {
        key: key.to_string(),
        message,
    };

    match key {
        "mime_type" => {
            let format = FormatId::parse(value).map_err(|e| invalid(e.to_string()))?;
            config.mime_type = Some(format.to_string());
        }
        "fallbacks" => {
            let formats = parse_format_list(value).map_err(invalid)?;
            config.fallbacks = Some(formats);
        }
        "bitrate" => {
            let bitrate = value
                .parse::<u32>()
                .ok()
                .filter(|&b| b > 0)
                .ok_or_else(|| invalid("Value must be a positive integer".to_string()))?;
            config.bitrate = Some(bitrate);
        }
        "timeslice_ms" => {
            let timeslice = value
                .parse::<u64>()
                .map_err(|_| invalid("Value must be a non-negative integer".to_string()))?;
            config.timeslice_ms = Some(timeslice);
        }
        "duration" => {
            value
                .parse::<Duration>()
                .map_err(|e| invalid(e.to_string()))?;
            config.duration = Some(value.to_string());
        }
        "output_dir" => config.output_dir = Some(value.to_string()),
        _ => return Err(invalid("Unknown key".to_string())),
    }
    Ok(())
}

/// Comma-separated format list; an empty string clears the fallbacks
fn parse_format_list(value: &str) -> Result<Vec<String>, String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            FormatId::parse(s)
                .map(|f| f.to_string())
                .map_err(|e| e.to_string())
        })
        .collect()
}

fn display_value(config: &AppConfig, key: &str) -> Option<String> {
    match key {
        "mime_type" => config.mime_type.clone(),
        "fallbacks" => config.fallbacks.as_ref().map(|list| list.join(",")),
        "bitrate" => config.bitrate.map(|b| b.to_string()),
        "timeslice_ms" => config.timeslice_ms.map(|t| t.to_string()),
        "duration" => config.duration.clone(),
        "output_dir" => config.output_dir.clone(),
        _ => None,
    }
}
