//! Configuration port interface

use async_trait::async_trait;
use std::path::PathBuf;

use crate::domain::config::AppConfig;
use crate::domain::error::ConfigError;

/// Port for persisted recorder settings
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Load stored settings; an absent file yields an empty config.
    async fn load(&self) -> Result<AppConfig, ConfigError>;

    /// Persist settings, creating parent directories as needed.
    async fn save(&self, config: &AppConfig) -> Result<(), ConfigError>;

    /// Location of the backing file
    fn path(&self) -> PathBuf;

    fn exists(&self) -> bool;

    /// Write the defaults. Fails if the file already exists.
    async fn init(&self) -> Result<(), ConfigError>;

    /// Load settings, treating unreadable or malformed files as empty.
    async fn load_or_empty(&self) -> AppConfig {
        match self.load().await {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %self.path().display(), error = %e, "ignoring config file");
                AppConfig::empty()
            }
        }
    }
}
