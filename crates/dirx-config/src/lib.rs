//! # dirx-config
//!
//! Layered configuration loading for dirx using figment.
//!
//! Configuration sources (in priority order, highest wins):
//! 1. Environment variables (`DIRX_*` prefix, `__` as separator)
//! 2. Project-level `.dirx/config.toml`
//! 3. User-level `~/.config/dirx/config.toml`
//! 4. Built-in defaults
//!
//! # Environment Variable Mapping
//!
//! Figment maps `DIRX_TRANSFER__PAGE_SIZE` -> `transfer.page_size`,
//! `DIRX_PROGRESS__MODE` -> `progress.mode`, etc.
//!
//! # Usage
//!
//! ```no_run
//! use dirx_config::DirxConfig;
//!
//! let config = DirxConfig::load_with_dotenv().expect("config");
//! println!("page size: {}", config.transfer.page_size);
//! ```

mod error;
mod progress;
mod transfer;

pub use error::ConfigError;
pub use progress::{ProgressConfig, ProgressMode};
pub use transfer::TransferConfig;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DirxConfig {
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub progress: ProgressConfig,
}

impl DirxConfig {
    /// Load configuration from all sources (TOML files + environment variables)
    /// and validate it.
    ///
    /// Does NOT call `dotenvy` -- use [`load_with_dotenv`](Self::load_with_dotenv)
    /// if you need `.env` file loading.
    pub fn load() -> Result<Self, ConfigError> {
        let config: Self = Self::figment().extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with `.env` file support.
    pub fn load_with_dotenv() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::load()
    }

    /// Build the figment provider chain.
    ///
    /// Public so tests can inspect the figment or layer extra providers.
    pub fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                figment = figment.merge(Toml::file(global_path));
            }
        }

        let local_path = PathBuf::from(".dirx/config.toml");
        if local_path.exists() {
            figment = figment.merge(Toml::file(local_path));
        }

        figment.merge(Env::prefixed("DIRX_").split("__"))
    }

    /// Check values figment cannot reject on its own.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.transfer.validate()
    }

    fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("dirx").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = DirxConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.progress.mode, ProgressMode::Auto);
    }

    #[test]
    fn figment_builds_without_files() {
        let config: DirxConfig = DirxConfig::figment().extract().expect("defaults extract");
        assert_eq!(config.transfer.page_size, 100);
        assert_eq!(config.transfer.compression_level, 9);
    }
}
