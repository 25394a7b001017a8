//! Configuration for Strata
//!
//! A single TOML file, `config.toml` under the platform config directory
//! unless `--config`/`STRATA_CONFIG` points elsewhere. A missing file means
//! defaults. Values are checked on load and before every save, so `serve`
//! never starts with a zero-sized cache or an unparsable listen address.

pub mod schema;

pub use schema::Config;

use crate::error::{StrataError, StrataResult};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Locates, reads and writes the config file
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Manager for the platform default location
    pub fn new() -> Self {
        Self::with_path(Self::default_config_path())
    }

    /// Manager for an explicit file
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// `<config dir>/strata/config.toml`, or `./strata/config.toml` when the
    /// platform has no config directory
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("strata")
            .join("config.toml")
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Read and check the config file; defaults when it does not exist
    pub async fn load(&self) -> StrataResult<Config> {
        let content = match fs::read_to_string(&self.config_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.config_path.display(), "No config file, using defaults");
                return Ok(Config::default());
            }
            Err(e) => {
                return Err(StrataError::io(
                    format!("reading config from {}", self.config_path.display()),
                    e,
                ))
            }
        };

        let config: Config = toml::from_str(&content).map_err(|e| self.invalid(e.to_string()))?;
        self.check(&config)?;
        Ok(config)
    }

    /// Check and write the config
    ///
    /// The file is replaced through a sibling temp file, so readers see
    /// either the old or the new contents.
    pub async fn save(&self, config: &Config) -> StrataResult<()> {
        self.check(config)?;

        let dir = match self.config_path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| StrataError::ConfigDirCreate {
                path: dir.clone(),
                source: e,
            })?;

        let staged = self.config_path.with_extension("toml.tmp");
        fs::write(&staged, toml::to_string_pretty(config)?)
            .await
            .map_err(|e| StrataError::io(format!("writing {}", staged.display()), e))?;
        fs::rename(&staged, &self.config_path).await.map_err(|e| {
            StrataError::io(format!("replacing {}", self.config_path.display()), e)
        })?;

        info!(path = %self.config_path.display(), "Configuration saved");
        Ok(())
    }

    fn check(&self, config: &Config) -> StrataResult<()> {
        if !matches!(config.general.log_format.as_str(), "text" | "json") {
            return Err(self.invalid(format!(
                "general.log_format must be \"text\" or \"json\", got {:?}",
                config.general.log_format
            )));
        }
        if config.server.listen.parse::<SocketAddr>().is_err() {
            return Err(self.invalid(format!(
                "server.listen {:?} is not a socket address",
                config.server.listen
            )));
        }
        if config.cache.capacity == 0 {
            return Err(self.invalid("cache.capacity must be at least 1".to_string()));
        }
        if config.cache.ttl_secs == 0 {
            return Err(self.invalid("cache.ttl_secs must be at least 1".to_string()));
        }
        if config.analyzer.engine.trim().is_empty() {
            return Err(self.invalid("analyzer.engine can not be empty".to_string()));
        }
        Ok(())
    }

    fn invalid(&self, reason: String) -> StrataError {
        StrataError::ConfigInvalid {
            path: self.config_path.clone(),
            reason,
        }
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
