//! Configuration schema for Strata
//!
//! Configuration is stored at `~/.config/strata/config.toml`

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// HTTP server settings
    pub server: ServerConfig,

    /// Result cache settings
    pub cache: CacheConfig,

    /// Analysis engine settings
    pub analyzer: AnalyzerConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind, e.g. "127.0.0.1:7001"
    pub listen: String,

    /// Development mode disables client cache hints
    pub dev: bool,

    /// Client cache hint for finished analyses, in seconds
    pub max_age_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:7001".to_string(),
            dev: false,
            max_age_secs: 300,
        }
    }
}

impl ServerConfig {
    /// Value for the `Cache-Control` header, `None` in development mode
    pub fn cache_control(&self) -> Option<String> {
        if self.dev || self.max_age_secs == 0 {
            None
        } else {
            Some(format!("public, max-age={}", self.max_age_secs))
        }
    }
}

/// Result cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of tracked images
    pub capacity: usize,

    /// Age after which an entry is recomputed, in seconds
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 32,
            ttl_secs: 600,
        }
    }
}

impl CacheConfig {
    /// TTL as a duration
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Analysis engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Container engine CLI: "podman" or "docker"
    pub engine: String,

    /// Pull images that are not available locally
    pub pull: bool,

    /// Number of wasteful paths reported per image
    pub top_inefficiencies: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            engine: "podman".to_string(),
            pull: true,
            top_inefficiencies: 20,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.cache.capacity, 32);
        assert_eq!(config.cache.ttl(), Duration::from_secs(600));
        assert_eq!(config.server.max_age_secs, 300);
        assert_eq!(config.analyzer.engine, "podman");
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
[server]
dev = true

[cache]
ttl_secs = 60
"#,
        )
        .unwrap();

        assert!(config.server.dev);
        assert_eq!(config.server.listen, "127.0.0.1:7001");
        assert_eq!(config.cache.ttl_secs, 60);
        assert_eq!(config.cache.capacity, 32);
    }

    #[test]
    fn cache_control_hint() {
        let mut server = ServerConfig::default();
        assert_eq!(
            server.cache_control().as_deref(),
            Some("public, max-age=300")
        );

        server.dev = true;
        assert!(server.cache_control().is_none());
    }
}
