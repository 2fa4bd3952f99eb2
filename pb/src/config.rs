//! PlanBridge configuration types and loading

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::{Context, Result};
use requestkit::BackoffPolicy;
use serde::{Deserialize, Serialize};

/// Main PlanBridge configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backend endpoints and timeouts
    pub backend: BackendConfig,

    /// Reconnection policy for the realtime link
    pub reconnect: ReconnectConfig,

    /// Read-cache tuning
    pub cache: CacheConfig,

    /// Message persistence behavior
    pub persistence: PersistenceConfig,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Project-local config: .planbridge.yml
        let local_config = PathBuf::from(".planbridge.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // User config: ~/.config/planbridge/planbridge.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("planbridge").join("planbridge.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Backend endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// HTTP API base URL
    #[serde(rename = "api-base-url")]
    pub api_base_url: String,

    /// Explicit realtime host override (host[:port], no scheme)
    #[serde(rename = "ws-host")]
    pub ws_host: Option<String>,

    /// Request timeout in milliseconds
    #[serde(rename = "request-timeout-ms")]
    pub request_timeout_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000".to_string(),
            ws_host: None,
            request_timeout_ms: 30_000,
        }
    }
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Address of the realtime endpoint
    ///
    /// Uses the explicit host override when set, otherwise the API host.
    /// The link is upgraded to `wss` exactly when the API itself is
    /// served over TLS.
    pub fn websocket_url(&self) -> String {
        let base = self.api_base_url.trim_end_matches('/');
        let secure = base.starts_with("https://");
        let scheme = if secure { "wss" } else { "ws" };

        let host = match &self.ws_host {
            Some(host) => host.trim_end_matches('/').to_string(),
            None => base
                .strip_prefix("https://")
                .or_else(|| base.strip_prefix("http://"))
                .unwrap_or(base)
                .to_string(),
        };

        format!("{}://{}/ws", scheme, host)
    }
}

/// Reconnection policy for the realtime link
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Reconnect attempts before giving up
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    #[serde(rename = "base-delay-ms")]
    pub base_delay_ms: u64,

    #[serde(rename = "max-delay-ms")]
    pub max_delay_ms: u64,

    pub factor: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            factor: 2.0,
        }
    }
}

impl ReconnectConfig {
    pub fn policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            max_retries: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            factor: self.factor,
        }
    }
}

/// Read-cache tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    #[serde(rename = "ttl-ms")]
    pub ttl_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_ms: 60_000 }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

/// Message persistence behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Delay between a final persist settling and the list-refresh signal
    #[serde(rename = "refresh-delay-ms")]
    pub refresh_delay_ms: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self { refresh_delay_ms: 2000 }
    }
}

impl PersistenceConfig {
    pub fn refresh_delay(&self) -> Duration {
        Duration::from_millis(self.refresh_delay_ms)
    }
}
