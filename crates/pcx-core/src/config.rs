//! Runtime configuration.
//!
//! Loaded from a TOML file; every key is optional and falls back to the
//! defaults below.
//!
//! ```toml
//! [server]
//! listen = "127.0.0.1:9001"
//!
//! [timeouts]
//! read_ms = 100
//! scan_ms = 5000
//!
//! [sync]
//! interval_ms = 16
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::Result;

/// Default address the transport listens on for the agent
pub const DEFAULT_LISTEN: &str = "127.0.0.1:9001";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address the agent connects to
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub read_ms: u64,
    pub write_ms: u64,
    /// Bound for pattern scans and large span reads
    pub scan_ms: u64,
    /// Bound for module listing and process attach
    pub control_ms: u64,
    /// Age after which an unanswered request is discarded
    pub stale_request_secs: u64,
    /// How long the CLI waits for the agent to connect
    pub connect_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            read_ms: 100,
            write_ms: 100,
            scan_ms: 5000,
            control_ms: 5000,
            stale_request_secs: 5,
            connect_secs: 30,
        }
    }
}

impl TimeoutConfig {
    pub fn read(&self) -> Duration {
        Duration::from_millis(self.read_ms)
    }

    pub fn write(&self) -> Duration {
        Duration::from_millis(self.write_ms)
    }

    pub fn scan(&self) -> Duration {
        Duration::from_millis(self.scan_ms)
    }

    pub fn control(&self) -> Duration {
        Duration::from_millis(self.control_ms)
    }

    pub fn stale_request(&self) -> Duration {
        Duration::from_secs(self.stale_request_secs)
    }

    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub read_ttl_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { read_ttl_ms: 500 }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub interval_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { interval_ms: 16 }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Number of pointer-width hex fields in a new region
    pub default_fields: usize,
    /// Number of pointer-width hex fields in the preview region
    pub preview_fields: usize,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            default_fields: 50,
            preview_fields: 15,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub timeouts: TimeoutConfig,
    pub cache: CacheConfig,
    pub sync: SyncConfig,
    pub layout: LayoutConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Create a new configuration builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    pub fn read_ttl(&self) -> Duration {
        Duration::from_millis(self.cache.read_ttl_ms)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync.interval_ms)
    }
}

/// Builder for Config, used to layer command-line overrides on a loaded file
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    base: Option<Config>,
    listen: Option<String>,
    sync_interval_ms: Option<u64>,
    connect_secs: Option<u64>,
}

impl ConfigBuilder {
    /// Start from an existing configuration instead of the defaults
    pub fn base(mut self, config: Config) -> Self {
        self.base = Some(config);
        self
    }

    /// Set the listen address
    pub fn listen<S: Into<String>>(mut self, addr: S) -> Self {
        self.listen = Some(addr.into());
        self
    }

    /// Set the sync loop period
    pub fn sync_interval_ms(mut self, ms: u64) -> Self {
        self.sync_interval_ms = Some(ms);
        self
    }

    /// Set how long to wait for the agent to connect
    pub fn connect_secs(mut self, secs: u64) -> Self {
        self.connect_secs = Some(secs);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Config {
        let mut config = self.base.unwrap_or_default();
        if let Some(listen) = self.listen {
            config.server.listen = listen;
        }
        if let Some(ms) = self.sync_interval_ms {
            config.sync.interval_ms = ms;
        }
        if let Some(secs) = self.connect_secs {
            config.timeouts.connect_secs = secs;
        }
        config
    }
}
