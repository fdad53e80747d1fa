//! Configuration management
//!
//! TOML configuration with environment variable overrides and defaults
//! matching the classic `hokud` command-line flags.
//!
//! ```toml
//! [server]
//! listen_addr = "0.0.0.0:8080"
//! log_level = "info"
//!
//! [window]
//! width_secs = 60
//! retention_buckets = 6
//!
//! [sketch]
//! width_bits = 20
//! depth = 5
//! topk = 100
//! ```

use crate::engine::CounterSettings;
use crate::error::{Error, Result};
use crate::sketch::MAX_WIDTH_BITS;
use crate::types::Epoch;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming a configuration file
pub const CONFIG_ENV: &str = "HOKUD_CONFIG";

/// Configuration file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "hokud.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ApplicationConfig {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Windowing settings
    #[serde(default)]
    pub window: WindowConfig,

    /// Sketch dimensions
    #[serde(default)]
    pub sketch: SketchConfig,

    /// Log replay settings
    #[serde(default)]
    pub replay: ReplayConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// CORS allowed origins (empty = any origin)
    #[serde(default)]
    pub cors_allowed_origins: Vec<String>,

    /// Longest range a counts query may cover, in windows
    #[serde(default = "default_max_query_buckets")]
    pub max_query_buckets: usize,
}

/// Windowing configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WindowConfig {
    /// Seconds per window
    #[serde(default = "default_width_secs")]
    pub width_secs: i64,

    /// Finalized windows to keep
    #[serde(default = "default_retention_buckets")]
    pub retention_buckets: usize,

    /// Anchor epoch for replay; live mode anchors at startup time
    #[serde(default)]
    pub anchor_epoch: Option<Epoch>,
}

/// Sketch configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SketchConfig {
    /// Count-min columns per row, as a power of two
    #[serde(default = "default_width_bits")]
    pub width_bits: u32,

    /// Count-min rows
    #[serde(default = "default_depth")]
    pub depth: usize,

    /// Keys kept per finalized top-K window
    #[serde(default = "default_topk")]
    pub topk: usize,
}

/// Replay configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ReplayConfig {
    /// Record file to replay instead of counting live traffic
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Lines between progress log messages
    #[serde(default = "default_progress_every")]
    pub progress_every: u64,
}

// Default value functions
fn default_listen_addr() -> String { "0.0.0.0:8080".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_max_query_buckets() -> usize { 10_000 }
fn default_width_secs() -> i64 { 60 }
fn default_retention_buckets() -> usize { 6 }
fn default_width_bits() -> u32 { 20 }
fn default_depth() -> usize { 5 }
fn default_topk() -> usize { 100 }
fn default_progress_every() -> u64 { crate::rotation::DEFAULT_PROGRESS_EVERY }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            log_level: default_log_level(),
            cors_allowed_origins: Vec::new(),
            max_query_buckets: default_max_query_buckets(),
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width_secs: default_width_secs(),
            retention_buckets: default_retention_buckets(),
            anchor_epoch: None,
        }
    }
}

impl Default for SketchConfig {
    fn default() -> Self {
        Self {
            width_bits: default_width_bits(),
            depth: default_depth(),
            topk: default_topk(),
        }
    }
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            path: None,
            progress_every: default_progress_every(),
        }
    }
}

impl ApplicationConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        Self::from_toml(&contents)
            .map_err(|e| Error::Configuration(format!("{:?}: {}", path, e)))
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| Error::Configuration(format!("Failed to parse config: {}", e)))
    }

    /// Load from environment variables only
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Resolve configuration the way the server does at startup
    ///
    /// Priority: `HOKUD_CONFIG`, then `./hokud.toml`, then defaults.
    /// Environment overrides are applied on top in every case.
    pub fn discover() -> Result<Self> {
        let mut config = if let Ok(path) = std::env::var(CONFIG_ENV) {
            Self::load(path)?
        } else if Path::new(DEFAULT_CONFIG_FILE).exists() {
            Self::load(DEFAULT_CONFIG_FILE)?
        } else {
            Self::default()
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(addr) = std::env::var("HOKUD_LISTEN_ADDR") {
            self.server.listen_addr = addr;
        }
        if let Ok(level) = std::env::var("RUST_LOG") {
            self.server.log_level = level;
        }
        if let Some(width) = env_parse("HOKUD_WINDOW_SECS")? {
            self.window.width_secs = width;
        }
        if let Some(retention) = env_parse("HOKUD_RETENTION")? {
            self.window.retention_buckets = retention;
        }
        if let Some(bits) = env_parse("HOKUD_SKETCH_WIDTH_BITS")? {
            self.sketch.width_bits = bits;
        }
        if let Some(depth) = env_parse("HOKUD_SKETCH_DEPTH")? {
            self.sketch.depth = depth;
        }
        if let Some(topk) = env_parse("HOKUD_TOPK")? {
            self.sketch.topk = topk;
        }
        if let Ok(path) = std::env::var("HOKUD_REPLAY_FILE") {
            self.replay.path = Some(PathBuf::from(path));
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.listen_addr.is_empty() {
            return Err(Error::Configuration("Listen address cannot be empty".to_string()));
        }
        if self.window.width_secs <= 0 {
            return Err(Error::Configuration("Window width must be > 0".to_string()));
        }
        if self.window.retention_buckets == 0 {
            return Err(Error::Configuration("Retention must be > 0".to_string()));
        }
        if self.sketch.width_bits == 0 || self.sketch.width_bits > MAX_WIDTH_BITS {
            return Err(Error::Configuration(format!(
                "Sketch width bits must be in 1..={}",
                MAX_WIDTH_BITS
            )));
        }
        if self.sketch.depth == 0 {
            return Err(Error::Configuration("Sketch depth must be > 0".to_string()));
        }
        if self.sketch.topk == 0 {
            return Err(Error::Configuration("Top-K depth must be > 0".to_string()));
        }
        if self.replay.path.is_some() && self.window.anchor_epoch.is_none() {
            return Err(Error::Configuration(
                "Replay requires an anchor epoch".to_string(),
            ));
        }
        Ok(())
    }

    /// Counter settings anchored at `anchor_epoch`
    pub fn counter_settings(&self, anchor_epoch: Epoch) -> CounterSettings {
        CounterSettings {
            anchor_epoch,
            window_width: self.window.width_secs,
            retention_buckets: self.window.retention_buckets,
            estimator_width_bits: self.sketch.width_bits,
            estimator_depth: self.sketch.depth,
            topk_depth: self.sketch.topk,
            max_query_buckets: self.server.max_query_buckets,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| Error::Configuration(format!("Invalid {}: {:?}", name, value))),
        Err(_) => Ok(None),
    }
}
