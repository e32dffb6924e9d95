// ============================
// crates/backend-lib/src/config.rs
// ============================
//! Configuration management.
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! `TEMPLEMEET_*` environment variables (`__` separates nested keys, e.g.
//! `TEMPLEMEET_RATE_LIMIT__MAX_REQUESTS=10`).
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

const DEFAULT_CONFIG_FILE: &str = "config.toml";
const ENV_PREFIX: &str = "TEMPLEMEET_";
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Server bind address
    pub bind_addr: SocketAddr,
    /// Data directory path
    pub data_dir: PathBuf,
    /// Log level
    pub log_level: String,
    /// `pretty` or `json`
    pub log_format: LogFormat,
    /// Idle seconds before a silent connection is closed
    pub heartbeat_timeout_secs: u64,
    /// Per-room relay buffer; slower connections skip ahead
    pub relay_capacity: usize,
    /// Per-connection outbound queue
    pub outbound_buffer: usize,
    pub rate_limit: RateLimitSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Rate limiting for the HTTP API
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Window length in seconds
    pub window_secs: u64,
    /// Requests allowed per client IP and window
    pub max_requests: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            data_dir: PathBuf::from("data"),
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            heartbeat_timeout_secs: 60,
            relay_capacity: 256,
            outbound_buffer: 64,
            rate_limit: RateLimitSettings::default(),
        }
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            window_secs: 60,
            max_requests: 100,
        }
    }
}

impl Settings {
    /// Load settings from defaults, a TOML file and the environment
    ///
    /// Without an explicit `path`, `config.toml` in the working directory is
    /// used when present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        if path.is_some() && !file.exists() {
            bail!("Config file not found: {}", file.display());
        }

        let settings: Settings = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if !LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            bail!("Invalid log level: {}", self.log_level);
        }
        if self.heartbeat_timeout_secs == 0 {
            bail!("heartbeat_timeout_secs must be greater than 0");
        }
        if self.relay_capacity == 0 {
            bail!("relay_capacity must be greater than 0");
        }
        if self.outbound_buffer == 0 {
            bail!("outbound_buffer must be greater than 0");
        }
        if self.rate_limit.window_secs == 0 || self.rate_limit.max_requests == 0 {
            bail!("Rate limit window and max requests must be greater than 0");
        }
        Ok(())
    }
}
