//! Cache Configuration
//!
//! Settings consumed once, when a [`CacheSystem`](crate::CacheSystem) is built.
//! Values come from a config file section (serde) or from environment
//! variables via [`CacheConfig::from_env`].

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::backends::BackendKind;
use crate::codecs::CodecKind;

pub const ENV_BACKEND: &str = "CACHE_BACKEND";
pub const ENV_REDIS_URL: &str = "REDIS_URL";
pub const ENV_KEY_PREFIX: &str = "CACHE_KEY_PREFIX";
pub const ENV_SERIALIZER: &str = "CACHE_SERIALIZER";
pub const ENV_DEFAULT_TTL_SECS: &str = "CACHE_DEFAULT_TTL_SECS";
pub const ENV_SWEEP_INTERVAL_SECS: &str = "CACHE_SWEEP_INTERVAL_SECS";
pub const ENV_SCAN_BATCH_SIZE: &str = "CACHE_SCAN_BATCH_SIZE";

/// Cache construction settings
///
/// # Example
///
/// ```rust
/// use tagged_cache::config::CacheConfig;
///
/// let raw = r#"{"serializer": "json", "default_ttl_secs": 60}"#;
/// let config: CacheConfig = serde_json::from_str(raw).unwrap();
/// assert_eq!(config.default_ttl().as_secs(), 60);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Which store to build
    pub backend: BackendKind,

    /// Redis connection string, used when `backend` is `redis`
    pub redis_url: Option<String>,

    /// Prepended to every physical key (Redis only)
    pub key_prefix: String,

    /// Value encoding
    pub serializer: CodecKind,

    /// TTL used when a write passes `Duration::ZERO`
    pub default_ttl_secs: u64,

    /// How often the memory store drops expired entries
    pub sweep_interval_secs: u64,

    /// Keys requested per Redis `SCAN` round trip
    pub scan_batch_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Memory,
            redis_url: None,
            key_prefix: String::new(),
            serializer: CodecKind::Json,
            default_ttl_secs: 300,
            sweep_interval_secs: 60,
            scan_batch_size: 100,
        }
    }
}

impl CacheConfig {
    /// Read configuration from the process environment
    ///
    /// Unset variables keep their [`Default`] values.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable source
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but cannot be parsed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_BACKEND) {
            config.backend = parse_var(ENV_BACKEND, &raw)?;
        }
        if let Some(url) = lookup(ENV_REDIS_URL) {
            config.redis_url = Some(url);
        }
        if let Some(prefix) = lookup(ENV_KEY_PREFIX) {
            config.key_prefix = prefix;
        }
        if let Some(raw) = lookup(ENV_SERIALIZER) {
            config.serializer = parse_var(ENV_SERIALIZER, &raw)?;
        }
        if let Some(raw) = lookup(ENV_DEFAULT_TTL_SECS) {
            config.default_ttl_secs = parse_var(ENV_DEFAULT_TTL_SECS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_SWEEP_INTERVAL_SECS) {
            config.sweep_interval_secs = parse_var(ENV_SWEEP_INTERVAL_SECS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_SCAN_BATCH_SIZE) {
            config.scan_batch_size = parse_var(ENV_SCAN_BATCH_SIZE, &raw)?;
        }

        Ok(config)
    }

    #[must_use]
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn parse_var<T>(name: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|err| anyhow::anyhow!("{err}"))
        .with_context(|| format!("Invalid value '{raw}' for {name}"))
}
