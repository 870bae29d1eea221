//! Cache Store Implementations
//!
//! # Available Stores
//!
//! - **Memory** - In-process map with a background expiry sweeper
//! - **Redis** - Remote store with key prefixing and SCAN-based prefix deletion (feature: `redis`)
//!
//! # Usage
//!
//! ```rust,no_run
//! use tagged_cache::backends::{MemoryStore, RedisStore};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let memory = MemoryStore::new();
//! let redis = RedisStore::with_url("redis://localhost:6379", "myapp:").await?;
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod memory_store;
pub use memory_store::{MemoryStore, MemoryStoreStats};

#[cfg(feature = "redis")]
pub mod redis_store;
#[cfg(feature = "redis")]
pub use redis_store::RedisStore;

/// Store selection as it appears in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-process [`MemoryStore`]
    #[default]
    Memory,
    /// Remote Redis store (feature `redis`)
    Redis,
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "in-memory" | "inmemory" => Ok(Self::Memory),
            "redis" => Ok(Self::Redis),
            other => anyhow::bail!("unknown cache backend '{other}' (expected memory or redis)"),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Memory => "memory",
            Self::Redis => "redis",
        })
    }
}
