//! Cache Error Taxonomy
//!
//! Absence is never an error: lookups return `Ok(None)`. Everything else is a
//! [`CacheError`]. The enum is `Clone` because one in-flight load result is
//! fanned out to every waiter, so inner errors are kept behind an `Arc`.

use std::sync::Arc;
use thiserror::Error;

/// Result alias used across the typed cache layer
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Errors surfaced by the typed cache and the deduplicated loader
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// Connectivity or backend failure. Never retried by this crate.
    #[error("cache store error: {0:#}")]
    Store(Arc<anyhow::Error>),

    /// Encode/decode failure. Reported even when the store had the key.
    #[error("cache codec error: {0:#}")]
    Codec(Arc<anyhow::Error>),

    /// The caller-supplied loader failed. The original error is kept intact.
    #[error("{0:#}")]
    Loader(Arc<anyhow::Error>),

    /// The in-flight producer panicked or its task was aborted
    #[error("in-flight load for key '{key}' aborted: {reason}")]
    LoadAborted { key: String, reason: String },

    /// Rejected namespace at construction time
    #[error("invalid cache namespace '{0}': must be non-empty and must not start with '__'")]
    InvalidNamespace(String),
}

impl CacheError {
    pub(crate) fn store(err: anyhow::Error) -> Self {
        Self::Store(Arc::new(err))
    }

    pub(crate) fn codec(err: anyhow::Error) -> Self {
        Self::Codec(Arc::new(err))
    }

    pub(crate) fn loader(err: anyhow::Error) -> Self {
        Self::Loader(Arc::new(err))
    }

    /// Whether this error came from the cache path rather than from a loader.
    ///
    /// Cache-path faults are safe to route around by asking the source of
    /// truth directly; loader faults are the source of truth's own errors.
    #[must_use]
    pub fn is_cache_fault(&self) -> bool {
        matches!(self, Self::Store(_) | Self::Codec(_))
    }

    /// The loader's original error, if this is a loader failure
    #[must_use]
    pub fn loader_error(&self) -> Option<&anyhow::Error> {
        match self {
            Self::Loader(err) => Some(err.as_ref()),
            _ => None,
        }
    }

    /// Convert back into an owned `anyhow::Error`.
    ///
    /// A loader error is handed back as the original value when this is the
    /// last reference to it, so `downcast_ref` keeps working for the common
    /// single-caller case.
    #[must_use]
    pub fn into_anyhow(self) -> anyhow::Error {
        match self {
            Self::Loader(err) => {
                Arc::try_unwrap(err).unwrap_or_else(|shared| anyhow::anyhow!("{shared:#}"))
            }
            other => anyhow::Error::new(other),
        }
    }
}
