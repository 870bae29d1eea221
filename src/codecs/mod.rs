//! Cache Codec Implementations
//!
//! This module provides built-in implementations of the
//! [`CacheCodec`](crate::traits::CacheCodec) trait for different serialization
//! backends, plus [`AnyCodec`] for picking one at
//! runtime from configuration.

use crate::traits::CacheCodec;
use anyhow::{Result, bail};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

mod json;
pub use json::JsonCodec;

#[cfg(feature = "msgpack")]
mod msgpack;
#[cfg(feature = "msgpack")]
#[cfg_attr(docsrs, doc(cfg(feature = "msgpack")))]
pub use msgpack::MsgPackCodec;

#[cfg(feature = "bincode")]
mod bincode;
#[cfg(feature = "bincode")]
#[cfg_attr(docsrs, doc(cfg(feature = "bincode")))]
pub use self::bincode::BincodeCodec;

/// Serializer selection as it appears in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecKind {
    /// Human-readable JSON
    #[default]
    Json,
    /// Compact binary MessagePack (feature `msgpack`)
    MsgPack,
    /// Compact binary bincode (feature `bincode`)
    Bincode,
}

impl FromStr for CodecKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "msgpack" | "messagepack" => Ok(Self::MsgPack),
            "bincode" => Ok(Self::Bincode),
            other => bail!("unknown serializer '{other}' (expected json, msgpack or bincode)"),
        }
    }
}

impl fmt::Display for CodecKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::MsgPack => "msgpack",
            Self::Bincode => "bincode",
        })
    }
}

/// Codec chosen at runtime
///
/// [`CacheCodec`] has generic methods and is therefore not object safe; this
/// enum is the dynamic-dispatch stand-in used when the serializer comes from
/// configuration.
#[derive(Debug, Clone)]
pub enum AnyCodec {
    Json(JsonCodec),
    #[cfg(feature = "msgpack")]
    MsgPack(MsgPackCodec),
    #[cfg(feature = "bincode")]
    Bincode(BincodeCodec),
}

impl AnyCodec {
    /// Build the codec for `kind`
    ///
    /// # Errors
    ///
    /// Returns an error if the requested codec was not compiled in.
    pub fn from_kind(kind: CodecKind) -> Result<Self> {
        match kind {
            CodecKind::Json => Ok(Self::Json(JsonCodec)),
            #[cfg(feature = "msgpack")]
            CodecKind::MsgPack => Ok(Self::MsgPack(MsgPackCodec)),
            #[cfg(feature = "bincode")]
            CodecKind::Bincode => Ok(Self::Bincode(BincodeCodec)),
            #[allow(unreachable_patterns)]
            other => bail!("serializer '{other}' is not enabled in this build"),
        }
    }
}

impl Default for AnyCodec {
    fn default() -> Self {
        Self::Json(JsonCodec)
    }
}

impl CacheCodec for AnyCodec {
    fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        match self {
            Self::Json(codec) => codec.serialize(value),
            #[cfg(feature = "msgpack")]
            Self::MsgPack(codec) => codec.serialize(value),
            #[cfg(feature = "bincode")]
            Self::Bincode(codec) => codec.serialize(value),
        }
    }

    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        match self {
            Self::Json(codec) => codec.deserialize(bytes),
            #[cfg(feature = "msgpack")]
            Self::MsgPack(codec) => codec.deserialize(bytes),
            #[cfg(feature = "bincode")]
            Self::Bincode(codec) => codec.deserialize(bytes),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Json(codec) => codec.name(),
            #[cfg(feature = "msgpack")]
            Self::MsgPack(codec) => codec.name(),
            #[cfg(feature = "bincode")]
            Self::Bincode(codec) => codec.name(),
        }
    }
}
