//! Pluggable value serialization strategies.
//!
//! The engine never interprets payload bytes itself: values and record
//! metadata are encoded and decoded through a [`Serializer`] supplied by the
//! caller, and both share the same strategy. Any implementation must satisfy
//! the round-trip law `from_bytes(to_bytes(v)) == v` for values it produced.

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encoding strategy used for both values and record metadata.
pub trait Serializer {
    /// Encode a value into bytes.
    fn to_bytes<T: Serialize>(&self, value: &T) -> Result<Vec<u8>>;

    /// Decode a value from bytes produced by [`Serializer::to_bytes`].
    fn from_bytes<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T>;
}

/// JSON encoding via `serde_json`. The default strategy.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn to_bytes<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn from_bytes<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Compact binary encoding via `bincode`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeSerializer;

impl Serializer for BincodeSerializer {
    fn to_bytes<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        Ok(bincode::serialize(value)?)
    }

    fn from_bytes<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        Ok(bincode::deserialize(bytes)?)
    }
}
