//! Serializers
//!
//! Turn application keys and values into the bytes stored in the log.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{DawnError, Result};

/// Encode/decode pair used by an engine instance
///
/// Keys are only ever encoded: two keys are the same key exactly when
/// `key_for` returns the same bytes.
pub trait Serializer<K, V>: Send + Sync {
    /// Bytes identifying `key`
    fn key_for(&self, key: &K) -> Result<Vec<u8>>;

    /// Encode a value
    fn dump(&self, value: &V) -> Result<Vec<u8>>;

    /// Decode a value previously produced by `dump`
    fn load(&self, bytes: &[u8]) -> Result<V>;
}

/// serde + bincode, the default for typed engines
#[derive(Debug, Clone, Copy, Default)]
pub struct Bincode;

impl<K, V> Serializer<K, V> for Bincode
where
    K: Serialize,
    V: Serialize + DeserializeOwned,
{
    fn key_for(&self, key: &K) -> Result<Vec<u8>> {
        bincode::serialize(key).map_err(|e| DawnError::Serialization(e.to_string()))
    }

    fn dump(&self, value: &V) -> Result<Vec<u8>> {
        bincode::serialize(value).map_err(|e| DawnError::Serialization(e.to_string()))
    }

    fn load(&self, bytes: &[u8]) -> Result<V> {
        bincode::deserialize(bytes).map_err(|e| DawnError::Serialization(e.to_string()))
    }
}

/// Keys and values stored as-is
#[derive(Debug, Clone, Copy, Default)]
pub struct Raw;

impl<K> Serializer<K, Vec<u8>> for Raw
where
    K: AsRef<[u8]>,
{
    fn key_for(&self, key: &K) -> Result<Vec<u8>> {
        Ok(key.as_ref().to_vec())
    }

    fn dump(&self, value: &Vec<u8>) -> Result<Vec<u8>> {
        Ok(value.clone())
    }

    fn load(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }
}
