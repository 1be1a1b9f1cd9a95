//! bcs helpers shared across the workspace.

use serde::{de::DeserializeOwned, Serialize};

/// Serialize a value to bcs bytes.
///
/// Panics only when a type cannot be represented in bcs at all, which is a
/// programmer error for the workspace's own types.
pub fn encode<T: Serialize>(value: &T) -> Vec<u8> {
    bcs::to_bytes(value).expect("bcs serialization of workspace types")
}

/// Deserialize a value from bcs bytes, panicking on malformed input. For
/// bytes produced by [encode] in-process; wire input goes through
/// [try_decode].
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> T {
    bcs::from_bytes(bytes).expect("bcs deserialization of workspace types")
}

/// Deserialize a value from untrusted bytes.
pub fn try_decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, bcs::Error> {
    bcs::from_bytes(bytes)
}
