//! Pluggable binary record codec: a binary format self-describing enough
//! to round-trip each record type. This crate's `Store` implementations
//! use `bincode` as the core record codec.

use super::error::StoreError;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Encode a record to its binary representation.
///
/// # Errors
///
/// Returns [`StoreError::Decode`] if the value cannot be serialized (this
/// only happens for pathological `Serialize` impls; in practice it never
/// fails for the record types defined in this crate).
pub fn encode_to_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    bincode::serde::encode_to_vec(value, bincode::config::standard()).map_err(|e| {
        StoreError::Decode {
            message: e.to_string(),
        }
    })
}

/// Decode a record from its binary representation.
///
/// # Errors
///
/// Returns [`StoreError::Decode`] if `bytes` is malformed or does not match
/// the shape of `T`.
pub fn decode_bytes<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map(|(value, _)| value)
        .map_err(|e| StoreError::Decode {
            message: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        a: u64,
        b: String,
    }

    #[test]
    fn roundtrip() {
        let sample = Sample {
            a: 42,
            b: "hello".to_string(),
        };
        let bytes = encode_to_bytes(&sample).expect("encode");
        let decoded: Sample = decode_bytes(&bytes).expect("decode");
        assert_eq!(sample, decoded);
    }

    #[test]
    fn decode_garbage_errors() {
        let result: Result<Sample, _> = decode_bytes(b"\x00\x01\xff\xff");
        assert!(result.is_err());
    }
}
