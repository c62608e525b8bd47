//! Value codec: MessagePack with optional deflate compression.
//!
//! ## Wire format
//!
//! ```text
//! +------+---------------------------+
//! | tag  | payload                   |
//! +------+---------------------------+
//!   0x00   raw MessagePack
//!   0x01   deflate(MessagePack)
//! ```
//!
//! The leading tag makes every stored value self-describing, so decoding never
//! depends on the current threshold or on sniffing magic numbers.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{CacheError, CacheResult};

/// Payloads strictly larger than this (in bytes of MessagePack) are compressed.
pub const DEFAULT_COMPRESSION_THRESHOLD: usize = 64;

const TAG_RAW: u8 = 0x00;
const TAG_DEFLATE: u8 = 0x01;

/// Serializes values to tagged, optionally compressed MessagePack.
#[derive(Debug, Clone, Copy)]
pub struct Codec {
    compression_threshold: usize,
}

impl Default for Codec {
    fn default() -> Self {
        Self::new(DEFAULT_COMPRESSION_THRESHOLD)
    }
}

impl Codec {
    pub fn new(compression_threshold: usize) -> Self {
        Self {
            compression_threshold,
        }
    }

    pub fn compression_threshold(&self) -> usize {
        self.compression_threshold
    }

    /// Serialize `value`, compressing when the encoded size exceeds the threshold.
    ///
    /// The compressed form is kept only when it is actually smaller.
    pub fn marshal<T: Serialize + ?Sized>(&self, value: &T) -> CacheResult<Vec<u8>> {
        let encoded = rmp_serde::to_vec_named(value)
            .map_err(|e| CacheError::codec(format!("msgpack encode failed: {e}")))?;

        if encoded.len() > self.compression_threshold {
            let compressed = deflate(&encoded)?;
            if compressed.len() < encoded.len() {
                return Ok(tagged(TAG_DEFLATE, &compressed));
            }
        }

        Ok(tagged(TAG_RAW, &encoded))
    }

    /// Reverse [`Codec::marshal`].
    pub fn unmarshal<T: DeserializeOwned>(&self, bytes: &[u8]) -> CacheResult<T> {
        let (tag, payload) = bytes
            .split_first()
            .ok_or_else(|| CacheError::codec("empty payload"))?;

        match *tag {
            TAG_RAW => decode(payload),
            TAG_DEFLATE => decode(&inflate(payload)?),
            other => Err(CacheError::codec(format!("unknown payload tag 0x{other:02x}"))),
        }
    }
}

fn tagged(tag: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 1);
    out.push(tag);
    out.extend_from_slice(payload);
    out
}

fn decode<T: DeserializeOwned>(payload: &[u8]) -> CacheResult<T> {
    rmp_serde::from_slice(payload)
        .map_err(|e| CacheError::codec(format!("msgpack decode failed: {e}")))
}

fn deflate(input: &[u8]) -> CacheResult<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::with_capacity(input.len()), Compression::fast());
    encoder
        .write_all(input)
        .map_err(|e| CacheError::codec(format!("compression failed: {e}")))?;
    encoder
        .finish()
        .map_err(|e| CacheError::codec(format!("compression failed: {e}")))
}

fn inflate(input: &[u8]) -> CacheResult<Vec<u8>> {
    let mut out = Vec::with_capacity(input.len() * 2);
    DeflateDecoder::new(input)
        .read_to_end(&mut out)
        .map_err(|e| CacheError::codec(format!("decompression failed: {e}")))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::collections::HashMap;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Abc {
        x: String,
        y: i64,
        z: String,
    }

    fn small() -> Abc {
        Abc {
            x: "hello".to_string(),
            y: 123,
            z: String::new(),
        }
    }

    fn large() -> Abc {
        Abc {
            x: "hello".to_string(),
            y: 123,
            z: "1234567890".repeat(6),
        }
    }

    #[test]
    fn test_small_value_is_stored_raw() {
        let codec = Codec::default();
        let bytes = codec.marshal(&small()).unwrap();

        assert_eq!(bytes[0], TAG_RAW);
        // Untagged payload is plain MessagePack
        let direct: Abc = rmp_serde::from_slice(&bytes[1..]).unwrap();
        assert_eq!(direct, small());
        assert_eq!(codec.unmarshal::<Abc>(&bytes).unwrap(), small());
    }

    #[test]
    fn test_large_value_is_compressed() {
        let codec = Codec::default();
        let bytes = codec.marshal(&large()).unwrap();

        assert_eq!(bytes[0], TAG_DEFLATE);
        // Compressed payload is not readable as MessagePack
        assert!(rmp_serde::from_slice::<Abc>(&bytes[1..]).is_err());
        assert_eq!(codec.unmarshal::<Abc>(&bytes).unwrap(), large());
    }

    #[test]
    fn test_decoding_ignores_current_threshold() {
        let compressed = Codec::new(8).marshal(&large()).unwrap();
        let raw = Codec::new(usize::MAX).marshal(&large()).unwrap();

        let codec = Codec::default();
        assert_eq!(codec.unmarshal::<Abc>(&compressed).unwrap(), large());
        assert_eq!(codec.unmarshal::<Abc>(&raw).unwrap(), large());
    }

    #[test]
    fn test_composite_map_round_trip() {
        let codec = Codec::default();
        let mut secrets = HashMap::new();
        for i in 0..10 {
            secrets.insert(format!("c2VjcmV0LXZhbHVlLW51bWJlci0{i}"), i % 2 == 0);
        }

        let bytes = codec.marshal(&secrets).unwrap();
        let decoded: HashMap<String, bool> = codec.unmarshal(&bytes).unwrap();
        assert_eq!(decoded, secrets);
    }

    #[test]
    fn test_invalid_payloads_fail() {
        let codec = Codec::default();
        assert!(matches!(
            codec.unmarshal::<Abc>(&[]),
            Err(CacheError::Codec { .. })
        ));
        assert!(matches!(
            codec.unmarshal::<Abc>(&[0x7f, 0x01]),
            Err(CacheError::Codec { .. })
        ));
        assert!(codec.unmarshal::<Abc>(&[TAG_DEFLATE, 0xff, 0xff]).is_err());
    }
}
