/*
 * Copyright 2024 lsm-store contributors
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! The codec pipeline: serialize -> compress -> encrypt, and its exact
//! reverse. The pipeline operates on raw bytes throughout; base64 text
//! encoding happens one stage downstream, in the chunker, which is the
//! only stage that must produce `BackingStore`-compatible strings.

pub mod compression;
pub mod encryption;

use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};
use compression::Compression;
use encryption::{Aead, EncryptionKey};

#[cfg(feature = "compression")]
use compression::Lz4Compression;
#[cfg(feature = "encryption")]
use encryption::ChaCha20Poly1305Aead;

/// Flags resolved for one `set`/`get` call, recorded verbatim into the
/// item's metadata and never mutated afterward.
#[derive(Debug, Clone, Copy, Default)]
pub struct CodecFlags {
    pub compress: bool,
    pub encrypt: bool,
}

/// The codec pipeline used by the engine facade. Owns the compression and
/// AEAD implementations selected at construction time (by the
/// `compression`/`encryption` Cargo features); the in-memory encryption
/// key, if any, is supplied per call since it is namespace state owned by
/// the caller.
pub struct Codec {
    compression: Box<dyn Compression>,
    aead: Box<dyn Aead>,
    degraded_confidentiality: bool,
}

impl Codec {
    /// Construct the default codec: real compression/AEAD when their
    /// Cargo features are enabled, falling back to the identity codec and
    /// the degenerate stream cipher otherwise.
    pub fn new() -> Self {
        #[cfg(feature = "compression")]
        let compression: Box<dyn Compression> = Box::new(Lz4Compression);
        #[cfg(not(feature = "compression"))]
        let compression: Box<dyn Compression> = Box::new(NoopCompression);

        #[cfg(feature = "encryption")]
        let (aead, degraded): (Box<dyn Aead>, bool) = (Box::new(ChaCha20Poly1305Aead), false);
        #[cfg(not(feature = "encryption"))]
        let (aead, degraded): (Box<dyn Aead>, bool) =
            (Box::new(encryption::DegenerateStreamCipher), true);

        Codec {
            compression,
            aead,
            degraded_confidentiality: degraded,
        }
    }

    /// Whether this codec's AEAD is the degenerate fallback rather than
    /// real authenticated encryption.
    pub fn is_confidentiality_degraded(&self) -> bool {
        self.degraded_confidentiality
    }

    /// The key length, in bytes, the configured AEAD implementation
    /// requires.
    pub fn key_size(&self) -> usize {
        self.aead.key_size()
    }

    /// `JSON-stringify -> compress -> encrypt`, returning the raw encoded
    /// byte payload the chunker will split.
    pub fn encode<T: Serialize>(
        &self,
        value: &T,
        flags: CodecFlags,
        key: Option<&EncryptionKey>,
    ) -> Result<Vec<u8>> {
        let json = serde_json::to_vec(value).map_err(|err| Error::Store(err.into()))?;
        self.encode_bytes(&json, flags, key)
    }

    /// Reverse [`Codec::encode`] exactly, according to the `compressed`
    /// and `encrypted` flags recorded in the item's metadata, then parse
    /// the result as JSON. A payload that does not parse as JSON (data
    /// written by something other than this engine) degrades to a plain
    /// JSON string of its raw bytes rather than failing the read.
    pub fn decode(
        &self,
        payload: &[u8],
        flags: CodecFlags,
        key: Option<&EncryptionKey>,
    ) -> Result<Value> {
        let raw = self.decode_bytes(payload, flags, key)?;
        match serde_json::from_slice(&raw) {
            Ok(value) => Ok(value),
            Err(_) => Ok(Value::String(String::from_utf8_lossy(&raw).into_owned())),
        }
    }

    /// Compress then encrypt already-serialized bytes.
    pub fn encode_bytes(
        &self,
        bytes: &[u8],
        flags: CodecFlags,
        key: Option<&EncryptionKey>,
    ) -> Result<Vec<u8>> {
        let compressed = if flags.compress {
            self.compression.compress(bytes)?
        } else {
            bytes.to_vec()
        };

        if flags.encrypt {
            let key = key.ok_or(Error::CryptoFail)?;
            self.aead.seal(&compressed, key)
        } else {
            Ok(compressed)
        }
    }

    /// Reverse [`Codec::encode_bytes`] exactly.
    pub fn decode_bytes(
        &self,
        payload: &[u8],
        flags: CodecFlags,
        key: Option<&EncryptionKey>,
    ) -> Result<Vec<u8>> {
        let decrypted = if flags.encrypt {
            let key = key.ok_or(Error::CryptoFail)?;
            self.aead.open(payload, key)?
        } else {
            payload.to_vec()
        };

        if flags.compress {
            self.compression.decompress(&decrypted)
        } else {
            Ok(decrypted)
        }
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_plain() {
        let codec = Codec::new();
        let value = json!({"n": 1});
        let encoded = codec
            .encode(&value, CodecFlags::default(), None)
            .unwrap();
        let decoded = codec
            .decode(&encoded, CodecFlags::default(), None)
            .unwrap();
        assert_eq!(decoded, value);
    }

    #[cfg(feature = "compression")]
    #[test]
    fn round_trips_compressed() {
        let codec = Codec::new();
        let flags = CodecFlags {
            compress: true,
            encrypt: false,
        };
        let value = json!({"text": "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"});
        let encoded = codec.encode(&value, flags, None).unwrap();
        let decoded = codec.decode(&encoded, flags, None).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn round_trips_encrypted() {
        let codec = Codec::new();
        let flags = CodecFlags {
            compress: false,
            encrypt: true,
        };
        let key = EncryptionKey::generate(codec.key_size());
        let value = json!({"secret": true});
        let encoded = codec.encode(&value, flags, Some(&key)).unwrap();
        let decoded = codec.decode(&encoded, flags, Some(&key)).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn encrypt_without_key_fails() {
        let codec = Codec::new();
        let flags = CodecFlags {
            compress: false,
            encrypt: true,
        };
        let value = json!({"secret": true});
        assert!(matches!(
            codec.encode(&value, flags, None),
            Err(Error::CryptoFail)
        ));
    }
}
