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

//! The opaque, reversible compression stage of the codec pipeline.
//!
//! A small trait with a real LZ4-backed implementation gated behind a
//! Cargo feature, and an identity fallback so the pipeline keeps working
//! with the feature off.

use std::io::{Read, Write};

use crate::error::{Error, Result};

/// A reversible byte-string codec applied after serialization and before
/// encryption. The identity codec (no compression) is used when
/// compression is disabled for an item.
pub trait Compression: Send + Sync {
    /// Compress `data`, returning the compressed bytes.
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Reverse [`Compression::compress`] exactly.
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// The identity compression codec, used when compression is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCompression;

impl Compression for NoopCompression {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }
}

/// An LZ4-backed [`Compression`] implementation.
#[cfg(feature = "compression")]
#[derive(Debug, Default, Clone, Copy)]
pub struct Lz4Compression;

#[cfg(feature = "compression")]
impl Compression for Lz4Compression {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = lz4::EncoderBuilder::new()
            .build(Vec::new())
            .map_err(|err| Error::Store(err.into()))?;
        encoder
            .write_all(data)
            .map_err(|err| Error::Store(err.into()))?;
        let (buffer, result) = encoder.finish();
        result.map_err(|err| Error::Store(err.into()))?;
        Ok(buffer)
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = lz4::Decoder::new(data).map_err(|err| Error::Store(err.into()))?;
        let mut buffer = Vec::new();
        decoder
            .read_to_end(&mut buffer)
            .map_err(|_| Error::CorruptData)?;
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_round_trips() {
        let codec = NoopCompression;
        let data = b"hello world".to_vec();
        let compressed = codec.compress(&data).unwrap();
        assert_eq!(codec.decompress(&compressed).unwrap(), data);
    }

    #[cfg(feature = "compression")]
    #[test]
    fn lz4_round_trips() {
        let codec = Lz4Compression;
        let data = b"hello world, hello world, hello world".to_vec();
        let compressed = codec.compress(&data).unwrap();
        assert_eq!(codec.decompress(&compressed).unwrap(), data);
    }
}
