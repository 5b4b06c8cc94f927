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

//! Splitting and reassembling a byte payload into base64-encoded shards.
//!
//! The chunker does not consult the `BackingStore`; it is pure. `join`
//! pre-allocates its output buffer to the caller-supplied expected size
//! rather than growing it by repeated concatenation (see design decision
//! D3 in `DESIGN.md`).

use base64::Engine as _;

use crate::error::{Error, Result};

/// Split `bytes` into shards of at most `shard_size` octets, base64
/// encoding each shard. The last shard may be shorter than `shard_size`.
/// An empty `bytes` slice yields exactly one (empty) chunk, so that every
/// item -- including one whose value serializes to zero bytes -- still
/// has a well-defined, non-zero chunk count.
pub fn split(bytes: &[u8], shard_size: usize) -> Vec<String> {
    assert!(shard_size > 0, "shard_size must be greater than zero");

    if bytes.is_empty() {
        return vec![base64::engine::general_purpose::STANDARD.encode([])];
    }

    bytes
        .chunks(shard_size)
        .map(|shard| base64::engine::general_purpose::STANDARD.encode(shard))
        .collect()
}

/// Reassemble the output of [`split`]. `expected_size`, when known (the
/// metadata's recorded total byte size), lets the output buffer be
/// allocated once instead of grown chunk by chunk.
pub fn join(chunks: &[String], expected_size: Option<usize>) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(expected_size.unwrap_or(0));
    for chunk in chunks {
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(chunk)
            .map_err(|_| Error::CorruptData)?;
        out.extend_from_slice(&decoded);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_respects_shard_size() {
        let data = vec![0u8; 35];
        let chunks = split(&data, 16);
        assert_eq!(chunks.len(), 3);
    }

    #[test]
    fn split_join_round_trips() {
        let data = b"the quick brown fox jumps over the lazy dog".to_vec();
        let chunks = split(&data, 7);
        let rejoined = join(&chunks, Some(data.len())).unwrap();
        assert_eq!(rejoined, data);
    }

    #[test]
    fn chunk_count_matches_ceil_division() {
        for shard_size in [1usize, 3, 16, 1024] {
            for len in [0usize, 1, 15, 16, 17, 1000] {
                let data = vec![7u8; len];
                let chunks = split(&data, shard_size);
                let expected = if len == 0 {
                    1
                } else {
                    (len + shard_size - 1) / shard_size
                };
                assert_eq!(chunks.len(), expected, "len={len} shard_size={shard_size}");
            }
        }
    }

    #[test]
    fn join_rejects_corrupt_base64() {
        let chunks = vec!["not valid base64!!".to_string()];
        assert!(matches!(join(&chunks, None), Err(Error::CorruptData)));
    }

    #[test]
    fn empty_payload_round_trips() {
        let chunks = split(&[], 16);
        assert_eq!(chunks.len(), 1);
        let rejoined = join(&chunks, Some(0)).unwrap();
        assert!(rejoined.is_empty());
    }
}
