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

//! Quota estimation and victim selection for the LRU/LFU eviction policies.
//!
//! The eviction engine itself does not talk to the `BackingStore` or
//! perform removal -- that requires the full remove pipeline (index
//! cleanup, journaling, broadcast), which only the engine facade can
//! orchestrate. This module is the pure policy: given a namespace's
//! current estimated size and a set of metadata candidates, decide
//! whether eviction should continue and which candidate is the victim.

use crate::config::{EvictionPolicy, MAX_EVICTIONS_PER_CALL};
use crate::metadata::ItemMetadata;

/// Sum of `key.len() + value.len()` over every entry under a namespace's
/// prefix, the estimated namespace byte size used to compare against the
/// soft quota.
pub fn estimate_namespace_size<'a>(entries: impl Iterator<Item = (&'a str, &'a str)>) -> u64 {
    entries
        .map(|(key, value)| (key.len() + value.len()) as u64)
        .sum()
}

/// Select the victim among `candidates` (in store traversal order) under
/// `policy`. Ties are broken by the first candidate encountered, i.e. the
/// earliest entry in `candidates`.
pub fn select_victim<'a>(
    policy: EvictionPolicy,
    candidates: &'a [(String, ItemMetadata)],
) -> Option<&'a str> {
    let mut best: Option<(&str, i64)> = None;
    for (key, metadata) in candidates {
        let rank = match policy {
            EvictionPolicy::Lru => metadata.lru,
            EvictionPolicy::Lfu => metadata.lfu as i64,
        };
        match best {
            None => best = Some((key, rank)),
            Some((_, best_rank)) if rank < best_rank => best = Some((key, rank)),
            _ => {}
        }
    }
    best.map(|(key, _)| key)
}

/// The engine runs eviction iterations until the namespace is back under
/// quota or this many victims have been removed in a single
/// `maybe_evict` call, whichever comes first (a safety cap against
/// pathological configurations where no write can ever bring the
/// namespace under quota).
pub fn max_iterations() -> usize {
    MAX_EVICTIONS_PER_CALL
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata_with(lru: i64, lfu: u64) -> ItemMetadata {
        let mut metadata = ItemMetadata::new(None, false, false, 1, 10, 1);
        metadata.lru = lru;
        metadata.lfu = lfu;
        metadata
    }

    #[test]
    fn lru_selects_oldest_access() {
        let candidates = vec![
            ("a".to_string(), metadata_with(100, 0)),
            ("b".to_string(), metadata_with(50, 0)),
            ("c".to_string(), metadata_with(200, 0)),
        ];
        assert_eq!(select_victim(EvictionPolicy::Lru, &candidates), Some("b"));
    }

    #[test]
    fn lfu_selects_smallest_count() {
        let candidates = vec![
            ("a".to_string(), metadata_with(0, 5)),
            ("b".to_string(), metadata_with(0, 1)),
            ("c".to_string(), metadata_with(0, 3)),
        ];
        assert_eq!(select_victim(EvictionPolicy::Lfu, &candidates), Some("b"));
    }

    #[test]
    fn ties_break_to_first_encountered() {
        let candidates = vec![
            ("a".to_string(), metadata_with(10, 0)),
            ("b".to_string(), metadata_with(10, 0)),
        ];
        assert_eq!(select_victim(EvictionPolicy::Lru, &candidates), Some("a"));
    }

    #[test]
    fn empty_candidates_selects_nothing() {
        assert_eq!(select_victim(EvictionPolicy::Lru, &[]), None);
    }

    #[test]
    fn namespace_size_sums_key_and_value_lengths() {
        let entries = vec![("ab", "cd"), ("x", "yz")];
        assert_eq!(estimate_namespace_size(entries.into_iter()), 7);
    }
}
