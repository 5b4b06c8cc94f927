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

//! Periodic removal of expired items.
//!
//! Like [`crate::eviction`], this module is the pure policy: which
//! metadata records are expired as of a given instant. The engine facade
//! performs the scan and the actual removal (which goes through the full
//! remove pipeline), and schedules this on an interval or invokes it on
//! demand.

use crate::metadata::ItemMetadata;

/// Return the user keys, among `candidates`, whose metadata has expired
/// as of `now`.
pub fn find_expired<'a>(
    candidates: impl Iterator<Item = &'a (String, ItemMetadata)>,
    now: i64,
) -> Vec<String> {
    candidates
        .filter(|(_, metadata)| metadata.is_expired_at(now))
        .map(|(key, _)| key.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_only_expired_items() {
        let mut fresh = ItemMetadata::new(Some(10_000), false, false, 1, 1, 1);
        let mut expired = ItemMetadata::new(Some(10), false, false, 1, 1, 1);
        expired.expires_at = Some(fresh.created_at - 1);
        fresh.expires_at = Some(fresh.created_at + 10_000);

        let candidates = vec![
            ("fresh".to_string(), fresh.clone()),
            ("expired".to_string(), expired.clone()),
        ];
        let found = find_expired(candidates.iter(), fresh.created_at);
        assert_eq!(found, vec!["expired".to_string()]);
    }

    #[test]
    fn items_without_ttl_never_expire() {
        let no_ttl = ItemMetadata::new(None, false, false, 1, 1, 1);
        let candidates = vec![("a".to_string(), no_ttl.clone())];
        assert!(find_expired(candidates.iter(), no_ttl.created_at + 1_000_000).is_empty());
    }
}
