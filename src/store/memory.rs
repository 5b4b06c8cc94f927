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

use indexmap::IndexMap;

use super::{BackingStore, StoreError};

/// An in-memory [`BackingStore`] substitute, used as the default store in
/// tests and as a ready-to-use backend for embedders who do not need
/// durability across process restarts.
///
/// Insertion order is preserved so that `key_at` produces a stable
/// traversal order across calls, which the eviction engine and vacuum
/// rely on for deterministic tie-breaking.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: IndexMap<String, String>,
    capacity: Option<usize>,
}

impl MemoryStore {
    /// Create an unbounded in-memory store.
    pub fn new() -> Self {
        Self {
            entries: IndexMap::new(),
            capacity: None,
        }
    }

    /// Create an in-memory store that rejects writes once it holds
    /// `capacity` entries and the write would add a new key. Useful for
    /// exercising `StorageFull` / rollback behavior in tests.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: IndexMap::new(),
            capacity: Some(capacity),
        }
    }
}

impl BackingStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn put(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        if let Some(capacity) = self.capacity {
            let is_new = !self.entries.contains_key(key);
            if is_new && self.entries.len() >= capacity {
                return Err(StoreError::Full);
            }
        }
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<(), StoreError> {
        self.entries.shift_remove(key);
        Ok(())
    }

    fn key_at(&self, index: usize) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get_index(index).map(|(k, _)| k.clone()))
    }

    fn len(&self) -> Result<usize, StoreError> {
        Ok(self.entries.len())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        self.entries.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_round_trips() {
        let mut store = MemoryStore::new();
        store.put("a", "1").unwrap();
        assert_eq!(store.get("a").unwrap(), Some("1".to_string()));
    }

    #[test]
    fn delete_removes_entry() {
        let mut store = MemoryStore::new();
        store.put("a", "1").unwrap();
        store.delete("a").unwrap();
        assert_eq!(store.get("a").unwrap(), None);
    }

    #[test]
    fn capacity_rejects_new_keys_but_allows_overwrite() {
        let mut store = MemoryStore::with_capacity(1);
        store.put("a", "1").unwrap();
        store.put("a", "2").unwrap();
        assert!(matches!(store.put("b", "1"), Err(StoreError::Full)));
    }

    #[test]
    fn key_at_preserves_insertion_order() {
        let mut store = MemoryStore::new();
        store.put("a", "1").unwrap();
        store.put("b", "2").unwrap();
        assert_eq!(store.key_at(0).unwrap(), Some("a".to_string()));
        assert_eq!(store.key_at(1).unwrap(), Some("b".to_string()));
    }
}
