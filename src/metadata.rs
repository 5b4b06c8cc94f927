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

//! The metadata registry: per-item structured records and the invariants
//! around them.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::keys;
use crate::store::BackingStore;
use crate::time::now_ms;

/// The per-item metadata record.
///
/// Stored as a single JSON value at a deterministically-constructed key.
/// `compressed`/`encrypted` are set once, at write time, and never
/// mutated afterward -- they determine the exact reverse codec pipeline
/// on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemMetadata {
    pub created_at: i64,
    pub updated_at: i64,
    pub ttl: Option<u64>,
    pub expires_at: Option<i64>,
    pub compressed: bool,
    pub encrypted: bool,
    pub chunk_count: u32,
    pub size: usize,
    pub lru: i64,
    pub lfu: u64,
    pub index_keys: Vec<String>,
    pub schema_version: u32,
}

impl ItemMetadata {
    /// Construct a freshly-written item's metadata. `ttl`, if given, is
    /// resolved into an absolute `expires_at` relative to `now`.
    pub fn new(
        ttl: Option<u64>,
        compressed: bool,
        encrypted: bool,
        chunk_count: u32,
        size: usize,
        schema_version: u32,
    ) -> Self {
        let now = now_ms();
        let expires_at = ttl.map(|ttl| now + ttl as i64);
        ItemMetadata {
            created_at: now,
            updated_at: now,
            ttl,
            expires_at,
            compressed,
            encrypted,
            chunk_count,
            size,
            lru: now,
            lfu: 0,
            index_keys: Vec::new(),
            schema_version,
        }
    }

    /// Whether this item has expired as of `now`.
    pub fn is_expired_at(&self, now: i64) -> bool {
        matches!(self.expires_at, Some(expires_at) if expires_at < now)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_ms())
    }
}

/// The marker entry whose presence defines an item's existence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub chunks: u32,
    #[serde(rename = "metaRef")]
    pub meta_ref: String,
}

/// Reads and writes [`ItemMetadata`] and [`Marker`] records for one
/// namespace. Borrows the `BackingStore` for the duration of each call.
pub struct MetadataRegistry<'a, S: BackingStore> {
    store: &'a mut S,
    prefix: String,
    namespace: String,
}

impl<'a, S: BackingStore> MetadataRegistry<'a, S> {
    pub fn new(store: &'a mut S, prefix: impl Into<String>, namespace: impl Into<String>) -> Self {
        MetadataRegistry {
            store,
            prefix: prefix.into(),
            namespace: namespace.into(),
        }
    }

    fn metadata_key(&self, user_key: &str) -> String {
        keys::metadata(&self.prefix, &self.namespace, user_key)
    }

    fn marker_key(&self, user_key: &str) -> String {
        keys::marker(&self.prefix, &self.namespace, user_key)
    }

    /// Read the metadata record for `user_key`, or `None` if absent or
    /// malformed (malformed metadata is treated as absent; the caller is
    /// responsible for deciding whether that constitutes corruption).
    pub fn read(&self, user_key: &str) -> Result<Option<ItemMetadata>> {
        let raw = self.store.get(&self.metadata_key(user_key))?;
        match raw {
            Some(raw) => Ok(serde_json::from_str(&raw).ok()),
            None => Ok(None),
        }
    }

    /// Write the metadata record for `user_key`.
    pub fn write(&mut self, user_key: &str, metadata: &ItemMetadata) -> Result<()> {
        let serialized = serde_json::to_string(metadata).map_err(|err| Error::Store(err.into()))?;
        self.store.put(&self.metadata_key(user_key), &serialized)?;
        Ok(())
    }

    /// Delete the metadata record for `user_key`. Not an error if absent.
    pub fn delete(&mut self, user_key: &str) -> Result<()> {
        self.store.delete(&self.metadata_key(user_key))?;
        Ok(())
    }

    /// Read the marker for `user_key`.
    pub fn read_marker(&self, user_key: &str) -> Result<Option<Marker>> {
        let raw = self.store.get(&self.marker_key(user_key))?;
        match raw {
            Some(raw) => Ok(serde_json::from_str(&raw).ok()),
            None => Ok(None),
        }
    }

    /// Write the marker for `user_key`. The marker's presence is what
    /// defines "item exists"; it must be written last, after chunks and
    /// metadata.
    pub fn write_marker(&mut self, user_key: &str, marker: &Marker) -> Result<()> {
        let serialized = serde_json::to_string(marker).map_err(|err| Error::Store(err.into()))?;
        self.store.put(&self.marker_key(user_key), &serialized)?;
        Ok(())
    }

    /// Delete the marker for `user_key`. Not an error if absent.
    pub fn delete_marker(&mut self, user_key: &str) -> Result<()> {
        self.store.delete(&self.marker_key(user_key))?;
        Ok(())
    }

    /// Update `user_key`'s LRU timestamp to now and increment its LFU
    /// counter, persisting the change. Called at the end of every
    /// successful `get`.
    pub fn touch(&mut self, user_key: &str) -> Result<()> {
        if let Some(mut metadata) = self.read(user_key)? {
            metadata.lru = now_ms();
            metadata.lfu = metadata.lfu.saturating_add(1);
            self.write(user_key, &metadata)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn write_read_round_trips() {
        let mut store = MemoryStore::new();
        let mut registry = MetadataRegistry::new(&mut store, "__lsm__", "default");
        let metadata = ItemMetadata::new(None, false, false, 1, 10, 1);
        registry.write("a", &metadata).unwrap();
        assert_eq!(registry.read("a").unwrap(), Some(metadata));
    }

    #[test]
    fn touch_updates_lru_and_lfu() {
        let mut store = MemoryStore::new();
        let mut registry = MetadataRegistry::new(&mut store, "__lsm__", "default");
        let metadata = ItemMetadata::new(None, false, false, 1, 10, 1);
        registry.write("a", &metadata).unwrap();
        registry.touch("a").unwrap();
        let touched = registry.read("a").unwrap().unwrap();
        assert_eq!(touched.lfu, 1);
        assert!(touched.lru >= metadata.lru);
    }

    #[test]
    fn expiry_check() {
        let mut metadata = ItemMetadata::new(Some(10), false, false, 1, 10, 1);
        assert!(!metadata.is_expired_at(metadata.created_at));
        metadata.expires_at = Some(metadata.created_at - 1);
        assert!(metadata.is_expired_at(metadata.created_at));
    }

    #[test]
    fn marker_round_trips() {
        let mut store = MemoryStore::new();
        let mut registry = MetadataRegistry::new(&mut store, "__lsm__", "default");
        let marker = Marker {
            chunks: 3,
            meta_ref: "a".to_string(),
        };
        registry.write_marker("a", &marker).unwrap();
        assert_eq!(registry.read_marker("a").unwrap(), Some(marker));
        registry.delete_marker("a").unwrap();
        assert_eq!(registry.read_marker("a").unwrap(), None);
    }
}
