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

//! The `BackingStore` adapter: a uniform, synchronous interface over the
//! host's string-keyed storage (or an in-memory substitute for tests).
//!
//! The adapter performs no interpretation of keys or values; everything
//! about namespacing, chunking, and encoding is layered on top by the
//! engine facade.

mod memory;

#[cfg(feature = "store-sqlite")]
mod sqlite;

pub use memory::MemoryStore;

#[cfg(feature = "store-sqlite")]
pub use sqlite::SqliteStore;

/// An error returned by a [`BackingStore`] operation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store rejected a write because it has reached its capacity.
    #[error("the backing store is full")]
    Full,

    /// Any other failure. The underlying fault is preserved unchanged.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A synchronous, string-keyed, bounded storage provider.
///
/// Implementers supply either the host-native store or an in-memory
/// substitute for tests. `put` fails with [`StoreError::Full`] when the
/// write is rejected for quota reasons; any other failure is surfaced
/// unchanged via [`StoreError::Other`].
pub trait BackingStore {
    /// Read the value stored at `key`, or `None` if it does not exist.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write `value` at `key`, creating or overwriting it.
    fn put(&mut self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove the value at `key`. It is not an error for `key` to be
    /// absent.
    fn delete(&mut self, key: &str) -> Result<(), StoreError>;

    /// Return the key at `index` in the store's iteration order, or
    /// `None` if `index` is out of bounds.
    fn key_at(&self, index: usize) -> Result<Option<String>, StoreError>;

    /// The number of entries currently in the store.
    fn len(&self) -> Result<usize, StoreError>;

    /// Whether the store currently holds no entries.
    fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    /// Remove every entry from the store.
    fn clear(&mut self) -> Result<(), StoreError>;

    /// Return every key currently in the store whose name starts with
    /// `prefix`. The default implementation scans via `key_at`/`len`,
    /// which is adequate for the small, prefix-scoped scans the engine
    /// performs (vacuum, export, eviction sizing); backends with a native
    /// prefix scan should override this.
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut out = Vec::new();
        let total = self.len()?;
        for i in 0..total {
            if let Some(key) = self.key_at(i)? {
                if key.starts_with(prefix) {
                    out.push(key);
                }
            }
        }
        Ok(out)
    }
}
