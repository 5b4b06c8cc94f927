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

//! The append-only journal of in-flight and completed mutations.
//!
//! The journal is advisory: it drives rollback and diagnostics, but is
//! never consulted on the common read path. It is a single JSON array at
//! one `BackingStore` key; `append` performs a read-modify-write of that
//! whole array rather than maintaining a separate record per entry.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::keys;
use crate::metadata::ItemMetadata;
use crate::store::BackingStore;
use crate::time::now_ms;

/// One record in the journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JournalRecord {
    SetBegin {
        key: String,
        timestamp: i64,
        metadata: Box<ItemMetadata>,
    },
    SetEnd {
        key: String,
        timestamp: i64,
    },
    SetRollback {
        key: String,
        timestamp: i64,
    },
    RemoveBegin {
        key: String,
        timestamp: i64,
    },
    RemoveEnd {
        key: String,
        timestamp: i64,
    },
    RemoveRollback {
        key: String,
        timestamp: i64,
    },
}

impl JournalRecord {
    /// The fully-qualified user key this record concerns.
    pub fn key(&self) -> &str {
        match self {
            JournalRecord::SetBegin { key, .. }
            | JournalRecord::SetEnd { key, .. }
            | JournalRecord::SetRollback { key, .. }
            | JournalRecord::RemoveBegin { key, .. }
            | JournalRecord::RemoveEnd { key, .. }
            | JournalRecord::RemoveRollback { key, .. } => key,
        }
    }

    pub fn set_begin(key: impl Into<String>, metadata: ItemMetadata) -> Self {
        JournalRecord::SetBegin {
            key: key.into(),
            timestamp: now_ms(),
            metadata: Box::new(metadata),
        }
    }

    pub fn set_end(key: impl Into<String>) -> Self {
        JournalRecord::SetEnd {
            key: key.into(),
            timestamp: now_ms(),
        }
    }

    pub fn set_rollback(key: impl Into<String>) -> Self {
        JournalRecord::SetRollback {
            key: key.into(),
            timestamp: now_ms(),
        }
    }

    pub fn remove_begin(key: impl Into<String>) -> Self {
        JournalRecord::RemoveBegin {
            key: key.into(),
            timestamp: now_ms(),
        }
    }

    pub fn remove_end(key: impl Into<String>) -> Self {
        JournalRecord::RemoveEnd {
            key: key.into(),
            timestamp: now_ms(),
        }
    }

    pub fn remove_rollback(key: impl Into<String>) -> Self {
        JournalRecord::RemoveRollback {
            key: key.into(),
            timestamp: now_ms(),
        }
    }
}

/// The append-only journal for one namespace.
pub struct Journal<'a, S: BackingStore> {
    store: &'a mut S,
    key: String,
}

impl<'a, S: BackingStore> Journal<'a, S> {
    pub fn new(store: &'a mut S, prefix: &str, namespace: &str) -> Self {
        Journal {
            store,
            key: keys::journal(prefix, namespace),
        }
    }

    /// Append `record` to the journal.
    pub fn append(&mut self, record: JournalRecord) -> Result<()> {
        let mut records = self.read_all()?;
        records.push(record);
        let serialized = serde_json::to_string(&records).map_err(|err| Error::Store(err.into()))?;
        self.store.put(&self.key, &serialized)?;
        Ok(())
    }

    /// Read every record currently in the journal, in append order.
    pub fn read_all(&self) -> Result<Vec<JournalRecord>> {
        match self.store.get(&self.key)? {
            Some(raw) => Ok(serde_json::from_str(&raw).unwrap_or_default()),
            None => Ok(Vec::new()),
        }
    }

    /// Discard every record in the journal.
    pub fn clear(&mut self) -> Result<()> {
        self.store.delete(&self.key)?;
        Ok(())
    }
}
