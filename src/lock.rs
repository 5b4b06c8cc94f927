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

//! The lease-based, cooperative, per-namespace cross-context lock.
//!
//! This lock is explicitly best-effort: the check-then-write race against
//! other contexts sharing the same `BackingStore` is not solvable without
//! a compare-and-swap primitive, which the `BackingStore` contract does
//! not provide. A real in-process `RwLock` would close the race for
//! callers sharing one process, but the race this lock actually has to
//! live with is the cross-context one, which has no such solution and is
//! documented rather than worked around.

use std::thread;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::keys;
use crate::store::BackingStore;
use crate::time::now_ms;

/// The persisted lock record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockRecord {
    pub owner_id: String,
    pub expires_at: i64,
}

impl LockRecord {
    pub fn is_stale(&self, now: i64) -> bool {
        self.expires_at < now
    }
}

/// A handle on the namespace lock, scoped to one owner identity.
pub struct NamespaceLock<'a, S: BackingStore> {
    store: &'a mut S,
    key: String,
    owner_id: String,
    lease_ms: i64,
    jitter_ms: (u64, u64),
}

impl<'a, S: BackingStore> NamespaceLock<'a, S> {
    pub fn new(
        store: &'a mut S,
        prefix: &str,
        namespace: &str,
        owner_id: impl Into<String>,
        lease_ms: i64,
        jitter_ms: (u64, u64),
    ) -> Self {
        NamespaceLock {
            store,
            key: keys::lock(prefix, namespace),
            owner_id: owner_id.into(),
            lease_ms,
            jitter_ms,
        }
    }

    fn read(&self) -> Result<Option<LockRecord>> {
        match self.store.get(&self.key)? {
            Some(raw) => Ok(serde_json::from_str(&raw).ok()),
            None => Ok(None),
        }
    }

    fn write(&mut self, record: &LockRecord) -> Result<()> {
        let serialized = serde_json::to_string(record)
            .map_err(|err| crate::error::Error::Store(err.into()))?;
        self.store.put(&self.key, &serialized)?;
        Ok(())
    }

    /// Attempt to acquire the lock, retrying up to `attempts` times with
    /// `base_delay` between tries (lightly jittered). Returns `true` if
    /// the lock was acquired, `false` if every attempt failed. Never
    /// returns an error: operations proceed even when the lock could not
    /// be acquired, since the lock reduces but does not eliminate
    /// contention.
    pub fn acquire(&mut self, attempts: u32, base_delay: Duration) -> Result<bool> {
        for attempt in 0..attempts {
            let now = now_ms();
            let existing = self.read()?;

            // Re-entrant: this owner already holds an unexpired lease, e.g.
            // an eviction pass re-acquiring inside a `set` it was invoked
            // from. Renew the lease and return immediately rather than
            // treating it as contended.
            if let Some(record) = &existing {
                if record.owner_id == self.owner_id && !record.is_stale(now) {
                    let renewed = LockRecord {
                        owner_id: self.owner_id.clone(),
                        expires_at: now + self.lease_ms,
                    };
                    self.write(&renewed)?;
                    return Ok(true);
                }
            }

            let available = match &existing {
                None => true,
                Some(record) => record.is_stale(now),
            };

            if available {
                let record = LockRecord {
                    owner_id: self.owner_id.clone(),
                    expires_at: now + self.lease_ms,
                };
                self.write(&record)?;

                // Re-read to detect a concurrent writer that raced us
                // between the availability check and our write.
                if let Some(reread) = self.read()? {
                    if reread.owner_id == self.owner_id {
                        return Ok(true);
                    }
                }
            }

            if attempt + 1 < attempts {
                thread::sleep(self.delay_for_attempt(base_delay));
            }
        }
        Ok(false)
    }

    fn delay_for_attempt(&self, base_delay: Duration) -> Duration {
        let (min_jitter, max_jitter) = self.jitter_ms;
        let jitter = if max_jitter > min_jitter {
            rand::thread_rng().gen_range(min_jitter..max_jitter)
        } else {
            min_jitter
        };
        base_delay + Duration::from_millis(jitter)
    }

    /// Release the lock, but only if it still belongs to this owner.
    /// Releasing a lock owned by someone else (e.g. because our lease
    /// already expired and another context took over) is a no-op.
    pub fn release(&mut self) -> Result<()> {
        if let Some(record) = self.read()? {
            if record.owner_id == self.owner_id {
                self.store.delete(&self.key)?;
            }
        }
        Ok(())
    }
}
