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

//! Namespace-level configuration: a single `serde`-(de)serializable
//! struct with a `Default` impl that matches the defaults named in the
//! engine's external interface.

use serde::{Deserialize, Serialize};

/// The default `BackingStore` key prefix under which all namespaces live.
pub const DEFAULT_PREFIX: &str = "__lsm__";

/// The default namespace name.
pub const DEFAULT_NAMESPACE: &str = "default";

/// The default chunk shard size, in bytes (128 KiB).
pub const DEFAULT_SHARD_SIZE: usize = 131_072;

/// The default interval, in milliseconds, between automatic vacuum runs.
pub const DEFAULT_VACUUM_INTERVAL_MS: u64 = 60_000;

/// The default soft quota, in bytes (4 MiB).
pub const DEFAULT_QUOTA_SOFT_LIMIT: u64 = 4 * 1024 * 1024;

/// The default hard quota, in bytes (8 MiB).
pub const DEFAULT_QUOTA_HARD_LIMIT: u64 = 8 * 1024 * 1024;

/// The default schema version new items are written with.
pub const DEFAULT_SCHEMA_VERSION: u32 = 1;

/// The lease duration of the namespace lock, in milliseconds.
pub const LOCK_LEASE_MS: i64 = 2_000;

/// The default number of lock acquisition attempts.
pub const DEFAULT_LOCK_ATTEMPTS: u32 = 8;

/// The default number of lock acquisition attempts made by `transaction`,
/// more aggressive than an ordinary mutator since a transaction's whole
/// body depends on holding the lock.
pub const TRANSACTION_LOCK_ATTEMPTS: u32 = 24;

/// The upper bound on eviction candidates removed by a single
/// `maybe_evict` call.
pub const MAX_EVICTIONS_PER_CALL: usize = 1000;

/// The base delay, in milliseconds, between namespace lock acquisition
/// retries, before the configured jitter is added.
pub const BASE_LOCK_DELAY_MS: u64 = 10;

/// Which metadata field an eviction policy ranks candidates by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum EvictionPolicy {
    /// Evict the item with the oldest last-access timestamp.
    #[default]
    Lru,
    /// Evict the item with the smallest access counter.
    Lfu,
}

/// Namespace-level configuration for an [`crate::Engine`].
///
/// Every field has a default matching the engine's documented external
/// interface; callers typically start from [`EngineConfig::default`] and
/// override only what they need.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// The namespace this engine instance operates on.
    pub namespace: String,
    /// The `BackingStore` key prefix shared by all namespaces.
    pub prefix: String,
    /// Whether values are compressed by default.
    pub compress: bool,
    /// Whether values are encrypted by default.
    pub encrypt: bool,
    /// The chunk shard size, in bytes.
    pub shard_size: usize,
    /// The interval between automatic vacuum runs, in milliseconds. Zero
    /// disables the background vacuum thread.
    pub vacuum_interval_ms: u64,
    /// The eviction policy used by the eviction engine.
    pub eviction_policy: EvictionPolicy,
    /// The soft byte-size quota at which eviction begins.
    pub quota_soft_limit: u64,
    /// The hard byte-size quota. Reserved for callers that want to record
    /// a ceiling above `quota_soft_limit`; the engine itself only acts on
    /// `quota_soft_limit` when deciding whether to run eviction.
    pub quota_hard_limit: u64,
    /// The schema version new items are written with.
    pub schema_version: u32,
    /// Whether mutations are journaled. Disabling this disables rollback
    /// and is only intended for throwaway/test instances.
    pub journaling: bool,
    /// Whether successful mutations are broadcast to other contexts.
    pub broadcast: bool,
    /// Whether operation counters are tracked.
    pub metrics: bool,
    /// Whether verbose diagnostic logging is emitted.
    pub diagnostics: bool,
    /// Whether the engine auto-initializes (key material, vacuum
    /// scheduling) on construction rather than requiring an explicit
    /// `init` call.
    pub auto_init: bool,
    /// Whether a background thread runs vacuum on `vacuum_interval_ms`.
    /// Has no effect if `vacuum_interval_ms` is zero.
    pub background_vacuum: bool,
    /// The `[min, max]` jitter, in milliseconds, added to each lock
    /// acquisition retry's base delay.
    pub lock_jitter_ms: (u64, u64),
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            namespace: DEFAULT_NAMESPACE.to_string(),
            prefix: DEFAULT_PREFIX.to_string(),
            compress: false,
            encrypt: false,
            shard_size: DEFAULT_SHARD_SIZE,
            vacuum_interval_ms: DEFAULT_VACUUM_INTERVAL_MS,
            eviction_policy: EvictionPolicy::default(),
            quota_soft_limit: DEFAULT_QUOTA_SOFT_LIMIT,
            quota_hard_limit: DEFAULT_QUOTA_HARD_LIMIT,
            schema_version: DEFAULT_SCHEMA_VERSION,
            journaling: true,
            broadcast: true,
            metrics: true,
            diagnostics: false,
            auto_init: true,
            background_vacuum: true,
            lock_jitter_ms: (0, 25),
        }
    }
}

/// Per-call overrides for [`crate::Engine::set`], each defaulting to the
/// namespace configuration when omitted.
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    /// Milliseconds until the item expires, or `None` for no TTL.
    pub ttl: Option<u64>,
    /// Overrides [`EngineConfig::compress`] for this call.
    pub compress: Option<bool>,
    /// Overrides [`EngineConfig::encrypt`] for this call.
    pub encrypt: Option<bool>,
    /// Secondary indexes to maintain for this item.
    pub indexes: Vec<IndexSpec>,
}

/// One secondary index this item should be indexed under.
#[derive(Debug, Clone)]
pub struct IndexSpec {
    /// The index name (a `BackingStore` record is maintained per name).
    pub name: String,
    /// The field of the value to index on.
    pub field: String,
}

impl IndexSpec {
    /// Construct an [`IndexSpec`] from its name and field.
    pub fn new(name: impl Into<String>, field: impl Into<String>) -> Self {
        IndexSpec {
            name: name.into(),
            field: field.into(),
        }
    }
}
