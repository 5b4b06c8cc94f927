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

//! The engine facade: orchestrates every component module into
//! `set`/`get`/`remove`/`transaction`/`export`/`import`/`migrate`.
//!
//! Every field is a plain value or an `Arc`-backed handle, so cloning an
//! `Engine` shares the same underlying `BackingStore` rather than copying
//! it -- that sharing is what lets the background vacuum thread hold its
//! own handle onto the same state as the caller's.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::broadcast::{BroadcastBridge, BroadcastMessage, ChannelBroadcast, Subscription};
use crate::chunk;
use crate::codec::encryption::EncryptionKey;
use crate::codec::{Codec, CodecFlags};
use crate::config::{
    EngineConfig, IndexSpec, SetOptions, BASE_LOCK_DELAY_MS, DEFAULT_LOCK_ATTEMPTS, LOCK_LEASE_MS,
    TRANSACTION_LOCK_ATTEMPTS,
};
use crate::error::{Error, Result};
use crate::events::{Emitter, Event};
use crate::eviction;
use crate::index::{decode_index_key, encode_index_key, stringify_field_value, IndexRegistry};
use crate::journal::{Journal, JournalRecord};
use crate::keys;
use crate::lock::NamespaceLock;
use crate::metadata::{ItemMetadata, Marker, MetadataRegistry};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::snapshot::Snapshot;
use crate::store::BackingStore;
use crate::time::now_ms;
use crate::vacuum;

/// A schema migration adapter: given an item's current metadata
/// and decoded value, produce its replacement value.
pub trait SchemaAdapter: Send + Sync {
    fn up(&self, metadata: &ItemMetadata, value: Value) -> Result<Value>;
}

/// The outcome of [`Engine::migrate`]. An item whose adapter call failed
/// is recorded in `skipped` rather than aborting the run; items migrated
/// before the failure are not rolled back.
#[derive(Debug, Clone, Default)]
pub struct MigrationReport {
    pub migrated: usize,
    pub skipped: Vec<(String, String)>,
}

/// The durable, namespaced, chunked key-value engine.
pub struct Engine<S: BackingStore> {
    store: Arc<Mutex<S>>,
    config: EngineConfig,
    codec: Arc<Codec>,
    metrics: Arc<Metrics>,
    emitter: Emitter,
    broadcast: Arc<dyn BroadcastBridge>,
    origin_id: String,
    encryption_key: Option<EncryptionKey>,
    destroyed: Arc<AtomicBool>,
    vacuum_stop: Arc<AtomicBool>,
    vacuum_handle: Arc<Mutex<Option<thread::JoinHandle<()>>>>,
}

impl<S: BackingStore> Clone for Engine<S> {
    fn clone(&self) -> Self {
        Engine {
            store: self.store.clone(),
            config: self.config.clone(),
            codec: self.codec.clone(),
            metrics: self.metrics.clone(),
            emitter: self.emitter.clone(),
            broadcast: self.broadcast.clone(),
            origin_id: self.origin_id.clone(),
            encryption_key: self.encryption_key.clone(),
            destroyed: self.destroyed.clone(),
            vacuum_stop: self.vacuum_stop.clone(),
            vacuum_handle: self.vacuum_handle.clone(),
        }
    }
}

impl<S: BackingStore + Send + 'static> Engine<S> {
    /// Construct an engine over `store` with `config`. Since this API is
    /// synchronous (design decision D1 in `DESIGN.md`), construction does
    /// not return until initialization -- loading or generating the
    /// namespace's encryption key, scheduling the background vacuum
    /// thread -- has completed; there is no separate `ready()` to await.
    pub fn new(store: S, config: EngineConfig) -> Result<Self> {
        Self::with_broadcast(store, config, Arc::new(ChannelBroadcast::new()))
    }

    /// As [`Engine::new`], but with an explicit broadcast bridge instead
    /// of the default in-process [`ChannelBroadcast`] -- the seam a
    /// caller wanting cross-process delivery plugs a real transport into.
    pub fn with_broadcast(
        store: S,
        config: EngineConfig,
        broadcast: Arc<dyn BroadcastBridge>,
    ) -> Result<Self> {
        let codec = Codec::new();
        let degraded = codec.is_confidentiality_degraded();

        let mut engine = Engine {
            store: Arc::new(Mutex::new(store)),
            config,
            codec: Arc::new(codec),
            metrics: Arc::new(Metrics::new()),
            emitter: Emitter::new(),
            broadcast,
            origin_id: Uuid::new_v4().to_string(),
            encryption_key: None,
            destroyed: Arc::new(AtomicBool::new(false)),
            vacuum_stop: Arc::new(AtomicBool::new(false)),
            vacuum_handle: Arc::new(Mutex::new(None)),
        };

        if engine.config.auto_init {
            engine.init()?;
        }

        if degraded && engine.config.metrics {
            engine.metrics.record_degraded_confidentiality();
        }

        Ok(engine)
    }

    /// Run initialization: load or generate the namespace's encryption
    /// key if `config.encrypt`, and schedule the background vacuum
    /// thread if configured. A no-op for whichever part already ran
    /// during construction; safe to call more than once.
    pub fn init(&mut self) -> Result<()> {
        if self.config.encrypt && self.encryption_key.is_none() {
            let key_size = self.codec.key_size();
            let key_entry_key = keys::encryption_key(&self.config.prefix, &self.config.namespace);
            let mut guard = self.store.lock().unwrap();
            let existing = guard.get(&key_entry_key)?;
            let key = match existing {
                Some(encoded) => EncryptionKey::from_base64(&encoded)?,
                None => {
                    let generated = EncryptionKey::generate(key_size);
                    guard.put(&key_entry_key, &generated.to_base64())?;
                    generated
                }
            };
            self.encryption_key = Some(key);
        }

        let should_spawn_vacuum = self.config.background_vacuum
            && self.config.vacuum_interval_ms > 0
            && cfg!(feature = "background-vacuum")
            && self.vacuum_handle.lock().unwrap().is_none();
        if should_spawn_vacuum {
            self.spawn_vacuum_thread();
        }

        Ok(())
    }

    fn spawn_vacuum_thread(&self) {
        let engine = self.clone();
        let stop = self.vacuum_stop.clone();
        let interval = Duration::from_millis(self.config.vacuum_interval_ms);
        let handle = thread::spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                thread::sleep(interval);
                if stop.load(Ordering::Relaxed) || engine.destroyed.load(Ordering::Relaxed) {
                    break;
                }
                if let Err(err) = engine.vacuum() {
                    log::error!("background vacuum pass failed: {err}");
                }
            }
        });
        *self.vacuum_handle.lock().unwrap() = Some(handle);
    }

    /// Stop accepting mutations and join the background vacuum thread, if
    /// any. Every mutating call made after `destroy` fails with
    /// [`Error::InstanceDestroyed`]; reads do too, since a destroyed
    /// instance's view of the store is no longer considered authoritative.
    pub fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
        self.vacuum_stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.vacuum_handle.lock().unwrap().take() {
            let _ = handle.join();
        }
    }

    fn ensure_not_destroyed(&self) -> Result<()> {
        if self.destroyed.load(Ordering::SeqCst) {
            Err(Error::InstanceDestroyed)
        } else {
            Ok(())
        }
    }

    /// Register a local event handler.
    pub fn on(&self, handler: impl Fn(&Event) + Send + Sync + 'static) {
        self.emitter.on(handler);
    }

    /// A point-in-time snapshot of this engine's operation counters.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Subscribe to this engine's broadcast bridge, receiving messages
    /// published by other `Engine` instances (other contexts) sharing
    /// the same `BackingStore`. The synchronous API has no background
    /// poller for remote events the way it does for vacuum; a caller
    /// drains the returned [`Subscription`] on its own cadence and
    /// translates each message with [`Event::from_remote`].
    pub fn subscribe_remote(&self) -> Subscription {
        self.broadcast.subscribe(self.origin_id.clone())
    }

    /// Query a secondary index maintained by prior `set` calls.
    pub fn query_index(&self, index_name: &str, field_value: &str) -> Result<Vec<String>> {
        self.ensure_not_destroyed()?;
        let mut guard = self.store.lock().unwrap();
        let index = IndexRegistry::new(&mut *guard, &self.config.prefix, &self.config.namespace);
        index.query(index_name, field_value)
    }

    /// Every field value with at least one bucket in `index_name`.
    pub fn list_index(&self, index_name: &str) -> Result<Vec<String>> {
        self.ensure_not_destroyed()?;
        let mut guard = self.store.lock().unwrap();
        let index = IndexRegistry::new(&mut *guard, &self.config.prefix, &self.config.namespace);
        index.list(index_name)
    }

    /// Whether `user_key` currently has a marker in this namespace. Does
    /// not check expiry or read the metadata/chunks; a key whose item has
    /// expired but has not yet been vacuumed still reports `true` here
    /// (`get` is what treats it as absent).
    pub fn has(&self, user_key: &str) -> Result<bool> {
        self.ensure_not_destroyed()?;
        let mut guard = self.store.lock().unwrap();
        let registry = MetadataRegistry::new(&mut *guard, &self.config.prefix, &self.config.namespace);
        Ok(registry.read_marker(user_key)?.is_some())
    }

    /// Every user key with a metadata record in this namespace, in store
    /// traversal order.
    pub fn list_keys(&self) -> Result<Vec<String>> {
        self.ensure_not_destroyed()?;
        let mut guard = self.store.lock().unwrap();
        let candidates = self.metadata_candidates(&mut guard)?;
        Ok(candidates.into_iter().map(|(key, _)| key).collect())
    }

    // -- set ----------------------------------------------------------

    /// Store `value` under `user_key`. Any failure after the
    /// first chunk is written and before the mutation is journaled as
    /// complete rolls back every chunk, metadata, and marker write
    /// already made for this key before the error is returned.
    pub fn set<T: Serialize>(
        &self,
        user_key: &str,
        value: &T,
        options: SetOptions,
    ) -> Result<bool> {
        self.ensure_not_destroyed()?;
        let value_json = serde_json::to_value(value).map_err(|err| Error::Store(err.into()))?;

        let metadata = {
            let mut guard = self.store.lock().unwrap();
            self.set_locked(&mut guard, user_key, &value_json, &options)?
        };

        if self.config.metrics {
            self.metrics.record_write();
        }
        self.emitter.emit(Event::Set {
            key: user_key.to_string(),
            metadata,
        });
        Ok(true)
    }

    fn set_locked(
        &self,
        store: &mut S,
        user_key: &str,
        value_json: &Value,
        options: &SetOptions,
    ) -> Result<ItemMetadata> {
        let compress = options.compress.unwrap_or(self.config.compress);
        let encrypt = options.encrypt.unwrap_or(self.config.encrypt);
        let flags = CodecFlags { compress, encrypt };

        let encoded = self
            .codec
            .encode(value_json, flags, self.encryption_key.as_ref())?;
        let chunks = chunk::split(&encoded, self.config.shard_size);
        let chunk_count = chunks.len() as u32;
        let mut metadata = ItemMetadata::new(
            options.ttl,
            compress,
            encrypt,
            chunk_count,
            encoded.len(),
            self.config.schema_version,
        );

        self.journal_append(store, JournalRecord::set_begin(user_key, metadata.clone()))?;
        self.acquire_namespace_lock(store, DEFAULT_LOCK_ATTEMPTS)?;

        let body = self.write_item_body(
            store,
            user_key,
            &chunks,
            &mut metadata,
            &options.indexes,
            value_json,
        );

        match body {
            Ok(()) => {
                self.journal_append(store, JournalRecord::set_end(user_key))?;
                self.maybe_evict(store)?;
                self.release_namespace_lock(store)?;
                Ok(metadata)
            }
            Err(err) => {
                self.rollback_set(store, user_key, chunk_count);
                self.journal_append(store, JournalRecord::set_rollback(user_key))?;
                if self.config.metrics {
                    self.metrics.record_rollback();
                }
                let _ = self.release_namespace_lock(store);
                Err(err)
            }
        }
    }

    fn write_item_body(
        &self,
        store: &mut S,
        user_key: &str,
        chunks: &[String],
        metadata: &mut ItemMetadata,
        indexes: &[IndexSpec],
        value_json: &Value,
    ) -> Result<()> {
        for (i, shard) in chunks.iter().enumerate() {
            let shard_key = keys::chunk(&self.config.prefix, &self.config.namespace, user_key, i as u32);
            store.put(&shard_key, shard)?;
        }

        {
            let mut registry =
                MetadataRegistry::new(store, &self.config.prefix, &self.config.namespace);
            registry.write(user_key, metadata)?;
            registry.write_marker(
                user_key,
                &Marker {
                    chunks: metadata.chunk_count,
                    meta_ref: user_key.to_string(),
                },
            )?;
        }

        for spec in indexes {
            let field_value = match value_json.get(&spec.field) {
                Some(value) if !value.is_null() => value,
                _ => continue,
            };
            let field_str = stringify_field_value(field_value);
            {
                let mut index =
                    IndexRegistry::new(store, &self.config.prefix, &self.config.namespace);
                index.ensure(&spec.name, &field_str, user_key)?;
            }
            let index_key = encode_index_key(&spec.name, &field_str);
            if !metadata.index_keys.iter().any(|k| k == &index_key) {
                metadata.index_keys.push(index_key);
            }
        }

        {
            let mut registry =
                MetadataRegistry::new(store, &self.config.prefix, &self.config.namespace);
            registry.write(user_key, metadata)?;
        }

        let message = BroadcastMessage::set(user_key, metadata.clone(), self.origin_id.clone());
        self.publish_broadcast(message);

        Ok(())
    }

    fn rollback_set(&self, store: &mut S, user_key: &str, chunk_count: u32) {
        for i in 0..chunk_count {
            let shard_key = keys::chunk(&self.config.prefix, &self.config.namespace, user_key, i);
            let _ = store.delete(&shard_key);
        }
        let mut registry = MetadataRegistry::new(store, &self.config.prefix, &self.config.namespace);
        let _ = registry.delete(user_key);
        let _ = registry.delete_marker(user_key);
        log::warn!("rolled back set for key {user_key:?}");
    }

    // -- get ------------------------------------------------------------

    /// Read the value stored at `user_key`, deserialized as `T`, or
    /// `default` if absent, expired, or corrupt. Expired items
    /// are removed as a side effect. Reads never acquire the namespace
    /// lock.
    pub fn get<T: DeserializeOwned>(&self, user_key: &str, default: T) -> Result<T> {
        match self.get_value(user_key)? {
            Some(value) => Ok(serde_json::from_value(value).unwrap_or(default)),
            None => Ok(default),
        }
    }

    /// As [`Engine::get`], returning the raw decoded [`Value`] rather
    /// than deserializing into a caller type, or `None` under the same
    /// conditions `get` would return its default.
    pub fn get_value(&self, user_key: &str) -> Result<Option<Value>> {
        self.ensure_not_destroyed()?;

        let outcome = {
            let mut guard = self.store.lock().unwrap();
            self.get_locked(&mut guard, user_key)?
        };

        if let Some(value) = &outcome {
            if self.config.metrics {
                self.metrics.record_read();
            }
            self.emitter.emit(Event::Get {
                key: user_key.to_string(),
                value: value.clone(),
            });
        }

        Ok(outcome)
    }

    fn get_locked(&self, store: &mut S, user_key: &str) -> Result<Option<Value>> {
        let marker = {
            let registry = MetadataRegistry::new(store, &self.config.prefix, &self.config.namespace);
            registry.read_marker(user_key)?
        };
        if marker.is_none() {
            return Ok(None);
        }

        let metadata = {
            let registry = MetadataRegistry::new(store, &self.config.prefix, &self.config.namespace);
            registry.read(user_key)?
        };
        let metadata = match metadata {
            Some(metadata) => metadata,
            None => {
                if self.config.metrics {
                    self.metrics.record_corruption();
                }
                return Ok(None);
            }
        };

        if metadata.is_expired() {
            self.remove_locked(store, user_key)?;
            return Ok(None);
        }

        let mut shards = Vec::with_capacity(metadata.chunk_count as usize);
        for i in 0..metadata.chunk_count {
            let shard_key = keys::chunk(&self.config.prefix, &self.config.namespace, user_key, i);
            match store.get(&shard_key)? {
                Some(shard) => shards.push(shard),
                None => {
                    if self.config.metrics {
                        self.metrics.record_corruption();
                    }
                    log::warn!("missing chunk {i} for key {user_key:?}");
                    return Ok(None);
                }
            }
        }

        let raw = match chunk::join(&shards, Some(metadata.size)) {
            Ok(raw) => raw,
            Err(_) => {
                if self.config.metrics {
                    self.metrics.record_corruption();
                }
                return Ok(None);
            }
        };

        let flags = CodecFlags {
            compress: metadata.compressed,
            encrypt: metadata.encrypted,
        };
        let value = match self.codec.decode(&raw, flags, self.encryption_key.as_ref()) {
            Ok(value) => value,
            Err(Error::CryptoFail) => return Err(Error::CryptoFail),
            Err(_) => {
                if self.config.metrics {
                    self.metrics.record_corruption();
                }
                return Ok(None);
            }
        };

        {
            let mut registry =
                MetadataRegistry::new(store, &self.config.prefix, &self.config.namespace);
            registry.touch(user_key)?;
        }

        Ok(Some(value))
    }

    // -- remove -----------------------------------------------------

    /// Remove the item stored at `user_key`, returning whether it
    /// existed.
    pub fn remove(&self, user_key: &str) -> Result<bool> {
        self.ensure_not_destroyed()?;
        let removed = {
            let mut guard = self.store.lock().unwrap();
            self.remove_locked(&mut guard, user_key)?
        };
        if removed {
            if self.config.metrics {
                self.metrics.record_remove();
            }
            self.emitter.emit(Event::Remove {
                key: user_key.to_string(),
            });
        }
        Ok(removed)
    }

    fn remove_locked(&self, store: &mut S, user_key: &str) -> Result<bool> {
        let metadata = {
            let registry = MetadataRegistry::new(store, &self.config.prefix, &self.config.namespace);
            registry.read(user_key)?
        };
        let metadata = match metadata {
            Some(metadata) => metadata,
            None => {
                let mut registry =
                    MetadataRegistry::new(store, &self.config.prefix, &self.config.namespace);
                registry.delete_marker(user_key)?;
                return Ok(false);
            }
        };

        self.journal_append(store, JournalRecord::remove_begin(user_key))?;
        self.acquire_namespace_lock(store, DEFAULT_LOCK_ATTEMPTS)?;

        let result = self.delete_item_storage(store, user_key, &metadata).map(|()| {
            self.publish_broadcast(BroadcastMessage::remove(user_key, self.origin_id.clone()));
        });

        match result {
            Ok(()) => {
                self.journal_append(store, JournalRecord::remove_end(user_key))?;
                self.release_namespace_lock(store)?;
                Ok(true)
            }
            Err(err) => {
                self.journal_append(store, JournalRecord::remove_rollback(user_key))?;
                if self.config.metrics {
                    self.metrics.record_rollback();
                }
                let _ = self.release_namespace_lock(store);
                Err(err)
            }
        }
    }

    /// Delete an item's chunks, metadata, marker, and index entries.
    /// Shared by the per-item `remove` pipeline (which also broadcasts a
    /// `REMOVE`) and `clear_namespace` (which broadcasts once for the
    /// whole namespace instead of once per item).
    fn delete_item_storage(&self, store: &mut S, user_key: &str, metadata: &ItemMetadata) -> Result<()> {
        for i in 0..metadata.chunk_count {
            let shard_key = keys::chunk(&self.config.prefix, &self.config.namespace, user_key, i);
            store.delete(&shard_key)?;
        }

        {
            let mut registry =
                MetadataRegistry::new(store, &self.config.prefix, &self.config.namespace);
            registry.delete(user_key)?;
            registry.delete_marker(user_key)?;
        }

        for index_key in &metadata.index_keys {
            let (name, field_value) = decode_index_key(index_key)?;
            let mut index = IndexRegistry::new(store, &self.config.prefix, &self.config.namespace);
            index.remove(&name, &field_value, user_key)?;
        }

        Ok(())
    }

    /// Remove every item in this namespace in one pass, broadcasting a
    /// single `CLEAR` message rather than one `REMOVE` per item. Returns
    /// the number of items removed.
    pub fn clear_namespace(&self) -> Result<usize> {
        self.ensure_not_destroyed()?;

        let count = {
            let mut guard = self.store.lock().unwrap();
            self.acquire_namespace_lock(&mut guard, DEFAULT_LOCK_ATTEMPTS)?;
            let candidates = self.metadata_candidates(&mut guard)?;
            for (user_key, metadata) in &candidates {
                self.delete_item_storage(&mut guard, user_key, metadata)?;
            }
            if self.config.journaling {
                let mut journal = Journal::new(&mut *guard, &self.config.prefix, &self.config.namespace);
                journal.clear()?;
            }
            self.release_namespace_lock(&mut guard)?;
            candidates.len()
        };

        self.publish_broadcast(BroadcastMessage::clear(self.origin_id.clone()));
        self.emitter.emit(Event::Clear);
        Ok(count)
    }

    // -- eviction & vacuum --------------------------------------------

    fn maybe_evict(&self, store: &mut S) -> Result<()> {
        let mut iterations = 0;
        while iterations < eviction::max_iterations() {
            let size = self.namespace_size(store)?;
            if size <= self.config.quota_soft_limit {
                break;
            }
            let candidates = self.metadata_candidates(store)?;
            let victim = eviction::select_victim(self.config.eviction_policy, &candidates)
                .map(|key| key.to_string());
            let Some(victim) = victim else {
                break;
            };
            self.remove_locked(store, &victim)?;
            if self.config.metrics {
                self.metrics.record_eviction();
            }
            iterations += 1;
        }
        Ok(())
    }

    fn namespace_size(&self, store: &mut S) -> Result<u64> {
        let prefix = keys::namespace_prefix(&self.config.prefix, &self.config.namespace);
        let namespace_keys = store.keys_with_prefix(&prefix)?;
        let mut entries = Vec::with_capacity(namespace_keys.len());
        for key in &namespace_keys {
            if let Some(value) = store.get(key)? {
                entries.push((key.as_str(), value));
            }
        }
        Ok(eviction::estimate_namespace_size(
            entries.iter().map(|(k, v)| (*k, v.as_str())),
        ))
    }

    fn metadata_candidates(&self, store: &mut S) -> Result<Vec<(String, ItemMetadata)>> {
        let meta_prefix = format!("{}:{}:__meta__:", self.config.prefix, self.config.namespace);
        let meta_keys = store.keys_with_prefix(&meta_prefix)?;
        let mut out = Vec::with_capacity(meta_keys.len());
        for key in meta_keys {
            if let Some(raw) = store.get(&key)? {
                if let Ok(metadata) = serde_json::from_str::<ItemMetadata>(&raw) {
                    out.push((key[meta_prefix.len()..].to_string(), metadata));
                }
            }
        }
        Ok(out)
    }

    /// Remove every expired item in this namespace. Returns the number
    /// removed. Invoked on `vacuum_interval_ms` by the background thread
    /// (when `background-vacuum` is enabled and configured), and may also
    /// be called directly.
    pub fn vacuum(&self) -> Result<usize> {
        self.ensure_not_destroyed()?;
        let mut guard = self.store.lock().unwrap();
        let candidates = self.metadata_candidates(&mut guard)?;
        let expired = vacuum::find_expired(candidates.iter(), now_ms());
        for user_key in &expired {
            self.remove_locked(&mut guard, user_key)?;
        }
        if self.config.metrics {
            self.metrics.record_vacuum();
        }
        Ok(expired.len())
    }

    // -- locking helpers ------------------------------------------------

    fn acquire_namespace_lock(&self, store: &mut S, attempts: u32) -> Result<bool> {
        let mut lock = NamespaceLock::new(
            store,
            &self.config.prefix,
            &self.config.namespace,
            self.origin_id.clone(),
            LOCK_LEASE_MS,
            self.config.lock_jitter_ms,
        );
        let locked = lock.acquire(attempts, Duration::from_millis(BASE_LOCK_DELAY_MS))?;
        if !locked {
            if self.config.metrics {
                self.metrics.record_lock_failure();
            }
            log::warn!("could not acquire namespace lock after {attempts} attempts");
        }
        Ok(locked)
    }

    fn release_namespace_lock(&self, store: &mut S) -> Result<()> {
        let mut lock = NamespaceLock::new(
            store,
            &self.config.prefix,
            &self.config.namespace,
            self.origin_id.clone(),
            LOCK_LEASE_MS,
            self.config.lock_jitter_ms,
        );
        lock.release()
    }

    fn journal_append(&self, store: &mut S, record: JournalRecord) -> Result<()> {
        if !self.config.journaling {
            return Ok(());
        }
        let mut journal = Journal::new(store, &self.config.prefix, &self.config.namespace);
        journal.append(record)
    }

    /// Publish `message` if broadcasting is enabled. Delivery is
    /// best-effort: a publish failure is logged and the broadcast metric
    /// is skipped, but it never aborts the mutation that triggered it,
    /// matching how a handler panic in `Emitter::emit` is swallowed.
    fn publish_broadcast(&self, message: BroadcastMessage) {
        if !self.config.broadcast {
            return;
        }
        match self.broadcast.publish(message) {
            Ok(()) => {
                if self.config.metrics {
                    self.metrics.record_broadcast();
                }
            }
            Err(err) => log::warn!("broadcast publish failed: {err}"),
        }
    }

    // -- transactions -----------------------------------------------

    /// Run `f` with a [`Transaction`] handle under an aggressively
    /// acquired namespace lock. If `f` returns `Err`, every key
    /// this transaction's `set` calls wrote -- found by scanning the
    /// journal for `SET_BEGIN` records appended since the transaction
    /// started -- is removed. Per design decision D4, this is a naive
    /// floor: it removes what the transaction introduced, it does not
    /// restore a key's prior value.
    pub fn transaction<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction<'_, S>) -> Result<R>,
    {
        self.ensure_not_destroyed()?;

        let journal_len_before = {
            let mut guard = self.store.lock().unwrap();
            let journal = Journal::new(&mut *guard, &self.config.prefix, &self.config.namespace);
            journal.read_all()?.len()
        };

        {
            let mut guard = self.store.lock().unwrap();
            self.acquire_namespace_lock(&mut guard, TRANSACTION_LOCK_ATTEMPTS)?;
        }

        if self.config.metrics {
            self.metrics.record_transaction();
        }

        let tx = Transaction { engine: self };
        let result = f(&tx);

        let mut guard = self.store.lock().unwrap();
        match result {
            Ok(value) => {
                self.release_namespace_lock(&mut guard)?;
                Ok(value)
            }
            Err(err) => {
                let records = {
                    let journal =
                        Journal::new(&mut *guard, &self.config.prefix, &self.config.namespace);
                    journal.read_all()?
                };
                let new_records = &records[journal_len_before.min(records.len())..];
                let mut keys_to_remove: Vec<String> = Vec::new();
                for record in new_records.iter().rev() {
                    if let JournalRecord::SetBegin { key, .. } = record {
                        if !keys_to_remove.iter().any(|k| *k == *key) {
                            keys_to_remove.push(key.clone());
                        }
                    }
                }
                for key in &keys_to_remove {
                    let _ = self.remove_locked(&mut guard, key);
                }
                if self.config.metrics {
                    self.metrics.record_rollback();
                }
                let _ = self.release_namespace_lock(&mut guard);
                Err(err)
            }
        }
    }

    // -- export / import ----------------------------------------------

    /// Export every raw entry under this namespace. When
    /// `include_indexes` is false, `__index__:` records are omitted.
    pub fn export(&self, include_indexes: bool) -> Result<Snapshot> {
        self.ensure_not_destroyed()?;
        let guard = self.store.lock().unwrap();
        let prefix = keys::namespace_prefix(&self.config.prefix, &self.config.namespace);
        let index_prefix = keys::index(&self.config.prefix, &self.config.namespace, "");
        let all_keys = guard.keys_with_prefix(&prefix)?;

        let mut data = HashMap::with_capacity(all_keys.len());
        for key in all_keys {
            if !include_indexes && key.starts_with(&index_prefix) {
                continue;
            }
            if let Some(value) = guard.get(&key)? {
                data.insert(key, value);
            }
        }

        Ok(Snapshot {
            namespace: self.config.namespace.clone(),
            prefix: self.config.prefix.clone(),
            schema_version: self.config.schema_version,
            include_indexes,
            data,
            exported_at: now_ms(),
        })
    }

    /// Import a [`Snapshot`] previously produced by `export`.
    /// Existing keys are left untouched unless `overwrite` is set.
    /// Broadcasts a single `IMPORT` message on success. Returns
    /// `(written, skipped)`.
    pub fn import(&self, snapshot: &Snapshot, overwrite: bool) -> Result<(usize, usize)> {
        self.ensure_not_destroyed()?;

        let (written, skipped) = {
            let mut guard = self.store.lock().unwrap();
            self.acquire_namespace_lock(&mut guard, DEFAULT_LOCK_ATTEMPTS)?;

            let mut written = 0;
            let mut skipped = 0;
            for (key, value) in &snapshot.data {
                let exists = guard.get(key)?.is_some();
                if exists && !overwrite {
                    skipped += 1;
                    continue;
                }
                guard.put(key, value)?;
                written += 1;
            }

            self.release_namespace_lock(&mut guard)?;
            (written, skipped)
        };

        self.publish_broadcast(BroadcastMessage::import(self.origin_id.clone()));
        self.emitter.emit(Event::Import {
            overwritten: written,
            skipped,
        });
        Ok((written, skipped))
    }

    // -- schema migration -----------------------------------------------

    /// Rewrite every item whose stored schema version differs from
    /// `target_version` through `adapter`. The rewrite
    /// preserves the item's existing TTL, compression/encryption flags,
    /// and index registrations; it goes around the ordinary `set`
    /// pipeline (no re-journaling, re-locking, or re-broadcasting per
    /// item) since this is a bulk maintenance pass, not a mutation a
    /// concurrent reader needs serialized against.
    pub fn migrate(&self, target_version: u32, adapter: &dyn SchemaAdapter) -> Result<MigrationReport> {
        self.ensure_not_destroyed()?;

        let candidates = {
            let mut guard = self.store.lock().unwrap();
            self.metadata_candidates(&mut guard)?
        };

        let mut report = MigrationReport::default();
        for (user_key, metadata) in candidates {
            if metadata.schema_version == target_version {
                continue;
            }

            let mut guard = self.store.lock().unwrap();
            let value = match self.get_locked(&mut guard, &user_key)? {
                Some(value) => value,
                None => continue,
            };

            let migrated_value = match adapter.up(&metadata, value) {
                Ok(value) => value,
                Err(err) => {
                    report.skipped.push((user_key, err.to_string()));
                    continue;
                }
            };

            if let Err(err) =
                self.migrate_rewrite(&mut guard, &user_key, &metadata, &migrated_value, target_version)
            {
                report.skipped.push((user_key, err.to_string()));
                continue;
            }

            report.migrated += 1;
        }

        self.emitter.emit(Event::Migrate {
            target_version,
            migrated: report.migrated,
        });
        Ok(report)
    }

    fn migrate_rewrite(
        &self,
        store: &mut S,
        user_key: &str,
        old_metadata: &ItemMetadata,
        new_value: &Value,
        target_version: u32,
    ) -> Result<()> {
        let flags = CodecFlags {
            compress: old_metadata.compressed,
            encrypt: old_metadata.encrypted,
        };
        let encoded = self
            .codec
            .encode(new_value, flags, self.encryption_key.as_ref())?;
        let new_chunks = chunk::split(&encoded, self.config.shard_size);
        let new_chunk_count = new_chunks.len() as u32;

        for (i, shard) in new_chunks.iter().enumerate() {
            let shard_key = keys::chunk(&self.config.prefix, &self.config.namespace, user_key, i as u32);
            store.put(&shard_key, shard)?;
        }
        for i in new_chunk_count..old_metadata.chunk_count {
            let shard_key = keys::chunk(&self.config.prefix, &self.config.namespace, user_key, i);
            store.delete(&shard_key)?;
        }

        let mut metadata = old_metadata.clone();
        metadata.chunk_count = new_chunk_count;
        metadata.size = encoded.len();
        metadata.updated_at = now_ms();
        metadata.schema_version = target_version;

        let mut registry = MetadataRegistry::new(store, &self.config.prefix, &self.config.namespace);
        registry.write(user_key, &metadata)
    }
}

/// The handle exposed to an [`Engine::transaction`] closure.
/// Delegates every operation to the owning engine; its only purpose is
/// to keep transactional code visually distinct from ordinary mutator
/// calls at the call site.
pub struct Transaction<'e, S: BackingStore> {
    engine: &'e Engine<S>,
}

impl<'e, S: BackingStore + Send + 'static> Transaction<'e, S> {
    pub fn set<T: Serialize>(&self, user_key: &str, value: &T, options: SetOptions) -> Result<bool> {
        self.engine.set(user_key, value, options)
    }

    pub fn get<T: DeserializeOwned>(&self, user_key: &str, default: T) -> Result<T> {
        self.engine.get(user_key, default)
    }

    pub fn remove(&self, user_key: &str) -> Result<bool> {
        self.engine.remove(user_key)
    }
}
