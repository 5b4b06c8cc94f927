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

//! `lsm-store`: a durable, namespaced, chunked key-value engine layered
//! on top of a bounded, synchronous, string-keyed [`BackingStore`].
//!
//! Values are JSON-serialized, optionally LZ4-compressed and
//! ChaCha20-Poly1305-encrypted, then split into base64 shards sized to
//! fit the backing store's per-record limits. Around that codec
//! pipeline, the engine layers TTL expiration, LRU/LFU quota eviction,
//! secondary field indexes, cross-context broadcast, a best-effort
//! namespace lock, an append-only journal driving naive rollback, and
//! schema migration. See [`Engine`] for the operations themselves.

pub mod broadcast;
pub mod chunk;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod eviction;
pub mod index;
pub mod journal;
mod keys;
pub mod lock;
pub mod metadata;
pub mod metrics;
pub mod snapshot;
pub mod store;
pub mod time;
pub mod vacuum;

pub use broadcast::{BroadcastBridge, BroadcastKind, BroadcastMessage, ChannelBroadcast, RemoteEvent, Subscription};
pub use codec::encryption::EncryptionKey;
pub use codec::{Codec, CodecFlags};
pub use config::{EngineConfig, EvictionPolicy, IndexSpec, SetOptions};
pub use engine::{Engine, MigrationReport, SchemaAdapter, Transaction};
pub use error::{Error, Result};
pub use events::{Emitter, Event};
pub use metadata::ItemMetadata;
pub use metrics::{Metrics, MetricsSnapshot};
pub use snapshot::Snapshot;
pub use store::{BackingStore, MemoryStore, StoreError};

#[cfg(feature = "store-sqlite")]
pub use store::SqliteStore;
