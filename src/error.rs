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

//! The error taxonomy of the storage engine.
//!
//! Mirrors the kinds enumerated in the engine's design: failures during a
//! mutation are journaled and rolled back before being surfaced here;
//! failures during a read degrade silently to the caller's default value
//! and never appear as an `Error`.

use thiserror::Error;

/// The result type returned by fallible operations in this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// An error produced by the storage engine.
#[derive(Debug, Error)]
pub enum Error {
    /// The backing store rejected a write because it is full.
    #[error("the backing store is full")]
    StorageFull,

    /// Decryption failed authentication, or no encryption key exists for
    /// the namespace.
    #[error("decryption failed or no encryption key is available")]
    CryptoFail,

    /// A marker was present but its metadata or chunks were missing or
    /// malformed.
    #[error("item data is corrupt")]
    CorruptData,

    /// A schema migration adapter failed for a particular item.
    #[error("schema migration failed: {0}")]
    SchemaMigrationFailure(String),

    /// The engine instance has been destroyed and can no longer mutate
    /// the backing store.
    #[error("this engine instance has been destroyed")]
    InstanceDestroyed,

    /// `import` was called with a snapshot missing its `data` field.
    #[error("the snapshot is missing its data field")]
    InvalidSnapshot,

    /// An error occurred that originated from the backing store and was
    /// not a quota failure. The original error is preserved unchanged.
    #[error("backing store error: {0}")]
    Store(#[from] anyhow::Error),
}

impl From<crate::store::StoreError> for Error {
    fn from(err: crate::store::StoreError) -> Self {
        match err {
            crate::store::StoreError::Full => Error::StorageFull,
            crate::store::StoreError::Other(err) => Error::Store(err),
        }
    }
}
