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

//! Deterministic construction of the `BackingStore` keys the engine owns.
//!
//! All literal separators are `:`, per the external key layout. Only the
//! engine facade and the component registries below it (metadata, journal,
//! lock, index) may construct these keys; no other code should do so.

/// The namespace-prefixed key of the marker entry for `user_key`.
pub fn marker(prefix: &str, namespace: &str, user_key: &str) -> String {
    format!("{prefix}:{namespace}:{user_key}")
}

/// The namespace-prefixed key of the metadata record for `user_key`.
pub fn metadata(prefix: &str, namespace: &str, user_key: &str) -> String {
    format!("{prefix}:{namespace}:__meta__:{user_key}")
}

/// The namespace-prefixed key of chunk `index` of `user_key`.
pub fn chunk(prefix: &str, namespace: &str, user_key: &str, index: u32) -> String {
    format!("{prefix}:{namespace}:{user_key}:chunk:{index}")
}

/// The namespace-prefixed key of the index record named `index_name`.
pub fn index(prefix: &str, namespace: &str, index_name: &str) -> String {
    format!("{prefix}:{namespace}:__index__:{index_name}")
}

/// The namespace-prefixed key of the journal.
pub fn journal(prefix: &str, namespace: &str) -> String {
    format!("{prefix}:{namespace}:__journal__")
}

/// The namespace-prefixed key of the lock record.
pub fn lock(prefix: &str, namespace: &str) -> String {
    format!("{prefix}:{namespace}:__lock__")
}

/// The namespace-prefixed key of the encryption key record.
pub fn encryption_key(prefix: &str, namespace: &str) -> String {
    format!("{prefix}:{namespace}:__key__")
}

/// The prefix common to every key this namespace owns, used to scope
/// scans (vacuum, export, eviction sizing, `clear_namespace`).
pub fn namespace_prefix(prefix: &str, namespace: &str) -> String {
    format!("{prefix}:{namespace}:")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_matches_literal_separators() {
        assert_eq!(marker("__lsm__", "default", "a"), "__lsm__:default:a");
        assert_eq!(
            metadata("__lsm__", "default", "a"),
            "__lsm__:default:__meta__:a"
        );
        assert_eq!(
            chunk("__lsm__", "default", "a", 3),
            "__lsm__:default:a:chunk:3"
        );
        assert_eq!(
            index("__lsm__", "default", "byRole"),
            "__lsm__:default:__index__:byRole"
        );
        assert_eq!(journal("__lsm__", "default"), "__lsm__:default:__journal__");
        assert_eq!(lock("__lsm__", "default"), "__lsm__:default:__lock__");
        assert_eq!(
            encryption_key("__lsm__", "default"),
            "__lsm__:default:__key__"
        );
    }
}
