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

//! Secondary field-value -> key-set indexes.
//!
//! Per design decision D2 (see `DESIGN.md`), an item's `indexKeys` list
//! stores each reference as `"<name>:<base64(fieldValue)>"` rather than
//! the raw `"<name>:<fieldValue>"`, which would mis-split on removal for
//! field values containing `:`. The escape is applied only at the
//! `indexKeys` boundary; the index record itself is keyed by the plain
//! stringified field value, so `query_index`/`list_index` callers see
//! ordinary strings.

use base64::Engine as _;
use indexmap::IndexMap;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::keys;
use crate::store::BackingStore;

/// Coerce a JSON value into the string used to bucket it in an index.
/// `Value::String` is unwrapped to its raw contents; every other kind is
/// stringified via its JSON rendering.
pub fn stringify_field_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Encode an `(index_name, field_value)` pair into the escaped form
/// stored in an item's `indexKeys` list.
pub fn encode_index_key(index_name: &str, field_value: &str) -> String {
    format!(
        "{index_name}:{}",
        base64::engine::general_purpose::STANDARD.encode(field_value)
    )
}

/// Reverse [`encode_index_key`]. Splits on the first `:`, then base64
/// decodes the remainder, so index names themselves may not contain `:`
/// (field values may contain anything).
pub fn decode_index_key(index_key: &str) -> Result<(String, String)> {
    let (name, encoded_value) = index_key.split_once(':').ok_or(Error::CorruptData)?;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded_value)
        .map_err(|_| Error::CorruptData)?;
    let value = String::from_utf8(decoded).map_err(|_| Error::CorruptData)?;
    Ok((name.to_string(), value))
}

type IndexBuckets = IndexMap<String, Vec<String>>;

/// Reads and writes secondary index records for one namespace.
pub struct IndexRegistry<'a, S: BackingStore> {
    store: &'a mut S,
    prefix: String,
    namespace: String,
}

impl<'a, S: BackingStore> IndexRegistry<'a, S> {
    pub fn new(store: &'a mut S, prefix: impl Into<String>, namespace: impl Into<String>) -> Self {
        IndexRegistry {
            store,
            prefix: prefix.into(),
            namespace: namespace.into(),
        }
    }

    fn index_key(&self, index_name: &str) -> String {
        keys::index(&self.prefix, &self.namespace, index_name)
    }

    fn read_buckets(&self, index_name: &str) -> Result<IndexBuckets> {
        match self.store.get(&self.index_key(index_name))? {
            Some(raw) => Ok(serde_json::from_str(&raw).unwrap_or_default()),
            None => Ok(IndexMap::new()),
        }
    }

    fn write_buckets(&mut self, index_name: &str, buckets: &IndexBuckets) -> Result<()> {
        let serialized = serde_json::to_string(buckets).map_err(|err| Error::Store(err.into()))?;
        self.store.put(&self.index_key(index_name), &serialized)?;
        Ok(())
    }

    /// Append `user_key` to the bucket for `field_value` in `index_name`,
    /// if it is not already present. Creates the bucket if this is the
    /// first insert for that field value.
    pub fn ensure(&mut self, index_name: &str, field_value: &str, user_key: &str) -> Result<()> {
        let mut buckets = self.read_buckets(index_name)?;
        let bucket = buckets.entry(field_value.to_string()).or_default();
        if !bucket.iter().any(|k| k == user_key) {
            bucket.push(user_key.to_string());
        }
        self.write_buckets(index_name, &buckets)
    }

    /// Remove `user_key` from the bucket for `field_value` in
    /// `index_name`. The bucket is left in place, possibly empty, rather
    /// than garbage collected.
    pub fn remove(&mut self, index_name: &str, field_value: &str, user_key: &str) -> Result<()> {
        let mut buckets = self.read_buckets(index_name)?;
        if let Some(bucket) = buckets.get_mut(field_value) {
            bucket.retain(|k| k != user_key);
        }
        self.write_buckets(index_name, &buckets)
    }

    /// Return the user keys indexed under `field_value` in `index_name`,
    /// in insertion order. An unknown index or field value yields an
    /// empty sequence rather than an error.
    pub fn query(&self, index_name: &str, field_value: &str) -> Result<Vec<String>> {
        let buckets = self.read_buckets(index_name)?;
        Ok(buckets.get(field_value).cloned().unwrap_or_default())
    }

    /// Return every field value with a bucket in `index_name`, in the
    /// order buckets were first created.
    pub fn list(&self, index_name: &str) -> Result<Vec<String>> {
        let buckets = self.read_buckets(index_name)?;
        Ok(buckets.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn ensure_and_query_round_trip_preserving_order() {
        let mut store = MemoryStore::new();
        let mut index = IndexRegistry::new(&mut store, "__lsm__", "default");
        index.ensure("byRole", "admin", "users:u1").unwrap();
        index.ensure("byRole", "admin", "users:u2").unwrap();
        assert_eq!(
            index.query("byRole", "admin").unwrap(),
            vec!["users:u1".to_string(), "users:u2".to_string()]
        );
    }

    #[test]
    fn ensure_is_idempotent() {
        let mut store = MemoryStore::new();
        let mut index = IndexRegistry::new(&mut store, "__lsm__", "default");
        index.ensure("byRole", "admin", "users:u1").unwrap();
        index.ensure("byRole", "admin", "users:u1").unwrap();
        assert_eq!(index.query("byRole", "admin").unwrap().len(), 1);
    }

    #[test]
    fn remove_leaves_empty_bucket_queryable() {
        let mut store = MemoryStore::new();
        let mut index = IndexRegistry::new(&mut store, "byRole", "default");
        index.ensure("byRole", "admin", "users:u1").unwrap();
        index.remove("byRole", "admin", "users:u1").unwrap();
        assert_eq!(index.query("byRole", "admin").unwrap(), Vec::<String>::new());
        assert_eq!(index.list("byRole").unwrap(), vec!["admin".to_string()]);
    }

    #[test]
    fn unknown_index_query_is_empty_not_error() {
        let mut store = MemoryStore::new();
        let index = IndexRegistry::new(&mut store, "__lsm__", "default");
        assert_eq!(index.query("missing", "x").unwrap(), Vec::<String>::new());
    }

    #[test]
    fn index_key_escape_round_trips_values_containing_colons() {
        let encoded = encode_index_key("byUrl", "https://example.com:8080/x");
        let (name, value) = decode_index_key(&encoded).unwrap();
        assert_eq!(name, "byUrl");
        assert_eq!(value, "https://example.com:8080/x");
    }

    #[test]
    fn stringify_field_value_unwraps_plain_strings() {
        assert_eq!(stringify_field_value(&serde_json::json!("admin")), "admin");
        assert_eq!(stringify_field_value(&serde_json::json!(42)), "42");
    }
}
