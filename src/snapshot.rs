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

//! The export/import snapshot format.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// A full export of one namespace's raw `BackingStore` entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub namespace: String,
    pub prefix: String,
    pub schema_version: u32,
    pub include_indexes: bool,
    pub data: HashMap<String, String>,
    pub exported_at: i64,
}

impl Snapshot {
    /// Parse a snapshot from raw JSON text, returning
    /// [`Error::InvalidSnapshot`] when the `data` field is absent.
    pub fn from_json(raw: &str) -> Result<Snapshot> {
        let value: Value = serde_json::from_str(raw).map_err(|_| Error::InvalidSnapshot)?;
        if value.get("data").is_none() {
            return Err(Error::InvalidSnapshot);
        }
        serde_json::from_value(value).map_err(|_| Error::InvalidSnapshot)
    }

    /// Serialize this snapshot to JSON text.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|err| Error::Store(err.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_snapshot_missing_data_field() {
        let raw = r#"{"namespace":"default","prefix":"__lsm__","schemaVersion":1,"includeIndexes":false,"exportedAt":0}"#;
        assert!(matches!(Snapshot::from_json(raw), Err(Error::InvalidSnapshot)));
    }

    #[test]
    fn round_trips_through_json() {
        let snapshot = Snapshot {
            namespace: "default".to_string(),
            prefix: "__lsm__".to_string(),
            schema_version: 1,
            include_indexes: false,
            data: HashMap::from([("k".to_string(), "v".to_string())]),
            exported_at: 123,
        };
        let json = snapshot.to_json().unwrap();
        let parsed = Snapshot::from_json(&json).unwrap();
        assert_eq!(parsed.data.get("k"), Some(&"v".to_string()));
    }
}
