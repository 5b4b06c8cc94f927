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

use rusqlite::{params, Connection, OptionalExtension};

use super::{BackingStore, StoreError};

/// A [`BackingStore`] backed by a single SQLite table. Both the key and
/// value columns are `TEXT`, matching the string-only contract this
/// crate's engine expects of a `BackingStore`.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (creating if necessary) a SQLite-backed store at `path`.
    pub fn open(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open a SQLite-backed store entirely in memory. Useful for tests
    /// that want SQLite's exact storage semantics without touching disk.
    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> anyhow::Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS entries (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                seq INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(Self { conn })
    }

    fn next_seq(&self) -> anyhow::Result<i64> {
        let max: Option<i64> = self
            .conn
            .query_row("SELECT MAX(seq) FROM entries", [], |row| row.get(0))?;
        Ok(max.unwrap_or(0) + 1)
    }
}

impl BackingStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.conn
            .query_row("SELECT value FROM entries WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()
            .map_err(|err| StoreError::Other(err.into()))
    }

    fn put(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        let seq = self.next_seq().map_err(StoreError::Other)?;
        let result = self.conn.execute(
            "INSERT INTO entries (key, value, seq) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value, seq],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::DiskFull =>
            {
                Err(StoreError::Full)
            }
            Err(err) => Err(StoreError::Other(err.into())),
        }
    }

    fn delete(&mut self, key: &str) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM entries WHERE key = ?1", params![key])
            .map_err(|err| StoreError::Other(err.into()))?;
        Ok(())
    }

    fn key_at(&self, index: usize) -> Result<Option<String>, StoreError> {
        self.conn
            .query_row(
                "SELECT key FROM entries ORDER BY seq ASC LIMIT 1 OFFSET ?1",
                params![index as i64],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| StoreError::Other(err.into()))
    }

    fn len(&self) -> Result<usize, StoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))
            .map_err(|err| StoreError::Other(err.into()))?;
        Ok(count as usize)
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM entries", [])
            .map_err(|err| StoreError::Other(err.into()))?;
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let like_pattern = format!("{}%", prefix.replace('%', "\\%").replace('_', "\\_"));
        let mut stmt = self
            .conn
            .prepare("SELECT key FROM entries WHERE key LIKE ?1 ESCAPE '\\' ORDER BY seq ASC")
            .map_err(|err| StoreError::Other(err.into()))?;
        let rows = stmt
            .query_map(params![like_pattern], |row| row.get(0))
            .map_err(|err| StoreError::Other(err.into()))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(|err| StoreError::Other(err.into()))?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_sqlite() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.put("a", "1").unwrap();
        assert_eq!(store.get("a").unwrap(), Some("1".to_string()));
        store.delete("a").unwrap();
        assert_eq!(store.get("a").unwrap(), None);
    }

    #[test]
    fn keys_with_prefix_filters() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.put("ns:a", "1").unwrap();
        store.put("other:b", "2").unwrap();
        let keys = store.keys_with_prefix("ns:").unwrap();
        assert_eq!(keys, vec!["ns:a".to_string()]);
    }
}
