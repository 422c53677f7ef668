// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Key record persistence in the `key_blobs` table.

use async_trait::async_trait;
use keyhold_core::{KeyBlobStore, KeyholdError};
use rusqlite::params;

use crate::database::{map_tr_err, MetaDatabase};

/// SQLite-backed [`KeyBlobStore`].
#[derive(Clone)]
pub struct SqliteKeyBlobStore {
    db: MetaDatabase,
}

impl SqliteKeyBlobStore {
    pub fn new(db: MetaDatabase) -> Self {
        Self { db }
    }
}

#[async_trait]
impl KeyBlobStore for SqliteKeyBlobStore {
    async fn get(&self, name: &str) -> Result<Option<Vec<u8>>, KeyholdError> {
        let name = name.to_string();
        self.db
            .connection()
            .call(move |conn| {
                let result = conn.query_row(
                    "SELECT blob FROM key_blobs WHERE name = ?1",
                    params![name],
                    |row| row.get::<_, Vec<u8>>(0),
                );
                match result {
                    Ok(blob) => Ok(Some(blob)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e),
                }
            })
            .await
            .map_err(map_tr_err)
    }

    async fn put(&self, name: &str, blob: Vec<u8>) -> Result<(), KeyholdError> {
        let name = name.to_string();
        self.db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO key_blobs (name, blob, updated_at)
                     VALUES (?1, ?2, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
                     ON CONFLICT(name) DO UPDATE SET
                        blob = excluded.blob,
                        updated_at = excluded.updated_at",
                    params![name, blob],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    async fn delete(&self, name: &str) -> Result<bool, KeyholdError> {
        let name = name.to_string();
        self.db
            .connection()
            .call(move |conn| {
                let rows = conn.execute("DELETE FROM key_blobs WHERE name = ?1", params![name])?;
                Ok(rows > 0)
            })
            .await
            .map_err(map_tr_err)
    }

    async fn names(&self) -> Result<Vec<String>, KeyholdError> {
        self.db
            .connection()
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT name FROM key_blobs ORDER BY name")?;
                let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
                rows.collect::<Result<Vec<_>, _>>()
            })
            .await
            .map_err(map_tr_err)
    }
}
