// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metadata database handle.
//!
//! All reads and writes go through one `tokio_rusqlite::Connection`, whose
//! background thread serializes every closure. Do NOT open additional
//! connections for writes: the audit chain relies on this ordering.

use std::path::Path;

use keyhold_core::KeyholdError;
use tracing::debug;

use crate::migrations::run_migrations;

/// Convert a tokio-rusqlite error into a storage error.
pub(crate) fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> KeyholdError {
    KeyholdError::storage(e)
}

/// The single-writer handle to the metadata database.
#[derive(Clone)]
pub struct MetaDatabase {
    conn: tokio_rusqlite::Connection,
}

impl MetaDatabase {
    /// Open (creating if needed) the database at `path` and apply migrations.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, KeyholdError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(KeyholdError::storage)?;
        }
        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(KeyholdError::storage)?;
        let db = Self::init(conn, true).await?;
        debug!(path = %path.display(), "metadata database opened");
        Ok(db)
    }

    /// Open a private in-memory database, used by tests and dry runs.
    pub async fn open_in_memory() -> Result<Self, KeyholdError> {
        let conn = tokio_rusqlite::Connection::open_in_memory()
            .await
            .map_err(KeyholdError::storage)?;
        Self::init(conn, false).await
    }

    async fn init(conn: tokio_rusqlite::Connection, wal: bool) -> Result<Self, KeyholdError> {
        conn.call(move |conn| -> Result<Result<(), KeyholdError>, rusqlite::Error> {
            if wal {
                conn.pragma_update(None, "journal_mode", "WAL")?;
                conn.pragma_update(None, "synchronous", "NORMAL")?;
            }
            conn.pragma_update(None, "busy_timeout", 5000)?;
            conn.pragma_update(None, "foreign_keys", "ON")?;
            Ok(run_migrations(conn))
        })
        .await
        .map_err(map_tr_err)??;
        Ok(Self { conn })
    }

    /// The underlying connection. Query modules call through `connection().call()`.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Checkpoint the WAL so the file on disk is self-contained.
    pub async fn checkpoint(&self) -> Result<(), KeyholdError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn migrations_create_tables_and_genesis_row() {
        let db = MetaDatabase::open_in_memory().await.unwrap();
        let (tables, head): (i64, String) = db
            .connection()
            .call(|conn| -> Result<_, rusqlite::Error> {
                let tables: i64 = conn.query_row(
                    "SELECT count(*) FROM sqlite_master WHERE type = 'table' \
                     AND name IN ('key_blobs', 'audit_entries', 'audit_chain')",
                    [],
                    |row| row.get(0),
                )?;
                let head: String =
                    conn.query_row("SELECT head_hash FROM audit_chain WHERE id = 1", [], |row| {
                        row.get(0)
                    })?;
                Ok((tables, head))
            })
            .await
            .unwrap();
        assert_eq!(tables, 3);
        assert_eq!(head, keyhold_core::GENESIS_HASH);
    }

    #[tokio::test]
    async fn reopening_a_file_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/meta.db");
        let db = MetaDatabase::open(&path).await.unwrap();
        db.checkpoint().await.unwrap();
        drop(db);
        MetaDatabase::open(&path).await.unwrap();
        assert!(path.exists());
    }
}
