// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLCipher-backed [`EncryptedStore`] for the vault database.
//!
//! The storage passphrase is raw key material and is handed to SQLCipher as
//! a hex blob literal (`x'..'`), which skips SQLCipher's own key derivation.
//! Every operation opens a fresh connection so a stale key can never linger
//! on a cached handle.
//!
//! Operations are serialized by a gate whose guard travels into the worker
//! closure. A caller that gives up on a re-key (a timeout drops its future)
//! releases nothing: the next probe or re-key still waits for the worker.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use keyhold_core::{EncryptedStore, KeyholdError};
use tokio::sync::Mutex;
use tracing::debug;
use zeroize::Zeroizing;

use crate::database::map_tr_err;

/// Marker table written on first open, so an empty file is bound to its first key.
const MARKER_DDL: &str = "CREATE TABLE IF NOT EXISTS keyhold_store (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);
INSERT OR IGNORE INTO keyhold_store (id) VALUES (1);";

/// Render a passphrase as a SQLCipher raw-key literal.
fn raw_key_literal(passphrase: &[u8]) -> Zeroizing<String> {
    let hex_key = Zeroizing::new(hex::encode(passphrase));
    Zeroizing::new(format!("x'{}'", hex_key.as_str()))
}

/// Apply `key` and run a trivial read. Fails with "file is not a database" on a wrong key.
fn unlock(conn: &rusqlite::Connection, key: &str) -> rusqlite::Result<()> {
    conn.pragma_update(None, "key", key)?;
    conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| row.get::<_, i64>(0))?;
    Ok(())
}

/// Passphrase-keyed SQLCipher database at a fixed path.
pub struct SqlCipherStore {
    path: PathBuf,
    gate: Arc<Mutex<()>>,
}

impl SqlCipherStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            gate: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn open(&self) -> Result<tokio_rusqlite::Connection, KeyholdError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(KeyholdError::storage)?;
        }
        tokio_rusqlite::Connection::open(&self.path)
            .await
            .map_err(KeyholdError::storage)
    }
}

#[async_trait]
impl EncryptedStore for SqlCipherStore {
    async fn probe(&self, passphrase: &[u8]) -> Result<(), KeyholdError> {
        let gate = Arc::clone(&self.gate).lock_owned().await;
        let key = raw_key_literal(passphrase);
        let conn = self.open().await?;
        conn.call(move |conn| {
            let _gate = gate;
            unlock(conn, &key)?;
            conn.execute_batch(MARKER_DDL)?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;
        conn.close().await.map_err(KeyholdError::storage)?;
        debug!(path = %self.path.display(), "encrypted store opened");
        Ok(())
    }

    async fn rekey(&self, old: &[u8], new: &[u8]) -> Result<(), KeyholdError> {
        let gate = Arc::clone(&self.gate).lock_owned().await;
        let old_key = raw_key_literal(old);
        let new_key = raw_key_literal(new);
        let conn = self.open().await?;
        conn.call(move |conn| {
            let _gate = gate;
            unlock(conn, &old_key)?;
            conn.pragma_update(None, "rekey", new_key.as_str())?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;
        conn.close().await.map_err(KeyholdError::storage)?;
        debug!(path = %self.path.display(), "encrypted store re-keyed");
        Ok(())
    }
}
