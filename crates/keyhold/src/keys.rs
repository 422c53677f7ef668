// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `keyhold keys status`: what is on disk, read without decrypting anything.

use std::io::IsTerminal;

use keyhold_config::KeyholdConfig;
use keyhold_core::{KeyBlobStore, KeyholdError};
use keyhold_storage::{MetaDatabase, SqliteKeyBlobStore};
use keyhold_vault::KdfParams;
use keyhold_vault::records::{
    self, MASTER_KEY_SALT_BLOB, MASTER_SEED_BLOB, MasterKeySalt, PASSWORD_SLOT_BLOB,
    PasswordSlotRecord, STORAGE_PASSPHRASE_BLOB,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct KeyStatus {
    meta_db: String,
    vault_db: String,
    vault_db_exists: bool,
    seed_initialized: bool,
    password_slot: Option<KdfParams>,
    master_key_salt: Option<KdfParams>,
    storage_passphrase: bool,
    audit_entries: i64,
    blobs: Vec<String>,
}

pub(crate) async fn run_status(config: &KeyholdConfig, json: bool) -> Result<(), KeyholdError> {
    let status = collect(config).await?;
    if json {
        let out = serde_json::to_string_pretty(&status)
            .map_err(|e| KeyholdError::Internal(e.to_string()))?;
        println!("{out}");
    } else {
        print!("{}", render(&status, std::io::stdout().is_terminal()));
    }
    Ok(())
}

async fn collect(config: &KeyholdConfig) -> Result<KeyStatus, KeyholdError> {
    let meta_path = config.storage.meta_db_path();
    let vault_path = config.storage.vault_db_path();
    let mut status = KeyStatus {
        meta_db: meta_path.display().to_string(),
        vault_db: vault_path.display().to_string(),
        vault_db_exists: vault_path.exists(),
        seed_initialized: false,
        password_slot: None,
        master_key_salt: None,
        storage_passphrase: false,
        audit_entries: 0,
        blobs: Vec::new(),
    };
    if !meta_path.exists() {
        return Ok(status);
    }

    let db = MetaDatabase::open(&meta_path).await?;
    let blobs = SqliteKeyBlobStore::new(db.clone());
    status.blobs = blobs.names().await?;
    status.seed_initialized = blobs.get(MASTER_SEED_BLOB).await?.is_some();
    status.storage_passphrase = blobs.get(STORAGE_PASSPHRASE_BLOB).await?.is_some();
    if let Some(blob) = blobs.get(PASSWORD_SLOT_BLOB).await? {
        status.password_slot = Some(records::decode::<PasswordSlotRecord>(&blob)?.kdf);
    }
    if let Some(blob) = blobs.get(MASTER_KEY_SALT_BLOB).await? {
        status.master_key_salt = Some(records::decode::<MasterKeySalt>(&blob)?.kdf);
    }
    status.audit_entries = crate::audit::open_chain(&db).head_sequence().await?;
    Ok(status)
}

fn render(status: &KeyStatus, use_color: bool) -> String {
    let mark = |present: bool| -> String {
        let (symbol, text) = if present { ("✓", "yes") } else { ("✗", "no") };
        if use_color {
            use colored::Colorize;
            if present {
                format!("{} {}", symbol.green(), text)
            } else {
                format!("{} {}", symbol.yellow(), text)
            }
        } else {
            text.to_string()
        }
    };
    let kdf = |params: &Option<KdfParams>| match params {
        Some(p) => format!(
            "{} (argon2id v{}, m={}KiB t={} p={})",
            mark(true),
            p.version,
            p.memory_kib,
            p.iterations,
            p.parallelism
        ),
        None => mark(false),
    };

    let mut out = String::new();
    out.push_str(&format!("  Metadata:      {}\n", status.meta_db));
    out.push_str(&format!(
        "  Vault:         {} ({})\n",
        status.vault_db,
        if status.vault_db_exists {
            "present"
        } else {
            "missing"
        }
    ));
    out.push_str(&format!("  Master seed:   {}\n", mark(status.seed_initialized)));
    out.push_str(&format!("  Password slot: {}\n", kdf(&status.password_slot)));
    out.push_str(&format!("  Master salt:   {}\n", kdf(&status.master_key_salt)));
    out.push_str(&format!("  Passphrase:    {}\n", mark(status.storage_passphrase)));
    out.push_str(&format!("  Audit entries: {}\n", status.audit_entries));
    out
}
