// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for Keyhold.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level Keyhold configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct KeyholdConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Argon2id parameters for newly derived keys.
    #[serde(default)]
    pub kdf: KdfConfig,

    /// Session lifetime settings.
    #[serde(default)]
    pub session: SessionConfig,

    /// Storage passphrase rotation settings.
    #[serde(default)]
    pub rotation: RotationConfig,

    /// Database locations.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Audit chain settings.
    #[serde(default)]
    pub audit: AuditConfig,
}

impl Default for KeyholdConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            kdf: KdfConfig::default(),
            session: SessionConfig::default(),
            rotation: RotationConfig::default(),
            storage: StorageConfig::default(),
            audit: AuditConfig::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Argon2id cost parameters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct KdfConfig {
    /// Memory cost in KiB (default: 65536 = 64 MiB).
    #[serde(default = "default_kdf_memory_kib")]
    pub memory_kib: u32,

    /// Number of passes (default: 3).
    #[serde(default = "default_kdf_iterations")]
    pub iterations: u32,

    /// Parallelism lanes (default: 1, bounds mobile latency).
    #[serde(default = "default_kdf_parallelism")]
    pub parallelism: u32,
}

impl Default for KdfConfig {
    fn default() -> Self {
        Self {
            memory_kib: default_kdf_memory_kib(),
            iterations: default_kdf_iterations(),
            parallelism: default_kdf_parallelism(),
        }
    }
}

fn default_kdf_memory_kib() -> u32 {
    65536
}

fn default_kdf_iterations() -> u32 {
    3
}

fn default_kdf_parallelism() -> u32 {
    1
}

/// Session timeouts.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Lock after this many seconds without activity while in the foreground.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Lock after this many seconds in the background.
    #[serde(default = "default_background_timeout_secs")]
    pub background_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            background_timeout_secs: default_background_timeout_secs(),
        }
    }
}

fn default_idle_timeout_secs() -> u64 {
    120
}

fn default_background_timeout_secs() -> u64 {
    30
}

/// Storage passphrase rotation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RotationConfig {
    /// Upper bound for the re-key and verification phase, in seconds.
    #[serde(default = "default_rekey_timeout_secs")]
    pub rekey_timeout_secs: u64,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            rekey_timeout_secs: default_rekey_timeout_secs(),
        }
    }
}

fn default_rekey_timeout_secs() -> u64 {
    60
}

/// Database locations.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Directory holding both databases.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// File name of the encrypted vault database.
    #[serde(default = "default_vault_db")]
    pub vault_db: String,

    /// File name of the metadata database (key records and audit chain).
    #[serde(default = "default_meta_db")]
    pub meta_db: String,
}

impl StorageConfig {
    /// Full path of the encrypted vault database.
    pub fn vault_db_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join(&self.vault_db)
    }

    /// Full path of the metadata database.
    pub fn meta_db_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join(&self.meta_db)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            vault_db: default_vault_db(),
            meta_db: default_meta_db(),
        }
    }
}

fn default_data_dir() -> String {
    dirs::data_dir()
        .map(|p| p.join("keyhold"))
        .unwrap_or_else(|| PathBuf::from(".keyhold"))
        .to_string_lossy()
        .into_owned()
}

fn default_vault_db() -> String {
    "vault.db".to_string()
}

fn default_meta_db() -> String {
    "keyhold-meta.db".to_string()
}

/// Audit chain settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    /// Keep entries for this many days; `None` keeps everything.
    #[serde(default)]
    pub retention_days: Option<u32>,
}
