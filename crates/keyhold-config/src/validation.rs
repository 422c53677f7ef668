// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Checks the cost floors of the key-derivation function, the session
//! timeout ranges, and the storage locations. Every violation is collected;
//! validation never fails fast.

use crate::diagnostic::ConfigError;
use crate::model::KeyholdConfig;

/// Smallest accepted Argon2id memory cost (32 MiB).
pub const MIN_KDF_MEMORY_KIB: u32 = 32_768;
/// Largest accepted Argon2id memory cost (4 GiB).
pub const MAX_KDF_MEMORY_KIB: u32 = 4_194_304;
/// Smallest accepted Argon2id pass count.
pub const MIN_KDF_ITERATIONS: u32 = 2;
/// Largest accepted Argon2id pass count.
pub const MAX_KDF_ITERATIONS: u32 = 64;
/// Largest accepted Argon2id lane count.
pub const MAX_KDF_PARALLELISM: u32 = 16;
/// Accepted idle timeout range, in seconds.
pub const IDLE_TIMEOUT_RANGE: std::ops::RangeInclusive<u64> = 30..=300;
/// Accepted background timeout range, in seconds.
pub const BACKGROUND_TIMEOUT_RANGE: std::ops::RangeInclusive<u64> = 1..=300;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Err` with every collected violation.
pub fn validate_config(config: &KeyholdConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if !LOG_LEVELS.contains(&config.log_level.trim().to_ascii_lowercase().as_str()) {
        errors.push(ConfigError::validation(
            "log_level",
            format!(
                "`{}` is not one of {}",
                config.log_level,
                LOG_LEVELS.join(", ")
            ),
        ));
    }

    let kdf = &config.kdf;
    if !(MIN_KDF_MEMORY_KIB..=MAX_KDF_MEMORY_KIB).contains(&kdf.memory_kib) {
        errors.push(ConfigError::validation(
            "kdf.memory_kib",
            format!(
                "must be between {MIN_KDF_MEMORY_KIB} (32 MiB) and {MAX_KDF_MEMORY_KIB} (4 GiB), got {}",
                kdf.memory_kib
            ),
        ));
    }
    if !(MIN_KDF_ITERATIONS..=MAX_KDF_ITERATIONS).contains(&kdf.iterations) {
        errors.push(ConfigError::validation(
            "kdf.iterations",
            format!(
                "must be between {MIN_KDF_ITERATIONS} and {MAX_KDF_ITERATIONS}, got {}",
                kdf.iterations
            ),
        ));
    }
    if !(1..=MAX_KDF_PARALLELISM).contains(&kdf.parallelism) {
        errors.push(ConfigError::validation(
            "kdf.parallelism",
            format!(
                "must be between 1 and {MAX_KDF_PARALLELISM}, got {}",
                kdf.parallelism
            ),
        ));
    }

    let session = &config.session;
    if !IDLE_TIMEOUT_RANGE.contains(&session.idle_timeout_secs) {
        errors.push(ConfigError::validation(
            "session.idle_timeout_secs",
            format!(
                "must be between {} and {}, got {}",
                IDLE_TIMEOUT_RANGE.start(),
                IDLE_TIMEOUT_RANGE.end(),
                session.idle_timeout_secs
            ),
        ));
    }
    if !BACKGROUND_TIMEOUT_RANGE.contains(&session.background_timeout_secs) {
        errors.push(ConfigError::validation(
            "session.background_timeout_secs",
            format!(
                "must be between {} and {}, got {}",
                BACKGROUND_TIMEOUT_RANGE.start(),
                BACKGROUND_TIMEOUT_RANGE.end(),
                session.background_timeout_secs
            ),
        ));
    } else if session.background_timeout_secs > session.idle_timeout_secs {
        errors.push(ConfigError::validation(
            "session.background_timeout_secs",
            format!(
                "must not exceed session.idle_timeout_secs ({}), got {}",
                session.idle_timeout_secs, session.background_timeout_secs
            ),
        ));
    }

    if config.rotation.rekey_timeout_secs == 0 {
        errors.push(ConfigError::validation(
            "rotation.rekey_timeout_secs",
            "must be greater than 0",
        ));
    }

    let storage = &config.storage;
    if storage.data_dir.trim().is_empty() {
        errors.push(ConfigError::validation(
            "storage.data_dir",
            "must not be empty",
        ));
    }
    if storage.vault_db.trim().is_empty() {
        errors.push(ConfigError::validation("storage.vault_db", "must not be empty"));
    }
    if storage.meta_db.trim().is_empty() {
        errors.push(ConfigError::validation("storage.meta_db", "must not be empty"));
    }
    if !storage.vault_db.trim().is_empty() && storage.vault_db == storage.meta_db {
        errors.push(ConfigError::validation(
            "storage.meta_db",
            "must differ from storage.vault_db",
        ));
    }

    if let Some(days) = config.audit.retention_days
        && days == 0
    {
        errors.push(ConfigError::validation(
            "audit.retention_days",
            "must be at least 1 when set",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        tracing::debug!(count = errors.len(), "configuration failed validation");
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(errors: &[ConfigError]) -> Vec<String> {
        errors
            .iter()
            .filter_map(|e| match e {
                ConfigError::Validation { key, .. } => Some(key.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&KeyholdConfig::default()).is_ok());
    }

    #[test]
    fn weak_kdf_is_rejected() {
        let mut config = KeyholdConfig::default();
        config.kdf.memory_kib = 1024;
        config.kdf.iterations = 1;
        config.kdf.parallelism = 0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            keys(&errors),
            vec!["kdf.memory_kib", "kdf.iterations", "kdf.parallelism"]
        );
    }

    #[test]
    fn runaway_kdf_is_rejected() {
        let mut config = KeyholdConfig::default();
        config.kdf.memory_kib = MAX_KDF_MEMORY_KIB + 1;
        config.kdf.iterations = MAX_KDF_ITERATIONS + 1;
        config.kdf.parallelism = MAX_KDF_PARALLELISM + 1;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            keys(&errors),
            vec!["kdf.memory_kib", "kdf.iterations", "kdf.parallelism"]
        );
    }

    #[test]
    fn background_timeout_may_not_exceed_idle() {
        let mut config = KeyholdConfig::default();
        config.session.idle_timeout_secs = 60;
        config.session.background_timeout_secs = 90;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(keys(&errors), vec!["session.background_timeout_secs"]);
    }

    #[test]
    fn idle_timeout_outside_range_is_rejected() {
        let mut config = KeyholdConfig::default();
        config.session.idle_timeout_secs = 10;
        config.session.background_timeout_secs = 5;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(keys(&errors), vec!["session.idle_timeout_secs"]);
    }

    #[test]
    fn zero_retention_and_rekey_timeout_are_rejected() {
        let mut config = KeyholdConfig::default();
        config.audit.retention_days = Some(0);
        config.rotation.rekey_timeout_secs = 0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            keys(&errors),
            vec!["rotation.rekey_timeout_secs", "audit.retention_days"]
        );
    }

    #[test]
    fn unknown_log_level_is_rejected() {
        let config = KeyholdConfig {
            log_level: "loud".into(),
            ..KeyholdConfig::default()
        };
        assert_eq!(keys(&validate_config(&config).unwrap_err()), vec!["log_level"]);
    }

    #[test]
    fn same_file_for_both_databases_is_rejected() {
        let mut config = KeyholdConfig::default();
        config.storage.meta_db = config.storage.vault_db.clone();
        assert_eq!(keys(&validate_config(&config).unwrap_err()), vec!["storage.meta_db"]);
    }
}
