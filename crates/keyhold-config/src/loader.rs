// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./keyhold.toml` > `~/.config/keyhold/keyhold.toml` > `/etc/keyhold/keyhold.toml`
//! with environment variable overrides via `KEYHOLD_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::KeyholdConfig;

/// System-wide config file.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/keyhold/keyhold.toml";

/// Local config file name, resolved against the working directory.
pub const LOCAL_CONFIG_FILE: &str = "keyhold.toml";

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/keyhold/keyhold.toml` (system-wide)
/// 3. `~/.config/keyhold/keyhold.toml` (user XDG config)
/// 4. `./keyhold.toml` (local directory)
/// 5. `KEYHOLD_*` environment variables
pub fn load_config() -> Result<KeyholdConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<KeyholdConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(KeyholdConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<KeyholdConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(KeyholdConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(KeyholdConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_PATH))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("keyhold/keyhold.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file(LOCAL_CONFIG_FILE))
        .merge(env_provider())
}

/// Create the environment variable provider using explicit `map()` for section-to-dot mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` because key names contain
/// underscores: `KEYHOLD_SESSION_IDLE_TIMEOUT_SECS` must map to
/// `session.idle_timeout_secs`, not `session.idle.timeout.secs`.
///
/// `KEYHOLD_PASSWORD` feeds the password prompt, not the config.
fn env_provider() -> Env {
    Env::prefixed("KEYHOLD_").ignore(&["password"]).map(|key| {
        // Keys arrive in the variable's own case.
        let mapped = key
            .as_str()
            .to_ascii_lowercase()
            .replacen("kdf_", "kdf.", 1)
            .replacen("session_", "session.", 1)
            .replacen("rotation_", "rotation.", 1)
            .replacen("storage_", "storage.", 1)
            .replacen("audit_", "audit.", 1);
        mapped.into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_overrides_nested_keys() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("KEYHOLD_SESSION_IDLE_TIMEOUT_SECS", "45");
            jail.set_env("KEYHOLD_KDF_MEMORY_KIB", "131072");
            jail.set_env("KEYHOLD_LOG_LEVEL", "debug");
            let config = load_config()?;
            assert_eq!(config.session.idle_timeout_secs, 45);
            assert_eq!(config.kdf.memory_kib, 131072);
            assert_eq!(config.log_level, "debug");
            Ok(())
        });
    }

    #[test]
    fn env_beats_explicit_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "explicit.toml",
                r#"
                [audit]
                retention_days = 90
                [storage]
                data_dir = "/from/file"
                "#,
            )?;
            jail.set_env("KEYHOLD_AUDIT_RETENTION_DAYS", "7");
            jail.set_env("KEYHOLD_STORAGE_DATA_DIR", "/from/env");
            let config = load_config_from_path(Path::new("explicit.toml"))?;
            assert_eq!(config.audit.retention_days, Some(7));
            assert_eq!(config.storage.data_dir, "/from/env");
            Ok(())
        });
    }

    #[test]
    fn password_env_var_is_not_config() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("KEYHOLD_PASSWORD", "hunter2");
            let config = load_config()?;
            assert_eq!(config.log_level, "info");
            Ok(())
        });
    }

    #[test]
    fn local_file_overrides_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                LOCAL_CONFIG_FILE,
                r#"
                [rotation]
                rekey_timeout_secs = 15
                "#,
            )?;
            let config = load_config()?;
            assert_eq!(config.rotation.rekey_timeout_secs, 15);
            assert_eq!(config.session.background_timeout_secs, 30);
            Ok(())
        });
    }
}
