// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Keyhold configuration system.

use keyhold_config::diagnostic::ConfigError;
use keyhold_config::model::KeyholdConfig;
use keyhold_config::{load_and_validate_str, load_config_from_str};

/// Every section parses with explicit values.
#[test]
fn full_toml_deserializes() {
    let toml = r#"
log_level = "debug"

[kdf]
memory_kib = 131072
iterations = 4
parallelism = 2

[session]
idle_timeout_secs = 60
background_timeout_secs = 15

[rotation]
rekey_timeout_secs = 20

[storage]
data_dir = "/var/lib/keyhold"
vault_db = "v.db"
meta_db = "m.db"

[audit]
retention_days = 90
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.log_level, "debug");
    assert_eq!(config.kdf.memory_kib, 131072);
    assert_eq!(config.kdf.iterations, 4);
    assert_eq!(config.kdf.parallelism, 2);
    assert_eq!(config.session.idle_timeout_secs, 60);
    assert_eq!(config.session.background_timeout_secs, 15);
    assert_eq!(config.rotation.rekey_timeout_secs, 20);
    assert_eq!(
        config.storage.vault_db_path(),
        std::path::PathBuf::from("/var/lib/keyhold/v.db")
    );
    assert_eq!(config.audit.retention_days, Some(90));
}

/// An empty file yields the compiled defaults.
#[test]
fn empty_toml_uses_defaults() {
    let config = load_and_validate_str("").expect("empty config is valid");
    let defaults = KeyholdConfig::default();
    assert_eq!(config.kdf, defaults.kdf);
    assert_eq!(config.session.idle_timeout_secs, 120);
    assert_eq!(config.session.background_timeout_secs, 30);
    assert_eq!(config.storage.meta_db, "keyhold-meta.db");
    assert_eq!(config.audit.retention_days, None);
}

/// A typo inside a section becomes an UnknownKey diagnostic with a suggestion.
#[test]
fn unknown_key_suggests_correction() {
    let toml = r#"
[session]
idle_timout_secs = 60
"#;

    let errors = load_and_validate_str(toml).expect_err("typo should be rejected");
    let found = errors.iter().any(|e| match e {
        ConfigError::UnknownKey {
            key, suggestion, ..
        } => key == "idle_timout_secs" && suggestion.as_deref() == Some("idle_timeout_secs"),
        _ => false,
    });
    assert!(found, "expected UnknownKey with suggestion, got: {errors:?}");
}

/// A misspelled section name is rejected.
#[test]
fn unknown_section_is_rejected() {
    let errors = load_and_validate_str("[sesion]\nidle_timeout_secs = 60\n")
        .expect_err("unknown section should be rejected");
    assert!(matches!(
        errors.first(),
        Some(ConfigError::UnknownKey { key, .. }) if key == "sesion"
    ));
}

/// A string where a number is expected produces an InvalidType diagnostic.
#[test]
fn wrong_type_is_reported() {
    let errors = load_and_validate_str("[kdf]\niterations = \"three\"\n")
        .expect_err("wrong type should be rejected");
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::InvalidType { .. })),
        "expected InvalidType, got: {errors:?}"
    );
}

/// Semantic violations surface as Validation errors after parsing succeeds.
#[test]
fn weak_kdf_fails_validation() {
    let errors = load_and_validate_str("[kdf]\nmemory_kib = 4096\n")
        .expect_err("weak memory cost should be rejected");
    assert_eq!(errors.len(), 1);
    assert!(errors[0].to_string().contains("kdf.memory_kib"));
}
