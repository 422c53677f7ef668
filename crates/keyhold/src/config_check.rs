// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `keyhold config check`.

use keyhold_config::KeyholdConfig;
use keyhold_core::KeyholdError;

/// Print the validated configuration. Invalid configs never get this far.
pub(crate) fn run_check(config: &KeyholdConfig) -> Result<(), KeyholdError> {
    print!("{}", render(config)?);
    Ok(())
}

fn render(config: &KeyholdConfig) -> Result<String, KeyholdError> {
    let body = toml::to_string_pretty(config).map_err(|e| KeyholdError::Config(e.to_string()))?;
    Ok(format!(
        "# configuration OK\n# metadata db: {}\n# vault db:    {}\n\n{body}",
        config.storage.meta_db_path().display(),
        config.storage.vault_db_path().display(),
    ))
}
