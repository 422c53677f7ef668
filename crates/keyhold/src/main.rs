// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Keyhold operator CLI.
//!
//! Inspects the audit chain and key records of a Keyhold data directory.
//! Nothing here unlocks the vault.

mod audit;
mod config_check;
mod keys;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use keyhold_config::KeyholdConfig;
use keyhold_core::KeyholdError;
use keyhold_storage::MetaDatabase;
use tracing_subscriber::EnvFilter;

/// Keyhold - hardware-backed key hierarchy and audit chain.
#[derive(Parser, Debug)]
#[command(name = "keyhold", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the XDG hierarchy.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Inspect and maintain the audit chain.
    #[command(subcommand)]
    Audit(AuditCommand),
    /// Inspect key records.
    #[command(subcommand)]
    Keys(KeysCommand),
    /// Inspect configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug)]
enum AuditCommand {
    /// Recompute every hash in the chain.
    Verify(JsonFlag),
    /// Show the most recent entries.
    Tail {
        /// Number of entries to show.
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[command(flatten)]
        output: JsonFlag,
    },
    /// Remove entries older than a retention window.
    Purge {
        /// Age in days; defaults to `audit.retention_days`.
        #[arg(long)]
        older_than_days: Option<u32>,
    },
}

#[derive(Subcommand, Debug)]
enum KeysCommand {
    /// Report which key records exist, without decrypting anything.
    Status(JsonFlag),
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Validate configuration and print the effective values.
    Check,
}

#[derive(Args, Debug, Clone, Copy)]
struct JsonFlag {
    /// Output as JSON.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => keyhold_config::load_and_validate_path(path),
        None => keyhold_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            keyhold_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.log_level);

    match run(cli.command, &config).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(2),
        Err(e) => {
            eprintln!("keyhold: {e}");
            std::process::exit(1);
        }
    }
}

/// Dispatch a subcommand. `Ok(false)` means the command ran but found a problem.
async fn run(command: Commands, config: &KeyholdConfig) -> Result<bool, KeyholdError> {
    match command {
        Commands::Audit(AuditCommand::Verify(output)) => {
            let chain = audit::open_chain(&open_meta(config).await?);
            audit::run_verify(&chain, output.json).await
        }
        Commands::Audit(AuditCommand::Tail { limit, output }) => {
            let chain = audit::open_chain(&open_meta(config).await?);
            audit::run_tail(&chain, limit, output.json).await?;
            Ok(true)
        }
        Commands::Audit(AuditCommand::Purge { older_than_days }) => {
            let days = older_than_days
                .or(config.audit.retention_days)
                .ok_or_else(|| {
                    KeyholdError::Config(
                        "no --older-than-days given and audit.retention_days is unset".to_string(),
                    )
                })?;
            let chain = audit::open_chain(&open_meta(config).await?);
            audit::run_purge(&chain, days).await?;
            Ok(true)
        }
        Commands::Keys(KeysCommand::Status(output)) => {
            keys::run_status(config, output.json).await?;
            Ok(true)
        }
        Commands::Config(ConfigCommand::Check) => {
            config_check::run_check(config)?;
            Ok(true)
        }
    }
}

/// Open the metadata database, refusing to create one where none exists.
async fn open_meta(config: &KeyholdConfig) -> Result<MetaDatabase, KeyholdError> {
    let path = config.storage.meta_db_path();
    if !path.exists() {
        return Err(KeyholdError::InvalidState(format!(
            "no metadata database at {}",
            path.display()
        )));
    }
    MetaDatabase::open(&path).await
}

/// Initialize the tracing subscriber. `RUST_LOG` overrides the configured level.
fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("keyhold={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_audit_verify_json() {
        let cli = Cli::try_parse_from(["keyhold", "audit", "verify", "--json"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Audit(AuditCommand::Verify(JsonFlag { json: true }))
        ));
    }

    #[test]
    fn tail_limit_defaults_to_twenty() {
        let cli = Cli::try_parse_from(["keyhold", "audit", "tail"]).unwrap();
        match cli.command {
            Commands::Audit(AuditCommand::Tail { limit, output }) => {
                assert_eq!(limit, 20);
                assert!(!output.json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn purge_days_are_optional() {
        let cli = Cli::try_parse_from(["keyhold", "audit", "purge", "--older-than-days", "30"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Audit(AuditCommand::Purge {
                older_than_days: Some(30)
            })
        ));
        let cli = Cli::try_parse_from(["keyhold", "audit", "purge"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Audit(AuditCommand::Purge {
                older_than_days: None
            })
        ));
    }

    #[test]
    fn global_config_flag_after_subcommand() {
        let cli =
            Cli::try_parse_from(["keyhold", "keys", "status", "--config", "/tmp/k.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/k.toml")));
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Cli::try_parse_from(["keyhold"]).is_err());
        assert!(Cli::try_parse_from(["keyhold", "unlock"]).is_err());
    }

    #[tokio::test]
    async fn purge_without_window_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = KeyholdConfig::default();
        config.storage.data_dir = dir.path().display().to_string();

        let err = run(
            Commands::Audit(AuditCommand::Purge {
                older_than_days: None,
            }),
            &config,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, KeyholdError::Config(_)));
    }

    #[tokio::test]
    async fn audit_commands_refuse_missing_database() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = KeyholdConfig::default();
        config.storage.data_dir = dir.path().display().to_string();

        let err = run(
            Commands::Audit(AuditCommand::Verify(JsonFlag { json: false })),
            &config,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, KeyholdError::InvalidState(_)));
        assert!(!config.storage.meta_db_path().exists());
    }
}
