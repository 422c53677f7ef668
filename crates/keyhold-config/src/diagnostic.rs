// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Config errors as miette diagnostics.
//!
//! Figment reports which key failed and in which file. This module points a
//! label at that key inside the TOML source and, for unknown keys, offers the
//! closest valid name (Jaro-Winkler).

#![allow(unused_assignments)] // miette's Diagnostic derive generates code triggering this lint

use figment::error::Kind;
use miette::{Diagnostic, GraphicalReportHandler, NamedSource, SourceSpan};
use thiserror::Error;

/// Below this Jaro-Winkler score a suggestion is noise, not a typo fix.
const SUGGESTION_THRESHOLD: f64 = 0.75;

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("unknown configuration key `{key}`")]
    #[diagnostic(code(keyhold::config::unknown_key), help("{}", unknown_key_help(suggestion.as_deref(), expected_keys)))]
    UnknownKey {
        key: String,
        /// Closest valid key, if any is close enough.
        suggestion: Option<String>,
        /// Keys accepted at this position, comma separated.
        expected_keys: String,
        #[label("not a keyhold setting")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("`{key}` has the wrong type: found {found}")]
    #[diagnostic(code(keyhold::config::invalid_type), help("expected {expected}"))]
    InvalidType {
        key: String,
        found: String,
        expected: String,
        #[label("wrong type")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("missing required key `{key}`")]
    #[diagnostic(code(keyhold::config::missing_key))]
    MissingKey { key: String },

    /// Parsed fine, but outside the allowed range.
    #[error("invalid value for `{key}`: {message}")]
    #[diagnostic(code(keyhold::config::validation))]
    Validation { key: String, message: String },

    #[error("configuration error: {0}")]
    #[diagnostic(code(keyhold::config::other))]
    Other(String),
}

impl ConfigError {
    pub fn validation(key: &str, message: impl Into<String>) -> Self {
        ConfigError::Validation {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

fn unknown_key_help(suggestion: Option<&str>, expected_keys: &str) -> String {
    match suggestion {
        Some(s) => format!("did you mean `{s}`? Expected one of: {expected_keys}"),
        None => format!("expected one of: {expected_keys}"),
    }
}

/// Label position inside one TOML source.
#[derive(Default)]
struct Located {
    span: Option<SourceSpan>,
    src: Option<NamedSource<String>>,
}

/// Convert every error held by `err` into a diagnostic.
///
/// `sources` pairs a file name with its contents. Errors that carry no file
/// name resolve against the first source declaring the key.
pub fn figment_to_config_errors(
    err: figment::Error,
    sources: &[(String, String)],
) -> Vec<ConfigError> {
    err.into_iter()
        .map(|error| {
            let mut path: Vec<String> = error.path.iter().map(ToString::to_string).collect();
            match &error.kind {
                Kind::UnknownField(field, expected) => {
                    // Figment's path ends with the unknown key itself.
                    if path.last() == Some(field) {
                        path.pop();
                    }
                    let located = locate(&error, &path, field, sources);
                    ConfigError::UnknownKey {
                        key: field.clone(),
                        suggestion: suggest_key(field, expected),
                        expected_keys: expected.join(", "),
                        span: located.span,
                        src: located.src,
                    }
                }
                Kind::InvalidType(found, expected) => {
                    let dotted = path.join(".");
                    let field = path.pop().unwrap_or_default();
                    let located = locate(&error, &path, &field, sources);
                    ConfigError::InvalidType {
                        key: dotted,
                        found: found.to_string(),
                        expected: expected.clone(),
                        span: located.span,
                        src: located.src,
                    }
                }
                Kind::MissingField(field) => ConfigError::MissingKey {
                    key: field.to_string(),
                },
                _ => ConfigError::Other(error.to_string()),
            }
        })
        .collect()
}

fn locate(
    error: &figment::error::Error,
    table: &[String],
    field: &str,
    sources: &[(String, String)],
) -> Located {
    let file = error
        .metadata
        .as_ref()
        .and_then(|m| m.source.as_ref())
        .and_then(|source| match source {
            figment::Source::File(path) => Some(path.display().to_string()),
            _ => None,
        });
    // A merged table can carry the metadata of another provider (the
    // defaults), so without a file name every source is searched.
    let found = sources
        .iter()
        .filter(|(name, _)| file.as_ref().is_none_or(|file| name == file))
        .find_map(|(name, content)| {
            find_key_offset(content, table, field).map(|offset| (name, content, offset))
        });
    match found {
        Some((name, content, offset)) => Located {
            span: Some(SourceSpan::new(offset.into(), field.len())),
            src: Some(NamedSource::new(name, content.clone())),
        },
        None => Located::default(),
    }
}

/// Byte offset of `field` declared directly in table `table` of `content`.
///
/// An empty `table` means the root table, before any `[header]`. Only plain
/// `[a.b]` headers are tracked; keys inside arrays of tables are not found.
pub fn find_key_offset(content: &str, table: &[String], field: &str) -> Option<usize> {
    let wanted = table.join(".");
    let mut current = String::new();
    let mut offset = 0;

    for line in content.split_inclusive('\n') {
        let start = offset;
        offset += line.len();
        let indent = line.len() - line.trim_start().len();
        let text = line.trim();

        if let Some(header) = text.strip_prefix('[').and_then(|h| h.split(']').next()) {
            current = header.split('.').map(str::trim).collect::<Vec<_>>().join(".");
            continue;
        }
        if current != wanted {
            continue;
        }
        let Some((key, _)) = text.split_once('=') else {
            continue;
        };
        if key.trim().trim_matches('"') == field {
            let key_start = text.find(field).unwrap_or(0);
            return Some(start + indent + key_start);
        }
    }
    None
}

/// The valid key most similar to `unknown`, if any passes the threshold.
pub fn suggest_key<S: AsRef<str>>(unknown: &str, valid_keys: &[S]) -> Option<String> {
    valid_keys
        .iter()
        .map(|key| (strsim::jaro_winkler(unknown, key.as_ref()), key.as_ref()))
        .filter(|(score, _)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, key)| key.to_string())
}

/// Print each diagnostic to stderr with miette's graphical renderer.
pub fn render_errors(errors: &[ConfigError]) {
    let handler = GraphicalReportHandler::new();
    for error in errors {
        let mut rendered = String::new();
        match handler.render_report(&mut rendered, error) {
            Ok(()) => eprint!("{rendered}"),
            Err(_) => eprintln!("keyhold: {error}"),
        }
    }
}
