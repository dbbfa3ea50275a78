// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration error type and rendering.
//!
//! Figment deserialization errors and post-deserialization validation
//! failures both surface as [`ConfigError`], rendered one per line for
//! startup diagnostics.

use thiserror::Error;

/// A configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A TOML/env deserialization failure reported by Figment.
    #[error("{message}")]
    Parse { message: String },

    /// A semantic constraint violation found after deserialization.
    #[error("{message}")]
    Validation { message: String },
}

/// Convert a Figment error (which may aggregate several failures) into
/// individual [`ConfigError`]s.
pub fn figment_to_config_errors(err: figment::Error) -> Vec<ConfigError> {
    err.into_iter()
        .map(|e| ConfigError::Parse {
            message: e.to_string(),
        })
        .collect()
}

/// Render a list of config errors for startup output, one per line.
pub fn render_errors(errors: &[ConfigError]) -> String {
    errors
        .iter()
        .map(|e| format!("config error: {e}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_joins_with_newlines() {
        let errors = vec![
            ConfigError::Validation {
                message: "first".into(),
            },
            ConfigError::Validation {
                message: "second".into(),
            },
        ];
        let rendered = render_errors(&errors);
        assert_eq!(rendered, "config error: first\nconfig error: second");
    }
}
