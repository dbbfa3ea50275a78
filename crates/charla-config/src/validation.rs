// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as non-zero TTLs and a purge interval that fits inside
//! the retention horizon.

use crate::diagnostic::ConfigError;
use crate::model::CharlaConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &CharlaConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty".to_string(),
        });
    }

    if config.cache.ttl_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "cache.ttl_secs must be at least 1 (a zero TTL makes every read a miss)"
                .to_string(),
        });
    }

    if config.cache.eviction_interval_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "cache.eviction_interval_secs must be at least 1".to_string(),
        });
    }

    if config.ledger.retention_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "ledger.retention_secs must be at least 1 (a zero horizon disables \
                      duplicate detection entirely)"
                .to_string(),
        });
    }

    if config.ledger.purge_interval_secs > config.ledger.retention_secs {
        errors.push(ConfigError::Validation {
            message: format!(
                "ledger.purge_interval_secs ({}) must not exceed ledger.retention_secs ({})",
                config.ledger.purge_interval_secs, config.ledger.retention_secs
            ),
        });
    }

    if config.reaper.inactivity_threshold_minutes == 0 {
        errors.push(ConfigError::Validation {
            message: "reaper.inactivity_threshold_minutes must be at least 1".to_string(),
        });
    }

    if config.retry.max_attempts == 0 {
        errors.push(ConfigError::Validation {
            message: "retry.max_attempts must be at least 1 (1 means no retry)".to_string(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
