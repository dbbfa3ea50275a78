// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Charla session core.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup.

use serde::{Deserialize, Serialize};

/// Top-level Charla configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable
/// overrides. All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CharlaConfig {
    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Two-tier cache settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Idempotency ledger settings.
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Inactivity reaper settings.
    #[serde(default)]
    pub reaper: ReaperConfig,

    /// Transient-error retry settings for the store executor.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Transition-history retention settings.
    #[serde(default)]
    pub history: HistoryConfig,
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

/// Two-tier cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// TTL for cached session reads, in seconds.
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,

    /// Interval between local-tier eviction sweeps, in seconds.
    #[serde(default = "default_eviction_interval_secs")]
    pub eviction_interval_secs: u64,

    /// Timeout for shared-tier reads, in milliseconds. An unavailable shared
    /// cache degrades to the local tier after this long.
    #[serde(default = "default_shared_timeout_ms")]
    pub shared_timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl_secs(),
            eviction_interval_secs: default_eviction_interval_secs(),
            shared_timeout_ms: default_shared_timeout_ms(),
        }
    }
}

/// Idempotency ledger configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LedgerConfig {
    /// How long delivery records are retained, in seconds. A delivery id that
    /// legitimately repeats after this horizon is treated as new.
    #[serde(default = "default_ledger_retention_secs")]
    pub retention_secs: u64,

    /// Interval between retention purges, in seconds.
    #[serde(default = "default_ledger_purge_interval_secs")]
    pub purge_interval_secs: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            retention_secs: default_ledger_retention_secs(),
            purge_interval_secs: default_ledger_purge_interval_secs(),
        }
    }
}

/// Inactivity reaper configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ReaperConfig {
    /// Sessions idle longer than this many minutes are closed to
    /// `TIMEOUT_INACTIVIDAD`.
    #[serde(default = "default_inactivity_threshold_minutes")]
    pub inactivity_threshold_minutes: u64,

    /// Interval between reaper sweeps, in seconds.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            inactivity_threshold_minutes: default_inactivity_threshold_minutes(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

/// Bounded retry policy for transient store errors.
///
/// Applies only to busy/locked/I/O-class failures. Concurrency conflicts are
/// never retried by the executor.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Maximum attempts per store call (1 = no retry).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base backoff delay in milliseconds; doubles per attempt.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

/// Transition-history retention.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HistoryConfig {
    /// How long transition records are retained, in days.
    #[serde(default = "default_history_retention_days")]
    pub retention_days: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            retention_days: default_history_retention_days(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|d| d.join("charla/charla.db").display().to_string())
        .unwrap_or_else(|| "charla.db".to_string())
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_eviction_interval_secs() -> u64 {
    60
}

fn default_shared_timeout_ms() -> u64 {
    250
}

fn default_ledger_retention_secs() -> u64 {
    3_600
}

fn default_ledger_purge_interval_secs() -> u64 {
    300
}

fn default_inactivity_threshold_minutes() -> u64 {
    30
}

fn default_sweep_interval_secs() -> u64 {
    300
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    50
}

fn default_history_retention_days() -> u64 {
    90
}
