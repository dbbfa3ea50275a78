// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Charla session core.

use thiserror::Error;

/// The primary error type used across the Charla session core.
#[derive(Debug, Error)]
pub enum CharlaError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    ///
    /// Transient variants of this (busy/locked/I/O) are retried by the storage
    /// executor before they surface here.
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A conditional update lost the compare-and-set race.
    ///
    /// Expected and recoverable: the caller re-reads the session and decides
    /// whether its business logic still applies to the new state. Never
    /// retried inside the core.
    #[error("concurrent update conflict on session {session_id} (expected version {expected_version})")]
    ConcurrencyConflict {
        session_id: String,
        expected_version: i64,
    },

    /// A requested state is outside the closed conversation-state enum.
    ///
    /// Rejected before any store I/O; no mutation is attempted.
    #[error("invalid session state: {state}")]
    InvalidStateTransition { state: String },

    /// The idempotency ledger could not be written.
    ///
    /// Triggers fail-open duplicate detection: the delivery is processed as
    /// if it were new, and the outage is logged as a degraded-mode event.
    #[error("idempotency ledger unavailable: {source}")]
    LedgerUnavailable {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CharlaError {
    /// Whether this error is the expected CAS-race outcome rather than a fault.
    pub fn is_conflict(&self) -> bool {
        matches!(self, CharlaError::ConcurrencyConflict { .. })
    }
}
