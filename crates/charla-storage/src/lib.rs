// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Charla session core.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a
//! single-writer concurrency model via `tokio-rusqlite`, typed query
//! modules for sessions, transition history, and the idempotency ledger,
//! and a bounded-retry executor for transient errors.

pub mod database;
pub mod executor;
pub mod migrations;
pub mod queries;

pub use database::Database;
pub use executor::RetryPolicy;
pub use queries::sessions::CasOutcome;
