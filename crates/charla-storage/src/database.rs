// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background
//! thread. Do NOT create additional Connection instances for writes: the
//! single writer is what makes every `conn.call` an atomic unit with respect
//! to other in-process callers and eliminates SQLITE_BUSY under concurrency.

use std::path::Path;

use charla_core::CharlaError;
use tokio_rusqlite::Connection;
use tracing::{debug, info};

use crate::migrations;

/// Handle to the SQLite store.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (creating if needed) the database at `path`, apply PRAGMAs, and
    /// run all pending migrations.
    pub async fn open(path: &str) -> Result<Database, CharlaError> {
        Self::open_with_busy_timeout(path, 5_000).await
    }

    /// [`Database::open`] with an explicit SQLite busy timeout.
    pub async fn open_with_busy_timeout(
        path: &str,
        busy_timeout_ms: u64,
    ) -> Result<Database, CharlaError> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| CharlaError::Storage {
                source: Box::new(e),
            })?;
        }

        let conn = Connection::open(path).await.map_err(map_tr_err)?;

        conn.call(move |conn| {
            conn.execute_batch(&format!(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = {busy_timeout_ms};"
            ))?;
            migrations::run_migrations(conn)
                .map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        info!(path, "database opened");
        Ok(Database { conn })
    }

    /// The underlying tokio-rusqlite connection (the single writer).
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Verify the store answers queries.
    pub async fn health_check(&self) -> Result<(), CharlaError> {
        self.conn
            .call(|conn| {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Checkpoint the WAL and close the connection.
    pub async fn close(self) -> Result<(), CharlaError> {
        self.conn
            .call(|conn| {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        self.conn.close().await.map_err(map_tr_err)?;
        debug!("database closed");
        Ok(())
    }
}

/// Map a tokio-rusqlite error into the core error type.
pub fn map_tr_err(e: tokio_rusqlite::Error) -> CharlaError {
    CharlaError::Storage {
        source: Box::new(e),
    }
}
