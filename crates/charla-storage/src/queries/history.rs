// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transition-history reads and retention.
//!
//! Rows are appended only inside the CAS update transaction
//! (see [`queries::sessions`](crate::queries::sessions)); this module
//! never inserts.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::params;

use charla_core::clock::to_db_timestamp;
use charla_core::{CharlaError, Origin, TransitionRecord};

use crate::database::Database;
use crate::queries::sessions::ts_col;

/// Most recent transitions for one session, newest first.
pub async fn list_for_session(
    db: &Database,
    session_id: &str,
    limit: u32,
) -> Result<Vec<TransitionRecord>, CharlaError> {
    let session_id = session_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, previous_state, new_state, origin, reason, created_at
                 FROM session_history
                 WHERE session_id = ?1
                 ORDER BY id DESC
                 LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![session_id, limit], row_to_record)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Delete transition records older than `cutoff`. Returns rows removed.
pub async fn purge_older_than(db: &Database, cutoff: DateTime<Utc>) -> Result<usize, CharlaError> {
    let cutoff = to_db_timestamp(cutoff);
    db.connection()
        .call(move |conn| {
            let rows = conn.execute(
                "DELETE FROM session_history WHERE created_at < ?1",
                params![cutoff],
            )?;
            Ok(rows)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<TransitionRecord> {
    let previous: String = row.get(2)?;
    let new: String = row.get(3)?;
    let origin_str: String = row.get(4)?;
    let conv = |idx: usize, e: CharlaError| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    };
    Ok(TransitionRecord {
        id: row.get(0)?,
        session_id: row.get(1)?,
        previous_state: charla_core::SessionState::parse(&previous).map_err(|e| conv(2, e))?,
        new_state: charla_core::SessionState::parse(&new).map_err(|e| conv(3, e))?,
        origin: Origin::from_str(&origin_str).map_err(|_| {
            conv(
                4,
                CharlaError::Internal(format!("unknown transition origin: {origin_str}")),
            )
        })?,
        reason: row.get(5)?,
        created_at: ts_col(row, 6)?,
    })
}
