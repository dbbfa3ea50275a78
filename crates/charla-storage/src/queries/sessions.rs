// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session row operations: implicit race-safe creation, the compare-and-set
//! update protocol, activity touches, and the reaper's candidate scan.
//!
//! Every mutation here runs inside one `conn.call` on the single writer
//! thread, so each operation is atomic with respect to every other store
//! caller. The CAS update additionally guards with `WHERE version = ?` so
//! correctness holds even if another process writes the same file.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use strum::IntoEnumIterator;

use charla_core::clock::{from_db_timestamp, to_db_timestamp};
use charla_core::{CharlaError, Origin, Session, SessionState};

use crate::database::Database;

const SESSION_COLUMNS: &str =
    "id, state, payload, equipment_ref, version, last_activity, message_count, created_at";

/// Outcome of a conditional update, reported without in-closure error
/// gymnastics; the caller maps `VersionMismatch` to a conflict error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    /// The update applied; the row now carries `new_version`.
    Applied { new_version: i64 },
    /// The expected version no longer matches; nothing was written.
    VersionMismatch { current_version: i64 },
    /// No row exists for this id.
    NotFound,
}

/// Fetch the session for `id`, creating it in the initial state if absent.
///
/// Creation is insert-if-absent at the store level (`INSERT OR IGNORE`
/// followed by the read, in one writer-thread call), not a read-then-insert
/// race in application code.
pub async fn get_or_create(
    db: &Database,
    id: &str,
    now: DateTime<Utc>,
) -> Result<Session, CharlaError> {
    let id = id.to_string();
    let now = to_db_timestamp(now);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO sessions (id, state, last_activity, created_at)
                 VALUES (?1, ?2, ?3, ?3)",
                params![id, SessionState::INITIAL.to_string(), now],
            )?;
            let session = conn.query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"),
                params![id],
                row_to_session,
            )?;
            Ok(session)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Apply one state transition as a single atomic unit.
///
/// Protocol: read current version and state; abort on an expected-version
/// mismatch with no mutation; force the payload (and equipment ref) to NULL
/// when the target state clears; bump the version by exactly 1; append the
/// history row capturing the previous state. If the guarded UPDATE affects
/// zero rows the history append does not happen.
#[allow(clippy::too_many_arguments)]
pub async fn cas_update(
    db: &Database,
    id: &str,
    new_state: SessionState,
    payload: Option<serde_json::Value>,
    origin: Origin,
    reason: &str,
    expected_version: Option<i64>,
    now: DateTime<Utc>,
) -> Result<CasOutcome, CharlaError> {
    let id = id.to_string();
    let reason = reason.to_string();
    let now = to_db_timestamp(now);
    // The data-clearing invariant: terminal and initial states never retain
    // report data, regardless of what the caller passed.
    let payload_json = if new_state.clears_payload() {
        None
    } else {
        payload
            .map(|v| serde_json::to_string(&v))
            .transpose()
            .map_err(|e| CharlaError::Storage {
                source: Box::new(e),
            })?
    };

    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;

            let current: Option<(i64, String)> = tx
                .query_row(
                    "SELECT version, state FROM sessions WHERE id = ?1",
                    params![id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let Some((current_version, previous_state)) = current else {
                return Ok(CasOutcome::NotFound);
            };

            if let Some(expected) = expected_version
                && expected != current_version
            {
                // No mutation on mismatch; the transaction holds no writes yet.
                return Ok(CasOutcome::VersionMismatch { current_version });
            }

            let rows = if new_state.clears_payload() {
                tx.execute(
                    "UPDATE sessions SET state = ?1, payload = NULL, equipment_ref = NULL,
                     version = version + 1, last_activity = ?2
                     WHERE id = ?3 AND version = ?4",
                    params![new_state.to_string(), now, id, current_version],
                )?
            } else {
                tx.execute(
                    "UPDATE sessions SET state = ?1, payload = ?2,
                     version = version + 1, last_activity = ?3
                     WHERE id = ?4 AND version = ?5",
                    params![new_state.to_string(), payload_json, now, id, current_version],
                )?
            };

            if rows == 0 {
                return Ok(CasOutcome::VersionMismatch { current_version });
            }

            tx.execute(
                "INSERT INTO session_history
                 (session_id, previous_state, new_state, origin, reason, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id,
                    previous_state,
                    new_state.to_string(),
                    origin.to_string(),
                    reason,
                    now
                ],
            )?;

            tx.commit()?;
            Ok(CasOutcome::Applied {
                new_version: current_version + 1,
            })
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Touch `last_activity` and count one inbound user message.
///
/// A touch is not a mutation in the optimistic-concurrency sense: the
/// version is untouched, so activity recording can never make a racing
/// state update conflict.
pub async fn touch(db: &Database, id: &str, now: DateTime<Utc>) -> Result<bool, CharlaError> {
    let id = id.to_string();
    let now = to_db_timestamp(now);
    db.connection()
        .call(move |conn| {
            let rows = conn.execute(
                "UPDATE sessions SET last_activity = ?1, message_count = message_count + 1
                 WHERE id = ?2",
                params![now, id],
            )?;
            Ok(rows > 0)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Best-effort equipment reference update (last-writer-wins, no version
/// bump, no history). Cleared automatically whenever a transition clears
/// the payload.
pub async fn set_equipment_ref(
    db: &Database,
    id: &str,
    equipment_ref: Option<String>,
) -> Result<bool, CharlaError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let rows = conn.execute(
                "UPDATE sessions SET equipment_ref = ?1 WHERE id = ?2",
                params![equipment_ref, id],
            )?;
            Ok(rows > 0)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Non-terminal sessions idle since before `cutoff`, with their current
/// versions for the reaper's CAS close attempts.
pub async fn list_expired(
    db: &Database,
    cutoff: DateTime<Utc>,
) -> Result<Vec<(String, i64)>, CharlaError> {
    let cutoff = to_db_timestamp(cutoff);
    let states = non_terminal_state_list();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT id, version FROM sessions
                 WHERE state IN ({states}) AND last_activity < ?1
                 ORDER BY last_activity ASC"
            ))?;
            let rows = stmt
                .query_map(params![cutoff], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// All non-terminal sessions, most recently active first.
pub async fn list_active(db: &Database) -> Result<Vec<Session>, CharlaError> {
    let states = non_terminal_state_list();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM sessions
                 WHERE state IN ({states})
                 ORDER BY last_activity DESC"
            ))?;
            let rows = stmt
                .query_map([], row_to_session)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Quoted, comma-separated non-terminal state names for `IN (...)` clauses.
/// Values come from the closed enum, never from caller input.
fn non_terminal_state_list() -> String {
    SessionState::iter()
        .filter(|s| !s.is_terminal())
        .map(|s| format!("'{s}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
    let state_str: String = row.get(1)?;
    let state = SessionState::parse(&state_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let payload_str: Option<String> = row.get(2)?;
    let payload = payload_str
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
        })?;
    Ok(Session {
        id: row.get(0)?,
        state,
        payload,
        equipment_ref: row.get(3)?,
        version: row.get(4)?,
        last_activity: ts_col(row, 5)?,
        message_count: row.get(6)?,
        created_at: ts_col(row, 7)?,
    })
}

pub(crate) fn ts_col(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    from_db_timestamp(&s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}
