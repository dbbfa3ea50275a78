// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Idempotency ledger operations.
//!
//! Duplicate detection must be one indivisible storage operation: a
//! read-then-write implementation would let two concurrent deliveries of the
//! same id both observe "absent". The upsert below inserts or increments in
//! a single statement and reads back the resulting counter via `RETURNING`.

use chrono::{DateTime, Utc};
use rusqlite::params;

use charla_core::clock::{from_db_timestamp, to_db_timestamp};
use charla_core::CharlaError;

use crate::database::Database;

/// Outcome of one ledger upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerRow {
    pub retry_count: i64,
    pub first_seen: DateTime<Utc>,
}

/// Register one delivery atomically: insert with `retry_count = 0` if
/// absent, otherwise increment the counter and refresh `last_seen`.
pub async fn register(
    db: &Database,
    delivery_id: &str,
    owner_id: &str,
    now: DateTime<Utc>,
) -> Result<LedgerRow, CharlaError> {
    let delivery_id = delivery_id.to_string();
    let owner_id = owner_id.to_string();
    let now = to_db_timestamp(now);
    db.connection()
        .call(move |conn| {
            let (retry_count, first_seen): (i64, String) = conn.query_row(
                "INSERT INTO idempotency_ledger
                 (delivery_id, owner_id, retry_count, first_seen, last_seen)
                 VALUES (?1, ?2, 0, ?3, ?3)
                 ON CONFLICT(delivery_id) DO UPDATE SET
                     retry_count = retry_count + 1,
                     last_seen = excluded.last_seen
                 RETURNING retry_count, first_seen",
                params![delivery_id, owner_id, now],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            Ok((retry_count, first_seen))
        })
        .await
        .map_err(crate::database::map_tr_err)
        .and_then(|(retry_count, first_seen)| {
            Ok(LedgerRow {
                retry_count,
                first_seen: from_db_timestamp(&first_seen).map_err(|e| CharlaError::Storage {
                    source: Box::new(e),
                })?,
            })
        })
}

/// Delete ledger rows first seen before `cutoff`. Returns rows removed.
///
/// Runs on the same single writer thread as active upserts, so the purge
/// can never interleave with one.
pub async fn purge_older_than(db: &Database, cutoff: DateTime<Utc>) -> Result<usize, CharlaError> {
    let cutoff = to_db_timestamp(cutoff);
    db.connection()
        .call(move |conn| {
            let rows = conn.execute(
                "DELETE FROM idempotency_ledger WHERE first_seen < ?1",
                params![cutoff],
            )?;
            Ok(rows)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 30, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn first_registration_starts_at_zero() {
        let (db, _dir) = setup_db().await;
        let row = register(&db, "wamid.A", "+521234", t0()).await.unwrap();
        assert_eq!(row.retry_count, 0);
        assert_eq!(row.first_seen, t0());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn repeats_increment_strictly_and_keep_first_seen() {
        let (db, _dir) = setup_db().await;
        register(&db, "wamid.A", "+521234", t0()).await.unwrap();

        let later = t0() + chrono::Duration::seconds(10);
        let second = register(&db, "wamid.A", "+521234", later).await.unwrap();
        assert_eq!(second.retry_count, 1);
        assert_eq!(second.first_seen, t0());

        let third = register(&db, "wamid.A", "+521234", later).await.unwrap();
        assert_eq!(third.retry_count, 2);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn distinct_delivery_ids_are_independent() {
        let (db, _dir) = setup_db().await;
        register(&db, "wamid.A", "+521234", t0()).await.unwrap();
        let other = register(&db, "wamid.B", "+521234", t0()).await.unwrap();
        assert_eq!(other.retry_count, 0);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_registrations_count_every_delivery() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("concurrent.db");
        let db = std::sync::Arc::new(Database::open(db_path.to_str().unwrap()).await.unwrap());

        let mut handles = Vec::new();
        for _ in 0..10 {
            let db = db.clone();
            handles.push(tokio::spawn(async move {
                register(&db, "wamid.X", "+521234", t0()).await
            }));
        }

        let mut counts = Vec::new();
        for handle in handles {
            counts.push(handle.await.unwrap().unwrap().retry_count);
        }
        counts.sort_unstable();

        // Exactly one observed "first", and every repeat got a distinct count.
        assert_eq!(counts, (0..10).collect::<Vec<i64>>());

        std::sync::Arc::try_unwrap(db).ok().unwrap().close().await.unwrap();
    }

    #[tokio::test]
    async fn purge_honors_the_retention_horizon() {
        let (db, _dir) = setup_db().await;
        register(&db, "wamid.old", "+521234", t0() - chrono::Duration::hours(2))
            .await
            .unwrap();
        register(&db, "wamid.new", "+521234", t0()).await.unwrap();

        let removed = purge_older_than(&db, t0() - chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(removed, 1);

        // A purged id repeating is treated as new.
        let row = register(&db, "wamid.old", "+521234", t0()).await.unwrap();
        assert_eq!(row.retry_count, 0);

        db.close().await.unwrap();
    }
}
