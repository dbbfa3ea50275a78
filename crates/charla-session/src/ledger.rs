// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Duplicate-delivery detection over the durable ledger.
//!
//! The ledger is the sole authority on duplicates: workers share no memory,
//! so in-process dedup cannot work. When the ledger itself is unavailable
//! the check fails open, because dropping a user-visible message is worse
//! than reprocessing one.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error};

use charla_core::{CharlaError, Clock, DeliveryReceipt};
use charla_storage::{queries, Database};

/// Facade over the `idempotency_ledger` table.
pub struct IdempotencyLedger {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
    retention: Duration,
}

impl IdempotencyLedger {
    pub fn new(db: Arc<Database>, clock: Arc<dyn Clock>, retention: Duration) -> Self {
        Self {
            db,
            clock,
            retention,
        }
    }

    /// Register one inbound delivery.
    ///
    /// The underlying upsert is a single indivisible statement, so two
    /// concurrent deliveries of the same id cannot both observe "absent".
    ///
    /// A missing or empty `delivery_id` is not an error: the provider does
    /// not guarantee an id on every delivery, so the delivery is reported as
    /// new and the ledger is not written.
    ///
    /// Ledger write failures fail open: the delivery is reported as new and
    /// the outage is logged as a degraded-mode event, never silently
    /// swallowed.
    pub async fn register_delivery(
        &self,
        delivery_id: Option<&str>,
        owner_id: &str,
    ) -> Result<DeliveryReceipt, CharlaError> {
        let now = self.clock.now();
        let Some(delivery_id) = delivery_id.filter(|id| !id.is_empty()) else {
            debug!(owner_id, "delivery without id; skipping ledger");
            return Ok(DeliveryReceipt {
                is_duplicate: false,
                retry_count: 0,
                first_seen: now,
            });
        };

        // No transient retry: one attempt, then degrade. A retry storm on a
        // struggling store would delay the user-visible message it guards.
        match queries::ledger::register(&self.db, delivery_id, owner_id, now).await {
            Ok(row) => Ok(DeliveryReceipt {
                is_duplicate: row.retry_count > 0,
                retry_count: row.retry_count,
                first_seen: row.first_seen,
            }),
            Err(e) => {
                let degraded = CharlaError::LedgerUnavailable {
                    source: Box::new(e),
                };
                error!(
                    delivery_id,
                    owner_id,
                    error = %degraded,
                    "failing open: duplicate detection disabled for this delivery"
                );
                Ok(DeliveryReceipt {
                    is_duplicate: false,
                    retry_count: 0,
                    first_seen: now,
                })
            }
        }
    }

    /// Purge ledger rows past the retention horizon. Returns rows removed.
    ///
    /// A delivery id that legitimately repeats after the horizon is treated
    /// as new; that trade-off is accepted and documented.
    pub async fn purge_expired(&self) -> Result<usize, CharlaError> {
        let horizon = chrono::Duration::from_std(self.retention)
            .map_err(|e| CharlaError::Internal(format!("ledger retention out of range: {e}")))?;
        let cutoff = self.clock.now() - horizon;
        queries::ledger::purge_older_than(&self.db, cutoff).await
    }
}
