// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The optimistic-concurrency update protocol.
//!
//! The controller performs no in-process locking: correctness rests
//! entirely on the store's atomic compare-and-set. Of two concurrent calls
//! with the same expected version, exactly one succeeds; the other receives
//! [`CharlaError::ConcurrencyConflict`] and must re-read before deciding
//! whether its business logic still applies. Conflicts are never retried
//! here.

use std::sync::Arc;

use tracing::debug;

use charla_cache::CacheLayer;
use charla_core::{CharlaError, Clock, Origin, Session, SessionState};
use charla_storage::{queries, CasOutcome, Database, RetryPolicy};

use crate::store::cache_key;

/// Commits state transitions through the store's CAS and keeps the cache
/// honest around them.
pub struct UpdateController {
    db: Arc<Database>,
    cache: Arc<CacheLayer<Session>>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl UpdateController {
    pub fn new(
        db: Arc<Database>,
        cache: Arc<CacheLayer<Session>>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            db,
            cache,
            clock,
            retry,
        }
    }

    /// Apply one state transition.
    ///
    /// With `expected_version` set, this is a compare-and-set: a mismatch
    /// aborts with [`CharlaError::ConcurrencyConflict`] and no mutation.
    /// With `expected_version = None` the update is unconditional (last
    /// writer wins). That mode exists for callers that do not need race
    /// protection, such as best-effort background metadata updates; it is
    /// NOT equally safe and must not be used on racing paths.
    ///
    /// On every outcome the cache entry for `id` is invalidated, so the next
    /// read is forced to the store: the cache must never serve a value known
    /// to be stale relative to a just-attempted write.
    pub async fn update(
        &self,
        id: &str,
        new_state: SessionState,
        payload: Option<serde_json::Value>,
        origin: Origin,
        reason: &str,
        expected_version: Option<i64>,
    ) -> Result<(), CharlaError> {
        let now = self.clock.now();
        let result = self
            .retry
            .run(|| {
                queries::sessions::cas_update(
                    &self.db,
                    id,
                    new_state,
                    payload.clone(),
                    origin,
                    reason,
                    expected_version,
                    now,
                )
            })
            .await;

        // Invalidate-before-return on success AND failure; a transient
        // failure may have half-happened in another process's view.
        self.cache.invalidate(&cache_key(id)).await;

        match result? {
            CasOutcome::Applied { new_version } => {
                debug!(id, state = %new_state, new_version, %origin, "session transition applied");
                Ok(())
            }
            CasOutcome::VersionMismatch { current_version } => {
                debug!(
                    id,
                    current_version,
                    expected = expected_version.unwrap_or(-1),
                    "session transition lost the CAS race"
                );
                Err(CharlaError::ConcurrencyConflict {
                    session_id: id.to_string(),
                    expected_version: expected_version.unwrap_or(current_version),
                })
            }
            CasOutcome::NotFound => Err(CharlaError::Internal(format!(
                "session {id} does not exist; reads create sessions implicitly, \
                 so an update without a prior read is a caller bug"
            ))),
        }
    }
}
