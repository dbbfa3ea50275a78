// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inactivity reaper: closes idle sessions through the same CAS protocol
//! every other writer uses.
//!
//! A conflict during the close attempt means the user became active between
//! the scan and the write. That is not an error: the session is skipped and
//! will either not match the next sweep or be swept again once it goes idle.
//! Waiting for the next scheduled sweep is the reaper's only retry policy.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use charla_core::{CharlaError, Clock, Origin, SessionState};
use charla_storage::{queries, Database, RetryPolicy};

use crate::controller::UpdateController;

pub struct InactivityReaper {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
    controller: Arc<UpdateController>,
    retry: RetryPolicy,
}

impl InactivityReaper {
    pub fn new(
        db: Arc<Database>,
        clock: Arc<dyn Clock>,
        controller: Arc<UpdateController>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            db,
            clock,
            controller,
            retry,
        }
    }

    /// Close every non-terminal session idle longer than `threshold`.
    /// Returns the number actually closed.
    ///
    /// Candidates are read together with their current versions, and each
    /// close is a CAS against that version, so a session that becomes
    /// active mid-sweep is left alone.
    pub async fn sweep(&self, threshold: Duration) -> Result<usize, CharlaError> {
        let horizon = chrono::Duration::from_std(threshold)
            .map_err(|e| CharlaError::Internal(format!("sweep threshold out of range: {e}")))?;
        let cutoff = self.clock.now() - horizon;

        let candidates = self
            .retry
            .run(|| queries::sessions::list_expired(&self.db, cutoff))
            .await?;

        let mut closed = 0;
        for (id, version) in candidates {
            let result = self
                .controller
                .update(
                    &id,
                    SessionState::TimeoutInactividad,
                    None,
                    Origin::Timer,
                    "inactivity timeout",
                    Some(version),
                )
                .await;
            match result {
                Ok(()) => closed += 1,
                Err(e) if e.is_conflict() => {
                    debug!(id, version, "session became active mid-sweep; skipping");
                }
                Err(e) => {
                    // One bad row must not abort the whole sweep.
                    warn!(id, error = %e, "failed to close idle session; continuing sweep");
                }
            }
        }

        if closed > 0 {
            info!(closed, threshold_secs = threshold.as_secs(), "inactivity sweep closed sessions");
        }
        Ok(closed)
    }
}
