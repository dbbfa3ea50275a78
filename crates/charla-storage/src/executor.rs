// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded-retry executor for transient store errors.
//!
//! Network-blip-class failures (SQLITE_BUSY, SQLITE_LOCKED) are retried with
//! exponential backoff up to a configured attempt budget. Everything else
//! propagates on the first attempt: concurrency conflicts in particular are
//! a business outcome, never retried here.

use std::time::Duration;

use charla_config::model::RetryConfig;
use charla_core::CharlaError;
use tracing::warn;

/// Retry budget and backoff base for one store call.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        // An attempt budget of zero would make every call fail vacuously.
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.base_delay_ms),
        )
    }

    /// No retries, for callers that handle degradation themselves (the
    /// idempotency ledger's fail-open path).
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Run `op`, retrying transient failures with doubling backoff.
    pub async fn run<T, F, Fut>(&self, op: F) -> Result<T, CharlaError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, CharlaError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.max_attempts && is_transient(&err) => {
                    let delay = self.base_delay * 2u32.saturating_pow(attempt - 1);
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient store error; retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Whether `err` is a busy/locked-class failure worth retrying.
pub fn is_transient(err: &CharlaError) -> bool {
    let CharlaError::Storage { source } = err else {
        return false;
    };
    let Some(tr) = source.downcast_ref::<tokio_rusqlite::Error>() else {
        return false;
    };
    match tr {
        tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(e, _)) => matches!(
            e.code,
            rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
        ),
        _ => false,
    }
}
