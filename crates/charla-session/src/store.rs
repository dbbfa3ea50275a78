// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cached session reads and activity recording.
//!
//! The store composes a [`CacheLayer`] around the relational rows (cache
//! composed in, never inherited). The store is the only component that
//! writes session rows into the cache, and it does so strictly after a
//! confirmed store read, so the cache can never hold a value that was not
//! durably committed.

use std::sync::Arc;

use tracing::debug;

use charla_cache::CacheLayer;
use charla_core::{CharlaError, Clock, Session};
use charla_storage::{queries, Database, RetryPolicy};

/// Cache key prefix for session entries.
pub(crate) const CACHE_PREFIX: &str = "session:";

pub(crate) fn cache_key(id: &str) -> String {
    format!("{CACHE_PREFIX}{id}")
}

/// Versioned session reads over the relational store, cache-first.
pub struct SessionStore {
    db: Arc<Database>,
    cache: Arc<CacheLayer<Session>>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl SessionStore {
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

    /// Fetch the session for `id`, creating it lazily on first contact.
    ///
    /// With `force_fresh = false` the cache is consulted first. Any store
    /// read refreshes the cache entry. Callers that intend to mutate
    /// immediately afterward must use [`SessionStore::get_with_version`]
    /// instead: a cached read may carry a stale version.
    pub async fn get(&self, id: &str, force_fresh: bool) -> Result<Session, CharlaError> {
        if !force_fresh
            && let Some(session) = self.cache.get(&cache_key(id)).await
        {
            debug!(id, "session cache hit");
            return Ok(session);
        }
        self.read_through(id).await
    }

    /// Fetch directly from the store, bypassing the cache, for callers that
    /// will pass the returned `version` as an expected version. This is what
    /// makes read-your-writes hold within one logical request.
    pub async fn get_with_version(&self, id: &str) -> Result<Session, CharlaError> {
        self.read_through(id).await
    }

    /// Touch `last_activity` and count one inbound user message.
    ///
    /// Does not bump the version: activity recording must never make a
    /// racing state update conflict. The session is created if absent, the
    /// same as any other first contact.
    pub async fn record_activity(&self, id: &str) -> Result<(), CharlaError> {
        let result = self.touch_creating(id).await;
        // Invalidate on success (the cached copy carries a stale activity
        // timestamp) and on failure (the write may have half-happened).
        self.cache.invalidate(&cache_key(id)).await;
        result
    }

    async fn touch_creating(&self, id: &str) -> Result<(), CharlaError> {
        let now = self.clock.now();
        let touched = self
            .retry
            .run(|| queries::sessions::touch(&self.db, id, now))
            .await?;
        if !touched {
            self.retry
                .run(|| queries::sessions::get_or_create(&self.db, id, now))
                .await?;
            self.retry
                .run(|| queries::sessions::touch(&self.db, id, now))
                .await?;
        }
        Ok(())
    }

    /// Best-effort equipment reference update (last-writer-wins metadata;
    /// not protected by the version token).
    pub async fn set_equipment_ref(
        &self,
        id: &str,
        equipment_ref: Option<String>,
    ) -> Result<(), CharlaError> {
        self.retry
            .run(|| queries::sessions::set_equipment_ref(&self.db, id, equipment_ref.clone()))
            .await?;
        self.cache.invalidate(&cache_key(id)).await;
        Ok(())
    }

    /// All non-terminal sessions, most recently active first. Operational
    /// listing; always store-fresh.
    pub async fn list_active(&self) -> Result<Vec<Session>, CharlaError> {
        self.retry
            .run(|| queries::sessions::list_active(&self.db))
            .await
    }

    async fn read_through(&self, id: &str) -> Result<Session, CharlaError> {
        let now = self.clock.now();
        let result = self
            .retry
            .run(|| queries::sessions::get_or_create(&self.db, id, now))
            .await;
        match result {
            Ok(session) => {
                self.cache.set(&cache_key(id), session.clone()).await;
                Ok(session)
            }
            Err(e) => {
                // The entry may be stale relative to whatever half-happened.
                self.cache.invalidate(&cache_key(id)).await;
                Err(e)
            }
        }
    }
}
