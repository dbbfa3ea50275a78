// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The public face of the session core.
//!
//! One [`SessionCore`] is constructed per process and passed to callers by
//! dependency injection; background work (cache eviction, inactivity
//! sweeps, retention purges) starts with [`SessionCore::start`] and stops
//! with [`SessionCore::shutdown`]. There are no module-level singletons and
//! no implicit start-on-load.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use charla_cache::{CacheLayer, SharedCache};
use charla_config::CharlaConfig;
use charla_core::{
    CharlaError, Clock, DeliveryReceipt, Origin, Session, SessionState, SystemClock,
    TransitionRecord,
};
use charla_storage::{queries, Database, RetryPolicy};

use crate::controller::UpdateController;
use crate::ledger::IdempotencyLedger;
use crate::reaper::InactivityReaper;
use crate::store::SessionStore;

/// Session state & concurrency control core.
///
/// All methods are safe to call concurrently from any number of tasks; no
/// in-process lock guards correctness, only the store's atomic
/// compare-and-set does.
pub struct SessionCore {
    store: Arc<SessionStore>,
    controller: Arc<UpdateController>,
    ledger: Arc<IdempotencyLedger>,
    reaper: Arc<InactivityReaper>,
    cache: Arc<CacheLayer<Session>>,
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
    config: CharlaConfig,
    shutdown_token: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SessionCore {
    /// Assemble the core from injected collaborators.
    pub fn new(
        config: CharlaConfig,
        db: Arc<Database>,
        clock: Arc<dyn Clock>,
        shared_cache: Option<Arc<dyn SharedCache>>,
    ) -> Self {
        let retry = RetryPolicy::from_config(&config.retry);
        let cache = Arc::new(CacheLayer::new(
            clock.clone(),
            shared_cache,
            Duration::from_secs(config.cache.ttl_secs),
            Duration::from_millis(config.cache.shared_timeout_ms),
        ));
        let store = Arc::new(SessionStore::new(
            db.clone(),
            cache.clone(),
            clock.clone(),
            retry,
        ));
        let controller = Arc::new(UpdateController::new(
            db.clone(),
            cache.clone(),
            clock.clone(),
            retry,
        ));
        let ledger = Arc::new(IdempotencyLedger::new(
            db.clone(),
            clock.clone(),
            Duration::from_secs(config.ledger.retention_secs),
        ));
        let reaper = Arc::new(InactivityReaper::new(
            db.clone(),
            clock.clone(),
            controller.clone(),
            retry,
        ));
        Self {
            store,
            controller,
            ledger,
            reaper,
            cache,
            db,
            clock,
            config,
            shutdown_token: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Open the configured database and assemble the core with the system
    /// clock and no shared cache tier.
    pub async fn open(config: CharlaConfig) -> Result<SessionCore, CharlaError> {
        let db = Database::open_with_busy_timeout(
            &config.storage.database_path,
            config.storage.busy_timeout_ms,
        )
        .await?;
        Ok(Self::new(config, Arc::new(db), Arc::new(SystemClock), None))
    }

    // --- Read/write interface for business-logic callers ---

    /// Fetch a session, creating it lazily on first contact. Cache-first
    /// unless `force_fresh`.
    pub async fn get_session(&self, id: &str, force_fresh: bool) -> Result<Session, CharlaError> {
        self.store.get(id, force_fresh).await
    }

    /// Fetch a session directly from the store, for callers about to
    /// mutate: the returned `version` is the expected version to pass to
    /// [`SessionCore::update_session`].
    pub async fn get_session_with_version(&self, id: &str) -> Result<Session, CharlaError> {
        self.store.get_with_version(id).await
    }

    /// Commit a state transition. See [`UpdateController::update`].
    pub async fn update_session(
        &self,
        id: &str,
        new_state: SessionState,
        payload: Option<serde_json::Value>,
        origin: Origin,
        reason: &str,
        expected_version: Option<i64>,
    ) -> Result<(), CharlaError> {
        self.controller
            .update(id, new_state, payload, origin, reason, expected_version)
            .await
    }

    /// Register an inbound delivery against the idempotency ledger.
    pub async fn register_delivery(
        &self,
        delivery_id: Option<&str>,
        owner_id: &str,
    ) -> Result<DeliveryReceipt, CharlaError> {
        self.ledger.register_delivery(delivery_id, owner_id).await
    }

    /// Touch `last_activity` and count one inbound user message, without a
    /// state change.
    pub async fn record_activity(&self, id: &str) -> Result<(), CharlaError> {
        self.store.record_activity(id).await
    }

    /// Best-effort equipment reference update (last-writer-wins metadata).
    pub async fn set_equipment_ref(
        &self,
        id: &str,
        equipment_ref: Option<String>,
    ) -> Result<(), CharlaError> {
        self.store.set_equipment_ref(id, equipment_ref).await
    }

    /// Run one inactivity sweep now. Returns the number of sessions closed.
    pub async fn sweep_expired_sessions(&self, threshold_minutes: u64) -> Result<usize, CharlaError> {
        self.reaper
            .sweep(Duration::from_secs(threshold_minutes * 60))
            .await
    }

    /// Most recent transitions for one session, newest first.
    pub async fn session_history(
        &self,
        id: &str,
        limit: u32,
    ) -> Result<Vec<TransitionRecord>, CharlaError> {
        queries::history::list_for_session(&self.db, id, limit).await
    }

    /// All non-terminal sessions, most recently active first.
    pub async fn list_active_sessions(&self) -> Result<Vec<Session>, CharlaError> {
        self.store.list_active().await
    }

    /// Verify the store answers queries.
    pub async fn health_check(&self) -> Result<(), CharlaError> {
        self.db.health_check().await
    }

    // --- Lifecycle ---

    /// Spawn the background loops: local cache eviction, inactivity sweeps,
    /// and retention purges (ledger + transition history). Idempotent only
    /// in the sense that calling it twice spawns duplicate loops; call once.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock().expect("task list poisoned");

        tasks.push(self.spawn_eviction_loop());
        tasks.push(self.spawn_reaper_loop());
        tasks.push(self.spawn_retention_loop());

        info!(
            sweep_interval_secs = self.config.reaper.sweep_interval_secs,
            eviction_interval_secs = self.config.cache.eviction_interval_secs,
            purge_interval_secs = self.config.ledger.purge_interval_secs,
            "session core background tasks started"
        );
    }

    /// Stop the background loops and wait for them to finish. The database
    /// handle stays usable; callers that own it decide when to close it.
    pub async fn shutdown(&self) {
        self.shutdown_token.cancel();
        let tasks = {
            let mut guard = self.tasks.lock().expect("task list poisoned");
            std::mem::take(&mut *guard)
        };
        for task in tasks {
            if let Err(e) = task.await {
                error!(error = %e, "background task panicked during shutdown");
            }
        }
        info!("session core background tasks stopped");
    }

    fn spawn_eviction_loop(&self) -> JoinHandle<()> {
        let cache = self.cache.clone();
        let token = self.shutdown_token.clone();
        let period = Duration::from_secs(self.config.cache.eviction_interval_secs);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        cache.evict_expired();
                    }
                }
            }
            debug!("cache eviction loop stopped");
        })
    }

    fn spawn_reaper_loop(&self) -> JoinHandle<()> {
        let reaper = self.reaper.clone();
        let token = self.shutdown_token.clone();
        let period = Duration::from_secs(self.config.reaper.sweep_interval_secs);
        let threshold =
            Duration::from_secs(self.config.reaper.inactivity_threshold_minutes * 60);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        if let Err(e) = reaper.sweep(threshold).await {
                            error!(error = %e, "inactivity sweep failed");
                        }
                    }
                }
            }
            debug!("inactivity reaper loop stopped");
        })
    }

    fn spawn_retention_loop(&self) -> JoinHandle<()> {
        let ledger = self.ledger.clone();
        let db = self.db.clone();
        let clock = self.clock.clone();
        let token = self.shutdown_token.clone();
        let period = Duration::from_secs(self.config.ledger.purge_interval_secs);
        let history_retention = chrono::Duration::days(self.config.history.retention_days as i64);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        if let Err(e) = ledger.purge_expired().await {
                            error!(error = %e, "ledger retention purge failed");
                        }
                        let cutoff = clock.now() - history_retention;
                        if let Err(e) = queries::history::purge_older_than(&db, cutoff).await {
                            error!(error = %e, "history retention purge failed");
                        }
                    }
                }
            }
            debug!("retention purge loop stopped");
        })
    }
}
