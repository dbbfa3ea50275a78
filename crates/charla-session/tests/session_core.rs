// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests for the session core: CAS updates, duplicate
//! absorption, cache consistency, and the inactivity reaper, all on a real
//! temp-file SQLite store with a manual clock.

use std::sync::Arc;
use std::time::Duration;

use charla_cache::SharedCache;
use charla_config::CharlaConfig;
use charla_core::{Origin, SessionState};
use charla_session::SessionCore;
use charla_storage::Database;
use charla_test_utils::{InMemorySharedCache, ManualClock};

struct TestRig {
    core: SessionCore,
    clock: Arc<ManualClock>,
    shared: Arc<InMemorySharedCache>,
    db: Arc<Database>,
    _dir: tempfile::TempDir,
}

async fn rig() -> TestRig {
    rig_with(CharlaConfig::default()).await
}

async fn rig_with(config: CharlaConfig) -> TestRig {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("charla.db");
    let db = Arc::new(Database::open(db_path.to_str().unwrap()).await.unwrap());
    let clock = Arc::new(ManualClock::new());
    let shared = Arc::new(InMemorySharedCache::new());
    let core = SessionCore::new(
        config,
        db.clone(),
        clock.clone(),
        Some(shared.clone() as Arc<dyn SharedCache>),
    );
    TestRig {
        core,
        clock,
        shared,
        db,
        _dir: dir,
    }
}

#[tokio::test]
async fn new_session_starts_at_inicio_version_zero() {
    let rig = rig().await;
    let session = rig.core.get_session("+521234", false).await.unwrap();
    assert_eq!(session.state, SessionState::Inicio);
    assert_eq!(session.version, 0);
    assert!(session.payload.is_none());
}

#[tokio::test]
async fn matching_expected_version_succeeds_and_stale_one_conflicts() {
    let rig = rig().await;
    rig.core.get_session("+521234", false).await.unwrap();

    rig.core
        .update_session(
            "+521234",
            SessionState::RefrigeradorActivo,
            Some(serde_json::json!({"campo": "x"})),
            Origin::User,
            "start",
            Some(0),
        )
        .await
        .unwrap();

    let session = rig.core.get_session_with_version("+521234").await.unwrap();
    assert_eq!(session.version, 1);
    assert_eq!(session.state, SessionState::RefrigeradorActivo);

    // Repeating with the consumed version is a conflict and changes nothing.
    let err = rig
        .core
        .update_session(
            "+521234",
            SessionState::ConfirmandoDatos,
            None,
            Origin::Bot,
            "detected",
            Some(0),
        )
        .await
        .unwrap_err();
    assert!(err.is_conflict());

    let after = rig.core.get_session_with_version("+521234").await.unwrap();
    assert_eq!(after.version, 1);
    assert_eq!(after.state, SessionState::RefrigeradorActivo);
    assert_eq!(after.payload, session.payload);
}

#[tokio::test]
async fn delivery_registration_counts_repeats() {
    let rig = rig().await;

    let first = rig
        .core
        .register_delivery(Some("wamid.A"), "+521234")
        .await
        .unwrap();
    assert!(!first.is_duplicate);
    assert_eq!(first.retry_count, 0);

    let second = rig
        .core
        .register_delivery(Some("wamid.A"), "+521234")
        .await
        .unwrap();
    assert!(second.is_duplicate);
    assert_eq!(second.retry_count, 1);
    assert_eq!(second.first_seen, first.first_seen);

    let third = rig
        .core
        .register_delivery(Some("wamid.A"), "+521234")
        .await
        .unwrap();
    assert_eq!(third.retry_count, 2);
}

#[tokio::test]
async fn delivery_without_id_is_never_a_duplicate() {
    let rig = rig().await;
    for _ in 0..3 {
        let receipt = rig.core.register_delivery(None, "+521234").await.unwrap();
        assert!(!receipt.is_duplicate);
        assert_eq!(receipt.retry_count, 0);
    }
    let receipt = rig.core.register_delivery(Some(""), "+521234").await.unwrap();
    assert!(!receipt.is_duplicate);
}

#[tokio::test]
async fn ledger_outage_fails_open() {
    let rig = rig().await;
    // Break exactly the ledger table; everything else keeps working.
    rig.db
        .connection()
        .call(|conn| {
            conn.execute_batch("DROP TABLE idempotency_ledger;")?;
            Ok(())
        })
        .await
        .unwrap();

    let receipt = rig
        .core
        .register_delivery(Some("wamid.A"), "+521234")
        .await
        .unwrap();
    assert!(!receipt.is_duplicate);
    assert_eq!(receipt.retry_count, 0);

    // Sessions are unaffected by the degraded ledger.
    let session = rig.core.get_session("+521234", false).await.unwrap();
    assert_eq!(session.version, 0);
}

#[tokio::test]
async fn terminal_transition_clears_payload_regardless_of_argument() {
    let rig = rig().await;
    rig.core.get_session("+521234", false).await.unwrap();
    rig.core
        .update_session(
            "+521234",
            SessionState::RefrigeradorActivo,
            Some(serde_json::json!({"folio": 12})),
            Origin::User,
            "start",
            Some(0),
        )
        .await
        .unwrap();
    rig.core
        .set_equipment_ref("+521234", Some("EQ-7".into()))
        .await
        .unwrap();

    rig.core
        .update_session(
            "+521234",
            SessionState::Finalizado,
            Some(serde_json::json!({"must": "vanish"})),
            Origin::Bot,
            "done",
            None,
        )
        .await
        .unwrap();

    let session = rig.core.get_session("+521234", true).await.unwrap();
    assert_eq!(session.state, SessionState::Finalizado);
    assert!(session.payload.is_none());
    assert!(session.equipment_ref.is_none());
}

#[tokio::test]
async fn cached_read_after_update_serves_the_new_state() {
    let rig = rig().await;
    // Prime both cache tiers with the pre-update value.
    rig.core.get_session("+521234", false).await.unwrap();
    assert!(rig.shared.len() > 0);

    rig.core
        .update_session(
            "+521234",
            SessionState::RefrigeradorActivo,
            None,
            Origin::User,
            "start",
            Some(0),
        )
        .await
        .unwrap();

    // Plain cached read, no force_fresh: must still observe the new state.
    let session = rig.core.get_session("+521234", false).await.unwrap();
    assert_eq!(session.state, SessionState::RefrigeradorActivo);
    assert_eq!(session.version, 1);
}

#[tokio::test]
async fn concurrent_updates_with_same_version_produce_one_winner() {
    let rig = rig().await;
    rig.core.get_session("+521234", false).await.unwrap();

    let (a, b) = tokio::join!(
        rig.core.update_session(
            "+521234",
            SessionState::RefrigeradorActivo,
            Some(serde_json::json!({"worker": "a"})),
            Origin::User,
            "worker a",
            Some(0),
        ),
        rig.core.update_session(
            "+521234",
            SessionState::ConfirmandoDatos,
            Some(serde_json::json!({"worker": "b"})),
            Origin::Bot,
            "worker b",
            Some(0),
        ),
    );

    let successes = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one CAS winner: {a:?} / {b:?}");
    let conflict = if a.is_err() { a.unwrap_err() } else { b.unwrap_err() };
    assert!(conflict.is_conflict());

    // Exactly one transition record was appended.
    let history = rig.core.session_history("+521234", 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].previous_state, SessionState::Inicio);

    let session = rig.core.get_session_with_version("+521234").await.unwrap();
    assert_eq!(session.version, 1);
}

#[tokio::test]
async fn reaper_closes_idle_sessions_once() {
    let rig = rig().await;
    rig.core.get_session("+521234", false).await.unwrap();
    rig.core
        .update_session(
            "+521234",
            SessionState::RefrigeradorActivo,
            Some(serde_json::json!({"campo": "x"})),
            Origin::User,
            "start",
            Some(0),
        )
        .await
        .unwrap();

    rig.clock.advance_minutes(45);
    let closed = rig.core.sweep_expired_sessions(30).await.unwrap();
    assert_eq!(closed, 1);

    let session = rig.core.get_session("+521234", true).await.unwrap();
    assert_eq!(session.state, SessionState::TimeoutInactividad);
    // Closing a session clears its report data.
    assert!(session.payload.is_none());

    // Terminal sessions are not re-selected.
    let again = rig.core.sweep_expired_sessions(30).await.unwrap();
    assert_eq!(again, 0);
}

#[tokio::test]
async fn activity_keeps_sessions_out_of_the_sweep() {
    let rig = rig().await;
    rig.core.get_session("+521234", false).await.unwrap();

    rig.clock.advance_minutes(45);
    rig.core.record_activity("+521234").await.unwrap();

    let closed = rig.core.sweep_expired_sessions(30).await.unwrap();
    assert_eq!(closed, 0);

    let session = rig.core.get_session("+521234", true).await.unwrap();
    assert_eq!(session.message_count, 1);
    assert_eq!(session.state, SessionState::Inicio);
}

#[tokio::test]
async fn recent_sessions_survive_the_sweep() {
    let rig = rig().await;
    rig.core.get_session("+521111", false).await.unwrap();
    rig.clock.advance_minutes(20);
    rig.core.get_session("+522222", false).await.unwrap();

    let closed = rig.core.sweep_expired_sessions(30).await.unwrap();
    assert_eq!(closed, 0);
}

#[tokio::test]
async fn list_active_excludes_terminal_sessions() {
    let rig = rig().await;
    rig.core.get_session("+521111", false).await.unwrap();
    rig.core.get_session("+522222", false).await.unwrap();
    rig.core
        .update_session(
            "+522222",
            SessionState::Cancelado,
            None,
            Origin::User,
            "cancel",
            Some(0),
        )
        .await
        .unwrap();

    let active = rig.core.list_active_sessions().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, "+521111");
}

#[tokio::test]
async fn history_records_each_transition_in_order() {
    let rig = rig().await;
    rig.core.get_session("+521234", false).await.unwrap();
    rig.core
        .update_session(
            "+521234",
            SessionState::RefrigeradorActivo,
            None,
            Origin::User,
            "start",
            Some(0),
        )
        .await
        .unwrap();
    rig.core
        .update_session(
            "+521234",
            SessionState::ConfirmandoDatos,
            None,
            Origin::Bot,
            "extracted",
            Some(1),
        )
        .await
        .unwrap();
    rig.core
        .update_session(
            "+521234",
            SessionState::Finalizado,
            None,
            Origin::Api,
            "signed",
            Some(2),
        )
        .await
        .unwrap();

    let history = rig.core.session_history("+521234", 10).await.unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].new_state, SessionState::Finalizado);
    assert_eq!(history[0].origin, Origin::Api);
    assert_eq!(history[2].previous_state, SessionState::Inicio);
}

#[tokio::test]
async fn background_lifecycle_sweeps_and_stops_cleanly() {
    let mut config = CharlaConfig::default();
    config.reaper.sweep_interval_secs = 1;
    config.cache.eviction_interval_secs = 1;
    config.ledger.purge_interval_secs = 1;
    let rig = rig_with(config).await;

    rig.core.get_session("+521234", false).await.unwrap();
    rig.clock.advance_minutes(45);

    rig.core.start();
    // The first interval tick fires immediately; give the loops a moment.
    tokio::time::sleep(Duration::from_millis(200)).await;
    rig.core.shutdown().await;

    let session = rig.core.get_session("+521234", true).await.unwrap();
    assert_eq!(session.state, SessionState::TimeoutInactividad);
}

#[tokio::test]
async fn shared_tier_outage_degrades_without_errors() {
    let rig = rig().await;
    rig.core.get_session("+521234", false).await.unwrap();

    rig.shared.set_available(false);
    // Reads and writes keep working on the local tier + store.
    let session = rig.core.get_session("+521234", false).await.unwrap();
    assert_eq!(session.version, 0);
    rig.core
        .update_session(
            "+521234",
            SessionState::RefrigeradorActivo,
            None,
            Origin::User,
            "start",
            Some(0),
        )
        .await
        .unwrap();
    let session = rig.core.get_session("+521234", false).await.unwrap();
    assert_eq!(session.version, 1);
}
