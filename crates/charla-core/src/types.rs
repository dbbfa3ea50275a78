// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types for the session state machine and its supporting records.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::error::CharlaError;

/// Conversation states for the reporting workflow.
///
/// The set is closed: anything outside it is rejected with
/// [`CharlaError::InvalidStateTransition`] before touching the store.
/// Wire and database form is SCREAMING_SNAKE_CASE (e.g. `REFRIGERADOR_ACTIVO`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    /// Initial state: no report in progress.
    Inicio,
    /// Collecting fields for a refrigerator fault report.
    RefrigeradorActivo,
    /// Waiting for the user to confirm extracted data.
    ConfirmandoDatos,
    /// Record built, waiting for the e-signature flow to complete.
    EsperandoFirma,
    /// Report completed.
    Finalizado,
    /// Report cancelled by the user.
    Cancelado,
    /// Session closed by the inactivity reaper.
    TimeoutInactividad,
}

impl SessionState {
    /// The state every session is created in.
    pub const INITIAL: SessionState = SessionState::Inicio;

    /// Terminal states accept no further user-driven transition without an
    /// explicit restart.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Finalizado | SessionState::Cancelado | SessionState::TimeoutInactividad
        )
    }

    pub fn is_initial(self) -> bool {
        self == SessionState::INITIAL
    }

    /// Whether entering this state clears `payload` and `equipment_ref`.
    ///
    /// Terminal states and the initial state both clear: stale report data
    /// must never leak across conversation restarts.
    pub fn clears_payload(self) -> bool {
        self.is_terminal() || self.is_initial()
    }

    /// Parse the wire/database form, mapping unknown states to
    /// [`CharlaError::InvalidStateTransition`].
    pub fn parse(s: &str) -> Result<SessionState, CharlaError> {
        SessionState::from_str(s).map_err(|_| CharlaError::InvalidStateTransition {
            state: s.to_string(),
        })
    }
}

/// Origin of a state transition, recorded in the session history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Origin {
    /// Direct user input drove the transition.
    User,
    /// Automated conversation logic drove the transition.
    Bot,
    /// The inactivity reaper drove the transition.
    Timer,
    /// An external API callback drove the transition.
    Api,
}

/// One user's conversation state. One row per owner id, created lazily on
/// first contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Stable external identifier (e.g. a phone number). Never reused.
    pub id: String,
    pub state: SessionState,
    /// Opaque report-in-progress blob owned entirely by business logic.
    /// The core stores and clears it but never inspects it.
    pub payload: Option<serde_json::Value>,
    /// Optional equipment reference set by business logic; cleared whenever
    /// `payload` is cleared.
    pub equipment_ref: Option<String>,
    /// Optimistic-concurrency token: starts at 0, +1 on every successful
    /// mutation.
    pub version: i64,
    pub last_activity: DateTime<Utc>,
    /// Inbound user messages only.
    pub message_count: i64,
    pub created_at: DateTime<Utc>,
}

/// Append-only record of one successful state transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub id: i64,
    pub session_id: String,
    pub previous_state: SessionState,
    pub new_state: SessionState,
    pub origin: Origin,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

/// Result of registering an inbound delivery against the idempotency ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    /// True when this delivery id was seen before.
    pub is_duplicate: bool,
    /// 0 on first sight, +1 per repeat.
    pub retry_count: i64,
    pub first_seen: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn state_wire_form_is_screaming_snake() {
        assert_eq!(SessionState::Inicio.to_string(), "INICIO");
        assert_eq!(
            SessionState::RefrigeradorActivo.to_string(),
            "REFRIGERADOR_ACTIVO"
        );
        assert_eq!(
            SessionState::TimeoutInactividad.to_string(),
            "TIMEOUT_INACTIVIDAD"
        );
    }

    #[test]
    fn state_round_trips_through_wire_form() {
        for state in SessionState::iter() {
            let parsed = SessionState::parse(&state.to_string()).unwrap();
            assert_eq!(state, parsed);
        }
    }

    #[test]
    fn unknown_state_is_invalid_transition() {
        let err = SessionState::parse("LAVADORA_ACTIVA").unwrap_err();
        assert!(matches!(
            err,
            CharlaError::InvalidStateTransition { state } if state == "LAVADORA_ACTIVA"
        ));
    }

    #[test]
    fn terminal_and_initial_states_clear_payload() {
        assert!(SessionState::Inicio.clears_payload());
        assert!(SessionState::Finalizado.clears_payload());
        assert!(SessionState::Cancelado.clears_payload());
        assert!(SessionState::TimeoutInactividad.clears_payload());
        assert!(!SessionState::RefrigeradorActivo.clears_payload());
        assert!(!SessionState::ConfirmandoDatos.clears_payload());
        assert!(!SessionState::EsperandoFirma.clears_payload());
    }

    #[test]
    fn origin_wire_form() {
        assert_eq!(Origin::User.to_string(), "USER");
        assert_eq!(Origin::Timer.to_string(), "TIMER");
        assert_eq!("API".parse::<Origin>().unwrap(), Origin::Api);
    }
}
