// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session state & concurrency control core for a conversational reporting
//! backend.
//!
//! Inbound deliveries arrive at least once, possibly concurrently on
//! different workers. This crate keeps one versioned session row per owner
//! id, commits every state change through the store's atomic
//! compare-and-set, absorbs duplicate deliveries with a durable idempotency
//! ledger, serves reads through a two-tier advisory cache, and closes idle
//! sessions with a periodic reaper that uses the same CAS protocol.
//!
//! Entry point: [`SessionCore`].

pub mod controller;
pub mod core;
pub mod ledger;
pub mod reaper;
pub mod store;

pub use controller::UpdateController;
pub use core::SessionCore;
pub use ledger::IdempotencyLedger;
pub use reaper::InactivityReaper;
pub use store::SessionStore;
