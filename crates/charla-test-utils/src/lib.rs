// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test doubles for the Charla session core.
//!
//! [`ManualClock`] makes TTL expiry, inactivity sweeps, and ledger
//! retention deterministic; [`InMemorySharedCache`] stands in for a
//! distributed cache tier, with a switch to simulate an outage.

pub mod clock;
pub mod shared_cache;

pub use clock::ManualClock;
pub use shared_cache::InMemorySharedCache;
