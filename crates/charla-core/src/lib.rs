// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Charla session state & concurrency control subsystem.
//!
//! This crate provides the foundational error type, domain types (session,
//! transition history, delivery receipt), and the injectable clock used
//! throughout the Charla workspace. It performs no I/O.

pub mod clock;
pub mod error;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use clock::{Clock, SystemClock};
pub use error::CharlaError;
pub use types::{DeliveryReceipt, Origin, Session, SessionState, TransitionRecord};
