// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Two-tier cache layer for the Charla session core.
//!
//! Provides a generic TTL cache composed of an always-on process-local tier
//! (`dashmap`) and an optional shared distributed tier behind the
//! [`SharedCache`] trait. The cache is advisory: the relational store stays
//! the single source of truth.

pub mod layer;
pub mod shared;

pub use layer::CacheLayer;
pub use shared::SharedCache;
