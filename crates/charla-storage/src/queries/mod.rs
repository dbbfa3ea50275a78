// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules. All functions accept `&Database` and run on the
//! single writer thread via `conn.call()`.

pub mod history;
pub mod ledger;
pub mod sessions;
