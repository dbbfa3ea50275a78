// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Client trait for the optional shared (distributed) cache tier.

use std::time::Duration;

use async_trait::async_trait;
use charla_core::CharlaError;

/// A distributed cache client (e.g. Redis) used as the first read tier.
///
/// Values are serialized JSON strings. Implementations own their connection
/// handling; the [`CacheLayer`](crate::CacheLayer) bounds every read with a
/// short timeout and treats all errors as a miss, so a slow or unavailable
/// shared tier can only degrade freshness, never correctness or latency.
#[async_trait]
pub trait SharedCache: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<String>, CharlaError>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CharlaError>;

    async fn delete(&self, key: &str) -> Result<(), CharlaError>;

    /// Delete every key starting with `prefix`.
    async fn delete_prefix(&self, prefix: &str) -> Result<(), CharlaError>;
}
