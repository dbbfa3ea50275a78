// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process stand-in for the distributed cache tier.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use charla_cache::SharedCache;
use charla_core::CharlaError;
use dashmap::DashMap;

/// [`SharedCache`] backed by a process-local map.
///
/// TTLs are recorded but not enforced: tests drive expiry through the
/// local tier's manual clock instead. `set_available(false)` simulates a
/// shared-tier outage for degraded-mode tests.
#[derive(Default)]
pub struct InMemorySharedCache {
    entries: DashMap<String, String>,
    unavailable: AtomicBool,
}

impl InMemorySharedCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following call fail until re-enabled.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn check_available(&self) -> Result<(), CharlaError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(CharlaError::Internal("shared cache unavailable".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SharedCache for InMemorySharedCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CharlaError> {
        self.check_available()?;
        Ok(self.entries.get(key).map(|e| e.value().clone()))
    }

    async fn set(&self, key: &str, value: String, _ttl: Duration) -> Result<(), CharlaError> {
        self.check_available()?;
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CharlaError> {
        self.check_available()?;
        self.entries.remove(key);
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<(), CharlaError> {
        self.check_available()?;
        self.entries.retain(|k, _| !k.starts_with(prefix));
        Ok(())
    }
}
