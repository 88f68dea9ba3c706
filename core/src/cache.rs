//! TTL-bounded cache for process-wide settings.
//!
//! The cache is owned by the Marketplace and handed to whoever needs it; there
//! is no module-level singleton. Writers call `invalidate()` after changing the
//! underlying rows; readers see the change at the latest after one TTL.

use crate::{clock::Clock, error::MarketResult, types::Timestamp};
use chrono::Duration;
use std::sync::{Arc, Mutex};

struct Slot<T> {
    value: T,
    loaded_at: Timestamp,
}

pub struct TtlCache<T: Clone> {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    slot: Mutex<Option<Slot<T>>>,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            slot: Mutex::new(None),
        }
    }

    /// Return the cached value, or call `load` when empty or expired.
    /// A failed load leaves the cache empty and propagates the error.
    pub fn get_or_load(&self, load: impl FnOnce() -> MarketResult<T>) -> MarketResult<T> {
        let now = self.clock.now();
        let mut slot = self.slot.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(cached) = slot.as_ref() {
            if now - cached.loaded_at < self.ttl {
                return Ok(cached.value.clone());
            }
        }
        let value = load()?;
        log::debug!("settings cache reloaded at {now}");
        *slot = Some(Slot {
            value: value.clone(),
            loaded_at: now,
        });
        Ok(value)
    }

    pub fn invalidate(&self) {
        *self.slot.lock().unwrap_or_else(|p| p.into_inner()) = None;
    }

    pub fn is_cached(&self) -> bool {
        let now = self.clock.now();
        self.slot
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .as_ref()
            .is_some_and(|cached| now - cached.loaded_at < self.ttl)
    }
}
