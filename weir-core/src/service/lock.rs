//! Per-aggregate mutual exclusion.
//!
//! Read-modify-write sequences on one traffic config or one virtual model
//! are serialised through a [`KeyedLock`]. Different keys never contend.
//! This only covers a single process; the database uniqueness constraints
//! still catch cross-process races.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug, Default)]
pub struct KeyedLock {
    slots: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyedLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`. Released when the guard drops.
    pub async fn acquire(&self, key: impl Into<String>) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            // Drop slots nobody holds or waits on.
            slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            slots.entry(key.into()).or_default().clone()
        };
        slot.lock_owned().await
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub(crate) fn config_key(id: uuid::Uuid) -> String {
    format!("config:{id}")
}

pub(crate) fn virtual_model_key(project: uuid::Uuid, name: &str) -> String {
    format!("vm:{project}/{name}")
}

pub(crate) fn inference_service_key(project: uuid::Uuid, id: uuid::Uuid) -> String {
    format!("isvc:{project}/{id}")
}
