use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::{StoreError, kv::KeyValueStore};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-memory key-value store with lazy TTL expiry.
///
/// Expired entries are dropped when read, or in bulk by
/// [`MemoryKeyValueStore::purge_expired`].
///
/// # Capacity Management
/// An optional key limit makes `set` of a new key fail once reached, which
/// keeps a misconfigured development daemon from growing without bound.
/// Expired entries never count against the limit: a full store purges them
/// before refusing a new key.
#[derive(Debug, Clone, Default)]
pub struct MemoryKeyValueStore {
    entries: Arc<DashMap<String, Entry>>,
    capacity: Option<usize>,
    offline: Arc<AtomicBool>,
}

impl MemoryKeyValueStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::default()
        }
    }

    /// Number of stored keys, including ones that expired but were not read yet
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Make every subsequent call fail with [`StoreError::Unavailable`]
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            tracing::debug!(removed, "Purged expired key-value entries");
        }
        removed
    }

    fn ensure_online(&self) -> crate::Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable(
                "memory key-value store is offline".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> crate::Result<Option<String>> {
        self.ensure_online()?;

        let now = Instant::now();
        let value = match self.entries.get(key) {
            Some(entry) if entry.is_expired(now) => None,
            Some(entry) => return Ok(Some(entry.value.clone())),
            None => return Ok(None),
        };

        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        Ok(value)
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> crate::Result<()> {
        self.ensure_online()?;

        if let Some(capacity) = self.capacity
            && !self.entries.contains_key(key)
            && self.entries.len() >= capacity
        {
            // Expired keys never count against the limit
            self.purge_expired();
            if self.entries.len() >= capacity {
                return Err(StoreError::CapacityExceeded {
                    used: self.entries.len(),
                    capacity,
                });
            }
        }

        let expires_at = ttl.and_then(|ttl| Instant::now().checked_add(ttl));
        self.entries
            .insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> crate::Result<()> {
        self.ensure_online()?;
        self.entries.remove(key);
        Ok(())
    }
}
