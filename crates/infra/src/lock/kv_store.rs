//! A key/value store abstraction for the KV-backed lock (C4).
//!
//! Grounded on `internal/lock/redis/lock.go`'s three Lua scripts (`SET NX
//! EX`, conditional `EXPIRE`, conditional `DEL`); [`InMemoryKvStore`] gives
//! the same compare-and-swap guarantees with a `dashmap` entry instead of a
//! Lua script, so the crate doesn't have to fabricate a `redis` dependency
//! the corpus never declares. A real network-backed implementation can
//! satisfy this same trait.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use relaybox_common::now_ms;
use relaybox_domain::Result;

#[async_trait]
pub trait KvStore: Send + Sync {
    /// `SET key value NX PX ttl`: set only if absent, returns whether it
    /// was set.
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;
    /// Extend the TTL only if the stored value equals `value`.
    async fn expire_if_match(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;
    /// Delete the key only if the stored value equals `value`.
    async fn delete_if_match(&self, key: &str, value: &str) -> Result<bool>;
}

struct Entry {
    value: String,
    expires_at_ms: i64,
}

#[derive(Default)]
pub struct InMemoryKvStore {
    entries: DashMap<String, Entry>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_live(entry: &Entry, now: i64) -> bool {
        entry.expires_at_ms > now
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let now = now_ms();
        let expires_at_ms = now + ttl.as_millis() as i64;
        match self.entries.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Entry { value: value.to_string(), expires_at_ms });
                Ok(true)
            }
            dashmap::mapref::entry::Entry::Occupied(mut slot) => {
                if Self::is_live(slot.get(), now) {
                    Ok(false)
                } else {
                    slot.insert(Entry { value: value.to_string(), expires_at_ms });
                    Ok(true)
                }
            }
        }
    }

    async fn expire_if_match(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let now = now_ms();
        match self.entries.get_mut(key) {
            Some(mut entry) if Self::is_live(&entry, now) && entry.value == value => {
                entry.expires_at_ms = now + ttl.as_millis() as i64;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_if_match(&self, key: &str, value: &str) -> Result<bool> {
        let now = now_ms();
        let matches = matches!(
            self.entries.get(key),
            Some(entry) if Self::is_live(&entry, now) && entry.value == value
        );
        if matches {
            self.entries.remove(key);
        }
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_nx_rejects_when_live_entry_present() {
        let store = InMemoryKvStore::new();
        assert!(store.set_nx("k", "a", Duration::from_secs(5)).await.unwrap());
        assert!(!store.set_nx("k", "b", Duration::from_secs(5)).await.unwrap());
    }

    #[tokio::test]
    async fn set_nx_succeeds_after_expiry() {
        let store = InMemoryKvStore::new();
        assert!(store.set_nx("k", "a", Duration::from_millis(1)).await.unwrap());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(store.set_nx("k", "b", Duration::from_secs(5)).await.unwrap());
    }

    #[tokio::test]
    async fn delete_if_match_requires_matching_owner() {
        let store = InMemoryKvStore::new();
        store.set_nx("k", "a", Duration::from_secs(5)).await.unwrap();
        assert!(!store.delete_if_match("k", "wrong").await.unwrap());
        assert!(store.delete_if_match("k", "a").await.unwrap());
    }
}
