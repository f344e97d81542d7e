//! KV-backed distributed lock (C4), the alternative backend to
//! [`crate::lock::table_lock`]. Grounded on `internal/lock/redis/lock.go`:
//! an opaque owner token plus `SET NX` / conditional `EXPIRE` / conditional
//! `DEL`, here expressed against the [`KvStore`] port.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use relaybox_domain::{RelayError, Result};
use relaybox_core::ports::{Lock, LockFactory};
use uuid::Uuid;

use crate::lock::kv_store::KvStore;

pub struct KvLockFactory {
    store: Arc<dyn KvStore>,
}

impl KvLockFactory {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }
}

impl LockFactory for KvLockFactory {
    fn new_lock(&self, key: &str, ttl: Duration) -> Arc<dyn Lock> {
        Arc::new(KvLock { store: self.store.clone(), key: key.to_string(), value: Uuid::new_v4().to_string(), ttl })
    }
}

pub struct KvLock {
    store: Arc<dyn KvStore>,
    key: String,
    value: String,
    ttl: Duration,
}

#[async_trait]
impl Lock for KvLock {
    async fn acquire(&self) -> Result<()> {
        if self.store.set_nx(&self.key, &self.value, self.ttl).await? {
            Ok(())
        } else {
            Err(RelayError::Locked)
        }
    }

    async fn refresh(&self) -> Result<()> {
        if self.store.expire_if_match(&self.key, &self.value, self.ttl).await? {
            Ok(())
        } else {
            Err(RelayError::LockNotHeld)
        }
    }

    async fn release(&self) -> Result<()> {
        if self.store.delete_if_match(&self.key, &self.value).await? {
            Ok(())
        } else {
            Err(RelayError::LockNotHeld)
        }
    }
}
