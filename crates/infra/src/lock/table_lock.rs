//! Table-backed distributed lock (C4), CAS-first mode.
//!
//! Grounded on `internal/lock/gorm/lock.go`'s `casLock`: a row per lock key
//! with an owner token (`lock_value`) and an optimistic `version` counter.
//! Re-locking with the same owner token is idempotent (the worker that
//! already holds the lock just touches its expiration); anyone else racing
//! the CAS update loses and sees [`RelayError::Locked`].
//!
//! Each CAS attempt is wrapped in its own deadline (`lock.go`'s
//! `lockTimeout`), narrower than and independent of whatever timeout the
//! caller applies around the whole acquire/refresh/release call.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use relaybox_common::now_ms;
use relaybox_domain::{RelayError, Result};
use relaybox_core::ports::{Lock, LockFactory};
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::db::manager::DbManager;

const STATUS_UNLOCKED: i32 = 0;
const STATUS_LOCKED: i32 = 1;

fn map_storage_error(e: rusqlite::Error) -> RelayError {
    RelayError::Database(e.to_string())
}

fn map_join_error(e: tokio::task::JoinError) -> RelayError {
    RelayError::Internal(format!("blocking task panicked: {e}"))
}

pub struct TableLockFactory {
    db: Arc<DbManager>,
    attempt_deadline: Duration,
}

impl TableLockFactory {
    /// `attempt_deadline` bounds a single CAS attempt against
    /// `distributed_locks`, independent of whatever deadline the caller
    /// wraps the whole `acquire`/`refresh`/`release` call in.
    pub fn new(db: Arc<DbManager>, attempt_deadline: Duration) -> Self {
        Self { db, attempt_deadline }
    }
}

impl LockFactory for TableLockFactory {
    fn new_lock(&self, key: &str, ttl: Duration) -> Arc<dyn Lock> {
        Arc::new(TableLock {
            db: self.db.clone(),
            key: key.to_string(),
            value: Uuid::new_v4().to_string(),
            ttl,
            attempt_deadline: self.attempt_deadline,
        })
    }
}

pub struct TableLock {
    db: Arc<DbManager>,
    key: String,
    value: String,
    ttl: Duration,
    attempt_deadline: Duration,
}

fn map_attempt_timeout(_: tokio::time::error::Elapsed) -> RelayError {
    RelayError::Database("table lock attempt deadline exceeded".to_string())
}

#[async_trait]
impl Lock for TableLock {
    async fn acquire(&self) -> Result<()> {
        let db = self.db.clone();
        let key = self.key.clone();
        let value = self.value.clone();
        let ttl_ms = self.ttl.as_millis() as i64;
        tokio::time::timeout(
            self.attempt_deadline,
            tokio::task::spawn_blocking(move || acquire_blocking(&db, &key, &value, ttl_ms)),
        )
        .await
        .map_err(map_attempt_timeout)?
        .map_err(map_join_error)?
    }

    async fn refresh(&self) -> Result<()> {
        let db = self.db.clone();
        let key = self.key.clone();
        let value = self.value.clone();
        let ttl_ms = self.ttl.as_millis() as i64;
        tokio::time::timeout(
            self.attempt_deadline,
            tokio::task::spawn_blocking(move || refresh_blocking(&db, &key, &value, ttl_ms)),
        )
        .await
        .map_err(map_attempt_timeout)?
        .map_err(map_join_error)?
    }

    async fn release(&self) -> Result<()> {
        let db = self.db.clone();
        let key = self.key.clone();
        let value = self.value.clone();
        tokio::time::timeout(
            self.attempt_deadline,
            tokio::task::spawn_blocking(move || release_blocking(&db, &key, &value)),
        )
        .await
        .map_err(map_attempt_timeout)?
        .map_err(map_join_error)?
    }
}

fn acquire_blocking(db: &DbManager, key: &str, value: &str, ttl_ms: i64) -> Result<()> {
    let mut conn = db.get_connection()?;
    let now = now_ms();
    let tx = conn.transaction().map_err(map_storage_error)?;

    let existing: Option<(String, i32, i64, i64)> = tx
        .query_row(
            "SELECT lock_value, status, version, expiration FROM distributed_locks WHERE lock_key = ?1",
            params![key],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .optional()
        .map_err(map_storage_error)?;

    let Some((existing_value, status, version, expiration)) = existing else {
        tx.execute(
            "INSERT INTO distributed_locks (lock_key, lock_value, status, version, expiration, utime, ctime) \
             VALUES (?1, ?2, ?3, 0, ?4, ?5, ?5)",
            params![key, value, STATUS_LOCKED, now + ttl_ms, now],
        )
        .map_err(map_storage_error)?;
        tx.commit().map_err(map_storage_error)?;
        return Ok(());
    };

    if status == STATUS_LOCKED && existing_value == value {
        tx.execute(
            "UPDATE distributed_locks SET expiration = ?1, utime = ?2 WHERE lock_key = ?3 AND lock_value = ?4",
            params![now + ttl_ms, now, key, value],
        )
        .map_err(map_storage_error)?;
        tx.commit().map_err(map_storage_error)?;
        return Ok(());
    }

    if status == STATUS_LOCKED && now < expiration {
        return Err(RelayError::Locked);
    }

    let touched = tx
        .execute(
            "UPDATE distributed_locks SET status = ?1, lock_value = ?2, expiration = ?3, \
             version = version + 1, utime = ?4 WHERE lock_key = ?5 AND version = ?6",
            params![STATUS_LOCKED, value, now + ttl_ms, now, key, version],
        )
        .map_err(map_storage_error)?;
    tx.commit().map_err(map_storage_error)?;
    if touched == 0 {
        return Err(RelayError::Locked);
    }
    Ok(())
}

fn refresh_blocking(db: &DbManager, key: &str, value: &str, ttl_ms: i64) -> Result<()> {
    let conn = db.get_connection()?;
    let now = now_ms();
    let touched = conn
        .execute(
            "UPDATE distributed_locks SET utime = ?1, expiration = ?2 \
             WHERE lock_key = ?3 AND lock_value = ?4 AND status = ?5 AND expiration > ?6",
            params![now, now + ttl_ms, key, value, STATUS_LOCKED, now],
        )
        .map_err(map_storage_error)?;
    if touched == 0 {
        return Err(RelayError::LockNotHeld);
    }
    Ok(())
}

fn release_blocking(db: &DbManager, key: &str, value: &str) -> Result<()> {
    let conn = db.get_connection()?;
    let now = now_ms();
    let touched = conn
        .execute(
            "UPDATE distributed_locks SET status = ?1, expiration = ?2, utime = ?2 \
             WHERE lock_key = ?3 AND lock_value = ?4",
            params![STATUS_UNLOCKED, now, key, value],
        )
        .map_err(map_storage_error)?;
    if touched == 0 {
        return Err(RelayError::LockNotHeld);
    }
    Ok(())
}
