//! Port interfaces for the outbox engine.
//!
//! Every trait here is `Send + Sync` and object-safe so the engine can be
//! assembled from `Arc<dyn Trait>` collaborators, the same shape as
//! `pulsearc_core::sync::ports::OutboxQueue`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use relaybox_domain::{
    Message, NewOutboxRecord, OutboxQuery, OutboxRecord, OutboxStatus, Result, SendOutcomeUpdate,
    ShardTarget,
};

/// Persist and query outbox records (C2).
///
/// `insert` opens and commits its own transaction; it does **not** give the
/// atomicity guarantee of a co-located business write on its own. That guarantee comes
/// from the concrete transactional facade in `relaybox-infra`, which inserts
/// the row through the same connection/transaction as the caller's business
/// write. This trait's `insert` is the standalone path used by tests,
/// fixtures, and by collaborators that don't need biz co-location.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    async fn insert(&self, target: &ShardTarget, record: NewOutboxRecord) -> Result<i64>;

    async fn get(&self, target: &ShardTarget, id: i64) -> Result<Option<OutboxRecord>>;

    async fn list(&self, target: &ShardTarget, query: &OutboxQuery) -> Result<Vec<OutboxRecord>>;

    /// Rows with `status = Init AND utime < now_ms - wait_duration`,
    /// ordered so the scheduler sees the oldest first.
    async fn find_stuck(
        &self,
        target: &ShardTarget,
        wait_duration: Duration,
        limit: usize,
    ) -> Result<Vec<OutboxRecord>>;

    /// Apply a send-status transition to a single row by id.
    async fn update_on_send(
        &self,
        target: &ShardTarget,
        id: i64,
        update: SendOutcomeUpdate,
    ) -> Result<()>;

    /// Apply a send-status transition to every row whose `key` is in
    /// `keys`. Unlike [`OutboxStore::update_on_send`], `send_times` is not
    /// an absolute value here: a key may match several rows with distinct
    /// `send_times`, so the store applies `send_times = send_times + 1` per
    /// matched row rather than copying one record's count onto all of them.
    /// Returns the number of rows touched.
    async fn update_bulk_by_keys(
        &self,
        target: &ShardTarget,
        keys: &[String],
        status: OutboxStatus,
        utime: i64,
    ) -> Result<u64>;
}

/// Map a sharding key to a target and enumerate all active targets (C3).
pub trait ShardingPolicy: Send + Sync {
    fn route(&self, key: &str) -> ShardTarget;
    fn active_targets(&self) -> Vec<ShardTarget>;
}

/// A held (or about-to-be-held) distributed lock (C4).
///
/// Mirrors the original's error-sentinel contract rather than a result enum:
/// `Ok(())` is success, [`relaybox_domain::RelayError::Locked`] /
/// [`relaybox_domain::RelayError::LockNotHeld`] are the two expected
/// non-success outcomes, and any other `Err` is a lock-system error.
#[async_trait]
pub trait Lock: Send + Sync {
    async fn acquire(&self) -> Result<()>;
    async fn refresh(&self) -> Result<()>;
    async fn release(&self) -> Result<()>;
}

/// Constructs [`Lock`] instances keyed by string with a TTL.
pub trait LockFactory: Send + Sync {
    fn new_lock(&self, key: &str, ttl: Duration) -> Arc<dyn Lock>;
}

/// The result of a `send_many` broker call that did not fully succeed.
#[derive(Debug, Clone)]
pub enum SendManyError {
    /// Per-message partial-failure report carrying the keys that failed.
    Partial { failed_keys: Vec<String> },
    /// Bulk failure with no per-message detail (including transport errors
    /// that can't be attributed to individual messages).
    Bulk,
}

/// Forward messages to the broker (external collaborator, C5's dependency).
#[async_trait]
pub trait BrokerClient: Send + Sync {
    async fn send_one(&self, message: &Message) -> Result<()>;
    async fn send_many(&self, messages: &[Message]) -> std::result::Result<(), SendManyError>;
}

/// Encode/decode a [`Message`] to/from stored bytes (C1).
pub trait MessageCodec: Send + Sync {
    fn encode(&self, message: &Message) -> Result<Vec<u8>>;
    fn decode(&self, bytes: &[u8]) -> Result<Message>;
}

/// What one sender iteration accomplished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendOutcome {
    /// Candidate rows the sender attempted this call.
    pub processed: usize,
    /// Rows that transitioned to `Fail` during this call.
    pub terminal_failures: usize,
}

/// Forward a shard's candidate rows to the broker and update their status
/// (C5). `Err` is reserved for iteration-level infrastructure failure (the
/// `find_stuck` scan or a status update failing); individual broker
/// rejections are accounted for in the returned [`SendOutcome`] and the
/// rows' persisted status, never surfaced as `Err`. This is what lets the
/// compensation worker's `err_streak` mean "the node is
/// unhealthy", not "some key is permanently rejected by the broker".
#[async_trait]
pub trait Sender: Send + Sync {
    async fn exec(&self, target: &ShardTarget) -> Result<SendOutcome>;
}
