//! The explicit configuration record for the outbox engine.
//!
//! Rewritten as a plain record rather than the options-pattern-via-
//! higher-order-functions the original uses: every field has a
//! documented default and the sender/metrics choices are plain fields
//! rather than callback registration.

use std::time::Duration;

/// Which [`crate::outbox::OutboxStatus`]-transition strategy the sender
/// uses when forwarding candidate rows to the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SenderStrategy {
    /// One broker call per candidate record, executed concurrently.
    #[default]
    PerMessage,
    /// A single broker call for the whole batch.
    Batch,
}

/// Tunables shared by the sender and the compensation worker.
#[derive(Debug, Clone)]
pub struct OutboxConfig {
    /// Minimum age of an `Init` row before compensation considers it.
    pub wait_duration: Duration,
    /// Terminal-failure threshold on `send_times`.
    pub max_times: i64,
    /// Records fetched per scan iteration.
    pub batch_size: usize,
    /// Sleep between leadership attempts; also the lock TTL.
    pub poll_interval: Duration,
    /// Deadline per scan iteration.
    pub iter_deadline: Duration,
    /// Deadline per lock acquire/refresh/release call, as seen by the
    /// compensation worker wrapping the call.
    pub lock_acquire_deadline: Duration,
    /// Deadline for a single CAS attempt inside the table-backed lock's own
    /// blocking call. Narrower than `lock_acquire_deadline` because it
    /// bounds one SQL round trip rather than the worker's whole
    /// acquire/refresh/release call, which may itself retry several of
    /// these attempts before giving up.
    pub table_lock_attempt_deadline: Duration,
    pub sender_strategy: SenderStrategy,
    pub metrics_enabled: bool,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            wait_duration: Duration::from_secs(30),
            max_times: 3,
            batch_size: 10,
            poll_interval: Duration::from_secs(60),
            iter_deadline: Duration::from_secs(3),
            lock_acquire_deadline: Duration::from_secs(3),
            table_lock_attempt_deadline: Duration::from_millis(500),
            sender_strategy: SenderStrategy::PerMessage,
            metrics_enabled: false,
        }
    }
}
