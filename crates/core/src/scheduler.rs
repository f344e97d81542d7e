//! The compensation worker (C7): one background task per shard target that
//! cycles through `ACQUIRE_LOCK -> HOLD_AND_WORK -> RELEASE -> SLEEP`.
//!
//! Grounded on `SyncScheduler` (cancellation token + `Arc<Mutex<Option
//! <JoinHandle<()>>>>` lifecycle, `tokio::select!` between cancellation and
//! sleep, `Drop` safety net) generalized from a single fixed-interval job to
//! a lock-gated leadership cycle.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use relaybox_common::Backoff;
use relaybox_domain::{OutboxConfig, RelayError, ShardTarget};

use crate::ports::{Lock, LockFactory, Sender};

/// Consecutive iteration-level failures before the worker yields
/// leadership early instead of holding the lock until its TTL lapses.
const ERR_STREAK_YIELD_THRESHOLD: u32 = 5;

/// How long to sleep between iterations once a scan comes back empty,
/// while still holding the lock (backpressure when the backlog is empty).
const EMPTY_SCAN_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("compensation worker is already running")]
    AlreadyRunning,
    #[error("compensation worker is not running")]
    NotRunning,
}

/// Drives compensation for a single shard target. One instance per entry in
/// [`crate::ports::ShardingPolicy::active_targets`].
pub struct CompensationWorker {
    target: ShardTarget,
    sender: Arc<dyn Sender>,
    lock_factory: Arc<dyn LockFactory>,
    config: OutboxConfig,
    cancellation_token: CancellationToken,
    task_handle: Mutex<Option<JoinHandle<()>>>,
}

impl CompensationWorker {
    pub fn new(
        target: ShardTarget,
        sender: Arc<dyn Sender>,
        lock_factory: Arc<dyn LockFactory>,
        config: OutboxConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            target,
            sender,
            lock_factory,
            config,
            cancellation_token: CancellationToken::new(),
            task_handle: Mutex::new(None),
        })
    }

    pub fn start(self: &Arc<Self>) -> Result<(), WorkerError> {
        let mut guard = self.task_handle.lock().unwrap_or_else(|e| e.into_inner());
        if guard.is_some() {
            return Err(WorkerError::AlreadyRunning);
        }
        let worker = Arc::clone(self);
        *guard = Some(tokio::spawn(async move { worker.run().await }));
        Ok(())
    }

    pub async fn stop(&self) -> Result<(), WorkerError> {
        let handle = {
            let mut guard = self.task_handle.lock().unwrap_or_else(|e| e.into_inner());
            guard.take()
        };
        let Some(handle) = handle else {
            return Err(WorkerError::NotRunning);
        };
        self.cancellation_token.cancel();
        let _ = handle.await;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.task_handle.lock().unwrap_or_else(|e| e.into_inner()).is_some()
    }

    #[instrument(skip(self), fields(target = %self.target))]
    async fn run(self: Arc<Self>) {
        loop {
            tokio::select! {
                _ = self.cancellation_token.cancelled() => break,
                _ = self.cycle() => {}
            }
            if self.cancellation_token.is_cancelled() {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = self.cancellation_token.cancelled() => break,
            }
        }
    }

    /// One `ACQUIRE_LOCK -> HOLD_AND_WORK -> RELEASE` pass. Acquisition is
    /// retried with [`Backoff`]'s default schedule (100ms -> 1s, 10
    /// attempts) before this cycle gives up and falls through to `SLEEP`.
    async fn cycle(&self) {
        let lock = self.lock_factory.new_lock(&self.target.lock_key(), self.config.poll_interval);
        let backoff = Backoff::default();
        let mut attempt = 0u32;

        loop {
            if self.cancellation_token.is_cancelled() {
                return;
            }
            match timeout(self.config.lock_acquire_deadline, lock.acquire()).await {
                Ok(Ok(())) => {
                    self.hold_and_work(lock.as_ref()).await;
                    if let Err(e) = timeout(self.config.lock_acquire_deadline, lock.release()).await {
                        warn!(target = %self.target, error = %e, "lock release timed out");
                    }
                    return;
                }
                Ok(Err(RelayError::Locked)) => {
                    debug!(target = %self.target, attempt, "lock held by another node");
                }
                Ok(Err(e)) => {
                    warn!(target = %self.target, error = %e, attempt, "lock acquire failed");
                }
                Err(_) => {
                    warn!(target = %self.target, attempt, "lock acquire deadline exceeded");
                }
            }

            let Some(delay) = backoff.delay_for(attempt) else {
                debug!(target = %self.target, "lock acquisition retries exhausted for this cycle");
                return;
            };
            attempt += 1;
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.cancellation_token.cancelled() => return,
            }
        }
    }

    /// Repeatedly calls the sender while the lock is held, refreshing the
    /// lock between iterations. An empty scan sleeps
    /// [`EMPTY_SCAN_BACKOFF`] and continues holding the lock (backpressure);
    /// leadership is only released when `err_streak` crosses
    /// [`ERR_STREAK_YIELD_THRESHOLD`] or the lock itself is lost.
    async fn hold_and_work(&self, lock: &dyn Lock) {
        let mut err_streak: u32 = 0;
        loop {
            if self.cancellation_token.is_cancelled() {
                return;
            }

            let mut empty_scan = false;
            match timeout(self.config.iter_deadline, self.sender.exec(&self.target)).await {
                Ok(Ok(outcome)) => {
                    err_streak = 0;
                    if outcome.processed == 0 {
                        empty_scan = true;
                    } else {
                        debug!(
                            target = %self.target,
                            processed = outcome.processed,
                            terminal_failures = outcome.terminal_failures,
                            "compensation iteration processed rows"
                        );
                    }
                }
                Ok(Err(e)) => {
                    err_streak += 1;
                    warn!(target = %self.target, error = %e, err_streak, "compensation iteration failed");
                }
                Err(_) => {
                    err_streak += 1;
                    warn!(target = %self.target, err_streak, "compensation iteration deadline exceeded");
                }
            }

            if err_streak >= ERR_STREAK_YIELD_THRESHOLD {
                warn!(target = %self.target, "yielding leadership after repeated failures");
                return;
            }

            match timeout(self.config.lock_acquire_deadline, lock.refresh()).await {
                Ok(Ok(())) => {}
                Ok(Err(RelayError::LockNotHeld)) => {
                    warn!(target = %self.target, "lock lost during hold phase");
                    return;
                }
                Ok(Err(e)) => {
                    warn!(target = %self.target, error = %e, "lock refresh failed");
                    return;
                }
                Err(_) => {
                    warn!(target = %self.target, "lock refresh deadline exceeded");
                    return;
                }
            }

            if empty_scan {
                tokio::select! {
                    _ = tokio::time::sleep(EMPTY_SCAN_BACKOFF) => {}
                    _ = self.cancellation_token.cancelled() => return,
                }
            }
        }
    }
}

impl Drop for CompensationWorker {
    fn drop(&mut self) {
        self.cancellation_token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use relaybox_domain::Result;

    use super::*;
    use crate::ports::SendOutcome;

    struct ScriptedSender {
        calls: AtomicUsize,
        outcomes: Vec<SendOutcome>,
    }

    #[async_trait]
    impl Sender for ScriptedSender {
        async fn exec(&self, _target: &ShardTarget) -> Result<SendOutcome> {
            let i = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.outcomes.get(i).copied().unwrap_or_default())
        }
    }

    struct LocalLock {
        holders: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Lock for LocalLock {
        async fn acquire(&self) -> Result<()> {
            if self.holders.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(())
            } else {
                self.holders.fetch_sub(1, Ordering::SeqCst);
                Err(RelayError::Locked)
            }
        }
        async fn refresh(&self) -> Result<()> {
            Ok(())
        }
        async fn release(&self) -> Result<()> {
            self.holders.store(0, Ordering::SeqCst);
            Ok(())
        }
    }

    struct LocalLockFactory {
        holders: Arc<AtomicU32>,
    }

    impl LockFactory for LocalLockFactory {
        fn new_lock(&self, _key: &str, _ttl: Duration) -> Arc<dyn Lock> {
            Arc::new(LocalLock { holders: self.holders.clone() })
        }
    }

    fn fast_config() -> OutboxConfig {
        let mut config = OutboxConfig::default();
        config.poll_interval = Duration::from_millis(20);
        config.iter_deadline = Duration::from_millis(50);
        config.lock_acquire_deadline = Duration::from_millis(50);
        config
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn start_stop_lifecycle() {
        let sender = Arc::new(ScriptedSender { calls: AtomicUsize::new(0), outcomes: vec![] });
        let factory = Arc::new(LocalLockFactory { holders: Arc::new(AtomicU32::new(0)) });
        let worker =
            CompensationWorker::new(ShardTarget::single("local_msgs"), sender, factory, fast_config());

        assert!(!worker.is_running());
        worker.start().unwrap();
        assert!(worker.is_running());
        assert!(matches!(worker.start(), Err(WorkerError::AlreadyRunning)));
        worker.stop().await.unwrap();
        assert!(!worker.is_running());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn double_stop_fails() {
        let sender = Arc::new(ScriptedSender { calls: AtomicUsize::new(0), outcomes: vec![] });
        let factory = Arc::new(LocalLockFactory { holders: Arc::new(AtomicU32::new(0)) });
        let worker =
            CompensationWorker::new(ShardTarget::single("local_msgs"), sender, factory, fast_config());
        worker.start().unwrap();
        worker.stop().await.unwrap();
        assert!(matches!(worker.stop().await, Err(WorkerError::NotRunning)));
    }

    /// Drains a backlog, then keeps holding the lock across empty scans
    /// (backpressure) rather than releasing leadership: an empty scan
    /// sleeps and loops instead of returning.
    #[tokio::test(flavor = "multi_thread")]
    async fn drains_backlog_then_holds_lock_through_empty_scans() {
        let outcomes = vec![
            SendOutcome { processed: 3, terminal_failures: 0 },
            SendOutcome { processed: 1, terminal_failures: 0 },
            SendOutcome { processed: 0, terminal_failures: 0 },
        ];
        let sender = Arc::new(ScriptedSender { calls: AtomicUsize::new(0), outcomes });
        let holders = Arc::new(AtomicU32::new(0));
        let factory = Arc::new(LocalLockFactory { holders: holders.clone() });
        let worker =
            CompensationWorker::new(ShardTarget::single("local_msgs"), sender, factory, fast_config());

        worker.start().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(holders.load(Ordering::SeqCst), 1, "lock stays held across empty scans");

        worker.stop().await.unwrap();
        assert_eq!(holders.load(Ordering::SeqCst), 0);
    }
}
