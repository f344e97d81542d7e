//! One broker call per candidate row, executed concurrently and bounded by
//! `batch_size` in-flight sends. Grounded on the original's `CurMsgExecutor`:
//! each row is sent independently and a sibling's failure never cancels the
//! others.

use std::sync::Arc;

use relaybox_common::now_ms;
use relaybox_domain::{OutboxConfig, OutboxStatus, Result, SendOutcomeUpdate, ShardTarget};

use crate::ports::{BrokerClient, MessageCodec, OutboxStore, SendOutcome, Sender};

pub struct PerMessageSender {
    store: Arc<dyn OutboxStore>,
    broker: Arc<dyn BrokerClient>,
    codec: Arc<dyn MessageCodec>,
    config: OutboxConfig,
}

impl PerMessageSender {
    pub fn new(
        store: Arc<dyn OutboxStore>,
        broker: Arc<dyn BrokerClient>,
        codec: Arc<dyn MessageCodec>,
        config: OutboxConfig,
    ) -> Self {
        Self { store, broker, codec, config }
    }

    /// Send a single row and persist its resulting status. Returns `true`
    /// if the row just became terminally `Fail`.
    async fn send_one(&self, target: &ShardTarget, row: relaybox_domain::OutboxRecord) -> Result<bool> {
        let send_times = row.send_times + 1;
        let utime = now_ms();

        let outcome = match self.codec.decode(&row.data) {
            Ok(message) => self.broker.send_one(&message).await,
            Err(e) => Err(e),
        };

        let (status, became_fail) = match outcome {
            Ok(()) => (OutboxStatus::Success, false),
            Err(e) => {
                if send_times >= self.config.max_times {
                    tracing::warn!(id = row.id, key = %row.key, error = %e, "message send exhausted retries");
                    (OutboxStatus::Fail, true)
                } else {
                    tracing::debug!(id = row.id, key = %row.key, attempt = send_times, error = %e, "message send failed, will retry");
                    (OutboxStatus::Init, false)
                }
            }
        };

        self.store
            .update_on_send(target, row.id, SendOutcomeUpdate { status, send_times, utime })
            .await?;
        Ok(became_fail)
    }
}

#[async_trait::async_trait]
impl Sender for PerMessageSender {
    async fn exec(&self, target: &ShardTarget) -> Result<SendOutcome> {
        let rows = self
            .store
            .find_stuck(target, self.config.wait_duration, self.config.batch_size)
            .await?;
        if rows.is_empty() {
            return Ok(SendOutcome::default());
        }

        let processed = rows.len();
        let futures = rows.into_iter().map(|row| self.send_one(target, row));
        let results = futures::future::join_all(futures).await;

        let mut terminal_failures = 0;
        for r in results {
            if r? {
                terminal_failures += 1;
            }
        }
        Ok(SendOutcome { processed, terminal_failures })
    }
}
