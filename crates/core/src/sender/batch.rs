//! A single broker call for the whole batch. Grounded on the original's
//! `BatchMsgExecutor`, which trades per-message retry precision for fewer
//! broker round-trips; partial failures are attributed back to rows by key,
//! so rows sharing a key succeed or fail together.

use std::collections::HashSet;
use std::sync::Arc;

use relaybox_common::now_ms;
use relaybox_domain::{OutboxConfig, OutboxStatus, OutboxRecord, Result, ShardTarget};

use crate::ports::{BrokerClient, MessageCodec, OutboxStore, SendManyError, SendOutcome, Sender};

pub struct BatchSender {
    store: Arc<dyn OutboxStore>,
    broker: Arc<dyn BrokerClient>,
    codec: Arc<dyn MessageCodec>,
    config: OutboxConfig,
}

impl BatchSender {
    pub fn new(
        store: Arc<dyn OutboxStore>,
        broker: Arc<dyn BrokerClient>,
        codec: Arc<dyn MessageCodec>,
        config: OutboxConfig,
    ) -> Self {
        Self { store, broker, codec, config }
    }
}

#[async_trait::async_trait]
impl Sender for BatchSender {
    async fn exec(&self, target: &ShardTarget) -> Result<SendOutcome> {
        let rows = self
            .store
            .find_stuck(target, self.config.wait_duration, self.config.batch_size)
            .await?;
        if rows.is_empty() {
            return Ok(SendOutcome::default());
        }

        let mut messages = Vec::with_capacity(rows.len());
        for row in &rows {
            messages.push(self.codec.decode(&row.data)?);
        }

        let utime = now_ms();
        let processed = rows.len();

        let (succeeded_keys, failed_keys) = match self.broker.send_many(&messages).await {
            Ok(()) => {
                let all_keys: HashSet<String> = rows.iter().map(|r| r.key.clone()).collect();
                (all_keys, HashSet::new())
            }
            Err(SendManyError::Partial { failed_keys }) => {
                let failed: HashSet<String> = failed_keys.into_iter().collect();
                let succeeded: HashSet<String> =
                    rows.iter().map(|r| r.key.clone()).filter(|k| !failed.contains(k)).collect();
                (succeeded, failed)
            }
            Err(SendManyError::Bulk) => {
                let all_keys: HashSet<String> = rows.iter().map(|r| r.key.clone()).collect();
                (HashSet::new(), all_keys)
            }
        };

        if !succeeded_keys.is_empty() {
            let keys: Vec<String> = succeeded_keys.into_iter().collect();
            self.store.update_bulk_by_keys(target, &keys, OutboxStatus::Success, utime).await?;
        }

        let terminal_failures = self.apply_failures(target, &rows, &failed_keys, utime).await?;
        Ok(SendOutcome { processed, terminal_failures })
    }
}

impl BatchSender {
    /// Failed keys split by whether the owning row has exhausted its
    /// retries; rows that haven't are left at `Init` and bulk-bumped, rows
    /// that have are bulk-marked `Fail`.
    async fn apply_failures(
        &self,
        target: &ShardTarget,
        rows: &[OutboxRecord],
        failed_keys: &HashSet<String>,
        utime: i64,
    ) -> Result<usize> {
        if failed_keys.is_empty() {
            return Ok(0);
        }

        let mut retry_keys = Vec::new();
        let mut exhausted_keys = Vec::new();
        for row in rows {
            if !failed_keys.contains(&row.key) {
                continue;
            }
            if row.send_times + 1 >= self.config.max_times {
                exhausted_keys.push(row.key.clone());
            } else {
                retry_keys.push(row.key.clone());
            }
        }

        if !retry_keys.is_empty() {
            self.store.update_bulk_by_keys(target, &retry_keys, OutboxStatus::Init, utime).await?;
        }
        let terminal_failures = exhausted_keys.len();
        if !exhausted_keys.is_empty() {
            tracing::warn!(table = %target, keys = ?exhausted_keys, "batch send exhausted retries for keys");
            self.store.update_bulk_by_keys(target, &exhausted_keys, OutboxStatus::Fail, utime).await?;
        }
        Ok(terminal_failures)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use relaybox_domain::{Message, NewOutboxRecord, OutboxQuery};

    use super::*;

    struct InMemoryStore {
        rows: Mutex<Vec<OutboxRecord>>,
    }

    impl InMemoryStore {
        fn new(rows: Vec<OutboxRecord>) -> Self {
            Self { rows: Mutex::new(rows) }
        }
    }

    #[async_trait::async_trait]
    impl OutboxStore for InMemoryStore {
        async fn insert(&self, _target: &ShardTarget, _record: NewOutboxRecord) -> Result<i64> {
            unimplemented!()
        }
        async fn get(&self, _target: &ShardTarget, id: i64) -> Result<Option<OutboxRecord>> {
            Ok(self.rows.lock().unwrap().iter().find(|r| r.id == id).cloned())
        }
        async fn list(&self, _target: &ShardTarget, _query: &OutboxQuery) -> Result<Vec<OutboxRecord>> {
            Ok(self.rows.lock().unwrap().clone())
        }
        async fn find_stuck(
            &self,
            _target: &ShardTarget,
            _wait_duration: std::time::Duration,
            limit: usize,
        ) -> Result<Vec<OutboxRecord>> {
            Ok(self.rows.lock().unwrap().iter().filter(|r| r.status == OutboxStatus::Init).take(limit).cloned().collect())
        }
        async fn update_on_send(
            &self,
            _target: &ShardTarget,
            _id: i64,
            _update: relaybox_domain::SendOutcomeUpdate,
        ) -> Result<()> {
            unimplemented!()
        }
        async fn update_bulk_by_keys(
            &self,
            _target: &ShardTarget,
            keys: &[String],
            status: OutboxStatus,
            utime: i64,
        ) -> Result<u64> {
            let mut rows = self.rows.lock().unwrap();
            let mut touched = 0;
            for row in rows.iter_mut() {
                if keys.contains(&row.key) {
                    row.status = status;
                    row.send_times += 1;
                    row.utime = utime;
                    touched += 1;
                }
            }
            Ok(touched)
        }
    }

    struct JsonCodec;
    impl MessageCodec for JsonCodec {
        fn encode(&self, message: &Message) -> Result<Vec<u8>> {
            serde_json::to_vec(message).map_err(|e| relaybox_domain::RelayError::Encoding(e.to_string()))
        }
        fn decode(&self, bytes: &[u8]) -> Result<Message> {
            serde_json::from_slice(bytes).map_err(|e| relaybox_domain::RelayError::Encoding(e.to_string()))
        }
    }

    struct PartialBroker {
        fail_keys: Vec<String>,
    }

    #[async_trait::async_trait]
    impl BrokerClient for PartialBroker {
        async fn send_one(&self, _message: &Message) -> Result<()> {
            unreachable!("batch sender never calls send_one")
        }
        async fn send_many(&self, messages: &[Message]) -> std::result::Result<(), SendManyError> {
            let failed: Vec<String> =
                messages.iter().map(|m| m.key.clone()).filter(|k| self.fail_keys.contains(k)).collect();
            if failed.is_empty() {
                Ok(())
            } else {
                Err(SendManyError::Partial { failed_keys: failed })
            }
        }
    }

    fn row(id: i64, key: &str, send_times: i64) -> OutboxRecord {
        let codec = JsonCodec;
        let data = codec.encode(&Message::new("topic", key, b"x".to_vec())).unwrap();
        OutboxRecord { id, key: key.to_string(), data, send_times, status: OutboxStatus::Init, utime: 0, ctime: 0 }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn partial_failure_splits_success_and_retry() {
        let store = Arc::new(InMemoryStore::new(vec![row(1, "ok", 0), row(2, "bad", 0)]));
        let target = ShardTarget::single("local_msgs");
        let sender = BatchSender::new(
            store.clone(),
            Arc::new(PartialBroker { fail_keys: vec!["bad".to_string()] }),
            Arc::new(JsonCodec),
            OutboxConfig::default(),
        );

        let outcome = sender.exec(&target).await.unwrap();
        assert_eq!(outcome.processed, 2);
        assert_eq!(outcome.terminal_failures, 0);

        let ok = store.get(&target, 1).await.unwrap().unwrap();
        assert_eq!(ok.status, OutboxStatus::Success);
        let bad = store.get(&target, 2).await.unwrap().unwrap();
        assert_eq!(bad.status, OutboxStatus::Init);
        assert_eq!(bad.send_times, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn exhausted_key_goes_terminal() {
        let mut config = OutboxConfig::default();
        config.max_times = 2;
        let store = Arc::new(InMemoryStore::new(vec![row(1, "bad", 1)]));
        let target = ShardTarget::single("local_msgs");
        let sender = BatchSender::new(
            store.clone(),
            Arc::new(PartialBroker { fail_keys: vec!["bad".to_string()] }),
            Arc::new(JsonCodec),
            config,
        );

        let outcome = sender.exec(&target).await.unwrap();
        assert_eq!(outcome.terminal_failures, 1);
        let bad = store.get(&target, 1).await.unwrap().unwrap();
        assert_eq!(bad.status, OutboxStatus::Fail);
    }
}
