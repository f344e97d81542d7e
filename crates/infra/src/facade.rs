//! The transactional facade (C6): `ExecTx`, `SendMsg`, `SaveMsg`.
//!
//! Grounded on `ShardingService` in `internal/service/sharding_service.go`.
//! Unlike the ports in `relaybox-core`, this type is concrete rather than a
//! trait object: `ExecTx`'s business closure borrows a live
//! `rusqlite::Transaction<'_>`, and that lifetime can't cross an
//! `async_trait` object-safety boundary cleanly. The original's own
//! `ShardingService` is concrete for the same reason (it holds
//! `map[string]*gorm.DB`, not an interface).

use std::sync::Arc;

use relaybox_common::now_ms;
use relaybox_core::ports::{BrokerClient, MessageCodec, OutboxStore, ShardingPolicy};
use relaybox_domain::{
    Message, NewOutboxRecord, OutboxConfig, OutboxStatus, RelayError, Result, SendOutcomeUpdate,
    ShardTarget,
};
use rusqlite::Transaction;

use crate::db::manager::DbManager;
use crate::db::outbox_store::SqliteOutboxStore;

fn map_storage_error(e: rusqlite::Error) -> RelayError {
    RelayError::Database(e.to_string())
}

fn map_join_error(e: tokio::task::JoinError) -> RelayError {
    RelayError::Internal(format!("blocking task panicked: {e}"))
}

#[derive(Clone)]
pub struct TransactionalOutbox {
    db: Arc<DbManager>,
    store: Arc<SqliteOutboxStore>,
    sharding: Arc<dyn ShardingPolicy>,
    codec: Arc<dyn MessageCodec>,
    broker: Arc<dyn BrokerClient>,
    config: OutboxConfig,
}

impl TransactionalOutbox {
    pub fn new(
        db: Arc<DbManager>,
        sharding: Arc<dyn ShardingPolicy>,
        codec: Arc<dyn MessageCodec>,
        broker: Arc<dyn BrokerClient>,
        config: OutboxConfig,
    ) -> Self {
        let store = Arc::new(SqliteOutboxStore::new(db.clone()));
        Self { db, store, sharding, codec, broker, config }
    }

    /// Run `biz` and the outbox insert in one transaction, then detach a
    /// task that attempts immediate delivery once the transaction has
    /// committed. `biz` receives the same transaction the outbox row is
    /// written through.
    pub async fn exec_tx<F>(&self, message: Message, biz: F) -> Result<()>
    where
        F: FnOnce(&Transaction<'_>) -> Result<()> + Send + 'static,
    {
        let target = self.sharding.route(&message.key);
        let data = self.codec.encode(&message)?;
        let record = NewOutboxRecord { key: message.key.clone(), data };

        let db = self.db.clone();
        let target_for_tx = target.clone();
        let id = tokio::task::spawn_blocking(move || -> Result<i64> {
            let mut conn = db.get_connection()?;
            let tx = conn.transaction().map_err(map_storage_error)?;
            biz(&tx)?;
            let id = SqliteOutboxStore::insert_in_tx(&tx, &target_for_tx, &record)?;
            tx.commit().map_err(map_storage_error)?;
            Ok(id)
        })
        .await
        .map_err(map_join_error)??;

        let this = self.clone();
        tokio::spawn(async move {
            if let Err(e) = this.send_msg(&target, id).await {
                tracing::debug!(id, error = %e, "immediate send after ExecTx failed, leaving to compensation");
            }
        });
        Ok(())
    }

    /// Insert the outbox row through a transaction the caller already
    /// holds, without attempting delivery. For callers composing their own
    /// transaction boundary around a business write that shares this
    /// engine's `DbManager`.
    pub fn save_msg(&self, tx: &Transaction<'_>, message: &Message) -> Result<i64> {
        let target = self.sharding.route(&message.key);
        let data = self.codec.encode(message)?;
        let record = NewOutboxRecord { key: message.key.clone(), data };
        SqliteOutboxStore::insert_in_tx(tx, &target, &record)
    }

    /// List rows for the admin surface.
    pub async fn list(&self, target: &ShardTarget, query: &relaybox_domain::OutboxQuery) -> Result<Vec<relaybox_domain::OutboxRecord>> {
        self.store.list(target, query).await
    }

    pub fn decode_message(&self, data: &[u8]) -> Result<Message> {
        self.codec.decode(data)
    }

    /// Send a single already-persisted row (step 6 only): decode, forward
    /// to the broker, and transition its status. Used for `ExecTx`'s
    /// immediate-send attempt and for admin-triggered manual retries.
    pub async fn send_msg(&self, target: &ShardTarget, id: i64) -> Result<()> {
        let Some(row) = self.store.get(target, id).await? else {
            return Err(RelayError::NotFound(format!("outbox row {id} not found")));
        };
        if row.status.is_terminal() {
            return Ok(());
        }

        let send_times = row.send_times + 1;
        let utime = now_ms();
        let outcome = match self.codec.decode(&row.data) {
            Ok(message) => self.broker.send_one(&message).await,
            Err(e) => Err(e),
        };

        let status = match &outcome {
            Ok(()) => OutboxStatus::Success,
            Err(_) if send_times >= self.config.max_times => OutboxStatus::Fail,
            Err(_) => OutboxStatus::Init,
        };

        self.store
            .update_on_send(target, id, SendOutcomeUpdate { status, send_times, utime })
            .await?;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use relaybox_domain::OutboxQuery;

    use super::*;
    use crate::broker::InMemoryBrokerClient;
    use crate::codec::JsonMessageCodec;
    use crate::sharding::SingleShardPolicy;

    fn facade(broker: Arc<InMemoryBrokerClient>) -> TransactionalOutbox {
        let db = Arc::new(DbManager::in_memory().unwrap());
        TransactionalOutbox::new(
            db,
            Arc::new(SingleShardPolicy::new("local_msgs")),
            Arc::new(JsonMessageCodec),
            broker,
            OutboxConfig::default(),
        )
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn exec_tx_commits_biz_write_and_outbox_row_together() {
        let broker = Arc::new(InMemoryBrokerClient::new());
        let facade = facade(broker.clone());
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_for_biz = counter.clone();

        facade
            .exec_tx(Message::new("topic", "k1", b"payload".to_vec()), move |_tx| {
                counter_for_biz.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 1);

        let target = ShardTarget::single("local_msgs");
        let rows = facade.store.list(&target, &OutboxQuery::default()).await.unwrap();
        assert_eq!(rows.len(), 1);

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let rows = facade.store.list(&target, &OutboxQuery::default()).await.unwrap();
        assert_eq!(rows[0].status, OutboxStatus::Success);
        assert_eq!(broker.sent_messages().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn exec_tx_rolls_back_outbox_row_when_biz_fails() {
        let broker = Arc::new(InMemoryBrokerClient::new());
        let facade = facade(broker.clone());

        let result = facade
            .exec_tx(Message::new("topic", "k1", b"payload".to_vec()), |_tx| {
                Err(RelayError::InvalidInput("biz rejected".into()))
            })
            .await;
        assert!(result.is_err());

        let target = ShardTarget::single("local_msgs");
        let rows = facade.store.list(&target, &OutboxQuery::default()).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn send_msg_on_broker_failure_leaves_row_for_compensation() {
        let broker = Arc::new(InMemoryBrokerClient::with_failing_keys(["k1".to_string()]));
        let facade = facade(broker);

        facade.exec_tx(Message::new("topic", "k1", b"payload".to_vec()), |_tx| Ok(())).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let target = ShardTarget::single("local_msgs");
        let rows = facade.store.list(&target, &OutboxQuery::default()).await.unwrap();
        assert_eq!(rows[0].status, OutboxStatus::Init);
        assert_eq!(rows[0].send_times, 1);
    }
}
