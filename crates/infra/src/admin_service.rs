//! Admin surface (C9): list outbox rows and manually retry one.
//!
//! Grounded on `internal/admin/service/local_service.go`'s `LocalService`:
//! a name -> engine registry (`svcs map[string]*ShardingService`). A
//! transport layer (HTTP handler, RPC service, CLI) sits in front of this
//! registry on the host side; wiring one is left to the host.

use std::sync::Arc;

use dashmap::DashMap;
use relaybox_domain::{Message, OutboxQuery, OutboxRecord, RelayError, Result, ShardTarget};

use crate::facade::TransactionalOutbox;

/// A listed row alongside its best-effort decoded message. `message` is
/// `None` when the stored bytes fail to decode (corruption, codec version
/// skew), the row itself is still surfaced rather than dropped.
#[derive(Debug, Clone)]
pub struct AdminMessageView {
    pub record: OutboxRecord,
    pub message: Option<Message>,
}

#[derive(Default)]
pub struct AdminService {
    services: DashMap<String, Arc<TransactionalOutbox>>,
}

impl AdminService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, biz: impl Into<String>, service: Arc<TransactionalOutbox>) {
        self.services.insert(biz.into(), service);
    }

    fn lookup(&self, biz: &str) -> Result<Arc<TransactionalOutbox>> {
        self.services
            .get(biz)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RelayError::NotFound(format!("no outbox engine registered for biz {biz}")))
    }

    pub async fn list(
        &self,
        biz: &str,
        target: &ShardTarget,
        query: &OutboxQuery,
    ) -> Result<Vec<AdminMessageView>> {
        let service = self.lookup(biz)?;
        let rows = service.list(target, query).await?;
        Ok(rows
            .into_iter()
            .map(|record| {
                let message = service.decode_message(&record.data).ok();
                AdminMessageView { record, message }
            })
            .collect())
    }

    pub async fn retry(&self, biz: &str, target: &ShardTarget, id: i64) -> Result<()> {
        let service = self.lookup(biz)?;
        service.send_msg(target, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::InMemoryBrokerClient;
    use crate::codec::JsonMessageCodec;
    use crate::db::manager::DbManager;
    use crate::sharding::SingleShardPolicy;
    use relaybox_domain::{Message, OutboxConfig, OutboxStatus};

    fn build_service(broker: Arc<InMemoryBrokerClient>) -> Arc<TransactionalOutbox> {
        let db = Arc::new(DbManager::in_memory().unwrap());
        Arc::new(TransactionalOutbox::new(
            db,
            Arc::new(SingleShardPolicy::new("local_msgs")),
            Arc::new(JsonMessageCodec),
            broker,
            OutboxConfig::default(),
        ))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn retry_unknown_biz_is_not_found() {
        let admin = AdminService::new();
        let target = ShardTarget::single("local_msgs");
        assert!(admin.retry("unknown", &target, 1).await.is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn retry_delivers_a_previously_failed_row() {
        let broker = Arc::new(InMemoryBrokerClient::with_failing_keys(["k1".to_string()]));
        let service = build_service(broker.clone());
        let admin = AdminService::new();
        admin.register("orders", service.clone());

        service.exec_tx(Message::new("topic", "k1", b"payload".to_vec()), |_tx| Ok(())).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let target = ShardTarget::single("local_msgs");
        let rows_before = admin.list("orders", &target, &OutboxQuery::default()).await.unwrap();
        assert_eq!(rows_before[0].record.status, OutboxStatus::Init);

        broker.set_failing("k1", false);
        admin.retry("orders", &target, rows_before[0].record.id).await.unwrap();

        let rows_after = admin.list("orders", &target, &OutboxQuery::default()).await.unwrap();
        assert_eq!(rows_after[0].record.status, OutboxStatus::Success);
        assert_eq!(rows_after[0].message.as_ref().unwrap().key, "k1");
    }
}
