//! Storage- and broker-agnostic outbox engine: ports the adapters implement
//! (C1-C5 contracts), the two sender strategies, the metrics decorator, and
//! the compensation worker. Nothing in this crate touches a concrete
//! database, broker, or lock backend; those live in `relaybox-infra`.

pub mod metrics;
pub mod ports;
pub mod scheduler;
pub mod sender;

pub use metrics::MetricsSender;
pub use ports::{
    BrokerClient, Lock, LockFactory, MessageCodec, OutboxStore, SendManyError, SendOutcome,
    Sender, ShardingPolicy,
};
pub use scheduler::{CompensationWorker, WorkerError};
pub use sender::{BatchSender, PerMessageSender};
