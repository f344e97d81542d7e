//! Concrete adapters for the outbox engine: SQLite storage, table- and
//! KV-backed distributed locks, a JSON codec, sharding policies, an
//! in-memory broker client for tests/demos, the transactional facade, the
//! admin surface, configuration loading, and logging bootstrap.

pub mod admin_service;
pub mod broker;
pub mod codec;
pub mod config_loader;
pub mod db;
pub mod facade;
pub mod lock;
pub mod logging;
pub mod sharding;

pub use admin_service::{AdminMessageView, AdminService};
pub use broker::InMemoryBrokerClient;
pub use codec::JsonMessageCodec;
pub use config_loader::load_config;
pub use db::{DbManager, SqliteOutboxStore};
pub use facade::TransactionalOutbox;
pub use lock::{InMemoryKvStore, KvLockFactory, KvStore, TableLockFactory};
pub use sharding::{ModuloShardingPolicy, SingleShardPolicy};
