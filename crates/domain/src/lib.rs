//! Plain data types for the transactional outbox engine: no I/O, no
//! trait objects; those live in `relaybox-core` and `relaybox-infra`.

pub mod config;
pub mod error;
pub mod message;
pub mod outbox;
pub mod shard;

pub use config::{OutboxConfig, SenderStrategy};
pub use error::{RelayError, Result};
pub use message::{Message, PARTITION_UNSET};
pub use outbox::{NewOutboxRecord, OutboxQuery, OutboxRecord, OutboxStatus, SendOutcomeUpdate};
pub use shard::ShardTarget;
