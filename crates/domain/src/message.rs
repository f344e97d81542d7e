//! The logical message a business transaction intends to publish.

use serde::{Deserialize, Serialize};

/// Sentinel partition value meaning "let the broker choose".
pub const PARTITION_UNSET: i32 = -1;

/// A domain message awaiting publication to the broker.
///
/// `key` is used for correlation and partition hashing; it need not be
/// unique across messages (see the outbox store's bulk-update hazard note).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub topic: String,
    /// `None` / [`PARTITION_UNSET`] means "broker chooses".
    pub partition: Option<i32>,
    pub key: String,
    pub content: Vec<u8>,
}

impl Message {
    pub fn new(topic: impl Into<String>, key: impl Into<String>, content: Vec<u8>) -> Self {
        Self { topic: topic.into(), partition: None, key: key.into(), content }
    }

    pub fn with_partition(mut self, partition: i32) -> Self {
        self.partition = Some(partition);
        self
    }

    pub fn partition_or_unset(&self) -> i32 {
        self.partition.unwrap_or(PARTITION_UNSET)
    }
}
