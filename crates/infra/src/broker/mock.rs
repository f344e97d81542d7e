//! An in-process [`BrokerClient`] for tests and local demos.
//!
//! The broker is an external collaborator the original leaves pluggable
//! (any `mq.Producer`); the corpus doesn't pull in a real broker client
//! crate, so this in-memory recorder stands in rather than fabricating one.
//! A production host wires its own `BrokerClient` (e.g. over a Kafka or
//! Pulsar client crate) instead of this type.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use relaybox_domain::{Message, RelayError, Result};
use relaybox_core::ports::{BrokerClient, SendManyError};

#[derive(Default)]
pub struct InMemoryBrokerClient {
    sent: Mutex<Vec<Message>>,
    failing_keys: Mutex<HashSet<String>>,
}

impl InMemoryBrokerClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failing_keys(keys: impl IntoIterator<Item = String>) -> Self {
        Self { sent: Mutex::new(Vec::new()), failing_keys: Mutex::new(keys.into_iter().collect()) }
    }

    pub fn set_failing(&self, key: impl Into<String>, fail: bool) {
        let mut failing = self.failing_keys.lock().unwrap_or_else(|e| e.into_inner());
        let key = key.into();
        if fail {
            failing.insert(key);
        } else {
            failing.remove(&key);
        }
    }

    pub fn sent_messages(&self) -> Vec<Message> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn is_failing(&self, key: &str) -> bool {
        self.failing_keys.lock().unwrap_or_else(|e| e.into_inner()).contains(key)
    }
}

#[async_trait]
impl BrokerClient for InMemoryBrokerClient {
    async fn send_one(&self, message: &Message) -> Result<()> {
        if self.is_failing(&message.key) {
            return Err(RelayError::Broker(format!("broker refused key {}", message.key)));
        }
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).push(message.clone());
        Ok(())
    }

    async fn send_many(&self, messages: &[Message]) -> std::result::Result<(), SendManyError> {
        let mut failed_keys = Vec::new();
        let mut sent = self.sent.lock().unwrap_or_else(|e| e.into_inner());
        for message in messages {
            if self.is_failing(&message.key) {
                failed_keys.push(message.key.clone());
            } else {
                sent.push(message.clone());
            }
        }
        if failed_keys.is_empty() {
            Ok(())
        } else {
            Err(SendManyError::Partial { failed_keys })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_successfully_sent_messages() {
        let broker = InMemoryBrokerClient::new();
        let message = Message::new("topic", "k1", b"x".to_vec());
        broker.send_one(&message).await.unwrap();
        assert_eq!(broker.sent_messages(), vec![message]);
    }

    #[tokio::test]
    async fn failing_key_is_refused_without_recording() {
        let broker = InMemoryBrokerClient::with_failing_keys(["bad".to_string()]);
        let message = Message::new("topic", "bad", b"x".to_vec());
        assert!(broker.send_one(&message).await.is_err());
        assert!(broker.sent_messages().is_empty());
    }
}
