//! Default [`MessageCodec`] (C1): JSON over `serde_json`, matching the
//! original's `json.Marshal`/`json.Unmarshal` of `dmsg.Data`.

use relaybox_domain::{Message, RelayError, Result};
use relaybox_core::ports::MessageCodec;

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonMessageCodec;

impl MessageCodec for JsonMessageCodec {
    fn encode(&self, message: &Message) -> Result<Vec<u8>> {
        serde_json::to_vec(message).map_err(|e| RelayError::Encoding(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Message> {
        serde_json::from_slice(bytes).map_err(|e| RelayError::Encoding(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_message() {
        let codec = JsonMessageCodec;
        let message = Message::new("topic", "key", b"payload".to_vec()).with_partition(2);
        let bytes = codec.encode(&message).unwrap();
        let decoded = codec.decode(&bytes).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn rejects_malformed_bytes() {
        let codec = JsonMessageCodec;
        assert!(codec.decode(b"not json").is_err());
    }
}
