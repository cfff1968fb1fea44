//! JSON codec for relay messages.
//!
//! Wire format: one JSON object per unidirectional channel, no length prefix.
//! The channel's end-of-stream delimits the message.

use crate::error::{RelayError, RelayResult};
use crate::message::Message;
use serde::Deserialize;

/// Decode a complete channel payload into a message.
///
/// Unknown keys are ignored. Missing keys, wrong value types, and anything
/// that is not a JSON object are decode errors.
pub fn decode(data: &[u8]) -> RelayResult<Message> {
    let value: serde_json::Value = serde_json::from_slice(data)?;
    if !value.is_object() {
        return Err(RelayError::Decode("expected a JSON object".into()));
    }
    let message = Message::deserialize(value)?;
    Ok(message)
}

/// Encode a message for writing to an outbound channel.
pub fn encode(message: &Message) -> Vec<u8> {
    serde_json::json!({
        "type": message.kind.as_str(),
        "timestamp": message.timestamp,
    })
    .to_string()
    .into_bytes()
}
