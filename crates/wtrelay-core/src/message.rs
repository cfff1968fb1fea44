//! The wire message exchanged on every unidirectional channel.

use serde::{Deserialize, Serialize};

/// Message type tag.
///
/// The wire value is an open string: anything other than `"ping"` or
/// `"pong"` is carried as `Other` and ignored by the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum MessageKind {
    Ping,
    Pong,
    Other(String),
}

impl MessageKind {
    pub fn as_str(&self) -> &str {
        match self {
            MessageKind::Ping => "ping",
            MessageKind::Pong => "pong",
            MessageKind::Other(s) => s,
        }
    }
}

impl From<String> for MessageKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "ping" => MessageKind::Ping,
            "pong" => MessageKind::Pong,
            _ => MessageKind::Other(s),
        }
    }
}

impl From<&str> for MessageKind {
    fn from(s: &str) -> Self {
        MessageKind::from(s.to_string())
    }
}

impl From<MessageKind> for String {
    fn from(k: MessageKind) -> String {
        match k {
            MessageKind::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

/// A single relay message: `{"type": ..., "timestamp": ...}`.
///
/// `timestamp` is opaque to the server and echoed back verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub timestamp: i64,
}

impl Message {
    pub fn new(kind: impl Into<MessageKind>, timestamp: i64) -> Self {
        Self {
            kind: kind.into(),
            timestamp,
        }
    }

    pub fn ping(timestamp: i64) -> Self {
        Self::new(MessageKind::Ping, timestamp)
    }

    pub fn pong(timestamp: i64) -> Self {
        Self::new(MessageKind::Pong, timestamp)
    }

    pub fn is_ping(&self) -> bool {
        self.kind == MessageKind::Ping
    }

    /// The reply this message calls for, if any.
    ///
    /// Only a ping gets one: a pong carrying the ping's timestamp unchanged.
    pub fn reply(&self) -> Option<Message> {
        self.is_ping().then(|| Message::pong(self.timestamp))
    }
}
