//! wtrelay-core: Shared protocol library for the WebTransport ping relay.
//!
//! Provides the wire message, its JSON codec, the error taxonomy, and the
//! transport capability traits the server is written against.

pub mod codec;
pub mod error;
pub mod message;
pub mod transport;

// Re-export commonly used items at crate root.
pub use codec::{decode, encode};
pub use error::{RelayError, RelayResult};
pub use message::{Message, MessageKind};
pub use transport::{IncomingSession, SendStream, Session, SessionListener};
