//! Transport capability traits.
//!
//! The relay only needs a narrow slice of a multiplexed transport: accept
//! session requests, upgrade them, accept inbound unidirectional streams,
//! and open outbound ones. Both the WebTransport adapter and the in-memory
//! test transport implement these traits.

use crate::error::RelayResult;
use std::future::Future;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite};

/// A listening endpoint that yields session requests.
pub trait SessionListener: Send + Sync + 'static {
    /// A session request that has not yet been upgraded.
    type Incoming: IncomingSession;

    /// Wait for the next incoming session request.
    ///
    /// Returns `None` once the endpoint is closed.
    fn accept(&self) -> impl Future<Output = Option<Self::Incoming>> + Send;
}

/// A pending session request.
pub trait IncomingSession: Send + 'static {
    /// The session produced by a successful upgrade.
    type Session: Session;

    /// Complete the transport handshake and upgrade the request to a session.
    ///
    /// Requests for any path other than `path` are answered with a not-found
    /// status. A failed upgrade is answered with a generic server error where
    /// the transport still allows a response. Either way a
    /// `RelayError::Upgrade` is returned.
    fn upgrade(self, path: &str) -> impl Future<Output = RelayResult<Self::Session>> + Send;
}

/// One client's multiplexed session.
///
/// Shared by `Arc` between the session's accept loop and its stream workers.
pub trait Session: Send + Sync + 'static {
    /// Inbound unidirectional stream, read to end-of-stream.
    type RecvStream: AsyncRead + Send + Unpin + 'static;
    /// Outbound unidirectional stream.
    type SendStream: SendStream;
    /// Error accepting an inbound stream. Also returned when the session closes.
    type AcceptError: std::error::Error + Send + Sync + 'static;
    /// Error opening an outbound stream.
    type OpenError: std::error::Error + Send + Sync + 'static;

    /// Wait for the peer to open the next unidirectional stream.
    fn accept_uni(
        &self,
    ) -> impl Future<Output = Result<Self::RecvStream, Self::AcceptError>> + Send;

    /// Open a new unidirectional stream towards the peer.
    fn open_uni(&self) -> impl Future<Output = Result<Self::SendStream, Self::OpenError>> + Send;

    /// Close the session with an application error code and reason.
    fn close(&self, code: u32, reason: &[u8]);

    /// Remote address of the peer.
    fn remote_address(&self) -> SocketAddr;
}

/// An outbound unidirectional stream.
pub trait SendStream: AsyncWrite + Send + Unpin + 'static {
    /// Error finishing the stream.
    type FinishError: std::error::Error + Send + Sync + 'static;

    /// Signal end-of-stream to the peer.
    fn finish(&mut self) -> impl Future<Output = Result<(), Self::FinishError>> + Send;
}

/// Whether a request target addresses the registered `path`.
///
/// Only the path component is compared; any query string is ignored.
pub fn path_matches(target: &str, path: &str) -> bool {
    target.split_once('?').map_or(target, |(p, _)| p) == path
}
