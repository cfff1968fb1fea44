//! WebTransport listener using wtransport (HTTP/3 over QUIC).
//!
//! Maps wtransport's endpoint, session request, connection and
//! unidirectional stream types onto the relay's transport traits.

use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::AsyncWrite;
use tracing::{debug, info};
use wtransport::endpoint::endpoint_side::Server;
use wtransport::error::{ConnectionError, StreamOpeningError, StreamWriteError};
use wtransport::{Connection, Endpoint, Identity, RecvStream, ServerConfig, VarInt};
use wtrelay_core::transport::{
    path_matches, IncomingSession, SendStream, Session, SessionListener,
};
use wtrelay_core::{RelayError, RelayResult};

/// Load the server certificate chain and private key from PEM files.
pub async fn load_identity(cert_path: &Path, key_path: &Path) -> RelayResult<Identity> {
    Identity::load_pemfiles(cert_path, key_path)
        .await
        .map_err(|e| {
            RelayError::Identity(format!(
                "cannot load {} / {}: {e}",
                cert_path.display(),
                key_path.display()
            ))
        })
}

/// A bound WebTransport endpoint.
pub struct WebTransportListener {
    endpoint: Endpoint<Server>,
}

impl WebTransportListener {
    /// Bind the QUIC endpoint on `bind_addr`. Failure is fatal to startup.
    pub fn bind(
        bind_addr: SocketAddr,
        identity: Identity,
        keep_alive: Option<Duration>,
    ) -> RelayResult<Self> {
        let config = ServerConfig::builder()
            .with_bind_address(bind_addr)
            .with_identity(identity)
            .keep_alive_interval(keep_alive)
            .build();

        let endpoint = Endpoint::server(config)
            .map_err(|e| RelayError::Bind(format!("WebTransport endpoint {bind_addr}: {e}")))?;

        info!(addr = %bind_addr, "WebTransport (QUIC) listener started");
        Ok(Self { endpoint })
    }
}

impl SessionListener for WebTransportListener {
    type Incoming = WebTransportIncoming;

    async fn accept(&self) -> Option<WebTransportIncoming> {
        let incoming = self.endpoint.accept().await;
        Some(WebTransportIncoming { incoming })
    }
}

/// A QUIC connection whose HTTP/3 session request has not been answered yet.
pub struct WebTransportIncoming {
    incoming: wtransport::endpoint::IncomingSession,
}

impl IncomingSession for WebTransportIncoming {
    type Session = WebTransportSession;

    async fn upgrade(self, path: &str) -> RelayResult<WebTransportSession> {
        let request = self
            .incoming
            .await
            .map_err(|e| RelayError::Upgrade(format!("handshake failed: {e}")))?;

        if !path_matches(request.path(), path) {
            let requested = request.path().to_string();
            request.not_found().await;
            return Err(RelayError::Upgrade(format!(
                "no endpoint registered at {requested}"
            )));
        }

        // A failed accept means the CONNECT response could not be sent, so
        // the peer only observes the connection closing.
        let connection = request
            .accept()
            .await
            .map_err(|e| RelayError::Upgrade(format!("accept failed: {e}")))?;

        debug!(remote = %connection.remote_address(), "WebTransport session established");
        Ok(WebTransportSession { connection })
    }
}

/// Error opening an outbound unidirectional stream.
#[derive(Debug, thiserror::Error)]
pub enum OpenUniError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Opening(#[from] StreamOpeningError),
}

/// An established WebTransport session.
pub struct WebTransportSession {
    connection: Connection,
}

impl Session for WebTransportSession {
    type RecvStream = RecvStream;
    type SendStream = WebTransportSendStream;
    type AcceptError = ConnectionError;
    type OpenError = OpenUniError;

    async fn accept_uni(&self) -> Result<RecvStream, ConnectionError> {
        self.connection.accept_uni().await
    }

    async fn open_uni(&self) -> Result<WebTransportSendStream, OpenUniError> {
        let opening = self.connection.open_uni().await?;
        Ok(WebTransportSendStream(opening.await?))
    }

    fn close(&self, code: u32, reason: &[u8]) {
        self.connection.close(VarInt::from_u32(code), reason);
    }

    fn remote_address(&self) -> SocketAddr {
        self.connection.remote_address()
    }
}

/// Outbound unidirectional stream of a WebTransport session.
pub struct WebTransportSendStream(wtransport::SendStream);

impl AsyncWrite for WebTransportSendStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().0).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().0).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().0).poll_shutdown(cx)
    }
}

impl SendStream for WebTransportSendStream {
    type FinishError = StreamWriteError;

    async fn finish(&mut self) -> Result<(), StreamWriteError> {
        self.0.finish().await
    }
}
