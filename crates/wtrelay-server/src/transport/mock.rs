//! In-memory transport for tests.
//!
//! A `MockConnector` plays the client side of a `MockListener`; each
//! connection yields a `MockPeer` that pushes inbound streams and observes
//! replies, session closure, and the upgrade response status.

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::mpsc;
use wtrelay_core::transport::{
    path_matches, IncomingSession, SendStream, Session, SessionListener,
};
use wtrelay_core::{encode, Message, RelayError, RelayResult};

/// Error type for mock transport operations.
#[derive(Debug, thiserror::Error)]
pub enum MockError {
    #[error("session closed")]
    SessionClosed,

    #[error("stream refused")]
    Refused,
}

/// State shared between a `MockSession` and its `MockPeer`.
#[derive(Debug, Default)]
struct Shared {
    opened: AtomicUsize,
    refuse_open: AtomicBool,
    closed: Mutex<Option<(u32, String)>>,
    close_calls: AtomicUsize,
}

impl Shared {
    fn is_closed(&self) -> bool {
        self.closed.lock().unwrap().is_some()
    }
}

/// Create a session and the peer that drives it.
pub fn mock_session(remote: SocketAddr) -> (MockSession, MockPeer) {
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (reply_tx, reply_rx) = mpsc::unbounded_channel();
    let shared = Arc::new(Shared::default());

    let session = MockSession {
        inbound: tokio::sync::Mutex::new(inbound_rx),
        replies: reply_tx,
        shared: Arc::clone(&shared),
        remote,
    };
    let peer = MockPeer {
        inbound: Some(inbound_tx),
        replies: reply_rx,
        shared,
        status: Arc::new(Mutex::new(None)),
    };
    (session, peer)
}

/// Server side of a mock session.
#[derive(Debug)]
pub struct MockSession {
    inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<MockRecvStream>>,
    replies: mpsc::UnboundedSender<Vec<u8>>,
    shared: Arc<Shared>,
    remote: SocketAddr,
}

impl Session for MockSession {
    type RecvStream = MockRecvStream;
    type SendStream = MockSendStream;
    type AcceptError = MockError;
    type OpenError = MockError;

    async fn accept_uni(&self) -> Result<MockRecvStream, MockError> {
        if self.shared.is_closed() {
            return Err(MockError::SessionClosed);
        }
        self.inbound
            .lock()
            .await
            .recv()
            .await
            .ok_or(MockError::SessionClosed)
    }

    async fn open_uni(&self) -> Result<MockSendStream, MockError> {
        if self.shared.is_closed() {
            return Err(MockError::SessionClosed);
        }
        if self.shared.refuse_open.load(Ordering::SeqCst) {
            return Err(MockError::Refused);
        }
        self.shared.opened.fetch_add(1, Ordering::SeqCst);
        Ok(MockSendStream {
            buf: Vec::new(),
            replies: self.replies.clone(),
        })
    }

    fn close(&self, code: u32, reason: &[u8]) {
        self.shared.close_calls.fetch_add(1, Ordering::SeqCst);
        let mut closed = self.shared.closed.lock().unwrap();
        closed.get_or_insert((code, String::from_utf8_lossy(reason).into_owned()));
    }

    fn remote_address(&self) -> SocketAddr {
        self.remote
    }
}

/// Client side of a mock session.
#[derive(Debug)]
pub struct MockPeer {
    inbound: Option<mpsc::UnboundedSender<MockRecvStream>>,
    replies: mpsc::UnboundedReceiver<Vec<u8>>,
    shared: Arc<Shared>,
    status: Arc<Mutex<Option<u16>>>,
}

impl MockPeer {
    /// Open an inbound stream carrying `payload`.
    pub fn send(&self, payload: impl Into<Vec<u8>>) {
        if let Some(tx) = &self.inbound {
            let _ = tx.send(MockRecvStream::data(payload));
        }
    }

    pub fn send_message(&self, message: &Message) {
        self.send(encode(message));
    }

    pub fn send_ping(&self, timestamp: i64) {
        self.send_message(&Message::ping(timestamp));
    }

    /// Open an inbound stream whose read fails.
    pub fn send_broken(&self) {
        if let Some(tx) = &self.inbound {
            let _ = tx.send(MockRecvStream::broken());
        }
    }

    /// Hang up: the session's next accept fails.
    pub fn disconnect(&mut self) {
        self.inbound.take();
    }

    /// Make every later outbound stream open fail.
    pub fn refuse_replies(&self) {
        self.shared.refuse_open.store(true, Ordering::SeqCst);
    }

    /// Wait up to one second for the next finished reply.
    pub async fn next_reply(&mut self) -> Option<Message> {
        let bytes = tokio::time::timeout(Duration::from_secs(1), self.replies.recv())
            .await
            .ok()??;
        wtrelay_core::decode(&bytes).ok()
    }

    /// A reply that has already been finished, if any.
    pub fn try_reply(&mut self) -> Option<Vec<u8>> {
        self.replies.try_recv().ok()
    }

    /// Number of outbound streams the server has opened.
    pub fn opened(&self) -> usize {
        self.shared.opened.load(Ordering::SeqCst)
    }

    /// Code and reason the server closed the session with.
    pub fn closed_with(&self) -> Option<(u32, String)> {
        self.shared.closed.lock().unwrap().clone()
    }

    pub fn close_calls(&self) -> usize {
        self.shared.close_calls.load(Ordering::SeqCst)
    }

    /// Status the server answered the upgrade request with.
    pub fn status(&self) -> Option<u16> {
        *self.status.lock().unwrap()
    }
}

/// Inbound stream: either a payload or a read that fails.
#[derive(Debug)]
pub enum MockRecvStream {
    Data(io::Cursor<Vec<u8>>),
    Broken,
}

impl MockRecvStream {
    pub fn data(payload: impl Into<Vec<u8>>) -> Self {
        MockRecvStream::Data(io::Cursor::new(payload.into()))
    }

    pub fn broken() -> Self {
        MockRecvStream::Broken
    }
}

impl AsyncRead for MockRecvStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            MockRecvStream::Data(cursor) => Pin::new(cursor).poll_read(cx, buf),
            MockRecvStream::Broken => Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "stream reset by peer",
            ))),
        }
    }
}

/// Outbound stream; its bytes reach the peer once finished.
#[derive(Debug)]
pub struct MockSendStream {
    buf: Vec<u8>,
    replies: mpsc::UnboundedSender<Vec<u8>>,
}

impl AsyncWrite for MockSendStream {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.get_mut().buf.extend_from_slice(data);
        Poll::Ready(Ok(data.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

impl SendStream for MockSendStream {
    type FinishError = MockError;

    async fn finish(&mut self) -> Result<(), MockError> {
        self.replies
            .send(std::mem::take(&mut self.buf))
            .map_err(|_| MockError::SessionClosed)
    }
}

/// Create a listener and the connector that feeds it.
pub fn mock_listener() -> (MockListener, MockConnector) {
    let (tx, rx) = mpsc::unbounded_channel();
    let listener = MockListener {
        incoming: tokio::sync::Mutex::new(rx),
    };
    let connector = MockConnector {
        tx: Some(tx),
        next_port: AtomicU16::new(50_000),
    };
    (listener, connector)
}

#[derive(Debug)]
pub struct MockListener {
    incoming: tokio::sync::Mutex<mpsc::UnboundedReceiver<MockIncoming>>,
}

impl SessionListener for MockListener {
    type Incoming = MockIncoming;

    async fn accept(&self) -> Option<MockIncoming> {
        self.incoming.lock().await.recv().await
    }
}

#[derive(Debug)]
pub struct MockConnector {
    tx: Option<mpsc::UnboundedSender<MockIncoming>>,
    next_port: AtomicU16,
}

impl MockConnector {
    /// Request a session on `path`.
    pub fn connect(&self, path: &str) -> MockPeer {
        self.request(path, false)
    }

    /// Request a session whose upgrade fails.
    pub fn connect_failing(&self, path: &str) -> MockPeer {
        self.request(path, true)
    }

    /// Close the endpoint: the listener's next accept returns `None`.
    pub fn shutdown(&mut self) {
        self.tx.take();
    }

    fn request(&self, path: &str, fail_upgrade: bool) -> MockPeer {
        let port = self.next_port.fetch_add(1, Ordering::SeqCst);
        let (session, peer) = mock_session(SocketAddr::from(([127, 0, 0, 1], port)));
        let incoming = MockIncoming {
            path: path.to_string(),
            session,
            status: Arc::clone(&peer.status),
            fail_upgrade,
        };
        if let Some(tx) = &self.tx {
            let _ = tx.send(incoming);
        }
        peer
    }
}

#[derive(Debug)]
pub struct MockIncoming {
    path: String,
    session: MockSession,
    status: Arc<Mutex<Option<u16>>>,
    fail_upgrade: bool,
}

impl IncomingSession for MockIncoming {
    type Session = MockSession;

    async fn upgrade(self, path: &str) -> RelayResult<MockSession> {
        if !path_matches(&self.path, path) {
            *self.status.lock().unwrap() = Some(404);
            return Err(RelayError::Upgrade(format!(
                "no endpoint registered at {}",
                self.path
            )));
        }
        if self.fail_upgrade {
            *self.status.lock().unwrap() = Some(500);
            return Err(RelayError::Upgrade("handshake failed".into()));
        }
        *self.status.lock().unwrap() = Some(200);
        Ok(self.session)
    }
}

/// Poll `condition` until it holds, for up to two seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
