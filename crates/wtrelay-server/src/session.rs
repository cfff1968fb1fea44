//! Session worker: accepts inbound unidirectional streams for one session
//! and hands each to its own stream worker.

use crate::server::RelayContext;
use crate::stream;
use crate::telemetry::SessionTracker;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info};
use wtrelay_core::transport::Session;

/// Application error code sent when the relay closes a session.
pub const SESSION_CLOSE_CODE: u32 = 0;
/// Reason sent when the relay closes a session.
pub const SESSION_CLOSE_REASON: &[u8] = b"Session closed";

/// Run the accept loop until the session fails or the peer closes it.
///
/// `tracker` is the session's slot in the active-session gauge. The session
/// guard is built before the returned future is first polled, so close and
/// gauge release happen exactly once even if the task never runs.
pub fn run_session<S: Session>(
    session: S,
    tracker: SessionTracker,
    ctx: Arc<RelayContext>,
) -> impl Future<Output = ()> + Send {
    let guard = SessionGuard {
        remote: session.remote_address(),
        session: Arc::new(session),
        _tracker: tracker,
    };
    async move { guard.accept_loop(ctx).await }
}

/// Closes the session and releases its gauge slot when the worker exits.
struct SessionGuard<S: Session> {
    session: Arc<S>,
    remote: SocketAddr,
    _tracker: SessionTracker,
}

impl<S: Session> SessionGuard<S> {
    async fn accept_loop(&self, ctx: Arc<RelayContext>) {
        loop {
            match self.session.accept_uni().await {
                Ok(recv) => {
                    tokio::spawn(stream::handle_stream(
                        Arc::clone(&self.session),
                        recv,
                        Arc::clone(&ctx),
                    ));
                }
                Err(e) => {
                    debug!(remote = %self.remote, error = %e, "error accepting stream");
                    break;
                }
            }
        }
    }
}

impl<S: Session> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        self.session.close(SESSION_CLOSE_CODE, SESSION_CLOSE_REASON);
        info!(remote = %self.remote, "client disconnected");
    }
}
