//! Core server: the connection acceptor and the process-wide context.
//!
//! Owns the metrics instruments and the listener configuration, binds the
//! WebTransport endpoint and the scrape listener, and turns every upgraded
//! session into its own session worker task.

use crate::config::ServerConfig;
use crate::session;
use crate::telemetry::{self, RelayMetrics};
use crate::transport::webtransport::WebTransportListener;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use wtrelay_core::transport::{IncomingSession, Session, SessionListener};
use wtrelay_core::{RelayError, RelayResult};
use wtransport::Identity;

/// State shared by every acceptor, session and stream task.
pub struct RelayContext {
    /// The gauge and histogram; the only state mutated across tasks.
    pub metrics: RelayMetrics,
    /// The one path session requests may upgrade on.
    pub path: String,
    /// Largest inbound stream, in bytes.
    pub max_message_size: usize,
}

impl RelayContext {
    pub fn new(metrics: RelayMetrics, path: impl Into<String>, max_message_size: usize) -> Self {
        Self {
            metrics,
            path: path.into(),
            max_message_size,
        }
    }

    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        Self::new(
            RelayMetrics::new().expect("metrics"),
            crate::config::DEFAULT_PATH,
            4096,
        )
    }
}

/// Accept sessions until the endpoint closes.
///
/// Each request is upgraded on its own task so a slow handshake never holds
/// up the next accept.
pub async fn accept_loop<L: SessionListener>(listener: L, ctx: Arc<RelayContext>) {
    while let Some(incoming) = listener.accept().await {
        tokio::spawn(accept_session(incoming, Arc::clone(&ctx)));
    }
    info!("endpoint closed, stopping acceptor");
}

async fn accept_session<I: IncomingSession>(incoming: I, ctx: Arc<RelayContext>) {
    match incoming.upgrade(&ctx.path).await {
        Ok(session) => {
            let tracker = ctx.metrics.track_session();
            info!(remote = %session.remote_address(), "client connected");
            tokio::spawn(session::run_session(session, tracker, ctx));
        }
        Err(e) => {
            warn!(error = %e, "upgrading failed");
        }
    }
}

/// The wtrelay server instance.
pub struct RelayServer {
    config: ServerConfig,
    ctx: Arc<RelayContext>,
}

impl RelayServer {
    pub fn new(config: ServerConfig) -> RelayResult<Self> {
        let metrics = RelayMetrics::new()?;
        let ctx = Arc::new(RelayContext::new(
            metrics,
            config.path.clone(),
            config.max_message_size,
        ));
        Ok(Self { config, ctx })
    }

    /// Bind both listeners and serve until one of them fails.
    pub async fn run(self, identity: Identity) -> RelayResult<()> {
        let wt_addr = parse_addr(self.config.port)?;
        let metrics_addr = parse_addr(self.config.metrics_port)?;

        let metrics_listener = telemetry::bind(metrics_addr).await?;
        let listener = WebTransportListener::bind(wt_addr, identity, self.config.keep_alive)?;

        info!(
            wt_port = self.config.port,
            path = %self.config.path,
            metrics_port = self.config.metrics_port,
            metrics_path = %self.config.metrics_path,
            "wtrelay-server ready"
        );

        let handle = self.ctx.metrics.handle();
        tokio::select! {
            result = telemetry::serve(metrics_listener, handle, &self.config.metrics_path) => result,
            () = accept_loop(listener, Arc::clone(&self.ctx)) => Ok(()),
        }
    }
}

fn parse_addr(port: u16) -> RelayResult<SocketAddr> {
    format!("0.0.0.0:{port}")
        .parse()
        .map_err(|e| RelayError::Config(format!("invalid address: {e}")))
}
