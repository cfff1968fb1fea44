//! Stream worker: one inbound unidirectional stream, one message, at most
//! one reply on a fresh outbound stream.

use crate::server::RelayContext;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::{debug, warn};
use wtrelay_core::transport::{SendStream, Session};
use wtrelay_core::{codec, Message, RelayError, RelayResult};

/// Handle one inbound stream to completion.
///
/// Every failure ends this worker only; nothing is reported to the session.
pub async fn handle_stream<S: Session>(
    session: Arc<S>,
    stream: S::RecvStream,
    ctx: Arc<RelayContext>,
) {
    match serve_stream(session.as_ref(), stream, &ctx).await {
        Ok(()) => {
            debug!(remote = %session.remote_address(), "stream handled");
        }
        Err(e @ RelayError::Read(_)) => {
            warn!(remote = %session.remote_address(), error = %e, "error reading from stream");
        }
        Err(e) => {
            debug!(remote = %session.remote_address(), error = %e, "stream dropped");
        }
    }
}

async fn serve_stream<S: Session>(
    session: &S,
    stream: S::RecvStream,
    ctx: &RelayContext,
) -> RelayResult<()> {
    let payload = read_to_end(stream, ctx.max_message_size).await?;
    let message = codec::decode(&payload)?;

    // Timed from a successful decode until dispatch returns, ping or not.
    let _timer = ctx.metrics.start_latency();
    if let Some(reply) = message.reply() {
        send_reply(session, &reply).await?;
    }
    Ok(())
}

/// Read until end-of-stream, failing once more than `limit` bytes arrive.
async fn read_to_end<R: AsyncRead + Unpin>(stream: R, limit: usize) -> RelayResult<Vec<u8>> {
    let mut payload = Vec::new();
    stream
        .take(limit as u64 + 1)
        .read_to_end(&mut payload)
        .await
        .map_err(|e| RelayError::Read(e.to_string()))?;

    if payload.len() > limit {
        return Err(RelayError::Read(format!(
            "message exceeds {limit} bytes"
        )));
    }
    Ok(payload)
}

async fn send_reply<S: Session>(session: &S, reply: &Message) -> RelayResult<()> {
    let mut send = session
        .open_uni()
        .await
        .map_err(|e| RelayError::Reply(format!("open failed: {e}")))?;
    send.write_all(&codec::encode(reply))
        .await
        .map_err(|e| RelayError::Reply(format!("write failed: {e}")))?;
    send.finish()
        .await
        .map_err(|e| RelayError::Reply(format!("finish failed: {e}")))?;
    Ok(())
}
