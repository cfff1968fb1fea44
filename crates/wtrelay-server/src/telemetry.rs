//! Prometheus instruments and the `/metrics` scrape endpoint.
//!
//! The recorder is never installed globally. `RelayMetrics` is built once at
//! startup and reaches every task through the shared `RelayContext`.

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use metrics::{Gauge, Histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::info;
use wtrelay_core::{RelayError, RelayResult};

/// Active WebTransport sessions (gauge).
pub const ACTIVE_CONNECTIONS: &str = "wt_active_connections";
/// Time spent dispatching a decoded message (histogram, seconds).
pub const ACTION_LATENCY_SECONDS: &str = "wt_action_latency_seconds";
/// Histogram buckets for `ACTION_LATENCY_SECONDS`.
pub const LATENCY_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0];

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// The relay's two instruments plus the handle that renders them.
pub struct RelayMetrics {
    active_sessions: Gauge,
    latency: Histogram,
    handle: PrometheusHandle,
}

impl RelayMetrics {
    pub fn new() -> RelayResult<Self> {
        let recorder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Full(ACTION_LATENCY_SECONDS.to_string()),
                LATENCY_BUCKETS,
            )
            .map_err(|e| RelayError::Config(format!("invalid latency buckets: {e}")))?
            .build_recorder();
        let handle = recorder.handle();

        let (active_sessions, latency) = metrics::with_local_recorder(&recorder, || {
            metrics::describe_gauge!(
                ACTIVE_CONNECTIONS,
                "Number of active WebTransport connections."
            );
            metrics::describe_histogram!(
                ACTION_LATENCY_SECONDS,
                "Latency for processing a WebTransport action."
            );
            (
                metrics::gauge!(ACTIVE_CONNECTIONS),
                metrics::histogram!(ACTION_LATENCY_SECONDS),
            )
        });

        Ok(Self {
            active_sessions,
            latency,
            handle,
        })
    }

    /// Count one live session until the returned tracker is dropped.
    pub fn track_session(&self) -> SessionTracker {
        self.active_sessions.increment(1.0);
        SessionTracker {
            gauge: self.active_sessions.clone(),
        }
    }

    /// Start timing one dispatch; recorded when the timer is dropped.
    pub fn start_latency(&self) -> LatencyTimer {
        LatencyTimer {
            histogram: self.latency.clone(),
            started: Instant::now(),
        }
    }

    pub fn handle(&self) -> PrometheusHandle {
        self.handle.clone()
    }

    /// Current value of an unlabelled series in the rendered output.
    #[cfg(test)]
    pub(crate) fn sample(&self, series: &str) -> f64 {
        self.handle
            .render()
            .lines()
            .filter(|line| !line.starts_with('#'))
            .find_map(|line| {
                let (name, value) = line.rsplit_once(' ')?;
                if name == series {
                    value.parse().ok()
                } else {
                    None
                }
            })
            .unwrap_or(0.0)
    }

    #[cfg(test)]
    pub(crate) fn active_sessions(&self) -> f64 {
        self.sample(ACTIVE_CONNECTIONS)
    }

    #[cfg(test)]
    pub(crate) fn latency_observations(&self) -> f64 {
        self.sample(&format!("{ACTION_LATENCY_SECONDS}_count"))
    }
}

/// Decrements the active-session gauge exactly once, on drop.
pub struct SessionTracker {
    gauge: Gauge,
}

impl Drop for SessionTracker {
    fn drop(&mut self) {
        self.gauge.decrement(1.0);
    }
}

/// Records elapsed seconds into the latency histogram on drop.
pub struct LatencyTimer {
    histogram: Histogram,
    started: Instant,
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        self.histogram.record(self.started.elapsed().as_secs_f64());
    }
}

/// Router serving the Prometheus text format at `path`.
pub fn router(handle: PrometheusHandle, path: &str) -> Router {
    Router::new()
        .route(path, get(render_metrics))
        .with_state(handle)
}

async fn render_metrics(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
        handle.render(),
    )
}

/// Bind the scrape listener. Failure is fatal to startup.
pub async fn bind(addr: SocketAddr) -> RelayResult<TcpListener> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| RelayError::Bind(format!("metrics listener {addr}: {e}")))?;
    info!(addr = %addr, "metrics listener started");
    Ok(listener)
}

/// Serve the scrape endpoint until the listener fails.
pub async fn serve(listener: TcpListener, handle: PrometheusHandle, path: &str) -> RelayResult<()> {
    axum::serve(listener, router(handle, path))
        .await
        .map_err(RelayError::Io)
}
