//! wtrelay-server: WebTransport ping relay.
//!
//! Accepts WebTransport sessions, answers every `ping` sent on an inbound
//! unidirectional stream with a `pong` on a new outbound one, and exposes
//! session and latency metrics for Prometheus.

mod config;
mod server;
mod session;
mod stream;
mod telemetry;
mod transport;

use clap::Parser;
use config::ServerConfig;
use server::RelayServer;
use std::path::PathBuf;
use tracing::{error, info, warn};
use wtrelay_core::{RelayError, RelayResult};

/// wtrelay-server: WebTransport ping relay
#[derive(Parser, Debug)]
#[command(name = "wtrelay-server", version, about = "WebTransport ping relay")]
struct Cli {
    /// WebTransport (UDP) listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Metrics (TCP) listen port
    #[arg(long)]
    metrics_port: Option<u16>,

    /// TLS certificate (PEM)
    #[arg(long)]
    cert: Option<String>,

    /// TLS private key (PEM)
    #[arg(long)]
    key: Option<String>,

    /// Config file path
    #[arg(long, default_value = "wtrelay.toml")]
    config: String,

    /// Generate self-signed certificate for development
    #[arg(long)]
    generate_cert: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    use tracing_subscriber::EnvFilter;
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "starting wtrelay-server");

    let (cert_path, key_path) = if cli.generate_cert {
        match generate_self_signed_cert() {
            Ok((c, k)) => {
                info!(cert = %c.display(), key = %k.display(), "generated self-signed certificate");
                (Some(c), Some(k))
            }
            Err(e) => {
                error!(error = %e, "failed to generate self-signed certificate");
                std::process::exit(1);
            }
        }
    } else {
        (
            cli.cert.as_ref().map(PathBuf::from),
            cli.key.as_ref().map(PathBuf::from),
        )
    };

    let config_path = PathBuf::from(&cli.config);
    let server_config = match ServerConfig::load(
        Some(&config_path),
        cli.port,
        cli.metrics_port,
        cert_path.as_ref().and_then(|p| p.to_str()),
        key_path.as_ref().and_then(|p| p.to_str()),
    ) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    let identity = match transport::webtransport::load_identity(
        &server_config.cert_path,
        &server_config.key_path,
    )
    .await
    {
        Ok(identity) => identity,
        Err(e) => {
            error!(error = %e, "failed to load TLS identity");
            std::process::exit(1);
        }
    };

    let relay = match RelayServer::new(server_config) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to create server");
            std::process::exit(1);
        }
    };

    tokio::select! {
        result = relay.run(identity) => {
            if let Err(e) = result {
                error!(error = %e, "server error");
                std::process::exit(1);
            }
        }
        _ = shutdown_signal() => {
            info!("received shutdown signal");
        }
    }

    info!("wtrelay-server stopped");
}

/// Generate a self-signed certificate for development use.
fn generate_self_signed_cert() -> RelayResult<(PathBuf, PathBuf)> {
    let dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".wtrelay");
    std::fs::create_dir_all(&dir)?;

    let cert_path = dir.join("cert.pem");
    let key_path = dir.join("key.pem");

    let identity_err = |e: rcgen::Error| RelayError::Identity(format!("certificate generation: {e}"));
    let mut params = rcgen::CertificateParams::new(vec![
        "localhost".to_string(),
        "127.0.0.1".to_string(),
        "::1".to_string(),
    ])
    .map_err(identity_err)?;
    params.distinguished_name = rcgen::DistinguishedName::new();
    params
        .distinguished_name
        .push(rcgen::DnType::CommonName, "wtrelay-server dev cert");

    let key_pair = rcgen::KeyPair::generate().map_err(identity_err)?;
    let cert = params.self_signed(&key_pair).map_err(identity_err)?;

    std::fs::write(&cert_path, cert.pem())?;
    std::fs::write(&key_path, key_pair.serialize_pem())?;

    Ok((cert_path, key_path))
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                ctrl_c.await.ok();
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}
