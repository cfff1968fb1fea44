use thiserror::Error;

/// Errors produced by the relay.
///
/// `Upgrade`, `Accept`, `Read`, `Decode` and `Reply` are per-connection: they
/// stop the one task that observed them and never propagate further. The
/// remaining variants only occur while the process is starting up.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("upgrade failed: {0}")]
    Upgrade(String),

    #[error("accept failed: {0}")]
    Accept(String),

    #[error("read failed: {0}")]
    Read(String),

    #[error("decode failed: {0}")]
    Decode(String),

    #[error("reply failed: {0}")]
    Reply(String),

    #[error("identity error: {0}")]
    Identity(String),

    #[error("bind failed: {0}")]
    Bind(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for RelayError {
    fn from(e: serde_json::Error) -> Self {
        RelayError::Decode(e.to_string())
    }
}

pub type RelayResult<T> = Result<T, RelayError>;
