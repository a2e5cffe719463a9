use thiserror::Error;

/// Errors produced by the adbsh session layer.
#[derive(Debug, Error)]
pub enum AdbError {
    /// The runtime cannot supply the cryptographic primitives needed to
    /// create a device key. Fatal, never retried.
    #[error("cryptography unavailable: {0}")]
    CryptoUnavailable(String),

    #[error("connect to {addr} timed out after {timeout_ms} ms")]
    ConnectTimeout { addr: String, timeout_ms: u64 },

    #[error("connect to {addr} failed: {reason}")]
    Connect { addr: String, reason: String },

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("failed to open channel '{service}': {reason}")]
    ChannelOpen { service: String, reason: String },

    #[error("write failed: {0}")]
    Write(String),

    /// Raised by a shell stream read once the channel is gone. Only the
    /// output pump sees this; it ends output delivery.
    #[error("read terminated: {0}")]
    ReadTerminated(String),

    /// A pending operation was abandoned, e.g. an `init` interrupted by
    /// `disconnect`.
    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("not connected")]
    NotConnected,

    #[error("invalid key: {0}")]
    Key(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl From<base64::DecodeError> for AdbError {
    fn from(e: base64::DecodeError) -> Self {
        AdbError::Key(format!("invalid base64: {e}"))
    }
}

pub type AdbResult<T> = Result<T, AdbError>;
