//! Error types for the data channel.

/// Errors produced by control connections and the raw transfer phase.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("message exceeds {0} bytes")]
    MessageTooLarge(usize),

    /// An operation was attempted in the wrong connection phase.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Short read, zero-byte read or failed write during the raw phase.
    #[error("transfer failed: {0}")]
    TransferFailed(String),

    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("connection timed out")]
    Timeout,
}
