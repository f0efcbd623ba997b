//! Error types for the PvP chess client.

use thiserror::Error;

/// Errors that can occur when using the PvP chess client.
#[derive(Debug, Error)]
pub enum PvpClientError {
    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed unexpectedly.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize or deserialize a protocol message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Attempted an operation that requires a running session loop.
    #[error("not connected to server")]
    NotConnected,

    /// The session was started without a usable player color.
    ///
    /// This is the only user-blocking error: no session is created.
    #[error("invalid player color {0:?}, expected \"white\" or \"black\"")]
    InvalidColor(String),

    /// A square name did not parse (expected e.g. `"e4"`).
    #[error("invalid square {0:?}")]
    InvalidSquare(String),

    /// The rules engine could not load a serialized position.
    #[error("invalid position: {0}")]
    InvalidPosition(String),

    /// The rules engine rejected a move.
    #[error("illegal move {from}{to}")]
    IllegalMove {
        /// Origin square, e.g. `"e2"`.
        from: String,
        /// Destination square, e.g. `"e4"`.
        to: String,
    },

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for PvP chess client operations.
pub type Result<T> = std::result::Result<T, PvpClientError>;
