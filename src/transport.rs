//! Transport abstraction for the PvP session protocol.
//!
//! The [`Transport`] trait is a bidirectional channel of JSON text frames
//! between the client and the game server. Each frame carries one event
//! envelope (see [`protocol`](crate::protocol)); framing on the wire is the
//! transport's business.
//!
//! # Connection Setup
//!
//! Connecting is not part of this trait. Construct a connected transport
//! (a WebSocket URL, an in-process channel, ...) and hand it to
//! `PvpClient::start`.
//!
//! # Reconnection
//!
//! A transport that reconnects on its own should deliver a synthetic
//! `{"event":"connect"}` frame from [`recv`](Transport::recv) each time a
//! connection is re-established. The session answers it by re-sending its
//! join request.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use pvp_chess_client::error::PvpClientError;
//! use pvp_chess_client::transport::Transport;
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, message: String) -> Result<(), PvpClientError> {
//!         todo!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, PvpClientError>> {
//!         // `None` when the connection closed cleanly
//!         todo!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), PvpClientError> {
//!         todo!()
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::PvpClientError;

/// A bidirectional text frame transport.
///
/// Each call to [`send`](Transport::send) transmits one complete JSON frame
/// and each call to [`recv`](Transport::recv) returns one.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) **MUST** be cancel-safe because the session loop
/// polls it inside `tokio::select!`. Channel-backed implementations are
/// cancel-safe by construction.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send one JSON text frame to the server.
    ///
    /// # Errors
    ///
    /// Returns [`PvpClientError::TransportSend`] if the frame could not be sent.
    async fn send(&mut self, message: String) -> Result<(), PvpClientError>;

    /// Receive the next JSON text frame.
    ///
    /// Returns:
    /// - `Some(Ok(text))`: a complete frame
    /// - `Some(Err(e))`: a transport error
    /// - `None`: the connection was closed cleanly
    async fn recv(&mut self) -> Option<Result<String, PvpClientError>>;

    /// Close the connection gracefully.
    ///
    /// # Errors
    ///
    /// Returns an error if the close handshake fails. Resources are released
    /// either way.
    async fn close(&mut self) -> Result<(), PvpClientError>;

    /// `true` if the connection is currently up.
    ///
    /// The client announces its join immediately when this is `true` at
    /// start; otherwise it waits for a `connect` frame.
    fn is_connected(&self) -> bool {
        true
    }
}
