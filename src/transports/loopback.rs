//! In-process loopback transport.
//!
//! [`loopback_pair`] returns two connected halves. [`LoopbackTransport`] is
//! the client half and implements [`Transport`]; [`LoopbackServer`] lets an
//! embedded server (or a test) push [`ServerEvent`]s and read the
//! [`ClientMessage`]s the client sent.
//!
//! ```rust
//! # async fn example() -> Result<(), pvp_chess_client::PvpClientError> {
//! use pvp_chess_client::protocol::{ClientMessage, Color, ServerEvent};
//! use pvp_chess_client::transports::loopback_pair;
//! use pvp_chess_client::Transport;
//!
//! let (mut transport, mut server) = loopback_pair();
//! transport
//!     .send(r#"{"event":"join_pvp","data":{"color":"white"}}"#.to_string())
//!     .await?;
//! assert_eq!(
//!     server.recv_message().await.transpose()?,
//!     Some(ClientMessage::JoinPvp { color: Color::White })
//! );
//!
//! server.send_event(&ServerEvent::OpponentReconnected)?;
//! assert!(transport.recv().await.is_some());
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{PvpClientError, Result};
use crate::protocol::{ClientMessage, ServerEvent};
use crate::transport::Transport;

/// Client half of a loopback pair.
#[derive(Debug)]
pub struct LoopbackTransport {
    tx: mpsc::UnboundedSender<String>,
    rx: mpsc::UnboundedReceiver<String>,
    closed: bool,
}

/// Server half of a loopback pair.
#[derive(Debug)]
pub struct LoopbackServer {
    rx: mpsc::UnboundedReceiver<String>,
    tx: mpsc::UnboundedSender<String>,
}

/// Create a connected `(transport, server)` pair.
pub fn loopback_pair() -> (LoopbackTransport, LoopbackServer) {
    let (client_tx, server_rx) = mpsc::unbounded_channel();
    let (server_tx, client_rx) = mpsc::unbounded_channel();

    let transport = LoopbackTransport {
        tx: client_tx,
        rx: client_rx,
        closed: false,
    };
    let server = LoopbackServer {
        rx: server_rx,
        tx: server_tx,
    };
    (transport, server)
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&mut self, message: String) -> Result<()> {
        if self.closed {
            return Err(PvpClientError::TransportClosed);
        }
        self.tx
            .send(message)
            .map_err(|e| PvpClientError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String>> {
        if self.closed {
            return None;
        }
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.rx.close();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.closed && !self.tx.is_closed()
    }
}

impl LoopbackServer {
    /// Push one event to the client.
    ///
    /// # Errors
    ///
    /// Returns [`PvpClientError::TransportClosed`] if the client half is gone.
    pub fn send_event(&self, event: &ServerEvent) -> Result<()> {
        self.send_text(event.encode()?)
    }

    /// Push a raw text frame to the client.
    ///
    /// # Errors
    ///
    /// Returns [`PvpClientError::TransportClosed`] if the client half is gone.
    pub fn send_text(&self, text: String) -> Result<()> {
        self.tx
            .send(text)
            .map_err(|_| PvpClientError::TransportClosed)
    }

    /// Signal a (re)established connection.
    ///
    /// # Errors
    ///
    /// Returns [`PvpClientError::TransportClosed`] if the client half is gone.
    pub fn reconnect(&self) -> Result<()> {
        self.send_event(&ServerEvent::Connected)
    }

    /// Next frame the client sent, as raw text.
    pub async fn recv_text(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    /// Next message the client sent, decoded.
    ///
    /// Returns `None` once the client half is dropped.
    pub async fn recv_message(&mut self) -> Option<Result<ClientMessage>> {
        let text = self.rx.recv().await?;
        Some(serde_json::from_str(&text).map_err(PvpClientError::from))
    }

    /// Decoded message if one is already waiting.
    pub fn try_recv_message(&mut self) -> Option<Result<ClientMessage>> {
        let text = self.rx.try_recv().ok()?;
        Some(serde_json::from_str(&text).map_err(PvpClientError::from))
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::protocol::Color;

    #[tokio::test]
    async fn frames_cross_in_both_directions() {
        let (mut transport, mut server) = loopback_pair();

        let join = serde_json::to_string(&ClientMessage::JoinPvp {
            color: Color::Black,
        })
        .unwrap();
        transport.send(join).await.unwrap();
        let got = server.recv_message().await.unwrap().unwrap();
        assert_eq!(got, ClientMessage::JoinPvp { color: Color::Black });

        server.reconnect().unwrap();
        let text = transport.recv().await.unwrap().unwrap();
        assert_eq!(ServerEvent::decode(&text).unwrap(), ServerEvent::Connected);
    }

    #[tokio::test]
    async fn dropping_server_ends_stream() {
        let (mut transport, server) = loopback_pair();
        drop(server);
        assert!(transport.recv().await.is_none());
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn send_after_close_fails() {
        let (mut transport, _server) = loopback_pair();
        assert!(transport.is_connected());
        transport.close().await.unwrap();
        assert!(!transport.is_connected());
        assert!(matches!(
            transport.send("x".into()).await,
            Err(PvpClientError::TransportClosed)
        ));
        assert!(transport.recv().await.is_none());
    }
}
