//! WebSocket transport using `tokio-tungstenite`.
//!
//! Each event envelope travels as one WebSocket text frame. Both `ws://` and
//! `wss://` URLs work; TLS is handled by
//! [`MaybeTlsStream`](tokio_tungstenite::MaybeTlsStream).
//!
//! Only available with the `transport-websocket` feature (on by default).
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), pvp_chess_client::PvpClientError> {
//! use pvp_chess_client::{Transport, WebSocketTransport};
//!
//! let mut transport = WebSocketTransport::connect("ws://localhost:5000/pvp").await?;
//! transport
//!     .send(r#"{"event":"join_pvp","data":{"color":"black"}}"#.to_string())
//!     .await?;
//!
//! if let Some(Ok(frame)) = transport.recv().await {
//!     println!("received: {frame}");
//! }
//!
//! transport.close().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::error::PvpClientError;
use crate::transport::Transport;

/// The underlying WebSocket stream, public for [`WebSocketTransport::from_stream`].
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// A [`Transport`] backed by a WebSocket connection.
///
/// For custom TLS, proxies or headers, build the stream yourself and use
/// [`WebSocketTransport::from_stream`].
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) is cancel-safe.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: WsStream,
    closed: bool,
}

impl WebSocketTransport {
    /// Connect to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`PvpClientError::Io`] if the URL is invalid or the connection
    /// fails. I/O error kinds are preserved; everything else maps to
    /// [`ErrorKind::Other`](std::io::ErrorKind::Other).
    pub async fn connect(url: &str) -> Result<Self, PvpClientError> {
        tracing::debug!(url = %url, "connecting to game server");

        let (stream, _response) = tokio_tungstenite::connect_async(url).await.map_err(|e| {
            let kind = match &e {
                tokio_tungstenite::tungstenite::Error::Io(io) => io.kind(),
                _ => std::io::ErrorKind::Other,
            };
            PvpClientError::Io(std::io::Error::new(kind, e))
        })?;

        tracing::info!(url = %url, "WebSocket connection established");

        Ok(Self::from_stream(stream))
    }

    /// Wrap an already-established stream.
    pub fn from_stream(stream: WsStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }

    /// [`connect`](Self::connect) with a deadline.
    ///
    /// # Errors
    ///
    /// Returns [`PvpClientError::Timeout`] if `timeout` elapses first, or any
    /// error [`connect`](Self::connect) returns.
    pub async fn connect_with_timeout(
        url: &str,
        timeout: std::time::Duration,
    ) -> Result<Self, PvpClientError> {
        tokio::time::timeout(timeout, Self::connect(url))
            .await
            .map_err(|_| PvpClientError::Timeout)?
    }
}

/// What a received WebSocket message means for the session.
#[derive(Debug, PartialEq, Eq)]
enum Inbound {
    /// An event envelope to hand to the session.
    Frame(String),
    /// The server closed the connection.
    Closed,
    /// Control or binary traffic the protocol does not use.
    Skip,
}

fn classify(msg: Message) -> Inbound {
    match msg {
        Message::Text(text) => Inbound::Frame(text.to_string()),
        Message::Close(frame) => {
            tracing::debug!(?frame, "server sent close frame");
            Inbound::Closed
        }
        // tungstenite answers pings on the next write or flush.
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => Inbound::Skip,
        Message::Binary(bytes) => {
            tracing::warn!(len = bytes.len(), "game server sent a binary frame, skipping");
            Inbound::Skip
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, message: String) -> Result<(), PvpClientError> {
        if self.closed {
            return Err(PvpClientError::TransportClosed);
        }
        self.stream
            .send(Message::Text(message.into()))
            .await
            .map_err(|e| PvpClientError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, PvpClientError>> {
        while let Some(next) = self.stream.next().await {
            let msg = match next {
                Ok(msg) => msg,
                Err(e) => return Some(Err(PvpClientError::TransportReceive(e.to_string()))),
            };
            match classify(msg) {
                Inbound::Frame(text) => return Some(Ok(text)),
                Inbound::Closed => return None,
                Inbound::Skip => {}
            }
        }
        None
    }

    async fn close(&mut self) -> Result<(), PvpClientError> {
        if std::mem::replace(&mut self.closed, true) {
            return Ok(());
        }
        self.stream
            .close(None)
            .await
            .map_err(|e| PvpClientError::TransportSend(e.to_string()))
    }

    fn is_connected(&self) -> bool {
        !self.closed
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
    use tokio::net::TcpListener;

    /// Accept one WebSocket connection on a local port and run `handler` on it.
    async fn start_mock_server<F, Fut>(handler: F) -> String
    where
        F: FnOnce(tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) -> Fut
            + Send
            + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            handler(ws).await;
        });

        format!("ws://{addr}")
    }

    #[test]
    fn only_text_frames_reach_the_session() {
        assert_eq!(
            classify(Message::Text(r#"{"event":"connect"}"#.into())),
            Inbound::Frame(r#"{"event":"connect"}"#.to_string())
        );
        assert_eq!(classify(Message::Close(None)), Inbound::Closed);
        assert_eq!(classify(Message::Ping(vec![1].into())), Inbound::Skip);
        assert_eq!(classify(Message::Binary(vec![0xDE].into())), Inbound::Skip);
    }

    #[tokio::test]
    async fn connect_fails_with_invalid_url() {
        let err = WebSocketTransport::connect("not-a-valid-url")
            .await
            .unwrap_err();
        assert!(matches!(err, PvpClientError::Io(_)));
    }

    #[tokio::test]
    async fn receives_event_frames_and_skips_binary() {
        let url = start_mock_server(|mut ws| async move {
            ws.send(Message::Binary(vec![0xDE, 0xAD].into()))
                .await
                .unwrap();
            ws.send(Message::Text(
                r#"{"event":"pvp_status","data":{"status":"waiting"}}"#.into(),
            ))
            .await
            .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        assert!(transport.is_connected());
        let frame = transport.recv().await.unwrap().unwrap();
        assert!(frame.contains("pvp_status"));
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn send_reaches_server() {
        let (seen_tx, seen_rx) = tokio::sync::oneshot::channel();
        let url = start_mock_server(|mut ws| async move {
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                let _ = seen_tx.send(text.to_string());
            }
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport
            .send(r#"{"event":"resign","data":{}}"#.to_string())
            .await
            .unwrap();
        assert_eq!(seen_rx.await.unwrap(), r#"{"event":"resign","data":{}}"#);
    }

    #[tokio::test]
    async fn close_is_idempotent_and_blocks_send() {
        let url =
            start_mock_server(|mut ws| async move { while let Some(Ok(_)) = ws.next().await {} })
                .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport.close().await.unwrap();
        transport.close().await.unwrap();
        assert!(!transport.is_connected());

        let err = transport.send("late".to_string()).await.unwrap_err();
        assert!(matches!(err, PvpClientError::TransportClosed));
    }

    #[tokio::test]
    async fn connect_with_timeout_times_out() {
        let err = WebSocketTransport::connect_with_timeout(
            "ws://192.0.2.1:1",
            std::time::Duration::from_millis(50),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PvpClientError::Timeout));
    }
}
