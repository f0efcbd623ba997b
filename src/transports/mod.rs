//! Concrete [`Transport`](crate::Transport) implementations.
//!
//! | Feature                | Transport              |
//! |------------------------|------------------------|
//! | (always)               | [`LoopbackTransport`]  |
//! | `transport-websocket`  | [`WebSocketTransport`] |
//!
//! # Example
//!
//! ```rust,ignore
//! # async fn example() -> Result<(), pvp_chess_client::PvpClientError> {
//! use pvp_chess_client::{Transport, WebSocketTransport};
//!
//! let mut ws = WebSocketTransport::connect("ws://localhost:5000/pvp").await?;
//! ws.send(r#"{"event":"join_pvp","data":{"color":"white"}}"#.to_string()).await?;
//!
//! if let Some(Ok(frame)) = ws.recv().await {
//!     println!("server said: {frame}");
//! }
//!
//! ws.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod loopback;

pub use loopback::{loopback_pair, LoopbackServer, LoopbackTransport};

#[cfg(feature = "transport-websocket")]
pub mod websocket;

#[cfg(feature = "transport-websocket")]
pub use websocket::WebSocketTransport;
