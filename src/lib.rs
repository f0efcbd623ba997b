//! # PvP Chess Client
//!
//! Client-side session engine for two-player online chess against an
//! authoritative server.
//!
//! The server owns the game. This crate keeps a local, interactive view of it
//! consistent with that authority: it tracks the session phase, turns clicks
//! and drags into legal moves, and runs the disconnect and post-game
//! countdowns, without ever predicting a position the server has not sent.
//!
//! ## Features
//!
//! - **IO-free core**: [`Session`] is a synchronous state machine; drive it
//!   from any event loop
//! - **Pluggable rules**: implement [`RulesEngine`], or use [`StandardChess`]
//! - **Transport-agnostic**: implement [`Transport`] for any backend
//! - **WebSocket built-in**: the default `transport-websocket` feature provides
//!   `WebSocketTransport`
//! - **Async client**: [`PvpClient`] runs the session on a tokio task and
//!   emits typed [`SessionUpdate`]s on a channel
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pvp_chess_client::transports::loopback_pair;
//! use pvp_chess_client::{PvpClient, PvpConfig, SessionUpdate, StandardChess};
//!
//! # async fn run() -> Result<(), pvp_chess_client::PvpClientError> {
//! let (transport, _server) = loopback_pair();
//! let config = PvpConfig::from_color_param(Some("white"))?;
//! let (mut client, mut updates) = PvpClient::start(transport, StandardChess, config)?;
//!
//! while let Some(update) = updates.recv().await {
//!     if let SessionUpdate::Disconnected { .. } = update {
//!         break;
//!     }
//! }
//! client.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod position;
pub mod protocol;
pub mod rules;
pub mod selection;
pub mod session;
pub mod timer;
pub mod transport;
pub mod transports;

#[cfg(feature = "tokio-runtime")]
pub mod client;

// Re-export primary types for ergonomic imports.
pub use error::PvpClientError;
pub use position::{CapturedView, GameResult, Outcome, PositionCache, StatusLine};
pub use protocol::{ClientMessage, Color, MoveIntent, PositionSnapshot, ServerEvent, Square};
pub use rules::{RulesEngine, StandardChess};
pub use selection::{ClickOutcome, MoveSelector, Selection};
pub use session::{Session, SessionConfig, SessionPhase, SessionUpdate, SessionView};
pub use timer::Countdown;
pub use transport::Transport;

#[cfg(feature = "tokio-runtime")]
pub use client::{PvpClient, PvpConfig};

#[cfg(feature = "transport-websocket")]
pub use transports::WebSocketTransport;
