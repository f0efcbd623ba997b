#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for PvP chess client integration tests.
//!
//! Provides a scripted [`MockTransport`], server frame builders and a few
//! positions used across test files.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use pvp_chess_client::protocol::{
    ClientMessage, Color, GameStartPayload, OpponentDisconnectedPayload, PieceKind,
    PositionSnapshot, PvpErrorPayload, QueueUpdatePayload, ServerEvent, SessionStatus,
    StatusPayload, Winner,
};
use pvp_chess_client::{PvpClientError, Square, Transport};

// ── Positions ───────────────────────────────────────────────────────

/// Position after 1. e4.
pub const AFTER_E4: &str = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1";

/// Position after 1. e4 e5.
pub const AFTER_E4_E5: &str = "rnbqkbnr/pppp1ppp/8/4p3/4P3/8/PPPP1PPP/RNBQKBNR w KQkq e6 0 2";

/// Fool's mate: black has just mated white.
pub const FOOLS_MATE: &str = "rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3";

pub fn sq(name: &str) -> Square {
    name.parse().unwrap()
}

// ── MockTransport ───────────────────────────────────────────────────

/// Scripted transport: `recv()` replays `incoming` in order and then hangs
/// until the client shuts down. Sent frames are recorded.
pub struct MockTransport {
    incoming: VecDeque<Option<Result<String, PvpClientError>>>,
    connected: bool,
    pub sent: Arc<StdMutex<Vec<String>>>,
    pub closed: Arc<AtomicBool>,
}

impl MockTransport {
    /// A connected transport with scripted incoming frames.
    pub fn new(
        incoming: Vec<Option<Result<String, PvpClientError>>>,
    ) -> (Self, Arc<StdMutex<Vec<String>>>, Arc<AtomicBool>) {
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let transport = Self {
            incoming: VecDeque::from(incoming),
            connected: true,
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
        };
        (transport, sent, closed)
    }

    /// Like [`new`](Self::new) but reporting no connection at start.
    pub fn disconnected(
        incoming: Vec<Option<Result<String, PvpClientError>>>,
    ) -> (Self, Arc<StdMutex<Vec<String>>>, Arc<AtomicBool>) {
        let (mut transport, sent, closed) = Self::new(incoming);
        transport.connected = false;
        (transport, sent, closed)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<(), PvpClientError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, PvpClientError>> {
        if let Some(item) = self.incoming.pop_front() {
            item
        } else {
            std::future::pending().await
        }
    }

    async fn close(&mut self) -> Result<(), PvpClientError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

/// Decode every recorded frame.
pub fn sent_messages(sent: &Arc<StdMutex<Vec<String>>>) -> Vec<ClientMessage> {
    sent.lock()
        .unwrap()
        .iter()
        .map(|text| serde_json::from_str(text).expect("client frame"))
        .collect()
}

// ── Server events ───────────────────────────────────────────────────

pub fn status(status: SessionStatus) -> ServerEvent {
    ServerEvent::Status(StatusPayload {
        status,
        position: None,
    })
}

pub fn queued(position: u32) -> ServerEvent {
    ServerEvent::Status(StatusPayload {
        status: SessionStatus::Queued,
        position: Some(position),
    })
}

pub fn queue_update(position: u32) -> ServerEvent {
    ServerEvent::QueueUpdate(QueueUpdatePayload { position })
}

pub fn game_start() -> ServerEvent {
    ServerEvent::GameStart(GameStartPayload::default())
}

pub fn opponent_disconnected(timeout: u32) -> ServerEvent {
    ServerEvent::OpponentDisconnected(OpponentDisconnectedPayload { timeout })
}

pub fn pvp_error(message: &str) -> ServerEvent {
    ServerEvent::PvpError(PvpErrorPayload {
        message: message.into(),
    })
}

/// Non-terminal snapshot of `fen` with `turn` to move.
pub fn snapshot(fen: &str, turn: Color) -> PositionSnapshot {
    PositionSnapshot {
        fen: fen.into(),
        turn,
        ..PositionSnapshot::starting()
    }
}

pub fn game_state(snapshot: PositionSnapshot) -> ServerEvent {
    ServerEvent::GameState(Box::new(snapshot))
}

/// Starting position confirmed by the server.
pub fn opening_state() -> ServerEvent {
    game_state(PositionSnapshot::starting())
}

/// Checkmate snapshot with `winner`.
pub fn checkmate(winner: Winner) -> ServerEvent {
    game_state(PositionSnapshot {
        fen: FOOLS_MATE.into(),
        turn: Color::White,
        is_check: true,
        is_checkmate: true,
        is_game_over: true,
        winner: Some(winner),
        white_captured: vec![],
        black_captured: vec![],
        forfeit: false,
    })
}

/// Forfeit snapshot with `winner`.
pub fn forfeit(winner: Winner) -> ServerEvent {
    game_state(PositionSnapshot {
        is_game_over: true,
        winner: Some(winner),
        forfeit: true,
        white_captured: vec![PieceKind::Pawn],
        ..PositionSnapshot::starting()
    })
}

/// Encode `event` as a scripted frame.
pub fn frame(event: &ServerEvent) -> Option<Result<String, PvpClientError>> {
    Some(Ok(event.encode().expect("encode server event")))
}
