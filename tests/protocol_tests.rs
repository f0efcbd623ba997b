#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Wire compatibility tests.
//!
//! The JSON fixtures below are frames as the game server emits them; the
//! client must decode every one of them, and its own frames must match what
//! the server's handlers read.

use pvp_chess_client::protocol::{
    ClientMessage, Color, GameStartPayload, MoveIntent, OpponentDisconnectedPayload, PieceKind,
    PositionSnapshot, PvpErrorPayload, QueueUpdatePayload, ServerEvent, SessionStatus,
    StatusPayload, Winner, STARTING_FEN,
};
use pvp_chess_client::PvpClientError;
use serde_json::json;

fn decode(value: serde_json::Value) -> ServerEvent {
    ServerEvent::decode(&value.to_string()).expect("decode server frame")
}

// ════════════════════════════════════════════════════════════════════
// Server → client fixtures
// ════════════════════════════════════════════════════════════════════

#[test]
fn status_frames() {
    assert_eq!(
        decode(json!({"event": "pvp_status", "data": {"status": "waiting"}})),
        ServerEvent::Status(StatusPayload {
            status: SessionStatus::Waiting,
            position: None
        })
    );
    assert_eq!(
        decode(json!({"event": "pvp_status", "data": {"status": "queued", "position": 2}})),
        ServerEvent::Status(StatusPayload {
            status: SessionStatus::Queued,
            position: Some(2)
        })
    );
    for (raw, status) in [("ready", SessionStatus::Ready), ("playing", SessionStatus::Playing)] {
        let ServerEvent::Status(payload) =
            decode(json!({"event": "pvp_status", "data": {"status": raw}}))
        else {
            panic!("expected status for {raw}");
        };
        assert_eq!(payload.status, status);
    }
}

#[test]
fn game_state_frame_from_server() {
    let event = decode(json!({
        "event": "game_state",
        "data": {
            "fen": "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1",
            "turn": "black",
            "is_check": false,
            "is_checkmate": false,
            "is_game_over": false,
            "winner": null,
            "white_captured": [],
            "black_captured": [],
            "last_move": "e2e4",
            "move_history": ["e2e4"]
        }
    }));
    let ServerEvent::GameState(snapshot) = event else {
        panic!("expected game_state");
    };
    assert_eq!(snapshot.turn, Color::Black);
    assert_eq!(snapshot.winner, None);
    assert!(!snapshot.is_terminal());
}

#[test]
fn forfeit_frame_from_server() {
    let event = decode(json!({
        "event": "game_state",
        "data": {
            "fen": STARTING_FEN,
            "turn": "white",
            "is_check": false,
            "is_checkmate": false,
            "is_game_over": true,
            "winner": "black",
            "white_captured": ["p", "n"],
            "black_captured": [],
            "forfeit": true
        }
    }));
    let ServerEvent::GameState(snapshot) = event else {
        panic!("expected game_state");
    };
    assert!(snapshot.forfeit);
    assert_eq!(snapshot.winner, Some(Winner::Black));
    assert_eq!(
        snapshot.white_captured,
        vec![PieceKind::Pawn, PieceKind::Knight]
    );
    assert!(snapshot.is_terminal());
}

#[test]
fn draw_winner_decodes() {
    let snapshot: PositionSnapshot = serde_json::from_value(json!({
        "fen": STARTING_FEN,
        "turn": "white",
        "is_check": false,
        "is_checkmate": false,
        "is_game_over": true,
        "winner": "draw"
    }))
    .unwrap();
    assert_eq!(snapshot.winner, Some(Winner::Draw));
    assert!(snapshot.white_captured.is_empty());
}

#[test]
fn lifecycle_frames() {
    assert_eq!(
        decode(json!({"event": "game_start", "data": {"color": "white"}})),
        ServerEvent::GameStart(GameStartPayload {
            color: Some(Color::White)
        })
    );
    assert_eq!(
        decode(json!({"event": "opponent_disconnected", "data": {"timeout": 60}})),
        ServerEvent::OpponentDisconnected(OpponentDisconnectedPayload { timeout: 60 })
    );
    assert_eq!(
        decode(json!({"event": "opponent_disconnected", "data": {"timeout_seconds": 45}})),
        ServerEvent::OpponentDisconnected(OpponentDisconnectedPayload { timeout: 45 })
    );
    assert_eq!(
        decode(json!({"event": "opponent_reconnected", "data": {}})),
        ServerEvent::OpponentReconnected
    );
    assert_eq!(
        decode(json!({"event": "queue_update", "data": {"position": 5}})),
        ServerEvent::QueueUpdate(QueueUpdatePayload { position: 5 })
    );
    assert_eq!(
        decode(json!({"event": "pvp_error", "data": {"message": "White is already taken"}})),
        ServerEvent::PvpError(PvpErrorPayload {
            message: "White is already taken".into()
        })
    );
    assert_eq!(decode(json!({"event": "connect"})), ServerEvent::Connected);
}

#[test]
fn frames_without_envelope_are_errors() {
    for raw in ["", "[]", "{}", r#"{"data":{}}"#, "not json"] {
        assert!(
            matches!(ServerEvent::decode(raw), Err(PvpClientError::Serialization(_))),
            "{raw:?} should not decode"
        );
    }
}

#[test]
fn encoded_events_decode_back() {
    let events = [
        ServerEvent::Connected,
        ServerEvent::OpponentReconnected,
        ServerEvent::GameStart(GameStartPayload::default()),
        ServerEvent::GameState(Box::new(PositionSnapshot::starting())),
    ];
    for event in events {
        let text = event.encode().unwrap();
        assert_eq!(ServerEvent::decode(&text).unwrap(), event);
    }
}

// ════════════════════════════════════════════════════════════════════
// Client → server frames
// ════════════════════════════════════════════════════════════════════

#[test]
fn client_frames_match_server_handlers() {
    let cases = [
        (
            ClientMessage::JoinPvp {
                color: Color::Black,
            },
            json!({"event": "join_pvp", "data": {"color": "black"}}),
        ),
        (
            ClientMessage::PlayerReady {},
            json!({"event": "player_ready", "data": {}}),
        ),
        (
            MoveIntent::parse_uci("e7e8q").unwrap().into(),
            json!({"event": "make_move", "data": {"uci": "e7e8q"}}),
        ),
        (
            ClientMessage::Resign {},
            json!({"event": "resign", "data": {}}),
        ),
    ];
    for (msg, expected) in cases {
        assert_eq!(serde_json::to_value(&msg).unwrap(), expected);
        assert_eq!(expected["event"], msg.name());
    }
}

#[test]
fn color_serializes_lowercase() {
    assert_eq!(serde_json::to_value(Color::White).unwrap(), json!("white"));
    assert!(serde_json::from_value::<Color>(json!("WHITE")).is_err());
}
