#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Integration tests for [`PvpClient`].
//!
//! Scripted sessions use `MockTransport` from `tests/common`; interactive
//! ones use the loopback transport so the test can play the server.

mod common;

use std::time::Duration;

use pvp_chess_client::protocol::{ClientMessage, Color, SessionStatus, Winner};
use pvp_chess_client::session::TimerKind;
use pvp_chess_client::transports::{loopback_pair, LoopbackServer};
use pvp_chess_client::{
    PvpClient, PvpClientError, PvpConfig, SessionPhase, SessionUpdate, StandardChess,
};
use tokio::sync::mpsc::Receiver;

use common::{
    checkmate, frame, game_start, opening_state, opponent_disconnected, queued, sent_messages,
    snapshot, sq, status, MockTransport, AFTER_E4,
};

/// Receive updates until one matches `pred`, returning it.
async fn wait_for(
    updates: &mut Receiver<SessionUpdate>,
    pred: impl Fn(&SessionUpdate) -> bool,
) -> SessionUpdate {
    loop {
        let update = updates.recv().await.expect("update channel closed");
        if pred(&update) {
            return update;
        }
    }
}

async fn wait_for_phase(updates: &mut Receiver<SessionUpdate>, phase: SessionPhase) {
    wait_for(updates, |u| *u == SessionUpdate::PhaseChanged(phase.clone())).await;
}

/// Start a client on a loopback pair and consume its join request.
async fn start_loopback(
    config: PvpConfig,
) -> (PvpClient, Receiver<SessionUpdate>, LoopbackServer) {
    let (transport, mut server) = loopback_pair();
    let color = config.color;
    let (client, updates) = PvpClient::start(transport, StandardChess, config).unwrap();
    let join = server.recv_message().await.unwrap().unwrap();
    assert_eq!(join, ClientMessage::JoinPvp { color });
    (client, updates, server)
}

// ════════════════════════════════════════════════════════════════════
// Startup
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn join_is_sent_when_transport_is_connected() {
    let (transport, sent, _closed) = MockTransport::new(vec![frame(&status(
        SessionStatus::Waiting,
    ))]);
    let (mut client, mut updates) =
        PvpClient::start(transport, StandardChess, PvpConfig::new(Color::Black)).unwrap();

    wait_for_phase(&mut updates, SessionPhase::WaitingForOpponent).await;
    assert_eq!(
        sent_messages(&sent),
        vec![ClientMessage::JoinPvp {
            color: Color::Black
        }]
    );
    assert_eq!(client.current_phase().await, SessionPhase::WaitingForOpponent);

    client.shutdown().await;
}

#[tokio::test]
async fn join_waits_for_connect_frame() {
    let (transport, sent, _closed) = MockTransport::disconnected(vec![
        frame(&pvp_chess_client::ServerEvent::Connected),
    ]);
    let (mut client, mut updates) =
        PvpClient::start(transport, StandardChess, PvpConfig::new(Color::White)).unwrap();

    wait_for(&mut updates, |u| *u == SessionUpdate::Connected).await;
    assert_eq!(
        sent_messages(&sent),
        vec![ClientMessage::JoinPvp {
            color: Color::White
        }]
    );
    client.shutdown().await;
}

#[test]
fn invalid_color_blocks_start() {
    assert!(matches!(
        PvpConfig::from_color_param(Some("spectator")),
        Err(PvpClientError::InvalidColor(c)) if c == "spectator"
    ));
}

// ════════════════════════════════════════════════════════════════════
// Lobby and play
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn lobby_flow_reaches_playing() {
    let (transport, sent, _closed) = MockTransport::new(vec![
        frame(&status(SessionStatus::Waiting)),
        frame(&queued(3)),
        frame(&status(SessionStatus::Ready)),
        frame(&game_start()),
    ]);
    let (mut client, mut updates) =
        PvpClient::start(transport, StandardChess, PvpConfig::new(Color::White)).unwrap();

    let mut seen = Vec::new();
    while seen.last() != Some(&SessionPhase::Playing) {
        if let SessionUpdate::PhaseChanged(phase) = updates.recv().await.unwrap() {
            seen.push(phase);
        }
    }
    assert_eq!(
        seen,
        vec![
            SessionPhase::WaitingForOpponent,
            SessionPhase::Queued { position: 3 },
            SessionPhase::BothReady,
            SessionPhase::Playing,
        ]
    );
    assert_eq!(sent_messages(&sent).len(), 1);
    client.shutdown().await;
}

#[tokio::test]
async fn ready_and_moves_reach_the_server() {
    let (mut client, mut updates, mut server) = start_loopback(PvpConfig::new(Color::White)).await;

    server.send_event(&status(SessionStatus::Ready)).unwrap();
    wait_for_phase(&mut updates, SessionPhase::BothReady).await;
    client.signal_ready().unwrap();
    client.signal_ready().unwrap();
    assert_eq!(
        server.recv_message().await.unwrap().unwrap(),
        ClientMessage::PlayerReady {}
    );

    server.send_event(&game_start()).unwrap();
    server.send_event(&opening_state()).unwrap();
    wait_for(&mut updates, |u| matches!(u, SessionUpdate::PositionChanged(_))).await;

    client.click_square(sq("e2")).unwrap();
    client.click_square(sq("e4")).unwrap();
    assert_eq!(
        server.recv_message().await.unwrap().unwrap(),
        ClientMessage::MakeMove { uci: "e2e4".into() }
    );
    wait_for(&mut updates, |u| {
        matches!(u, SessionUpdate::MoveSent { uci } if uci == "e2e4")
    })
    .await;

    // Only one ready went out.
    assert!(server.try_recv_message().is_none());

    server
        .send_event(&common::game_state(snapshot(AFTER_E4, Color::Black)))
        .unwrap();
    wait_for(&mut updates, |u| matches!(u, SessionUpdate::PositionChanged(_))).await;
    let view = client.view().await;
    assert_eq!(view.snapshot.fen, AFTER_E4);
    assert_eq!(view.pending_move, None);

    client.shutdown().await;
}

#[tokio::test]
async fn drop_is_refused_when_not_our_turn() {
    let (mut client, mut updates, mut server) = start_loopback(PvpConfig::new(Color::Black)).await;
    server.send_event(&game_start()).unwrap();
    server.send_event(&opening_state()).unwrap();
    wait_for(&mut updates, |u| matches!(u, SessionUpdate::PositionChanged(_))).await;

    client.drop_piece(sq("e7"), sq("e5")).unwrap();
    client.resign().unwrap();
    // Commands are handled in order, so the resign proves the drop was processed.
    assert_eq!(
        server.recv_message().await.unwrap().unwrap(),
        ClientMessage::Resign {}
    );
    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Timers under paused time
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn disconnect_countdown_ticks_every_second() {
    let (mut client, mut updates, server) = start_loopback(PvpConfig::new(Color::White)).await;
    server.send_event(&game_start()).unwrap();
    server.send_event(&opponent_disconnected(3)).unwrap();

    let mut ticks = Vec::new();
    loop {
        match updates.recv().await.unwrap() {
            SessionUpdate::CountdownTick {
                timer: TimerKind::Disconnect,
                remaining_secs,
            } => ticks.push(remaining_secs),
            SessionUpdate::ForfeitCountdownElapsed => break,
            _ => {}
        }
    }
    assert_eq!(ticks, vec![2, 1, 0]);
    assert!(matches!(
        client.current_phase().await,
        SessionPhase::OpponentDisconnected { .. }
    ));

    server
        .send_event(&pvp_chess_client::ServerEvent::OpponentReconnected)
        .unwrap();
    wait_for_phase(&mut updates, SessionPhase::Playing).await;
    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn post_game_countdown_rejoins_matchmaking() {
    let config = PvpConfig::new(Color::Black).with_post_game_countdown_secs(5);
    let (mut client, mut updates, mut server) = start_loopback(config).await;
    server.send_event(&game_start()).unwrap();
    server.send_event(&checkmate(Winner::Black)).unwrap();

    let started = tokio::time::Instant::now();
    wait_for_phase(&mut updates, SessionPhase::Connecting).await;
    assert!(started.elapsed() >= Duration::from_secs(5));

    assert_eq!(
        server.recv_message().await.unwrap().unwrap(),
        ClientMessage::JoinPvp {
            color: Color::Black
        }
    );
    let view = client.view().await;
    assert!(!view.authoritative);
    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn play_again_skips_the_countdown() {
    let (mut client, mut updates, mut server) = start_loopback(PvpConfig::new(Color::White)).await;
    server.send_event(&game_start()).unwrap();
    server.send_event(&checkmate(Winner::Black)).unwrap();
    wait_for(&mut updates, |u| {
        matches!(u, SessionUpdate::PhaseChanged(SessionPhase::GameOver { .. }))
    })
    .await;

    let started = tokio::time::Instant::now();
    client.play_again().unwrap();
    assert_eq!(
        server.recv_message().await.unwrap().unwrap(),
        ClientMessage::JoinPvp {
            color: Color::White
        }
    );
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(client.current_phase().await, SessionPhase::Connecting);
    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Teardown
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn malformed_frames_are_ignored() {
    let (transport, _sent, _closed) = MockTransport::new(vec![
        Some(Ok("not json".into())),
        Some(Ok(r#"{"event":"queue_update","data":{"position":"first"}}"#.into())),
        Some(Ok(r#"{"event":"robot_move","data":{"uci":"e2e4"}}"#.into())),
        frame(&status(SessionStatus::Waiting)),
    ]);
    let (mut client, mut updates) =
        PvpClient::start(transport, StandardChess, PvpConfig::new(Color::White)).unwrap();

    let first = updates.recv().await.unwrap();
    assert_eq!(
        first,
        SessionUpdate::PhaseChanged(SessionPhase::WaitingForOpponent)
    );
    assert!(client.is_connected());
    client.shutdown().await;
}

#[tokio::test]
async fn transport_close_emits_disconnected() {
    let (transport, _sent, _closed) = MockTransport::new(vec![None]);
    let (client, mut updates) =
        PvpClient::start(transport, StandardChess, PvpConfig::new(Color::White)).unwrap();

    let update = wait_for(&mut updates, |u| {
        matches!(u, SessionUpdate::Disconnected { .. })
    })
    .await;
    assert_eq!(update, SessionUpdate::Disconnected { reason: None });
    assert!(updates.recv().await.is_none());
    assert!(!client.is_connected());
    assert!(matches!(
        client.click_square(sq("e2")),
        Err(PvpClientError::NotConnected)
    ));
}

#[tokio::test]
async fn transport_error_emits_disconnected_with_reason() {
    let (transport, _sent, _closed) = MockTransport::new(vec![Some(Err(
        PvpClientError::TransportReceive("reset by peer".into()),
    ))]);
    let (_client, mut updates) =
        PvpClient::start(transport, StandardChess, PvpConfig::new(Color::White)).unwrap();

    let SessionUpdate::Disconnected { reason } = wait_for(&mut updates, |u| {
        matches!(u, SessionUpdate::Disconnected { .. })
    })
    .await
    else {
        unreachable!();
    };
    assert!(reason.unwrap().contains("reset by peer"));
}

#[tokio::test]
async fn shutdown_closes_transport_and_emits_disconnected() {
    let (transport, _sent, closed) = MockTransport::new(vec![]);
    let (mut client, mut updates) =
        PvpClient::start(transport, StandardChess, PvpConfig::new(Color::White)).unwrap();

    client.shutdown().await;
    assert!(closed.load(std::sync::atomic::Ordering::Relaxed));
    assert_eq!(
        updates.recv().await,
        Some(SessionUpdate::Disconnected {
            reason: Some("client shut down".into())
        })
    );
    assert!(!client.is_connected());
    assert!(matches!(
        client.resign(),
        Err(PvpClientError::NotConnected)
    ));

    // A second shutdown is harmless.
    client.shutdown().await;
}

#[tokio::test]
async fn small_update_channel_drops_but_still_disconnects() {
    let mut incoming = Vec::new();
    for position in 1..=20 {
        incoming.push(frame(&common::queue_update(position)));
    }
    incoming.push(None);
    let (transport, _sent, _closed) = MockTransport::new(incoming);
    let config = PvpConfig::new(Color::White).with_event_channel_capacity(2);
    let (_client, mut updates) = PvpClient::start(transport, StandardChess, config).unwrap();

    // Let the loop run ahead of the consumer.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut received = Vec::new();
    while let Some(update) = updates.recv().await {
        received.push(update);
    }
    assert_eq!(
        received,
        vec![
            SessionUpdate::QueuePositionChanged(2),
            SessionUpdate::QueuePositionChanged(3),
            SessionUpdate::Disconnected { reason: None },
        ]
    );
}

#[tokio::test]
async fn dropping_the_handle_stops_the_loop() {
    let (transport, _sent, _closed) = MockTransport::new(vec![]);
    let (client, mut updates) =
        PvpClient::start(transport, StandardChess, PvpConfig::new(Color::White)).unwrap();
    drop(client);
    assert!(updates.recv().await.is_none());
}
