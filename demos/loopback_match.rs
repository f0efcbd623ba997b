//! # Loopback Match
//!
//! Plays a short game against an in-process scripted server:
//!
//! 1. The client joins as white and the server seats an opponent
//! 2. Both sides confirm readiness and the game starts
//! 3. The client plays `e2e4` and `g1f3` by clicking squares
//! 4. The scripted opponent answers `e7e5`, then resigns
//!
//! ## Running
//!
//! ```sh
//! cargo run --example loopback_match
//!
//! # Show every frame on the wire:
//! RUST_LOG=debug cargo run --example loopback_match
//! ```

use pvp_chess_client::protocol::{
    ClientMessage, Color, GameStartPayload, PositionSnapshot, ServerEvent, SessionStatus,
    StatusPayload, Winner,
};
use pvp_chess_client::transports::{loopback_pair, LoopbackServer};
use pvp_chess_client::{PvpClient, PvpConfig, SessionPhase, SessionUpdate, StandardChess};

const AFTER_E4: &str = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1";
const AFTER_E4_E5: &str = "rnbqkbnr/pppp1ppp/8/4p3/4P3/8/PPPP1PPP/RNBQKBNR w KQkq e6 0 2";
const AFTER_NF3: &str = "rnbqkbnr/pppp1ppp/8/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R b KQkq - 1 2";

/// Moves the client plays, as (from, to) clicks.
const SCRIPT: &[(&str, &str)] = &[("e2", "e4"), ("g1", "f3")];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Start ───────────────────────────────────────────────────────
    let (transport, server) = loopback_pair();
    let server_task = tokio::spawn(run_server(server));

    let config = PvpConfig::from_color_param(Some("white"))?;
    let (mut client, mut updates) = PvpClient::start(transport, StandardChess, config)?;

    // ── Update loop ─────────────────────────────────────────────────
    let mut phase = SessionPhase::Connecting;
    let mut script = SCRIPT.iter();

    while let Some(update) = updates.recv().await {
        match update {
            SessionUpdate::PhaseChanged(next) => {
                tracing::info!(phase = next.name(), "phase changed");
                match &next {
                    SessionPhase::BothReady => client.signal_ready()?,
                    SessionPhase::GameOver { result, .. } => tracing::info!(
                        outcome = ?result.outcome_for(Color::White),
                        reason = ?result.reason,
                        "game over"
                    ),
                    _ => {}
                }
                let finished = next.is_terminal();
                phase = next;
                if finished {
                    break;
                }
            }
            SessionUpdate::PositionChanged(snapshot) => {
                tracing::info!(fen = %snapshot.fen, "position");
                if matches!(phase, SessionPhase::Playing) && snapshot.turn == Color::White {
                    if let Some((from, to)) = script.next() {
                        client.click_square(from.parse()?)?;
                        client.click_square(to.parse()?)?;
                    }
                }
            }
            SessionUpdate::MoveSent { uci } => tracing::info!(%uci, "move sent"),
            SessionUpdate::ServerError(message) => tracing::warn!(%message, "server error"),
            SessionUpdate::Disconnected { reason } => {
                tracing::info!(?reason, "disconnected");
                break;
            }
            _ => {}
        }
    }

    // ── Shutdown ────────────────────────────────────────────────────
    let view = client.view().await;
    tracing::info!(status = ?view.status_line, "final status");
    client.shutdown().await;
    server_task.await??;

    if !phase.is_terminal() {
        return Err("match did not finish".into());
    }
    Ok(())
}

/// Scripted opponent: seats the client, answers the first move and resigns
/// after the second.
async fn run_server(mut server: LoopbackServer) -> Result<(), pvp_chess_client::PvpClientError> {
    let mut moves_seen = 0;

    while let Some(message) = server.recv_message().await {
        match message? {
            ClientMessage::JoinPvp { color } => {
                tracing::debug!(%color, "server: join");
                server.send_event(&status(SessionStatus::Waiting))?;
                server.send_event(&status(SessionStatus::Ready))?;
            }
            ClientMessage::PlayerReady {} => {
                server.send_event(&ServerEvent::GameStart(GameStartPayload {
                    color: Some(Color::White),
                }))?;
                server.send_event(&status(SessionStatus::Playing))?;
                server.send_event(&position(PositionSnapshot::starting()))?;
            }
            ClientMessage::MakeMove { uci } => {
                tracing::debug!(%uci, "server: move");
                moves_seen += 1;
                if moves_seen == 1 {
                    server.send_event(&position(snapshot(AFTER_E4, Color::Black)))?;
                    server.send_event(&position(snapshot(AFTER_E4_E5, Color::White)))?;
                } else {
                    server.send_event(&position(PositionSnapshot {
                        is_game_over: true,
                        winner: Some(Winner::White),
                        forfeit: true,
                        ..snapshot(AFTER_NF3, Color::Black)
                    }))?;
                }
            }
            ClientMessage::Resign {} => break,
        }
    }
    Ok(())
}

fn status(status: SessionStatus) -> ServerEvent {
    ServerEvent::Status(StatusPayload {
        status,
        position: None,
    })
}

fn snapshot(fen: &str, turn: Color) -> PositionSnapshot {
    PositionSnapshot {
        fen: fen.to_string(),
        turn,
        ..PositionSnapshot::starting()
    }
}

fn position(snapshot: PositionSnapshot) -> ServerEvent {
    ServerEvent::GameState(Box::new(snapshot))
}
