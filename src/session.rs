//! Session phase state machine.
//!
//! [`Session`] is synchronous and performs no I/O. Every reaction (a server
//! event, a local gesture, a clock advance) runs to completion and leaves its
//! effects in two queues: outbound [`ClientMessage`]s for the transport and
//! [`SessionUpdate`]s for observers. The caller drains both after each
//! reaction. [`PvpClient`](crate::PvpClient) is one such caller.
//!
//! `GameOver` is sticky. Once entered, only the post-game countdown or an
//! explicit [`play_again`](Session::play_again) leaves it; server events
//! arriving in the meantime are dropped.

use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::position::{CapturedView, GameResult, PositionCache, StatusLine};
use crate::protocol::{
    ClientMessage, Color, MoveIntent, PositionSnapshot, ServerEvent, SessionStatus, Square,
};
use crate::rules::RulesEngine;
use crate::selection::{CandidateMark, ClickOutcome, InputGate, MoveSelector, Selection};
use crate::timer::{Countdown, CountdownTick};

/// Default length of the post-game countdown.
pub const DEFAULT_POST_GAME_COUNTDOWN_SECS: u32 = 30;

/// Default time a sent move may wait for its snapshot.
pub const DEFAULT_MOVE_ACK_TIMEOUT_SECS: u32 = 10;

/// Queue position assumed until the server reports one.
const DEFAULT_QUEUE_POSITION: u32 = 1;

// ── Configuration ───────────────────────────────────────────────────

/// Settings a [`Session`] needs. Contains no I/O parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// The local player's color, fixed for the session's lifetime.
    pub color: Color,
    /// Seconds between game over and the automatic return to matchmaking.
    pub post_game_countdown_secs: u32,
    /// Seconds to wait for a snapshot after sending a move. `None` waits forever.
    pub move_ack_timeout_secs: Option<u32>,
}

impl SessionConfig {
    /// Defaults for a player of `color`.
    pub fn new(color: Color) -> Self {
        Self {
            color,
            post_game_countdown_secs: DEFAULT_POST_GAME_COUNTDOWN_SECS,
            move_ack_timeout_secs: Some(DEFAULT_MOVE_ACK_TIMEOUT_SECS),
        }
    }
}

// ── Phases ──────────────────────────────────────────────────────────

/// The session's current phase. Exactly one is active at a time.
///
/// Countdowns live inside the phase that owns them, so leaving the phase
/// destroys the countdown with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    /// No status received yet.
    Connecting,
    WaitingForOpponent,
    Queued {
        position: u32,
    },
    /// Both players present; waiting for readiness to be confirmed.
    BothReady,
    Playing,
    /// Terminal until the post-game countdown expires or the player asks for
    /// another game.
    GameOver {
        result: GameResult,
        countdown: Countdown,
    },
    /// The opponent dropped. The countdown is advisory; the server decides
    /// the forfeit.
    OpponentDisconnected {
        countdown: Countdown,
    },
}

impl SessionPhase {
    /// `true` for `GameOver`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::GameOver { .. })
    }

    /// Countdown owned by this phase, if any.
    pub fn countdown(&self) -> Option<&Countdown> {
        match self {
            Self::GameOver { countdown, .. } | Self::OpponentDisconnected { countdown } => {
                Some(countdown)
            }
            _ => None,
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::WaitingForOpponent => "waiting_for_opponent",
            Self::Queued { .. } => "queued",
            Self::BothReady => "both_ready",
            Self::Playing => "playing",
            Self::GameOver { .. } => "game_over",
            Self::OpponentDisconnected { .. } => "opponent_disconnected",
        }
    }
}

// ── Observer updates ────────────────────────────────────────────────

/// Which countdown a tick belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Opponent disconnect countdown.
    Disconnect,
    /// Countdown back to matchmaking after a finished game.
    PostGame,
}

/// Something observers may want to react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    /// The transport (re)connected and the join request was re-sent.
    Connected,
    /// The phase changed.
    PhaseChanged(SessionPhase),
    /// A new authoritative position was applied.
    PositionChanged(Box<PositionSnapshot>),
    /// The selection or its candidate destinations changed.
    SelectionChanged(Selection),
    /// A countdown lost a second.
    CountdownTick { timer: TimerKind, remaining_secs: u32 },
    /// The disconnect countdown reached zero. Purely advisory.
    ForfeitCountdownElapsed,
    /// A move was handed to the transport.
    MoveSent { uci: String },
    /// No snapshot arrived in time for a sent move. Input is accepted again.
    MoveUnacknowledged { uci: String },
    /// The matchmaking queue position changed.
    QueuePositionChanged(u32),
    /// The server refused a request.
    ServerError(String),
    /// The session loop ended.
    Disconnected {
        /// Why, if known.
        reason: Option<String>,
    },
}

/// A move waiting for the snapshot that acknowledges it.
#[derive(Debug, Clone)]
struct PendingMove {
    uci: String,
    timeout: Option<Countdown>,
}

/// Board-free copy of what a renderer needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    pub color: Color,
    pub phase: SessionPhase,
    pub snapshot: PositionSnapshot,
    /// `false` until the first server snapshot of this session.
    pub authoritative: bool,
    pub status_line: StatusLine,
    pub selection: Selection,
    pub candidates: Vec<CandidateMark>,
    pub queue_position: u32,
    /// UCI of the move awaiting acknowledgement.
    pub pending_move: Option<String>,
}

impl SessionView {
    /// Captured pieces arranged for the local player's orientation.
    pub fn captured(&self) -> CapturedView<'_> {
        CapturedView::of(&self.snapshot, self.color)
    }
}

// ── Session ─────────────────────────────────────────────────────────

/// Session phase state machine for one local player.
#[derive(Debug)]
pub struct Session<R: RulesEngine> {
    rules: R,
    config: SessionConfig,
    phase: SessionPhase,
    position: PositionCache<R::Board>,
    selector: MoveSelector,
    queue_position: u32,
    ready_sent: bool,
    pending_move: Option<PendingMove>,
    outbox: Vec<ClientMessage>,
    updates: Vec<SessionUpdate>,
}

impl<R: RulesEngine> Session<R> {
    /// Create a session in `Connecting` with the starting position.
    ///
    /// # Errors
    ///
    /// Fails only if `rules` cannot load the starting position.
    pub fn new(rules: R, config: SessionConfig) -> Result<Self> {
        let position = PositionCache::starting(&rules)?;
        Ok(Self {
            rules,
            config,
            phase: SessionPhase::Connecting,
            position,
            selector: MoveSelector::new(),
            queue_position: DEFAULT_QUEUE_POSITION,
            ready_sent: false,
            pending_move: None,
            outbox: Vec::new(),
            updates: Vec::new(),
        })
    }

    // ── Views ───────────────────────────────────────────────────────

    pub fn color(&self) -> Color {
        self.config.color
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn phase(&self) -> &SessionPhase {
        &self.phase
    }

    pub fn rules(&self) -> &R {
        &self.rules
    }

    /// The position cache.
    pub fn position(&self) -> &PositionCache<R::Board> {
        &self.position
    }

    pub fn selection(&self) -> &Selection {
        self.selector.selection()
    }

    /// Last known matchmaking queue position.
    pub fn queue_position(&self) -> u32 {
        self.queue_position
    }

    /// `true` while a sent move awaits its snapshot.
    pub fn is_move_pending(&self) -> bool {
        self.pending_move.is_some()
    }

    pub fn status_line(&self) -> StatusLine {
        self.position.status_line(self.config.color)
    }

    pub fn captured_view(&self) -> CapturedView<'_> {
        self.position.captured_view(self.config.color)
    }

    /// Candidate destinations of the current selection, classified.
    pub fn candidate_marks(&self) -> Vec<CandidateMark> {
        self.selector
            .candidate_marks(&self.rules, self.position.board(), self.config.color)
    }

    /// Whether a gesture would currently be accepted.
    pub fn input_gate(&self) -> InputGate {
        InputGate {
            local: self.config.color,
            active: self.position.active_color(),
            playing: self.phase == SessionPhase::Playing,
            busy: self.pending_move.is_some(),
        }
    }

    /// Board-free snapshot of the session.
    pub fn view(&self) -> SessionView {
        SessionView {
            color: self.config.color,
            phase: self.phase.clone(),
            snapshot: self.position.snapshot().clone(),
            authoritative: self.position.is_authoritative(),
            status_line: self.status_line(),
            selection: self.selection().clone(),
            candidates: self.candidate_marks(),
            queue_position: self.queue_position,
            pending_move: self.pending_move.as_ref().map(|p| p.uci.clone()),
        }
    }

    /// Take the messages queued for the transport.
    pub fn drain_outbound(&mut self) -> Vec<ClientMessage> {
        std::mem::take(&mut self.outbox)
    }

    /// Take the updates queued for observers.
    pub fn drain_updates(&mut self) -> Vec<SessionUpdate> {
        std::mem::take(&mut self.updates)
    }

    // ── Remote events ───────────────────────────────────────────────

    /// Queue a join request for the local color.
    pub fn announce_join(&mut self) {
        debug!(color = %self.config.color, "announcing join");
        self.outbox.push(ClientMessage::JoinPvp {
            color: self.config.color,
        });
    }

    /// React to one server event received at `now`.
    pub fn handle_event(&mut self, event: ServerEvent, now: Instant) {
        if self.phase.is_terminal() {
            if matches!(event, ServerEvent::Connected) {
                // The post-game reset re-announces the join.
                self.updates.push(SessionUpdate::Connected);
            }
            debug!(event = event.name(), "game over, ignoring event");
            return;
        }

        match event {
            ServerEvent::Connected => self.on_connected(),
            ServerEvent::Status(payload) => self.on_status(payload.status, payload.position),
            ServerEvent::GameStart(payload) => {
                if let Some(assigned) = payload.color {
                    if assigned != self.config.color {
                        warn!(
                            local = %self.config.color,
                            %assigned,
                            "server assigned a different color, keeping ours"
                        );
                    }
                }
                self.set_phase(SessionPhase::Playing);
            }
            ServerEvent::GameState(snapshot) => self.apply_snapshot(*snapshot, now),
            ServerEvent::OpponentDisconnected(payload) => {
                self.on_opponent_disconnected(payload.timeout, now);
            }
            ServerEvent::OpponentReconnected => self.on_opponent_reconnected(),
            ServerEvent::QueueUpdate(payload) => self.on_queue_position(payload.position),
            ServerEvent::PvpError(payload) => {
                warn!(message = %payload.message, "server refused request");
                self.updates
                    .push(SessionUpdate::ServerError(payload.message));
            }
            ServerEvent::Unknown { event } => {
                debug!(%event, "ignoring unknown event");
            }
        }
    }

    fn on_connected(&mut self) {
        info!(phase = self.phase.name(), "connection established");
        self.clear_selection();
        self.pending_move = None;
        self.announce_join();
        self.updates.push(SessionUpdate::Connected);
    }

    fn on_status(&mut self, status: SessionStatus, position: Option<u32>) {
        match status {
            SessionStatus::Waiting => self.set_phase(SessionPhase::WaitingForOpponent),
            SessionStatus::Queued => {
                if let Some(position) = position {
                    self.remember_queue_position(position);
                }
                self.set_phase(SessionPhase::Queued {
                    position: self.queue_position,
                });
            }
            SessionStatus::Ready => self.set_phase(SessionPhase::BothReady),
            SessionStatus::Playing => self.set_phase(SessionPhase::Playing),
            SessionStatus::Unknown => debug!("ignoring unrecognized session status"),
        }
    }

    fn on_queue_position(&mut self, position: u32) {
        self.remember_queue_position(position);
        if matches!(self.phase, SessionPhase::Queued { .. }) {
            self.set_phase(SessionPhase::Queued { position });
        }
    }

    fn remember_queue_position(&mut self, position: u32) {
        if self.queue_position != position {
            self.queue_position = position;
            self.updates
                .push(SessionUpdate::QueuePositionChanged(position));
        }
    }

    fn on_opponent_disconnected(&mut self, timeout_secs: u32, now: Instant) {
        if self.phase == SessionPhase::Playing {
            info!(timeout_secs, "opponent disconnected");
            self.set_phase(SessionPhase::OpponentDisconnected {
                countdown: Countdown::start(timeout_secs, now),
            });
        } else if let SessionPhase::OpponentDisconnected { countdown } = &mut self.phase {
            debug!(timeout_secs, "opponent disconnected again, restarting countdown");
            *countdown = Countdown::start(timeout_secs, now);
            self.updates.push(SessionUpdate::CountdownTick {
                timer: TimerKind::Disconnect,
                remaining_secs: timeout_secs,
            });
        } else {
            debug!(phase = self.phase.name(), "ignoring opponent_disconnected");
        }
    }

    fn on_opponent_reconnected(&mut self) {
        let SessionPhase::OpponentDisconnected { countdown } = &self.phase else {
            debug!(phase = self.phase.name(), "ignoring opponent_reconnected");
            return;
        };
        info!(
            remaining_secs = countdown.clone().cancel(),
            "opponent reconnected"
        );
        self.set_phase(SessionPhase::Playing);
    }

    fn apply_snapshot(&mut self, snapshot: PositionSnapshot, now: Instant) {
        if let Err(e) = self.position.replace(&self.rules, snapshot) {
            warn!("discarding snapshot: {e}");
            return;
        }
        let snapshot = self.position.snapshot().clone();
        debug!(fen = %snapshot.fen, turn = %snapshot.turn, "applied snapshot");

        self.pending_move = None;
        self.clear_selection();
        self.updates
            .push(SessionUpdate::PositionChanged(Box::new(snapshot.clone())));

        if let Some(result) = GameResult::from_snapshot(&snapshot) {
            info!(?result, "game over");
            self.set_phase(SessionPhase::GameOver {
                result,
                countdown: Countdown::start(self.config.post_game_countdown_secs, now),
            });
        }
    }

    // ── Local input ─────────────────────────────────────────────────

    /// Handle a click on `square` at `now`.
    pub fn click_square(&mut self, square: Square, now: Instant) -> ClickOutcome {
        let gate = self.input_gate();
        let outcome = self
            .selector
            .click(&self.rules, self.position.board(), gate, square);
        match outcome {
            ClickOutcome::Ignored => {}
            ClickOutcome::Selected(_) | ClickOutcome::Cleared => self.push_selection(),
            ClickOutcome::Move(intent) => self.send_move(intent, now),
        }
        outcome
    }

    /// Handle a piece dragged from `from` and released on `to` at `now`.
    ///
    /// Returns the move that was sent, or `None` if the drop was refused.
    pub fn drop_piece(&mut self, from: Square, to: Square, now: Instant) -> Option<MoveIntent> {
        let gate = self.input_gate();
        let intent = self
            .selector
            .drop_piece(&self.rules, self.position.board(), gate, from, to)?;
        self.send_move(intent, now);
        Some(intent)
    }

    /// Confirm readiness. Only the first call in `BothReady` sends anything.
    pub fn signal_ready(&mut self) -> bool {
        if self.phase != SessionPhase::BothReady {
            debug!(phase = self.phase.name(), "ready ignored");
            return false;
        }
        if self.ready_sent {
            return false;
        }
        self.ready_sent = true;
        self.outbox.push(ClientMessage::PlayerReady {});
        true
    }

    /// Resign the current game. Only sent while `Playing`.
    pub fn resign(&mut self) -> bool {
        if self.phase != SessionPhase::Playing {
            debug!(phase = self.phase.name(), "resign ignored");
            return false;
        }
        info!("resigning");
        self.outbox.push(ClientMessage::Resign {});
        true
    }

    /// Leave `GameOver` immediately and ask for a new game.
    pub fn play_again(&mut self) -> bool {
        if !self.phase.is_terminal() {
            debug!(phase = self.phase.name(), "play again ignored");
            return false;
        }
        self.start_new_session();
        true
    }

    fn send_move(&mut self, intent: MoveIntent, now: Instant) {
        let uci = intent.uci();
        info!(%uci, "sending move");
        self.outbox.push(ClientMessage::from(intent));
        self.pending_move = Some(PendingMove {
            uci: uci.clone(),
            timeout: self
                .config
                .move_ack_timeout_secs
                .map(|secs| Countdown::start(secs, now)),
        });
        self.updates.push(SessionUpdate::MoveSent { uci });
        self.push_selection();
    }

    // ── Clock ───────────────────────────────────────────────────────

    /// Earliest instant at which [`advance_clock`](Self::advance_clock) has work.
    pub fn next_deadline(&self) -> Option<Instant> {
        let phase = self.phase.countdown().and_then(Countdown::next_tick_at);
        let pending = self
            .pending_move
            .as_ref()
            .and_then(|p| p.timeout.as_ref())
            .and_then(Countdown::next_tick_at);
        match (phase, pending) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Tick every countdown that is due at `now`.
    pub fn advance_clock(&mut self, now: Instant) {
        self.advance_pending_move(now);

        let mut post_game_expired = false;
        match &mut self.phase {
            SessionPhase::OpponentDisconnected { countdown } => {
                while countdown.is_due(now) {
                    let tick = countdown.tick();
                    self.updates.push(SessionUpdate::CountdownTick {
                        timer: TimerKind::Disconnect,
                        remaining_secs: countdown.remaining_secs(),
                    });
                    if tick == CountdownTick::Expired {
                        info!("disconnect countdown elapsed");
                        self.updates.push(SessionUpdate::ForfeitCountdownElapsed);
                    }
                }
            }
            SessionPhase::GameOver { countdown, .. } => {
                while countdown.is_due(now) {
                    let tick = countdown.tick();
                    self.updates.push(SessionUpdate::CountdownTick {
                        timer: TimerKind::PostGame,
                        remaining_secs: countdown.remaining_secs(),
                    });
                    if tick == CountdownTick::Expired {
                        post_game_expired = true;
                        break;
                    }
                }
            }
            _ => {}
        }

        if post_game_expired {
            debug!("post-game countdown elapsed");
            self.start_new_session();
        }
    }

    fn advance_pending_move(&mut self, now: Instant) {
        let Some(timeout) = self
            .pending_move
            .as_mut()
            .and_then(|p| p.timeout.as_mut())
        else {
            return;
        };
        let mut expired = false;
        while timeout.is_due(now) {
            if timeout.tick() == CountdownTick::Expired {
                expired = true;
                break;
            }
        }
        if expired {
            if let Some(pending) = self.pending_move.take() {
                warn!(uci = %pending.uci, "move not acknowledged");
                self.updates
                    .push(SessionUpdate::MoveUnacknowledged { uci: pending.uci });
            }
        }
    }

    // ── Internals ───────────────────────────────────────────────────

    /// Reset everything a finished game left behind and rejoin matchmaking.
    fn start_new_session(&mut self) {
        if let Err(e) = self.position.reset(&self.rules) {
            error!("failed to reset position: {e}");
        }
        self.updates.push(SessionUpdate::PositionChanged(Box::new(
            self.position.snapshot().clone(),
        )));
        self.set_phase(SessionPhase::Connecting);
        self.announce_join();
    }

    fn set_phase(&mut self, next: SessionPhase) {
        if self.phase == next {
            return;
        }
        debug!(from = self.phase.name(), to = next.name(), "phase transition");
        self.clear_selection();
        self.pending_move = None;
        self.ready_sent = false;
        self.phase = next;
        self.updates
            .push(SessionUpdate::PhaseChanged(self.phase.clone()));
    }

    fn clear_selection(&mut self) {
        if self.selector.clear() {
            self.push_selection();
        }
    }

    fn push_selection(&mut self) {
        self.updates.push(SessionUpdate::SelectionChanged(
            self.selector.selection().clone(),
        ));
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
    use crate::protocol::{OpponentDisconnectedPayload, StatusPayload};
    use crate::rules::StandardChess;
    use crate::timer::TICK_PERIOD;

    fn session(color: Color) -> Session<StandardChess> {
        Session::new(StandardChess, SessionConfig::new(color)).unwrap()
    }

    fn status(status: SessionStatus) -> ServerEvent {
        ServerEvent::Status(StatusPayload {
            status,
            position: None,
        })
    }

    #[test]
    fn starts_connecting_with_nothing_queued() {
        let mut s = session(Color::White);
        assert_eq!(s.phase(), &SessionPhase::Connecting);
        assert!(s.drain_outbound().is_empty());
        assert!(s.drain_updates().is_empty());
        assert_eq!(s.next_deadline(), None);
    }

    #[test]
    fn repeated_status_does_not_repeat_phase_change() {
        let now = Instant::now();
        let mut s = session(Color::White);
        s.handle_event(status(SessionStatus::Waiting), now);
        s.handle_event(status(SessionStatus::Waiting), now);
        let changes = s
            .drain_updates()
            .into_iter()
            .filter(|u| matches!(u, SessionUpdate::PhaseChanged(_)))
            .count();
        assert_eq!(changes, 1);
    }

    #[test]
    fn ready_latch_resets_on_phase_change() {
        let now = Instant::now();
        let mut s = session(Color::White);
        assert!(!s.signal_ready());
        s.handle_event(status(SessionStatus::Ready), now);
        assert!(s.signal_ready());
        assert!(!s.signal_ready());
        s.handle_event(status(SessionStatus::Waiting), now);
        s.handle_event(status(SessionStatus::Ready), now);
        assert!(s.signal_ready());
        let readies = s
            .drain_outbound()
            .into_iter()
            .filter(|m| *m == ClientMessage::PlayerReady {})
            .count();
        assert_eq!(readies, 2);
    }

    #[test]
    fn deadline_tracks_phase_countdown() {
        let now = Instant::now();
        let mut s = session(Color::White);
        s.handle_event(status(SessionStatus::Playing), now);
        s.handle_event(
            ServerEvent::OpponentDisconnected(OpponentDisconnectedPayload { timeout: 5 }),
            now,
        );
        assert_eq!(s.next_deadline(), Some(now + TICK_PERIOD));
        s.handle_event(ServerEvent::OpponentReconnected, now);
        assert_eq!(s.next_deadline(), None);
    }

    #[test]
    fn phase_names_are_stable() {
        assert_eq!(SessionPhase::Connecting.name(), "connecting");
        assert_eq!(SessionPhase::Queued { position: 2 }.name(), "queued");
        assert!(SessionPhase::Playing.countdown().is_none());
    }
}
