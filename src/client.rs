//! Async client for a PvP chess session.
//!
//! [`PvpClient`] is a thin handle. A background session loop owns the
//! [`Session`] state machine and the [`Transport`], and the handle talks to
//! it over an unbounded command channel. Observer updates arrive on the
//! bounded channel returned from [`PvpClient::start`].
//!
//! # Example
//!
//! ```rust,ignore
//! let transport = WebSocketTransport::connect("ws://localhost:5000/pvp").await?;
//! let config = PvpConfig::from_color_param(Some("white"))?;
//! let (client, mut updates) = PvpClient::start(transport, StandardChess, config)?;
//!
//! while let Some(update) = updates.recv().await {
//!     match update {
//!         SessionUpdate::PhaseChanged(SessionPhase::BothReady) => client.signal_ready()?,
//!         SessionUpdate::Disconnected { .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::error::{PvpClientError, Result};
use crate::protocol::{Color, ServerEvent, Square};
use crate::rules::RulesEngine;
use crate::session::{
    Session, SessionConfig, SessionPhase, SessionUpdate, SessionView,
    DEFAULT_MOVE_ACK_TIMEOUT_SECS, DEFAULT_POST_GAME_COUNTDOWN_SECS,
};
use crate::transport::Transport;

/// Default capacity of the bounded update channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`PvpClient`].
///
/// The only required field is the player's color.
///
/// ```
/// use pvp_chess_client::client::PvpConfig;
/// use pvp_chess_client::protocol::Color;
/// use std::time::Duration;
///
/// let config = PvpConfig::new(Color::Black)
///     .with_post_game_countdown_secs(10)
///     .with_shutdown_timeout(Duration::from_secs(5));
/// assert_eq!(config.color, Color::Black);
/// assert_eq!(config.post_game_countdown_secs, 10);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PvpConfig {
    /// Color the local player joins as. Fixed for the client's lifetime.
    pub color: Color,
    /// Capacity of the bounded update channel.
    ///
    /// When the consumer falls behind, updates are dropped with a warning so
    /// the session loop never blocks. `Disconnected` is always delivered.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// Time [`PvpClient::shutdown`] waits for the loop to close the transport
    /// before aborting it. Defaults to **1 second**.
    pub shutdown_timeout: Duration,
    /// Seconds from game over until the client rejoins matchmaking.
    /// Defaults to **30**.
    pub post_game_countdown_secs: u32,
    /// Seconds a sent move may wait for its snapshot before input is
    /// unlocked again. `None` waits forever. Defaults to **10**.
    pub move_ack_timeout_secs: Option<u32>,
}

impl PvpConfig {
    /// Default configuration for a player of `color`.
    pub fn new(color: Color) -> Self {
        Self {
            color,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            post_game_countdown_secs: DEFAULT_POST_GAME_COUNTDOWN_SECS,
            move_ack_timeout_secs: Some(DEFAULT_MOVE_ACK_TIMEOUT_SECS),
        }
    }

    /// Build a configuration from the raw session color parameter.
    ///
    /// ```
    /// use pvp_chess_client::client::PvpConfig;
    ///
    /// assert!(PvpConfig::from_color_param(Some("white")).is_ok());
    /// assert!(PvpConfig::from_color_param(Some("green")).is_err());
    /// assert!(PvpConfig::from_color_param(None).is_err());
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`PvpClientError::InvalidColor`] if the parameter is missing or
    /// is neither `"white"` nor `"black"`. No session should be started then.
    pub fn from_color_param(param: Option<&str>) -> Result<Self> {
        let raw = param.ok_or_else(|| PvpClientError::InvalidColor(String::new()))?;
        Ok(Self::new(raw.parse()?))
    }

    /// Set the capacity of the update channel. Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// Set the graceful shutdown timeout. Zero aborts immediately.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set the post-game countdown length.
    #[must_use]
    pub fn with_post_game_countdown_secs(mut self, secs: u32) -> Self {
        self.post_game_countdown_secs = secs;
        self
    }

    /// Set or disable the move acknowledgement timeout.
    #[must_use]
    pub fn with_move_ack_timeout_secs(mut self, secs: Option<u32>) -> Self {
        self.move_ack_timeout_secs = secs;
        self
    }

    /// The part of this configuration the state machine uses.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            color: self.color,
            post_game_countdown_secs: self.post_game_countdown_secs,
            move_ack_timeout_secs: self.move_ack_timeout_secs,
        }
    }
}

// ── Commands and shared state ───────────────────────────────────────

/// Local input forwarded to the session loop.
#[derive(Debug, Clone, Copy)]
enum Command {
    Click(Square),
    Drop { from: Square, to: Square },
    Ready,
    Resign,
    PlayAgain,
}

/// State shared between the handle and the session loop.
struct ClientState {
    connected: AtomicBool,
    view: Mutex<SessionView>,
}

// ── Client handle ───────────────────────────────────────────────────

/// Async handle for one PvP chess session.
///
/// Input methods queue a command and return immediately; their effects show
/// up as [`SessionUpdate`]s and in [`view`](Self::view).
pub struct PvpClient {
    cmd_tx: mpsc::UnboundedSender<Command>,
    state: Arc<ClientState>,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    shutdown_timeout: Duration,
}

impl PvpClient {
    /// Start the session loop and return a handle plus the update receiver.
    ///
    /// If `transport` reports it is connected, the join request is sent
    /// right away; otherwise the session waits for a `connect` frame.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Fails if `rules` cannot load the starting position.
    #[must_use = "the update receiver must be used to receive updates"]
    pub fn start<T, R>(
        transport: T,
        rules: R,
        config: PvpConfig,
    ) -> Result<(Self, mpsc::Receiver<SessionUpdate>)>
    where
        T: Transport,
        R: RulesEngine,
    {
        let mut session = Session::new(rules, config.session_config())?;
        if transport.is_connected() {
            session.announce_join();
        }

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<Command>();
        // tokio panics on a zero-capacity channel.
        let capacity = config.event_channel_capacity.max(1);
        let (update_tx, update_rx) = mpsc::channel::<SessionUpdate>(capacity);
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let state = Arc::new(ClientState {
            connected: AtomicBool::new(true),
            view: Mutex::new(session.view()),
        });

        let task = tokio::spawn(session_loop(
            transport,
            session,
            cmd_rx,
            update_tx,
            Arc::clone(&state),
            shutdown_rx,
        ));

        let client = Self {
            cmd_tx,
            state,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
        };
        Ok((client, update_rx))
    }

    // ── Input ───────────────────────────────────────────────────────

    /// Click a square.
    ///
    /// # Errors
    ///
    /// Returns [`PvpClientError::NotConnected`] once the session loop ended.
    pub fn click_square(&self, square: Square) -> Result<()> {
        self.send(Command::Click(square))
    }

    /// Drop a piece dragged from `from` onto `to`.
    ///
    /// # Errors
    ///
    /// Returns [`PvpClientError::NotConnected`] once the session loop ended.
    pub fn drop_piece(&self, from: Square, to: Square) -> Result<()> {
        self.send(Command::Drop { from, to })
    }

    /// Confirm readiness.
    ///
    /// # Errors
    ///
    /// Returns [`PvpClientError::NotConnected`] once the session loop ended.
    pub fn signal_ready(&self) -> Result<()> {
        self.send(Command::Ready)
    }

    /// Resign the current game.
    ///
    /// # Errors
    ///
    /// Returns [`PvpClientError::NotConnected`] once the session loop ended.
    pub fn resign(&self) -> Result<()> {
        self.send(Command::Resign)
    }

    /// Skip the post-game countdown and rejoin matchmaking.
    ///
    /// # Errors
    ///
    /// Returns [`PvpClientError::NotConnected`] once the session loop ended.
    pub fn play_again(&self) -> Result<()> {
        self.send(Command::PlayAgain)
    }

    /// Close the transport and stop the session loop.
    ///
    /// The update receiver yields `Disconnected` and then `None`.
    pub async fn shutdown(&mut self) {
        debug!("PvpClient: shutdown requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("session loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("session loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("session loop aborted: {join_err}");
                    }
                }
            }
        }

        self.state.connected.store(false, Ordering::Release);
    }

    // ── State accessors ─────────────────────────────────────────────

    /// `true` while the session loop is running.
    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::Acquire)
    }

    /// Latest published view of the session.
    pub async fn view(&self) -> SessionView {
        self.state.view.lock().await.clone()
    }

    /// Latest published phase.
    pub async fn current_phase(&self) -> SessionPhase {
        self.state.view.lock().await.phase.clone()
    }

    fn send(&self, cmd: Command) -> Result<()> {
        if !self.state.connected.load(Ordering::Acquire) {
            return Err(PvpClientError::NotConnected);
        }
        self.cmd_tx
            .send(cmd)
            .map_err(|_| PvpClientError::NotConnected)
    }
}

impl std::fmt::Debug for PvpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PvpClient")
            .field("connected", &self.is_connected())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for PvpClient {
    fn drop(&mut self) {
        // No executor to drive a graceful close from here.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Session loop ────────────────────────────────────────────────────

/// Background loop multiplexing commands, frames and the clock.
///
/// Exits when the handle shuts down or is dropped, or when the transport
/// closes or fails. Nothing can act on the session after that.
async fn session_loop<T, R>(
    mut transport: T,
    mut session: Session<R>,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    update_tx: mpsc::Sender<SessionUpdate>,
    state: Arc<ClientState>,
    mut shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) where
    T: Transport,
    R: RulesEngine,
{
    debug!(color = %session.color(), "session loop started");

    if let Err(e) = flush(&mut transport, &mut session, &update_tx, &state).await {
        error!("transport send error: {e}");
        emit_disconnected(&update_tx, &state, Some(format!("transport send error: {e}"))).await;
        return;
    }

    loop {
        let deadline = session.next_deadline();

        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(cmd) => apply_command(&mut session, cmd, Instant::now()),
                    None => {
                        debug!("command channel closed, shutting down session loop");
                        let _ = transport.close().await;
                        emit_disconnected(&update_tx, &state, Some("client shut down".into())).await;
                        break;
                    }
                }
            }

            _ = &mut shutdown_rx => {
                debug!("shutdown signal received");
                let _ = transport.close().await;
                emit_disconnected(&update_tx, &state, Some("client shut down".into())).await;
                break;
            }

            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(text)) => match ServerEvent::decode(&text) {
                        Ok(event) => session.handle_event(event, Instant::now()),
                        Err(e) => warn!("ignoring malformed server frame: {e} (raw: {text})"),
                    },
                    Some(Err(e)) => {
                        error!("transport receive error: {e}");
                        emit_disconnected(
                            &update_tx,
                            &state,
                            Some(format!("transport receive error: {e}")),
                        ).await;
                        break;
                    }
                    None => {
                        debug!("transport closed by server");
                        emit_disconnected(&update_tx, &state, None).await;
                        break;
                    }
                }
            }

            () = sleep_until(deadline) => session.advance_clock(Instant::now()),
        }

        if let Err(e) = flush(&mut transport, &mut session, &update_tx, &state).await {
            error!("transport send error: {e}");
            emit_disconnected(&update_tx, &state, Some(format!("transport send error: {e}")))
                .await;
            break;
        }
    }

    debug!("session loop exited");
}

fn apply_command<R: RulesEngine>(session: &mut Session<R>, cmd: Command, now: Instant) {
    debug!(?cmd, "applying command");
    match cmd {
        Command::Click(square) => {
            session.click_square(square, now);
        }
        Command::Drop { from, to } => {
            session.drop_piece(from, to, now);
        }
        Command::Ready => {
            session.signal_ready();
        }
        Command::Resign => {
            session.resign();
        }
        Command::PlayAgain => {
            session.play_again();
        }
    }
}

/// Wait until `deadline`, or forever without one.
async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Publish the view, emit queued updates and send queued messages.
async fn flush<T, R>(
    transport: &mut T,
    session: &mut Session<R>,
    update_tx: &mpsc::Sender<SessionUpdate>,
    state: &ClientState,
) -> Result<()>
where
    T: Transport,
    R: RulesEngine,
{
    let updates = session.drain_updates();
    if !updates.is_empty() {
        *state.view.lock().await = session.view();
    }
    for update in updates {
        emit_update(update_tx, update);
    }

    for msg in session.drain_outbound() {
        match serde_json::to_string(&msg) {
            Ok(json) => {
                debug!(event = msg.name(), "sending client message");
                transport.send(json).await?;
            }
            Err(e) => error!("failed to serialize ClientMessage: {e}"),
        }
    }
    Ok(())
}

/// Emit an update without blocking. Drops it with a warning when the
/// channel is full.
fn emit_update(update_tx: &mpsc::Sender<SessionUpdate>, update: SessionUpdate) {
    match update_tx.try_send(update) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            warn!("update channel full, dropping update: {dropped:?}");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("update channel closed, receiver dropped");
        }
    }
}

/// Emit the final [`Disconnected`](SessionUpdate::Disconnected) update.
///
/// Awaits channel capacity: this update is always the last one and must
/// not be dropped.
async fn emit_disconnected(
    update_tx: &mpsc::Sender<SessionUpdate>,
    state: &ClientState,
    reason: Option<String>,
) {
    state.connected.store(false, Ordering::Release);
    if update_tx
        .send(SessionUpdate::Disconnected { reason })
        .await
        .is_err()
    {
        debug!("update channel closed, receiver dropped");
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
    use crate::rules::StandardChess;
    use async_trait::async_trait;

    #[test]
    fn config_defaults() {
        let config = PvpConfig::new(Color::White);
        assert_eq!(config.event_channel_capacity, 256);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
        assert_eq!(config.post_game_countdown_secs, 30);
        assert_eq!(config.move_ack_timeout_secs, Some(10));
        assert_eq!(config.session_config(), SessionConfig::new(Color::White));
    }

    #[test]
    fn event_channel_capacity_is_clamped_to_one() {
        let config = PvpConfig::new(Color::White).with_event_channel_capacity(0);
        assert_eq!(config.event_channel_capacity, 1);
    }

    #[test]
    fn color_param_is_validated() {
        assert_eq!(
            PvpConfig::from_color_param(Some("black")).unwrap().color,
            Color::Black
        );
        assert!(matches!(
            PvpConfig::from_color_param(Some("White")),
            Err(PvpClientError::InvalidColor(_))
        ));
        assert!(matches!(
            PvpConfig::from_color_param(None),
            Err(PvpClientError::InvalidColor(_))
        ));
    }

    /// Transport that never receives and hangs in `close()`.
    struct HangingCloseTransport {
        close_called: Arc<AtomicBool>,
        dropped: Arc<AtomicBool>,
    }

    impl Drop for HangingCloseTransport {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::Release);
        }
    }

    #[async_trait]
    impl Transport for HangingCloseTransport {
        async fn send(&mut self, _message: String) -> Result<()> {
            Ok(())
        }

        async fn recv(&mut self) -> Option<Result<String>> {
            std::future::pending().await
        }

        async fn close(&mut self) -> Result<()> {
            self.close_called.store(true, Ordering::Release);
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn shutdown_timeout_aborts_stuck_session_loop() {
        let close_called = Arc::new(AtomicBool::new(false));
        let dropped = Arc::new(AtomicBool::new(false));
        let transport = HangingCloseTransport {
            close_called: Arc::clone(&close_called),
            dropped: Arc::clone(&dropped),
        };
        let config =
            PvpConfig::new(Color::White).with_shutdown_timeout(Duration::from_millis(20));
        let (mut client, _updates) = PvpClient::start(transport, StandardChess, config).unwrap();

        client.shutdown().await;

        assert!(close_called.load(Ordering::Acquire));
        assert!(dropped.load(Ordering::Acquire));
        assert!(!client.is_connected());
        assert!(matches!(
            client.signal_ready(),
            Err(PvpClientError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn debug_impl_for_client() {
        let transport = HangingCloseTransport {
            close_called: Arc::new(AtomicBool::new(false)),
            dropped: Arc::new(AtomicBool::new(false)),
        };
        let (client, _updates) =
            PvpClient::start(transport, StandardChess, PvpConfig::new(Color::Black)).unwrap();
        let debug = format!("{client:?}");
        assert!(debug.contains("PvpClient"));
        assert!(debug.contains("connected: true"));
    }
}
