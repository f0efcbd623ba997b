//! Wire types for the PvP chess session protocol.
//!
//! Every frame exchanged with the server is a single JSON text message of the
//! form `{"event": "<name>", "data": <payload>}`. Inbound frames decode into
//! the closed [`ServerEvent`] set; names this client does not know become
//! [`ServerEvent::Unknown`] so the session can ignore them explicitly.
//! Outbound frames are [`ClientMessage`]s.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{PvpClientError, Result};

/// Serialized starting position of a standard game.
pub const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

// ── Event names ─────────────────────────────────────────────────────

/// Synthetic event delivered by a transport when a connection is (re)established.
pub const EVENT_CONNECT: &str = "connect";
/// Session status update.
pub const EVENT_PVP_STATUS: &str = "pvp_status";
/// Authoritative position snapshot.
pub const EVENT_GAME_STATE: &str = "game_state";
/// Both players confirmed readiness; the game begins.
pub const EVENT_GAME_START: &str = "game_start";
/// The opponent dropped; carries the forfeit timeout in seconds.
pub const EVENT_OPPONENT_DISCONNECTED: &str = "opponent_disconnected";
/// The opponent came back before the forfeit timeout.
pub const EVENT_OPPONENT_RECONNECTED: &str = "opponent_reconnected";
/// Matchmaking queue position changed.
pub const EVENT_QUEUE_UPDATE: &str = "queue_update";
/// The server refused a session request.
pub const EVENT_PVP_ERROR: &str = "pvp_error";

// ── Board primitives ────────────────────────────────────────────────

/// One of the two sides.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    White,
    Black,
}

impl Color {
    /// The other side.
    #[must_use]
    pub fn opponent(self) -> Self {
        match self {
            Self::White => Self::Black,
            Self::Black => Self::White,
        }
    }

    /// Lowercase wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::White => "white",
            Self::Black => "black",
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Color {
    type Err = PvpClientError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "white" => Ok(Self::White),
            "black" => Ok(Self::Black),
            other => Err(PvpClientError::InvalidColor(other.to_string())),
        }
    }
}

/// Winner as reported by the server: a color, or a draw.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Winner {
    White,
    Black,
    Draw,
}

impl Winner {
    /// The winning color, or `None` for a draw.
    pub fn color(self) -> Option<Color> {
        match self {
            Self::White => Some(Color::White),
            Self::Black => Some(Color::Black),
            Self::Draw => None,
        }
    }
}

/// Kind of a chess piece. On the wire a kind is its piece letter, in
/// either case (`"p"`, `"N"`, ...).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PieceKind {
    #[serde(rename = "p", alias = "P")]
    Pawn,
    #[serde(rename = "n", alias = "N")]
    Knight,
    #[serde(rename = "b", alias = "B")]
    Bishop,
    #[serde(rename = "r", alias = "R")]
    Rook,
    #[serde(rename = "q", alias = "Q")]
    Queen,
    #[serde(rename = "k", alias = "K")]
    King,
}

impl PieceKind {
    /// Lowercase piece letter, as used in UCI promotion suffixes.
    pub fn letter(self) -> char {
        match self {
            Self::Pawn => 'p',
            Self::Knight => 'n',
            Self::Bishop => 'b',
            Self::Rook => 'r',
            Self::Queen => 'q',
            Self::King => 'k',
        }
    }

    /// Parse a piece letter in either case.
    pub fn from_letter(letter: char) -> Option<Self> {
        match letter.to_ascii_lowercase() {
            'p' => Some(Self::Pawn),
            'n' => Some(Self::Knight),
            'b' => Some(Self::Bishop),
            'r' => Some(Self::Rook),
            'q' => Some(Self::Queen),
            'k' => Some(Self::King),
            _ => None,
        }
    }
}

/// A colored piece standing on a square.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Piece {
    pub color: Color,
    pub kind: PieceKind,
}

/// A board square, `a1` through `h8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Square {
    file: u8,
    rank: u8,
}

impl Square {
    /// Build a square from zero-based file (`a` = 0) and rank (`1` = 0).
    pub fn new(file: u8, rank: u8) -> Option<Self> {
        (file < 8 && rank < 8).then_some(Self { file, rank })
    }

    /// Zero-based file index.
    pub fn file(self) -> u8 {
        self.file
    }

    /// Zero-based rank index.
    pub fn rank(self) -> u8 {
        self.rank
    }

    /// All 64 squares, file-major.
    pub fn all() -> impl Iterator<Item = Square> {
        (0..8u8).flat_map(|file| (0..8u8).map(move |rank| Square { file, rank }))
    }
}

impl fmt::Display for Square {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", char::from(b'a' + self.file), self.rank + 1)
    }
}

impl FromStr for Square {
    type Err = PvpClientError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || PvpClientError::InvalidSquare(s.to_string());
        match s.as_bytes() {
            [file @ b'a'..=b'h', rank @ b'1'..=b'8'] => {
                Square::new(file - b'a', rank - b'1').ok_or_else(invalid)
            }
            _ => Err(invalid()),
        }
    }
}

// ── Moves ───────────────────────────────────────────────────────────

/// A move the local player wants to make, ready to be sent as UCI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveIntent {
    pub from: Square,
    pub to: Square,
    /// Promotion piece, present only when the move promotes.
    pub promotion: Option<PieceKind>,
}

impl MoveIntent {
    /// UCI token: source, destination, optional lowercase promotion letter.
    pub fn uci(&self) -> String {
        match self.promotion {
            Some(kind) => format!("{}{}{}", self.from, self.to, kind.letter()),
            None => format!("{}{}", self.from, self.to),
        }
    }

    /// Parse a UCI token such as `"e2e4"` or `"e7e8q"`.
    pub fn parse_uci(uci: &str) -> Result<Self> {
        let invalid = || PvpClientError::InvalidSquare(uci.to_string());
        let from = uci.get(0..2).ok_or_else(invalid)?.parse()?;
        let to = uci.get(2..4).ok_or_else(invalid)?.parse()?;
        let promotion = match uci.get(4..) {
            None | Some("") => None,
            Some(rest) => {
                let mut chars = rest.chars();
                match (chars.next().and_then(PieceKind::from_letter), chars.next()) {
                    (Some(kind), None) => Some(kind),
                    _ => return Err(invalid()),
                }
            }
        };
        Ok(Self {
            from,
            to,
            promotion,
        })
    }
}

impl From<MoveIntent> for ClientMessage {
    fn from(intent: MoveIntent) -> Self {
        ClientMessage::MakeMove { uci: intent.uci() }
    }
}

// ── Inbound payloads ────────────────────────────────────────────────

/// Server-side session status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Waiting,
    Queued,
    Ready,
    Playing,
    /// Any status string this client does not recognize.
    #[serde(other)]
    Unknown,
}

/// Payload of `pvp_status`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusPayload {
    pub status: SessionStatus,
    /// Queue position, sent along with `queued`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
}

/// Payload of `game_state`: the authoritative position and its derived facts.
///
/// The derived fields are produced by the server from the same position as
/// `fen`, so the client always replaces a snapshot as a whole.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PositionSnapshot {
    pub fen: String,
    /// Side to move.
    pub turn: Color,
    pub is_check: bool,
    pub is_checkmate: bool,
    pub is_game_over: bool,
    pub winner: Option<Winner>,
    /// White pieces captured so far, in capture order.
    #[serde(default)]
    pub white_captured: Vec<PieceKind>,
    /// Black pieces captured so far, in capture order.
    #[serde(default)]
    pub black_captured: Vec<PieceKind>,
    /// Set when the game ended by resignation or disconnect timeout.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub forfeit: bool,
}

impl PositionSnapshot {
    /// Snapshot of the standard starting position.
    pub fn starting() -> Self {
        Self {
            fen: STARTING_FEN.to_string(),
            turn: Color::White,
            is_check: false,
            is_checkmate: false,
            is_game_over: false,
            winner: None,
            white_captured: Vec::new(),
            black_captured: Vec::new(),
            forfeit: false,
        }
    }

    /// `true` when this snapshot ends the game.
    pub fn is_terminal(&self) -> bool {
        self.is_checkmate || self.forfeit || self.is_game_over
    }
}

/// Payload of `game_start`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameStartPayload {
    /// Color the server assigned to the receiving player.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,
}

/// Payload of `opponent_disconnected`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OpponentDisconnectedPayload {
    /// Seconds before the server declares a forfeit.
    #[serde(alias = "timeout_seconds")]
    pub timeout: u32,
}

/// Payload of `queue_update`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueUpdatePayload {
    pub position: u32,
}

/// Payload of `pvp_error`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PvpErrorPayload {
    pub message: String,
}

// ── Messages ────────────────────────────────────────────────────────

/// Events pushed by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// The transport (re)established its connection.
    Connected,
    /// Session status changed.
    Status(StatusPayload),
    /// Authoritative position snapshot (boxed to reduce enum size).
    GameState(Box<PositionSnapshot>),
    /// The game begins.
    GameStart(GameStartPayload),
    /// The opponent dropped.
    OpponentDisconnected(OpponentDisconnectedPayload),
    /// The opponent is back.
    OpponentReconnected,
    /// Queue position changed.
    QueueUpdate(QueueUpdatePayload),
    /// The server refused a request.
    PvpError(PvpErrorPayload),
    /// An event name this client does not handle.
    Unknown {
        /// The unrecognized event name.
        event: String,
    },
}

#[derive(Deserialize)]
struct RawEnvelope {
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

impl ServerEvent {
    /// Decode one inbound frame.
    ///
    /// # Errors
    ///
    /// Returns [`PvpClientError::Serialization`] if the frame is not an
    /// envelope, or if a known event carries a payload of the wrong shape.
    /// Unknown event names are not an error.
    pub fn decode(text: &str) -> Result<Self> {
        let RawEnvelope { event, data } = serde_json::from_str(text)?;
        let decoded = match event.as_str() {
            EVENT_CONNECT => Self::Connected,
            EVENT_PVP_STATUS => Self::Status(serde_json::from_value(data)?),
            EVENT_GAME_STATE => Self::GameState(Box::new(serde_json::from_value(data)?)),
            EVENT_GAME_START if data.is_null() => Self::GameStart(GameStartPayload::default()),
            EVENT_GAME_START => Self::GameStart(serde_json::from_value(data)?),
            EVENT_OPPONENT_DISCONNECTED => {
                Self::OpponentDisconnected(serde_json::from_value(data)?)
            }
            EVENT_OPPONENT_RECONNECTED => Self::OpponentReconnected,
            EVENT_QUEUE_UPDATE => Self::QueueUpdate(serde_json::from_value(data)?),
            EVENT_PVP_ERROR => Self::PvpError(serde_json::from_value(data)?),
            _ => Self::Unknown { event },
        };
        Ok(decoded)
    }

    /// Encode this event as a wire frame. Used by in-process servers and tests.
    ///
    /// # Errors
    ///
    /// Returns [`PvpClientError::Serialization`] if a payload fails to serialize.
    pub fn encode(&self) -> Result<String> {
        let (event, data) = match self {
            Self::Connected => (EVENT_CONNECT, serde_json::Value::Null),
            Self::Status(p) => (EVENT_PVP_STATUS, serde_json::to_value(p)?),
            Self::GameState(p) => (EVENT_GAME_STATE, serde_json::to_value(p)?),
            Self::GameStart(p) => (EVENT_GAME_START, serde_json::to_value(p)?),
            Self::OpponentDisconnected(p) => {
                (EVENT_OPPONENT_DISCONNECTED, serde_json::to_value(p)?)
            }
            Self::OpponentReconnected => (EVENT_OPPONENT_RECONNECTED, serde_json::json!({})),
            Self::QueueUpdate(p) => (EVENT_QUEUE_UPDATE, serde_json::to_value(p)?),
            Self::PvpError(p) => (EVENT_PVP_ERROR, serde_json::to_value(p)?),
            Self::Unknown { event } => (event.as_str(), serde_json::Value::Null),
        };
        Ok(serde_json::json!({ "event": event, "data": data }).to_string())
    }

    /// Wire name of this event.
    pub fn name(&self) -> &str {
        match self {
            Self::Connected => EVENT_CONNECT,
            Self::Status(_) => EVENT_PVP_STATUS,
            Self::GameState(_) => EVENT_GAME_STATE,
            Self::GameStart(_) => EVENT_GAME_START,
            Self::OpponentDisconnected(_) => EVENT_OPPONENT_DISCONNECTED,
            Self::OpponentReconnected => EVENT_OPPONENT_RECONNECTED,
            Self::QueueUpdate(_) => EVENT_QUEUE_UPDATE,
            Self::PvpError(_) => EVENT_PVP_ERROR,
            Self::Unknown { event } => event.as_str(),
        }
    }
}

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Ask to join (or rejoin) a PvP session as the given color.
    JoinPvp { color: Color },
    /// Confirm readiness once both players are present.
    PlayerReady {},
    /// Submit a move in UCI notation.
    MakeMove { uci: String },
    /// Give up the current game.
    Resign {},
}

impl ClientMessage {
    /// Wire name of this message.
    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinPvp { .. } => "join_pvp",
            Self::PlayerReady {} => "player_ready",
            Self::MakeMove { .. } => "make_move",
            Self::Resign {} => "resign",
        }
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

    #[test]
    fn square_parses_and_displays() {
        let sq: Square = "e4".parse().unwrap();
        assert_eq!(sq.file(), 4);
        assert_eq!(sq.rank(), 3);
        assert_eq!(sq.to_string(), "e4");
        assert_eq!(Square::all().count(), 64);
    }

    #[test]
    fn square_rejects_garbage() {
        for bad in ["", "e", "e9", "i1", "e44", "E4"] {
            assert!(
                matches!(bad.parse::<Square>(), Err(PvpClientError::InvalidSquare(_))),
                "{bad:?} should not parse"
            );
        }
    }

    #[test]
    fn color_param_validation() {
        assert_eq!("white".parse::<Color>().unwrap(), Color::White);
        assert_eq!("black".parse::<Color>().unwrap(), Color::Black);
        assert!(matches!(
            "purple".parse::<Color>(),
            Err(PvpClientError::InvalidColor(c)) if c == "purple"
        ));
    }

    #[test]
    fn uci_includes_promotion_only_when_present() {
        let quiet = MoveIntent::parse_uci("e2e4").unwrap();
        assert_eq!(quiet.promotion, None);
        assert_eq!(quiet.uci(), "e2e4");

        let promo = MoveIntent::parse_uci("e7e8q").unwrap();
        assert_eq!(promo.promotion, Some(PieceKind::Queen));
        assert_eq!(promo.uci(), "e7e8q");

        assert!(MoveIntent::parse_uci("e7e8qq").is_err());
        assert!(MoveIntent::parse_uci("e7").is_err());
    }

    #[test]
    fn decode_unknown_event_is_not_an_error() {
        let ev = ServerEvent::decode(r#"{"event":"robot_debug","data":{"move":"e2e4"}}"#).unwrap();
        assert_eq!(
            ev,
            ServerEvent::Unknown {
                event: "robot_debug".into()
            }
        );
    }

    #[test]
    fn decode_rejects_malformed_payload() {
        let err = ServerEvent::decode(r#"{"event":"queue_update","data":{"position":"x"}}"#);
        assert!(matches!(err, Err(PvpClientError::Serialization(_))));
    }

    #[test]
    fn unknown_status_decodes_to_unknown() {
        let ev = ServerEvent::decode(r#"{"event":"pvp_status","data":{"status":"paused"}}"#)
            .unwrap();
        assert_eq!(
            ev,
            ServerEvent::Status(StatusPayload {
                status: SessionStatus::Unknown,
                position: None
            })
        );
    }

    #[test]
    fn game_start_accepts_missing_payload() {
        let ev = ServerEvent::decode(r#"{"event":"game_start"}"#).unwrap();
        assert_eq!(ev, ServerEvent::GameStart(GameStartPayload::default()));
    }

    #[test]
    fn captured_pieces_accept_either_case() {
        let json = serde_json::json!({
            "event": "game_state",
            "data": {
                "fen": STARTING_FEN,
                "turn": "black",
                "is_check": false,
                "is_checkmate": false,
                "is_game_over": false,
                "winner": null,
                "white_captured": ["P", "n"],
                "black_captured": ["q"]
            }
        });
        let ServerEvent::GameState(snapshot) = ServerEvent::decode(&json.to_string()).unwrap()
        else {
            panic!("expected game_state");
        };
        assert_eq!(
            snapshot.white_captured,
            vec![PieceKind::Pawn, PieceKind::Knight]
        );
        assert_eq!(snapshot.black_captured, vec![PieceKind::Queen]);
        assert!(!snapshot.forfeit);
    }

    #[test]
    fn client_messages_use_event_envelope() {
        let json = serde_json::to_value(ClientMessage::MakeMove { uci: "e2e4".into() }).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"event": "make_move", "data": {"uci": "e2e4"}})
        );
        let ready = serde_json::to_value(ClientMessage::PlayerReady {}).unwrap();
        assert_eq!(
            ready,
            serde_json::json!({"event": "player_ready", "data": {}})
        );
    }
}
