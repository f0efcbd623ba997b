//! Rules-engine capability.
//!
//! The session never decides legality itself. It asks a [`RulesEngine`] for
//! legal destinations and for the result of applying a move to a throwaway
//! board. Every operation is a pure function of its inputs: `apply_move`
//! returns a new board and leaves the one it was given untouched.
//!
//! [`StandardChess`] is the built-in implementation, backed by the `chess`
//! crate.

use std::collections::BTreeSet;
use std::fmt;

use crate::error::Result;
use crate::protocol::{Color, Piece, PieceKind, Square};

mod standard;

pub use standard::StandardChess;

/// Promotion piece used when a gesture does not say which piece to promote to.
pub const DEFAULT_PROMOTION: PieceKind = PieceKind::Queen;

/// Result of applying a legal move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMove<B> {
    /// The position after the move.
    pub board: B,
    /// Promotion piece actually used, `None` for non-promoting moves.
    pub promotion: Option<PieceKind>,
}

/// Move legality and board queries for one game variant.
pub trait RulesEngine: Send + 'static {
    /// Parsed position. Cloning it yields an independent copy.
    type Board: Clone + Send + fmt::Debug;

    /// Parse a serialized position.
    ///
    /// # Errors
    ///
    /// Returns [`PvpClientError::InvalidPosition`](crate::PvpClientError::InvalidPosition)
    /// if the text is not a valid position.
    fn load(&self, serialized: &str) -> Result<Self::Board>;

    /// Squares the piece on `from` may legally move to. Empty if `from` holds
    /// no piece of the side to move.
    fn legal_destinations(&self, board: &Self::Board, from: Square) -> BTreeSet<Square>;

    /// Apply `from → to` to a copy of `board`.
    ///
    /// For promoting moves `promotion_hint` selects the piece; `None` means
    /// [`DEFAULT_PROMOTION`].
    ///
    /// # Errors
    ///
    /// Returns [`PvpClientError::IllegalMove`](crate::PvpClientError::IllegalMove)
    /// if the move is not legal in `board`.
    fn apply_move(
        &self,
        board: &Self::Board,
        from: Square,
        to: Square,
        promotion_hint: Option<PieceKind>,
    ) -> Result<AppliedMove<Self::Board>>;

    /// Side to move in `board`.
    fn current_turn(&self, board: &Self::Board) -> Color;

    /// Piece standing on `square`, if any.
    fn piece_at(&self, board: &Self::Board, square: Square) -> Option<Piece>;
}
