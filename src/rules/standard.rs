//! [`RulesEngine`] implementation for standard chess using the `chess` crate.

use std::collections::BTreeSet;
use std::str::FromStr;

use chess::{Board, ChessMove, MoveGen};

use super::{AppliedMove, RulesEngine, DEFAULT_PROMOTION};
use crate::error::{PvpClientError, Result};
use crate::protocol::{Color, Piece, PieceKind, Square};

/// Standard chess rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardChess;

impl StandardChess {
    /// Legal moves from `from` to `to`; several when the move promotes.
    fn moves_between(board: &Board, from: Square, to: Square) -> impl Iterator<Item = ChessMove> {
        let source = to_chess_square(from);
        let dest = to_chess_square(to);
        MoveGen::new_legal(board).filter(move |m| m.get_source() == source && m.get_dest() == dest)
    }
}

impl RulesEngine for StandardChess {
    type Board = Board;

    fn load(&self, serialized: &str) -> Result<Board> {
        Board::from_str(serialized)
            .map_err(|e| PvpClientError::InvalidPosition(format!("{serialized:?}: {e:?}")))
    }

    fn legal_destinations(&self, board: &Board, from: Square) -> BTreeSet<Square> {
        let source = to_chess_square(from);
        MoveGen::new_legal(board)
            .filter(|m| m.get_source() == source)
            .filter_map(|m| from_chess_square(m.get_dest()))
            .collect()
    }

    fn apply_move(
        &self,
        board: &Board,
        from: Square,
        to: Square,
        promotion_hint: Option<PieceKind>,
    ) -> Result<AppliedMove<Board>> {
        let wanted = to_chess_piece(promotion_hint.unwrap_or(DEFAULT_PROMOTION));
        let chosen = Self::moves_between(board, from, to)
            .find(|m| m.get_promotion().is_none_or(|p| p == wanted))
            .ok_or_else(|| PvpClientError::IllegalMove {
                from: from.to_string(),
                to: to.to_string(),
            })?;
        Ok(AppliedMove {
            board: board.make_move_new(chosen),
            promotion: chosen.get_promotion().map(from_chess_piece),
        })
    }

    fn current_turn(&self, board: &Board) -> Color {
        from_chess_color(board.side_to_move())
    }

    fn piece_at(&self, board: &Board, square: Square) -> Option<Piece> {
        let sq = to_chess_square(square);
        let kind = board.piece_on(sq)?;
        let color = board.color_on(sq)?;
        Some(Piece {
            color: from_chess_color(color),
            kind: from_chess_piece(kind),
        })
    }
}

// ── Conversions ─────────────────────────────────────────────────────

fn to_chess_square(square: Square) -> chess::Square {
    chess::Square::make_square(
        chess::Rank::from_index(usize::from(square.rank())),
        chess::File::from_index(usize::from(square.file())),
    )
}

fn from_chess_square(square: chess::Square) -> Option<Square> {
    let file = u8::try_from(square.get_file().to_index()).ok()?;
    let rank = u8::try_from(square.get_rank().to_index()).ok()?;
    Square::new(file, rank)
}

fn from_chess_color(color: chess::Color) -> Color {
    match color {
        chess::Color::White => Color::White,
        chess::Color::Black => Color::Black,
    }
}

fn from_chess_piece(piece: chess::Piece) -> PieceKind {
    match piece {
        chess::Piece::Pawn => PieceKind::Pawn,
        chess::Piece::Knight => PieceKind::Knight,
        chess::Piece::Bishop => PieceKind::Bishop,
        chess::Piece::Rook => PieceKind::Rook,
        chess::Piece::Queen => PieceKind::Queen,
        chess::Piece::King => PieceKind::King,
    }
}

fn to_chess_piece(kind: PieceKind) -> chess::Piece {
    match kind {
        PieceKind::Pawn => chess::Piece::Pawn,
        PieceKind::Knight => chess::Piece::Knight,
        PieceKind::Bishop => chess::Piece::Bishop,
        PieceKind::Rook => chess::Piece::Rook,
        PieceKind::Queen => chess::Piece::Queen,
        PieceKind::King => chess::Piece::King,
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
    use crate::protocol::STARTING_FEN;

    fn sq(name: &str) -> Square {
        name.parse().unwrap()
    }

    const PROMOTION_FEN: &str = "8/4P3/8/8/8/8/k7/4K3 w - - 0 1";

    #[test]
    fn pawn_has_two_destinations_from_start() {
        let rules = StandardChess;
        let board = rules.load(STARTING_FEN).unwrap();
        let dests = rules.legal_destinations(&board, sq("e2"));
        assert_eq!(dests, BTreeSet::from([sq("e3"), sq("e4")]));
    }

    #[test]
    fn legal_destinations_is_a_pure_query() {
        let rules = StandardChess;
        let board = rules.load(STARTING_FEN).unwrap();
        let first = rules.legal_destinations(&board, sq("g1"));
        let second = rules.legal_destinations(&board, sq("g1"));
        assert_eq!(first, second);
        assert_eq!(first, BTreeSet::from([sq("f3"), sq("h3")]));
    }

    #[test]
    fn opponent_pieces_have_no_destinations() {
        let rules = StandardChess;
        let board = rules.load(STARTING_FEN).unwrap();
        assert!(rules.legal_destinations(&board, sq("e7")).is_empty());
        assert!(rules.legal_destinations(&board, sq("e4")).is_empty());
    }

    #[test]
    fn apply_move_leaves_input_board_untouched() {
        let rules = StandardChess;
        let board = rules.load(STARTING_FEN).unwrap();
        let applied = rules.apply_move(&board, sq("e2"), sq("e4"), None).unwrap();
        assert_eq!(applied.promotion, None);
        assert_eq!(rules.current_turn(&applied.board), Color::Black);
        assert_eq!(rules.current_turn(&board), Color::White);
        assert!(rules.piece_at(&board, sq("e4")).is_none());
        assert_eq!(
            rules.piece_at(&applied.board, sq("e4")),
            Some(Piece {
                color: Color::White,
                kind: PieceKind::Pawn
            })
        );
    }

    #[test]
    fn illegal_move_is_rejected() {
        let rules = StandardChess;
        let board = rules.load(STARTING_FEN).unwrap();
        let err = rules.apply_move(&board, sq("e2"), sq("e5"), None).unwrap_err();
        assert!(matches!(
            err,
            PvpClientError::IllegalMove { ref from, ref to } if from == "e2" && to == "e5"
        ));
    }

    #[test]
    fn promotion_defaults_to_queen() {
        let rules = StandardChess;
        let board = rules.load(PROMOTION_FEN).unwrap();
        let applied = rules.apply_move(&board, sq("e7"), sq("e8"), None).unwrap();
        assert_eq!(applied.promotion, Some(PieceKind::Queen));
        assert_eq!(
            rules.piece_at(&applied.board, sq("e8")).map(|p| p.kind),
            Some(PieceKind::Queen)
        );
    }

    #[test]
    fn promotion_hint_is_respected() {
        let rules = StandardChess;
        let board = rules.load(PROMOTION_FEN).unwrap();
        let applied = rules
            .apply_move(&board, sq("e7"), sq("e8"), Some(PieceKind::Knight))
            .unwrap();
        assert_eq!(applied.promotion, Some(PieceKind::Knight));
    }

    #[test]
    fn load_rejects_garbage() {
        let err = StandardChess.load("not a position").unwrap_err();
        assert!(matches!(err, PvpClientError::InvalidPosition(_)));
    }
}
