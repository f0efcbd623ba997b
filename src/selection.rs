//! Move selection: turning clicks and drags into move intents.
//!
//! The selector owns the [`Selection`] and nothing else. Boards are borrowed
//! from the position cache and only ever handed to the rules engine's pure
//! queries, so a legality check can never leak into the displayed position.

use std::collections::BTreeSet;

use tracing::debug;

use crate::protocol::{Color, MoveIntent, Square};
use crate::rules::{RulesEngine, DEFAULT_PROMOTION};

/// Conditions under which local input is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputGate {
    /// The local player's color.
    pub local: Color,
    /// Side to move according to the last authoritative snapshot.
    pub active: Color,
    /// `true` while the session phase is `Playing`.
    pub playing: bool,
    /// `true` while a sent move awaits its snapshot.
    pub busy: bool,
}

impl InputGate {
    /// `true` if a gesture may start or complete right now.
    pub fn is_open(&self) -> bool {
        self.playing && !self.busy && self.local == self.active
    }
}

/// Current origin square and its legal destinations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    origin: Option<Square>,
    candidates: BTreeSet<Square>,
}

impl Selection {
    /// Selected origin square.
    pub fn origin(&self) -> Option<Square> {
        self.origin
    }

    /// Legal destinations from the origin. Empty without an origin.
    pub fn candidates(&self) -> &BTreeSet<Square> {
        &self.candidates
    }

    /// `true` if nothing is selected.
    pub fn is_empty(&self) -> bool {
        self.origin.is_none() && self.candidates.is_empty()
    }
}

/// How a candidate destination should be highlighted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    /// Occupied by an opposing piece.
    Capture,
    /// Empty square.
    Quiet,
}

/// A candidate destination and its highlight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateMark {
    pub square: Square,
    pub kind: TargetKind,
}

/// What a click did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOutcome {
    /// Input was refused or changed nothing.
    Ignored,
    /// A piece was (re)selected.
    Selected(Square),
    /// The selection was cleared.
    Cleared,
    /// A move was completed and should be sent.
    Move(MoveIntent),
}

/// Click-sequence and drag-and-drop state machine.
#[derive(Debug, Clone, Default)]
pub struct MoveSelector {
    selection: Selection,
}

impl MoveSelector {
    /// Create an empty selector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current selection.
    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Drop any selection. Returns `true` if something was selected.
    pub fn clear(&mut self) -> bool {
        let had_selection = !self.selection.is_empty();
        self.selection = Selection::default();
        had_selection
    }

    /// Handle a click on `square`.
    pub fn click<R: RulesEngine>(
        &mut self,
        rules: &R,
        board: &R::Board,
        gate: InputGate,
        square: Square,
    ) -> ClickOutcome {
        if !gate.is_open() {
            return if self.clear() {
                ClickOutcome::Cleared
            } else {
                ClickOutcome::Ignored
            };
        }

        let Some(origin) = self.selection.origin else {
            return if self.select_own_piece(rules, board, gate.local, square) {
                ClickOutcome::Selected(square)
            } else {
                ClickOutcome::Ignored
            };
        };

        if square == origin {
            self.clear();
            return ClickOutcome::Cleared;
        }

        if self.selection.candidates.contains(&square) {
            return match resolve(rules, board, gate, origin, square) {
                Some(intent) => {
                    self.clear();
                    ClickOutcome::Move(intent)
                }
                None => {
                    self.clear();
                    ClickOutcome::Cleared
                }
            };
        }

        if self.select_own_piece(rules, board, gate.local, square) {
            ClickOutcome::Selected(square)
        } else {
            self.clear();
            ClickOutcome::Cleared
        }
    }

    /// Handle a drag from `from` released on `to`.
    ///
    /// Returns the move to send, or `None` if the drop is refused. A refused
    /// drop leaves the selection as it was.
    pub fn drop_piece<R: RulesEngine>(
        &mut self,
        rules: &R,
        board: &R::Board,
        gate: InputGate,
        from: Square,
        to: Square,
    ) -> Option<MoveIntent> {
        let intent = resolve(rules, board, gate, from, to)?;
        self.clear();
        Some(intent)
    }

    /// Candidate destinations with their capture/quiet classification.
    pub fn candidate_marks<R: RulesEngine>(
        &self,
        rules: &R,
        board: &R::Board,
        local: Color,
    ) -> Vec<CandidateMark> {
        self.selection
            .candidates
            .iter()
            .map(|&square| {
                let kind = match rules.piece_at(board, square) {
                    Some(piece) if piece.color != local => TargetKind::Capture,
                    _ => TargetKind::Quiet,
                };
                CandidateMark { square, kind }
            })
            .collect()
    }

    fn select_own_piece<R: RulesEngine>(
        &mut self,
        rules: &R,
        board: &R::Board,
        local: Color,
        square: Square,
    ) -> bool {
        match rules.piece_at(board, square) {
            Some(piece) if piece.color == local => {
                let candidates = rules.legal_destinations(board, square);
                debug!(%square, candidates = candidates.len(), "selected piece");
                self.selection = Selection {
                    origin: Some(square),
                    candidates,
                };
                true
            }
            _ => false,
        }
    }
}

/// Check `from → to` against the gate, piece ownership and legality.
///
/// Legality is tested on a private clone of `board`.
fn resolve<R: RulesEngine>(
    rules: &R,
    board: &R::Board,
    gate: InputGate,
    from: Square,
    to: Square,
) -> Option<MoveIntent> {
    if !gate.is_open() {
        debug!(%from, %to, "move refused: input gate closed");
        return None;
    }
    if rules.piece_at(board, from).map(|p| p.color) != Some(gate.local) {
        debug!(%from, %to, "move refused: not our piece");
        return None;
    }
    let scratch = board.clone();
    match rules.apply_move(&scratch, from, to, Some(DEFAULT_PROMOTION)) {
        Ok(applied) => Some(MoveIntent {
            from,
            to,
            promotion: applied.promotion,
        }),
        Err(e) => {
            debug!(%from, %to, "move refused: {e}");
            None
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
    use crate::protocol::{PieceKind, STARTING_FEN};
    use crate::rules::StandardChess;

    fn sq(name: &str) -> Square {
        name.parse().unwrap()
    }

    fn white_to_move() -> InputGate {
        InputGate {
            local: Color::White,
            active: Color::White,
            playing: true,
            busy: false,
        }
    }

    fn start_board() -> chess::Board {
        StandardChess.load(STARTING_FEN).unwrap()
    }

    #[test]
    fn first_click_selects_own_piece() {
        let rules = StandardChess;
        let board = start_board();
        let mut selector = MoveSelector::new();

        let outcome = selector.click(&rules, &board, white_to_move(), sq("e2"));
        assert_eq!(outcome, ClickOutcome::Selected(sq("e2")));
        assert_eq!(selector.selection().origin(), Some(sq("e2")));
        assert_eq!(
            selector.selection().candidates(),
            &BTreeSet::from([sq("e3"), sq("e4")])
        );
    }

    #[test]
    fn first_click_on_opponent_piece_is_ignored() {
        let rules = StandardChess;
        let board = start_board();
        let mut selector = MoveSelector::new();
        assert_eq!(
            selector.click(&rules, &board, white_to_move(), sq("e7")),
            ClickOutcome::Ignored
        );
        assert!(selector.selection().is_empty());
    }

    #[test]
    fn second_click_on_same_square_clears() {
        let rules = StandardChess;
        let board = start_board();
        let mut selector = MoveSelector::new();
        selector.click(&rules, &board, white_to_move(), sq("e2"));
        assert_eq!(
            selector.click(&rules, &board, white_to_move(), sq("e2")),
            ClickOutcome::Cleared
        );
        assert!(selector.selection().is_empty());
    }

    #[test]
    fn second_click_on_candidate_resolves_move() {
        let rules = StandardChess;
        let board = start_board();
        let mut selector = MoveSelector::new();
        selector.click(&rules, &board, white_to_move(), sq("e2"));
        let outcome = selector.click(&rules, &board, white_to_move(), sq("e4"));
        let ClickOutcome::Move(intent) = outcome else {
            panic!("expected a move, got {outcome:?}");
        };
        assert_eq!(intent.uci(), "e2e4");
        assert!(selector.selection().is_empty());
    }

    #[test]
    fn second_click_on_other_own_piece_reselects() {
        let rules = StandardChess;
        let board = start_board();
        let mut selector = MoveSelector::new();
        selector.click(&rules, &board, white_to_move(), sq("e2"));
        let outcome = selector.click(&rules, &board, white_to_move(), sq("g1"));
        assert_eq!(outcome, ClickOutcome::Selected(sq("g1")));
        assert_eq!(
            selector.selection().candidates(),
            &BTreeSet::from([sq("f3"), sq("h3")])
        );
    }

    #[test]
    fn second_click_elsewhere_clears() {
        let rules = StandardChess;
        let board = start_board();
        let mut selector = MoveSelector::new();
        selector.click(&rules, &board, white_to_move(), sq("e2"));
        assert_eq!(
            selector.click(&rules, &board, white_to_move(), sq("a6")),
            ClickOutcome::Cleared
        );
        assert!(selector.selection().is_empty());
    }

    #[test]
    fn closed_gate_blocks_selection() {
        let rules = StandardChess;
        let board = start_board();
        let mut selector = MoveSelector::new();
        let not_my_turn = InputGate {
            active: Color::Black,
            ..white_to_move()
        };
        assert_eq!(
            selector.click(&rules, &board, not_my_turn, sq("e2")),
            ClickOutcome::Ignored
        );
        let busy = InputGate {
            busy: true,
            ..white_to_move()
        };
        assert_eq!(
            selector.click(&rules, &board, busy, sq("e2")),
            ClickOutcome::Ignored
        );
        assert!(selector.selection().is_empty());
    }

    #[test]
    fn drop_converges_with_click_sequence() {
        let rules = StandardChess;
        let board = start_board();

        let mut clicker = MoveSelector::new();
        clicker.click(&rules, &board, white_to_move(), sq("g1"));
        let ClickOutcome::Move(clicked) = clicker.click(&rules, &board, white_to_move(), sq("f3"))
        else {
            panic!("expected a move");
        };

        let mut dragger = MoveSelector::new();
        let dropped = dragger
            .drop_piece(&rules, &board, white_to_move(), sq("g1"), sq("f3"))
            .unwrap();
        assert_eq!(clicked, dropped);
    }

    #[test]
    fn illegal_drop_is_refused_silently() {
        let rules = StandardChess;
        let board = start_board();
        let mut selector = MoveSelector::new();
        selector.click(&rules, &board, white_to_move(), sq("e2"));
        assert!(selector
            .drop_piece(&rules, &board, white_to_move(), sq("e2"), sq("e5"))
            .is_none());
        // A refused drop leaves the selection alone.
        assert_eq!(selector.selection().origin(), Some(sq("e2")));
    }

    #[test]
    fn drop_applies_ownership_gate() {
        let rules = StandardChess;
        let board = start_board();
        let mut selector = MoveSelector::new();
        assert!(selector
            .drop_piece(&rules, &board, white_to_move(), sq("e7"), sq("e5"))
            .is_none());
    }

    #[test]
    fn promotion_resolves_to_queen() {
        let rules = StandardChess;
        let board = rules.load("8/4P3/8/8/8/8/k7/4K3 w - - 0 1").unwrap();
        let mut selector = MoveSelector::new();
        let intent = selector
            .drop_piece(&rules, &board, white_to_move(), sq("e7"), sq("e8"))
            .unwrap();
        assert_eq!(intent.promotion, Some(PieceKind::Queen));
        assert_eq!(intent.uci(), "e7e8q");
    }

    #[test]
    fn candidates_are_classified() {
        let rules = StandardChess;
        // White knight on e4 can take the pawn on d6 or go to quiet squares.
        let board = rules
            .load("rnbqkbnr/ppp1pppp/3p4/8/4N3/8/PPPPPPPP/R1BQKBNR w KQkq - 0 1")
            .unwrap();
        let mut selector = MoveSelector::new();
        selector.click(&rules, &board, white_to_move(), sq("e4"));
        let marks = selector.candidate_marks(&rules, &board, Color::White);
        let capture: Vec<_> = marks
            .iter()
            .filter(|m| m.kind == TargetKind::Capture)
            .map(|m| m.square)
            .collect();
        assert_eq!(capture, vec![sq("d6")]);
        assert!(marks
            .iter()
            .any(|m| m.square == sq("f6") && m.kind == TargetKind::Quiet));
    }
}
