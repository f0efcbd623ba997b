//! Position cache and the status projections derived from it.
//!
//! The cache holds the last authoritative [`PositionSnapshot`] together with
//! the board the rules engine parsed from it. Both are replaced in one step,
//! and only when the new snapshot parses, so the cached facts always describe
//! the same position.

use crate::error::Result;
use crate::protocol::{Color, PieceKind, PositionSnapshot, Winner};
use crate::rules::RulesEngine;

/// Why a game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    Checkmate,
    /// Resignation or disconnect timeout.
    Forfeit,
    /// Stalemate, insufficient material and other server-declared endings.
    Finished,
}

/// How a finished game turned out for one player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Victory,
    Defeat,
    Draw,
    /// The server ended the game without naming a winner.
    Undecided,
}

/// Result captured when the session enters `GameOver`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameResult {
    pub winner: Option<Winner>,
    pub reason: EndReason,
}

impl GameResult {
    /// Extract the result from a terminal snapshot.
    ///
    /// Checkmate wins over forfeit, which wins over a bare game-over flag.
    pub fn from_snapshot(snapshot: &PositionSnapshot) -> Option<Self> {
        let reason = if snapshot.is_checkmate {
            EndReason::Checkmate
        } else if snapshot.forfeit {
            EndReason::Forfeit
        } else if snapshot.is_game_over {
            EndReason::Finished
        } else {
            return None;
        };
        Some(Self {
            winner: snapshot.winner,
            reason,
        })
    }

    /// The result as seen by `color`.
    pub fn outcome_for(&self, color: Color) -> Outcome {
        match self.winner {
            Some(Winner::Draw) => Outcome::Draw,
            Some(winner) if winner.color() == Some(color) => Outcome::Victory,
            Some(_) => Outcome::Defeat,
            None => Outcome::Undecided,
        }
    }
}

/// One-line game status for the local player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLine {
    /// No authoritative snapshot yet.
    Waiting,
    YourTurn,
    OpponentTurn,
    Check,
    Checkmate { winner: Option<Winner> },
    ForfeitWin,
    ForfeitLoss,
    Finished,
}

impl StatusLine {
    /// Project a snapshot onto the status line seen by `local`.
    pub fn project(snapshot: &PositionSnapshot, local: Color) -> Self {
        if snapshot.is_checkmate {
            Self::Checkmate {
                winner: snapshot.winner,
            }
        } else if snapshot.forfeit {
            if snapshot.winner.and_then(Winner::color) == Some(local) {
                Self::ForfeitWin
            } else {
                Self::ForfeitLoss
            }
        } else if snapshot.is_game_over {
            Self::Finished
        } else if snapshot.is_check {
            Self::Check
        } else if snapshot.turn == local {
            Self::YourTurn
        } else {
            Self::OpponentTurn
        }
    }
}

/// Captured pieces arranged for a board oriented to the local player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapturedView<'a> {
    /// Row shown next to the opponent, at the top of the board.
    pub top: &'a [PieceKind],
    /// Row shown next to the local player, at the bottom.
    pub bottom: &'a [PieceKind],
}

impl<'a> CapturedView<'a> {
    /// Arrange the captured rows of `snapshot` for a board oriented to `local`.
    pub fn of(snapshot: &'a PositionSnapshot, local: Color) -> Self {
        let white = snapshot.white_captured.as_slice();
        let black = snapshot.black_captured.as_slice();
        match local {
            Color::White => Self {
                top: black,
                bottom: white,
            },
            Color::Black => Self {
                top: white,
                bottom: black,
            },
        }
    }
}

/// Last authoritative position and its parsed board.
#[derive(Debug, Clone)]
pub struct PositionCache<B> {
    snapshot: PositionSnapshot,
    board: B,
    authoritative: bool,
}

impl<B: Clone> PositionCache<B> {
    /// Cache holding the starting position, not yet confirmed by the server.
    ///
    /// # Errors
    ///
    /// Fails only if the rules engine cannot parse the starting position.
    pub fn starting<R>(rules: &R) -> Result<Self>
    where
        R: RulesEngine<Board = B>,
    {
        let snapshot = PositionSnapshot::starting();
        let board = rules.load(&snapshot.fen)?;
        Ok(Self {
            snapshot,
            board,
            authoritative: false,
        })
    }

    /// Replace the cached position with `snapshot`.
    ///
    /// # Errors
    ///
    /// Returns [`PvpClientError::InvalidPosition`](crate::PvpClientError::InvalidPosition)
    /// and leaves the cache untouched if the snapshot does not parse.
    pub fn replace<R>(&mut self, rules: &R, snapshot: PositionSnapshot) -> Result<()>
    where
        R: RulesEngine<Board = B>,
    {
        let board = rules.load(&snapshot.fen)?;
        self.snapshot = snapshot;
        self.board = board;
        self.authoritative = true;
        Ok(())
    }

    /// Go back to the starting position.
    ///
    /// # Errors
    ///
    /// Fails only if the rules engine cannot parse the starting position.
    pub fn reset<R>(&mut self, rules: &R) -> Result<()>
    where
        R: RulesEngine<Board = B>,
    {
        *self = Self::starting(rules)?;
        Ok(())
    }

    /// The cached snapshot.
    pub fn snapshot(&self) -> &PositionSnapshot {
        &self.snapshot
    }

    /// The parsed board. Clone it before asking the rules engine anything
    /// that could be mistaken for a write.
    pub fn board(&self) -> &B {
        &self.board
    }

    /// `true` once a server snapshot has been applied since the last reset.
    pub fn is_authoritative(&self) -> bool {
        self.authoritative
    }

    /// Side to move according to the server.
    pub fn active_color(&self) -> Color {
        self.snapshot.turn
    }

    /// Status line for `local`.
    pub fn status_line(&self, local: Color) -> StatusLine {
        if self.authoritative {
            StatusLine::project(&self.snapshot, local)
        } else {
            StatusLine::Waiting
        }
    }

    /// Captured pieces for a board oriented to `local`.
    pub fn captured_view(&self, local: Color) -> CapturedView<'_> {
        CapturedView::of(&self.snapshot, local)
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

    const AFTER_E4: &str = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1";

    fn snapshot_after_e4() -> PositionSnapshot {
        PositionSnapshot {
            fen: AFTER_E4.into(),
            turn: Color::Black,
            ..PositionSnapshot::starting()
        }
    }

    #[test]
    fn starts_unconfirmed() {
        let cache = PositionCache::starting(&StandardChess).unwrap();
        assert!(!cache.is_authoritative());
        assert_eq!(cache.status_line(Color::White), StatusLine::Waiting);
        assert_eq!(cache.active_color(), Color::White);
    }

    #[test]
    fn replace_swaps_snapshot_and_board_together() {
        let rules = StandardChess;
        let mut cache = PositionCache::starting(&rules).unwrap();
        cache.replace(&rules, snapshot_after_e4()).unwrap();
        assert!(cache.is_authoritative());
        assert_eq!(cache.snapshot().fen, AFTER_E4);
        assert_eq!(rules.current_turn(cache.board()), Color::Black);
        assert_eq!(cache.status_line(Color::White), StatusLine::OpponentTurn);
        assert_eq!(cache.status_line(Color::Black), StatusLine::YourTurn);
    }

    #[test]
    fn unparsable_snapshot_leaves_cache_untouched() {
        let rules = StandardChess;
        let mut cache = PositionCache::starting(&rules).unwrap();
        cache.replace(&rules, snapshot_after_e4()).unwrap();

        let broken = PositionSnapshot {
            fen: "garbage".into(),
            turn: Color::White,
            ..PositionSnapshot::starting()
        };
        assert!(cache.replace(&rules, broken).is_err());
        assert_eq!(cache.snapshot().fen, AFTER_E4);
        assert_eq!(cache.active_color(), Color::Black);
    }

    #[test]
    fn reset_returns_to_start() {
        let rules = StandardChess;
        let mut cache = PositionCache::starting(&rules).unwrap();
        cache.replace(&rules, snapshot_after_e4()).unwrap();
        cache.reset(&rules).unwrap();
        assert_eq!(cache.snapshot(), &PositionSnapshot::starting());
        assert!(!cache.is_authoritative());
    }

    #[test]
    fn status_priority_checkmate_over_forfeit() {
        let snapshot = PositionSnapshot {
            is_checkmate: true,
            is_game_over: true,
            forfeit: true,
            winner: Some(Winner::White),
            ..PositionSnapshot::starting()
        };
        assert_eq!(
            StatusLine::project(&snapshot, Color::Black),
            StatusLine::Checkmate {
                winner: Some(Winner::White)
            }
        );
        let result = GameResult::from_snapshot(&snapshot).unwrap();
        assert_eq!(result.reason, EndReason::Checkmate);
        assert_eq!(result.outcome_for(Color::Black), Outcome::Defeat);
        assert_eq!(result.outcome_for(Color::White), Outcome::Victory);
    }

    #[test]
    fn forfeit_status_is_relative_to_local_color() {
        let snapshot = PositionSnapshot {
            is_game_over: true,
            forfeit: true,
            winner: Some(Winner::Black),
            ..PositionSnapshot::starting()
        };
        assert_eq!(
            StatusLine::project(&snapshot, Color::Black),
            StatusLine::ForfeitWin
        );
        assert_eq!(
            StatusLine::project(&snapshot, Color::White),
            StatusLine::ForfeitLoss
        );
    }

    #[test]
    fn draw_outcome() {
        let snapshot = PositionSnapshot {
            is_game_over: true,
            winner: Some(Winner::Draw),
            ..PositionSnapshot::starting()
        };
        let result = GameResult::from_snapshot(&snapshot).unwrap();
        assert_eq!(result.reason, EndReason::Finished);
        assert_eq!(result.outcome_for(Color::White), Outcome::Draw);
        assert!(GameResult::from_snapshot(&PositionSnapshot::starting()).is_none());
    }

    #[test]
    fn captured_rows_follow_orientation() {
        let rules = StandardChess;
        let mut cache = PositionCache::starting(&rules).unwrap();
        let snapshot = PositionSnapshot {
            white_captured: vec![PieceKind::Pawn],
            black_captured: vec![PieceKind::Knight, PieceKind::Bishop],
            ..PositionSnapshot::starting()
        };
        cache.replace(&rules, snapshot).unwrap();

        let white_view = cache.captured_view(Color::White);
        assert_eq!(white_view.top, &[PieceKind::Knight, PieceKind::Bishop]);
        assert_eq!(white_view.bottom, &[PieceKind::Pawn]);

        let black_view = cache.captured_view(Color::Black);
        assert_eq!(black_view.top, &[PieceKind::Pawn]);
    }
}
