//! Observed board positions.
//!
//! A snapshot is whatever the position source saw, expressed as FEN. Only the
//! piece placement and side to move take part in equality: clocks, castling
//! rights and en passant squares are frequently guessed by scrapers and must
//! not make an unchanged board look like a new move.

use std::fmt;
use std::str::FromStr;

use shakmaty::fen::Fen;
use shakmaty::uci::UciMove;
use shakmaty::{Board, CastlingMode, Chess, Color, EnPassantMode, Position, PositionError};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SnapshotError {
    #[error("Invalid FEN '{fen}': {reason}")]
    InvalidFen { fen: String, reason: String },
}

/// One observed position.
#[derive(Debug, Clone)]
pub struct PositionSnapshot {
    fen: String,
    board: Board,
    turn: Color,
}

impl PositionSnapshot {
    /// Parse a snapshot from a FEN string.
    pub fn from_fen(fen: &str) -> Result<Self, SnapshotError> {
        let fen = fen.trim();
        let parsed: Fen = fen.parse().map_err(|e| SnapshotError::InvalidFen {
            fen: fen.to_string(),
            reason: format!("{e}"),
        })?;
        let setup = parsed.as_setup();

        Ok(Self {
            fen: fen.to_string(),
            board: setup.board.clone(),
            turn: setup.turn,
        })
    }

    /// The FEN as handed to the engine.
    pub fn fen(&self) -> &str {
        &self.fen
    }

    pub fn side_to_move(&self) -> Color {
        self.turn
    }

    /// True when the pieces stand on their starting squares.
    pub fn is_initial(&self) -> bool {
        self.board == *Chess::default().board()
    }

    /// The position reached by playing `uci_move` from this one.
    ///
    /// Castling rights and en passant squares that contradict the board are
    /// dropped. Returns `None` if the board itself is not playable or the move
    /// is not legal in it.
    pub fn after(&self, uci_move: &str) -> Option<PositionSnapshot> {
        let fen: Fen = self.fen.parse().ok()?;
        let mut pos: Chess = fen
            .into_position(CastlingMode::Standard)
            .or_else(PositionError::ignore_invalid_castling_rights)
            .or_else(PositionError::ignore_invalid_ep_square)
            .ok()?;
        let uci: UciMove = uci_move.parse().ok()?;
        let mv = uci.to_move(&pos).ok()?;
        pos.play_unchecked(mv);

        Some(Self {
            fen: Fen::from_position(&pos, EnPassantMode::Legal).to_string(),
            board: pos.board().clone(),
            turn: pos.turn(),
        })
    }
}

impl PartialEq for PositionSnapshot {
    fn eq(&self, other: &Self) -> bool {
        self.turn == other.turn && self.board == other.board
    }
}

impl Eq for PositionSnapshot {}

impl FromStr for PositionSnapshot {
    type Err = SnapshotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_fen(s)
    }
}

impl fmt::Display for PositionSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fen)
    }
}

/// Parse a player color as written by position sources ("white", "b", ...).
pub fn parse_color(s: &str) -> Option<Color> {
    match s.trim().to_ascii_lowercase().as_str() {
        "white" | "w" => Some(Color::White),
        "black" | "b" => Some(Color::Black),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const START: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";
    const AFTER_E4: &str = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1";

    #[test]
    fn test_start_position_is_initial() {
        let snap = PositionSnapshot::from_fen(START).unwrap();
        assert!(snap.is_initial());
        assert_eq!(snap.side_to_move(), Color::White);
    }

    #[test]
    fn test_moved_position_is_not_initial() {
        let snap = PositionSnapshot::from_fen(AFTER_E4).unwrap();
        assert!(!snap.is_initial());
        assert_eq!(snap.side_to_move(), Color::Black);
    }

    #[test]
    fn test_equality_ignores_clocks_and_rights() {
        let a = PositionSnapshot::from_fen(AFTER_E4).unwrap();
        let b = PositionSnapshot::from_fen("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b - - 3 9")
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_equality_respects_side_to_move() {
        let a = PositionSnapshot::from_fen(AFTER_E4).unwrap();
        let b = PositionSnapshot::from_fen("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 0 1")
            .unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_after_plays_move() {
        let start = PositionSnapshot::from_fen(START).unwrap();
        let expected = PositionSnapshot::from_fen(AFTER_E4).unwrap();
        assert_eq!(start.after("e2e4"), Some(expected));
    }

    #[test]
    fn test_after_keeps_full_fen() {
        let start = PositionSnapshot::from_fen(START).unwrap();
        let next = start.after("g1f3").unwrap();
        assert_eq!(
            next.fen(),
            "rnbqkbnr/pppppppp/8/8/8/5N2/PPPPPPPP/RNBQKB1R b KQkq - 1 1"
        );
    }

    #[test]
    fn test_after_drops_guessed_castling_rights() {
        // White king already on e2, rights still reported as KQkq
        let guessed =
            PositionSnapshot::from_fen("rnbqkbnr/pppp1ppp/8/4p3/4P3/8/PPPPKPPP/RNBQ1BNR b KQkq - 1 2")
                .unwrap();
        let next = guessed.after("b8c6").unwrap();
        assert_eq!(
            next.fen(),
            "r1bqkbnr/pppp1ppp/2n5/4p3/4P3/8/PPPPKPPP/RNBQ1BNR w kq - 2 3"
        );
        assert_eq!(next.side_to_move(), Color::White);
    }

    #[test]
    fn test_after_drops_impossible_ep_square() {
        let guessed =
            PositionSnapshot::from_fen("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e6 0 1")
                .unwrap();
        let next = guessed.after("e7e5").unwrap();
        assert_eq!(
            next,
            PositionSnapshot::from_fen("rnbqkbnr/pppp1ppp/8/4p3/4P3/8/PPPP1PPP/RNBQKBNR w KQkq e6 0 2")
                .unwrap()
        );
    }

    #[test]
    fn test_after_rejects_illegal_move() {
        let start = PositionSnapshot::from_fen(START).unwrap();
        assert_eq!(start.after("e2e5"), None);
        assert_eq!(start.after("garbage"), None);
    }

    #[test]
    fn test_invalid_fen() {
        assert!(PositionSnapshot::from_fen("not a fen").is_err());
    }

    #[test]
    fn test_parse_color() {
        assert_eq!(parse_color("White"), Some(Color::White));
        assert_eq!(parse_color(" b "), Some(Color::Black));
        assert_eq!(parse_color("red"), None);
    }
}
