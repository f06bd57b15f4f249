use chess::{Board, BoardStatus, ChessMove, Color, MoveGen, Piece, Square};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RulesError;
use crate::game::san;
use crate::game::utils::has_insufficient_material;

/// Colour of a side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    #[serde(alias = "WHITE")]
    White,
    #[serde(alias = "BLACK")]
    Black,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::White => Side::Black,
            Side::Black => Side::White,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::White => "white",
            Side::Black => "black",
        }
    }
}

impl From<Color> for Side {
    fn from(color: Color) -> Self {
        match color {
            Color::White => Side::White,
            Color::Black => Side::Black,
        }
    }
}

impl From<Side> for Color {
    fn from(side: Side) -> Self {
        match side {
            Side::White => Color::White,
            Side::Black => Color::Black,
        }
    }
}

/// An immutable board position.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Position {
    board: Board,
}

impl Position {
    /// The standard starting position.
    pub fn initial() -> Self {
        Self {
            board: Board::default(),
        }
    }

    pub fn from_fen(fen: &str) -> Result<Self, RulesError> {
        Board::from_str(fen)
            .map(|board| Self { board })
            .map_err(|_| RulesError::InvalidFen(fen.to_string()))
    }

    pub fn fen(&self) -> String {
        self.board.to_string()
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn side_to_move(&self) -> Side {
        self.board.side_to_move().into()
    }

    pub fn piece_at(&self, square: Square) -> Option<(Piece, Side)> {
        let piece = self.board.piece_on(square)?;
        let color = self.board.color_on(square)?;
        Some((piece, color.into()))
    }

    pub fn in_check(&self) -> bool {
        self.board.checkers().popcnt() > 0
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::initial()
    }
}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Position").field(&self.fen()).finish()
    }
}

impl From<Board> for Position {
    fn from(board: Board) -> Self {
        Self { board }
    }
}

/// Result of applying a legal move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveOutcome {
    pub position: Position,
    pub captured: Option<Piece>,
    pub is_check: bool,
    pub is_checkmate: bool,
    pub is_stalemate_or_draw: bool,
    pub san: String,
}

/// Why a position has no continuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalState {
    Checkmate { winner: Side },
    Stalemate,
    InsufficientMaterial,
}

impl TerminalState {
    pub fn reason(&self) -> &'static str {
        match self {
            TerminalState::Checkmate { .. } => "checkmate",
            TerminalState::Stalemate => "stalemate",
            TerminalState::InsufficientMaterial => "insufficient_material",
        }
    }
}

/// All legal moves in generator order. The order is stable and is the scan
/// order used by the bot strategies.
pub fn legal_moves(position: &Position) -> Vec<ChessMove> {
    MoveGen::new_legal(&position.board).collect()
}

/// Apply `mv`, rejecting anything not in [`legal_moves`].
pub fn apply_move(position: &Position, mv: ChessMove) -> Result<MoveOutcome, RulesError> {
    if !MoveGen::new_legal(&position.board).any(|m| m == mv) {
        return Err(RulesError::IllegalMove(mv.to_string()));
    }

    let captured = captured_piece(&position.board, mv);
    let san = san::format_san(position, mv);
    let next = successor(position, mv);
    let status = next.board.status();
    let is_checkmate = status == BoardStatus::Checkmate;
    let is_stalemate_or_draw =
        status == BoardStatus::Stalemate || has_insufficient_material(&next.board);

    Ok(MoveOutcome {
        position: next,
        captured,
        is_check: next.in_check(),
        is_checkmate,
        is_stalemate_or_draw,
        san,
    })
}

/// Successor position for a move taken from [`legal_moves`]. Callers that
/// hold arbitrary input must go through [`apply_move`] instead.
pub fn successor(position: &Position, mv: ChessMove) -> Position {
    Position {
        board: position.board.make_move_new(mv),
    }
}

pub fn terminal_state(position: &Position) -> Option<TerminalState> {
    match position.board.status() {
        BoardStatus::Checkmate => Some(TerminalState::Checkmate {
            winner: position.side_to_move().opposite(),
        }),
        BoardStatus::Stalemate => Some(TerminalState::Stalemate),
        BoardStatus::Ongoing if has_insufficient_material(&position.board) => {
            Some(TerminalState::InsufficientMaterial)
        }
        BoardStatus::Ongoing => None,
    }
}

pub fn is_terminal(position: &Position) -> bool {
    terminal_state(position).is_some()
}

/// Piece removed from the board by `mv`, including en passant.
pub(crate) fn captured_piece(board: &Board, mv: ChessMove) -> Option<Piece> {
    if let Some(piece) = board.piece_on(mv.get_dest()) {
        return Some(piece);
    }
    let is_pawn = board.piece_on(mv.get_source()) == Some(Piece::Pawn);
    if is_pawn && mv.get_source().get_file() != mv.get_dest().get_file() {
        return Some(Piece::Pawn);
    }
    None
}

pub fn parse_square(text: &str) -> Result<Square, RulesError> {
    Square::from_str(&text.trim().to_lowercase())
        .map_err(|_| RulesError::InvalidSquare(text.to_string()))
}

pub fn parse_promotion(text: &str) -> Result<Piece, RulesError> {
    match text.trim().to_lowercase().as_str() {
        "q" | "queen" => Ok(Piece::Queen),
        "r" | "rook" => Ok(Piece::Rook),
        "b" | "bishop" => Ok(Piece::Bishop),
        "n" | "knight" => Ok(Piece::Knight),
        _ => Err(RulesError::InvalidPromotion(text.to_string())),
    }
}

/// Find the legal move matching a coordinate pair.
///
/// A promotion piece on a non-promoting move is ignored; a promoting move
/// without one promotes to a queen.
pub fn find_move(
    position: &Position,
    from: &str,
    to: &str,
    promotion: Option<&str>,
) -> Result<ChessMove, RulesError> {
    let source = parse_square(from)?;
    let dest = parse_square(to)?;
    let wanted = promotion.map(parse_promotion).transpose()?;

    let candidates: Vec<ChessMove> = MoveGen::new_legal(&position.board)
        .filter(|m| m.get_source() == source && m.get_dest() == dest)
        .collect();

    if candidates.iter().any(|m| m.get_promotion().is_some()) {
        let piece = wanted.unwrap_or(Piece::Queen);
        return candidates
            .into_iter()
            .find(|m| m.get_promotion() == Some(piece))
            .ok_or_else(|| RulesError::IllegalMove(format!("{}{}", source, dest)));
    }

    candidates
        .into_iter()
        .next()
        .ok_or_else(|| RulesError::IllegalMove(format!("{}{}", source, dest)))
}

/// Resolve a UCI string such as `e2e4` or `e7e8q`.
pub fn parse_uci(position: &Position, uci: &str) -> Result<ChessMove, RulesError> {
    let uci = uci.trim();
    let (Some(from), Some(to)) = (uci.get(0..2), uci.get(2..4)) else {
        return Err(RulesError::UnknownNotation(uci.to_string()));
    };
    let promotion = uci.get(4..).filter(|p| !p.is_empty());
    find_move(position, from, to, promotion)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn play(position: &Position, uci: &str) -> Position {
        let mv = parse_uci(position, uci).unwrap();
        apply_move(position, mv).unwrap().position
    }

    #[test]
    fn apply_move_accepts_exactly_the_legal_moves() {
        let mut positions = vec![Position::initial()];
        let mut current = Position::initial();
        for uci in ["e2e4", "d7d5", "e4d5", "g8f6", "f1b5", "c7c6"] {
            current = play(&current, uci);
            positions.push(current);
        }

        for position in &positions {
            let legal = legal_moves(position);
            for source in chess::ALL_SQUARES {
                for dest in chess::ALL_SQUARES {
                    let mv = ChessMove::new(source, dest, None);
                    assert_eq!(
                        apply_move(position, mv).is_ok(),
                        legal.contains(&mv),
                        "{} in {:?}",
                        mv,
                        position
                    );
                }
            }
        }
    }

    #[test]
    fn illegal_move_is_rejected_without_panicking() {
        let position = Position::initial();
        let err = find_move(&position, "e2", "e5", None).unwrap_err();
        assert_eq!(err, RulesError::IllegalMove("e2e5".to_string()));
        assert!(matches!(
            find_move(&position, "z9", "e4", None),
            Err(RulesError::InvalidSquare(_))
        ));
    }

    #[test]
    fn reports_capture_and_check() {
        let position = Position::from_fen("4k3/8/8/3q4/8/8/3R4/4K3 w - - 0 1").unwrap();
        let mv = find_move(&position, "d2", "d5", None).unwrap();
        let outcome = apply_move(&position, mv).unwrap();
        assert_eq!(outcome.captured, Some(Piece::Queen));
        assert!(!outcome.is_check);
        assert_eq!(outcome.san, "Rxd5");
    }

    #[test]
    fn detects_checkmate() {
        let position = Position::from_fen("6k1/5ppp/8/8/8/8/8/R5K1 w - - 0 1").unwrap();
        let mv = find_move(&position, "a1", "a8", None).unwrap();
        let outcome = apply_move(&position, mv).unwrap();
        assert!(outcome.is_checkmate);
        assert_eq!(outcome.san, "Ra8#");
        assert_eq!(
            terminal_state(&outcome.position),
            Some(TerminalState::Checkmate { winner: Side::White })
        );
        assert!(legal_moves(&outcome.position).is_empty());
    }

    #[test]
    fn bare_kings_are_a_draw() {
        let position = Position::from_fen("4k3/8/8/8/8/8/8/4K3 w - - 0 1").unwrap();
        assert_eq!(
            terminal_state(&position),
            Some(TerminalState::InsufficientMaterial)
        );
        assert!(is_terminal(&position));
    }

    #[test]
    fn promotion_defaults_to_queen() {
        let position = Position::from_fen("8/4P3/8/8/8/8/k7/4K3 w - - 0 1").unwrap();
        let mv = find_move(&position, "e7", "e8", None).unwrap();
        assert_eq!(mv.get_promotion(), Some(Piece::Queen));
        let knight = find_move(&position, "e7", "e8", Some("n")).unwrap();
        assert_eq!(knight.get_promotion(), Some(Piece::Knight));
    }

    #[test]
    fn en_passant_counts_as_a_pawn_capture() {
        let mut position = Position::initial();
        for uci in ["e2e4", "a7a6", "e4e5", "d7d5"] {
            position = play(&position, uci);
        }
        let mv = find_move(&position, "e5", "d6", None).unwrap();
        assert_eq!(captured_piece(position.board(), mv), Some(Piece::Pawn));
    }
}
