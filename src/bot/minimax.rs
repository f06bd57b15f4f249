//! Fixed-depth alpha-beta search over material.

use chess::{ChessMove, Color, Piece};

use crate::bot::random::RandomSource;
use crate::bot::BotStrategy;
use crate::game::{legal_moves, successor, terminal_state, Position, Side, TerminalState};

/// Score for a mate, well above any material balance.
pub const MATE: i32 = 1_000_000;

pub fn piece_value(piece: Piece) -> i32 {
    match piece {
        Piece::Pawn => 100,
        Piece::Knight => 320,
        Piece::Bishop => 330,
        Piece::Rook => 500,
        Piece::Queen => 900,
        Piece::King => 20_000,
    }
}

/// Material balance from `side`'s point of view.
pub fn evaluate(position: &Position, side: Side) -> i32 {
    let board = position.board();
    let ours = *board.color_combined(Color::from(side));
    let theirs = *board.color_combined(Color::from(side.opposite()));
    let mut score = 0;
    for piece in chess::ALL_PIECES {
        let pieces = *board.pieces(piece);
        score += piece_value(piece) * (pieces & ours).popcnt() as i32;
        score -= piece_value(piece) * (pieces & theirs).popcnt() as i32;
    }
    score
}

/// Minimax with alpha-beta pruning. Moves are searched in generator order and
/// the first move reaching the best score is kept.
#[derive(Debug, Clone, Copy)]
pub struct Minimax {
    pub depth: u8,
}

impl Default for Minimax {
    fn default() -> Self {
        Self { depth: 2 }
    }
}

impl Minimax {
    fn search(&self, position: &Position, depth: u8, mut alpha: i32, mut beta: i32, bot: Side) -> i32 {
        match terminal_state(position) {
            // Faster mates score higher.
            Some(TerminalState::Checkmate { winner }) => {
                let distance = i32::from(self.depth - depth);
                return if winner == bot { MATE - distance } else { distance - MATE };
            }
            Some(_) => return 0,
            None => {}
        }
        if depth == 0 {
            return evaluate(position, bot);
        }

        let maximizing = position.side_to_move() == bot;
        let mut best = if maximizing { i32::MIN } else { i32::MAX };
        for mv in legal_moves(position) {
            let score = self.search(&successor(position, mv), depth - 1, alpha, beta, bot);
            if maximizing {
                best = best.max(score);
                alpha = alpha.max(best);
            } else {
                best = best.min(score);
                beta = beta.min(best);
            }
            if beta <= alpha {
                break;
            }
        }
        best
    }
}

impl BotStrategy for Minimax {
    fn choose(
        &self,
        position: &Position,
        moves: &[ChessMove],
        _random: &mut dyn RandomSource,
    ) -> Option<ChessMove> {
        let bot = position.side_to_move();
        let mut best: Option<(i32, ChessMove)> = None;
        let mut alpha = i32::MIN;

        for &mv in moves {
            let score = self.search(
                &successor(position, mv),
                self.depth.saturating_sub(1),
                alpha,
                i32::MAX,
                bot,
            );
            if best.map_or(true, |(top, _)| score > top) {
                best = Some((score, mv));
                alpha = alpha.max(score);
            }
        }
        best.map(|(_, mv)| mv)
    }

    fn name(&self) -> &'static str {
        "minimax"
    }
}
