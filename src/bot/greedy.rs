use chess::{ChessMove, Piece};

use crate::bot::random::RandomSource;
use crate::bot::BotStrategy;
use crate::game::rules::captured_piece;
use crate::game::Position;

/// Value of a captured piece for the greedy bot.
pub fn capture_value(piece: Piece) -> u32 {
    match piece {
        Piece::Pawn => 1,
        Piece::Knight | Piece::Bishop => 3,
        Piece::Rook => 5,
        Piece::Queen => 9,
        Piece::King => 0,
    }
}

/// Takes the most valuable piece on offer, otherwise plays at random.
///
/// Ties go to the first capture in generator order.
#[derive(Debug, Default, Clone, Copy)]
pub struct GreedyCapture;

impl BotStrategy for GreedyCapture {
    fn choose(
        &self,
        position: &Position,
        moves: &[ChessMove],
        random: &mut dyn RandomSource,
    ) -> Option<ChessMove> {
        if moves.is_empty() {
            return None;
        }

        let mut best: Option<(u32, ChessMove)> = None;
        for &mv in moves {
            let Some(piece) = captured_piece(position.board(), mv) else {
                continue;
            };
            let value = capture_value(piece);
            if best.map_or(true, |(top, _)| value > top) {
                best = Some((value, mv));
            }
        }

        match best {
            Some((_, mv)) => Some(mv),
            None => Some(moves[random.pick(moves.len())]),
        }
    }

    fn name(&self) -> &'static str {
        "greedy_capture"
    }
}
