use chess::{BitBoard, Board, BoardStatus, Color, Piece, Square};

use crate::game::rules::Position;

/// Short label describing the position, used in server logs and status lines
pub fn status_label(position: &Position) -> &'static str {
    let board = position.board();
    match board.status() {
        BoardStatus::Checkmate => "checkmate",
        BoardStatus::Stalemate => "stalemate",
        BoardStatus::Ongoing if has_insufficient_material(board) => "draw",
        BoardStatus::Ongoing if position.in_check() => "check",
        BoardStatus::Ongoing => "in_progress",
    }
}

fn is_light_square(square: Square) -> bool {
    (square.get_rank().to_index() + square.get_file().to_index()) % 2 == 1
}

/// Check if the board has insufficient material for checkmate
pub fn has_insufficient_material(board: &Board) -> bool {
    let heavy = *board.pieces(Piece::Pawn) | *board.pieces(Piece::Rook) | *board.pieces(Piece::Queen);
    if heavy.popcnt() > 0 {
        return false;
    }

    let knights = *board.pieces(Piece::Knight);
    let bishops = *board.pieces(Piece::Bishop);
    let minors = knights | bishops;

    match minors.popcnt() {
        // King vs King, or a lone minor piece
        0 | 1 => true,
        // One bishop each, both on the same square colour
        2 if knights.popcnt() == 0 => {
            let white: BitBoard = bishops & *board.color_combined(Color::White);
            let black: BitBoard = bishops & *board.color_combined(Color::Black);
            if white.popcnt() != 1 || black.popcnt() != 1 {
                return false;
            }
            let colours: Vec<bool> = bishops.map(is_light_square).collect();
            colours.windows(2).all(|pair| pair[0] == pair[1])
        }
        _ => false,
    }
}
