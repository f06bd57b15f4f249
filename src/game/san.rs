//! Standard algebraic notation for move history entries.

use chess::{BoardStatus, ChessMove, MoveGen, Piece, Square};

use crate::error::RulesError;
use crate::game::rules::{self, captured_piece, Position};

fn piece_letter(piece: Piece) -> Option<char> {
    match piece {
        Piece::Pawn => None,
        Piece::Knight => Some('N'),
        Piece::Bishop => Some('B'),
        Piece::Rook => Some('R'),
        Piece::Queen => Some('Q'),
        Piece::King => Some('K'),
    }
}

fn file_char(square: Square) -> char {
    (b'a' + square.get_file().to_index() as u8) as char
}

fn rank_char(square: Square) -> char {
    (b'1' + square.get_rank().to_index() as u8) as char
}

/// Format a legal move in SAN, e.g. `Nbd7`, `exd5`, `e8=Q+`, `O-O`.
pub fn format_san(position: &Position, mv: ChessMove) -> String {
    let board = position.board();
    let from = mv.get_source();
    let to = mv.get_dest();
    let Some(piece) = board.piece_on(from) else {
        return mv.to_string();
    };

    let mut san = String::new();
    let file_delta = (from.get_file().to_index() as i32 - to.get_file().to_index() as i32).abs();

    if piece == Piece::King && file_delta == 2 {
        san.push_str(if to.get_file().to_index() > from.get_file().to_index() {
            "O-O"
        } else {
            "O-O-O"
        });
    } else {
        let capture = captured_piece(board, mv).is_some();
        match piece_letter(piece) {
            None => {
                if capture {
                    san.push(file_char(from));
                }
            }
            Some(letter) => {
                san.push(letter);
                let rivals: Vec<Square> = MoveGen::new_legal(board)
                    .filter(|m| {
                        m.get_dest() == to
                            && m.get_source() != from
                            && board.piece_on(m.get_source()) == Some(piece)
                    })
                    .map(|m| m.get_source())
                    .collect();
                if !rivals.is_empty() {
                    let shares_file = rivals.iter().any(|s| s.get_file() == from.get_file());
                    let shares_rank = rivals.iter().any(|s| s.get_rank() == from.get_rank());
                    if !shares_file {
                        san.push(file_char(from));
                    } else if !shares_rank {
                        san.push(rank_char(from));
                    } else {
                        san.push(file_char(from));
                        san.push(rank_char(from));
                    }
                }
            }
        }
        if capture {
            san.push('x');
        }
        san.push_str(&to.to_string());
        if let Some(letter) = mv.get_promotion().and_then(piece_letter) {
            san.push('=');
            san.push(letter);
        }
    }

    let after = board.make_move_new(mv);
    if after.status() == BoardStatus::Checkmate {
        san.push('#');
    } else if after.checkers().popcnt() > 0 {
        san.push('+');
    }
    san
}

fn normalize(notation: &str) -> String {
    let trimmed = notation.trim();
    let castling = trimmed.starts_with("0-0");
    trimmed
        .chars()
        .filter(|c| !matches!(c, '+' | '#' | '!' | '?' | '='))
        .map(|c| if castling && c == '0' { 'O' } else { c })
        .collect()
}

/// Resolve SAN (or, failing that, UCI) against the legal moves of `position`.
pub fn resolve(position: &Position, notation: &str) -> Result<ChessMove, RulesError> {
    let wanted = normalize(notation);
    if wanted.is_empty() {
        return Err(RulesError::UnknownNotation(notation.to_string()));
    }
    if let Some(mv) = rules::legal_moves(position)
        .into_iter()
        .find(|&mv| normalize(&format_san(position, mv)) == wanted)
    {
        return Ok(mv);
    }
    rules::parse_uci(position, &wanted)
        .map_err(|_| RulesError::UnknownNotation(notation.to_string()))
}
