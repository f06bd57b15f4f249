//! Rules adapter over the `chess` crate.
//!
//! Everything here is a pure function of an explicit [`Position`] so the bot
//! search and the replay engine can explore branches without touching shared
//! session state.

pub mod rules;
pub mod san;
pub mod utils;

pub use rules::{
    apply_move, find_move, is_terminal, legal_moves, parse_uci, successor, terminal_state,
    MoveOutcome, Position, Side, TerminalState,
};
