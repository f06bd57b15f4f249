//! Coin reward policy, consumed as constants.

use crate::bot::BotLevel;
use crate::models::session::{MatchResult, Opponent};

pub const BOT_EASY_WIN: u32 = 45;
pub const BOT_MEDIUM_WIN: u32 = 75;
pub const BOT_HARD_WIN: u32 = 100;
pub const PVP_WIN: u32 = 50;
pub const PVP_DRAW: u32 = 20;
pub const PVP_LOSE: u32 = 0;

/// Coins paid to a player for `result` against `opponent`.
pub fn coins_for(opponent: Opponent, result: MatchResult) -> u32 {
    match (opponent, result) {
        (Opponent::Bot(BotLevel::Easy), MatchResult::Win) => BOT_EASY_WIN,
        (Opponent::Bot(BotLevel::Medium), MatchResult::Win) => BOT_MEDIUM_WIN,
        (Opponent::Bot(BotLevel::Hard), MatchResult::Win) => BOT_HARD_WIN,
        (Opponent::Bot(_), _) => 0,
        (Opponent::Human, MatchResult::Win) => PVP_WIN,
        (Opponent::Human, MatchResult::Draw) => PVP_DRAW,
        (Opponent::Human, MatchResult::Lose) => PVP_LOSE,
    }
}
