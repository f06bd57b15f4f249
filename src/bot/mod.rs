//! Bot opponent.
//!
//! A [`BotStrategy`] is chosen once per session from the [`BotLevel`] and
//! asked for exactly one move per bot turn. Strategies only read the
//! position they are given; the match actor in [`session`] owns the clock,
//! the thinking delay and the shared session state.

pub mod greedy;
pub mod minimax;
pub mod random;
pub mod session;

use std::time::Duration;

use chess::ChessMove;
use serde::{Deserialize, Serialize};

use crate::error::BotError;
use crate::game::{legal_moves, Position};

pub use greedy::GreedyCapture;
pub use minimax::Minimax;
pub use random::{RandomMover, RandomSource, RngSource, ScriptedSource};
pub use session::BotMatch;

/// Difficulty tier.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BotLevel {
    #[serde(alias = "EASY")]
    Easy,
    #[serde(alias = "MEDIUM")]
    Medium,
    #[serde(alias = "HARD")]
    Hard,
}

/// Move selection policy.
pub trait BotStrategy: Send + Sync {
    /// Pick one of `moves`, which are the legal moves of `position` in
    /// generator order. Returns `None` only when `moves` is empty.
    fn choose(
        &self,
        position: &Position,
        moves: &[ChessMove],
        random: &mut dyn RandomSource,
    ) -> Option<ChessMove>;

    fn name(&self) -> &'static str;
}

pub fn strategy_for(level: BotLevel) -> Box<dyn BotStrategy> {
    match level {
        BotLevel::Easy => Box::new(RandomMover),
        BotLevel::Medium => Box::new(GreedyCapture),
        BotLevel::Hard => Box::new(Minimax::default()),
    }
}

/// A strategy bound to its source of randomness.
pub struct BotEngine {
    strategy: Box<dyn BotStrategy>,
    random: Box<dyn RandomSource>,
}

impl BotEngine {
    pub fn new(level: BotLevel, random: Box<dyn RandomSource>) -> Self {
        Self::with_strategy(strategy_for(level), random)
    }

    pub fn with_strategy(strategy: Box<dyn BotStrategy>, random: Box<dyn RandomSource>) -> Self {
        Self { strategy, random }
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub fn select_move(&mut self, position: &Position) -> Result<ChessMove, BotError> {
        let moves = legal_moves(position);
        let chosen = self
            .strategy
            .choose(position, &moves, self.random.as_mut())
            .ok_or(BotError::NoLegalMoves)?;
        log::debug!("{} picked {} from {} moves", self.strategy.name(), chosen, moves.len());
        Ok(chosen)
    }

    /// Uniform thinking delay in `range` milliseconds.
    pub fn thinking_delay(&mut self, range: &std::ops::Range<u64>) -> Duration {
        Duration::from_millis(self.random.between(range.start, range.end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::find_move;

    #[test]
    fn reports_no_legal_moves_instead_of_retrying() {
        let mated = Position::from_fen("R5k1/5ppp/8/8/8/8/8/6K1 b - - 0 1").unwrap();
        for level in [BotLevel::Easy, BotLevel::Medium, BotLevel::Hard] {
            let mut engine = BotEngine::new(level, Box::new(RngSource::seeded(1)));
            assert_eq!(engine.select_move(&mated), Err(BotError::NoLegalMoves));
        }
    }

    #[test]
    fn every_level_returns_a_legal_move() {
        let position = Position::initial();
        let legal = legal_moves(&position);
        for level in [BotLevel::Easy, BotLevel::Medium, BotLevel::Hard] {
            let mut engine = BotEngine::new(level, Box::new(RngSource::seeded(7)));
            let mv = engine.select_move(&position).unwrap();
            assert!(legal.contains(&mv), "{} played {}", engine.strategy_name(), mv);
        }
    }

    #[test]
    fn hard_takes_the_free_capture_medium_finds() {
        // White rook on d2 can take an undefended queen on d5.
        let position = Position::from_fen("4k3/8/8/3q4/8/8/3R4/4K3 w - - 0 1").unwrap();
        let capture = find_move(&position, "d2", "d5", None).unwrap();

        let mut medium = BotEngine::new(BotLevel::Medium, Box::new(RngSource::seeded(3)));
        let mut hard = BotEngine::new(BotLevel::Hard, Box::new(RngSource::seeded(3)));
        assert_eq!(medium.select_move(&position).unwrap(), capture);
        assert_eq!(hard.select_move(&position).unwrap(), capture);
    }

    #[test]
    fn thinking_delay_stays_in_range() {
        let mut engine = BotEngine::new(BotLevel::Easy, Box::new(RngSource::seeded(11)));
        for _ in 0..50 {
            let delay = engine.thinking_delay(&(500..1500));
            assert!(delay >= Duration::from_millis(500) && delay < Duration::from_millis(1500));
        }
    }

    #[test]
    fn level_names_follow_the_wire_format() {
        assert_eq!(serde_json::to_string(&BotLevel::Hard).unwrap(), "\"hard\"");
        let level: BotLevel = serde_json::from_str("\"MEDIUM\"").unwrap();
        assert_eq!(level, BotLevel::Medium);
    }
}
