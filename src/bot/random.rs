//! Randomness for the bot, and the EASY strategy.

use std::collections::VecDeque;

use chess::ChessMove;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::bot::BotStrategy;
use crate::game::Position;

/// Source of uniform choices. Injected so bot behaviour is reproducible.
pub trait RandomSource: Send {
    /// Uniform index in `0..len`. `len` is never zero.
    fn pick(&mut self, len: usize) -> usize;

    /// Uniform value in `low..high`; `low` when the range is empty.
    fn between(&mut self, low: u64, high: u64) -> u64;
}

/// [`RandomSource`] over any `rand` generator.
pub struct RngSource<R> {
    rng: R,
}

impl RngSource<StdRng> {
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl<R: Rng + Send> RandomSource for RngSource<R> {
    fn pick(&mut self, len: usize) -> usize {
        self.rng.random_range(0..len)
    }

    fn between(&mut self, low: u64, high: u64) -> u64 {
        if high <= low {
            return low;
        }
        self.rng.random_range(low..high)
    }
}

/// Replays fixed answers, then falls back to zero.
#[derive(Debug, Default, Clone)]
pub struct ScriptedSource {
    picks: VecDeque<usize>,
}

impl ScriptedSource {
    pub fn new(picks: impl IntoIterator<Item = usize>) -> Self {
        Self {
            picks: picks.into_iter().collect(),
        }
    }
}

impl RandomSource for ScriptedSource {
    fn pick(&mut self, len: usize) -> usize {
        self.picks.pop_front().unwrap_or(0).min(len.saturating_sub(1))
    }

    fn between(&mut self, low: u64, _high: u64) -> u64 {
        low
    }
}

/// Uniform choice among the legal moves.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomMover;

impl BotStrategy for RandomMover {
    fn choose(
        &self,
        _position: &Position,
        moves: &[ChessMove],
        random: &mut dyn RandomSource,
    ) -> Option<ChessMove> {
        if moves.is_empty() {
            return None;
        }
        Some(moves[random.pick(moves.len())])
    }

    fn name(&self) -> &'static str {
        "random"
    }
}
