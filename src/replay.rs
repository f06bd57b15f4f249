//! Stepping through a finished game.
//!
//! Works on a frozen copy of the move history; nothing here touches the
//! live session or the network.

use crate::error::ReplayError;
use crate::game::{apply_move, Position};
use crate::models::messages::MoveRecord;
use crate::models::session::GameSession;

/// Position after move `index` (zero-based), replayed from the start.
pub fn position_after(history: &[MoveRecord], index: usize) -> Result<Position, ReplayError> {
    if index >= history.len() {
        return Err(ReplayError::OutOfRange {
            index,
            len: history.len(),
        });
    }
    let mut position = Position::initial();
    for (i, record) in history[..=index].iter().enumerate() {
        let corrupt = |source| ReplayError::Corrupt { index: i, source };
        let mv = record.resolve(&position).map_err(corrupt)?;
        position = apply_move(&position, mv).map_err(corrupt)?.position;
    }
    Ok(position)
}

/// Replay cursor. `None` means the board shows the live position.
#[derive(Debug, Clone)]
pub struct Replay {
    history: Vec<MoveRecord>,
    index: Option<usize>,
    position: Option<Position>,
}

impl Replay {
    pub fn new(history: Vec<MoveRecord>) -> Self {
        Self {
            history,
            index: None,
            position: None,
        }
    }

    /// Replay is only offered once the game is over.
    pub fn from_session(session: &GameSession) -> Result<Self, ReplayError> {
        if !session.is_finished() {
            return Err(ReplayError::NotFinished);
        }
        Ok(Self::new(session.move_history().to_vec()))
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn is_active(&self) -> bool {
        self.index.is_some()
    }

    /// Jump to move `index`.
    pub fn select(&mut self, index: usize) -> Result<&Position, ReplayError> {
        let position = position_after(&self.history, index)?;
        self.index = Some(index);
        Ok(self.position.insert(position))
    }

    /// One move forward, stopping at the last move. Does nothing when not
    /// replaying.
    pub fn next(&mut self) -> Result<Option<&Position>, ReplayError> {
        let Some(index) = self.index else {
            return Ok(None);
        };
        let last = self.history.len().saturating_sub(1);
        self.select((index + 1).min(last)).map(Some)
    }

    /// One move back. Stepping back from the first move leaves the replay.
    pub fn previous(&mut self) -> Result<Option<&Position>, ReplayError> {
        match self.index {
            None => Ok(None),
            Some(0) => {
                self.exit();
                Ok(None)
            }
            Some(index) => self.select(index - 1).map(Some),
        }
    }

    pub fn exit(&mut self) {
        self.index = None;
        self.position = None;
    }

    /// What the board should show: the replayed position, or `live`.
    pub fn board<'a>(&'a self, live: &'a Position) -> &'a Position {
        self.position.as_ref().unwrap_or(live)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{parse_uci, Side};
    use crate::models::session::{MatchResult, Opponent, Outcome};

    /// Plays `moves` and returns the history plus the position after each move.
    fn play(moves: &[&str]) -> (Vec<MoveRecord>, Vec<Position>) {
        let mut position = Position::initial();
        let mut history = Vec::new();
        let mut broadcast = Vec::new();
        for uci in moves {
            let mv = parse_uci(&position, uci).unwrap();
            let outcome = apply_move(&position, mv).unwrap();
            history.push(MoveRecord::new(outcome.san, mv));
            position = outcome.position;
            broadcast.push(position);
        }
        (history, broadcast)
    }

    const GAME: [&str; 7] = ["e2e4", "e7e5", "g1f3", "b8c6", "f1b5", "a7a6", "e1g1"];

    #[test]
    fn replaying_a_prefix_reproduces_each_broadcast_position() {
        let (history, broadcast) = play(&GAME);
        for (i, expected) in broadcast.iter().enumerate() {
            assert_eq!(&position_after(&history, i).unwrap(), expected, "after move {}", i);
        }
    }

    #[test]
    fn san_only_history_replays_too() {
        let (history, broadcast) = play(&GAME);
        let san_only: Vec<MoveRecord> = history
            .iter()
            .map(|r| MoveRecord {
                san: r.san.clone(),
                uci: None,
            })
            .collect();
        assert_eq!(position_after(&san_only, 6).unwrap(), broadcast[6]);
    }

    #[test]
    fn out_of_range_and_corrupt_histories_are_errors() {
        let (history, _) = play(&GAME[..2]);
        assert_eq!(
            position_after(&history, 2),
            Err(ReplayError::OutOfRange { index: 2, len: 2 })
        );
        let broken = vec![MoveRecord {
            san: "Ke5".to_string(),
            uci: None,
        }];
        assert!(matches!(
            position_after(&broken, 0),
            Err(ReplayError::Corrupt { index: 0, .. })
        ));
    }

    #[test]
    fn navigation_clamps_and_exits_at_the_start() {
        let (history, broadcast) = play(&GAME[..3]);
        let live = broadcast[2];
        let mut replay = Replay::new(history);

        assert_eq!(replay.next().unwrap(), None);
        assert_eq!(replay.board(&live), &live);

        replay.select(1).unwrap();
        assert_eq!(replay.next().unwrap(), Some(&broadcast[2]));
        assert_eq!(replay.next().unwrap(), Some(&broadcast[2]));
        assert_eq!(replay.index(), Some(2));

        replay.previous().unwrap();
        replay.previous().unwrap();
        assert_eq!(replay.index(), Some(0));
        assert_eq!(replay.board(&live), &broadcast[0]);

        assert_eq!(replay.previous().unwrap(), None);
        assert!(!replay.is_active());
        assert_eq!(replay.board(&live), &live);
    }

    #[test]
    fn only_finished_sessions_can_be_replayed() {
        let mut session = GameSession::new("g1", "alice", Side::White, Opponent::Human, 300);
        assert_eq!(Replay::from_session(&session).unwrap_err(), ReplayError::NotFinished);
        session.finish(Outcome {
            result: MatchResult::Draw,
            reason: "agreed".to_string(),
            winner_id: None,
            loser_id: None,
            coins_earned: 20,
        });
        assert!(Replay::from_session(&session).unwrap().is_empty());
    }
}
