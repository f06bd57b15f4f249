//! Client-side mirror of one game session.
//!
//! Updates arrive either as authoritative snapshots (live channel or polling)
//! or, in bot games, as locally applied moves. Every update is applied
//! atomically: inputs are validated before any field is touched.

use chess::ChessMove;
use serde::{Deserialize, Serialize};

use crate::bot::BotLevel;
use crate::error::SessionError;
use crate::game::{self, MoveOutcome, Position, Side};
use crate::models::messages::{GameSnapshot, LastMove, MoveRecord, TimerUpdate};
use crate::models::rewards::coins_for;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionStatus {
    Waiting,
    Active,
    Finished,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum OpponentKind {
    Bot,
    Human,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opponent {
    Bot(BotLevel),
    Human,
}

impl Opponent {
    pub fn kind(&self) -> OpponentKind {
        match self {
            Opponent::Bot(_) => OpponentKind::Bot,
            Opponent::Human => OpponentKind::Human,
        }
    }

    pub fn bot_level(&self) -> Option<BotLevel> {
        match self {
            Opponent::Bot(level) => Some(*level),
            Opponent::Human => None,
        }
    }

    /// Rebuild from the wire pair; a BOT without a level plays EASY.
    pub fn from_wire(kind: Option<OpponentKind>, level: Option<BotLevel>) -> Self {
        match kind {
            Some(OpponentKind::Bot) => Opponent::Bot(level.unwrap_or(BotLevel::Easy)),
            _ => Opponent::Human,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum MatchResult {
    Win,
    Lose,
    Draw,
}

/// Remaining time per side, in whole seconds.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clock {
    pub white_seconds: u32,
    pub black_seconds: u32,
}

impl Clock {
    pub fn new(seconds: u32) -> Self {
        Self {
            white_seconds: seconds,
            black_seconds: seconds,
        }
    }

    pub fn remaining(&self, side: Side) -> u32 {
        match side {
            Side::White => self.white_seconds,
            Side::Black => self.black_seconds,
        }
    }

    /// Charge `seconds` to `side`, saturating at zero. Returns what is left.
    pub fn tick(&mut self, side: Side, seconds: u32) -> u32 {
        let slot = match side {
            Side::White => &mut self.white_seconds,
            Side::Black => &mut self.black_seconds,
        };
        *slot = slot.saturating_sub(seconds);
        *slot
    }
}

/// Final result as seen by the local player.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub result: MatchResult,
    pub reason: String,
    pub winner_id: Option<String>,
    pub loser_id: Option<String>,
    pub coins_earned: u32,
}

/// What applying a snapshot did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotEffect {
    Applied,
    /// The snapshot moved the session to FINISHED.
    Finished,
    /// Older than local state; dropped.
    Stale,
    /// The session is already finished and immutable.
    Ignored,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GameSession {
    id: String,
    player_id: String,
    player_side: Side,
    status: SessionStatus,
    opponent: Opponent,
    position: Position,
    turn: Side,
    clock: Clock,
    move_history: Vec<MoveRecord>,
    last_move: Option<LastMove>,
    outcome: Option<Outcome>,
}

impl GameSession {
    pub fn new(
        id: impl Into<String>,
        player_id: impl Into<String>,
        player_side: Side,
        opponent: Opponent,
        clock_seconds: u32,
    ) -> Self {
        Self {
            id: id.into(),
            player_id: player_id.into(),
            player_side,
            status: SessionStatus::Waiting,
            opponent,
            position: Position::initial(),
            turn: Side::White,
            clock: Clock::new(clock_seconds),
            move_history: Vec::new(),
            last_move: None,
            outcome: None,
        }
    }

    /// Build a session view for `player_id` from an authoritative snapshot.
    pub fn from_snapshot(
        snapshot: &GameSnapshot,
        player_id: impl Into<String>,
        clock_seconds: u32,
    ) -> Result<Self, SessionError> {
        let player_id = player_id.into();
        let player_side = if snapshot.black_player.as_deref() == Some(player_id.as_str()) {
            Side::Black
        } else {
            Side::White
        };
        let opponent = Opponent::from_wire(snapshot.opponent_type, snapshot.bot_level);
        let mut session = Self::new(
            snapshot.id.clone(),
            player_id,
            player_side,
            opponent,
            clock_seconds,
        );
        session.apply_snapshot(snapshot)?;
        Ok(session)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn player_id(&self) -> &str {
        &self.player_id
    }

    pub fn player_side(&self) -> Side {
        self.player_side
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn opponent(&self) -> Opponent {
        self.opponent
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn fen(&self) -> String {
        self.position.fen()
    }

    pub fn turn(&self) -> Side {
        self.turn
    }

    pub fn clock(&self) -> Clock {
        self.clock
    }

    pub fn move_history(&self) -> &[MoveRecord] {
        &self.move_history
    }

    pub fn last_move(&self) -> Option<&LastMove> {
        self.last_move.as_ref()
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    /// Monotonic sequence number: the number of plies applied.
    pub fn seq(&self) -> usize {
        self.move_history.len()
    }

    pub fn is_finished(&self) -> bool {
        self.status == SessionStatus::Finished
    }

    pub fn is_players_turn(&self) -> bool {
        !self.is_finished() && self.turn == self.player_side
    }

    /// WAITING -> ACTIVE. No effect in any other state.
    pub fn activate(&mut self) {
        if self.status == SessionStatus::Waiting {
            self.status = SessionStatus::Active;
        }
    }

    /// Replace local state with an authoritative snapshot.
    ///
    /// Snapshots behind the local sequence number, or that would move the
    /// status backwards, are reported as [`SnapshotEffect::Stale`]. A
    /// FINISHED snapshot is always taken, whatever its history length.
    pub fn apply_snapshot(&mut self, snapshot: &GameSnapshot) -> Result<SnapshotEffect, SessionError> {
        if self.is_finished() {
            return Ok(SnapshotEffect::Ignored);
        }

        let status = snapshot.status.unwrap_or(self.status);
        if status < self.status {
            return Ok(SnapshotEffect::Stale);
        }
        if let Some(history) = &snapshot.move_history {
            if status != SessionStatus::Finished && history.len() < self.seq() {
                return Ok(SnapshotEffect::Stale);
            }
        }

        let position = snapshot
            .fen
            .as_deref()
            .map(Position::from_fen)
            .transpose()
            .map_err(|e| SessionError::BadSnapshot(e.to_string()))?;

        if let Some(position) = position {
            self.position = position;
            self.turn = position.side_to_move();
        }
        if let Some(history) = &snapshot.move_history {
            self.move_history = history.clone();
        }
        if let Some(turn) = snapshot.current_turn {
            self.turn = turn;
        }
        if let Some(seconds) = snapshot.white_time {
            self.clock.white_seconds = seconds;
        }
        if let Some(seconds) = snapshot.black_time {
            self.clock.black_seconds = seconds;
        }
        self.last_move = snapshot
            .last_move
            .as_deref()
            .and_then(LastMove::from_uci)
            .or_else(|| self.move_history.last().and_then(MoveRecord::squares));
        self.status = status;

        if status == SessionStatus::Finished {
            self.outcome = Some(self.resolve_outcome(snapshot));
            return Ok(SnapshotEffect::Finished);
        }
        Ok(SnapshotEffect::Applied)
    }

    /// Clock and turn only. Returns false once the session is finished.
    pub fn apply_timer(&mut self, update: &TimerUpdate) -> bool {
        if self.is_finished() {
            return false;
        }
        self.clock.white_seconds = update.white_time;
        self.clock.black_seconds = update.black_time;
        if let Some(turn) = update.current_turn {
            self.turn = turn;
        }
        true
    }

    /// Check a move by the local player without applying it.
    pub fn validate_player_move(
        &self,
        from: &str,
        to: &str,
        promotion: Option<&str>,
    ) -> Result<ChessMove, SessionError> {
        if self.is_finished() {
            return Err(SessionError::Finished);
        }
        if self.turn != self.player_side {
            return Err(SessionError::NotYourTurn);
        }
        Ok(game::find_move(&self.position, from, to, promotion)?)
    }

    /// Apply a move locally (bot games). The move must be legal in the
    /// current position.
    pub fn apply_local_move(&mut self, mv: ChessMove) -> Result<MoveOutcome, SessionError> {
        if self.is_finished() {
            return Err(SessionError::Finished);
        }
        let outcome = game::apply_move(&self.position, mv)?;
        self.move_history.push(MoveRecord::new(outcome.san.clone(), mv));
        self.position = outcome.position;
        self.turn = outcome.position.side_to_move();
        self.last_move = LastMove::from_uci(&mv.to_string());
        self.activate();
        Ok(outcome)
    }

    /// Charge elapsed time to the side on move only; the waiting side's
    /// clock is left alone. Returns the mover's remaining time, or `None`
    /// when the clock is not running.
    pub fn tick(&mut self, seconds: u32) -> Option<u32> {
        if self.status != SessionStatus::Active {
            return None;
        }
        Some(self.clock.tick(self.turn, seconds))
    }

    /// Mark the session finished. Returns false if it already was.
    pub fn finish(&mut self, outcome: Outcome) -> bool {
        if self.is_finished() {
            return false;
        }
        self.status = SessionStatus::Finished;
        self.outcome = Some(outcome);
        true
    }

    /// Outcome for the local player from a terminal snapshot.
    fn resolve_outcome(&self, snapshot: &GameSnapshot) -> Outcome {
        let result = snapshot.result.unwrap_or_else(|| {
            if snapshot.winner.as_deref() == Some(self.player_id.as_str()) {
                MatchResult::Win
            } else if snapshot.loser.as_deref() == Some(self.player_id.as_str()) {
                MatchResult::Lose
            } else {
                MatchResult::Draw
            }
        });
        Outcome {
            result,
            reason: snapshot
                .ended_reason
                .clone()
                .unwrap_or_else(|| "finished".to_string()),
            winner_id: snapshot.winner.clone(),
            loser_id: snapshot.loser.clone(),
            coins_earned: snapshot
                .coins_earned
                .unwrap_or_else(|| coins_for(self.opponent, result)),
        }
    }

    /// Verify the structural invariants: turn parity and that the position
    /// is reproduced by replaying the history.
    pub fn check_invariants(&self) -> Result<(), SessionError> {
        let white_next = self.move_history.len() % 2 == 0;
        if white_next != (self.turn == Side::White) {
            return Err(SessionError::Invariant(format!(
                "{} moves played but {} is on move",
                self.move_history.len(),
                self.turn.as_str()
            )));
        }
        if let Some(last) = self.move_history.len().checked_sub(1) {
            let replayed = crate::replay::position_after(&self.move_history, last)
                .map_err(|e| SessionError::Invariant(e.to_string()))?;
            if replayed != self.position {
                return Err(SessionError::Invariant(
                    "position does not match move history".to_string(),
                ));
            }
        }
        Ok(())
    }
}
