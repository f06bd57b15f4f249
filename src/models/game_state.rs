use std::time::{Duration, Instant};

use crate::bot::BotLevel;
use crate::error::ServerError;
use crate::game::{apply_move, find_move, terminal_state, Position, Side, TerminalState};
use crate::models::messages::{GameSnapshot, MoveRecord, TimerUpdate};
use crate::models::rewards::coins_for;
use crate::models::session::{MatchResult, Opponent, SessionStatus};

/// Server-side state of one game.
///
/// Clocks only run for games between two players. Bot games are played on
/// the client, so the server records how they start and how they end.
#[derive(Debug, Clone)]
pub struct GameState {
    pub id: String,
    pub position: Position,
    pub white_player: String,
    pub black_player: Option<String>,
    pub opponent: Opponent,
    pub status: SessionStatus,
    pub move_history: Vec<MoveRecord>,
    pub last_move: Option<String>,
    pub white_time_ms: u64,
    pub black_time_ms: u64,
    pub last_move_time: Option<Instant>,
    pub winner: Option<String>,
    pub loser: Option<String>,
    pub ended_reason: Option<String>,
    /// Coins have been paid out.
    pub settled: bool,
}

impl GameState {
    pub fn new_pvp(id: String, white: String, black: String, clock_seconds: u32, now: Instant) -> Self {
        let mut state = Self::blank(id, white, Some(black), Opponent::Human, clock_seconds);
        state.last_move_time = Some(now);
        state
    }

    pub fn new_bot(id: String, player: String, level: BotLevel, clock_seconds: u32) -> Self {
        Self::blank(id, player, None, Opponent::Bot(level), clock_seconds)
    }

    fn blank(
        id: String,
        white_player: String,
        black_player: Option<String>,
        opponent: Opponent,
        clock_seconds: u32,
    ) -> Self {
        let clock_ms = u64::from(clock_seconds) * 1000;
        Self {
            id,
            position: Position::initial(),
            white_player,
            black_player,
            opponent,
            status: SessionStatus::Active,
            move_history: Vec::new(),
            last_move: None,
            white_time_ms: clock_ms,
            black_time_ms: clock_ms,
            last_move_time: None,
            winner: None,
            loser: None,
            ended_reason: None,
            settled: false,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status == SessionStatus::Finished
    }

    pub fn side_of(&self, player: &str) -> Option<Side> {
        if self.white_player == player {
            Some(Side::White)
        } else if self.black_player.as_deref() == Some(player) {
            Some(Side::Black)
        } else {
            None
        }
    }

    pub fn player_on(&self, side: Side) -> Option<&str> {
        match side {
            Side::White => Some(self.white_player.as_str()),
            Side::Black => self.black_player.as_deref(),
        }
    }

    /// Milliseconds left for `side`, counting the running clock of the side
    /// on move.
    pub fn remaining_ms(&self, side: Side, now: Instant) -> u64 {
        let stored = match side {
            Side::White => self.white_time_ms,
            Side::Black => self.black_time_ms,
        };
        match self.last_move_time {
            Some(since) if !self.is_finished() && self.position.side_to_move() == side => {
                stored.saturating_sub(elapsed_ms(since, now))
            }
            _ => stored,
        }
    }

    fn set_remaining(&mut self, side: Side, ms: u64) {
        match side {
            Side::White => self.white_time_ms = ms,
            Side::Black => self.black_time_ms = ms,
        }
    }

    pub fn apply_move(
        &mut self,
        player: &str,
        from: &str,
        to: &str,
        promotion: Option<&str>,
        now: Instant,
    ) -> Result<(), ServerError> {
        if self.check_flag(now) || self.is_finished() {
            return Err(ServerError::GameFinished);
        }
        let side = self.side_of(player).ok_or(ServerError::NotInGame)?;
        if side != self.position.side_to_move() {
            return Err(ServerError::NotYourTurn);
        }

        let mv = find_move(&self.position, from, to, promotion)?;
        let outcome = apply_move(&self.position, mv)?;

        if self.last_move_time.is_some() {
            let left = self.remaining_ms(side, now);
            self.set_remaining(side, left);
            self.last_move_time = Some(now);
        }
        self.position = outcome.position;
        self.move_history.push(MoveRecord::new(outcome.san, mv));
        self.last_move = Some(mv.to_string());

        match terminal_state(&self.position) {
            Some(TerminalState::Checkmate { winner }) => self.finish(Some(winner), "checkmate"),
            Some(state) => self.finish(None, state.reason()),
            None => {}
        }
        Ok(())
    }

    /// Ends the game on time if the side on move has run out. Returns true
    /// only for the call that ends it.
    pub fn check_flag(&mut self, now: Instant) -> bool {
        if self.is_finished() || self.last_move_time.is_none() {
            return false;
        }
        let on_move = self.position.side_to_move();
        if self.remaining_ms(on_move, now) > 0 {
            return false;
        }
        self.set_remaining(on_move, 0);
        self.finish(Some(on_move.opposite()), "timeout");
        true
    }

    pub fn resign(&mut self, player: &str) -> Result<(), ServerError> {
        if self.is_finished() {
            return Err(ServerError::GameFinished);
        }
        let side = self.side_of(player).ok_or(ServerError::NotInGame)?;
        self.finish(Some(side.opposite()), "resign");
        Ok(())
    }

    /// Result reported by the client for a bot game.
    pub fn record_result(&mut self, player: &str, result: MatchResult) -> Result<(), ServerError> {
        if self.is_finished() {
            return Err(ServerError::GameFinished);
        }
        if self.side_of(player).is_none() {
            return Err(ServerError::NotInGame);
        }
        self.status = SessionStatus::Finished;
        self.last_move_time = None;
        self.ended_reason = Some("reported".to_string());
        match result {
            MatchResult::Win => self.winner = Some(player.to_string()),
            MatchResult::Lose => self.loser = Some(player.to_string()),
            MatchResult::Draw => {}
        }
        Ok(())
    }

    fn finish(&mut self, winner: Option<Side>, reason: &str) {
        self.status = SessionStatus::Finished;
        self.last_move_time = None;
        self.ended_reason = Some(reason.to_string());
        if let Some(side) = winner {
            self.winner = self.player_on(side).map(str::to_string);
            self.loser = self.player_on(side.opposite()).map(str::to_string);
        }
    }

    pub fn result_for(&self, player: &str) -> Option<MatchResult> {
        if !self.is_finished() {
            return None;
        }
        Some(if self.winner.as_deref() == Some(player) {
            MatchResult::Win
        } else if self.loser.as_deref() == Some(player) {
            MatchResult::Lose
        } else {
            MatchResult::Draw
        })
    }

    pub fn coins_for(&self, player: &str) -> u32 {
        self.result_for(player)
            .map_or(0, |result| coins_for(self.opponent, result))
    }

    /// Participants and what each is owed. Empty until the game is over.
    pub fn payouts(&self) -> Vec<(String, u32)> {
        if !self.is_finished() {
            return Vec::new();
        }
        [Some(self.white_player.as_str()), self.black_player.as_deref()]
            .into_iter()
            .flatten()
            .map(|player| (player.to_string(), self.coins_for(player)))
            .collect()
    }

    pub fn timer_update(&self, now: Instant) -> TimerUpdate {
        TimerUpdate {
            white_time: to_seconds(self.remaining_ms(Side::White, now)),
            black_time: to_seconds(self.remaining_ms(Side::Black, now)),
            current_turn: Some(self.position.side_to_move()),
        }
    }

    pub fn snapshot(&self, now: Instant) -> GameSnapshot {
        let timer = self.timer_update(now);
        GameSnapshot {
            id: self.id.clone(),
            status: Some(self.status),
            fen: Some(self.position.fen()),
            move_history: Some(self.move_history.clone()),
            last_move: self.last_move.clone(),
            white_time: Some(timer.white_time),
            black_time: Some(timer.black_time),
            current_turn: timer.current_turn,
            white_player: Some(self.white_player.clone()),
            black_player: self.black_player.clone(),
            opponent_type: Some(self.opponent.kind()),
            bot_level: self.opponent.bot_level(),
            result: None,
            ended_reason: self.ended_reason.clone(),
            winner: self.winner.clone(),
            loser: self.loser.clone(),
            coins_earned: None,
        }
    }

    /// Snapshot as seen by `player`, with their result and reward filled in.
    pub fn snapshot_for(&self, player: &str, now: Instant) -> GameSnapshot {
        let mut snapshot = self.snapshot(now);
        snapshot.result = self.result_for(player);
        if snapshot.result.is_some() {
            snapshot.coins_earned = Some(self.coins_for(player));
        }
        snapshot
    }
}

fn elapsed_ms(since: Instant, now: Instant) -> u64 {
    let elapsed = now.saturating_duration_since(since);
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

fn to_seconds(ms: u64) -> u32 {
    u32::try_from(Duration::from_millis(ms).as_secs()).unwrap_or(u32::MAX)
}
