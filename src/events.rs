//! Messages accepted by the session actors and the events they publish.

use actix::Message;

use crate::error::SessionError;
use crate::models::session::{Clock, GameSession, Outcome};
use crate::game::Side;
use crate::sync::ConnectionMode;

/// Local player move, validated before anything leaves the process.
#[derive(Message, Debug, Clone, PartialEq, Eq)]
#[rtype(result = "Result<(), SessionError>")]
pub struct SubmitMove {
    pub from: String,
    pub to: String,
    pub promotion: Option<String>,
}

impl SubmitMove {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            promotion: None,
        }
    }

    pub fn promoting(mut self, piece: impl Into<String>) -> Self {
        self.promotion = Some(piece.into());
        self
    }
}

#[derive(Message, Debug, Clone, Copy)]
#[rtype(result = "()")]
pub struct Resign;

/// Tear the view down: timers, channel and bot move are all cancelled.
#[derive(Message, Debug, Clone, Copy)]
#[rtype(result = "()")]
pub struct CloseView;

/// Copy of the session as currently held by the view.
#[derive(Message, Debug, Clone, Copy)]
#[rtype(result = "GameSession")]
pub struct CurrentSession;

/// Outbound notifications of a session view.
#[derive(Message, Debug, Clone, PartialEq)]
#[rtype(result = "()")]
pub enum SessionEvent {
    Updated(Box<GameSession>),
    Clock { clock: Clock, turn: Side },
    Status(String),
    Mode(ConnectionMode),
    /// Fired once per session.
    GameOver(Outcome),
    BalanceChanged { coins_earned: u32 },
}

pub fn turn_status(session: &GameSession) -> &'static str {
    if session.is_finished() {
        "Game over"
    } else if session.is_players_turn() {
        "Your move"
    } else {
        "Opponent's move"
    }
}
