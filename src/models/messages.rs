use actix::Message;
use chess::ChessMove;
use serde::{Deserialize, Serialize};

use crate::bot::BotLevel;
use crate::error::RulesError;
use crate::game::{san, Position, Side};
use crate::models::invite::Invite;
use crate::models::session::{MatchResult, OpponentKind, SessionStatus};

/// One history entry: SAN plus the coordinate pair when known.
///
/// On the wire either `{"san": "e4", "uci": "e2e4"}` or a bare `"e4"`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(from = "WireMoveRecord")]
pub struct MoveRecord {
    pub san: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uci: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireMoveRecord {
    San(String),
    Full {
        san: String,
        #[serde(default)]
        uci: Option<String>,
    },
}

impl From<WireMoveRecord> for MoveRecord {
    fn from(wire: WireMoveRecord) -> Self {
        match wire {
            WireMoveRecord::San(san) => MoveRecord { san, uci: None },
            WireMoveRecord::Full { san, uci } => MoveRecord { san, uci },
        }
    }
}

impl MoveRecord {
    pub fn new(san: impl Into<String>, mv: ChessMove) -> Self {
        Self {
            san: san.into(),
            uci: Some(mv.to_string()),
        }
    }

    /// Resolve against `position`, preferring coordinates over SAN.
    pub fn resolve(&self, position: &Position) -> Result<ChessMove, RulesError> {
        match &self.uci {
            Some(uci) => crate::game::parse_uci(position, uci),
            None => san::resolve(position, &self.san),
        }
    }

    pub fn squares(&self) -> Option<LastMove> {
        self.uci.as_deref().and_then(LastMove::from_uci)
    }
}

/// Last move information
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LastMove {
    pub from: String,
    pub to: String,
}

impl LastMove {
    pub fn from_uci(uci: &str) -> Option<Self> {
        Some(Self {
            from: uci.get(0..2)?.to_string(),
            to: uci.get(2..4)?.to_string(),
        })
    }
}

/// Full authoritative copy of a game, as served by the state endpoint and
/// carried by `game_state`, `move` and `game_over` frames.
///
/// Fields are optional because incremental frames may omit what did not
/// change.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct GameSnapshot {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<SessionStatus>,
    #[serde(default, alias = "fen_position", skip_serializing_if = "Option::is_none")]
    pub fen: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub move_history: Option<Vec<MoveRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_move: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub white_time: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub black_time: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_turn: Option<Side>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub white_player: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub black_player: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opponent_type: Option<OpponentKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_level: Option<BotLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<MatchResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_reason: Option<String>,
    #[serde(default, alias = "winner_id", skip_serializing_if = "Option::is_none")]
    pub winner: Option<String>,
    #[serde(default, alias = "loser_id", skip_serializing_if = "Option::is_none")]
    pub loser: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coins_earned: Option<u32>,
}

/// Clock-only update.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerUpdate {
    pub white_time: u32,
    pub black_time: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_turn: Option<Side>,
}

/// Error frame carrying a reason code such as `game_not_found`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ErrorFrame {
    pub message: String,
}

/// Message sent from server to client
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    GameState(GameSnapshot),
    Move(GameSnapshot),
    TimerUpdate(TimerUpdate),
    GameOver(GameSnapshot),
    Error(ErrorFrame),
    #[serde(rename = "resign-ack")]
    ResignAck,
}

impl ServerFrame {
    pub fn error(message: impl Into<String>) -> Self {
        ServerFrame::Error(ErrorFrame {
            message: message.into(),
        })
    }
}

/// Message sent from client to server
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Move {
        from: String,
        to: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        promotion: Option<String>,
    },
    Resign,
}

/// Body of the apply-move endpoint.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MoveRequest {
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promotion: Option<String>,
}

/// Body of the create-session endpoint.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StartRequest {
    pub opponent_type: OpponentKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_level: Option<BotLevel>,
}

/// Body of the finish-session endpoint.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FinishRequest {
    pub game_id: String,
    pub result: MatchResult,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinishReceipt {
    pub coins_earned: u32,
}

/// `{"game": {...}}` wrapper used by the session endpoints.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GameEnvelope {
    pub game: GameSnapshot,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct InviteLists {
    #[serde(default)]
    pub incoming: Vec<Invite>,
    #[serde(default)]
    pub outgoing: Vec<Invite>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct InviteRequest {
    pub to_player_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RespondInviteRequest {
    pub invite_id: String,
    pub accept: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CancelInviteRequest {
    pub invite_id: String,
}

/// Reply to respond-invite; `game` is present once accepted.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct InviteResponse {
    pub invite: Invite,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game: Option<GameSnapshot>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LoginRequest {
    pub username: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub player_id: String,
    pub access: String,
    pub refresh: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RefreshRequest {
    pub refresh: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RefreshResponse {
    pub access: String,
}

/// Error body returned by every failing endpoint.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
}

/// Message type for WebSocket communication
#[derive(Message)]
#[rtype(result = "()")]
pub struct ChessWebSocketMessage(pub String);
