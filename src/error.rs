//! Error types shared across the engine.
//!
//! Every failure path in the client resolves into one of these enums, and
//! each variant renders a human-readable message that doubles as the status
//! string shown to the player.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};

use crate::models::invite::InviteStatus;
use crate::models::messages::ErrorBody;

/// Rejections from the rules adapter. Never raised for a legal move.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RulesError {
    #[error("Invalid position: {0}")]
    InvalidFen(String),

    #[error("Invalid square: {0}")]
    InvalidSquare(String),

    #[error("Unknown promotion piece: {0}")]
    InvalidPromotion(String),

    #[error("Illegal move: {0}")]
    IllegalMove(String),

    #[error("Unrecognised move notation: {0}")]
    UnknownNotation(String),
}

/// Bot search failures. These are fatal for the turn and never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BotError {
    #[error("No legal moves available")]
    NoLegalMoves,
}

/// Errors raised while mutating a game session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Rules(#[from] RulesError),

    #[error("Game is already over")]
    Finished,

    #[error("Not your turn")]
    NotYourTurn,

    #[error("A move is already being submitted")]
    SubmissionPending,

    #[error("Snapshot rejected: {0}")]
    BadSnapshot(String),

    #[error("Session invariant violated: {0}")]
    Invariant(String),

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Failures of the request/response endpoints.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{message}")]
    Status { code: u16, message: String },

    #[error("Unexpected response: {0}")]
    Decode(String),
}

/// Failures opening or using the live channel.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("Could not connect: {0}")]
    Connect(String),

    #[error("Channel closed")]
    Closed,
}

/// Invite lifecycle violations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InviteError {
    #[error("Invite is no longer pending ({0:?})")]
    NotPending(InviteStatus),

    #[error("Only the invited player can respond")]
    NotRecipient,

    #[error("Only the sender can cancel an invite")]
    NotSender,

    #[error("Cannot invite yourself")]
    SelfInvite,
}

/// Matchmaking errors.
#[derive(Debug, thiserror::Error)]
pub enum LobbyError {
    #[error("An invite to {0} is already pending")]
    AlreadyInvited(String),

    #[error("No accepted game to join")]
    NothingToJoin,

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Replay navigation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReplayError {
    #[error("Move index {index} is out of range (history has {len} moves)")]
    OutOfRange { index: usize, len: usize },

    #[error("Replay is only available once the game is over")]
    NotFinished,

    #[error("Move {index} cannot be replayed: {source}")]
    Corrupt { index: usize, source: RulesError },
}

/// Failures of the reference server. The message is the reason code sent to
/// clients, both in `{"error": ...}` bodies and in `error` frames.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("auth_failed")]
    AuthFailed,

    #[error("game_not_found")]
    GameNotFound,

    #[error("not_in_game")]
    NotInGame,

    #[error("not_your_turn")]
    NotYourTurn,

    #[error("illegal_move")]
    IllegalMove(#[from] RulesError),

    #[error("game_finished")]
    GameFinished,

    #[error("player_not_found")]
    PlayerNotFound,

    #[error("invite_not_found")]
    InviteNotFound,

    #[error("invite_pending")]
    InvitePending,

    #[error("{0}")]
    Invite(#[from] InviteError),

    #[error("{0}")]
    BadRequest(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServerError::AuthFailed => StatusCode::UNAUTHORIZED,
            ServerError::GameNotFound | ServerError::PlayerNotFound | ServerError::InviteNotFound => {
                StatusCode::NOT_FOUND
            }
            ServerError::NotInGame
            | ServerError::Invite(InviteError::NotRecipient)
            | ServerError::Invite(InviteError::NotSender) => StatusCode::FORBIDDEN,
            ServerError::InvitePending
            | ServerError::GameFinished
            | ServerError::Invite(InviteError::NotPending(_)) => StatusCode::CONFLICT,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: Some(self.to_string()),
        })
    }
}
