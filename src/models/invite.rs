use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::InviteError;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum InviteStatus {
    Pending,
    Accepted,
    Declined,
    Cancelled,
}

/// A challenge from one player to another.
///
/// A PENDING invite moves to exactly one terminal state. Only the recipient
/// may accept or decline and only the sender may cancel.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Invite {
    pub id: String,
    #[serde(alias = "from_player")]
    pub from_id: String,
    #[serde(alias = "to_player")]
    pub to_id: String,
    pub status: InviteStatus,
    #[serde(default, alias = "game", skip_serializing_if = "Option::is_none")]
    pub game_id: Option<String>,
    #[serde(default, alias = "from_player_name", skip_serializing_if = "Option::is_none")]
    pub from_name: Option<String>,
    #[serde(default, alias = "to_player_name", skip_serializing_if = "Option::is_none")]
    pub to_name: Option<String>,
}

impl Invite {
    pub fn new(from_id: impl Into<String>, to_id: impl Into<String>) -> Result<Self, InviteError> {
        let from_id = from_id.into();
        let to_id = to_id.into();
        if from_id == to_id {
            return Err(InviteError::SelfInvite);
        }
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            from_id,
            to_id,
            status: InviteStatus::Pending,
            game_id: None,
            from_name: None,
            to_name: None,
        })
    }

    pub fn is_pending(&self) -> bool {
        self.status == InviteStatus::Pending
    }

    /// Accepted and carrying a game the player can still enter.
    pub fn is_joinable(&self) -> bool {
        self.status == InviteStatus::Accepted && self.game_id.is_some()
    }

    fn ensure_pending(&self) -> Result<(), InviteError> {
        if self.is_pending() {
            Ok(())
        } else {
            Err(InviteError::NotPending(self.status))
        }
    }

    pub fn accept(&mut self, by: &str, game_id: impl Into<String>) -> Result<(), InviteError> {
        self.ensure_pending()?;
        if by != self.to_id {
            return Err(InviteError::NotRecipient);
        }
        self.status = InviteStatus::Accepted;
        self.game_id = Some(game_id.into());
        Ok(())
    }

    pub fn decline(&mut self, by: &str) -> Result<(), InviteError> {
        self.ensure_pending()?;
        if by != self.to_id {
            return Err(InviteError::NotRecipient);
        }
        self.status = InviteStatus::Declined;
        Ok(())
    }

    pub fn cancel(&mut self, by: &str) -> Result<(), InviteError> {
        self.ensure_pending()?;
        if by != self.from_id {
            return Err(InviteError::NotSender);
        }
        self.status = InviteStatus::Cancelled;
        Ok(())
    }
}

/// Entry of the online opponents list.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct OnlinePlayer {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub has_pending_invite: bool,
}
