//! Connection mode state machine.
//!
//! ```text
//!   RECONNECTING --opened--> LIVE
//!   LIVE --transient/auth failure--> RECONNECTING
//!   LIVE|RECONNECTING --session invalid or cap exceeded--> POLLING
//! ```
//!
//! POLLING is final for the lifetime of a session view.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConnectionMode {
    Live,
    Reconnecting,
    Polling,
}

/// Class of a channel failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Network drop, close or server hiccup; worth a reconnect.
    Transient,
    /// Credential rejected; reconnect only with a refreshed token.
    Auth,
    /// The game is gone or the player is not part of it.
    SessionInvalid,
}

/// What the owner of the state machine should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Reconnect {
        attempt: u32,
        delay: Duration,
        require_fresh_token: bool,
    },
    DegradeToPolling,
    Ignore,
}

/// Map an `error` frame reason to a failure class. Anything unrecognised is
/// a gameplay message, not a channel failure.
pub fn classify_error(reason: &str) -> Option<FailureKind> {
    match reason.trim().to_lowercase().replace(' ', "_").as_str() {
        "game_not_found" | "not_in_game" => Some(FailureKind::SessionInvalid),
        "auth_failed" | "token_expired" | "unauthorized" => Some(FailureKind::Auth),
        "connection_lost" | "timeout" | "internal_error" => Some(FailureKind::Transient),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionState {
    mode: ConnectionMode,
    reconnect_attempts: u32,
    last_error: Option<String>,
    reconnect_cap: u32,
    backoff_step: Duration,
}

impl ConnectionState {
    /// A fresh view starts out trying to go live.
    pub fn new(reconnect_cap: u32, backoff_step: Duration) -> Self {
        Self {
            mode: ConnectionMode::Reconnecting,
            reconnect_attempts: 0,
            last_error: None,
            reconnect_cap,
            backoff_step,
        }
    }

    pub fn mode(&self) -> ConnectionMode {
        self.mode
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_polling(&self) -> bool {
        self.mode == ConnectionMode::Polling
    }

    /// The channel opened and the server accepted the handshake. Returns
    /// false, leaving the state untouched, once polling.
    pub fn on_opened(&mut self) -> bool {
        if self.is_polling() {
            return false;
        }
        self.mode = ConnectionMode::Live;
        self.reconnect_attempts = 0;
        self.last_error = None;
        true
    }

    pub fn on_failure(&mut self, kind: FailureKind, reason: impl Into<String>) -> Directive {
        if self.is_polling() {
            return Directive::Ignore;
        }
        self.last_error = Some(reason.into());

        if kind == FailureKind::SessionInvalid || self.reconnect_attempts >= self.reconnect_cap {
            self.mode = ConnectionMode::Polling;
            return Directive::DegradeToPolling;
        }

        self.reconnect_attempts += 1;
        self.mode = ConnectionMode::Reconnecting;
        Directive::Reconnect {
            attempt: self.reconnect_attempts,
            delay: self.backoff_step * self.reconnect_attempts,
            require_fresh_token: kind == FailureKind::Auth,
        }
    }

    /// Give up on the live channel, e.g. when no credential is available.
    pub fn degrade(&mut self, reason: impl Into<String>) -> bool {
        if self.is_polling() {
            return false;
        }
        self.last_error = Some(reason.into());
        self.mode = ConnectionMode::Polling;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> ConnectionState {
        ConnectionState::new(2, Duration::from_millis(500))
    }

    #[test]
    fn third_consecutive_failure_degrades_to_polling() {
        let mut state = state();
        assert_eq!(
            state.on_failure(FailureKind::Transient, "close"),
            Directive::Reconnect {
                attempt: 1,
                delay: Duration::from_millis(500),
                require_fresh_token: false
            }
        );
        assert_eq!(
            state.on_failure(FailureKind::Transient, "close"),
            Directive::Reconnect {
                attempt: 2,
                delay: Duration::from_millis(1000),
                require_fresh_token: false
            }
        );
        assert_eq!(
            state.on_failure(FailureKind::Transient, "close"),
            Directive::DegradeToPolling
        );
        assert_eq!(state.mode(), ConnectionMode::Polling);
    }

    #[test]
    fn polling_is_final() {
        let mut state = state();
        state.on_failure(FailureKind::SessionInvalid, "game_not_found");
        assert!(!state.on_opened());
        assert_eq!(state.on_failure(FailureKind::Transient, "close"), Directive::Ignore);
        assert!(!state.degrade("again"));
        assert_eq!(state.mode(), ConnectionMode::Polling);
        assert_eq!(state.last_error(), Some("game_not_found"));
    }

    #[test]
    fn successful_open_resets_the_attempt_counter() {
        let mut state = state();
        state.on_failure(FailureKind::Transient, "close");
        state.on_failure(FailureKind::Transient, "close");
        assert!(state.on_opened());
        assert_eq!(state.mode(), ConnectionMode::Live);
        assert_eq!(state.reconnect_attempts(), 0);
        assert!(matches!(
            state.on_failure(FailureKind::Auth, "auth_failed"),
            Directive::Reconnect {
                attempt: 1,
                require_fresh_token: true,
                ..
            }
        ));
    }

    #[test]
    fn classifies_reason_codes() {
        assert_eq!(classify_error("game_not_found"), Some(FailureKind::SessionInvalid));
        assert_eq!(classify_error("Not in game"), Some(FailureKind::SessionInvalid));
        assert_eq!(classify_error("auth_failed"), Some(FailureKind::Auth));
        assert_eq!(classify_error("connection_lost"), Some(FailureKind::Transient));
        assert_eq!(classify_error("Not your turn"), None);
    }
}
