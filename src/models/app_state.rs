use std::collections::HashMap;
use std::time::Instant;

use actix::Addr;
use log::{info, warn};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::models::invite::OnlinePlayer;
use crate::models::messages::{ChessWebSocketMessage, ServerFrame, TokenPair};
use crate::models::{GameState, Invite};
use crate::websocket::ChessWebSocket;

/// A registered player.
#[derive(Debug, Clone)]
pub struct Player {
    pub id: String,
    pub display_name: String,
    pub coins: u32,
    pub last_seen: Instant,
}

/// Application state shared between connections
pub struct AppState {
    pub config: ServerConfig,
    pub games: Mutex<HashMap<String, GameState>>,
    pub invites: Mutex<HashMap<String, Invite>>,
    pub players: Mutex<HashMap<String, Player>>,
    /// Access token to player id.
    pub tokens: Mutex<HashMap<String, String>>,
    /// Refresh token to player id.
    pub refresh_tokens: Mutex<HashMap<String, String>>,
    /// Game id to the connection ids watching it.
    pub connections: Mutex<HashMap<String, Vec<String>>>,
    pub sessions: Mutex<HashMap<String, Addr<ChessWebSocket>>>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            games: Mutex::new(HashMap::new()),
            invites: Mutex::new(HashMap::new()),
            players: Mutex::new(HashMap::new()),
            tokens: Mutex::new(HashMap::new()),
            refresh_tokens: Mutex::new(HashMap::new()),
            connections: Mutex::new(HashMap::new()),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Logs `username` in, registering them on first sight, and issues a
    /// fresh token pair.
    pub fn login(&self, username: &str) -> Result<TokenPair, ServerError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(ServerError::BadRequest("username is required".to_string()));
        }

        let player_id = {
            let mut players = self.players.lock();
            let existing = players
                .values()
                .find(|p| p.display_name == username)
                .map(|p| p.id.clone());
            match existing {
                Some(id) => id,
                None => {
                    let id = Uuid::new_v4().to_string();
                    info!("Registered player {} as {}", username, id);
                    players.insert(
                        id.clone(),
                        Player {
                            id: id.clone(),
                            display_name: username.to_string(),
                            coins: 0,
                            last_seen: Instant::now(),
                        },
                    );
                    id
                }
            }
        };

        let access = Uuid::new_v4().to_string();
        let refresh = Uuid::new_v4().to_string();
        self.tokens.lock().insert(access.clone(), player_id.clone());
        self.refresh_tokens.lock().insert(refresh.clone(), player_id.clone());
        self.touch(&player_id);

        Ok(TokenPair {
            player_id,
            access,
            refresh,
        })
    }

    /// Issues a new access token for a known refresh token.
    pub fn refresh(&self, refresh: &str) -> Result<String, ServerError> {
        let player_id = self
            .refresh_tokens
            .lock()
            .get(refresh)
            .cloned()
            .ok_or(ServerError::AuthFailed)?;
        let access = Uuid::new_v4().to_string();
        self.tokens.lock().insert(access.clone(), player_id);
        Ok(access)
    }

    /// Resolves an access token and marks its player as seen.
    pub fn player_for(&self, token: &str) -> Result<String, ServerError> {
        let player_id = self
            .tokens
            .lock()
            .get(token)
            .cloned()
            .ok_or(ServerError::AuthFailed)?;
        self.touch(&player_id);
        Ok(player_id)
    }

    fn touch(&self, player_id: &str) {
        if let Some(player) = self.players.lock().get_mut(player_id) {
            player.last_seen = Instant::now();
        }
    }

    pub fn display_name(&self, player_id: &str) -> Option<String> {
        self.players
            .lock()
            .get(player_id)
            .map(|p| p.display_name.clone())
    }

    pub fn balance(&self, player_id: &str) -> u32 {
        self.players.lock().get(player_id).map_or(0, |p| p.coins)
    }

    /// Players seen recently, other than `viewer`, flagged when `viewer`
    /// already has a pending invite out to them.
    pub fn online_players(&self, viewer: &str) -> Vec<OnlinePlayer> {
        let now = Instant::now();
        let window = self.config.online_window;
        let pending_to: Vec<String> = self
            .invites
            .lock()
            .values()
            .filter(|i| i.from_id == viewer && i.is_pending())
            .map(|i| i.to_id.clone())
            .collect();

        let mut online: Vec<OnlinePlayer> = self
            .players
            .lock()
            .values()
            .filter(|p| p.id != viewer && now.saturating_duration_since(p.last_seen) <= window)
            .map(|p| OnlinePlayer {
                id: p.id.clone(),
                display_name: p.display_name.clone(),
                has_pending_invite: pending_to.contains(&p.id),
            })
            .collect();
        online.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        online
    }

    /// Pays out a finished game exactly once.
    pub fn settle(&self, game: &mut GameState) {
        if game.settled || !game.is_finished() {
            return;
        }
        game.settled = true;
        let mut players = self.players.lock();
        for (player_id, coins) in game.payouts() {
            if let Some(player) = players.get_mut(&player_id) {
                player.coins += coins;
                info!("Paid {} coins to {} for game {}", coins, player_id, game.id);
            }
        }
    }

    /// Sends `frame` to every connection watching `game_id`.
    pub fn broadcast(&self, game_id: &str, frame: &ServerFrame) {
        let connection_ids = match self.connections.lock().get(game_id) {
            Some(ids) => ids.clone(),
            None => return,
        };

        let text = match serde_json::to_string(frame) {
            Ok(text) => text,
            Err(e) => {
                warn!("Error serializing frame for game {}: {}", game_id, e);
                return;
            }
        };

        let sessions = self.sessions.lock();
        for conn_id in connection_ids {
            match sessions.get(&conn_id) {
                Some(addr) => addr.do_send(ChessWebSocketMessage(text.clone())),
                None => warn!("Session not found for connection ID: {}", conn_id),
            }
        }
    }

    pub fn register_connection(&self, game_id: &str, conn_id: &str, addr: Addr<ChessWebSocket>) {
        self.sessions.lock().insert(conn_id.to_string(), addr);
        self.connections
            .lock()
            .entry(game_id.to_string())
            .or_default()
            .push(conn_id.to_string());
    }

    pub fn drop_connection(&self, game_id: &str, conn_id: &str) {
        let mut connections = self.connections.lock();
        if let Some(ids) = connections.get_mut(game_id) {
            ids.retain(|id| id != conn_id);
            if ids.is_empty() {
                connections.remove(game_id);
            }
        }
        drop(connections);
        self.sessions.lock().remove(conn_id);
    }
}
