//! Seams between the session actors and the network.
//!
//! The actors only see these traits; [`super::http`] and [`super::ws`]
//! provide the real implementations and tests plug in fakes.

use std::rc::Rc;
use std::sync::Arc;

use futures::channel::mpsc::UnboundedSender;
use futures::future::LocalBoxFuture;
use futures::stream::LocalBoxStream;
use parking_lot::RwLock;

use crate::config::EngineConfig;
use crate::error::{ApiError, TransportError};
use crate::sync::http::{HttpAuth, HttpGameApi};
use crate::sync::ws::WsConnector;
use crate::models::invite::{Invite, OnlinePlayer};
use crate::models::messages::{
    ClientFrame, FinishReceipt, GameSnapshot, InviteLists, InviteResponse, MoveRequest,
    ServerFrame, TokenPair,
};
use crate::models::session::{MatchResult, Opponent};

pub type ApiFuture<T> = LocalBoxFuture<'static, Result<T, ApiError>>;

/// Request/response endpoints of the game service.
pub trait GameApi {
    fn create_session(&self, opponent: Opponent) -> ApiFuture<GameSnapshot>;
    fn finish_session(&self, game_id: &str, result: MatchResult) -> ApiFuture<FinishReceipt>;
    fn session_state(&self, game_id: &str) -> ApiFuture<GameSnapshot>;
    fn apply_move(&self, game_id: &str, request: MoveRequest) -> ApiFuture<GameSnapshot>;
    fn online_opponents(&self) -> ApiFuture<Vec<OnlinePlayer>>;
    fn my_invites(&self) -> ApiFuture<InviteLists>;
    fn send_invite(&self, to_player_id: &str) -> ApiFuture<Invite>;
    fn respond_invite(&self, invite_id: &str, accept: bool) -> ApiFuture<InviteResponse>;
    fn cancel_invite(&self, invite_id: &str) -> ApiFuture<Invite>;
}

/// Issues fresh access tokens.
pub trait AuthProvider {
    /// Exchange the stored refresh token for a new access token and write
    /// it back to the token store. Resolves to `None` when no token could
    /// be obtained.
    fn refresh(&self) -> LocalBoxFuture<'static, Option<String>>;
}

/// What the live channel delivers.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Frame(ServerFrame),
    /// Transport error.
    Failed(String),
    Closed,
}

/// An open live channel.
pub struct Channel {
    pub outbound: UnboundedSender<ClientFrame>,
    pub events: LocalBoxStream<'static, ChannelEvent>,
}

pub trait ChannelConnector {
    fn connect(&self, game_id: &str, token: &str) -> LocalBoxFuture<'static, Result<Channel, TransportError>>;
}

/// Everything a session view talks to.
#[derive(Clone)]
pub struct Services {
    pub api: Rc<dyn GameApi>,
    pub auth: Rc<dyn AuthProvider>,
    pub connector: Rc<dyn ChannelConnector>,
    pub tokens: TokenStore,
}

impl Services {
    /// HTTP endpoints and websocket channel as configured.
    pub fn http(config: &EngineConfig, tokens: TokenStore) -> Self {
        Self {
            api: Rc::new(HttpGameApi::new(&config.api_base_url, tokens.clone())),
            auth: Rc::new(HttpAuth::new(&config.api_base_url, tokens.clone())),
            connector: Rc::new(WsConnector::new(&config.ws_base_url)),
            tokens,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Credentials {
    player_id: Option<String>,
    access: Option<String>,
    refresh: Option<String>,
}

/// Credentials shared by the channel opener and the poller.
#[derive(Debug, Clone, Default)]
pub struct TokenStore {
    inner: Arc<RwLock<Credentials>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pair(pair: TokenPair) -> Self {
        let store = Self::new();
        store.store_pair(pair);
        store
    }

    pub fn store_pair(&self, pair: TokenPair) {
        let mut credentials = self.inner.write();
        credentials.player_id = Some(pair.player_id);
        credentials.access = Some(pair.access);
        credentials.refresh = Some(pair.refresh);
    }

    pub fn player_id(&self) -> Option<String> {
        self.inner.read().player_id.clone()
    }

    pub fn access(&self) -> Option<String> {
        self.inner.read().access.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.inner.read().refresh.clone()
    }

    pub fn set_access(&self, access: impl Into<String>) {
        self.inner.write().access = Some(access.into());
    }

    pub fn clear_access(&self) {
        self.inner.write().access = None;
    }
}
