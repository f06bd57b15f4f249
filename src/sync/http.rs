//! Game service client over HTTP.

use futures::future::LocalBoxFuture;
use log::{debug, warn};
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ApiError;
use crate::models::invite::{Invite, OnlinePlayer};
use crate::models::messages::{
    CancelInviteRequest, ErrorBody, FinishReceipt, FinishRequest, GameEnvelope, GameSnapshot,
    InviteLists, InviteRequest, InviteResponse, LoginRequest, MoveRequest, RefreshRequest,
    RefreshResponse, RespondInviteRequest, StartRequest, TokenPair,
};
use crate::models::session::{MatchResult, Opponent};
use crate::sync::transport::{ApiFuture, AuthProvider, GameApi, TokenStore};

async fn decode<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ApiError> {
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        let body: ErrorBody = response.json().await.unwrap_or_default();
        let message = body.error.unwrap_or_else(|| status.to_string());
        debug!("Request failed with {}: {}", status, message);
        return Err(ApiError::Status {
            code: status.as_u16(),
            message,
        });
    }
    response
        .json::<T>()
        .await
        .map_err(|e| ApiError::Decode(e.to_string()))
}

/// [`GameApi`] backed by the REST endpoints under `api_base_url`.
#[derive(Clone)]
pub struct HttpGameApi {
    client: reqwest::Client,
    base_url: String,
    tokens: TokenStore,
}

impl HttpGameApi {
    pub fn new(base_url: impl Into<String>, tokens: TokenStore) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match self.tokens.access() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn get<T: DeserializeOwned + 'static>(&self, path: &str) -> ApiFuture<T> {
        let request = self.authorized(self.client.get(self.url(path)));
        Box::pin(decode(request))
    }

    fn post<B: Serialize, T: DeserializeOwned + 'static>(&self, path: &str, body: &B) -> ApiFuture<T> {
        let request = self.authorized(self.client.post(self.url(path)).json(body));
        Box::pin(decode(request))
    }

    fn game(&self, pending: ApiFuture<GameEnvelope>) -> ApiFuture<GameSnapshot> {
        Box::pin(async move { Ok(pending.await?.game) })
    }
}

impl GameApi for HttpGameApi {
    fn create_session(&self, opponent: Opponent) -> ApiFuture<GameSnapshot> {
        let body = StartRequest {
            opponent_type: opponent.kind(),
            bot_level: opponent.bot_level(),
        };
        self.game(self.post("/chess/start/", &body))
    }

    fn finish_session(&self, game_id: &str, result: MatchResult) -> ApiFuture<FinishReceipt> {
        let body = FinishRequest {
            game_id: game_id.to_string(),
            result,
        };
        self.post("/chess/finish/", &body)
    }

    fn session_state(&self, game_id: &str) -> ApiFuture<GameSnapshot> {
        self.game(self.get(&format!("/chess/game/{}/", game_id)))
    }

    fn apply_move(&self, game_id: &str, request: MoveRequest) -> ApiFuture<GameSnapshot> {
        self.game(self.post(&format!("/chess/game/{}/", game_id), &request))
    }

    fn online_opponents(&self) -> ApiFuture<Vec<OnlinePlayer>> {
        self.get("/chess/online-players/")
    }

    fn my_invites(&self) -> ApiFuture<InviteLists> {
        self.get("/chess/my-invites/")
    }

    fn send_invite(&self, to_player_id: &str) -> ApiFuture<Invite> {
        let body = InviteRequest {
            to_player_id: to_player_id.to_string(),
        };
        self.post("/chess/invite/", &body)
    }

    fn respond_invite(&self, invite_id: &str, accept: bool) -> ApiFuture<InviteResponse> {
        let body = RespondInviteRequest {
            invite_id: invite_id.to_string(),
            accept,
        };
        self.post("/chess/respond-invite/", &body)
    }

    fn cancel_invite(&self, invite_id: &str) -> ApiFuture<Invite> {
        let body = CancelInviteRequest {
            invite_id: invite_id.to_string(),
        };
        self.post("/chess/cancel-invite/", &body)
    }
}

/// Login and token refresh against `/auth/...`.
#[derive(Clone)]
pub struct HttpAuth {
    client: reqwest::Client,
    base_url: String,
    tokens: TokenStore,
}

impl HttpAuth {
    pub fn new(base_url: impl Into<String>, tokens: TokenStore) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens,
        }
    }

    /// Log in and keep the issued tokens.
    pub fn login(&self, username: &str) -> ApiFuture<TokenPair> {
        let request = self
            .client
            .post(format!("{}/auth/login/", self.base_url))
            .json(&LoginRequest {
                username: username.to_string(),
            });
        let tokens = self.tokens.clone();
        Box::pin(async move {
            let pair: TokenPair = decode(request).await?;
            tokens.store_pair(pair.clone());
            Ok(pair)
        })
    }
}

impl AuthProvider for HttpAuth {
    fn refresh(&self) -> LocalBoxFuture<'static, Option<String>> {
        let Some(refresh) = self.tokens.refresh_token() else {
            return Box::pin(futures::future::ready(None));
        };
        let request = self
            .client
            .post(format!("{}/auth/refresh/", self.base_url))
            .json(&RefreshRequest { refresh });
        let tokens = self.tokens.clone();
        Box::pin(async move {
            match decode::<RefreshResponse>(request).await {
                Ok(response) => {
                    tokens.set_access(response.access.clone());
                    Some(response.access)
                }
                Err(e) => {
                    warn!("Token refresh failed: {}", e);
                    None
                }
            }
        })
    }
}
