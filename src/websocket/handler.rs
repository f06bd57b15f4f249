use std::time::Instant;

use actix::*;
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use log::{info, warn};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ServerError;
use crate::game::utils::status_label;
use crate::game::Side;
use crate::models::*;

/// WebSocket handler for one player watching one game
pub struct ChessWebSocket {
    pub id: String,
    pub app_state: web::Data<AppState>,
    pub game_id: String,
    /// `Err` when the connection was refused; the reason is sent as an
    /// error frame and the socket closed.
    pub admission: Result<(String, Side), ServerError>,
    pub last_heartbeat: Instant,
}

impl ChessWebSocket {
    fn player_id(&self) -> Option<&str> {
        self.admission.as_ref().ok().map(|(player, _)| player.as_str())
    }

    fn send(&self, ctx: &mut ws::WebsocketContext<Self>, frame: &ServerFrame) {
        match serde_json::to_string(frame) {
            Ok(text) => ctx.text(text),
            Err(e) => warn!("Error serializing frame: {}", e),
        }
    }

    fn start_heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        let interval = self.app_state.config.heartbeat_interval;
        let timeout = self.app_state.config.client_timeout;
        ctx.run_interval(interval, move |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > timeout {
                warn!("WebSocket {} heartbeat timeout, disconnecting", act.id);
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    /// Pushes the clocks to this client every interval and ends the game on
    /// flag fall.
    fn start_timer(&self, ctx: &mut ws::WebsocketContext<Self>) {
        let interval = self.app_state.config.timer_interval;
        ctx.run_interval(interval, |act, ctx| {
            let now = Instant::now();
            let (update, flagged) = {
                let mut games = act.app_state.games.lock();
                let Some(game) = games.get_mut(&act.game_id) else {
                    return;
                };
                if game.is_finished() {
                    return;
                }
                if game.check_flag(now) {
                    act.app_state.settle(game);
                    info!("Game {} lost on time", game.id);
                    (None, Some(game.snapshot(now)))
                } else {
                    (Some(game.timer_update(now)), None)
                }
            };
            if let Some(update) = update {
                act.send(ctx, &ServerFrame::TimerUpdate(update));
            }
            if let Some(snapshot) = flagged {
                act.app_state
                    .broadcast(&act.game_id, &ServerFrame::GameOver(snapshot));
            }
        });
    }

    pub fn handle_message(&mut self, msg: ClientFrame, ctx: &mut ws::WebsocketContext<Self>) {
        let Some(player_id) = self.player_id().map(str::to_string) else {
            return;
        };
        let result = match msg {
            ClientFrame::Move {
                from,
                to,
                promotion,
            } => self.handle_move(&player_id, &from, &to, promotion.as_deref()),
            ClientFrame::Resign => self.handle_resign(&player_id, ctx),
        };
        if let Err(e) = result {
            info!("Rejected frame from {} in game {}: {}", player_id, self.game_id, e);
            self.send(ctx, &ServerFrame::error(e.to_string()));
        }
    }

    fn handle_move(
        &mut self,
        player_id: &str,
        from: &str,
        to: &str,
        promotion: Option<&str>,
    ) -> Result<(), ServerError> {
        let (snapshot, finished) =
            make_move(&self.app_state, &self.game_id, player_id, from, to, promotion)?;
        announce(&self.app_state, snapshot, finished);
        Ok(())
    }

    fn handle_resign(
        &mut self,
        player_id: &str,
        ctx: &mut ws::WebsocketContext<Self>,
    ) -> Result<(), ServerError> {
        let snapshot = {
            let mut games = self.app_state.games.lock();
            let game = games.get_mut(&self.game_id).ok_or(ServerError::GameNotFound)?;
            game.resign(player_id)?;
            self.app_state.settle(game);
            game.snapshot(Instant::now())
        };
        info!("Player {} resigned game {}", player_id, self.game_id);
        self.send(ctx, &ServerFrame::ResignAck);
        self.app_state
            .broadcast(&self.game_id, &ServerFrame::GameOver(snapshot));
        Ok(())
    }
}

/// Checks that `token` belongs to a participant of `game_id`.
pub fn admit(app_state: &AppState, game_id: &str, token: Option<&str>) -> Result<(String, Side), ServerError> {
    let player_id = app_state.player_for(token.ok_or(ServerError::AuthFailed)?)?;
    let games = app_state.games.lock();
    let game = games.get(game_id).ok_or(ServerError::GameNotFound)?;
    let side = game.side_of(&player_id).ok_or(ServerError::NotInGame)?;
    Ok((player_id, side))
}

/// Applies a move for `player_id`, settling the game if it ended. Returns
/// the new snapshot and whether the game is over.
pub fn make_move(
    app_state: &AppState,
    game_id: &str,
    player_id: &str,
    from: &str,
    to: &str,
    promotion: Option<&str>,
) -> Result<(GameSnapshot, bool), ServerError> {
    let now = Instant::now();
    let mut games = app_state.games.lock();
    let game = games.get_mut(game_id).ok_or(ServerError::GameNotFound)?;
    if game.check_flag(now) {
        app_state.settle(game);
        let snapshot = game.snapshot(now);
        drop(games);
        app_state.broadcast(game_id, &ServerFrame::GameOver(snapshot));
        return Err(ServerError::GameFinished);
    }
    let applied = game.apply_move(player_id, from, to, promotion, now);
    if game.is_finished() {
        app_state.settle(game);
    }
    applied?;
    info!(
        "Game {}: {} played {}, position is {}",
        game_id,
        player_id,
        game.last_move.as_deref().unwrap_or("-"),
        status_label(&game.position)
    );
    Ok((game.snapshot(now), game.is_finished()))
}

/// Tells every watcher about a new position, and about the end of the game
/// when it is over.
pub fn announce(app_state: &AppState, snapshot: GameSnapshot, finished: bool) {
    let game_id = snapshot.id.clone();
    if finished {
        app_state.broadcast(&game_id, &ServerFrame::Move(snapshot.clone()));
        app_state.broadcast(&game_id, &ServerFrame::GameOver(snapshot));
    } else {
        app_state.broadcast(&game_id, &ServerFrame::Move(snapshot));
    }
}

impl Actor for ChessWebSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        let player_id = match &self.admission {
            Ok((player_id, _)) => player_id.clone(),
            Err(e) => {
                warn!("Refusing WebSocket {} for game {}: {}", self.id, self.game_id, e);
                self.send(ctx, &ServerFrame::error(e.to_string()));
                ctx.close(Some(ws::CloseCode::Policy.into()));
                ctx.stop();
                return;
            }
        };

        self.app_state
            .register_connection(&self.game_id, &self.id, ctx.address());
        info!(
            "WebSocket connection started: {} ({} in game {})",
            self.id, player_id, self.game_id
        );

        let snapshot = self
            .app_state
            .games
            .lock()
            .get(&self.game_id)
            .map(|game| game.snapshot_for(&player_id, Instant::now()));
        if let Some(snapshot) = snapshot {
            self.send(ctx, &ServerFrame::GameState(snapshot));
        }

        self.start_heartbeat(ctx);
        self.start_timer(ctx);
    }

    fn stopping(&mut self, _: &mut Self::Context) -> Running {
        if self.admission.is_ok() {
            self.app_state.drop_connection(&self.game_id, &self.id);
        }
        info!("WebSocket connection closed: {}", self.id);
        Running::Stop
    }
}

impl Handler<ChessWebSocketMessage> for ChessWebSocket {
    type Result = ();

    fn handle(&mut self, msg: ChessWebSocketMessage, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for ChessWebSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                self.last_heartbeat = Instant::now();
                match serde_json::from_str::<ClientFrame>(text.as_ref()) {
                    Ok(frame) => self.handle_message(frame, ctx),
                    Err(e) => {
                        warn!("Error parsing client frame: {}", e);
                        self.send(ctx, &ServerFrame::error("invalid_message"));
                    }
                }
            }
            Ok(ws::Message::Binary(_)) => {
                warn!("Binary messages are not supported");
                self.send(ctx, &ServerFrame::error("invalid_message"));
            }
            Ok(ws::Message::Close(reason)) => {
                info!("Connection closed: {:?}", reason);
                ctx.close(reason);
                ctx.stop();
            }
            _ => {
                ctx.stop();
            }
        }
    }
}

#[derive(Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// WebSocket connection handler for `/ws/chess/{game_id}/`
pub async fn ws_index(
    req: HttpRequest,
    stream: web::Payload,
    path: web::Path<String>,
    query: web::Query<WsQuery>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let game_id = path.into_inner();
    let admission = admit(&app_state, &game_id, query.token.as_deref());

    let ws = ChessWebSocket {
        id: Uuid::new_v4().to_string(),
        app_state: app_state.clone(),
        game_id,
        admission,
        last_heartbeat: Instant::now(),
    };
    ws::start(ws, &req, stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::prelude::v1::test;
    use crate::config::ServerConfig;

    fn state_with_game() -> (AppState, TokenPair, TokenPair, TokenPair) {
        let state = AppState::new(ServerConfig::default());
        let alice = state.login("alice").unwrap();
        let bob = state.login("bob").unwrap();
        let carol = state.login("carol").unwrap();
        let game = GameState::new_pvp(
            "g1".into(),
            alice.player_id.clone(),
            bob.player_id.clone(),
            300,
            Instant::now(),
        );
        state.games.lock().insert("g1".into(), game);
        (state, alice, bob, carol)
    }

    #[test]
    fn admission_reports_the_documented_reason_codes() {
        let (state, alice, bob, carol) = state_with_game();
        assert_eq!(admit(&state, "g1", Some(&alice.access)).unwrap().1, Side::White);
        assert_eq!(admit(&state, "g1", Some(&bob.access)).unwrap().1, Side::Black);

        let code = |r: Result<(String, Side), ServerError>| r.unwrap_err().to_string();
        assert_eq!(code(admit(&state, "g1", None)), "auth_failed");
        assert_eq!(code(admit(&state, "g1", Some("stale"))), "auth_failed");
        assert_eq!(code(admit(&state, "g2", Some(&alice.access))), "game_not_found");
        assert_eq!(code(admit(&state, "g1", Some(&carol.access))), "not_in_game");
    }

    #[test]
    fn a_mating_move_settles_the_game() {
        let (state, alice, bob, _) = state_with_game();
        let (white, black) = (alice.player_id.as_str(), bob.player_id.as_str());
        make_move(&state, "g1", white, "f2", "f3", None).unwrap();
        make_move(&state, "g1", black, "e7", "e5", None).unwrap();
        make_move(&state, "g1", white, "g2", "g4", None).unwrap();
        let (snapshot, finished) = make_move(&state, "g1", black, "d8", "h4", None).unwrap();

        assert!(finished);
        assert_eq!(snapshot.winner.as_deref(), Some(black));
        assert_eq!(state.balance(black), 50);
        assert_eq!(state.balance(white), 0);

        let err = make_move(&state, "g1", white, "a2", "a3", None).unwrap_err();
        assert_eq!(err.to_string(), "game_finished");
        assert_eq!(state.balance(black), 50);
    }
}
