use std::time::Instant;

use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse, Responder};
use log::info;
use uuid::Uuid;

use crate::error::ServerError;
use crate::models::*;
use crate::websocket::{announce, make_move};

type HandlerResult = Result<HttpResponse, ServerError>;

/// Player behind the request's bearer token.
fn authenticate(req: &HttpRequest, app_state: &AppState) -> Result<String, ServerError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(ServerError::AuthFailed)?;
    app_state.player_for(token.trim())
}

/// HTTP handler for the index page
pub async fn index() -> impl Responder {
    HttpResponse::Ok().body("Chess session server")
}

pub async fn login(body: web::Json<LoginRequest>, app_state: web::Data<AppState>) -> HandlerResult {
    let pair = app_state.login(&body.username)?;
    info!("{} logged in as {}", body.username.trim(), pair.player_id);
    Ok(HttpResponse::Ok().json(pair))
}

pub async fn refresh(body: web::Json<RefreshRequest>, app_state: web::Data<AppState>) -> HandlerResult {
    let access = app_state.refresh(&body.refresh)?;
    Ok(HttpResponse::Ok().json(RefreshResponse { access }))
}

/// Creates a game against a bot. Games between players start from an
/// accepted invite.
pub async fn start_game(
    req: HttpRequest,
    body: web::Json<StartRequest>,
    app_state: web::Data<AppState>,
) -> HandlerResult {
    let player_id = authenticate(&req, &app_state)?;
    let level = match Opponent::from_wire(Some(body.opponent_type), body.bot_level) {
        Opponent::Bot(level) => level,
        Opponent::Human => {
            return Err(ServerError::BadRequest(
                "games against players start from an invite".to_string(),
            ))
        }
    };

    let game = GameState::new_bot(
        Uuid::new_v4().to_string(),
        player_id.clone(),
        level,
        app_state.config.default_clock_seconds,
    );
    let snapshot = game.snapshot_for(&player_id, Instant::now());
    info!("Player {} started game {} against {:?} bot", player_id, game.id, level);
    app_state.games.lock().insert(game.id.clone(), game);
    Ok(HttpResponse::Ok().json(GameEnvelope { game: snapshot }))
}

/// Records the end of a game and pays out. A game against a player can
/// only be ended here by resigning. Finishing an already finished game
/// returns what the caller earned.
pub async fn finish_game(
    req: HttpRequest,
    body: web::Json<FinishRequest>,
    app_state: web::Data<AppState>,
) -> HandlerResult {
    let player_id = authenticate(&req, &app_state)?;
    let now = Instant::now();
    let (coins_earned, ended) = {
        let mut games = app_state.games.lock();
        let game = games.get_mut(&body.game_id).ok_or(ServerError::GameNotFound)?;
        if game.side_of(&player_id).is_none() {
            return Err(ServerError::NotInGame);
        }
        let ended = if game.is_finished() {
            None
        } else {
            match (game.opponent, body.result) {
                (Opponent::Bot(_), result) => game.record_result(&player_id, result)?,
                (Opponent::Human, MatchResult::Lose) => game.resign(&player_id)?,
                (Opponent::Human, _) => {
                    return Err(ServerError::BadRequest(
                        "only a resignation can end a game against a player".to_string(),
                    ))
                }
            }
            app_state.settle(game);
            Some(game.snapshot(now))
        };
        (game.coins_for(&player_id), ended)
    };

    if let Some(snapshot) = ended {
        app_state.broadcast(&body.game_id, &ServerFrame::GameOver(snapshot));
    }
    Ok(HttpResponse::Ok().json(FinishReceipt { coins_earned }))
}

pub async fn game_state(
    req: HttpRequest,
    path: web::Path<String>,
    app_state: web::Data<AppState>,
) -> HandlerResult {
    let player_id = authenticate(&req, &app_state)?;
    let game_id = path.into_inner();
    let now = Instant::now();
    let (snapshot, flagged) = {
        let mut games = app_state.games.lock();
        let game = games.get_mut(&game_id).ok_or(ServerError::GameNotFound)?;
        if game.side_of(&player_id).is_none() {
            return Err(ServerError::NotInGame);
        }
        let flagged = game.check_flag(now);
        if flagged {
            app_state.settle(game);
        }
        (game.snapshot_for(&player_id, now), flagged.then(|| game.snapshot(now)))
    };

    if let Some(over) = flagged {
        app_state.broadcast(&game_id, &ServerFrame::GameOver(over));
    }
    Ok(HttpResponse::Ok().json(GameEnvelope { game: snapshot }))
}

pub async fn submit_move(
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Json<MoveRequest>,
    app_state: web::Data<AppState>,
) -> HandlerResult {
    let player_id = authenticate(&req, &app_state)?;
    let game_id = path.into_inner();
    let (snapshot, finished) = make_move(
        &app_state,
        &game_id,
        &player_id,
        &body.from,
        &body.to,
        body.promotion.as_deref(),
    )?;
    announce(&app_state, snapshot.clone(), finished);

    let mut reply = snapshot;
    if finished {
        if let Some(game) = app_state.games.lock().get(&game_id) {
            reply = game.snapshot_for(&player_id, Instant::now());
        }
    }
    Ok(HttpResponse::Ok().json(GameEnvelope { game: reply }))
}

pub async fn online_players(req: HttpRequest, app_state: web::Data<AppState>) -> HandlerResult {
    let player_id = authenticate(&req, &app_state)?;
    Ok(HttpResponse::Ok().json(app_state.online_players(&player_id)))
}

pub async fn my_invites(req: HttpRequest, app_state: web::Data<AppState>) -> HandlerResult {
    let player_id = authenticate(&req, &app_state)?;
    let live_games: Vec<String> = app_state
        .games
        .lock()
        .values()
        .filter(|game| !game.is_finished())
        .map(|game| game.id.clone())
        .collect();
    // Accepted invites stay listed until their game is over.
    let listed = |invite: &Invite| {
        invite.is_pending()
            || invite
                .game_id
                .as_ref()
                .is_some_and(|id| invite.is_joinable() && live_games.contains(id))
    };

    let mut lists = InviteLists::default();
    for invite in app_state.invites.lock().values().filter(|i| listed(i)) {
        if invite.to_id == player_id {
            lists.incoming.push(invite.clone());
        } else if invite.from_id == player_id {
            lists.outgoing.push(invite.clone());
        }
    }
    lists.incoming.sort_by(|a, b| a.id.cmp(&b.id));
    lists.outgoing.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(HttpResponse::Ok().json(lists))
}

pub async fn send_invite(
    req: HttpRequest,
    body: web::Json<InviteRequest>,
    app_state: web::Data<AppState>,
) -> HandlerResult {
    let player_id = authenticate(&req, &app_state)?;
    let to_name = app_state
        .display_name(&body.to_player_id)
        .ok_or(ServerError::PlayerNotFound)?;

    let mut invite = Invite::new(player_id.clone(), body.to_player_id.clone())?;
    invite.from_name = app_state.display_name(&player_id);
    invite.to_name = Some(to_name);

    let mut invites = app_state.invites.lock();
    let duplicate = invites
        .values()
        .any(|i| i.is_pending() && i.from_id == invite.from_id && i.to_id == invite.to_id);
    if duplicate {
        return Err(ServerError::InvitePending);
    }
    info!("Player {} invited {}", invite.from_id, invite.to_id);
    invites.insert(invite.id.clone(), invite.clone());
    Ok(HttpResponse::Ok().json(invite))
}

/// Accepting creates the game, with the sender playing White.
pub async fn respond_invite(
    req: HttpRequest,
    body: web::Json<RespondInviteRequest>,
    app_state: web::Data<AppState>,
) -> HandlerResult {
    let player_id = authenticate(&req, &app_state)?;
    let now = Instant::now();

    let mut invites = app_state.invites.lock();
    let invite = invites
        .get_mut(&body.invite_id)
        .ok_or(ServerError::InviteNotFound)?;

    if !body.accept {
        invite.decline(&player_id)?;
        return Ok(HttpResponse::Ok().json(InviteResponse {
            invite: invite.clone(),
            game: None,
        }));
    }

    let game_id = Uuid::new_v4().to_string();
    invite.accept(&player_id, game_id.clone())?;
    let game = GameState::new_pvp(
        game_id.clone(),
        invite.from_id.clone(),
        invite.to_id.clone(),
        app_state.config.default_clock_seconds,
        now,
    );
    let response = InviteResponse {
        invite: invite.clone(),
        game: Some(game.snapshot_for(&player_id, now)),
    };
    drop(invites);

    info!("Invite {} accepted, game {} created", body.invite_id, game_id);
    app_state.games.lock().insert(game_id, game);
    Ok(HttpResponse::Ok().json(response))
}

pub async fn cancel_invite(
    req: HttpRequest,
    body: web::Json<CancelInviteRequest>,
    app_state: web::Data<AppState>,
) -> HandlerResult {
    let player_id = authenticate(&req, &app_state)?;
    let mut invites = app_state.invites.lock();
    let invite = invites
        .get_mut(&body.invite_id)
        .ok_or(ServerError::InviteNotFound)?;
    invite.cancel(&player_id)?;
    Ok(HttpResponse::Ok().json(invite.clone()))
}

/// Configure the HTTP routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/").route(web::get().to(index)))
        .service(
            web::resource("/ws/chess/{game_id}/")
                .route(web::get().to(crate::websocket::ws_index)),
        )
        .service(
            web::scope("/api")
                .route("/auth/login/", web::post().to(login))
                .route("/auth/refresh/", web::post().to(refresh))
                .route("/chess/start/", web::post().to(start_game))
                .route("/chess/finish/", web::post().to(finish_game))
                .service(
                    web::resource("/chess/game/{game_id}/")
                        .route(web::get().to(game_state))
                        .route(web::post().to(submit_move)),
                )
                .route("/chess/online-players/", web::get().to(online_players))
                .route("/chess/my-invites/", web::get().to(my_invites))
                .route("/chess/invite/", web::post().to(send_invite))
                .route("/chess/respond-invite/", web::post().to(respond_invite))
                .route("/chess/cancel-invite/", web::post().to(cancel_invite)),
        );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::BotLevel;
    use crate::config::ServerConfig;
    use actix_web::dev::ServiceResponse;
    use actix_web::{http::StatusCode, test, App};
    use serde::de::DeserializeOwned;
    use serde::Serialize;

    fn app_state() -> web::Data<AppState> {
        web::Data::new(AppState::new(ServerConfig::default()))
    }

    macro_rules! service {
        ($state:expr) => {
            test::init_service(
                App::new()
                    .app_data($state.clone())
                    .configure(configure_routes),
            )
            .await
        };
    }

    fn post(path: &str, token: Option<&str>, body: &impl Serialize) -> test::TestRequest {
        let req = test::TestRequest::post().uri(path).set_json(body);
        match token {
            Some(token) => req.insert_header((header::AUTHORIZATION, format!("Bearer {}", token))),
            None => req,
        }
    }

    fn get(path: &str, token: &str) -> test::TestRequest {
        test::TestRequest::get()
            .uri(path)
            .insert_header((header::AUTHORIZATION, format!("Bearer {}", token)))
    }

    async fn json<T: DeserializeOwned>(resp: ServiceResponse) -> T {
        test::read_body_json(resp).await
    }

    #[actix_web::test]
    async fn bot_game_is_created_finished_and_paid() {
        let state = app_state();
        let app = service!(state);

        let resp = test::call_service(
            &app,
            post("/api/auth/login/", None, &LoginRequest { username: "alice".into() }).to_request(),
        )
        .await;
        let pair: TokenPair = json(resp).await;

        let start = StartRequest {
            opponent_type: OpponentKind::Bot,
            bot_level: Some(BotLevel::Easy),
        };
        let resp = test::call_service(&app, post("/api/chess/start/", Some(&pair.access), &start).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let envelope: GameEnvelope = json(resp).await;
        assert_eq!(envelope.game.status, Some(SessionStatus::Active));
        assert_eq!(envelope.game.bot_level, Some(BotLevel::Easy));

        let finish = FinishRequest {
            game_id: envelope.game.id.clone(),
            result: MatchResult::Win,
        };
        let resp = test::call_service(&app, post("/api/chess/finish/", Some(&pair.access), &finish).to_request()).await;
        let receipt: FinishReceipt = json(resp).await;
        assert_eq!(receipt.coins_earned, 45);

        // Finishing again reports the same reward without paying twice.
        let resp = test::call_service(&app, post("/api/chess/finish/", Some(&pair.access), &finish).to_request()).await;
        let receipt: FinishReceipt = json(resp).await;
        assert_eq!(receipt.coins_earned, 45);
        assert_eq!(state.balance(&pair.player_id), 45);
    }

    #[actix_web::test]
    async fn missing_or_unknown_tokens_are_rejected_with_a_reason() {
        let state = app_state();
        let app = service!(state);

        let resp = test::call_service(&app, get("/api/chess/online-players/", "nope").to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body: ErrorBody = json(resp).await;
        assert_eq!(body.error.as_deref(), Some("auth_failed"));

        let refresh = RefreshRequest { refresh: "nope".into() };
        let resp = test::call_service(&app, post("/api/auth/refresh/", None, &refresh).to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn invite_accept_then_play_over_rest() {
        let state = app_state();
        let app = service!(state);
        let alice = state.login("alice").unwrap();
        let bob = state.login("bob").unwrap();

        let invite_req = InviteRequest {
            to_player_id: bob.player_id.clone(),
        };
        let resp = test::call_service(&app, post("/api/chess/invite/", Some(&alice.access), &invite_req).to_request()).await;
        let invite: Invite = json(resp).await;
        assert_eq!(invite.to_name.as_deref(), Some("bob"));

        let resp = test::call_service(&app, post("/api/chess/invite/", Some(&alice.access), &invite_req).to_request()).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let resp = test::call_service(&app, get("/api/chess/my-invites/", &bob.access).to_request()).await;
        let lists: InviteLists = json(resp).await;
        assert_eq!(lists.incoming.len(), 1);
        assert!(lists.outgoing.is_empty());

        let respond = RespondInviteRequest {
            invite_id: invite.id.clone(),
            accept: true,
        };
        let resp = test::call_service(&app, post("/api/chess/respond-invite/", Some(&bob.access), &respond).to_request()).await;
        let accepted: InviteResponse = json(resp).await;
        let game_id = accepted.invite.game_id.clone().unwrap();
        let game = accepted.game.unwrap();
        assert_eq!(game.white_player.as_deref(), Some(alice.player_id.as_str()));
        assert_eq!(game.black_player.as_deref(), Some(bob.player_id.as_str()));

        let resp = test::call_service(&app, get("/api/chess/my-invites/", &alice.access).to_request()).await;
        let lists: InviteLists = json(resp).await;
        assert_eq!(lists.outgoing[0].status, InviteStatus::Accepted);
        assert_eq!(lists.outgoing[0].game_id.as_deref(), Some(game_id.as_str()));

        let path = format!("/api/chess/game/{}/", game_id);
        let wrong_turn = MoveRequest {
            from: "e7".into(),
            to: "e5".into(),
            promotion: None,
        };
        let resp = test::call_service(&app, post(&path, Some(&bob.access), &wrong_turn).to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: ErrorBody = json(resp).await;
        assert_eq!(body.error.as_deref(), Some("not_your_turn"));

        let opening = MoveRequest {
            from: "e2".into(),
            to: "e4".into(),
            promotion: None,
        };
        let resp = test::call_service(&app, post(&path, Some(&alice.access), &opening).to_request()).await;
        let envelope: GameEnvelope = json(resp).await;
        assert_eq!(envelope.game.move_history.unwrap()[0].san, "e4");

        let resp = test::call_service(&app, get(&path, &bob.access).to_request()).await;
        let envelope: GameEnvelope = json(resp).await;
        assert_eq!(envelope.game.current_turn, Some(crate::game::Side::Black));
        assert_eq!(envelope.game.last_move.as_deref(), Some("e2e4"));
    }

    #[actix_web::test]
    async fn only_the_sender_cancels_and_strangers_cannot_read_games() {
        let state = app_state();
        let app = service!(state);
        let alice = state.login("alice").unwrap();
        let bob = state.login("bob").unwrap();
        let carol = state.login("carol").unwrap();

        let invite_req = InviteRequest {
            to_player_id: bob.player_id.clone(),
        };
        let resp = test::call_service(&app, post("/api/chess/invite/", Some(&alice.access), &invite_req).to_request()).await;
        let invite: Invite = json(resp).await;

        let cancel = CancelInviteRequest {
            invite_id: invite.id.clone(),
        };
        let resp = test::call_service(&app, post("/api/chess/cancel-invite/", Some(&bob.access), &cancel).to_request()).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        let resp = test::call_service(&app, post("/api/chess/cancel-invite/", Some(&alice.access), &cancel).to_request()).await;
        let cancelled: Invite = json(resp).await;
        assert_eq!(cancelled.status, InviteStatus::Cancelled);

        let game = GameState::new_bot("g1".into(), alice.player_id.clone(), BotLevel::Easy, 300);
        state.games.lock().insert("g1".into(), game);
        let resp = test::call_service(&app, get("/api/chess/game/g1/", &carol.access).to_request()).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        let resp = test::call_service(&app, get("/api/chess/game/g2/", &carol.access).to_request()).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
