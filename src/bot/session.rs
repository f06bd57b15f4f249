//! Local driver for games against the bot.

use std::rc::Rc;

use actix::prelude::*;
use log::{debug, info, warn};

use crate::bot::{BotEngine, BotLevel, RngSource};
use crate::config::EngineConfig;
use crate::error::SessionError;
use crate::events::{turn_status, CloseView, CurrentSession, Resign, SessionEvent, SubmitMove};
use crate::game::{terminal_state, TerminalState};
use crate::models::rewards::coins_for;
use crate::models::session::{GameSession, MatchResult, Opponent, Outcome};
use crate::sync::transport::GameApi;

/// Plays a bot session on the local rules adapter.
///
/// At most one bot move is pending at a time; it is keyed by the ply it was
/// scheduled for and dropped if the session moved on or finished.
pub struct BotMatch {
    config: EngineConfig,
    session: GameSession,
    engine: BotEngine,
    api: Rc<dyn GameApi>,
    events: Recipient<SessionEvent>,
    pending: Option<(usize, SpawnHandle)>,
    clock_timer: Option<SpawnHandle>,
    concluded: bool,
}

impl BotMatch {
    pub fn new(
        config: EngineConfig,
        session: GameSession,
        engine: BotEngine,
        api: Rc<dyn GameApi>,
        events: Recipient<SessionEvent>,
    ) -> Self {
        Self {
            config,
            session,
            engine,
            api,
            events,
            pending: None,
            clock_timer: None,
            concluded: false,
        }
    }

    /// Creates a bot game on the server and starts playing it locally.
    pub async fn create(
        config: EngineConfig,
        api: Rc<dyn GameApi>,
        player_id: String,
        level: BotLevel,
        events: Recipient<SessionEvent>,
    ) -> Result<Addr<BotMatch>, SessionError> {
        let snapshot = api.create_session(Opponent::Bot(level)).await?;
        let session = GameSession::from_snapshot(&snapshot, player_id, config.default_clock_seconds)?;
        info!("Created bot game {} at level {:?}", session.id(), level);
        let engine = BotEngine::new(level, Box::new(RngSource::from_entropy()));
        Ok(BotMatch::new(config, session, engine, api, events).start())
    }

    fn emit(&self, event: SessionEvent) {
        self.events.do_send(event);
    }

    fn publish(&self) {
        self.emit(SessionEvent::Updated(Box::new(self.session.clone())));
        self.emit(SessionEvent::Status(turn_status(&self.session).to_string()));
    }

    fn schedule_bot_move(&mut self, ctx: &mut Context<Self>) {
        if self.session.is_finished() || self.session.is_players_turn() {
            return;
        }
        let ply = self.session.seq();
        if matches!(self.pending, Some((scheduled, _)) if scheduled == ply) {
            return;
        }
        self.cancel_pending(ctx);
        let delay = self.engine.thinking_delay(&self.config.bot_delay_ms);
        debug!("Bot replies to ply {} in {:?}", ply, delay);
        let handle = ctx.run_later(delay, move |act, ctx| {
            act.pending = None;
            if act.session.is_finished() || act.session.seq() != ply {
                return;
            }
            act.play_bot_move(ctx);
        });
        self.pending = Some((ply, handle));
    }

    fn cancel_pending(&mut self, ctx: &mut Context<Self>) {
        if let Some((_, handle)) = self.pending.take() {
            ctx.cancel_future(handle);
        }
    }

    fn play_bot_move(&mut self, ctx: &mut Context<Self>) {
        let mv = match self.engine.select_move(self.session.position()) {
            Ok(mv) => mv,
            Err(e) => {
                warn!("Bot cannot move in game {}: {}", self.session.id(), e);
                self.check_terminal(ctx);
                return;
            }
        };
        match self.session.apply_local_move(mv) {
            Ok(outcome) => {
                info!("Bot played {} in game {}", outcome.san, self.session.id());
                self.publish();
                self.check_terminal(ctx);
            }
            Err(e) => warn!("Bot move {} rejected: {}", mv, e),
        }
    }

    fn check_terminal(&mut self, ctx: &mut Context<Self>) {
        let Some(terminal) = terminal_state(self.session.position()) else {
            return;
        };
        let result = match terminal {
            TerminalState::Checkmate { winner } if winner == self.session.player_side() => {
                MatchResult::Win
            }
            TerminalState::Checkmate { .. } => MatchResult::Lose,
            TerminalState::Stalemate | TerminalState::InsufficientMaterial => MatchResult::Draw,
        };
        self.conclude(result, terminal.reason(), ctx);
    }

    fn tick(&mut self, ctx: &mut Context<Self>) {
        // Whole seconds only; sub-second ticks still charge one.
        let seconds = u32::try_from(self.config.clock_tick.as_secs())
            .unwrap_or(u32::MAX)
            .max(1);
        let Some(remaining) = self.session.tick(seconds) else {
            return;
        };
        self.emit(SessionEvent::Clock {
            clock: self.session.clock(),
            turn: self.session.turn(),
        });
        if remaining == 0 {
            let result = if self.session.is_players_turn() {
                MatchResult::Lose
            } else {
                MatchResult::Win
            };
            self.conclude(result, "timeout", ctx);
        }
    }

    /// Finish the game locally, then report the result to the service.
    fn conclude(&mut self, result: MatchResult, reason: &str, ctx: &mut Context<Self>) {
        if self.concluded {
            return;
        }
        self.concluded = true;
        self.cancel_pending(ctx);
        if let Some(handle) = self.clock_timer.take() {
            ctx.cancel_future(handle);
        }

        let player = self.session.player_id().to_string();
        let (winner_id, loser_id) = match result {
            MatchResult::Win => (Some(player), None),
            MatchResult::Lose => (None, Some(player)),
            MatchResult::Draw => (None, None),
        };
        let outcome = Outcome {
            result,
            reason: reason.to_string(),
            winner_id,
            loser_id,
            coins_earned: coins_for(self.session.opponent(), result),
        };
        if !self.session.finish(outcome.clone()) {
            return;
        }
        info!("Bot game {} over: {:?} by {}", self.session.id(), result, reason);
        self.publish();
        self.emit(SessionEvent::GameOver(outcome));

        let report = self.api.finish_session(self.session.id(), result);
        ctx.spawn(report.into_actor(self).map(|res, act, ctx| {
            match res {
                Ok(receipt) => {
                    info!(
                        "Game {} settled, {} coins earned",
                        act.session.id(),
                        receipt.coins_earned
                    );
                    if receipt.coins_earned > 0 {
                        act.emit(SessionEvent::BalanceChanged {
                            coins_earned: receipt.coins_earned,
                        });
                    }
                }
                Err(e) => {
                    warn!("Could not report result of game {}: {}", act.session.id(), e);
                    act.emit(SessionEvent::Status(e.to_string()));
                }
            }
            ctx.stop();
        }));
    }
}

impl Actor for BotMatch {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!(
            "Bot game {} started ({} bot)",
            self.session.id(),
            self.engine.strategy_name()
        );
        self.session.activate();
        self.publish();
        self.clock_timer = Some(ctx.run_interval(self.config.clock_tick, |act, ctx| act.tick(ctx)));
        self.schedule_bot_move(ctx);
    }

    fn stopped(&mut self, _: &mut Self::Context) {
        debug!("Bot game {} view closed", self.session.id());
    }
}

impl Handler<SubmitMove> for BotMatch {
    type Result = Result<(), SessionError>;

    fn handle(&mut self, msg: SubmitMove, ctx: &mut Self::Context) -> Self::Result {
        let mv = self
            .session
            .validate_player_move(&msg.from, &msg.to, msg.promotion.as_deref())?;
        let outcome = self.session.apply_local_move(mv)?;
        debug!("Player played {} in game {}", outcome.san, self.session.id());
        self.publish();
        self.check_terminal(ctx);
        self.schedule_bot_move(ctx);
        Ok(())
    }
}

impl Handler<Resign> for BotMatch {
    type Result = ();

    fn handle(&mut self, _: Resign, ctx: &mut Self::Context) {
        if !self.session.is_finished() {
            self.conclude(MatchResult::Lose, "resign", ctx);
        }
    }
}

impl Handler<CloseView> for BotMatch {
    type Result = ();

    fn handle(&mut self, _: CloseView, ctx: &mut Self::Context) {
        self.cancel_pending(ctx);
        ctx.stop();
    }
}

impl Handler<CurrentSession> for BotMatch {
    type Result = MessageResult<CurrentSession>;

    fn handle(&mut self, _: CurrentSession, _: &mut Self::Context) -> Self::Result {
        MessageResult(self.session.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::time::Duration;

    use futures::future;

    use super::*;
    use crate::error::ApiError;
    use crate::game::Side;
    use crate::models::invite::{Invite, OnlinePlayer};
    use crate::models::messages::{
        FinishReceipt, GameSnapshot, InviteLists, InviteResponse, MoveRequest,
    };
    use crate::models::session::SessionStatus;
    use crate::sync::transport::ApiFuture;

    fn unused<T: 'static>() -> ApiFuture<T> {
        Box::pin(future::ready(Err(ApiError::Decode("unused".to_string()))))
    }

    #[derive(Default)]
    struct ResultSink {
        finished: RefCell<Vec<MatchResult>>,
    }

    impl GameApi for ResultSink {
        fn create_session(&self, opponent: Opponent) -> ApiFuture<GameSnapshot> {
            let snapshot = GameSnapshot {
                id: "b2".to_string(),
                status: Some(SessionStatus::Active),
                white_player: Some("alice".to_string()),
                opponent_type: Some(opponent.kind()),
                bot_level: opponent.bot_level(),
                ..GameSnapshot::default()
            };
            Box::pin(future::ready(Ok(snapshot)))
        }
        fn finish_session(&self, _: &str, result: MatchResult) -> ApiFuture<FinishReceipt> {
            self.finished.borrow_mut().push(result);
            let coins_earned = coins_for(Opponent::Bot(BotLevel::Hard), result);
            Box::pin(future::ready(Ok(FinishReceipt { coins_earned })))
        }
        fn session_state(&self, _: &str) -> ApiFuture<GameSnapshot> {
            unused()
        }
        fn apply_move(&self, _: &str, _: MoveRequest) -> ApiFuture<GameSnapshot> {
            unused()
        }
        fn online_opponents(&self) -> ApiFuture<Vec<OnlinePlayer>> {
            unused()
        }
        fn my_invites(&self) -> ApiFuture<InviteLists> {
            unused()
        }
        fn send_invite(&self, _: &str) -> ApiFuture<Invite> {
            unused()
        }
        fn respond_invite(&self, _: &str, _: bool) -> ApiFuture<InviteResponse> {
            unused()
        }
        fn cancel_invite(&self, _: &str) -> ApiFuture<Invite> {
            unused()
        }
    }

    struct Collector(Rc<RefCell<Vec<SessionEvent>>>);

    impl Actor for Collector {
        type Context = Context<Self>;
    }

    impl Handler<SessionEvent> for Collector {
        type Result = ();

        fn handle(&mut self, event: SessionEvent, _: &mut Self::Context) {
            self.0.borrow_mut().push(event);
        }
    }

    struct Setup {
        view: Addr<BotMatch>,
        api: Rc<ResultSink>,
        events: Rc<RefCell<Vec<SessionEvent>>>,
    }

    fn start(level: BotLevel, side: Side, clock_seconds: u32, clock_tick: Duration) -> Setup {
        let config = EngineConfig {
            bot_delay_ms: 5..10,
            clock_tick,
            ..EngineConfig::default()
        };
        start_with(config, level, side, clock_seconds)
    }

    fn start_with(config: EngineConfig, level: BotLevel, side: Side, clock_seconds: u32) -> Setup {
        let session = GameSession::new("b1", "alice", side, Opponent::Bot(level), clock_seconds);
        let engine = BotEngine::new(level, Box::new(RngSource::seeded(9)));
        let api = Rc::new(ResultSink::default());
        let events = Rc::new(RefCell::new(Vec::new()));
        let recipient = Collector(events.clone()).start().recipient();
        let view = BotMatch::new(config, session, engine, api.clone(), recipient).start();
        Setup { view, api, events }
    }

    async fn settle(ms: u64) {
        actix_rt::time::sleep(Duration::from_millis(ms)).await;
    }

    #[actix_rt::test]
    async fn create_starts_a_local_game_from_the_server_snapshot() {
        let api = Rc::new(ResultSink::default());
        let events = Rc::new(RefCell::new(Vec::new()));
        let recipient = Collector(events.clone()).start().recipient();
        let config = EngineConfig {
            bot_delay_ms: 5..10,
            ..EngineConfig::default()
        };
        let view = BotMatch::create(config, api, "alice".to_string(), BotLevel::Medium, recipient)
            .await
            .unwrap();

        let session = view.send(CurrentSession).await.unwrap();
        assert_eq!(session.id(), "b2");
        assert_eq!(session.opponent(), Opponent::Bot(BotLevel::Medium));
        assert_eq!(session.status(), SessionStatus::Active);
        assert!(session.is_players_turn());
    }

    #[actix_rt::test]
    async fn bot_answers_each_player_move_once() {
        let setup = start(BotLevel::Easy, Side::White, 300, Duration::from_secs(60));
        setup.view.send(SubmitMove::new("e2", "e4")).await.unwrap().unwrap();

        let early = setup.view.send(SubmitMove::new("d2", "d4")).await.unwrap();
        assert!(matches!(early, Err(SessionError::NotYourTurn)));

        settle(60).await;
        let session = setup.view.send(CurrentSession).await.unwrap();
        assert_eq!(session.seq(), 2);
        assert_eq!(session.turn(), Side::White);
        session.check_invariants().unwrap();
    }

    #[actix_rt::test]
    async fn bot_opens_when_the_player_is_black() {
        let setup = start(BotLevel::Medium, Side::Black, 300, Duration::from_secs(60));
        settle(60).await;
        let session = setup.view.send(CurrentSession).await.unwrap();
        assert_eq!(session.seq(), 1);
        assert!(session.is_players_turn());
    }

    #[actix_rt::test]
    async fn resigning_reports_a_loss_once() {
        let setup = start(BotLevel::Hard, Side::White, 300, Duration::from_secs(60));
        setup.view.send(Resign).await.unwrap();
        let _ = setup.view.send(Resign).await;
        settle(30).await;

        assert_eq!(*setup.api.finished.borrow(), vec![MatchResult::Lose]);
        let events = setup.events.borrow();
        let overs: Vec<&Outcome> = events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::GameOver(outcome) => Some(outcome),
                _ => None,
            })
            .collect();
        assert_eq!(overs.len(), 1);
        assert_eq!(overs[0].result, MatchResult::Lose);
        assert!(!events
            .iter()
            .any(|e| matches!(e, SessionEvent::BalanceChanged { .. })));
    }

    #[actix_rt::test]
    async fn bot_running_out_of_time_is_a_paid_win() {
        let config = EngineConfig {
            bot_delay_ms: 500..600,
            clock_tick: Duration::from_millis(10),
            ..EngineConfig::default()
        };
        let setup = start_with(config, BotLevel::Hard, Side::White, 1);
        setup.view.send(SubmitMove::new("e2", "e4")).await.unwrap().unwrap();
        settle(80).await;

        assert_eq!(*setup.api.finished.borrow(), vec![MatchResult::Win]);
        let coins_earned = coins_for(Opponent::Bot(BotLevel::Hard), MatchResult::Win);
        assert!(coins_earned > 0);
        let events = setup.events.borrow();
        let balances: Vec<&SessionEvent> = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::BalanceChanged { .. }))
            .collect();
        assert_eq!(balances, vec![&SessionEvent::BalanceChanged { coins_earned }]);
    }

    #[actix_rt::test]
    async fn flag_fall_loses_on_time() {
        let setup = start(BotLevel::Easy, Side::White, 1, Duration::from_millis(10));
        settle(80).await;

        assert_eq!(*setup.api.finished.borrow(), vec![MatchResult::Lose]);
        let events = setup.events.borrow();
        let finished = events.iter().rev().find_map(|e| match e {
            SessionEvent::Updated(session) => Some(session.status()),
            _ => None,
        });
        assert_eq!(finished, Some(SessionStatus::Finished));
        assert!(!setup.view.connected());
    }
}
