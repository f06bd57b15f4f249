use actix::prelude::*;
use chess::Color;
use futures::channel::mpsc::UnboundedSender;
use futures::StreamExt;
use log::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::SessionError;
use crate::events::{turn_status, CloseView, CurrentSession, Resign, SessionEvent, SubmitMove};
use crate::models::messages::{ClientFrame, GameSnapshot, MoveRequest, ServerFrame};
use crate::models::session::{GameSession, MatchResult, SessionStatus, SnapshotEffect};
use crate::sync::connection::{
    classify_error, ConnectionMode, ConnectionState, Directive, FailureKind,
};
use crate::sync::transport::{Channel, ChannelEvent, Services};

pub const STATUS_CONNECTED: &str = "Connected";
pub const STATUS_RECONNECTING: &str = "Reconnecting...";
pub const STATUS_POLLING: &str = "Connection lost, refreshing every 2s";
pub const STATUS_UNAVAILABLE: &str = "Game unavailable";
pub const STATUS_GAME_OVER: &str = "Game over";

/// Channel event tagged with the channel generation that produced it.
struct Tagged {
    generation: u64,
    event: ChannelEvent,
}

/// Session view for a game against a remote opponent.
///
/// Holds the authoritative copy of the game and keeps it current over the
/// live channel, reconnecting with backoff and falling back to polling.
/// Everything runs on the actor's context so channel events, timers and
/// request completions never interleave mid-update.
pub struct LiveSession {
    config: EngineConfig,
    session: GameSession,
    state: ConnectionState,
    services: Services,
    events: Recipient<SessionEvent>,
    outbound: Option<UnboundedSender<ClientFrame>>,
    stream: Option<SpawnHandle>,
    /// Bumped whenever a channel is torn down; stale events and stale
    /// connect completions are dropped by comparing against it.
    generation: u64,
    reconnect_timer: Option<SpawnHandle>,
    poll_timer: Option<SpawnHandle>,
    fetch_in_flight: bool,
    move_in_flight: bool,
    terminal_fired: bool,
}

impl LiveSession {
    pub fn new(
        config: EngineConfig,
        session: GameSession,
        services: Services,
        events: Recipient<SessionEvent>,
    ) -> Self {
        let state = ConnectionState::new(config.reconnect_cap, config.backoff_step);
        Self {
            config,
            session,
            state,
            services,
            events,
            outbound: None,
            stream: None,
            generation: 0,
            reconnect_timer: None,
            poll_timer: None,
            fetch_in_flight: false,
            move_in_flight: false,
            terminal_fired: false,
        }
    }

    /// Starts a view of a game the lobby handed over, for `player_id`.
    pub fn open(
        config: EngineConfig,
        snapshot: &GameSnapshot,
        player_id: impl Into<String>,
        services: Services,
        events: Recipient<SessionEvent>,
    ) -> Result<Addr<LiveSession>, SessionError> {
        let session =
            GameSession::from_snapshot(snapshot, player_id, config.default_clock_seconds)?;
        Ok(LiveSession::new(config, session, services, events).start())
    }

    fn emit(&self, event: SessionEvent) {
        self.events.do_send(event);
    }

    fn emit_session(&self) {
        self.emit(SessionEvent::Updated(Box::new(self.session.clone())));
    }

    fn connect(&mut self, token: String, ctx: &mut Context<Self>) {
        let generation = self.generation;
        debug!("Opening channel for game {} (generation {})", self.session.id(), generation);
        let pending = self.services.connector.connect(self.session.id(), &token);
        ctx.spawn(pending.into_actor(self).map(move |res, act, ctx| {
            if act.generation != generation || act.state.is_polling() || act.session.is_finished() {
                debug!("Dropping stale channel for game {}", act.session.id());
                return;
            }
            match res {
                Ok(channel) => act.attach(channel, ctx),
                Err(e) => act.on_channel_failure(FailureKind::Transient, e.to_string(), ctx),
            }
        }));
    }

    fn attach(&mut self, channel: Channel, ctx: &mut Context<Self>) {
        if !self.state.on_opened() {
            return;
        }
        let generation = self.generation;
        self.outbound = Some(channel.outbound);
        self.stream = Some(ctx.add_stream(
            channel.events.map(move |event| Tagged { generation, event }),
        ));
        info!("Game {} is live", self.session.id());
        self.emit(SessionEvent::Mode(ConnectionMode::Live));
        self.emit(SessionEvent::Status(STATUS_CONNECTED.to_string()));
    }

    /// Ask for a fresh token, then reopen the channel after `delay`.
    fn refresh_then_connect(
        &mut self,
        delay: std::time::Duration,
        require_fresh_token: bool,
        ctx: &mut Context<Self>,
    ) {
        let generation = self.generation;
        let refresh = self.services.auth.refresh();
        ctx.spawn(refresh.into_actor(self).map(move |refreshed, act, ctx| {
            if act.generation != generation || act.state.is_polling() {
                return;
            }
            let token = match refreshed {
                Some(token) => Some(token),
                None if require_fresh_token => None,
                None => act.services.tokens.access(),
            };
            match token {
                Some(token) => {
                    act.reconnect_timer = Some(ctx.run_later(delay, move |act, ctx| {
                        act.reconnect_timer = None;
                        act.connect(token, ctx);
                    }));
                }
                None => {
                    warn!("No credential for game {}, switching to polling", act.session.id());
                    act.enter_polling(STATUS_POLLING, ctx);
                }
            }
        }));
    }

    fn teardown_channel(&mut self, ctx: &mut Context<Self>) {
        if let Some(handle) = self.stream.take() {
            ctx.cancel_future(handle);
        }
        if let Some(handle) = self.reconnect_timer.take() {
            ctx.cancel_future(handle);
        }
        self.outbound = None;
        self.generation += 1;
    }

    fn on_channel_failure(&mut self, kind: FailureKind, reason: impl Into<String>, ctx: &mut Context<Self>) {
        if self.session.is_finished() {
            return;
        }
        let reason = reason.into();
        self.teardown_channel(ctx);

        match self.state.on_failure(kind, reason.clone()) {
            Directive::Ignore => {}
            Directive::DegradeToPolling => {
                warn!("Game {}: giving up on the channel ({})", self.session.id(), reason);
                let status = if kind == FailureKind::SessionInvalid {
                    STATUS_UNAVAILABLE
                } else {
                    STATUS_POLLING
                };
                self.enter_polling(status, ctx);
            }
            Directive::Reconnect {
                attempt,
                delay,
                require_fresh_token,
            } => {
                info!(
                    "Game {}: channel lost ({}), reconnect attempt {} in {:?}",
                    self.session.id(),
                    reason,
                    attempt,
                    delay
                );
                self.emit(SessionEvent::Mode(ConnectionMode::Reconnecting));
                self.emit(SessionEvent::Status(STATUS_RECONNECTING.to_string()));
                self.refresh_then_connect(delay, require_fresh_token, ctx);
            }
        }
    }

    fn enter_polling(&mut self, status: &str, ctx: &mut Context<Self>) {
        self.teardown_channel(ctx);
        self.state.degrade(status);
        if self.poll_timer.is_some() {
            return;
        }
        info!("Game {} is now polled every {:?}", self.session.id(), self.config.poll_interval);
        self.emit(SessionEvent::Mode(ConnectionMode::Polling));
        self.emit(SessionEvent::Status(status.to_string()));
        self.fetch_snapshot(ctx);
        self.poll_timer = Some(ctx.run_interval(self.config.poll_interval, |act, ctx| {
            act.fetch_snapshot(ctx);
        }));
    }

    fn fetch_snapshot(&mut self, ctx: &mut Context<Self>) {
        if self.fetch_in_flight || self.session.is_finished() {
            return;
        }
        self.fetch_in_flight = true;
        let pending = self.services.api.session_state(self.session.id());
        ctx.spawn(pending.into_actor(self).map(|res, act, ctx| {
            act.fetch_in_flight = false;
            match res {
                Ok(snapshot) => act.apply_snapshot(&snapshot, ctx),
                Err(e) => {
                    warn!("Snapshot fetch for game {} failed: {}", act.session.id(), e);
                    act.emit(SessionEvent::Status(e.to_string()));
                }
            }
        }));
    }

    fn apply_snapshot(&mut self, snapshot: &GameSnapshot, ctx: &mut Context<Self>) {
        match self.session.apply_snapshot(snapshot) {
            Ok(SnapshotEffect::Applied) => {
                self.emit_session();
                self.emit(SessionEvent::Status(turn_status(&self.session).to_string()));
            }
            Ok(SnapshotEffect::Finished) => {
                self.emit_session();
                self.fire_terminal(ctx);
            }
            Ok(SnapshotEffect::Stale) => {
                debug!(
                    "Ignoring stale snapshot for game {} ({} moves held locally)",
                    self.session.id(),
                    self.session.seq()
                );
            }
            Ok(SnapshotEffect::Ignored) => {}
            Err(e) => {
                warn!("Rejected snapshot for game {}: {}", self.session.id(), e);
                self.emit(SessionEvent::Status(e.to_string()));
            }
        }
    }

    fn on_frame(&mut self, frame: ServerFrame, ctx: &mut Context<Self>) {
        match frame {
            ServerFrame::GameState(snapshot) | ServerFrame::Move(snapshot) => {
                self.apply_snapshot(&snapshot, ctx);
            }
            ServerFrame::TimerUpdate(update) => {
                if self.session.apply_timer(&update) {
                    self.emit(SessionEvent::Clock {
                        clock: self.session.clock(),
                        turn: self.session.turn(),
                    });
                }
            }
            ServerFrame::GameOver(mut snapshot) => {
                snapshot.status = Some(SessionStatus::Finished);
                self.apply_snapshot(&snapshot, ctx);
            }
            ServerFrame::Error(error) => match classify_error(&error.message) {
                Some(kind) => self.on_channel_failure(kind, error.message, ctx),
                None => {
                    info!("Game {}: server says {}", self.session.id(), error.message);
                    self.emit(SessionEvent::Status(error.message));
                }
            },
            ServerFrame::ResignAck => debug!("Resignation acknowledged for game {}", self.session.id()),
        }
    }

    fn fire_terminal(&mut self, ctx: &mut Context<Self>) {
        if self.terminal_fired {
            return;
        }
        let Some(outcome) = self.session.outcome().cloned() else {
            return;
        };
        self.terminal_fired = true;
        info!(
            "Game {} finished: {:?} ({})",
            self.session.id(),
            outcome.result,
            outcome.reason
        );
        let coins_earned = outcome.coins_earned;
        self.emit(SessionEvent::GameOver(outcome));
        self.emit(SessionEvent::Status(STATUS_GAME_OVER.to_string()));
        if coins_earned > 0 {
            self.emit(SessionEvent::BalanceChanged { coins_earned });
        }
        self.shutdown(ctx);
    }

    fn shutdown(&mut self, ctx: &mut Context<Self>) {
        self.teardown_channel(ctx);
        if let Some(handle) = self.poll_timer.take() {
            ctx.cancel_future(handle);
        }
        ctx.stop();
    }

    fn send_live(&self, frame: ClientFrame) -> bool {
        if self.state.mode() != ConnectionMode::Live {
            return false;
        }
        match &self.outbound {
            Some(outbound) => outbound.unbounded_send(frame).is_ok(),
            None => false,
        }
    }
}

impl Actor for LiveSession {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!("Session view started for game {}", self.session.id());
        self.emit_session();
        self.emit(SessionEvent::Mode(self.state.mode()));
        if self.session.is_finished() {
            self.fire_terminal(ctx);
            return;
        }
        match self.services.tokens.access() {
            Some(token) => self.connect(token, ctx),
            None => self.refresh_then_connect(std::time::Duration::ZERO, true, ctx),
        }
    }

    fn stopped(&mut self, _: &mut Self::Context) {
        info!("Session view closed for game {}", self.session.id());
    }
}

impl StreamHandler<Tagged> for LiveSession {
    fn handle(&mut self, item: Tagged, ctx: &mut Self::Context) {
        if item.generation != self.generation {
            return;
        }
        match item.event {
            ChannelEvent::Frame(frame) => self.on_frame(frame, ctx),
            ChannelEvent::Failed(reason) => self.on_channel_failure(FailureKind::Transient, reason, ctx),
            ChannelEvent::Closed => self.on_channel_failure(FailureKind::Transient, "closed", ctx),
        }
    }

    // A finished channel is reported through `ChannelEvent::Closed`; the
    // view itself keeps running.
    fn finished(&mut self, _: &mut Self::Context) {}
}

impl Handler<SubmitMove> for LiveSession {
    type Result = Result<(), SessionError>;

    fn handle(&mut self, msg: SubmitMove, ctx: &mut Self::Context) -> Self::Result {
        let mv = self
            .session
            .validate_player_move(&msg.from, &msg.to, msg.promotion.as_deref())
            .map_err(|e| {
                debug!("Rejected {}-{}: {}", msg.from, msg.to, e);
                e
            })?;
        let from = mv.get_source().to_string();
        let to = mv.get_dest().to_string();
        let promotion = mv.get_promotion().map(|piece| piece.to_string(Color::Black));

        if self.send_live(ClientFrame::Move {
            from: from.clone(),
            to: to.clone(),
            promotion: promotion.clone(),
        }) {
            return Ok(());
        }

        if self.move_in_flight {
            return Err(SessionError::SubmissionPending);
        }
        self.move_in_flight = true;
        let pending = self.services.api.apply_move(
            self.session.id(),
            MoveRequest {
                from,
                to,
                promotion,
            },
        );
        ctx.spawn(pending.into_actor(self).map(|res, act, ctx| {
            act.move_in_flight = false;
            match res {
                Ok(snapshot) => act.apply_snapshot(&snapshot, ctx),
                Err(e) => {
                    warn!("Move submission for game {} failed: {}", act.session.id(), e);
                    act.emit(SessionEvent::Status(e.to_string()));
                }
            }
        }));
        Ok(())
    }
}

impl Handler<Resign> for LiveSession {
    type Result = ();

    fn handle(&mut self, _: Resign, ctx: &mut Self::Context) {
        if self.session.is_finished() {
            return;
        }
        if self.send_live(ClientFrame::Resign) {
            return;
        }
        let pending = self
            .services
            .api
            .finish_session(self.session.id(), MatchResult::Lose);
        ctx.spawn(pending.into_actor(self).map(|res, act, ctx| match res {
            Ok(receipt) => {
                debug!("Resigned game {} ({} coins)", act.session.id(), receipt.coins_earned);
                act.fetch_snapshot(ctx);
            }
            Err(e) => {
                warn!("Resignation for game {} failed: {}", act.session.id(), e);
                act.emit(SessionEvent::Status(e.to_string()));
            }
        }));
    }
}

impl Handler<CloseView> for LiveSession {
    type Result = ();

    fn handle(&mut self, _: CloseView, ctx: &mut Self::Context) {
        self.shutdown(ctx);
    }
}

impl Handler<CurrentSession> for LiveSession {
    type Result = MessageResult<CurrentSession>;

    fn handle(&mut self, _: CurrentSession, _: &mut Self::Context) -> Self::Result {
        MessageResult(self.session.clone())
    }
}
