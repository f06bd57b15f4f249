//! Opponent selection and invites.
//!
//! The [`Lobby`] actor polls the online list and the player's invites while
//! the selector is open. Once a game is entered it stops; the caller then
//! starts a session view for the returned snapshot.

use std::collections::HashSet;
use std::rc::Rc;

use actix::prelude::*;
use log::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::LobbyError;
use crate::models::invite::{Invite, InviteStatus, OnlinePlayer};
use crate::models::messages::{GameSnapshot, InviteLists};
use crate::sync::transport::GameApi;

/// Last known state of the selector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InviteBoard {
    pub players: Vec<OnlinePlayer>,
    pub invites: InviteLists,
}

impl InviteBoard {
    /// Reject a second PENDING invite to the same player.
    pub fn check_can_invite(&self, to_player_id: &str) -> Result<(), LobbyError> {
        let duplicate = self
            .invites
            .outgoing
            .iter()
            .any(|invite| invite.to_id == to_player_id && invite.is_pending());
        if duplicate {
            return Err(LobbyError::AlreadyInvited(to_player_id.to_string()));
        }
        Ok(())
    }

    /// Game of an accepted invite that has not been entered yet. Outgoing
    /// invites are checked first.
    pub fn accepted_game(&self) -> Option<&str> {
        self.invites
            .outgoing
            .iter()
            .chain(self.invites.incoming.iter())
            .find(|invite| invite.is_joinable())
            .and_then(|invite| invite.game_id.as_deref())
    }

    /// Record an invite returned by the service ahead of the next poll.
    pub fn record_outgoing(&mut self, invite: Invite) {
        let target = invite.to_id.clone();
        match self.invites.outgoing.iter_mut().find(|i| i.id == invite.id) {
            Some(existing) => *existing = invite,
            None => self.invites.outgoing.push(invite),
        }
        if let Some(player) = self.players.iter_mut().find(|p| p.id == target) {
            player.has_pending_invite = true;
        }
    }

    pub fn replace_invite(&mut self, invite: Invite) {
        for list in [&mut self.invites.incoming, &mut self.invites.outgoing] {
            if let Some(existing) = list.iter_mut().find(|i| i.id == invite.id) {
                *existing = invite.clone();
            }
        }
    }

    pub fn pending_incoming(&self) -> impl Iterator<Item = &Invite> {
        self.invites
            .incoming
            .iter()
            .filter(|invite| invite.status == InviteStatus::Pending)
    }
}

#[derive(Message, Debug, Clone)]
#[rtype(result = "Result<Invite, LobbyError>")]
pub struct SendInvite {
    pub to_player_id: String,
}

#[derive(Message, Debug, Clone)]
#[rtype(result = "Result<Invite, LobbyError>")]
pub struct RespondInvite {
    pub invite_id: String,
    pub accept: bool,
}

#[derive(Message, Debug, Clone)]
#[rtype(result = "Result<Invite, LobbyError>")]
pub struct CancelInvite {
    pub invite_id: String,
}

/// Enter the game of an accepted invite.
#[derive(Message, Debug, Clone, Copy)]
#[rtype(result = "Result<(), LobbyError>")]
pub struct JoinGame;

#[derive(Message, Debug, Clone, Copy)]
#[rtype(result = "()")]
pub struct CloseLobby;

#[derive(Message, Debug, Clone, PartialEq)]
#[rtype(result = "()")]
pub enum LobbyEvent {
    Updated(InviteBoard),
    /// An accepted invite is waiting to be joined.
    GameReady { game_id: String },
    /// Selector is done; start a session view for this game.
    EnterGame(GameSnapshot),
    Status(String),
}

pub struct Lobby {
    config: EngineConfig,
    api: Rc<dyn GameApi>,
    events: Recipient<LobbyEvent>,
    board: InviteBoard,
    /// Players with an invite request still on the wire.
    inviting: HashSet<String>,
    refresh_in_flight: bool,
    entering: bool,
}

impl Lobby {
    pub fn new(config: EngineConfig, api: Rc<dyn GameApi>, events: Recipient<LobbyEvent>) -> Self {
        Self {
            config,
            api,
            events,
            board: InviteBoard::default(),
            inviting: HashSet::new(),
            refresh_in_flight: false,
            entering: false,
        }
    }

    fn emit(&self, event: LobbyEvent) {
        self.events.do_send(event);
    }

    fn refresh(&mut self, ctx: &mut Context<Self>) {
        if self.refresh_in_flight || self.entering {
            return;
        }
        self.refresh_in_flight = true;
        let players = self.api.online_opponents();
        let invites = self.api.my_invites();
        let both = async move { futures::join!(players, invites) };
        ctx.spawn(both.into_actor(self).map(|(players, invites), act, _| {
            act.refresh_in_flight = false;
            if act.entering {
                return;
            }
            match (players, invites) {
                (Ok(players), Ok(invites)) => {
                    act.board = InviteBoard { players, invites };
                    act.emit(LobbyEvent::Updated(act.board.clone()));
                    if let Some(game_id) = act.board.accepted_game() {
                        act.emit(LobbyEvent::GameReady {
                            game_id: game_id.to_string(),
                        });
                    }
                }
                (Err(e), _) | (_, Err(e)) => {
                    warn!("Lobby refresh failed: {}", e);
                    act.emit(LobbyEvent::Status(e.to_string()));
                }
            }
        }));
    }

    fn enter(&mut self, game: GameSnapshot, ctx: &mut Context<Self>) {
        if self.entering {
            return;
        }
        self.entering = true;
        info!("Entering game {}", game.id);
        self.emit(LobbyEvent::EnterGame(game));
        ctx.stop();
    }
}

impl Actor for Lobby {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        debug!("Lobby open, polling every {:?}", self.config.lobby_poll_interval);
        self.refresh(ctx);
        ctx.run_interval(self.config.lobby_poll_interval, |act, ctx| act.refresh(ctx));
    }
}

impl Handler<SendInvite> for Lobby {
    type Result = ResponseActFuture<Self, Result<Invite, LobbyError>>;

    fn handle(&mut self, msg: SendInvite, _: &mut Self::Context) -> Self::Result {
        let to = msg.to_player_id;
        let checked = if self.inviting.contains(&to) {
            Err(LobbyError::AlreadyInvited(to.clone()))
        } else {
            self.board.check_can_invite(&to)
        };
        if let Err(e) = checked {
            debug!("Not sending invite: {}", e);
            return Box::pin(actix::fut::ready(Err(e)));
        }
        let pending = self.api.send_invite(&to);
        self.inviting.insert(to.clone());
        Box::pin(pending.into_actor(self).map(move |res, act, _| {
            act.inviting.remove(&to);
            let invite = res?;
            info!("Invited {} ({})", invite.to_id, invite.id);
            act.board.record_outgoing(invite.clone());
            act.emit(LobbyEvent::Updated(act.board.clone()));
            Ok(invite)
        }))
    }
}

impl Handler<RespondInvite> for Lobby {
    type Result = ResponseActFuture<Self, Result<Invite, LobbyError>>;

    fn handle(&mut self, msg: RespondInvite, _: &mut Self::Context) -> Self::Result {
        let pending = self.api.respond_invite(&msg.invite_id, msg.accept);
        Box::pin(pending.into_actor(self).map(|res, act, ctx| {
            let response = res?;
            act.board.replace_invite(response.invite.clone());
            match response.game {
                Some(game) => act.enter(game, ctx),
                None => act.emit(LobbyEvent::Updated(act.board.clone())),
            }
            Ok(response.invite)
        }))
    }
}

impl Handler<CancelInvite> for Lobby {
    type Result = ResponseActFuture<Self, Result<Invite, LobbyError>>;

    fn handle(&mut self, msg: CancelInvite, _: &mut Self::Context) -> Self::Result {
        let pending = self.api.cancel_invite(&msg.invite_id);
        Box::pin(pending.into_actor(self).map(|res, act, _| {
            let invite = res?;
            act.board.replace_invite(invite.clone());
            act.emit(LobbyEvent::Updated(act.board.clone()));
            Ok(invite)
        }))
    }
}

impl Handler<JoinGame> for Lobby {
    type Result = ResponseActFuture<Self, Result<(), LobbyError>>;

    fn handle(&mut self, _: JoinGame, _: &mut Self::Context) -> Self::Result {
        let Some(game_id) = self.board.accepted_game() else {
            return Box::pin(actix::fut::ready(Err(LobbyError::NothingToJoin)));
        };
        let pending = self.api.session_state(game_id);
        Box::pin(pending.into_actor(self).map(|res, act, ctx| {
            let game = res?;
            act.enter(game, ctx);
            Ok(())
        }))
    }
}

impl Handler<CloseLobby> for Lobby {
    type Result = ();

    fn handle(&mut self, _: CloseLobby, ctx: &mut Self::Context) {
        ctx.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::time::Duration;

    use futures::future;

    use super::*;
    use crate::error::ApiError;
    use crate::models::messages::{FinishReceipt, InviteResponse, MoveRequest};
    use crate::models::session::{MatchResult, Opponent};
    use crate::sync::transport::ApiFuture;

    fn invite(id: &str, from: &str, to: &str, status: InviteStatus, game: Option<&str>) -> Invite {
        Invite {
            id: id.to_string(),
            from_id: from.to_string(),
            to_id: to.to_string(),
            status,
            game_id: game.map(str::to_string),
            from_name: None,
            to_name: None,
        }
    }

    fn unused<T: 'static>() -> ApiFuture<T> {
        Box::pin(future::ready(Err(ApiError::Decode("unused".to_string()))))
    }

    #[derive(Default)]
    struct FakeApi {
        lists: RefCell<InviteLists>,
        polls: Cell<usize>,
        sent: Cell<usize>,
    }

    impl GameApi for FakeApi {
        fn create_session(&self, _: Opponent) -> ApiFuture<GameSnapshot> {
            unused()
        }
        fn finish_session(&self, _: &str, _: MatchResult) -> ApiFuture<FinishReceipt> {
            unused()
        }
        fn session_state(&self, game_id: &str) -> ApiFuture<GameSnapshot> {
            let game = GameSnapshot {
                id: game_id.to_string(),
                ..GameSnapshot::default()
            };
            Box::pin(future::ready(Ok(game)))
        }
        fn apply_move(&self, _: &str, _: MoveRequest) -> ApiFuture<GameSnapshot> {
            unused()
        }
        fn online_opponents(&self) -> ApiFuture<Vec<OnlinePlayer>> {
            self.polls.set(self.polls.get() + 1);
            let bob = OnlinePlayer {
                id: "bob".to_string(),
                display_name: "Bob".to_string(),
                has_pending_invite: false,
            };
            Box::pin(future::ready(Ok(vec![bob])))
        }
        fn my_invites(&self) -> ApiFuture<InviteLists> {
            Box::pin(future::ready(Ok(self.lists.borrow().clone())))
        }
        fn send_invite(&self, to: &str) -> ApiFuture<Invite> {
            self.sent.set(self.sent.get() + 1);
            let sent = invite("i-new", "alice", to, InviteStatus::Pending, None);
            Box::pin(future::ready(Ok(sent)))
        }
        fn respond_invite(&self, invite_id: &str, accept: bool) -> ApiFuture<InviteResponse> {
            let (status, game) = if accept {
                (InviteStatus::Accepted, Some("g9"))
            } else {
                (InviteStatus::Declined, None)
            };
            let response = InviteResponse {
                invite: invite(invite_id, "bob", "alice", status, game),
                game: game.map(|id| GameSnapshot {
                    id: id.to_string(),
                    ..GameSnapshot::default()
                }),
            };
            Box::pin(future::ready(Ok(response)))
        }
        fn cancel_invite(&self, _: &str) -> ApiFuture<Invite> {
            unused()
        }
    }

    struct Collector(Rc<RefCell<Vec<LobbyEvent>>>);

    impl Actor for Collector {
        type Context = Context<Self>;
    }

    impl Handler<LobbyEvent> for Collector {
        type Result = ();

        fn handle(&mut self, event: LobbyEvent, _: &mut Self::Context) {
            self.0.borrow_mut().push(event);
        }
    }

    fn open(api: Rc<FakeApi>) -> (Addr<Lobby>, Rc<RefCell<Vec<LobbyEvent>>>) {
        let config = EngineConfig {
            lobby_poll_interval: Duration::from_millis(20),
            ..EngineConfig::default()
        };
        let events = Rc::new(RefCell::new(Vec::new()));
        let recipient = Collector(events.clone()).start().recipient();
        (Lobby::new(config, api, recipient).start(), events)
    }

    async fn settle(ms: u64) {
        actix_rt::time::sleep(Duration::from_millis(ms)).await;
    }

    #[test]
    fn duplicate_pending_invite_is_rejected() {
        let mut board = InviteBoard::default();
        board
            .invites
            .outgoing
            .push(invite("i1", "alice", "bob", InviteStatus::Pending, None));
        assert!(matches!(
            board.check_can_invite("bob"),
            Err(LobbyError::AlreadyInvited(_))
        ));
        assert!(board.check_can_invite("carol").is_ok());

        board.invites.outgoing[0].status = InviteStatus::Declined;
        assert!(board.check_can_invite("bob").is_ok());
    }

    #[test]
    fn accepted_invite_stays_discoverable() {
        let mut board = InviteBoard::default();
        board
            .invites
            .incoming
            .push(invite("i2", "carol", "alice", InviteStatus::Accepted, Some("g2")));
        board
            .invites
            .outgoing
            .push(invite("i1", "alice", "bob", InviteStatus::Pending, None));
        assert_eq!(board.accepted_game(), Some("g2"));
        assert_eq!(board.pending_incoming().count(), 0);
    }

    #[actix_rt::test]
    async fn second_invite_to_the_same_player_never_reaches_the_network() {
        let api = Rc::new(FakeApi::default());
        let (lobby, _events) = open(api.clone());
        settle(10).await;

        lobby
            .send(SendInvite {
                to_player_id: "bob".to_string(),
            })
            .await
            .unwrap()
            .unwrap();
        let again = lobby
            .send(SendInvite {
                to_player_id: "bob".to_string(),
            })
            .await
            .unwrap();
        assert!(matches!(again, Err(LobbyError::AlreadyInvited(_))));
        assert_eq!(api.sent.get(), 1);
    }

    #[actix_rt::test]
    async fn back_to_back_invites_send_one_request() {
        let api = Rc::new(FakeApi::default());
        let (lobby, _events) = open(api.clone());
        settle(10).await;

        let invite_bob = || SendInvite {
            to_player_id: "bob".to_string(),
        };
        let (first, second) = futures::join!(lobby.send(invite_bob()), lobby.send(invite_bob()));
        let results = [first.unwrap(), second.unwrap()];

        assert_eq!(api.sent.get(), 1);
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(LobbyError::AlreadyInvited(_))))
                .count(),
            1
        );
    }

    #[actix_rt::test]
    async fn accepting_enters_the_game_and_stops_polling() {
        let api = Rc::new(FakeApi::default());
        api.lists
            .borrow_mut()
            .incoming
            .push(invite("i3", "bob", "alice", InviteStatus::Pending, None));
        let (lobby, events) = open(api.clone());
        settle(10).await;

        let accepted = lobby
            .send(RespondInvite {
                invite_id: "i3".to_string(),
                accept: true,
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(accepted.status, InviteStatus::Accepted);

        let polls = api.polls.get();
        settle(60).await;
        assert_eq!(api.polls.get(), polls);
        assert!(!lobby.connected());
        assert!(events
            .borrow()
            .iter()
            .any(|e| matches!(e, LobbyEvent::EnterGame(game) if game.id == "g9")));
    }

    #[actix_rt::test]
    async fn accepted_invite_can_be_joined_later() {
        let api = Rc::new(FakeApi::default());
        api.lists
            .borrow_mut()
            .outgoing
            .push(invite("i4", "alice", "bob", InviteStatus::Accepted, Some("g4")));
        let (lobby, events) = open(api);
        settle(50).await;

        let ready = events
            .borrow()
            .iter()
            .filter(|e| matches!(e, LobbyEvent::GameReady { game_id } if game_id == "g4"))
            .count();
        assert!(ready >= 2);

        lobby.send(JoinGame).await.unwrap().unwrap();
        settle(10).await;
        assert!(events
            .borrow()
            .iter()
            .any(|e| matches!(e, LobbyEvent::EnterGame(game) if game.id == "g4")));
    }
}
