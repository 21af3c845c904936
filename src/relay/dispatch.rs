//! Session relay - validates inbound events against room state and fans them out

use tracing::{debug, info};

use crate::config::StartMode;
use crate::lobby::registry::normalize_room_code;
use crate::lobby::{
    Departure, EnterGame, IdentityReconciler, LobbyError, Resolution, RoomRegistry, Seat,
};
use crate::ws::protocol::{
    ClientMsg, ConnectionId, GameStateSnapshot, PlayerNumber, RoomEntered, RoomId, RoomState,
    ServerMsg, PIECE_KINDS,
};

/// One outbound message for one connection
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub to: ConnectionId,
    pub msg: ServerMsg,
}

/// Collects outbound messages produced while handling one inbound event
#[derive(Debug, Default)]
pub struct Outbox {
    envelopes: Vec<Envelope>,
}

impl Outbox {
    /// Unicast
    pub fn send(&mut self, to: ConnectionId, msg: ServerMsg) {
        self.envelopes.push(Envelope { to, msg });
    }

    /// Every member, sender included
    pub fn broadcast(&mut self, members: &[ConnectionId], msg: ServerMsg) {
        for member in members {
            self.send(*member, msg.clone());
        }
    }

    /// Every member except `sender`
    pub fn relay_to_others(&mut self, members: &[ConnectionId], sender: ConnectionId, msg: ServerMsg) {
        for member in members.iter().filter(|m| **m != sender) {
            self.send(*member, msg.clone());
        }
    }

    pub fn into_envelopes(self) -> Vec<Envelope> {
        self.envelopes
    }
}

/// Why an inbound event was not relayed
#[derive(Debug)]
enum Rejection {
    /// Reported back to the sender
    Refused(LobbyError),
    /// Silently dropped (stale or invalid gameplay traffic)
    Dropped(&'static str),
}

impl From<LobbyError> for Rejection {
    fn from(err: LobbyError) -> Self {
        Rejection::Refused(err)
    }
}

/// Sender's verified place in a playing room
struct GameplayContext {
    members: Vec<ConnectionId>,
    player_number: PlayerNumber,
    room_id: RoomId,
}

/// Message dispatcher on top of the room registry
pub struct SessionRelay {
    registry: RoomRegistry,
    reconciler: IdentityReconciler,
}

impl SessionRelay {
    pub fn new(start_mode: StartMode, nickname_fallback: bool) -> Self {
        Self {
            registry: RoomRegistry::new(start_mode),
            reconciler: IdentityReconciler::new(nickname_fallback),
        }
    }

    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    /// Handle one inbound message from `sender`
    pub fn handle(&mut self, sender: ConnectionId, msg: ClientMsg) -> Vec<Envelope> {
        let mut out = Outbox::default();
        let kind = msg.kind();

        let result = match msg {
            ClientMsg::CreateRoom {
                name,
                max_players,
                host_nickname,
            } => self.create_room(&mut out, sender, &name, max_players, &host_nickname),
            ClientMsg::JoinRoom {
                room_code,
                nickname,
            } => self.join_room(&mut out, sender, &room_code, &nickname),
            ClientMsg::LeaveRoom { room_id } => self.leave_room(&mut out, sender, &room_id),
            ClientMsg::StartGame { room_id } => self.start_game(&mut out, sender, &room_id),
            ClientMsg::JoinGameRoom {
                room_id,
                nickname,
                prior_identity,
            } => self.join_game_room(
                &mut out,
                EnterGame {
                    room_id,
                    connection: sender,
                    prior_identity,
                    nickname,
                },
            ),
            ClientMsg::GetRooms => {
                out.send(
                    sender,
                    ServerMsg::RoomsList {
                        rooms: self.registry.list_joinable(),
                    },
                );
                Ok(())
            }
            ClientMsg::FruitMove {
                room_id,
                player_number,
                seq,
                x,
                y,
            } => self.gameplay(sender, &room_id, player_number).and_then(|ctx| {
                if !x.is_finite() || !y.is_finite() {
                    return Err(Rejection::Dropped("non-finite position"));
                }
                out.relay_to_others(
                    &ctx.members,
                    sender,
                    ServerMsg::OpponentFruitMove {
                        player_number,
                        seq,
                        x,
                        y,
                    },
                );
                Ok(())
            }),
            ClientMsg::FruitDropped {
                room_id,
                player_number,
                seq,
                fruit_index,
                next_fruit_index,
            } => self.gameplay(sender, &room_id, player_number).and_then(|ctx| {
                if fruit_index >= PIECE_KINDS || next_fruit_index >= PIECE_KINDS {
                    return Err(Rejection::Dropped("piece index out of range"));
                }
                out.relay_to_others(
                    &ctx.members,
                    sender,
                    ServerMsg::OpponentFruitDropped {
                        player_number,
                        seq,
                        fruit_index,
                        next_fruit_index,
                    },
                );
                Ok(())
            }),
            ClientMsg::InitializeFruit {
                room_id,
                player_number,
                seq,
                fruit_index,
            } => self.gameplay(sender, &room_id, player_number).and_then(|ctx| {
                if fruit_index >= PIECE_KINDS {
                    return Err(Rejection::Dropped("piece index out of range"));
                }
                out.relay_to_others(
                    &ctx.members,
                    sender,
                    ServerMsg::OpponentInitialFruit {
                        player_number,
                        seq,
                        fruit_index,
                    },
                );
                Ok(())
            }),
            ClientMsg::CompleteGameState {
                room_id,
                game_state,
            } => self.complete_state(&mut out, sender, &room_id, game_state),
            ClientMsg::RequestCompleteState {
                room_id,
                target_player_number,
            } => self.request_state(&mut out, sender, &room_id, target_player_number),
            ClientMsg::SendCompleteState {
                room_id,
                requester_player_number,
                game_state,
            } => self.answer_state_request(
                &mut out,
                sender,
                &room_id,
                requester_player_number,
                game_state,
            ),
            ClientMsg::ScoreUpdate {
                room_id,
                player_number,
                score,
            } => self.score_update(&mut out, sender, &room_id, player_number, score),
            ClientMsg::PlayerWon {
                room_id,
                player_number,
                score,
                merge_count,
            } => self.player_won(&mut out, sender, &room_id, player_number, score, merge_count),
            ClientMsg::PlayAgain { room_id } => self.play_again(&mut out, sender, &room_id),
            ClientMsg::UpdateProfile { nickname, is_ready } => {
                self.update_profile(&mut out, sender, &nickname, is_ready)
            }
            ClientMsg::Ping { t } => {
                out.send(sender, ServerMsg::Pong { t });
                Ok(())
            }
        };

        match result {
            Ok(()) => {}
            Err(Rejection::Refused(err)) => {
                debug!(connection = %sender, kind, error = %err, "request refused");
                out.send(sender, err.into());
            }
            Err(Rejection::Dropped(reason)) => {
                debug!(connection = %sender, kind, reason, "event dropped");
            }
        }

        out.into_envelopes()
    }

    /// Synchronous cleanup for a closed connection
    pub fn disconnect(&mut self, connection: ConnectionId) -> Vec<Envelope> {
        let mut out = Outbox::default();
        if let Some(departure) = self.registry.disconnect(connection) {
            info!(
                room_id = %departure.room_id,
                player = departure.player_number,
                reserved = departure.reserved,
                room_closed = departure.room_closed,
                "player disconnected"
            );
            self.notify_departure(&mut out, &departure);
        }
        out.into_envelopes()
    }

    fn create_room(
        &mut self,
        out: &mut Outbox,
        sender: ConnectionId,
        name: &str,
        max_players: u8,
        host_nickname: &str,
    ) -> Result<(), Rejection> {
        let outcome = self
            .registry
            .create_room(name, max_players, sender, host_nickname)?;
        if let Some(previous) = &outcome.previous {
            self.notify_departure(out, previous);
        }

        info!(room_id = %outcome.seat.room_id, max_players, "room created");
        out.send(sender, ServerMsg::RoomCreated(self.room_entered(&outcome.seat)));
        Ok(())
    }

    fn join_room(
        &mut self,
        out: &mut Outbox,
        sender: ConnectionId,
        room_code: &str,
        nickname: &str,
    ) -> Result<(), Rejection> {
        let outcome = self.registry.join_room(room_code, sender, nickname)?;
        let seat = &outcome.seat;
        out.send(sender, ServerMsg::RoomJoined(self.room_entered(seat)));
        if outcome.already_present {
            return Ok(());
        }
        if let Some(previous) = &outcome.previous {
            self.notify_departure(out, previous);
        }

        info!(room_id = %seat.room_id, player = seat.player_number, "player joined room");
        let members = self.registry.members(&seat.room_id);
        out.relay_to_others(
            &members,
            sender,
            ServerMsg::PlayerJoined {
                player_number: seat.player_number,
                players: self.registry.roster(&seat.room_id),
            },
        );
        if let Some(seed) = outcome.started {
            self.announce_start(out, &seat.room_id, seed);
        }
        Ok(())
    }

    fn leave_room(
        &mut self,
        out: &mut Outbox,
        sender: ConnectionId,
        room_id: &str,
    ) -> Result<(), Rejection> {
        let departure = self.registry.leave_room(room_id, sender)?;
        info!(room_id = %departure.room_id, player = departure.player_number, "player left room");
        out.send(
            sender,
            ServerMsg::RoomLeft {
                room_id: departure.room_id.clone(),
            },
        );
        self.notify_departure(out, &departure);
        Ok(())
    }

    fn start_game(
        &mut self,
        out: &mut Outbox,
        sender: ConnectionId,
        room_id: &str,
    ) -> Result<(), Rejection> {
        let start = self.registry.start_game(room_id, sender)?;
        self.announce_start(out, &start.room_id, start.random_seed);
        Ok(())
    }

    fn announce_start(&self, out: &mut Outbox, room_id: &str, random_seed: u64) {
        info!(room_id = %room_id, "game starting");
        out.broadcast(
            &self.registry.members(room_id),
            ServerMsg::GameStarting {
                room_id: room_id.to_string(),
                players: self.registry.roster(room_id),
                random_seed,
            },
        );
    }

    fn join_game_room(&mut self, out: &mut Outbox, request: EnterGame) -> Result<(), Rejection> {
        let sender = request.connection;
        let result = self.reconciler.enter(&mut self.registry, request)?;
        if let Some(previous) = &result.previous {
            self.notify_departure(out, previous);
        }

        let seat = &result.seat;
        let room = self
            .registry
            .room(&seat.room_id)
            .ok_or(LobbyError::RoomNotFound)?;
        out.send(
            sender,
            ServerMsg::GameJoined {
                room_id: seat.room_id.clone(),
                player_number: seat.player_number,
                players: self.registry.roster(&seat.room_id),
                max_players: room.max_players,
                state: room.state,
                random_seed: room.random_seed,
                session_token: seat.session,
            },
        );

        if let Some(stale) = result.stale_connection {
            out.send(
                stale,
                ServerMsg::RoomLeft {
                    room_id: seat.room_id.clone(),
                },
            );
        }

        let members = self.registry.members(&seat.room_id);
        let players = self.registry.roster(&seat.room_id);
        let player_number = seat.player_number;
        match (result.resolution, result.stale_connection) {
            (Resolution::AlreadySeated, _) => {}
            (_, Some(_)) => out.relay_to_others(
                &members,
                sender,
                ServerMsg::PlayerReconnected {
                    player_number,
                    players,
                },
            ),
            (_, None) => out.relay_to_others(
                &members,
                sender,
                ServerMsg::PlayerJoined {
                    player_number,
                    players,
                },
            ),
        }
        if let Some(seed) = result.started {
            self.announce_start(out, &seat.room_id, seed);
        }
        if result.resumed {
            info!(room_id = %seat.room_id, "interrupted game resumed");
            out.broadcast(
                &members,
                ServerMsg::RoomStateChanged {
                    room_id: seat.room_id.clone(),
                    state: RoomState::Playing,
                },
            );
        }
        Ok(())
    }

    /// Verify the sender may emit gameplay traffic for `claimed` in `room_id`
    fn gameplay(
        &self,
        sender: ConnectionId,
        room_id: &str,
        claimed: PlayerNumber,
    ) -> Result<GameplayContext, Rejection> {
        let room_id = normalize_room_code(room_id);
        let room = self
            .registry
            .room(&room_id)
            .ok_or(Rejection::Dropped("unknown room"))?;
        let player_number = room
            .player_number_of(sender)
            .ok_or(Rejection::Dropped("sender not in room"))?;
        if room.state != RoomState::Playing {
            return Err(Rejection::Dropped("room not playing"));
        }
        if player_number != claimed {
            return Err(Rejection::Dropped("player number mismatch"));
        }
        Ok(GameplayContext {
            members: room.connections().collect(),
            player_number,
            room_id,
        })
    }

    fn complete_state(
        &self,
        out: &mut Outbox,
        sender: ConnectionId,
        room_id: &str,
        game_state: GameStateSnapshot,
    ) -> Result<(), Rejection> {
        let ctx = self.gameplay(sender, room_id, game_state.player_number)?;
        game_state.validate().map_err(Rejection::Dropped)?;
        out.relay_to_others(
            &ctx.members,
            sender,
            ServerMsg::OpponentCompleteState { game_state },
        );
        Ok(())
    }

    fn request_state(
        &self,
        out: &mut Outbox,
        sender: ConnectionId,
        room_id: &str,
        target: PlayerNumber,
    ) -> Result<(), Rejection> {
        let room_id = normalize_room_code(room_id);
        let room = self
            .registry
            .room(&room_id)
            .ok_or(Rejection::Dropped("unknown room"))?;
        let requester = room
            .player_number_of(sender)
            .ok_or(Rejection::Dropped("sender not in room"))?;
        let ctx = self.gameplay(sender, &room_id, requester)?;
        if target == ctx.player_number {
            return Err(Rejection::Dropped("requested own state"));
        }
        let target_connection = room
            .slot(target)
            .map(|s| s.connection)
            .ok_or(LobbyError::PlayerNotFound(target))?;

        out.send(
            target_connection,
            ServerMsg::CompleteStateRequested {
                requester_player_number: requester,
            },
        );
        Ok(())
    }

    fn answer_state_request(
        &self,
        out: &mut Outbox,
        sender: ConnectionId,
        room_id: &str,
        requester: PlayerNumber,
        game_state: GameStateSnapshot,
    ) -> Result<(), Rejection> {
        let ctx = self.gameplay(sender, room_id, game_state.player_number)?;
        game_state.validate().map_err(Rejection::Dropped)?;
        let requester_connection = self
            .registry
            .room(&ctx.room_id)
            .and_then(|room| room.slot(requester))
            .map(|s| s.connection)
            .ok_or(Rejection::Dropped("requester gone"))?;

        out.send(
            requester_connection,
            ServerMsg::OpponentCompleteState { game_state },
        );
        Ok(())
    }

    fn score_update(
        &mut self,
        out: &mut Outbox,
        sender: ConnectionId,
        room_id: &str,
        player_number: PlayerNumber,
        score: u64,
    ) -> Result<(), Rejection> {
        let ctx = self.gameplay(sender, room_id, player_number)?;
        let scores = self
            .registry
            .record_score(&ctx.room_id, player_number, score)?;
        out.broadcast(&ctx.members, ServerMsg::ScoreUpdate { scores });
        Ok(())
    }

    fn player_won(
        &mut self,
        out: &mut Outbox,
        sender: ConnectionId,
        room_id: &str,
        player_number: PlayerNumber,
        score: u64,
        merge_count: u32,
    ) -> Result<(), Rejection> {
        let ctx = self.gameplay(sender, room_id, player_number)?;
        let winner = self
            .registry
            .declare_winner(&ctx.room_id, player_number, score, merge_count)?;
        info!(room_id = %ctx.room_id, player = player_number, score, "game won");
        out.broadcast(&ctx.members, ServerMsg::GameWon { winner });
        Ok(())
    }

    fn play_again(
        &mut self,
        out: &mut Outbox,
        sender: ConnectionId,
        room_id: &str,
    ) -> Result<(), Rejection> {
        let players = self.registry.reset_for_replay(room_id, sender)?;
        let room_id = normalize_room_code(room_id);
        out.broadcast(
            &self.registry.members(&room_id),
            ServerMsg::RoomReset { room_id, players },
        );
        Ok(())
    }

    fn update_profile(
        &mut self,
        out: &mut Outbox,
        sender: ConnectionId,
        nickname: &str,
        is_ready: bool,
    ) -> Result<(), Rejection> {
        if let Some(room_id) = self.registry.update_profile(sender, nickname, is_ready)? {
            out.broadcast(
                &self.registry.members(&room_id),
                ServerMsg::PlayerReady {
                    players: self.registry.roster(&room_id),
                },
            );
        }
        Ok(())
    }

    fn notify_departure(&self, out: &mut Outbox, departure: &Departure) {
        if departure.room_closed {
            return;
        }
        let members = self.registry.members(&departure.room_id);
        out.broadcast(
            &members,
            ServerMsg::PlayerLeft {
                player_number: departure.player_number,
                players: self.registry.roster(&departure.room_id),
            },
        );
        if let Some((player_number, nickname)) = &departure.new_host {
            info!(room_id = %departure.room_id, player = *player_number, "host reassigned");
            out.broadcast(
                &members,
                ServerMsg::NewHost {
                    player_number: *player_number,
                    nickname: nickname.clone(),
                },
            );
        }
        if departure.returned_to_lobby {
            out.broadcast(
                &members,
                ServerMsg::RoomStateChanged {
                    room_id: departure.room_id.clone(),
                    state: RoomState::Waiting,
                },
            );
        }
    }

    fn room_entered(&self, seat: &Seat) -> RoomEntered {
        let room = self.registry.room(&seat.room_id);
        RoomEntered {
            room_id: seat.room_id.clone(),
            room_name: room.map(|r| r.name.clone()).unwrap_or_default(),
            max_players: room.map(|r| r.max_players).unwrap_or_default(),
            player_number: seat.player_number,
            players: self.registry.roster(&seat.room_id),
            session_token: seat.session,
        }
    }
}
