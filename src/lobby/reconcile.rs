//! Identity reconciliation for players entering the game screen
//!
//! The transport identity changes on every reconnect while a player's seat must
//! not. Resolution runs in strict priority order and stops at the first hit:
//!
//! 1. the connection already holds a slot
//! 2. the presented prior identity (session token or former connection id)
//!    matches a slot or a seat reserved after a mid-game drop
//! 3. nickname fallback, for clients that cannot persist a token. Ambiguous
//!    when two players share a nickname; can be switched off.
//! 4. a brand-new player, if capacity allows

use tracing::{info, warn};
use uuid::Uuid;

use crate::store::profiles::{dedupe_nickname, normalize_nickname};
use crate::ws::protocol::{ConnectionId, PlayerNumber, RoomId, SessionToken};

use super::error::LobbyError;
use super::registry::{normalize_room_code, Departure, RoomRegistry, Seat};
use super::room::{Slot, MIN_PLAYERS};

/// An "enter game" request
#[derive(Debug, Clone)]
pub struct EnterGame {
    pub room_id: RoomId,
    pub connection: ConnectionId,
    pub prior_identity: Option<Uuid>,
    pub nickname: String,
}

/// Which rule resolved the request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    AlreadySeated,
    PriorIdentity,
    ReservedSeat,
    Nickname,
    NewPlayer,
}

/// Outcome of a reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub seat: Seat,
    pub resolution: Resolution,
    /// Connection that previously held the slot
    pub stale_connection: Option<ConnectionId>,
    /// Room the connection had to leave first
    pub previous: Option<Departure>,
    /// An interrupted game continues
    pub resumed: bool,
    /// A new game started (auto-start mode)
    pub started: Option<u64>,
}

enum Decision {
    Seated(PlayerNumber),
    Rebind(PlayerNumber, Resolution),
    Reclaim(SessionToken, Resolution),
    New,
}

/// Maps incoming connections to existing room slots
#[derive(Debug, Clone, Copy)]
pub struct IdentityReconciler {
    nickname_fallback: bool,
}

impl IdentityReconciler {
    pub fn new(nickname_fallback: bool) -> Self {
        Self { nickname_fallback }
    }

    /// Resolve `request` against the registry, mutating it as needed
    pub fn enter(
        &self,
        registry: &mut RoomRegistry,
        request: EnterGame,
    ) -> Result<Reconciliation, LobbyError> {
        let nickname = normalize_nickname(&request.nickname).map_err(LobbyError::InvalidNickname)?;
        let room_id = normalize_room_code(&request.room_id);
        let connection = request.connection;

        let decision = self.decide(registry, &room_id, connection, request.prior_identity, &nickname)?;

        match decision {
            Decision::Seated(player_number) => {
                let room = registry.room(&room_id).ok_or(LobbyError::RoomNotFound)?;
                let session = room
                    .slot(player_number)
                    .map(|s| s.session)
                    .ok_or(LobbyError::PlayerNotFound(player_number))?;
                Ok(Reconciliation {
                    seat: Seat {
                        room_id,
                        player_number,
                        session,
                        nickname: registry.profiles().nickname_of(&connection),
                    },
                    resolution: Resolution::AlreadySeated,
                    stale_connection: None,
                    previous: None,
                    resumed: false,
                    started: None,
                })
            }
            Decision::Rebind(player_number, resolution) => {
                self.rebind(registry, room_id, player_number, connection, &nickname, resolution)
            }
            Decision::Reclaim(session, resolution) => {
                self.reclaim(registry, room_id, session, connection, resolution)
            }
            Decision::New => {
                let previous = leave_other_room(registry, connection, &room_id);
                let (seat, started) = registry.seat_new_player(&room_id, connection, &nickname)?;
                info!(room_id = %seat.room_id, player = seat.player_number, "new player entered game");
                Ok(Reconciliation {
                    seat,
                    resolution: Resolution::NewPlayer,
                    stale_connection: None,
                    previous,
                    resumed: false,
                    started,
                })
            }
        }
    }

    fn decide(
        &self,
        registry: &RoomRegistry,
        room_id: &str,
        connection: ConnectionId,
        prior_identity: Option<Uuid>,
        nickname: &str,
    ) -> Result<Decision, LobbyError> {
        let room = registry.room(room_id).ok_or(LobbyError::RoomNotFound)?;

        if let Some(number) = room.player_number_of(connection) {
            return Ok(Decision::Seated(number));
        }

        if let Some(prior) = prior_identity {
            let number = room
                .player_number_of_session(prior)
                .or_else(|| room.player_number_of(prior));
            if let Some(number) = number {
                return Ok(Decision::Rebind(number, Resolution::PriorIdentity));
            }
            if room.reserved_seats().any(|r| r.session == prior) {
                return Ok(Decision::Reclaim(prior, Resolution::ReservedSeat));
            }
        }

        if self.nickname_fallback {
            let seated = registry
                .profiles()
                .find_by_nickname(nickname)
                .find_map(|c| room.player_number_of(c));
            if let Some(number) = seated {
                warn!(room_id = %room_id, player = number, "rebinding slot by nickname");
                return Ok(Decision::Rebind(number, Resolution::Nickname));
            }
            if let Some(seat) = room.reserved_seats().find(|r| r.nickname == nickname) {
                warn!(room_id = %room_id, player = seat.player_number, "reclaiming seat by nickname");
                return Ok(Decision::Reclaim(seat.session, Resolution::Nickname));
            }
        }

        Ok(Decision::New)
    }

    fn rebind(
        &self,
        registry: &mut RoomRegistry,
        room_id: RoomId,
        player_number: PlayerNumber,
        connection: ConnectionId,
        nickname: &str,
        resolution: Resolution,
    ) -> Result<Reconciliation, LobbyError> {
        let previous = leave_other_room(registry, connection, &room_id);

        let room = registry.room_mut(&room_id).ok_or(LobbyError::RoomNotFound)?;
        let stale = room
            .rebind(player_number, connection)
            .ok_or(LobbyError::PlayerNotFound(player_number))?;
        let session = room
            .slot(player_number)
            .map(|s| s.session)
            .ok_or(LobbyError::PlayerNotFound(player_number))?;

        registry.clear_membership(&stale);
        registry.bind_membership(connection, room_id.clone());
        if !registry.profiles_mut().transfer(&stale, connection) {
            registry
                .profiles_mut()
                .upsert(connection, nickname.to_string(), true);
        }

        info!(room_id = %room_id, player = player_number, ?resolution, "slot rebound to new connection");

        Ok(Reconciliation {
            seat: Seat {
                nickname: registry.profiles().nickname_of(&connection),
                room_id,
                player_number,
                session,
            },
            resolution,
            stale_connection: Some(stale),
            previous,
            resumed: false,
            started: None,
        })
    }

    fn reclaim(
        &self,
        registry: &mut RoomRegistry,
        room_id: RoomId,
        session: SessionToken,
        connection: ConnectionId,
        resolution: Resolution,
    ) -> Result<Reconciliation, LobbyError> {
        if registry
            .room(&room_id)
            .ok_or(LobbyError::RoomNotFound)?
            .is_full()
        {
            return Err(LobbyError::RoomFull);
        }
        let previous = leave_other_room(registry, connection, &room_id);

        let taken: Vec<String> = registry
            .members(&room_id)
            .iter()
            .map(|c| registry.profiles().nickname_of(c))
            .collect();

        let room = registry.room_mut(&room_id).ok_or(LobbyError::RoomNotFound)?;
        let seat = room
            .take_reserved(session)
            .ok_or(LobbyError::RoomNotFound)?;
        let index = seat.player_number.saturating_sub(1) as usize;
        let (player_number, session) = room.insert_slot(index, Slot { connection, session });

        let was_interrupted = room.is_interrupted();
        if room.len() >= MIN_PLAYERS {
            room.resume();
        }
        let resumed = was_interrupted && !room.is_interrupted();

        let nickname = dedupe_nickname(&seat.nickname, taken.iter().map(String::as_str));
        registry.bind_membership(connection, room_id.clone());
        registry
            .profiles_mut()
            .upsert(connection, nickname.clone(), true);

        info!(room_id = %room_id, player = player_number, resumed, "reserved seat reclaimed");

        Ok(Reconciliation {
            seat: Seat {
                room_id,
                player_number,
                session,
                nickname,
            },
            resolution,
            stale_connection: None,
            previous,
            resumed,
            started: None,
        })
    }
}

fn leave_other_room(
    registry: &mut RoomRegistry,
    connection: ConnectionId,
    target: &str,
) -> Option<Departure> {
    match registry.room_of(&connection) {
        Some(current) if current != target => registry.leave_current(connection),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StartMode;
    use crate::ws::protocol::RoomState;

    fn conn() -> ConnectionId {
        Uuid::new_v4()
    }

    struct Fixture {
        registry: RoomRegistry,
        room_id: RoomId,
        ann: ConnectionId,
        bob: ConnectionId,
        bob_session: SessionToken,
    }

    fn two_player_room() -> Fixture {
        let mut registry = RoomRegistry::new(StartMode::Lobby);
        let ann = conn();
        let bob = conn();
        let room_id = registry.create_room("Room", 3, ann, "Ann").unwrap().seat.room_id;
        let bob_session = registry.join_room(&room_id, bob, "Bob").unwrap().seat.session;
        Fixture {
            registry,
            room_id,
            ann,
            bob,
            bob_session,
        }
    }

    fn enter(room_id: &str, connection: ConnectionId, prior: Option<Uuid>, nickname: &str) -> EnterGame {
        EnterGame {
            room_id: room_id.to_string(),
            connection,
            prior_identity: prior,
            nickname: nickname.to_string(),
        }
    }

    #[test]
    fn seated_connection_is_a_no_op() {
        let mut f = two_player_room();
        let reconciler = IdentityReconciler::new(true);
        let result = reconciler
            .enter(&mut f.registry, enter(&f.room_id, f.bob, None, "Bob"))
            .unwrap();
        assert_eq!(result.resolution, Resolution::AlreadySeated);
        assert_eq!(result.seat.player_number, 2);
        assert_eq!(f.registry.room(&f.room_id).unwrap().len(), 2);
    }

    #[test]
    fn session_token_rebinds_slot_and_profile() {
        let mut f = two_player_room();
        let reconciler = IdentityReconciler::new(false);
        let fresh = conn();

        let result = reconciler
            .enter(
                &mut f.registry,
                enter(&f.room_id, fresh, Some(f.bob_session), "Whatever"),
            )
            .unwrap();

        assert_eq!(result.resolution, Resolution::PriorIdentity);
        assert_eq!(result.seat.player_number, 2);
        assert_eq!(result.seat.session, f.bob_session);
        assert_eq!(result.stale_connection, Some(f.bob));

        let room = f.registry.room(&f.room_id).unwrap();
        assert_eq!(room.len(), 2);
        assert_eq!(room.player_number_of(fresh), Some(2));
        assert_eq!(room.player_number_of(f.bob), None);
        assert_eq!(f.registry.profiles().get(&fresh).unwrap().nickname, "Bob");
        assert!(f.registry.profiles().get(&f.bob).is_none());
        assert_eq!(f.registry.room_of(&f.bob), None);
    }

    #[test]
    fn former_connection_id_rebinds_host() {
        let mut f = two_player_room();
        let reconciler = IdentityReconciler::new(false);
        let fresh = conn();

        let result = reconciler
            .enter(&mut f.registry, enter(&f.room_id, fresh, Some(f.ann), "Ann"))
            .unwrap();
        assert_eq!(result.seat.player_number, 1);
        assert!(f.registry.room(&f.room_id).unwrap().is_host(fresh));
    }

    #[test]
    fn nickname_fallback_rebinds_when_enabled() {
        let mut f = two_player_room();
        let fresh = conn();

        let disabled = IdentityReconciler::new(false);
        let result = disabled
            .enter(&mut f.registry, enter(&f.room_id, fresh, None, "Bob"))
            .unwrap();
        assert_eq!(result.resolution, Resolution::NewPlayer);
        assert_eq!(result.seat.nickname, "Bob1");

        let mut f = two_player_room();
        let enabled = IdentityReconciler::new(true);
        let result = enabled
            .enter(&mut f.registry, enter(&f.room_id, fresh, None, "Bob"))
            .unwrap();
        assert_eq!(result.resolution, Resolution::Nickname);
        assert_eq!(result.seat.player_number, 2);
        assert_eq!(f.registry.room(&f.room_id).unwrap().len(), 2);
    }

    #[test]
    fn unknown_player_gets_new_slot() {
        let mut f = two_player_room();
        let reconciler = IdentityReconciler::new(true);
        let result = reconciler
            .enter(&mut f.registry, enter(&f.room_id, conn(), None, "Cid"))
            .unwrap();
        assert_eq!(result.resolution, Resolution::NewPlayer);
        assert_eq!(result.seat.player_number, 3);

        let full = reconciler.enter(&mut f.registry, enter(&f.room_id, conn(), None, "Dee"));
        assert_eq!(full, Err(LobbyError::RoomFull));
    }

    #[test]
    fn reconnect_after_mid_game_drop_resumes() {
        let mut f = two_player_room();
        let reconciler = IdentityReconciler::new(false);
        f.registry.start_game(&f.room_id, f.ann).unwrap();
        let seed = f.registry.room(&f.room_id).unwrap().random_seed;

        f.registry.disconnect(f.bob);
        assert_eq!(f.registry.room(&f.room_id).unwrap().state, RoomState::Waiting);

        let fresh = conn();
        let result = reconciler
            .enter(
                &mut f.registry,
                enter(&f.room_id, fresh, Some(f.bob_session), "Bob"),
            )
            .unwrap();
        assert_eq!(result.resolution, Resolution::ReservedSeat);
        assert_eq!(result.seat.player_number, 2);
        assert_eq!(result.seat.session, f.bob_session);
        assert!(result.resumed);

        let room = f.registry.room(&f.room_id).unwrap();
        assert_eq!(room.state, RoomState::Playing);
        assert_eq!(room.random_seed, seed);
        assert_eq!(room.len(), 2);
    }

    #[test]
    fn reclaimed_host_seat_goes_back_to_front() {
        let mut f = two_player_room();
        let reconciler = IdentityReconciler::new(false);
        f.registry.start_game(&f.room_id, f.ann).unwrap();
        let ann_session = f.registry.room(&f.room_id).unwrap().slot(1).unwrap().session;

        f.registry.disconnect(f.ann);
        assert!(f.registry.room(&f.room_id).unwrap().is_host(f.bob));

        let fresh = conn();
        let result = reconciler
            .enter(&mut f.registry, enter(&f.room_id, fresh, Some(ann_session), "Ann"))
            .unwrap();
        assert_eq!(result.seat.player_number, 1);
        let room = f.registry.room(&f.room_id).unwrap();
        assert_eq!(room.player_number_of(f.bob), Some(2));
        assert!(room.is_host(f.bob));
    }

    #[test]
    fn missing_room_is_reported() {
        let mut registry = RoomRegistry::new(StartMode::Lobby);
        let reconciler = IdentityReconciler::new(true);
        let result = reconciler.enter(&mut registry, enter("NOPE42", conn(), None, "Ann"));
        assert_eq!(result, Err(LobbyError::RoomNotFound));
    }
}
