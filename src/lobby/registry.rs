//! Room registry - the authoritative source of "who is player N"

use std::collections::{BTreeMap, HashMap};

use rand::Rng;
use tracing::debug;

use crate::config::StartMode;
use crate::store::profiles::{dedupe_nickname, normalize_nickname};
use crate::store::ProfileStore;
use crate::ws::protocol::{
    ConnectionId, PlayerInfo, PlayerNumber, RoomId, RoomState, RoomSummary, SessionToken,
    WinnerSummary,
};

use super::error::LobbyError;
use super::room::{ReservedSeat, Room, RoomDetail, MAX_ROOM_SIZE, MIN_PLAYERS};

/// Length of generated room codes
pub const ROOM_CODE_LEN: usize = 6;

/// Unambiguous characters for room codes (no 0/O, 1/I)
const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// A player's place in a room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seat {
    pub room_id: RoomId,
    pub player_number: PlayerNumber,
    pub session: SessionToken,
    pub nickname: String,
}

/// Result of creating or joining a room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    pub seat: Seat,
    /// The connection was already seated; nothing changed
    pub already_present: bool,
    /// Room the connection had to leave first
    pub previous: Option<Departure>,
    /// Seed of a game that started because of this join (auto-start mode)
    pub started: Option<u64>,
}

/// Result of a slot being removed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub room_id: RoomId,
    pub player_number: PlayerNumber,
    pub nickname: String,
    /// Player number and nickname of the newly elected host
    pub new_host: Option<(PlayerNumber, String)>,
    /// Room was destroyed because it became empty
    pub room_closed: bool,
    /// Seat was kept for a reconnect
    pub reserved: bool,
    /// The room fell back to `waiting` from `playing` or `finished`
    pub returned_to_lobby: bool,
}

/// A game that just started
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameStart {
    pub room_id: RoomId,
    pub random_seed: u64,
    pub players: Vec<PlayerInfo>,
}

/// Owns every room and the profile table
#[derive(Debug)]
pub struct RoomRegistry {
    rooms: HashMap<RoomId, Room>,
    /// Connection -> room it occupies
    membership: HashMap<ConnectionId, RoomId>,
    profiles: ProfileStore,
    start_mode: StartMode,
}

impl RoomRegistry {
    pub fn new(start_mode: StartMode) -> Self {
        Self {
            rooms: HashMap::new(),
            membership: HashMap::new(),
            profiles: ProfileStore::new(),
            start_mode,
        }
    }

    pub fn start_mode(&self) -> StartMode {
        self.start_mode
    }

    pub fn room(&self, room_id: &str) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    pub(crate) fn room_mut(&mut self, room_id: &str) -> Option<&mut Room> {
        self.rooms.get_mut(room_id)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn profiles(&self) -> &ProfileStore {
        &self.profiles
    }

    pub(crate) fn profiles_mut(&mut self) -> &mut ProfileStore {
        &mut self.profiles
    }

    /// Room the connection currently occupies
    pub fn room_of(&self, connection: &ConnectionId) -> Option<&RoomId> {
        self.membership.get(connection)
    }

    pub(crate) fn bind_membership(&mut self, connection: ConnectionId, room_id: RoomId) {
        self.membership.insert(connection, room_id);
    }

    pub(crate) fn clear_membership(&mut self, connection: &ConnectionId) {
        self.membership.remove(connection);
    }

    /// Create a room with `host` as sole member
    pub fn create_room(
        &mut self,
        name: &str,
        max_players: u8,
        host: ConnectionId,
        host_nickname: &str,
    ) -> Result<JoinOutcome, LobbyError> {
        let name = normalize_room_name(name)?;
        if !(MIN_PLAYERS as u8..=MAX_ROOM_SIZE).contains(&max_players) {
            return Err(LobbyError::InvalidMaxPlayers(max_players));
        }
        let nickname = normalize_nickname(host_nickname).map_err(LobbyError::InvalidNickname)?;

        let previous = self.leave_current(host);

        let room_id = self.generate_room_code();
        let (room, session) = Room::new(room_id.clone(), name, max_players, host);
        self.rooms.insert(room_id.clone(), room);
        self.membership.insert(host, room_id.clone());
        self.profiles.upsert(host, nickname.clone(), true);

        debug!(room_id = %room_id, "room created");

        Ok(JoinOutcome {
            seat: Seat {
                room_id,
                player_number: 1,
                session,
                nickname,
            },
            already_present: false,
            previous,
            started: None,
        })
    }

    /// Join a room by code
    pub fn join_room(
        &mut self,
        room_code: &str,
        connection: ConnectionId,
        nickname: &str,
    ) -> Result<JoinOutcome, LobbyError> {
        let room_id = normalize_room_code(room_code);
        let room = self.rooms.get(&room_id).ok_or(LobbyError::RoomNotFound)?;

        if let Some(player_number) = room.player_number_of(connection) {
            let session = room
                .slot(player_number)
                .map(|s| s.session)
                .ok_or(LobbyError::PlayerNotFound(player_number))?;
            return Ok(JoinOutcome {
                seat: Seat {
                    room_id,
                    player_number,
                    session,
                    nickname: self.profiles.nickname_of(&connection),
                },
                already_present: true,
                previous: None,
                started: None,
            });
        }

        let nickname = normalize_nickname(nickname).map_err(LobbyError::InvalidNickname)?;
        if room.state == RoomState::Playing {
            return Err(LobbyError::GameInProgress);
        }
        if room.is_full() {
            return Err(LobbyError::RoomFull);
        }

        let previous = self.leave_current(connection);
        let (seat, started) = self.seat_new_player(&room_id, connection, &nickname)?;

        Ok(JoinOutcome {
            seat,
            already_present: false,
            previous,
            started,
        })
    }

    /// Append a slot for a brand-new player. Checks capacity but not room state.
    pub(crate) fn seat_new_player(
        &mut self,
        room_id: &str,
        connection: ConnectionId,
        nickname: &str,
    ) -> Result<(Seat, Option<u64>), LobbyError> {
        let room = self.rooms.get(room_id).ok_or(LobbyError::RoomNotFound)?;
        if room.is_full() {
            return Err(LobbyError::RoomFull);
        }

        let taken: Vec<String> = room
            .connections()
            .filter(|c| *c != connection)
            .map(|c| self.profiles.nickname_of(&c))
            .collect();
        let nickname = dedupe_nickname(nickname, taken.iter().map(String::as_str));

        let room = self.rooms.get_mut(room_id).ok_or(LobbyError::RoomNotFound)?;
        let (player_number, session) = room.push_slot(connection);

        let started = if self.start_mode == StartMode::Auto
            && room.state == RoomState::Waiting
            && room.len() >= MIN_PLAYERS
        {
            let seed = rand::random::<u64>();
            room.begin(seed);
            Some(seed)
        } else {
            None
        };

        self.membership.insert(connection, room_id.to_string());
        self.profiles.upsert(connection, nickname.clone(), true);

        Ok((
            Seat {
                room_id: room_id.to_string(),
                player_number,
                session,
                nickname,
            },
            started,
        ))
    }

    /// Leave a room explicitly. Hard removal, no reserved seat.
    pub fn leave_room(
        &mut self,
        room_id: &str,
        connection: ConnectionId,
    ) -> Result<Departure, LobbyError> {
        let room_id = normalize_room_code(room_id);
        let room = self.rooms.get(&room_id).ok_or(LobbyError::RoomNotFound)?;
        if room.player_number_of(connection).is_none() {
            return Err(LobbyError::NotInRoom);
        }
        self.remove_from_room(&room_id, connection, false)
            .ok_or(LobbyError::NotInRoom)
    }

    /// Leave whatever room the connection occupies
    pub(crate) fn leave_current(&mut self, connection: ConnectionId) -> Option<Departure> {
        let room_id = self.membership.get(&connection)?.clone();
        self.remove_from_room(&room_id, connection, false)
    }

    /// Drop a connection entirely: vacate its slot and forget its profile.
    /// A drop during `playing` keeps a reserved seat for the reconnect.
    pub fn disconnect(&mut self, connection: ConnectionId) -> Option<Departure> {
        let departure = self
            .membership
            .get(&connection)
            .cloned()
            .and_then(|room_id| self.remove_from_room(&room_id, connection, true));
        self.profiles.remove(&connection);
        departure
    }

    fn remove_from_room(
        &mut self,
        room_id: &str,
        connection: ConnectionId,
        keep_seat: bool,
    ) -> Option<Departure> {
        let room = self.rooms.get_mut(room_id)?;
        let was_playing = room.state == RoomState::Playing;
        let was_waiting = room.state == RoomState::Waiting;
        let removal = room.remove_connection(connection)?;
        self.membership.remove(&connection);

        let nickname = self.profiles.nickname_of(&connection);
        let reserved = keep_seat && was_playing;
        if reserved {
            room.reserve(ReservedSeat {
                session: removal.slot.session,
                nickname: nickname.clone(),
                player_number: removal.player_number,
            });
        }

        if room.is_empty() {
            self.rooms.remove(room_id);
            debug!(room_id = %room_id, "room closed");
            return Some(Departure {
                room_id: room_id.to_string(),
                player_number: removal.player_number,
                nickname,
                new_host: None,
                room_closed: true,
                reserved: false,
                returned_to_lobby: false,
            });
        }

        room.state = RoomState::Waiting;
        let new_host = removal.new_host.and_then(|host| {
            room.player_number_of(host)
                .map(|n| (n, self.profiles.nickname_of(&host)))
        });

        Some(Departure {
            room_id: room_id.to_string(),
            player_number: removal.player_number,
            nickname,
            new_host,
            room_closed: false,
            reserved,
            returned_to_lobby: !was_waiting,
        })
    }

    /// Host-only: start a game with a fresh seed
    pub fn start_game(
        &mut self,
        room_id: &str,
        requester: ConnectionId,
    ) -> Result<GameStart, LobbyError> {
        let room_id = normalize_room_code(room_id);
        let room = self.rooms.get_mut(&room_id).ok_or(LobbyError::RoomNotFound)?;
        if !room.is_host(requester) {
            return Err(LobbyError::NotHost);
        }
        if room.state == RoomState::Playing {
            return Err(LobbyError::GameInProgress);
        }
        if room.len() < MIN_PLAYERS {
            return Err(LobbyError::NotEnoughPlayers);
        }

        let random_seed = rand::random::<u64>();
        room.begin(random_seed);

        Ok(GameStart {
            players: self.roster(&room_id),
            room_id,
            random_seed,
        })
    }

    /// Record a player's reported score, returning the room's score table
    pub fn record_score(
        &mut self,
        room_id: &str,
        player_number: PlayerNumber,
        score: u64,
    ) -> Result<BTreeMap<PlayerNumber, u64>, LobbyError> {
        let room = self.rooms.get_mut(room_id).ok_or(LobbyError::RoomNotFound)?;
        if room.slot(player_number).is_none() {
            return Err(LobbyError::PlayerNotFound(player_number));
        }
        room.scores.insert(player_number, score);
        Ok(room.scores.clone())
    }

    /// Finish a playing room with a winner
    pub fn declare_winner(
        &mut self,
        room_id: &str,
        player_number: PlayerNumber,
        score: u64,
        merge_count: u32,
    ) -> Result<WinnerSummary, LobbyError> {
        let room = self.rooms.get(room_id).ok_or(LobbyError::RoomNotFound)?;
        let connection = room
            .slot(player_number)
            .map(|s| s.connection)
            .ok_or(LobbyError::PlayerNotFound(player_number))?;
        let winner = WinnerSummary {
            player_number,
            nickname: self.profiles.nickname_of(&connection),
            score,
            merge_count,
        };

        let room = self.rooms.get_mut(room_id).ok_or(LobbyError::RoomNotFound)?;
        room.state = RoomState::Finished;
        room.scores.insert(player_number, score);
        room.winner = Some(winner.clone());
        Ok(winner)
    }

    /// Return a finished room to `waiting` so the host can start again
    pub fn reset_for_replay(
        &mut self,
        room_id: &str,
        requester: ConnectionId,
    ) -> Result<Vec<PlayerInfo>, LobbyError> {
        let room_id = normalize_room_code(room_id);
        let room = self.rooms.get_mut(&room_id).ok_or(LobbyError::RoomNotFound)?;
        if room.player_number_of(requester).is_none() {
            return Err(LobbyError::NotInRoom);
        }
        if room.state == RoomState::Playing {
            return Err(LobbyError::GameInProgress);
        }
        room.reset();
        Ok(self.roster(&room_id))
    }

    /// Update nickname and readiness. Returns the room to notify, if any.
    pub fn update_profile(
        &mut self,
        connection: ConnectionId,
        nickname: &str,
        is_ready: bool,
    ) -> Result<Option<RoomId>, LobbyError> {
        let nickname = normalize_nickname(nickname).map_err(LobbyError::InvalidNickname)?;
        let room_id = self.membership.get(&connection).cloned();

        let nickname = match room_id.as_ref().and_then(|id| self.rooms.get(id)) {
            Some(room) => {
                let taken: Vec<String> = room
                    .connections()
                    .filter(|c| *c != connection)
                    .map(|c| self.profiles.nickname_of(&c))
                    .collect();
                dedupe_nickname(&nickname, taken.iter().map(String::as_str))
            }
            None => nickname,
        };

        self.profiles.upsert(connection, nickname, is_ready);
        Ok(room_id)
    }

    /// Rooms open for discovery, oldest first
    pub fn list_joinable(&self) -> Vec<RoomSummary> {
        let mut rooms: Vec<&Room> = self
            .rooms
            .values()
            .filter(|r| r.state == RoomState::Waiting && !r.is_full())
            .collect();
        rooms.sort_by_key(|r| r.created_at);

        rooms
            .into_iter()
            .map(|r| RoomSummary {
                code: r.id.clone(),
                name: r.name.clone(),
                host_nickname: self.profiles.nickname_of(&r.host()),
                player_count: r.len(),
                max_players: r.max_players,
            })
            .collect()
    }

    /// Roster of a room in player-number order
    pub fn roster(&self, room_id: &str) -> Vec<PlayerInfo> {
        let Some(room) = self.rooms.get(room_id) else {
            return Vec::new();
        };
        room.slots()
            .iter()
            .enumerate()
            .map(|(i, slot)| {
                let profile = self.profiles.get(&slot.connection);
                PlayerInfo {
                    number: (i + 1) as PlayerNumber,
                    nickname: profile
                        .map(|p| p.nickname.clone())
                        .unwrap_or_else(|| "Player".to_string()),
                    is_host: room.is_host(slot.connection),
                    is_ready: profile.map(|p| p.is_ready).unwrap_or(false),
                }
            })
            .collect()
    }

    /// Current members of a room
    pub fn members(&self, room_id: &str) -> Vec<ConnectionId> {
        self.rooms
            .get(room_id)
            .map(|r| r.connections().collect())
            .unwrap_or_default()
    }

    /// Every room, for the debug endpoint
    pub fn introspect(&self) -> Vec<RoomDetail> {
        let mut rooms: Vec<RoomDetail> = self
            .rooms
            .values()
            .map(|r| RoomDetail {
                code: r.id.clone(),
                name: r.name.clone(),
                state: r.state,
                max_players: r.max_players,
                players: self.roster(&r.id),
                reserved_seats: r.reserved_seats().count(),
                scores: r.scores.clone(),
                winner: r.winner.clone(),
                created_at: r.created_at,
            })
            .collect();
        rooms.sort_by_key(|r| r.created_at);
        rooms
    }

    fn generate_room_code(&self) -> RoomId {
        let mut rng = rand::thread_rng();
        loop {
            let code: String = (0..ROOM_CODE_LEN)
                .map(|_| ROOM_CODE_ALPHABET[rng.gen_range(0..ROOM_CODE_ALPHABET.len())] as char)
                .collect();
            if !self.rooms.contains_key(&code) {
                return code;
            }
        }
    }
}

/// Room codes are matched case-insensitively
pub fn normalize_room_code(raw: &str) -> RoomId {
    raw.trim().to_ascii_uppercase()
}

fn normalize_room_name(raw: &str) -> Result<String, LobbyError> {
    let name = raw.trim();
    let len = name.chars().count();
    if len < 3 {
        return Err(LobbyError::InvalidRoomName("too short"));
    }
    if len > 32 {
        return Err(LobbyError::InvalidRoomName("too long"));
    }
    if name.chars().any(char::is_control) {
        return Err(LobbyError::InvalidRoomName("contains control characters"));
    }
    Ok(name.to_string())
}
