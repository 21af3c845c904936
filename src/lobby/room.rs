//! Room state and slot bookkeeping

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::ws::protocol::{
    ConnectionId, PlayerNumber, RoomId, RoomState, SessionToken, WinnerSummary,
};

/// Fewest players a game can run with
pub const MIN_PLAYERS: usize = 2;

/// Largest room size accepted from clients
pub const MAX_ROOM_SIZE: u8 = 4;

/// A room's binding of one player number to a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    /// Current transport identity
    pub connection: ConnectionId,
    /// Stable logical identity, survives reconnects
    pub session: SessionToken,
}

/// Seat kept for a player who dropped mid-game
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservedSeat {
    pub session: SessionToken,
    pub nickname: String,
    pub player_number: PlayerNumber,
}

/// What happened when a slot was removed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotRemoval {
    pub player_number: PlayerNumber,
    pub slot: Slot,
    /// Set when the removed slot was host and someone remains
    pub new_host: Option<ConnectionId>,
}

/// A bounded group of players sharing one game session
#[derive(Debug, Clone)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub max_players: u8,
    pub state: RoomState,
    pub random_seed: Option<u64>,
    pub scores: BTreeMap<PlayerNumber, u64>,
    pub winner: Option<WinnerSummary>,
    pub created_at: DateTime<Utc>,
    slots: Vec<Slot>,
    host: ConnectionId,
    reserved: VecDeque<ReservedSeat>,
    /// A member dropped while playing; reclaiming the seat resumes the game
    interrupted: bool,
}

impl Room {
    /// Create a room with `host` as its sole member. Returns the host's session token.
    pub fn new(id: RoomId, name: String, max_players: u8, host: ConnectionId) -> (Self, SessionToken) {
        let session = Uuid::new_v4();
        let room = Self {
            id,
            name,
            max_players,
            state: RoomState::Waiting,
            random_seed: None,
            scores: BTreeMap::new(),
            winner: None,
            created_at: Utc::now(),
            slots: vec![Slot {
                connection: host,
                session,
            }],
            host,
            reserved: VecDeque::new(),
            interrupted: false,
        };
        (room, session)
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.slots.len() >= self.max_players as usize
    }

    pub fn host(&self) -> ConnectionId {
        self.host
    }

    pub fn is_host(&self, connection: ConnectionId) -> bool {
        !self.slots.is_empty() && self.host == connection
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted
    }

    /// Player number of a connection, if seated
    pub fn player_number_of(&self, connection: ConnectionId) -> Option<PlayerNumber> {
        self.slots
            .iter()
            .position(|s| s.connection == connection)
            .map(index_to_number)
    }

    /// Player number holding a session token
    pub fn player_number_of_session(&self, session: SessionToken) -> Option<PlayerNumber> {
        self.slots
            .iter()
            .position(|s| s.session == session)
            .map(index_to_number)
    }

    pub fn slot(&self, number: PlayerNumber) -> Option<&Slot> {
        number
            .checked_sub(1)
            .and_then(|i| self.slots.get(i as usize))
    }

    pub fn connections(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.slots.iter().map(|s| s.connection)
    }

    /// Append a new slot. Caller checks capacity.
    pub fn push_slot(&mut self, connection: ConnectionId) -> (PlayerNumber, SessionToken) {
        let session = Uuid::new_v4();
        self.insert_slot(self.slots.len(), Slot { connection, session })
    }

    /// Insert a slot at `index` (clamped to the end). Caller checks capacity.
    pub fn insert_slot(&mut self, index: usize, slot: Slot) -> (PlayerNumber, SessionToken) {
        let index = index.min(self.slots.len());
        let session = slot.session;
        if self.slots.is_empty() {
            self.host = slot.connection;
        }
        self.shift_scores_up(index_to_number(index));
        self.slots.insert(index, slot);
        (index_to_number(index), session)
    }

    /// Point an existing slot at a new connection, keeping its number and session
    pub fn rebind(&mut self, number: PlayerNumber, connection: ConnectionId) -> Option<ConnectionId> {
        let index = number.checked_sub(1)? as usize;
        let slot = self.slots.get_mut(index)?;
        let stale = std::mem::replace(&mut slot.connection, connection);
        if self.host == stale {
            self.host = connection;
        }
        Some(stale)
    }

    /// Remove the slot bound to `connection`, electing the lowest remaining slot as
    /// host when the host leaves.
    pub fn remove_connection(&mut self, connection: ConnectionId) -> Option<SlotRemoval> {
        let index = self.slots.iter().position(|s| s.connection == connection)?;
        let slot = self.slots.remove(index);
        let player_number = index_to_number(index);
        self.shift_scores_down(player_number);

        let mut new_host = None;
        if self.host == connection {
            if let Some(first) = self.slots.first() {
                self.host = first.connection;
                new_host = Some(first.connection);
            }
        }

        Some(SlotRemoval {
            player_number,
            slot,
            new_host,
        })
    }

    /// Remember a seat lost mid-game so its owner can reclaim it
    pub fn reserve(&mut self, seat: ReservedSeat) {
        self.reserved.retain(|r| r.session != seat.session);
        if self.reserved.len() >= self.max_players as usize {
            self.reserved.pop_front();
        }
        self.reserved.push_back(seat);
        self.interrupted = true;
    }

    /// Take a reserved seat by session token
    pub fn take_reserved(&mut self, session: SessionToken) -> Option<ReservedSeat> {
        let index = self.reserved.iter().position(|r| r.session == session)?;
        self.reserved.remove(index)
    }

    pub fn reserved_seats(&self) -> impl Iterator<Item = &ReservedSeat> {
        self.reserved.iter()
    }

    /// Enter `playing` with a fresh seed
    pub fn begin(&mut self, seed: u64) {
        self.state = RoomState::Playing;
        self.random_seed = Some(seed);
        self.scores.clear();
        self.winner = None;
        self.reserved.clear();
        self.interrupted = false;
    }

    /// Continue an interrupted game with its original seed
    pub fn resume(&mut self) {
        if self.interrupted && self.random_seed.is_some() {
            self.state = RoomState::Playing;
            self.interrupted = false;
        }
    }

    /// Return to the lobby after a game ended
    pub fn reset(&mut self) {
        self.state = RoomState::Waiting;
        self.scores.clear();
        self.winner = None;
        self.reserved.clear();
        self.interrupted = false;
    }

    fn shift_scores_down(&mut self, removed: PlayerNumber) {
        self.scores = std::mem::take(&mut self.scores)
            .into_iter()
            .filter(|(n, _)| *n != removed)
            .map(|(n, s)| if n > removed { (n - 1, s) } else { (n, s) })
            .collect();
    }

    fn shift_scores_up(&mut self, inserted: PlayerNumber) {
        self.scores = std::mem::take(&mut self.scores)
            .into_iter()
            .map(|(n, s)| if n >= inserted { (n + 1, s) } else { (n, s) })
            .collect();
    }
}

fn index_to_number(index: usize) -> PlayerNumber {
    (index + 1) as PlayerNumber
}

/// Debug listing of one room, served by the introspection endpoint
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomDetail {
    pub code: RoomId,
    pub name: String,
    pub state: RoomState,
    pub max_players: u8,
    pub players: Vec<crate::ws::protocol::PlayerInfo>,
    pub reserved_seats: usize,
    pub scores: BTreeMap<PlayerNumber, u64>,
    pub winner: Option<WinnerSummary>,
    pub created_at: DateTime<Utc>,
}
