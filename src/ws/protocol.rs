//! WebSocket protocol message definitions
//! These are the wire types for client-relay communication

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Transport identity of one WebSocket connection. Changes on every reconnect.
pub type ConnectionId = Uuid;

/// Opaque token handed to a player on first join and presented on reconnect.
pub type SessionToken = Uuid;

/// Room code, also used as the room identifier.
pub type RoomId = String;

/// 1-based seat number inside a room.
pub type PlayerNumber = u8;

/// Number of piece tiers (cherry .. watermelon)
pub const PIECE_KINDS: u8 = 11;

/// Only the smallest tiers are ever spawned as a new in-flight piece
pub const SPAWNABLE_KINDS: u8 = 5;

/// Upper bound on bodies accepted in a single snapshot
pub const MAX_SNAPSHOT_BODIES: usize = 512;

/// Room lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomState {
    /// Lobby, players may join
    Waiting,
    /// Game running, deltas are relayed
    Playing,
    /// A winner was reported
    Finished,
}

/// Messages sent from client to relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "camelCase",
    rename_all_fields = "camelCase",
    deny_unknown_fields
)]
pub enum ClientMsg {
    /// Create a room and become its host
    CreateRoom {
        name: String,
        max_players: u8,
        host_nickname: String,
    },

    /// Join a waiting room by code
    JoinRoom { room_code: String, nickname: String },

    /// Leave a room
    LeaveRoom { room_id: RoomId },

    /// Host-only: start the game
    StartGame { room_id: RoomId },

    /// Enter the game screen of a room, possibly as a reconnecting player
    JoinGameRoom {
        room_id: RoomId,
        nickname: String,
        /// Session token (or former connection id) from an earlier join
        #[serde(default)]
        prior_identity: Option<Uuid>,
    },

    /// List joinable rooms
    GetRooms,

    /// In-flight piece moved
    FruitMove {
        room_id: RoomId,
        player_number: PlayerNumber,
        seq: u64,
        x: f32,
        y: f32,
    },

    /// In-flight piece released; announces the index of the next piece
    FruitDropped {
        room_id: RoomId,
        player_number: PlayerNumber,
        seq: u64,
        fruit_index: u8,
        next_fruit_index: u8,
    },

    /// First piece of a player's game
    InitializeFruit {
        room_id: RoomId,
        player_number: PlayerNumber,
        seq: u64,
        fruit_index: u8,
    },

    /// Periodic full snapshot, relayed to every other member
    CompleteGameState {
        room_id: RoomId,
        game_state: GameStateSnapshot,
    },

    /// Ask one member for an immediate snapshot
    RequestCompleteState {
        room_id: RoomId,
        target_player_number: PlayerNumber,
    },

    /// Answer to a snapshot request, delivered to the requester only
    SendCompleteState {
        room_id: RoomId,
        requester_player_number: PlayerNumber,
        game_state: GameStateSnapshot,
    },

    /// Report own score
    ScoreUpdate {
        room_id: RoomId,
        player_number: PlayerNumber,
        score: u64,
    },

    /// Report reaching the top tier
    PlayerWon {
        room_id: RoomId,
        player_number: PlayerNumber,
        score: u64,
        merge_count: u32,
    },

    /// Return a finished room to the lobby
    PlayAgain { room_id: RoomId },

    /// Update nickname and readiness
    UpdateProfile { nickname: String, is_ready: bool },

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },
}

impl ClientMsg {
    /// Wire name of the message, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CreateRoom { .. } => "createRoom",
            Self::JoinRoom { .. } => "joinRoom",
            Self::LeaveRoom { .. } => "leaveRoom",
            Self::StartGame { .. } => "startGame",
            Self::JoinGameRoom { .. } => "joinGameRoom",
            Self::GetRooms => "getRooms",
            Self::FruitMove { .. } => "fruitMove",
            Self::FruitDropped { .. } => "fruitDropped",
            Self::InitializeFruit { .. } => "initializeFruit",
            Self::CompleteGameState { .. } => "completeGameState",
            Self::RequestCompleteState { .. } => "requestCompleteState",
            Self::SendCompleteState { .. } => "sendCompleteState",
            Self::ScoreUpdate { .. } => "scoreUpdate",
            Self::PlayerWon { .. } => "playerWon",
            Self::PlayAgain { .. } => "playAgain",
            Self::UpdateProfile { .. } => "updateProfile",
            Self::Ping { .. } => "ping",
        }
    }

    /// High-frequency gameplay traffic, subject to input rate limiting
    pub fn is_gameplay_delta(&self) -> bool {
        matches!(self, Self::FruitMove { .. })
    }
}

/// Messages sent from relay to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome {
        connection_id: ConnectionId,
        server_time: u64,
    },

    /// Room created, sender is host
    RoomCreated(RoomEntered),

    /// Sender joined a room
    RoomJoined(RoomEntered),

    /// Sender left a room
    RoomLeft { room_id: RoomId },

    /// Someone joined the sender's room
    PlayerJoined {
        player_number: PlayerNumber,
        players: Vec<PlayerInfo>,
    },

    /// A member's slot moved to a new connection; its numbering is unchanged
    /// but its sequence numbers start over
    PlayerReconnected {
        player_number: PlayerNumber,
        players: Vec<PlayerInfo>,
    },

    /// Someone left the sender's room
    PlayerLeft {
        player_number: PlayerNumber,
        players: Vec<PlayerInfo>,
    },

    /// Host changed after the previous host left
    NewHost {
        player_number: PlayerNumber,
        nickname: String,
    },

    /// A member changed nickname or readiness
    PlayerReady { players: Vec<PlayerInfo> },

    /// Joinable rooms
    RoomsList { rooms: Vec<RoomSummary> },

    /// Game started
    GameStarting {
        room_id: RoomId,
        players: Vec<PlayerInfo>,
        random_seed: u64,
    },

    /// Sender entered the game screen
    GameJoined {
        room_id: RoomId,
        player_number: PlayerNumber,
        players: Vec<PlayerInfo>,
        max_players: u8,
        state: RoomState,
        random_seed: Option<u64>,
        session_token: SessionToken,
    },

    /// Peer moved its in-flight piece
    OpponentFruitMove {
        player_number: PlayerNumber,
        seq: u64,
        x: f32,
        y: f32,
    },

    /// Peer dropped its in-flight piece
    OpponentFruitDropped {
        player_number: PlayerNumber,
        seq: u64,
        fruit_index: u8,
        next_fruit_index: u8,
    },

    /// Peer spawned its first piece
    OpponentInitialFruit {
        player_number: PlayerNumber,
        seq: u64,
        fruit_index: u8,
    },

    /// Full snapshot of a peer
    OpponentCompleteState { game_state: GameStateSnapshot },

    /// A peer asks the receiver for an immediate snapshot
    CompleteStateRequested { requester_player_number: PlayerNumber },

    /// Room scores
    ScoreUpdate { scores: BTreeMap<PlayerNumber, u64> },

    /// Game over
    GameWon { winner: WinnerSummary },

    /// Room paused after a mid-game drop, or resumed after a reclaim
    RoomStateChanged { room_id: RoomId, state: RoomState },

    /// Finished room returned to the lobby
    RoomReset {
        room_id: RoomId,
        players: Vec<PlayerInfo>,
    },

    /// Error message
    Error { code: String, message: String },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}

/// Reply payload for create and join
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomEntered {
    pub room_id: RoomId,
    pub room_name: String,
    pub max_players: u8,
    pub player_number: PlayerNumber,
    pub players: Vec<PlayerInfo>,
    pub session_token: SessionToken,
}

/// Roster entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    pub number: PlayerNumber,
    pub nickname: String,
    pub is_host: bool,
    pub is_ready: bool,
}

/// Discovery listing entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub code: RoomId,
    pub name: String,
    pub host_nickname: String,
    pub player_count: usize,
    pub max_players: u8,
}

/// Winner of a finished room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WinnerSummary {
    pub player_number: PlayerNumber,
    pub nickname: String,
    pub score: u64,
    pub merge_count: u32,
}

/// Full state of one player's simulation, minus static walls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStateSnapshot {
    pub player_number: PlayerNumber,
    /// Sender sequence number at the time of capture
    pub seq: u64,
    pub score: u64,
    pub placement_count: u32,
    #[serde(rename = "num_suika")]
    pub num_suika: u32,
    /// Settled and falling bodies; the in-flight piece is not included
    pub bodies: Vec<BodyRecord>,
    /// Type index of the in-flight piece
    #[serde(default)]
    pub current_piece: Option<u8>,
    /// Type index announced for the next piece
    #[serde(default)]
    pub next_piece: Option<u8>,
    /// Sender wall clock, unix millis
    pub timestamp: u64,
}

/// One dynamic body
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BodyRecord {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    pub angle: f32,
    pub velocity_x: f32,
    pub velocity_y: f32,
    pub angular_velocity: f32,
    pub type_index: u8,
    pub radius: f32,
    pub is_sleeping: bool,
}

impl BodyRecord {
    /// All numeric fields finite and the type index in range
    pub fn is_well_formed(&self) -> bool {
        [
            self.x,
            self.y,
            self.angle,
            self.velocity_x,
            self.velocity_y,
            self.angular_velocity,
            self.radius,
        ]
        .iter()
        .all(|v| v.is_finite())
            && self.radius > 0.0
            && self.type_index < PIECE_KINDS
    }
}

impl GameStateSnapshot {
    /// Field-level validation of an untrusted snapshot
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.bodies.len() > MAX_SNAPSHOT_BODIES {
            return Err("too many bodies");
        }
        if !self.bodies.iter().all(BodyRecord::is_well_formed) {
            return Err("malformed body");
        }
        if self.current_piece.is_some_and(|i| i >= PIECE_KINDS)
            || self.next_piece.is_some_and(|i| i >= PIECE_KINDS)
        {
            return Err("piece index out of range");
        }
        Ok(())
    }
}
