//! Outbound side: turns local play into relay messages

use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, GameStateSnapshot, PlayerNumber, RoomId};

use super::world::{BodyHandle, PhysicsWorld};

/// Drops between periodic snapshots
pub const SNAPSHOT_EVERY: u32 = 5;

/// The local board as the snapshot capture needs to see it
pub struct LocalBoard<'a, W> {
    pub world: &'a W,
    pub in_flight: Option<BodyHandle>,
    pub current_piece: Option<u8>,
    pub next_piece: Option<u8>,
}

/// Sequence numbering and counters for the local player
#[derive(Debug, Clone)]
pub struct LocalSync {
    room_id: RoomId,
    player_number: PlayerNumber,
    seq: u64,
    score: u64,
    placement_count: u32,
    num_suika: u32,
    snapshot_every: u32,
    snapshot_due: bool,
}

impl LocalSync {
    pub fn new(room_id: RoomId, player_number: PlayerNumber) -> Self {
        Self {
            room_id,
            player_number,
            seq: 0,
            score: 0,
            placement_count: 0,
            num_suika: 0,
            snapshot_every: SNAPSHOT_EVERY,
            snapshot_due: false,
        }
    }

    pub fn with_snapshot_interval(mut self, every: u32) -> Self {
        self.snapshot_every = every.max(1);
        self
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn player_number(&self) -> PlayerNumber {
        self.player_number
    }

    /// Follow a renumbering when a player ahead of us leaves or is reinserted
    pub fn set_player_number(&mut self, player_number: PlayerNumber) {
        self.player_number = player_number;
    }

    pub fn placement_count(&self) -> u32 {
        self.placement_count
    }

    pub fn score(&self) -> u64 {
        self.score
    }

    pub fn snapshot_due(&self) -> bool {
        self.snapshot_due
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    pub fn initial_piece(&mut self, fruit_index: u8) -> ClientMsg {
        ClientMsg::InitializeFruit {
            room_id: self.room_id.clone(),
            player_number: self.player_number,
            seq: self.next_seq(),
            fruit_index,
        }
    }

    pub fn piece_moved(&mut self, x: f32, y: f32) -> ClientMsg {
        ClientMsg::FruitMove {
            room_id: self.room_id.clone(),
            player_number: self.player_number,
            seq: self.next_seq(),
            x,
            y,
        }
    }

    /// Count the drop; every few drops a snapshot becomes due
    pub fn piece_dropped(&mut self, fruit_index: u8, next_fruit_index: u8) -> ClientMsg {
        self.placement_count += 1;
        if self.placement_count % self.snapshot_every == 0 {
            self.snapshot_due = true;
        }
        ClientMsg::FruitDropped {
            room_id: self.room_id.clone(),
            player_number: self.player_number,
            seq: self.next_seq(),
            fruit_index,
            next_fruit_index,
        }
    }

    pub fn add_score(&mut self, points: u64) -> ClientMsg {
        self.score += points;
        ClientMsg::ScoreUpdate {
            room_id: self.room_id.clone(),
            player_number: self.player_number,
            score: self.score,
        }
    }

    pub fn record_suika(&mut self) {
        self.num_suika += 1;
    }

    pub fn won(&self, merge_count: u32) -> ClientMsg {
        ClientMsg::PlayerWon {
            room_id: self.room_id.clone(),
            player_number: self.player_number,
            score: self.score,
            merge_count,
        }
    }

    /// Emit the periodic snapshot if one is due
    pub fn periodic_snapshot<W: PhysicsWorld>(&mut self, board: LocalBoard<'_, W>) -> Option<ClientMsg> {
        if !self.snapshot_due {
            return None;
        }
        self.snapshot_due = false;
        Some(ClientMsg::CompleteGameState {
            room_id: self.room_id.clone(),
            game_state: self.capture(board),
        })
    }

    /// Answer a `completeStateRequested`
    pub fn answer_request<W: PhysicsWorld>(
        &mut self,
        requester_player_number: PlayerNumber,
        board: LocalBoard<'_, W>,
    ) -> ClientMsg {
        ClientMsg::SendCompleteState {
            room_id: self.room_id.clone(),
            requester_player_number,
            game_state: self.capture(board),
        }
    }

    fn capture<W: PhysicsWorld>(&mut self, board: LocalBoard<'_, W>) -> GameStateSnapshot {
        GameStateSnapshot {
            player_number: self.player_number,
            seq: self.next_seq(),
            score: self.score,
            placement_count: self.placement_count,
            num_suika: self.num_suika,
            bodies: board.world.dynamic_bodies(board.in_flight),
            current_piece: board.current_piece,
            next_piece: board.next_piece,
            timestamp: unix_millis(),
        }
    }
}
