//! Replica of one remote player's board

use std::time::Instant;

use crate::ws::protocol::{GameStateSnapshot, PlayerNumber, PIECE_KINDS};

use super::world::{BodyHandle, PhysicsWorld};

/// Where the replica places a freshly spawned piece
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnPoint {
    pub x: f32,
    pub y: f32,
}

/// Replica lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerPhase {
    /// Nothing received yet; deltas are ignored
    Uninitialized,
    /// Initialized by an initial piece or a snapshot
    Tracking,
}

/// Why an event was not applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Ignored {
    #[error("event is about the local player")]
    OwnEvent,
    #[error("no replica for this player")]
    UnknownPeer,
    #[error("replica not initialized")]
    Uninitialized,
    #[error("sequence number older than the last applied snapshot")]
    Stale,
    #[error("no piece in flight")]
    NoPiece,
    #[error("invalid payload")]
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct InFlight {
    handle: BodyHandle,
    type_index: u8,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PendingSpawn {
    type_index: u8,
    due: Instant,
}

/// Local copy of a peer's simulation
#[derive(Debug)]
pub struct PeerReplica<W> {
    player_number: PlayerNumber,
    phase: PeerPhase,
    world: W,
    score: u64,
    placement_count: u32,
    num_suika: u32,
    in_flight: Option<InFlight>,
    next_piece: Option<u8>,
    pending_spawn: Option<PendingSpawn>,
    last_snapshot_seq: Option<u64>,
    last_delta_seq: Option<u64>,
}

impl<W: PhysicsWorld> PeerReplica<W> {
    pub fn new(player_number: PlayerNumber, world: W) -> Self {
        Self {
            player_number,
            phase: PeerPhase::Uninitialized,
            world,
            score: 0,
            placement_count: 0,
            num_suika: 0,
            in_flight: None,
            next_piece: None,
            pending_spawn: None,
            last_snapshot_seq: None,
            last_delta_seq: None,
        }
    }

    pub fn player_number(&self) -> PlayerNumber {
        self.player_number
    }

    pub(crate) fn renumber(&mut self, player_number: PlayerNumber) {
        self.player_number = player_number;
    }

    pub fn phase(&self) -> PeerPhase {
        self.phase
    }

    pub fn world(&self) -> &W {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut W {
        &mut self.world
    }

    pub fn score(&self) -> u64 {
        self.score
    }

    pub fn placement_count(&self) -> u32 {
        self.placement_count
    }

    pub fn num_suika(&self) -> u32 {
        self.num_suika
    }

    pub fn set_score(&mut self, score: u64) {
        self.score = score;
    }

    /// Type of the piece currently held at the top of the board
    pub fn current_piece(&self) -> Option<u8> {
        self.in_flight.map(|p| p.type_index)
    }

    pub fn in_flight_handle(&self) -> Option<BodyHandle> {
        self.in_flight.map(|p| p.handle)
    }

    pub fn next_piece(&self) -> Option<u8> {
        self.next_piece
    }

    pub fn has_pending_spawn(&self) -> bool {
        self.pending_spawn.is_some()
    }

    pub fn last_snapshot_seq(&self) -> Option<u64> {
        self.last_snapshot_seq
    }

    pub fn last_delta_seq(&self) -> Option<u64> {
        self.last_delta_seq
    }

    /// First piece of a game; also re-initializes a tracking replica
    pub fn initialize(&mut self, seq: u64, type_index: u8, spawn: SpawnPoint) -> Result<(), Ignored> {
        if type_index >= PIECE_KINDS {
            return Err(Ignored::Invalid);
        }
        self.check_delta(seq)?;
        self.discard_in_flight();
        self.pending_spawn = None;
        self.spawn(type_index, spawn);
        self.phase = PeerPhase::Tracking;
        self.last_delta_seq = Some(seq);
        Ok(())
    }

    pub fn move_piece(&mut self, seq: u64, x: f32, y: f32) -> Result<(), Ignored> {
        self.require_tracking()?;
        self.check_delta(seq)?;
        if !x.is_finite() || !y.is_finite() {
            return Err(Ignored::Invalid);
        }
        let piece = self.in_flight.ok_or(Ignored::NoPiece)?;
        self.world.set_position(piece.handle, x, y);
        self.last_delta_seq = Some(seq);
        Ok(())
    }

    /// Release the held piece and schedule the announced next one
    pub fn drop_piece(
        &mut self,
        seq: u64,
        type_index: u8,
        next_index: u8,
        spawn: SpawnPoint,
        due: Instant,
    ) -> Result<(), Ignored> {
        self.require_tracking()?;
        self.check_delta(seq)?;
        if type_index >= PIECE_KINDS || next_index >= PIECE_KINDS {
            return Err(Ignored::Invalid);
        }

        let handle = match self.in_flight.take() {
            Some(piece) if piece.type_index == type_index => piece.handle,
            Some(piece) => {
                // Peer dropped something other than what we hold; trust the peer
                self.world.remove(piece.handle);
                self.world.spawn_piece(type_index, spawn.x, spawn.y)
            }
            None => self.world.spawn_piece(type_index, spawn.x, spawn.y),
        };
        self.world.release(handle);

        self.placement_count += 1;
        self.next_piece = Some(next_index);
        self.pending_spawn = Some(PendingSpawn {
            type_index: next_index,
            due,
        });
        self.last_delta_seq = Some(seq);
        Ok(())
    }

    /// Spawn the scheduled piece once its delay has passed
    pub fn spawn_due(&mut self, now: Instant, spawn: SpawnPoint) -> bool {
        match self.pending_spawn {
            Some(pending) if pending.due <= now => {
                self.pending_spawn = None;
                self.discard_in_flight();
                self.spawn(pending.type_index, spawn);
                true
            }
            _ => false,
        }
    }

    /// Replace the whole dynamic body set and counters with `snapshot`
    pub fn apply_snapshot(&mut self, snapshot: &GameStateSnapshot, spawn: SpawnPoint) -> Result<(), Ignored> {
        if self
            .last_snapshot_seq
            .is_some_and(|last| snapshot.seq <= last)
        {
            return Err(Ignored::Stale);
        }
        snapshot.validate().map_err(|_| Ignored::Invalid)?;

        let keep = match (self.in_flight, snapshot.current_piece) {
            (Some(piece), Some(current)) if piece.type_index == current => Some(piece),
            _ => None,
        };
        self.world.clear_dynamic(keep.map(|p| p.handle));
        for record in &snapshot.bodies {
            self.world.insert(record);
        }

        self.in_flight = keep;
        self.pending_spawn = None;
        if let (None, Some(current)) = (self.in_flight, snapshot.current_piece) {
            self.spawn(current, spawn);
        }

        self.score = snapshot.score;
        self.placement_count = snapshot.placement_count;
        self.num_suika = snapshot.num_suika;
        self.next_piece = snapshot.next_piece;
        self.last_snapshot_seq = Some(snapshot.seq);
        self.last_delta_seq = Some(self.last_delta_seq.map_or(snapshot.seq, |d| d.max(snapshot.seq)));
        self.phase = PeerPhase::Tracking;
        Ok(())
    }

    fn require_tracking(&self) -> Result<(), Ignored> {
        match self.phase {
            PeerPhase::Tracking => Ok(()),
            PeerPhase::Uninitialized => Err(Ignored::Uninitialized),
        }
    }

    fn check_delta(&self, seq: u64) -> Result<(), Ignored> {
        match self.last_snapshot_seq {
            Some(last) if seq <= last => Err(Ignored::Stale),
            _ => Ok(()),
        }
    }

    fn spawn(&mut self, type_index: u8, spawn: SpawnPoint) {
        let handle = self.world.spawn_piece(type_index, spawn.x, spawn.y);
        self.in_flight = Some(InFlight { handle, type_index });
    }

    fn discard_in_flight(&mut self) {
        if let Some(piece) = self.in_flight.take() {
            self.world.remove(piece.handle);
        }
    }
}
