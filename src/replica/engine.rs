//! Client reconciliation engine

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::ws::protocol::{
    ClientMsg, GameStateSnapshot, PlayerInfo, PlayerNumber, RoomId, RoomState, ServerMsg,
};

use super::peer::{Ignored, PeerReplica, SpawnPoint};
use super::world::PhysicsWorld;

/// Engine tuning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReplicaConfig {
    /// Where held pieces appear on a peer's board
    pub spawn: SpawnPoint,
    /// Gap between a drop and the next piece appearing
    pub spawn_delay: Duration,
    /// How long a snapshot request may stay unanswered
    pub request_timeout: Duration,
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        Self {
            spawn: SpawnPoint { x: 300.0, y: 50.0 },
            spawn_delay: Duration::from_millis(1000),
            request_timeout: Duration::from_secs(3),
        }
    }
}

/// Result of feeding one server message to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    Ignored(Ignored),
    /// Not a message the engine consumes
    Unhandled,
}

impl From<Result<(), Ignored>> for Outcome {
    fn from(result: Result<(), Ignored>) -> Self {
        match result {
            Ok(()) => Outcome::Applied,
            Err(reason) => Outcome::Ignored(reason),
        }
    }
}

/// Timer-driven happenings reported by [`ReconciliationEngine::advance`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    PieceSpawned { player_number: PlayerNumber },
    /// No answer to a snapshot request; the caller may retry
    RequestTimedOut { player_number: PlayerNumber },
}

/// Keeps one replica per remote player in step with relayed events
pub struct ReconciliationEngine<W> {
    config: ReplicaConfig,
    room_id: Option<RoomId>,
    room_state: Option<RoomState>,
    local: Option<PlayerNumber>,
    peers: BTreeMap<PlayerNumber, PeerReplica<W>>,
    pending_requests: BTreeMap<PlayerNumber, Instant>,
}

impl<W: PhysicsWorld + Default> ReconciliationEngine<W> {
    pub fn new(config: ReplicaConfig) -> Self {
        Self {
            config,
            room_id: None,
            room_state: None,
            local: None,
            peers: BTreeMap::new(),
            pending_requests: BTreeMap::new(),
        }
    }

    pub fn room_id(&self) -> Option<&str> {
        self.room_id.as_deref()
    }

    /// Our own number; moves when players ahead of us leave or are reinserted
    pub fn local_player(&self) -> Option<PlayerNumber> {
        self.local
    }

    pub fn room_state(&self) -> Option<RoomState> {
        self.room_state
    }

    pub fn peer(&self, player_number: PlayerNumber) -> Option<&PeerReplica<W>> {
        self.peers.get(&player_number)
    }

    pub fn peers(&self) -> impl Iterator<Item = &PeerReplica<W>> {
        self.peers.values()
    }

    pub fn has_pending_request(&self, player_number: PlayerNumber) -> bool {
        self.pending_requests.contains_key(&player_number)
    }

    /// Feed one server message
    pub fn apply(&mut self, msg: &ServerMsg, now: Instant) -> Outcome {
        match msg {
            ServerMsg::RoomCreated(entered) | ServerMsg::RoomJoined(entered) => {
                self.enter(&entered.room_id, entered.player_number, &entered.players);
                self.room_state = Some(RoomState::Waiting);
                Outcome::Applied
            }
            ServerMsg::GameJoined {
                room_id,
                player_number,
                players,
                state,
                ..
            } => {
                self.enter(room_id, *player_number, players);
                self.room_state = Some(*state);
                Outcome::Applied
            }
            ServerMsg::GameStarting { room_id, players, .. } => {
                self.room_id = Some(room_id.clone());
                self.room_state = Some(RoomState::Playing);
                self.reset_peers(players);
                Outcome::Applied
            }
            ServerMsg::RoomReset { players, .. } => {
                self.room_state = Some(RoomState::Waiting);
                self.reset_peers(players);
                Outcome::Applied
            }
            ServerMsg::RoomStateChanged { state, .. } => {
                self.room_state = Some(*state);
                Outcome::Applied
            }
            ServerMsg::PlayerJoined {
                player_number,
                players,
            } => {
                let seated = self.peers.len() + usize::from(self.local.is_some());
                if players.len() > seated && usize::from(*player_number) <= seated {
                    self.insert_player(*player_number);
                }
                self.sync_roster(players);
                Outcome::Applied
            }
            ServerMsg::PlayerReconnected {
                player_number,
                players,
            } => {
                self.replace_peer(*player_number);
                self.sync_roster(players);
                Outcome::Applied
            }
            ServerMsg::PlayerLeft { player_number, .. } => {
                self.remove_player(*player_number);
                Outcome::Applied
            }
            ServerMsg::RoomLeft { .. } => {
                self.room_id = None;
                self.room_state = None;
                self.local = None;
                self.peers.clear();
                self.pending_requests.clear();
                Outcome::Applied
            }
            ServerMsg::ScoreUpdate { scores } => {
                for (number, score) in scores {
                    if let Some(peer) = self.peers.get_mut(number) {
                        peer.set_score(*score);
                    }
                }
                Outcome::Applied
            }
            ServerMsg::OpponentInitialFruit {
                player_number,
                seq,
                fruit_index,
            } => {
                let spawn = self.config.spawn;
                self.with_peer(*player_number, |peer| peer.initialize(*seq, *fruit_index, spawn))
            }
            ServerMsg::OpponentFruitMove {
                player_number,
                seq,
                x,
                y,
            } => self.with_peer(*player_number, |peer| peer.move_piece(*seq, *x, *y)),
            ServerMsg::OpponentFruitDropped {
                player_number,
                seq,
                fruit_index,
                next_fruit_index,
            } => {
                let spawn = self.config.spawn;
                let due = now + self.config.spawn_delay;
                self.with_peer(*player_number, |peer| {
                    peer.drop_piece(*seq, *fruit_index, *next_fruit_index, spawn, due)
                })
            }
            ServerMsg::OpponentCompleteState { game_state } => self.apply_snapshot(game_state),
            _ => Outcome::Unhandled,
        }
    }

    /// Run spawn timers and request deadlines
    pub fn advance(&mut self, now: Instant) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        let spawn = self.config.spawn;
        for peer in self.peers.values_mut() {
            if peer.spawn_due(now, spawn) {
                events.push(EngineEvent::PieceSpawned {
                    player_number: peer.player_number(),
                });
            }
        }

        let expired: Vec<PlayerNumber> = self
            .pending_requests
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(number, _)| *number)
            .collect();
        for player_number in expired {
            self.pending_requests.remove(&player_number);
            debug!(player = player_number, "snapshot request timed out");
            events.push(EngineEvent::RequestTimedOut { player_number });
        }
        events
    }

    /// Ask a peer for an immediate snapshot. Returns the message to send.
    pub fn request_snapshot(&mut self, target: PlayerNumber, now: Instant) -> Option<ClientMsg> {
        let room_id = self.room_id.clone()?;
        if !self.peers.contains_key(&target) {
            return None;
        }
        self.pending_requests
            .insert(target, now + self.config.request_timeout);
        Some(ClientMsg::RequestCompleteState {
            room_id,
            target_player_number: target,
        })
    }

    fn apply_snapshot(&mut self, snapshot: &GameStateSnapshot) -> Outcome {
        let player_number = snapshot.player_number;
        let spawn = self.config.spawn;
        let outcome = self.with_peer(player_number, |peer| peer.apply_snapshot(snapshot, spawn));
        if outcome == Outcome::Applied {
            self.pending_requests.remove(&player_number);
        }
        outcome
    }

    fn with_peer(
        &mut self,
        player_number: PlayerNumber,
        f: impl FnOnce(&mut PeerReplica<W>) -> Result<(), Ignored>,
    ) -> Outcome {
        let outcome = if self.local == Some(player_number) {
            Outcome::Ignored(Ignored::OwnEvent)
        } else {
            match self.peers.get_mut(&player_number) {
                Some(peer) => f(peer).into(),
                None => Outcome::Ignored(Ignored::UnknownPeer),
            }
        };
        if let Outcome::Ignored(reason) = outcome {
            debug!(player = player_number, %reason, "replica event ignored");
        }
        outcome
    }

    fn enter(&mut self, room_id: &str, local: PlayerNumber, players: &[PlayerInfo]) {
        if self.room_id.as_deref() != Some(room_id) {
            self.peers.clear();
            self.pending_requests.clear();
        }
        self.room_id = Some(room_id.to_string());
        self.local = Some(local);
        self.sync_roster(players);
    }

    /// Add replicas for new roster entries and drop ones no longer present
    fn sync_roster(&mut self, players: &[PlayerInfo]) {
        let local = self.local;
        self.peers
            .retain(|number, _| players.iter().any(|p| p.number == *number) && Some(*number) != local);
        self.pending_requests.retain(|number, _| players.iter().any(|p| p.number == *number));
        for player in players {
            if Some(player.number) != local {
                self.peers
                    .entry(player.number)
                    .or_insert_with(|| PeerReplica::new(player.number, W::default()));
            }
        }
    }

    /// Fresh, uninitialized replicas for everyone but the local player
    fn reset_peers(&mut self, players: &[PlayerInfo]) {
        self.peers.clear();
        self.pending_requests.clear();
        self.sync_roster(players);
    }

    /// A seat reclaimed at `inserted` pushes everyone from there up by one
    fn insert_player(&mut self, inserted: PlayerNumber) {
        let shift = |number: PlayerNumber| if number >= inserted { number + 1 } else { number };
        self.peers = std::mem::take(&mut self.peers)
            .into_iter()
            .map(|(number, mut peer)| {
                let moved = shift(number);
                peer.renumber(moved);
                (moved, peer)
            })
            .collect();
        self.pending_requests = std::mem::take(&mut self.pending_requests)
            .into_iter()
            .map(|(number, deadline)| (shift(number), deadline))
            .collect();
        self.local = self.local.map(shift);
    }

    /// The peer reloaded: its board and sequence numbers start over
    fn replace_peer(&mut self, player_number: PlayerNumber) {
        if self.local == Some(player_number) {
            return;
        }
        self.pending_requests.remove(&player_number);
        if self.peers.contains_key(&player_number) {
            debug!(player = player_number, "peer reconnected, replica reset");
            self.peers
                .insert(player_number, PeerReplica::new(player_number, W::default()));
        }
    }

    /// Player numbers above the one that left shift down by one
    fn remove_player(&mut self, left: PlayerNumber) {
        self.peers.remove(&left);
        self.pending_requests.remove(&left);

        self.peers = std::mem::take(&mut self.peers)
            .into_iter()
            .map(|(number, mut peer)| {
                if number > left {
                    peer.renumber(number - 1);
                    (number - 1, peer)
                } else {
                    (number, peer)
                }
            })
            .collect();
        self.pending_requests = std::mem::take(&mut self.pending_requests)
            .into_iter()
            .map(|(number, deadline)| if number > left { (number - 1, deadline) } else { (number, deadline) })
            .collect();

        if let Some(local) = self.local {
            if local > left {
                self.local = Some(local - 1);
            }
        }
    }
}
