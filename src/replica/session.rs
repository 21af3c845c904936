//! One client's side of a game: replicas of the others plus its own sender

use std::time::Instant;

use tracing::debug;

use crate::ws::protocol::ServerMsg;

use super::engine::{EngineEvent, Outcome, ReconciliationEngine, ReplicaConfig};
use super::local::LocalSync;
use super::pieces::SeededPieces;
use super::world::PhysicsWorld;

struct LocalGame {
    sync: LocalSync,
    pieces: SeededPieces,
    seed: u64,
}

/// Feeds server messages to the engine and keeps the local sender's player
/// number and piece sequence aligned with it
pub struct ClientSession<W> {
    engine: ReconciliationEngine<W>,
    game: Option<LocalGame>,
}

impl<W: PhysicsWorld + Default> ClientSession<W> {
    pub fn new(config: ReplicaConfig) -> Self {
        Self {
            engine: ReconciliationEngine::new(config),
            game: None,
        }
    }

    pub fn engine(&self) -> &ReconciliationEngine<W> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut ReconciliationEngine<W> {
        &mut self.engine
    }

    /// Sender for the local board, once a game seed is known
    pub fn local(&mut self) -> Option<&mut LocalSync> {
        self.game.as_mut().map(|g| &mut g.sync)
    }

    /// Next piece for the local board
    pub fn next_piece(&mut self) -> Option<u8> {
        self.game.as_mut().map(|g| g.pieces.next_index())
    }

    pub fn apply(&mut self, msg: &ServerMsg, now: Instant) -> Outcome {
        let outcome = self.engine.apply(msg, now);
        match msg {
            ServerMsg::GameStarting {
                room_id,
                random_seed,
                ..
            } => self.begin(room_id, *random_seed),
            ServerMsg::GameJoined {
                room_id,
                random_seed: Some(seed),
                ..
            } => {
                let same_game = self
                    .game
                    .as_ref()
                    .is_some_and(|g| g.seed == *seed && g.sync.room_id() == room_id.as_str());
                if !same_game {
                    self.begin(room_id, *seed);
                }
            }
            ServerMsg::RoomReset { .. } | ServerMsg::RoomLeft { .. } => self.game = None,
            _ => {}
        }
        self.follow_local_number();
        outcome
    }

    pub fn advance(&mut self, now: Instant) -> Vec<EngineEvent> {
        self.engine.advance(now)
    }

    fn begin(&mut self, room_id: &str, seed: u64) {
        self.game = self.engine.local_player().map(|player_number| LocalGame {
            sync: LocalSync::new(room_id.to_string(), player_number),
            pieces: SeededPieces::new(seed, player_number),
            seed,
        });
    }

    fn follow_local_number(&mut self) {
        let (Some(game), Some(number)) = (self.game.as_mut(), self.engine.local_player()) else {
            return;
        };
        if game.sync.player_number() != number {
            debug!(from = game.sync.player_number(), to = number, "local player renumbered");
            game.sync.set_player_number(number);
        }
    }
}
