//! Deterministic piece sequence per player

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::ws::protocol::{PlayerNumber, PIECE_KINDS, SPAWNABLE_KINDS};

/// Piece sequence derived from the room seed and a player number.
///
/// Every client can reproduce any player's sequence, but peers still follow
/// the indices announced in `opponentFruitDropped` rather than predicting them.
#[derive(Debug, Clone)]
pub struct SeededPieces {
    rng: ChaCha8Rng,
}

impl SeededPieces {
    pub fn new(room_seed: u64, player_number: PlayerNumber) -> Self {
        let seed = room_seed ^ (u64::from(player_number)).rotate_left(32);
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Next spawnable piece index
    pub fn next_index(&mut self) -> u8 {
        self.rng.gen_range(0..SPAWNABLE_KINDS)
    }
}

/// Radius used by headless worlds; real clients take sizes from their asset table
pub fn nominal_radius(type_index: u8) -> f32 {
    let index = type_index.min(PIECE_KINDS - 1);
    16.0 + 9.0 * f32::from(index)
}
