//! Client-side reconciliation of remote boards
//!
//! Each peer's board is mirrored locally. Low-latency deltas (move, drop,
//! initial piece) keep it roughly in step; periodic full snapshots replace it
//! wholesale so drift stays bounded. Sequence numbers order both paths.

pub mod engine;
pub mod local;
pub mod peer;
pub mod pieces;
pub mod session;
pub mod world;

pub use engine::{EngineEvent, Outcome, ReconciliationEngine, ReplicaConfig};
pub use local::{LocalBoard, LocalSync, SNAPSHOT_EVERY};
pub use peer::{Ignored, PeerPhase, PeerReplica, SpawnPoint};
pub use pieces::SeededPieces;
pub use session::ClientSession;
pub use world::{BodyHandle, InertWorld, PhysicsWorld};
