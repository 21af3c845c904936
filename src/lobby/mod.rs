//! Rooms, membership and identity reconciliation

pub mod error;
pub mod reconcile;
pub mod registry;
pub mod room;

pub use error::LobbyError;
pub use reconcile::{EnterGame, IdentityReconciler, Reconciliation, Resolution};
pub use registry::{Departure, GameStart, JoinOutcome, RoomRegistry, Seat};
pub use room::{Room, RoomDetail, MAX_ROOM_SIZE, MIN_PLAYERS};
