//! Lobby error taxonomy

use crate::ws::protocol::{PlayerNumber, ServerMsg};

/// Errors surfaced to the originating connection. None of them are fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LobbyError {
    #[error("Room not found")]
    RoomNotFound,

    #[error("Room is full")]
    RoomFull,

    #[error("Game already in progress")]
    GameInProgress,

    #[error("Only the host can do that")]
    NotHost,

    #[error("Invalid nickname: {0}")]
    InvalidNickname(&'static str),

    #[error("Invalid room name: {0}")]
    InvalidRoomName(&'static str),

    #[error("Room size must be between 2 and 4 players, got {0}")]
    InvalidMaxPlayers(u8),

    #[error("At least 2 players are needed to start")]
    NotEnoughPlayers,

    #[error("Not a member of this room")]
    NotInRoom,

    #[error("No player {0} in this room")]
    PlayerNotFound(PlayerNumber),
}

impl LobbyError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            LobbyError::RoomNotFound => "room_not_found",
            LobbyError::RoomFull => "room_full",
            LobbyError::GameInProgress => "game_in_progress",
            LobbyError::NotHost => "not_host",
            LobbyError::InvalidNickname(_) => "invalid_nickname",
            LobbyError::InvalidRoomName(_) => "invalid_room_name",
            LobbyError::InvalidMaxPlayers(_) => "invalid_max_players",
            LobbyError::NotEnoughPlayers => "not_enough_players",
            LobbyError::NotInRoom => "not_in_room",
            LobbyError::PlayerNotFound(_) => "player_not_found",
        }
    }
}

impl From<LobbyError> for ServerMsg {
    fn from(err: LobbyError) -> Self {
        ServerMsg::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}
