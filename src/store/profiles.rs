//! Player profile management

use std::collections::HashMap;

use serde::Serialize;

use crate::ws::protocol::ConnectionId;

/// Shortest accepted nickname, in characters
pub const MIN_NICKNAME_LEN: usize = 2;

/// Longest accepted nickname, in characters
pub const MAX_NICKNAME_LEN: usize = 20;

/// Display data attached to a connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerProfile {
    pub nickname: String,
    pub is_ready: bool,
}

/// Connection identity -> profile lookup table
#[derive(Debug, Default)]
pub struct ProfileStore {
    profiles: HashMap<ConnectionId, PlayerProfile>,
}

impl ProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a profile by connection
    pub fn get(&self, connection: &ConnectionId) -> Option<&PlayerProfile> {
        self.profiles.get(connection)
    }

    /// Nickname of a connection, or a placeholder for unknown connections
    pub fn nickname_of(&self, connection: &ConnectionId) -> String {
        self.profiles
            .get(connection)
            .map(|p| p.nickname.clone())
            .unwrap_or_else(|| "Player".to_string())
    }

    /// Create or replace a profile
    pub fn upsert(&mut self, connection: ConnectionId, nickname: String, is_ready: bool) {
        self.profiles
            .insert(connection, PlayerProfile { nickname, is_ready });
    }

    /// Set the nickname, keeping readiness if a profile exists
    pub fn set_nickname(&mut self, connection: ConnectionId, nickname: String) {
        self.profiles
            .entry(connection)
            .and_modify(|p| p.nickname = nickname.clone())
            .or_insert(PlayerProfile {
                nickname,
                is_ready: false,
            });
    }

    /// Remove a profile (connection gone)
    pub fn remove(&mut self, connection: &ConnectionId) -> Option<PlayerProfile> {
        self.profiles.remove(connection)
    }

    /// Move a profile to a new connection, discarding whatever the target had
    pub fn transfer(&mut self, from: &ConnectionId, to: ConnectionId) -> bool {
        match self.profiles.remove(from) {
            Some(profile) => {
                self.profiles.insert(to, profile);
                true
            }
            None => false,
        }
    }

    /// Connections whose profile carries `nickname`
    pub fn find_by_nickname<'a>(
        &'a self,
        nickname: &'a str,
    ) -> impl Iterator<Item = ConnectionId> + 'a {
        self.profiles
            .iter()
            .filter(move |(_, p)| p.nickname == nickname)
            .map(|(c, _)| *c)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

/// Trim and validate a nickname
pub fn normalize_nickname(raw: &str) -> Result<String, &'static str> {
    let nickname = raw.trim();
    let len = nickname.chars().count();
    if len == 0 {
        return Err("empty");
    }
    if len < MIN_NICKNAME_LEN {
        return Err("too short");
    }
    if len > MAX_NICKNAME_LEN {
        return Err("too long");
    }
    if nickname.chars().any(char::is_control) {
        return Err("contains control characters");
    }
    Ok(nickname.to_string())
}

/// First of `requested`, `requested1`, `requested2`, ... not present in `taken`.
/// The base is cut short so a suffixed name still fits `MAX_NICKNAME_LEN`.
pub fn dedupe_nickname<'a>(requested: &str, taken: impl Iterator<Item = &'a str> + Clone) -> String {
    let is_taken = |candidate: &str| taken.clone().any(|t| t == candidate);
    if !is_taken(requested) {
        return requested.to_string();
    }
    (1u32..)
        .map(|n| {
            let suffix = n.to_string();
            let base: String = requested
                .chars()
                .take(MAX_NICKNAME_LEN.saturating_sub(suffix.len()))
                .collect();
            format!("{}{suffix}", base.trim_end())
        })
        .find(|candidate| !is_taken(candidate))
        .unwrap_or_else(|| requested.to_string())
}
