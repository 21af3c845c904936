//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::relay::{RelayHandle, RelayService};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub relay: RelayHandle,
}

impl AppState {
    /// Build state plus the relay task the caller must spawn
    pub fn new(config: Config) -> (Self, RelayService) {
        let (relay_service, relay) = RelayService::new(&config);
        let state = Self {
            config: Arc::new(config),
            relay,
        };
        (state, relay_service)
    }
}
