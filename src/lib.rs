//! Suika Party - multiplayer room relay and client-side replica reconciliation
//!
//! The server half routes lobby and gameplay events between players in small
//! rooms over WebSockets. The `replica` module is the client half: it keeps
//! local copies of opponents' boards in step with those events.

pub mod app;
pub mod config;
pub mod http;
pub mod lobby;
pub mod relay;
pub mod replica;
pub mod store;
pub mod util;
pub mod ws;
