//! Room relay: message validation, routing and the owning task

pub mod dispatch;
pub mod service;

pub use dispatch::{Envelope, Outbox, SessionRelay};
pub use service::{RelayHandle, RelayInput, RelayService, RelayStats};
