//! Wall clock and uptime

use std::sync::OnceLock;

use chrono::{DateTime, Utc};

static STARTED_AT: OnceLock<DateTime<Utc>> = OnceLock::new();

/// Milliseconds since the Unix epoch, as sent in `welcome` and snapshots
pub fn unix_millis() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
}

/// Stamp the process start. Later calls keep the first stamp.
pub fn init_server_time() {
    STARTED_AT.get_or_init(Utc::now);
}

pub fn started_at() -> Option<DateTime<Utc>> {
    STARTED_AT.get().copied()
}

/// Whole seconds since `init_server_time`, zero before it
pub fn uptime_secs() -> u64 {
    started_at()
        .map(|start| (Utc::now() - start).num_seconds())
        .and_then(|secs| u64::try_from(secs).ok())
        .unwrap_or(0)
}
