//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

/// When a waiting room turns into a running game
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum StartMode {
    /// The host starts the game explicitly
    #[default]
    Lobby,
    /// The game starts as soon as two players are present
    Auto,
}

impl FromStr for StartMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lobby" => Ok(Self::Lobby),
            "auto" => Ok(Self::Auto),
            _ => Err(ConfigError::Invalid("START_MODE")),
        }
    }
}

/// Log output format
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format
    pub log_format: LogFormat,

    /// Allowed client origins for CORS, `*` for any
    pub client_origin: String,

    /// Room start policy
    pub start_mode: StartMode,
    /// Allow reconnecting players to reclaim a slot by nickname
    pub nickname_fallback: bool,
    /// Per-connection outbound queue depth
    pub outbound_buffer: usize,
    /// Max gameplay messages per second per connection
    pub input_rate_limit: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            client_origin: "*".to_string(),
            start_mode: StartMode::Lobby,
            nickname_fallback: true,
            outbound_buffer: 64,
            input_rate_limit: 60,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = match (lookup("PORT"), lookup("SERVER_ADDR")) {
            (Some(port), _) => format!("0.0.0.0:{}", port.trim())
                .parse::<SocketAddr>()
                .map_err(|_| ConfigError::InvalidAddress)?,
            (None, Some(addr)) => addr.parse::<SocketAddr>().map_err(|_| ConfigError::InvalidAddress)?,
            (None, None) => defaults.server_addr,
        };

        let log_format = match lookup("LOG_FORMAT").as_deref().map(str::trim) {
            None | Some("") | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(_) => return Err(ConfigError::Invalid("LOG_FORMAT")),
        };

        Ok(Self {
            server_addr,
            log_level: lookup("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_format,
            client_origin: lookup("CLIENT_ORIGIN").unwrap_or(defaults.client_origin),
            start_mode: lookup("START_MODE")
                .map(|v| v.parse::<StartMode>())
                .transpose()?
                .unwrap_or(defaults.start_mode),
            nickname_fallback: parse_or("NICKNAME_FALLBACK", &lookup, defaults.nickname_fallback)?,
            outbound_buffer: parse_or("OUTBOUND_BUFFER", &lookup, defaults.outbound_buffer)?,
            input_rate_limit: parse_or("INPUT_RATE_LIMIT", &lookup, defaults.input_rate_limit)?,
        })
    }
}

fn parse_or<T: FromStr>(
    key: &'static str,
    lookup: &impl Fn(&str) -> Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        None => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}
