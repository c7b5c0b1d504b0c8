//! Server configuration.

use coinflip::RoomConfig;
use std::net::SocketAddr;
use std::time::Duration;

/// Gateway and registry tuning.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address the HTTP/WebSocket listener binds to.
    pub bind: SocketAddr,

    /// Upper bound on concurrently live rooms.
    pub max_rooms: usize,

    /// Inbound WebSocket message size cap in bytes.
    pub max_message_size: usize,

    /// Per-connection outbound buffer depth.
    pub outbound_capacity: usize,

    /// How often the server pings each connection.
    pub ping_period: Duration,

    /// How long a connection may stay silent before it is torn down.
    pub pong_wait: Duration,

    /// Deadline for a single outbound send.
    pub write_timeout: Duration,

    /// How often empty rooms are reclaimed.
    pub cleanup_interval: Duration,

    /// Defaults applied to auto-created rooms.
    pub room: RoomConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".parse().expect("valid default bind"),
            max_rooms: 100,
            max_message_size: 4096,
            outbound_capacity: 256,
            ping_period: Duration::from_secs(54),
            pong_wait: Duration::from_secs(60),
            write_timeout: Duration::from_secs(10),
            cleanup_interval: Duration::from_secs(300),
            room: RoomConfig::default(),
        }
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

impl ServerConfig {
    /// Build a configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(bind) = env_parsed("SERVER_BIND") {
            config.bind = bind;
        }
        if let Some(max_rooms) = env_parsed("MAX_ROOMS") {
            config.max_rooms = max_rooms;
        }
        if let Some(size) = env_parsed("MAX_MESSAGE_SIZE") {
            config.max_message_size = size;
        }
        if let Some(secs) = env_parsed("PING_PERIOD_SECS") {
            config.ping_period = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parsed("PONG_WAIT_SECS") {
            config.pong_wait = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parsed("WRITE_TIMEOUT_SECS") {
            config.write_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parsed("CLEANUP_INTERVAL_SECS") {
            config.cleanup_interval = Duration::from_secs(secs);
        }

        if let Some(min_players) = env_parsed("ROOM_MIN_PLAYERS") {
            config.room.min_players = min_players;
        }
        if let Some(max_players) = env_parsed("ROOM_MAX_PLAYERS") {
            config.room.max_players = max_players;
        }
        if let Some(min_bet) = env_parsed("ROOM_MIN_BET") {
            config.room.min_bet = min_bet;
        }
        if let Some(max_bet) = env_parsed("ROOM_MAX_BET") {
            config.room.max_bet = max_bet;
        }
        if let Some(ratio) = env_parsed("ROOM_PAYOUT_RATIO") {
            config.room.payout_ratio = ratio;
        }
        if let Some(secs) = env_parsed("ROOM_BETTING_SECS") {
            config.room.betting_duration = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parsed("ROOM_RESULT_SECS") {
            config.room.result_duration = Duration::from_secs(secs);
        }
        config
    }
}
