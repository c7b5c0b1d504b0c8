//! Multiplayer coin flip server.
//!
//! Accepts WebSocket connections, routes them through a session registry
//! onto per-room actors, and relays room broadcasts back out. Rounds are
//! resolved in memory; history goes through the library's store interface.

use std::sync::Arc;

use anyhow::Error;
use cf_server::api;
use cf_server::config::ServerConfig;
use coinflip::{MemoryStore, RegistryConfig, SecureFlipper, SessionRegistry};
use log::info;
use pico_args::Arguments;

const HELP: &str = "\
Run a multiplayer coin flip server

USAGE:
  cf_server [OPTIONS]

OPTIONS:
  --bind       IP:PORT     Server socket bind address  [default: env SERVER_BIND or 127.0.0.1:8080]
  --max-rooms  N           Maximum concurrent rooms    [default: env MAX_ROOMS or 100]

FLAGS:
  -h, --help               Print help information

ENVIRONMENT:
  SERVER_BIND              Server bind address (e.g. 0.0.0.0:8080)
  MAX_ROOMS                Maximum concurrent rooms
  ROOM_MIN_PLAYERS         Minimum roster size before betting starts
  ROOM_MAX_PLAYERS         Maximum roster size
  ROOM_MIN_BET             Smallest accepted bet
  ROOM_MAX_BET             Largest accepted bet
  ROOM_PAYOUT_RATIO        Multiplier applied to winning bets
  ROOM_BETTING_SECS        Betting phase length in seconds
  ROOM_RESULT_SECS         Result phase length in seconds
";

#[tokio::main]
async fn main() -> Result<(), Error> {
    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    env_logger::builder().format_target(false).init();

    let mut config = ServerConfig::from_env();
    if let Ok(bind) = pargs.value_from_str::<_, std::net::SocketAddr>("--bind") {
        config.bind = bind;
    }
    if let Ok(max_rooms) = pargs.value_from_str::<_, usize>("--max-rooms") {
        config.max_rooms = max_rooms;
    }
    config
        .room
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid room configuration: {e}"))?;

    info!("starting coin flip server at {}", config.bind);

    let registry = Arc::new(SessionRegistry::new(
        RegistryConfig {
            max_rooms: config.max_rooms,
            cleanup_interval: config.cleanup_interval,
        },
        config.room.clone(),
        Arc::new(SecureFlipper),
        Arc::new(MemoryStore::new()),
    ));
    let reaper = registry.spawn_reaper();

    let state = api::AppState {
        registry: Arc::clone(&registry),
        config: Arc::new(config.clone()),
    };
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind to {}: {e}", config.bind))?;

    info!(
        "server is running at http://{}. Press Ctrl+C to stop.",
        config.bind
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("server error: {e}"))?;

    info!("shutting down server...");
    registry.shutdown().await;
    reaper.abort();

    Ok(())
}

/// Graceful shutdown signal.
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install CTRL+C signal handler");
}
