//! Room actor message types.

use serde::Serialize;
use tokio::sync::oneshot;

use super::errors::RoomError;
use crate::game::Side;
use crate::net::messages::{BetData, Phase, PlayerInfo};

/// Messages that can be sent to a room actor.
#[derive(Debug)]
pub enum RoomMessage {
    /// Add a player to the roster. Re-adding a present player id marks the
    /// player online again without touching their balance.
    AddPlayer {
        player_id: String,
        name: String,
        balance: f64,
        response: oneshot::Sender<Result<(), RoomError>>,
    },

    /// Remove a player, refunding any open bet first.
    RemovePlayer {
        player_id: String,
        response: oneshot::Sender<Result<(), RoomError>>,
    },

    /// Place a bet in the active round.
    PlaceBet {
        player_id: String,
        amount: f64,
        side: Side,
        response: oneshot::Sender<Result<BetData, RoomError>>,
    },

    /// Start a round explicitly. Joins already auto-start rounds; this is
    /// for callers that manage pacing themselves.
    StartRound {
        response: oneshot::Sender<Result<(), RoomError>>,
    },

    /// Snapshot the room for discovery and reaping.
    GetState {
        response: oneshot::Sender<RoomState>,
    },

    /// Stop the room. The actor loop exits after replying.
    Close { response: oneshot::Sender<()> },
}

/// Point-in-time snapshot of a room.
#[derive(Debug, Clone, Serialize)]
pub struct RoomState {
    pub room_id: String,
    pub name: String,
    pub phase: Phase,
    pub round_id: Option<String>,
    pub players: Vec<PlayerInfo>,
    pub min_players: usize,
    pub max_players: usize,
    pub total_rounds: u64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub last_activity: chrono::DateTime<chrono::Utc>,
}
