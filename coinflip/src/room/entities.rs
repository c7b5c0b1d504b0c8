//! Roster and round bookkeeping types.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

use crate::game::Side;
use crate::net::messages::{BetData, PlayerInfo, PlayerOutcome};

/// A player in a room's roster.
#[derive(Debug, Clone)]
pub struct Player {
    pub id: String,
    pub name: String,
    pub balance: f64,
    pub is_online: bool,
    pub last_seen: DateTime<Utc>,
    pub current_bet: Option<BetData>,
    pub total_games: u32,
    pub total_wins: u32,
    pub net_profit: f64,
}

impl Player {
    pub fn new(id: String, name: String, balance: f64) -> Self {
        Self {
            id,
            name,
            balance,
            is_online: true,
            last_seen: Utc::now(),
            current_bet: None,
            total_games: 0,
            total_wins: 0,
            net_profit: 0.0,
        }
    }
}

impl From<&Player> for PlayerInfo {
    fn from(player: &Player) -> Self {
        Self {
            id: player.id.clone(),
            name: player.name.clone(),
            balance: player.balance,
            has_bet: player.current_bet.is_some(),
            is_online: player.is_online,
        }
    }
}

/// One betting, reveal, result cycle within a room.
///
/// Created when the room leaves Waiting and cleared when it returns.
#[derive(Debug, Clone)]
pub struct Round {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub bets: HashMap<String, BetData>,
    pub outcome: Option<Side>,
    pub seed: Option<String>,
    pub results: HashMap<String, PlayerOutcome>,
}

impl Round {
    pub fn new(room_id: &str) -> Self {
        Self {
            id: format!("round_{room_id}_{}", Uuid::new_v4().simple()),
            started_at: Utc::now(),
            bets: HashMap::new(),
            outcome: None,
            seed: None,
            results: HashMap::new(),
        }
    }
}
