//! Persistence interface for round results and player ledgers.
//!
//! The core invokes storage through [`HistoryStore`] and never embeds
//! backend logic; deployments supply their own implementation. The bundled
//! [`MemoryStore`] covers tests and single-process setups.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::game::Side;
use crate::net::messages::PlayerOutcome;

/// In-memory store implementation.
pub mod memory;

pub use memory::MemoryStore;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backing store failed.
    #[error("storage backend failure: {0}")]
    Backend(String),

    /// A record was rejected before reaching the backend.
    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// A resolved round as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundRecord {
    pub round_id: String,
    pub room_id: String,
    pub side: Side,
    pub seed: String,
    pub outcomes: Vec<PlayerOutcome>,
    pub finished_at: DateTime<Utc>,
}

/// A player's ledger as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerLedger {
    pub player_id: String,
    pub name: String,
    pub balance: f64,
    pub total_games: u32,
    pub total_wins: u32,
    pub net_profit: f64,
    pub updated_at: DateTime<Utc>,
}

/// Save/load interface for game history.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Persist a resolved round.
    async fn save_round(&self, record: &RoundRecord) -> StorageResult<()>;

    /// Most recent rounds, newest first, up to `limit`.
    async fn recent_rounds(&self, limit: usize) -> StorageResult<Vec<RoundRecord>>;

    /// Persist a player's ledger.
    async fn save_player(&self, ledger: &PlayerLedger) -> StorageResult<()>;

    /// Load a player's ledger, if one exists.
    async fn load_player(&self, player_id: &str) -> StorageResult<Option<PlayerLedger>>;
}
