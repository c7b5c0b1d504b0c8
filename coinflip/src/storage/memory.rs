//! In-memory store implementation.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;

use super::{HistoryStore, PlayerLedger, RoundRecord, StorageError, StorageResult};

/// How many rounds the in-memory store retains before evicting the oldest.
const ROUND_RETENTION: usize = 1000;

/// [`HistoryStore`] backed by process memory.
///
/// Useful for tests and deployments where persistence is not required.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    rounds: VecDeque<RoundRecord>,
    players: HashMap<String, PlayerLedger>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for MemoryStore {
    async fn save_round(&self, record: &RoundRecord) -> StorageResult<()> {
        if record.round_id.is_empty() {
            return Err(StorageError::InvalidRecord(
                "round id cannot be empty".to_string(),
            ));
        }
        let mut inner = self.inner.write().await;
        inner.rounds.push_back(record.clone());
        while inner.rounds.len() > ROUND_RETENTION {
            inner.rounds.pop_front();
        }
        Ok(())
    }

    async fn recent_rounds(&self, limit: usize) -> StorageResult<Vec<RoundRecord>> {
        let inner = self.inner.read().await;
        Ok(inner.rounds.iter().rev().take(limit).cloned().collect())
    }

    async fn save_player(&self, ledger: &PlayerLedger) -> StorageResult<()> {
        if ledger.player_id.is_empty() {
            return Err(StorageError::InvalidRecord(
                "player id cannot be empty".to_string(),
            ));
        }
        let mut inner = self.inner.write().await;
        inner.players.insert(ledger.player_id.clone(), ledger.clone());
        Ok(())
    }

    async fn load_player(&self, player_id: &str) -> StorageResult<Option<PlayerLedger>> {
        let inner = self.inner.read().await;
        Ok(inner.players.get(player_id).cloned())
    }
}
