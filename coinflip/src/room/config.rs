//! Room configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_MIN_PLAYERS: usize = 2;
pub const DEFAULT_MAX_PLAYERS: usize = 8;
pub const DEFAULT_BETTING_SECS: u64 = 60;
pub const DEFAULT_RESULT_SECS: u64 = 10;

/// Room configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomConfig {
    /// Minimum roster size before betting can start.
    pub min_players: usize,

    /// Maximum roster size.
    pub max_players: usize,

    /// Smallest accepted bet.
    pub min_bet: f64,

    /// Largest accepted bet.
    pub max_bet: f64,

    /// Multiplier applied to a winning bet's amount.
    pub payout_ratio: f64,

    /// Length of the betting phase.
    pub betting_duration: Duration,

    /// How long results stay on display before the round is cleared.
    pub result_duration: Duration,

    /// Grace delay between a cleared round and the next auto-started one.
    pub round_gap: Duration,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            min_players: DEFAULT_MIN_PLAYERS,
            max_players: DEFAULT_MAX_PLAYERS,
            min_bet: 1.0,
            max_bet: 100.0,
            payout_ratio: 2.0,
            betting_duration: Duration::from_secs(DEFAULT_BETTING_SECS),
            result_duration: Duration::from_secs(DEFAULT_RESULT_SECS),
            round_gap: Duration::from_secs(2),
        }
    }
}

impl RoomConfig {
    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.min_players < 2 {
            return Err("min players must be at least 2".to_string());
        }
        if self.max_players < self.min_players || self.max_players > 8 {
            return Err("max players must be between min players and 8".to_string());
        }
        if self.min_bet <= 0.0 {
            return Err("min bet must be positive".to_string());
        }
        if self.max_bet < self.min_bet {
            return Err("max bet must be at least min bet".to_string());
        }
        if self.payout_ratio <= 1.0 {
            return Err("payout ratio must exceed 1.0".to_string());
        }
        if self.betting_duration.is_zero() || self.result_duration.is_zero() {
            return Err("phase durations must be nonzero".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(RoomConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_oversized_roster() {
        let config = RoomConfig {
            max_players: 9,
            ..RoomConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_inverted_bet_bounds() {
        let config = RoomConfig {
            min_bet: 50.0,
            max_bet: 10.0,
            ..RoomConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_break_even_payout() {
        let config = RoomConfig {
            payout_ratio: 1.0,
            ..RoomConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
