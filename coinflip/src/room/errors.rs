//! Room error types.

use thiserror::Error;

/// Errors returned by room operations.
///
/// All of these are recoverable, player-visible conditions: they are
/// reported back to the issuing connection and never abort the room.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RoomError {
    /// The roster is at the configured maximum.
    #[error("room is full")]
    RoomFull,

    /// The player is not in this room.
    #[error("player not found in room")]
    PlayerNotFound,

    /// The operation is not valid in the room's current phase.
    #[error("invalid action for current game phase")]
    InvalidPhase,

    /// A bet arrived after the betting deadline.
    #[error("betting phase has ended")]
    BettingClosed,

    /// The player already has a bet in the active round.
    #[error("player has already placed a bet this round")]
    DuplicateBet,

    /// The bet amount is outside the configured bounds.
    #[error("bet amount {amount} outside allowed range {min} to {max}")]
    InvalidAmount { amount: f64, min: f64, max: f64 },

    /// The player's balance does not cover the bet.
    #[error("insufficient balance: have {available}, need {required}")]
    InsufficientBalance { available: f64, required: f64 },

    /// A round was requested below the minimum roster size.
    #[error("not enough players to start a round")]
    NotEnoughPlayers,

    /// The room has been stopped.
    #[error("room is closed")]
    RoomClosed,
}

impl RoomError {
    /// Stable wire code for error replies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::RoomFull => "room_full",
            Self::PlayerNotFound => "player_not_found",
            Self::InvalidPhase => "invalid_phase",
            Self::BettingClosed => "betting_closed",
            Self::DuplicateBet => "duplicate_bet",
            Self::InvalidAmount { .. } => "invalid_amount",
            Self::InsufficientBalance { .. } => "insufficient_balance",
            Self::NotEnoughPlayers => "not_enough_players",
            Self::RoomClosed => "room_closed",
        }
    }
}
