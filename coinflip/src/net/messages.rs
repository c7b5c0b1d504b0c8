//! Envelope and payload types for the wire protocol.
//!
//! Every message on the wire is an [`Envelope`]: a kind tag, addressing
//! fields, a timestamp, and a kind-specific JSON payload. Delivery of
//! room broadcasts is best-effort, so clients must treat the most recent
//! `room_update` as authoritative rather than relying on every
//! intermediate event arriving.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::fmt;

use super::errors::ProtocolError;
use crate::game::Side;

/// Kinds of messages exchanged between a connection and the session
/// registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeKind {
    // Room management
    JoinRoom,
    LeaveRoom,
    RoomUpdate,
    PlayerList,

    // Game flow
    GameStart,
    BetPhase,
    BetPlaced,
    RevealPhase,
    GameResult,
    RoundEnd,

    // Synchronization
    TimerUpdate,
    SeedCommit,
    SeedReveal,

    // Error replies
    Error,
}

impl fmt::Display for EnvelopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::JoinRoom => "join_room",
            Self::LeaveRoom => "leave_room",
            Self::RoomUpdate => "room_update",
            Self::PlayerList => "player_list",
            Self::GameStart => "game_start",
            Self::BetPhase => "bet_phase",
            Self::BetPlaced => "bet_placed",
            Self::RevealPhase => "reveal_phase",
            Self::GameResult => "game_result",
            Self::RoundEnd => "round_end",
            Self::TimerUpdate => "timer_update",
            Self::SeedCommit => "seed_commit",
            Self::SeedReveal => "seed_reveal",
            Self::Error => "error",
        };
        write!(f, "{repr}")
    }
}

/// The room's current stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Waiting for enough players to join.
    Waiting,
    /// Players can place bets until the betting deadline.
    Betting,
    /// The outcome is being resolved.
    Revealing,
    /// Results and payouts are on display.
    Result,
    /// Roster dropped below the minimum mid-round.
    Paused,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::Waiting => "waiting",
            Self::Betting => "betting",
            Self::Revealing => "revealing",
            Self::Result => "result",
            Self::Paused => "paused",
        };
        write!(f, "{repr}")
    }
}

/// A message between a connection and the session registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub kind: EnvelopeKind,
    #[serde(default)]
    pub room_id: String,
    #[serde(default)]
    pub player_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Envelope {
    /// Create an envelope with a typed payload.
    pub fn new<T: Serialize>(
        kind: EnvelopeKind,
        room_id: &str,
        player_id: &str,
        payload: &T,
    ) -> Result<Self, ProtocolError> {
        Ok(Self {
            kind,
            room_id: room_id.to_string(),
            player_id: player_id.to_string(),
            timestamp: Utc::now(),
            payload: serde_json::to_value(payload)?,
        })
    }

    /// Create an envelope with no payload.
    pub fn bare(kind: EnvelopeKind, room_id: &str, player_id: &str) -> Self {
        Self {
            kind,
            room_id: room_id.to_string(),
            player_id: player_id.to_string(),
            timestamp: Utc::now(),
            payload: serde_json::Value::Null,
        }
    }

    /// Serialize to a JSON text frame.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse an envelope from a JSON text frame.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Interpret the payload as a specific type.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

/// Payload of a `join_room` command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinRoomData {
    pub display_name: String,
    pub starting_balance: f64,
}

/// A single bet, both as placed on the wire and as held in the round
/// ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetData {
    pub player_id: String,
    pub amount: f64,
    pub side: Side,
    pub bet_id: String,
}

/// Public information about one player in a roster snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub id: String,
    pub name: String,
    pub balance: f64,
    pub has_bet: bool,
    pub is_online: bool,
}

/// Payload of a `room_update` broadcast. The full roster snapshot is
/// authoritative for clients that missed intermediate events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomUpdateData {
    pub room_id: String,
    pub players: Vec<PlayerInfo>,
    pub phase: Phase,
    pub timer_seconds: u64,
    pub min_players: usize,
    pub max_players: usize,
}

/// Payload of a `player_list` reply sent to a joining connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerListData {
    pub room_id: String,
    pub players: Vec<PlayerInfo>,
}

/// Payload of `bet_phase` and `timer_update` broadcasts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerData {
    pub phase: Phase,
    pub seconds_left: u64,
    pub total_seconds: u64,
}

/// Payload naming a round, used by `game_start`, `reveal_phase`, and
/// `round_end`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundRef {
    pub round_id: String,
}

/// Payload of a `seed_commit` broadcast: the digest of the outcome seed,
/// published before the seed itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedCommitData {
    pub round_id: String,
    pub seed_hash: String,
}

/// Payload of a `seed_reveal` broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedRevealData {
    pub round_id: String,
    pub seed: String,
}

/// One player's result for a resolved round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerOutcome {
    pub player_id: String,
    pub player_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bet: Option<BetData>,
    pub won: bool,
    pub payout: f64,
    pub new_balance: f64,
}

/// Payload of a `game_result` broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameResultData {
    pub round_id: String,
    pub side: Side,
    pub seed: String,
    pub winners: Vec<PlayerOutcome>,
    pub losers: Vec<PlayerOutcome>,
}

/// Payload of an `error` reply, addressed to a single connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorData {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(envelope: Envelope) {
        let text = envelope.encode().unwrap();
        let decoded = Envelope::decode(&text).unwrap();
        assert_eq!(envelope, decoded);
    }

    #[test]
    fn join_room_roundtrip() {
        roundtrip(
            Envelope::new(
                EnvelopeKind::JoinRoom,
                "lobby",
                "p1",
                &JoinRoomData {
                    display_name: "Alice".into(),
                    starting_balance: 100.0,
                },
            )
            .unwrap(),
        );
    }

    #[test]
    fn leave_room_roundtrip() {
        roundtrip(Envelope::bare(EnvelopeKind::LeaveRoom, "lobby", "p1"));
    }

    #[test]
    fn room_update_roundtrip() {
        roundtrip(
            Envelope::new(
                EnvelopeKind::RoomUpdate,
                "lobby",
                "",
                &RoomUpdateData {
                    room_id: "lobby".into(),
                    players: vec![PlayerInfo {
                        id: "p1".into(),
                        name: "Alice".into(),
                        balance: 90.0,
                        has_bet: true,
                        is_online: true,
                    }],
                    phase: Phase::Betting,
                    timer_seconds: 42,
                    min_players: 2,
                    max_players: 8,
                },
            )
            .unwrap(),
        );
    }

    #[test]
    fn player_list_roundtrip() {
        roundtrip(
            Envelope::new(
                EnvelopeKind::PlayerList,
                "lobby",
                "p1",
                &PlayerListData {
                    room_id: "lobby".into(),
                    players: vec![],
                },
            )
            .unwrap(),
        );
    }

    #[test]
    fn game_flow_roundtrips() {
        roundtrip(
            Envelope::new(
                EnvelopeKind::GameStart,
                "lobby",
                "",
                &RoundRef {
                    round_id: "round_1".into(),
                },
            )
            .unwrap(),
        );
        roundtrip(
            Envelope::new(
                EnvelopeKind::BetPhase,
                "lobby",
                "",
                &TimerData {
                    phase: Phase::Betting,
                    seconds_left: 60,
                    total_seconds: 60,
                },
            )
            .unwrap(),
        );
        roundtrip(
            Envelope::new(
                EnvelopeKind::BetPlaced,
                "lobby",
                "p1",
                &BetData {
                    player_id: "p1".into(),
                    amount: 10.0,
                    side: Side::Heads,
                    bet_id: "bet_1".into(),
                },
            )
            .unwrap(),
        );
        roundtrip(
            Envelope::new(
                EnvelopeKind::RevealPhase,
                "lobby",
                "",
                &RoundRef {
                    round_id: "round_1".into(),
                },
            )
            .unwrap(),
        );
        roundtrip(
            Envelope::new(
                EnvelopeKind::RoundEnd,
                "lobby",
                "",
                &RoundRef {
                    round_id: "round_1".into(),
                },
            )
            .unwrap(),
        );
    }

    #[test]
    fn result_and_seed_roundtrips() {
        roundtrip(
            Envelope::new(
                EnvelopeKind::SeedCommit,
                "lobby",
                "",
                &SeedCommitData {
                    round_id: "round_1".into(),
                    seed_hash: "ab".repeat(32),
                },
            )
            .unwrap(),
        );
        roundtrip(
            Envelope::new(
                EnvelopeKind::SeedReveal,
                "lobby",
                "",
                &SeedRevealData {
                    round_id: "round_1".into(),
                    seed: "cd".repeat(32),
                },
            )
            .unwrap(),
        );
        roundtrip(
            Envelope::new(
                EnvelopeKind::GameResult,
                "lobby",
                "",
                &GameResultData {
                    round_id: "round_1".into(),
                    side: Side::Tails,
                    seed: "cd".repeat(32),
                    winners: vec![PlayerOutcome {
                        player_id: "p2".into(),
                        player_name: "Bob".into(),
                        bet: Some(BetData {
                            player_id: "p2".into(),
                            amount: 20.0,
                            side: Side::Tails,
                            bet_id: "bet_2".into(),
                        }),
                        won: true,
                        payout: 40.0,
                        new_balance: 120.0,
                    }],
                    losers: vec![],
                },
            )
            .unwrap(),
        );
    }

    #[test]
    fn timer_and_error_roundtrips() {
        roundtrip(
            Envelope::new(
                EnvelopeKind::TimerUpdate,
                "lobby",
                "",
                &TimerData {
                    phase: Phase::Betting,
                    seconds_left: 12,
                    total_seconds: 60,
                },
            )
            .unwrap(),
        );
        roundtrip(
            Envelope::new(
                EnvelopeKind::Error,
                "",
                "p1",
                &ErrorData {
                    code: "invalid_phase".into(),
                    message: "invalid action for current game phase".into(),
                    details: None,
                },
            )
            .unwrap(),
        );
    }

    #[test]
    fn kind_uses_snake_case_on_the_wire() {
        let text = Envelope::bare(EnvelopeKind::SeedCommit, "", "")
            .encode()
            .unwrap();
        assert!(text.contains("\"seed_commit\""));
    }

    #[test]
    fn missing_addressing_fields_default_to_empty() {
        let decoded =
            Envelope::decode(r#"{"kind":"leave_room","timestamp":"2026-01-01T00:00:00Z"}"#)
                .unwrap();
        assert_eq!(decoded.kind, EnvelopeKind::LeaveRoom);
        assert!(decoded.room_id.is_empty());
        assert!(decoded.payload.is_null());
    }

    #[test]
    fn unknown_kind_fails_to_decode() {
        assert!(
            Envelope::decode(r#"{"kind":"warp_drive","timestamp":"2026-01-01T00:00:00Z"}"#)
                .is_err()
        );
    }
}
