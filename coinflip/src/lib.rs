//! # Coinflip
//!
//! A real-time multiplayer coin flip betting library.
//!
//! Rooms host 2 to 8 players who bet on the outcome of a shared coin flip.
//! Each room cycles through betting, reveal, and result phases on its own
//! timers, and every connected player receives the same authoritative state
//! over a long-lived WebSocket connection.
//!
//! ## Architecture
//!
//! - [`room`]: one actor per room owning the roster, the active round, and
//!   all phase deadlines. Every mutation flows through the actor's inbox, so
//!   operations within a room are totally ordered.
//! - [`session`]: the registry multiplexing many connections onto many
//!   rooms. It routes inbound command envelopes and relays room events back
//!   to member connections with best-effort, drop-on-saturation delivery.
//! - [`net`]: the wire protocol (a self-describing JSON envelope) and the
//!   client used by front ends to join rooms, place bets, and receive
//!   broadcasts with bounded reconnect-and-rejoin.
//! - [`game`]: coin flip outcome generation from a committed random seed.
//! - [`storage`]: the save/load interface for round results and player
//!   ledgers, plus an in-memory implementation.

/// Coin flip outcome generation.
pub mod game;

/// Wire protocol and the remote session client.
pub mod net;

/// Room state machine, configuration, and errors.
pub mod room;

/// Session registry multiplexing connections onto rooms.
pub mod session;

/// Persistence interface for round results and player ledgers.
pub mod storage;

pub use game::{CoinFlipper, SecureFlipper, Side};
pub use net::client::{ClientConfig, SessionClient};
pub use net::errors::{ClientError, ProtocolError};
pub use net::messages::{Envelope, EnvelopeKind, Phase};
pub use room::{RoomConfig, RoomError, RoomHandle};
pub use session::{RegistryConfig, RegistryError, SessionRegistry};
pub use storage::{HistoryStore, MemoryStore};
