//! Registry and dispatch error types.

use thiserror::Error;

use crate::net::messages::EnvelopeKind;
use crate::room::RoomError;

/// Errors from registry-level room management.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    /// The addressed room does not exist.
    #[error("room not found")]
    RoomNotFound,

    /// The room table is at its configured maximum.
    #[error("maximum number of rooms reached")]
    MaxRoomsReached,

    /// The registry has been shut down.
    #[error("registry is shut down")]
    ShutDown,
}

impl RegistryError {
    /// Stable wire code for error replies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::RoomNotFound => "room_not_found",
            Self::MaxRoomsReached => "max_rooms_reached",
            Self::ShutDown => "shutting_down",
        }
    }
}

/// Reasons an inbound command envelope was rejected. Each maps to a
/// structured `error` reply addressed only to the originating connection.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Room(#[from] RoomError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The payload did not match the shape expected for the kind, or a
    /// required addressing field was missing.
    #[error("malformed envelope: {0}")]
    Malformed(String),

    /// A kind the registry does not accept as a command.
    #[error("unknown message kind: {0}")]
    UnknownKind(EnvelopeKind),

    /// The connection has not joined a room.
    #[error("not currently in a room")]
    NotInRoom,
}

impl DispatchError {
    /// Stable wire code for error replies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Room(e) => e.code(),
            Self::Registry(e) => e.code(),
            Self::Malformed(_) => "malformed_envelope",
            Self::UnknownKind(_) => "unknown_message_kind",
            Self::NotInRoom => "not_in_room",
        }
    }
}
