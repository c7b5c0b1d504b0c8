//! Network error types for protocol and client operations.

use thiserror::Error;

use super::messages::EnvelopeKind;

/// Errors that can occur while encoding, decoding, or routing envelopes.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The envelope could not be parsed or its payload did not match the
    /// expected shape for its kind.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(#[from] serde_json::Error),

    /// A structurally valid envelope carried a kind the receiver does not
    /// accept in its current role.
    #[error("unknown message kind: {0}")]
    UnknownKind(EnvelopeKind),

    /// Message size exceeded the configured maximum.
    #[error("message size {actual} exceeds maximum {max}")]
    MessageTooLarge { actual: usize, max: usize },
}

/// Errors surfaced by the session client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// An operation required an established connection.
    #[error("not connected to server")]
    NotConnected,

    /// An operation required room membership.
    #[error("not in a room")]
    NotInRoom,

    /// The initial connection or a reconnect attempt failed.
    #[error("failed to connect to server: {0}")]
    ConnectFailed(String),

    /// The transport closed unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// Every configured reconnect attempt failed.
    #[error("max reconnection attempts reached")]
    MaxReconnectsExceeded,

    /// An envelope could not be produced or understood.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
