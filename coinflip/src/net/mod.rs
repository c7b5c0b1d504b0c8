//! Networking layer for client-server communication.
//!
//! Clients and the server exchange self-describing JSON envelopes over a
//! single long-lived WebSocket connection per participant.

/// WebSocket client for joining rooms and receiving broadcasts.
pub mod client;

/// Network error types for protocol and client operations.
pub mod errors;

/// Envelope and payload types for the wire protocol.
pub mod messages;
