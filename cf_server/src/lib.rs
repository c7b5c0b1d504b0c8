//! Server internals for the multiplayer coin flip service.
//!
//! Exposed as a library so integration tests can build the router and
//! drive it directly.

/// HTTP/WebSocket API: router, discovery endpoints, connection gateway.
pub mod api;

/// Server configuration.
pub mod config;
