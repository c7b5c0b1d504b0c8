//! Session registry multiplexing connections onto rooms.

/// Registry and dispatch error types.
pub mod errors;

/// The registry itself.
pub mod registry;

pub use errors::{DispatchError, RegistryError};
pub use registry::{ConnId, ConnState, RegistryConfig, RoomSummary, SessionRegistry};
