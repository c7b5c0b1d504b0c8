//! The session registry.
//!
//! The registry owns two maps: connections and rooms. Both are guarded by
//! their own lock and neither lock is ever held across an awaited send.
//! Each room gets one relay task that drains the room's event queue and
//! fans events out to member connections; a connection whose outbound
//! buffer is saturated is forcibly disconnected rather than allowed to
//! stall delivery to the rest of the room.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::{Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::interval;

use super::errors::{DispatchError, RegistryError};
use crate::game::CoinFlipper;
use crate::net::messages::{
    Envelope, EnvelopeKind, ErrorData, JoinRoomData, Phase, PlayerListData,
};
use crate::room::{RoomActor, RoomConfig, RoomHandle};
use crate::storage::HistoryStore;

/// Identifier the registry assigns to each accepted connection.
pub type ConnId = u64;

/// Lifecycle of a connection as seen by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Accepted, no player identity yet.
    Unauthenticated,
    /// Bound to a player id and a room.
    Joined,
    /// Left its room but still connected.
    Detached,
    /// Being torn down.
    Closed,
}

/// Registry configuration.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Upper bound on concurrently live rooms.
    pub max_rooms: usize,

    /// How often empty rooms are reclaimed.
    pub cleanup_interval: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_rooms: 100,
            cleanup_interval: Duration::from_secs(300),
        }
    }
}

/// Public description of a room for discovery endpoints.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RoomSummary {
    pub id: String,
    pub name: String,
    pub players: usize,
    pub max_players: usize,
    pub game_state: Phase,
}

struct Connection {
    outbound: mpsc::Sender<String>,
    kick: Arc<Notify>,
    player_id: Option<String>,
    room_id: Option<String>,
    state: ConnState,
}

struct RoomEntry {
    handle: RoomHandle,
    relay: JoinHandle<()>,
}

/// Tracks active connections and the room each belongs to, routes inbound
/// commands, and relays room events back to member connections.
pub struct SessionRegistry {
    config: RegistryConfig,
    room_defaults: RoomConfig,
    flipper: Arc<dyn CoinFlipper>,
    store: Arc<dyn HistoryStore>,
    rooms: RwLock<HashMap<String, RoomEntry>>,
    connections: RwLock<HashMap<ConnId, Connection>>,
    next_conn_id: AtomicU64,
    is_shutdown: AtomicBool,
}

impl SessionRegistry {
    pub fn new(
        config: RegistryConfig,
        room_defaults: RoomConfig,
        flipper: Arc<dyn CoinFlipper>,
        store: Arc<dyn HistoryStore>,
    ) -> Self {
        Self {
            config,
            room_defaults,
            flipper,
            store,
            rooms: RwLock::new(HashMap::new()),
            connections: RwLock::new(HashMap::new()),
            next_conn_id: AtomicU64::new(1),
            is_shutdown: AtomicBool::new(false),
        }
    }

    /// Register an accepted connection. The registry writes serialized
    /// envelopes into `outbound` and signals `kick` when the connection
    /// must be closed.
    pub async fn register(&self, outbound: mpsc::Sender<String>, kick: Arc<Notify>) -> ConnId {
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::SeqCst);
        self.connections.write().await.insert(
            conn_id,
            Connection {
                outbound,
                kick,
                player_id: None,
                room_id: None,
                state: ConnState::Unauthenticated,
            },
        );
        log::info!("connection {conn_id} registered");
        conn_id
    }

    /// Drop a connection, removing its player from any joined room.
    pub async fn unregister(&self, conn_id: ConnId) {
        let removed = self.connections.write().await.remove(&conn_id);
        let Some(conn) = removed else {
            return;
        };

        if let (Some(player_id), Some(room_id)) = (conn.player_id, conn.room_id) {
            let handle = self.room_handle(&room_id).await;
            if let Some(handle) = handle {
                if let Err(e) = handle.remove_player(player_id.clone()).await {
                    log::debug!(
                        "player {player_id} not removed from room {room_id} on disconnect: {e}"
                    );
                }
            }
        }
        log::info!("connection {conn_id} unregistered");
    }

    /// Route one inbound command envelope. Failures become `error` replies
    /// addressed only to the originating connection.
    pub async fn dispatch(self: &Arc<Self>, conn_id: ConnId, envelope: Envelope) {
        let outcome = match envelope.kind {
            EnvelopeKind::JoinRoom => self.handle_join(conn_id, &envelope).await,
            EnvelopeKind::LeaveRoom => self.handle_leave(conn_id).await,
            EnvelopeKind::BetPlaced => self.handle_bet(conn_id, &envelope).await,
            other => Err(DispatchError::UnknownKind(other)),
        };

        if let Err(error) = outcome {
            log::debug!("connection {conn_id}: {} command rejected: {error}", envelope.kind);
            self.send_error(conn_id, &error).await;
        }
    }

    async fn handle_join(
        self: &Arc<Self>,
        conn_id: ConnId,
        envelope: &Envelope,
    ) -> Result<(), DispatchError> {
        let data: JoinRoomData = envelope
            .payload_as()
            .map_err(|e| DispatchError::Malformed(e.to_string()))?;
        if envelope.room_id.is_empty() || envelope.player_id.is_empty() {
            return Err(DispatchError::Malformed(
                "join_room requires room_id and player_id".to_string(),
            ));
        }

        let room = self.room_or_create(&envelope.room_id).await?;
        room.add_player(
            envelope.player_id.clone(),
            data.display_name.clone(),
            data.starting_balance,
        )
        .await?;

        {
            let mut connections = self.connections.write().await;
            if let Some(conn) = connections.get_mut(&conn_id) {
                conn.player_id = Some(envelope.player_id.clone());
                conn.room_id = Some(envelope.room_id.clone());
                conn.state = ConnState::Joined;
            }
        }

        // Roster snapshot for the joining connection only; everyone else
        // learns about the join from the room's own broadcast.
        if let Ok(state) = room.state().await {
            let reply = Envelope::new(
                EnvelopeKind::PlayerList,
                &envelope.room_id,
                &envelope.player_id,
                &PlayerListData {
                    room_id: envelope.room_id.clone(),
                    players: state.players,
                },
            );
            if let Ok(reply) = reply {
                self.send_to(conn_id, &reply).await;
            }
        }

        log::info!(
            "player {} joined room {} on connection {conn_id}",
            envelope.player_id,
            envelope.room_id
        );
        Ok(())
    }

    async fn handle_leave(&self, conn_id: ConnId) -> Result<(), DispatchError> {
        let (player_id, room_id) = {
            let connections = self.connections.read().await;
            let conn = connections.get(&conn_id).ok_or(DispatchError::NotInRoom)?;
            match (&conn.player_id, &conn.room_id) {
                (Some(player), Some(room)) => (player.clone(), room.clone()),
                _ => return Err(DispatchError::NotInRoom),
            }
        };

        if let Some(handle) = self.room_handle(&room_id).await {
            handle.remove_player(player_id).await?;
        }

        let mut connections = self.connections.write().await;
        if let Some(conn) = connections.get_mut(&conn_id) {
            conn.room_id = None;
            conn.state = ConnState::Detached;
        }
        Ok(())
    }

    async fn handle_bet(&self, conn_id: ConnId, envelope: &Envelope) -> Result<(), DispatchError> {
        let (player_id, room_id) = {
            let connections = self.connections.read().await;
            let conn = connections.get(&conn_id).ok_or(DispatchError::NotInRoom)?;
            match (&conn.player_id, &conn.room_id) {
                (Some(player), Some(room)) => (player.clone(), room.clone()),
                _ => return Err(DispatchError::NotInRoom),
            }
        };

        let data: crate::net::messages::BetData = envelope
            .payload_as()
            .map_err(|e| DispatchError::Malformed(e.to_string()))?;

        let handle = self
            .room_handle(&room_id)
            .await
            .ok_or(RegistryError::RoomNotFound)?;
        // The bet is attributed to the connection's player, not whatever id
        // the payload claims.
        handle.place_bet(player_id, data.amount, data.side).await?;
        Ok(())
    }

    async fn room_handle(&self, room_id: &str) -> Option<RoomHandle> {
        self.rooms
            .read()
            .await
            .get(room_id)
            .map(|entry| entry.handle.clone())
    }

    async fn room_or_create(self: &Arc<Self>, room_id: &str) -> Result<RoomHandle, RegistryError> {
        if self.is_shutdown.load(Ordering::SeqCst) {
            return Err(RegistryError::ShutDown);
        }
        if let Some(handle) = self.room_handle(room_id).await {
            return Ok(handle);
        }

        let mut rooms = self.rooms.write().await;
        if let Some(entry) = rooms.get(room_id) {
            return Ok(entry.handle.clone());
        }
        if rooms.len() >= self.config.max_rooms {
            return Err(RegistryError::MaxRoomsReached);
        }

        let (actor, handle, events) = RoomActor::new(
            room_id.to_string(),
            format!("Room {room_id}"),
            self.room_defaults.clone(),
            Arc::clone(&self.flipper),
            Arc::clone(&self.store),
        );
        tokio::spawn(actor.run());
        let relay = self.spawn_relay(room_id.to_string(), events);
        rooms.insert(
            room_id.to_string(),
            RoomEntry {
                handle: handle.clone(),
                relay,
            },
        );
        log::info!("room {room_id} created");
        Ok(handle)
    }

    fn spawn_relay(
        self: &Arc<Self>,
        room_id: String,
        mut events: mpsc::Receiver<Envelope>,
    ) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(envelope) = events.recv().await {
                registry.relay(&room_id, &envelope).await;
            }
            log::debug!("relay for room {room_id} finished");
        })
    }

    /// Deliver one room event to every connection mapped to the room.
    /// Delivery is best-effort per connection: a saturated outbound buffer
    /// disconnects that connection instead of blocking the others.
    async fn relay(&self, room_id: &str, envelope: &Envelope) {
        let text = match envelope.encode() {
            Ok(text) => text,
            Err(e) => {
                log::error!("room {room_id}: failed to serialize event: {e}");
                return;
            }
        };

        let mut saturated = Vec::new();
        {
            let connections = self.connections.read().await;
            for (conn_id, conn) in connections.iter() {
                if conn.room_id.as_deref() != Some(room_id) {
                    continue;
                }
                match conn.outbound.try_send(text.clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        log::warn!(
                            "connection {conn_id}: outbound buffer full, disconnecting"
                        );
                        saturated.push(*conn_id);
                    }
                    Err(TrySendError::Closed(_)) => saturated.push(*conn_id),
                }
            }
        }

        for conn_id in saturated {
            self.disconnect(conn_id).await;
        }
    }

    /// Forcibly close a connection.
    pub async fn disconnect(&self, conn_id: ConnId) {
        {
            let mut connections = self.connections.write().await;
            if let Some(conn) = connections.get_mut(&conn_id) {
                conn.state = ConnState::Closed;
                conn.kick.notify_one();
            }
        }
        self.unregister(conn_id).await;
    }

    async fn send_error(&self, conn_id: ConnId, error: &DispatchError) {
        let reply = Envelope::new(
            EnvelopeKind::Error,
            "",
            "",
            &ErrorData {
                code: error.code().to_string(),
                message: error.to_string(),
                details: None,
            },
        );
        match reply {
            Ok(reply) => self.send_to(conn_id, &reply).await,
            Err(e) => log::error!("failed to encode error reply: {e}"),
        }
    }

    /// Best-effort delivery to a single connection.
    async fn send_to(&self, conn_id: ConnId, envelope: &Envelope) {
        let Ok(text) = envelope.encode() else {
            return;
        };
        let connections = self.connections.read().await;
        if let Some(conn) = connections.get(&conn_id) {
            if conn.outbound.try_send(text).is_err() {
                log::debug!("connection {conn_id}: reply dropped");
            }
        }
    }

    /// Remove every room whose roster is empty.
    pub async fn reap(&self) {
        let handles: Vec<(String, RoomHandle)> = {
            let rooms = self.rooms.read().await;
            rooms
                .iter()
                .map(|(id, entry)| (id.clone(), entry.handle.clone()))
                .collect()
        };

        let mut empty = Vec::new();
        for (room_id, handle) in handles {
            match handle.state().await {
                Ok(state) if state.players.is_empty() => empty.push(room_id),
                Ok(_) => {}
                // An unreachable actor is as good as empty.
                Err(_) => empty.push(room_id),
            }
        }
        if empty.is_empty() {
            return;
        }

        let removed: Vec<(String, RoomEntry)> = {
            let mut rooms = self.rooms.write().await;
            empty
                .into_iter()
                .filter_map(|id| rooms.remove(&id).map(|entry| (id, entry)))
                .collect()
        };
        for (room_id, entry) in removed {
            // Closing the room drops its event sender, which lets the relay
            // drain and exit on its own.
            entry.handle.close().await;
            log::info!("removed empty room {room_id}");
        }
    }

    /// Run [`reap`](Self::reap) on the configured interval until shutdown.
    pub fn spawn_reaper(self: &Arc<Self>) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval(registry.config.cleanup_interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if registry.is_shutdown.load(Ordering::SeqCst) {
                    break;
                }
                registry.reap().await;
            }
        })
    }

    /// Stop every room and close every connection. Idempotent.
    pub async fn shutdown(&self) {
        if self.is_shutdown.swap(true, Ordering::SeqCst) {
            return;
        }

        let room_entries: Vec<RoomEntry> = {
            let mut rooms = self.rooms.write().await;
            rooms.drain().map(|(_, entry)| entry).collect()
        };
        for entry in room_entries {
            entry.handle.close().await;
            entry.relay.abort();
        }

        let conns: Vec<Connection> = {
            let mut connections = self.connections.write().await;
            connections.drain().map(|(_, conn)| conn).collect()
        };
        for conn in conns {
            conn.kick.notify_one();
        }

        log::info!("session registry stopped");
    }

    /// Current number of live connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Current number of live rooms.
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Registry-level view of a connection's lifecycle state.
    pub async fn connection_state(&self, conn_id: ConnId) -> Option<ConnState> {
        self.connections.read().await.get(&conn_id).map(|c| c.state)
    }

    /// Describe every live room for discovery.
    pub async fn room_summaries(&self) -> Vec<RoomSummary> {
        let handles: Vec<RoomHandle> = {
            let rooms = self.rooms.read().await;
            rooms.values().map(|entry| entry.handle.clone()).collect()
        };

        let mut summaries = Vec::with_capacity(handles.len());
        for handle in handles {
            if let Ok(state) = handle.state().await {
                summaries.push(RoomSummary {
                    id: state.room_id,
                    name: state.name,
                    players: state.players.len(),
                    max_players: state.max_players,
                    game_state: state.phase,
                });
            }
        }
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        summaries
    }
}
