//! WebSocket client for joining rooms and receiving broadcasts.
//!
//! The client owns exactly one outbound connection. Inbound envelopes are
//! fanned out to a generic event stream and to any handler registered for
//! their kind. On unexpected closure the client retries on a fixed delay up
//! to a configured budget, rejoining its room on success; exhausting the
//! budget surfaces a terminal error on the error stream.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, timeout};
use tokio_tungstenite::tungstenite::{Bytes, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use uuid::Uuid;

use super::errors::ClientError;
use super::messages::{BetData, Envelope, EnvelopeKind, JoinRoomData};
use crate::game::Side;

const EVENT_STREAM_CAPACITY: usize = 100;
const ERROR_STREAM_CAPACITY: usize = 10;
const OUTBOUND_CAPACITY: usize = 64;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;
type Handler = Box<dyn Fn(&Envelope) + Send + Sync>;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_url: String,
    pub reconnect_delay: Duration,
    pub max_reconnects: u32,
    pub ping_period: Duration,
    pub write_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:8080/ws".to_string(),
            reconnect_delay: Duration::from_secs(5),
            max_reconnects: 5,
            ping_period: Duration::from_secs(54),
            write_timeout: Duration::from_secs(10),
        }
    }
}

struct ClientState {
    connected: bool,
    reconnecting: bool,
    current_room: Option<String>,
    last_balance: f64,
    reconnects: u32,
    outbound: Option<mpsc::Sender<Message>>,
    read_task: Option<JoinHandle<()>>,
    write_task: Option<JoinHandle<()>>,
}

struct ClientShared {
    config: ClientConfig,
    player_id: String,
    player_name: String,
    handlers: StdRwLock<HashMap<EnvelopeKind, Handler>>,
    state: Mutex<ClientState>,
    events_tx: mpsc::Sender<Envelope>,
    errors_tx: mpsc::Sender<ClientError>,
}

/// Remote session client.
pub struct SessionClient {
    shared: Arc<ClientShared>,
    events_rx: StdMutex<Option<mpsc::Receiver<Envelope>>>,
    errors_rx: StdMutex<Option<mpsc::Receiver<ClientError>>>,
}

impl SessionClient {
    pub fn new(config: ClientConfig, player_id: String, player_name: String) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_STREAM_CAPACITY);
        let (errors_tx, errors_rx) = mpsc::channel(ERROR_STREAM_CAPACITY);

        Self {
            shared: Arc::new(ClientShared {
                config,
                player_id,
                player_name,
                handlers: StdRwLock::new(HashMap::new()),
                state: Mutex::new(ClientState {
                    connected: false,
                    reconnecting: false,
                    current_room: None,
                    last_balance: 0.0,
                    reconnects: 0,
                    outbound: None,
                    read_task: None,
                    write_task: None,
                }),
                events_tx,
                errors_tx,
            }),
            events_rx: StdMutex::new(Some(events_rx)),
            errors_rx: StdMutex::new(Some(errors_rx)),
        }
    }

    /// Establish the connection. Calling while connected is a no-op.
    pub async fn connect(&self) -> Result<(), ClientError> {
        {
            let state = self.shared.state.lock().await;
            if state.connected {
                return Ok(());
            }
        }
        log::info!("connecting to {}", self.shared.config.server_url);
        establish(&self.shared).await
    }

    /// Close the transport and cancel the background loops. Does not
    /// trigger reconnection.
    pub async fn disconnect(&self) {
        let mut state = self.shared.state.lock().await;
        if !state.connected && state.read_task.is_none() {
            return;
        }
        state.connected = false;
        state.outbound = None;
        if let Some(task) = state.read_task.take() {
            task.abort();
        }
        if let Some(task) = state.write_task.take() {
            task.abort();
        }
        log::info!("disconnected from server");
    }

    pub async fn is_connected(&self) -> bool {
        self.shared.state.lock().await.connected
    }

    /// Room id of the current membership, if any.
    pub async fn current_room(&self) -> Option<String> {
        self.shared.state.lock().await.current_room.clone()
    }

    /// Reconnect attempts made in the current retry sequence.
    pub async fn reconnect_attempts(&self) -> u32 {
        self.shared.state.lock().await.reconnects
    }

    /// Join a room, funding the player with `starting_balance`.
    pub async fn join_room(
        &self,
        room_id: &str,
        starting_balance: f64,
    ) -> Result<(), ClientError> {
        self.shared.join_room_inner(room_id, starting_balance).await
    }

    /// Leave the current room.
    pub async fn leave_room(&self) -> Result<(), ClientError> {
        let room_id = {
            let state = self.shared.state.lock().await;
            state.current_room.clone().ok_or(ClientError::NotInRoom)?
        };

        let envelope = Envelope::bare(EnvelopeKind::LeaveRoom, &room_id, &self.shared.player_id);
        self.shared.send_envelope(envelope).await?;

        let mut state = self.shared.state.lock().await;
        state.current_room = None;
        log::info!("left room {room_id}");
        Ok(())
    }

    /// Place a bet in the current room.
    pub async fn place_bet(&self, amount: f64, side: Side) -> Result<(), ClientError> {
        let room_id = {
            let state = self.shared.state.lock().await;
            if !state.connected {
                return Err(ClientError::NotConnected);
            }
            state.current_room.clone().ok_or(ClientError::NotInRoom)?
        };

        let bet = BetData {
            player_id: self.shared.player_id.clone(),
            amount,
            side,
            bet_id: format!("bet_{}", Uuid::new_v4().simple()),
        };
        let envelope = Envelope::new(
            EnvelopeKind::BetPlaced,
            &room_id,
            &self.shared.player_id,
            &bet,
        )?;
        self.shared.send_envelope(envelope).await?;
        log::info!("placed bet of {amount} on {side} in room {room_id}");
        Ok(())
    }

    /// Register a handler invoked for every inbound envelope of `kind`.
    /// Handlers run on the read loop and must not block.
    pub fn set_handler<F>(&self, kind: EnvelopeKind, handler: F)
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        if let Ok(mut handlers) = self.shared.handlers.write() {
            handlers.insert(kind, Box::new(handler));
        }
    }

    /// Take the generic inbound event stream. Yields `None` after the first
    /// call.
    pub fn take_event_stream(&self) -> Option<mpsc::Receiver<Envelope>> {
        self.events_rx.lock().ok().and_then(|mut guard| guard.take())
    }

    /// Take the error stream. Yields `None` after the first call.
    pub fn take_error_stream(&self) -> Option<mpsc::Receiver<ClientError>> {
        self.errors_rx.lock().ok().and_then(|mut guard| guard.take())
    }
}

impl ClientShared {
    async fn join_room_inner(
        &self,
        room_id: &str,
        starting_balance: f64,
    ) -> Result<(), ClientError> {
        let envelope = Envelope::new(
            EnvelopeKind::JoinRoom,
            room_id,
            &self.player_id,
            &JoinRoomData {
                display_name: self.player_name.clone(),
                starting_balance,
            },
        )?;
        self.send_envelope(envelope).await?;

        let mut state = self.state.lock().await;
        state.current_room = Some(room_id.to_string());
        state.last_balance = starting_balance;
        log::info!("joining room {room_id} as {}", self.player_name);
        Ok(())
    }

    async fn send_envelope(&self, envelope: Envelope) -> Result<(), ClientError> {
        let outbound = {
            let state = self.state.lock().await;
            if !state.connected {
                return Err(ClientError::NotConnected);
            }
            state.outbound.clone().ok_or(ClientError::NotConnected)?
        };
        let text = envelope.encode()?;
        outbound
            .send(Message::text(text))
            .await
            .map_err(|_| ClientError::ConnectionLost)
    }

    fn handle_frame(&self, text: &str) {
        let envelope = match Envelope::decode(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                log::warn!("failed to parse incoming envelope: {e}");
                return;
            }
        };

        match self.events_tx.try_send(envelope.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                log::warn!("event stream full, dropping {}", envelope.kind);
            }
            Err(TrySendError::Closed(_)) => {}
        }

        if let Ok(handlers) = self.handlers.read() {
            if let Some(handler) = handlers.get(&envelope.kind) {
                handler(&envelope);
            }
        }
    }
}

async fn establish(shared: &Arc<ClientShared>) -> Result<(), ClientError> {
    let (ws, _) = connect_async(shared.config.server_url.as_str())
        .await
        .map_err(|e| ClientError::ConnectFailed(e.to_string()))?;
    let (sink, stream) = ws.split();
    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);

    let mut state = shared.state.lock().await;
    if let Some(task) = state.read_task.take() {
        task.abort();
    }
    if let Some(task) = state.write_task.take() {
        task.abort();
    }
    state.connected = true;
    state.outbound = Some(outbound_tx);
    state.write_task = Some(tokio::spawn(write_loop(
        sink,
        outbound_rx,
        shared.config.ping_period,
        shared.config.write_timeout,
    )));
    state.read_task = Some(tokio::spawn(read_loop(Arc::clone(shared), stream)));

    log::info!("connected to server");
    Ok(())
}

async fn read_loop(shared: Arc<ClientShared>, mut stream: WsStream) {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => shared.handle_frame(text.as_str()),
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                log::debug!("websocket read error: {e}");
                break;
            }
        }
    }
    handle_disconnect(shared).await;
}

async fn write_loop(
    mut sink: WsSink,
    mut outbound: mpsc::Receiver<Message>,
    ping_period: Duration,
    write_timeout: Duration,
) {
    let mut ping = interval(ping_period);
    // The first tick completes immediately; consume it so pings start one
    // period from now.
    ping.tick().await;

    loop {
        tokio::select! {
            maybe_message = outbound.recv() => match maybe_message {
                Some(message) => {
                    if send_with_deadline(&mut sink, message, write_timeout).await.is_err() {
                        break;
                    }
                }
                None => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            },
            _ = ping.tick() => {
                if send_with_deadline(&mut sink, Message::Ping(Bytes::new()), write_timeout)
                    .await
                    .is_err()
                {
                    break;
                }
            }
        }
    }
}

async fn send_with_deadline(
    sink: &mut WsSink,
    message: Message,
    deadline: Duration,
) -> Result<(), ()> {
    match timeout(deadline, sink.send(message)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            log::debug!("websocket write error: {e}");
            Err(())
        }
        Err(_) => {
            log::warn!("write deadline exceeded");
            Err(())
        }
    }
}

async fn handle_disconnect(shared: Arc<ClientShared>) {
    {
        let mut state = shared.state.lock().await;
        if !state.connected {
            return;
        }
        state.connected = false;
        state.outbound = None;
        if let Some(task) = state.write_task.take() {
            task.abort();
        }
        state.read_task = None;
    }

    log::warn!("connection lost");
    let _ = shared.errors_tx.try_send(ClientError::ConnectionLost);

    if shared.config.max_reconnects == 0 {
        return;
    }
    let already_retrying = {
        let mut state = shared.state.lock().await;
        if state.reconnecting {
            true
        } else {
            state.reconnecting = true;
            false
        }
    };
    if !already_retrying {
        tokio::spawn(reconnect_loop(shared));
    }
}

/// Bounded retry state machine: a fixed number of delayed attempts, one
/// rejoin on success, a terminal error on exhaustion.
///
/// Returns a boxed future with a concrete (non-opaque) type so the compiler can
/// resolve the mutually-recursive `Send` bounds across the spawn cycle
/// (establish → read_loop → handle_disconnect → reconnect_loop → establish),
/// which it cannot do while every function in the cycle is an `async fn`.
fn reconnect_loop(
    shared: Arc<ClientShared>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
    Box::pin(async move {
    let max = shared.config.max_reconnects;
    for attempt in 1..=max {
        {
            shared.state.lock().await.reconnects = attempt;
        }
        log::info!("attempting to reconnect, attempt {attempt} of {max}");
        sleep(shared.config.reconnect_delay).await;

        match establish(&shared).await {
            Ok(()) => {
                let (room, balance) = {
                    let mut state = shared.state.lock().await;
                    state.reconnecting = false;
                    state.reconnects = 0;
                    (state.current_room.clone(), state.last_balance)
                };
                if let Some(room_id) = room {
                    if let Err(e) = shared.join_room_inner(&room_id, balance).await {
                        log::error!("failed to rejoin room {room_id} after reconnect: {e}");
                    }
                }
                return;
            }
            Err(e) => log::error!("reconnection failed: {e}"),
        }
    }

    shared.state.lock().await.reconnecting = false;
    log::error!("max reconnection attempts reached");
    let _ = shared.errors_tx.try_send(ClientError::MaxReconnectsExceeded);
    })
}
