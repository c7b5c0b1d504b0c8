//! Connection gateway.
//!
//! Each accepted connection gets a dedicated read loop and write loop. The
//! write loop owns the socket's send half: it drains the connection's
//! outbound buffer, originates keepalive pings on a fixed period, and
//! enforces a write deadline per send. The read loop parses inbound
//! envelopes and hands them to the session registry, tearing the session
//! down on read error, liveness timeout, or close.

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use axum::body::Bytes;
use coinflip::net::messages::{Envelope, EnvelopeKind, ErrorData};
use coinflip::session::ConnId;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, mpsc};
use tokio::time::{interval, timeout};

use super::AppState;

/// Upgrade an HTTP request to the game's WebSocket protocol.
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (sink, stream) = socket.split();

    let (outbound_tx, outbound_rx) = mpsc::channel(state.config.outbound_capacity);
    let kick = Arc::new(Notify::new());
    let conn_id = state.registry.register(outbound_tx.clone(), kick.clone()).await;

    let write_task = tokio::spawn(write_loop(
        sink,
        outbound_rx,
        kick,
        state.config.ping_period,
        state.config.write_timeout,
    ));

    read_loop(stream, conn_id, &state, &outbound_tx).await;

    state.registry.unregister(conn_id).await;
    write_task.abort();
    log::info!("connection {conn_id} disconnected");
}

async fn read_loop(
    mut stream: SplitStream<WebSocket>,
    conn_id: ConnId,
    state: &AppState,
    outbound: &mpsc::Sender<String>,
) {
    loop {
        let frame = match timeout(state.config.pong_wait, stream.next()).await {
            Err(_) => {
                log::warn!("connection {conn_id}: liveness deadline expired");
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                log::debug!("connection {conn_id}: read error: {e}");
                break;
            }
            Ok(Some(Ok(frame))) => frame,
        };

        match frame {
            Message::Text(text) => match Envelope::decode(text.as_str()) {
                Ok(envelope) => state.registry.dispatch(conn_id, envelope).await,
                Err(e) => {
                    log::warn!("connection {conn_id}: malformed envelope: {e}");
                    send_malformed_reply(outbound, &e.to_string());
                }
            },
            Message::Close(_) => break,
            // Ping and pong frames are answered by the protocol layer;
            // their arrival alone refreshes the liveness deadline.
            _ => {}
        }
    }
}

fn send_malformed_reply(outbound: &mpsc::Sender<String>, detail: &str) {
    let reply = Envelope::new(
        EnvelopeKind::Error,
        "",
        "",
        &ErrorData {
            code: "malformed_envelope".to_string(),
            message: "failed to parse message".to_string(),
            details: Some(detail.to_string()),
        },
    );
    if let Ok(reply) = reply {
        if let Ok(text) = reply.encode() {
            let _ = outbound.try_send(text);
        }
    }
}

async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<String>,
    kick: Arc<Notify>,
    ping_period: Duration,
    write_timeout: Duration,
) {
    let mut ping = interval(ping_period);
    // The first tick completes immediately; consume it so pings start one
    // period from now.
    ping.tick().await;

    loop {
        tokio::select! {
            maybe_text = outbound.recv() => match maybe_text {
                Some(text) => {
                    if send_with_deadline(&mut sink, Message::Text(text.into()), write_timeout)
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                None => break,
            },
            _ = ping.tick() => {
                if send_with_deadline(&mut sink, Message::Ping(Bytes::new()), write_timeout)
                    .await
                    .is_err()
                {
                    break;
                }
            }
            _ = kick.notified() => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
        }
    }
}

async fn send_with_deadline(
    sink: &mut SplitSink<WebSocket, Message>,
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
