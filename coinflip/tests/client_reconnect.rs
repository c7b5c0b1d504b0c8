//! Session client tests: call preconditions, bounded reconnect with a
//! terminal error, and automatic room rejoin after a successful reconnect.

use std::time::Duration;

use coinflip::game::Side;
use coinflip::net::client::{ClientConfig, SessionClient};
use coinflip::net::errors::ClientError;
use coinflip::net::messages::{Envelope, EnvelopeKind, JoinRoomData};
use futures_util::StreamExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

fn test_config(port: u16) -> ClientConfig {
    ClientConfig {
        server_url: format!("ws://127.0.0.1:{port}/ws"),
        reconnect_delay: Duration::from_millis(50),
        max_reconnects: 3,
        ping_period: Duration::from_secs(30),
        write_timeout: Duration::from_secs(2),
    }
}

#[tokio::test]
async fn operations_require_connection_and_membership() {
    let client = SessionClient::new(test_config(1), "p1".into(), "Alice".into());

    assert!(matches!(
        client.join_room("lobby", 100.0).await,
        Err(ClientError::NotConnected)
    ));
    assert!(matches!(
        client.place_bet(10.0, Side::Heads).await,
        Err(ClientError::NotConnected)
    ));
    assert!(matches!(
        client.leave_room().await,
        Err(ClientError::NotInRoom)
    ));
}

#[tokio::test]
async fn connect_to_unreachable_server_fails_without_retry() {
    // Port 1 is never listening.
    let client = SessionClient::new(test_config(1), "p1".into(), "Alice".into());
    assert!(matches!(
        client.connect().await,
        Err(ClientError::ConnectFailed(_))
    ));
    assert!(!client.is_connected().await);
    assert_eq!(client.reconnect_attempts().await, 0);
}

#[tokio::test]
async fn reconnect_budget_exhaustion_surfaces_terminal_error() {
    // Scenario: the server accepts one connection, drops it, and goes
    // away entirely. With a budget of three, the client must surface the
    // lost connection, make exactly three delayed attempts, then stop.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        drop(ws);
        // The listener drops here, so every retry is refused.
    });

    let client = SessionClient::new(test_config(port), "p1".into(), "Alice".into());
    let mut errors = client.take_error_stream().unwrap();

    client.connect().await.unwrap();
    server.await.unwrap();

    let first = timeout(Duration::from_secs(5), errors.recv())
        .await
        .expect("error stream produced nothing")
        .unwrap();
    assert!(matches!(first, ClientError::ConnectionLost));

    let terminal = timeout(Duration::from_secs(5), errors.recv())
        .await
        .expect("no terminal error surfaced")
        .unwrap();
    assert!(matches!(terminal, ClientError::MaxReconnectsExceeded));

    assert!(!client.is_connected().await);
    assert_eq!(client.reconnect_attempts().await, 3);

    // The retry machine has stopped; no further errors trickle in.
    assert!(
        timeout(Duration::from_millis(300), errors.recv())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn reconnect_rejoins_the_previous_room() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    // Forward every envelope the server reads; drop the first connection
    // right after its join arrives, keep the second one open.
    let (seen_tx, mut seen) = mpsc::channel::<Envelope>(16);
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        while let Some(Ok(frame)) = ws.next().await {
            if let Message::Text(text) = frame {
                let envelope = Envelope::decode(text.as_str()).unwrap();
                let done = envelope.kind == EnvelopeKind::JoinRoom;
                seen_tx.send(envelope).await.unwrap();
                if done {
                    break;
                }
            }
        }
        drop(ws);

        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        while let Some(Ok(frame)) = ws.next().await {
            if let Message::Text(text) = frame {
                let envelope = Envelope::decode(text.as_str()).unwrap();
                seen_tx.send(envelope).await.unwrap();
            }
        }
    });

    let client = SessionClient::new(test_config(port), "p1".into(), "Alice".into());
    client.connect().await.unwrap();
    client.join_room("lobby", 75.0).await.unwrap();

    let first_join = timeout(Duration::from_secs(5), seen.recv())
        .await
        .expect("first join not observed")
        .unwrap();
    assert_eq!(first_join.kind, EnvelopeKind::JoinRoom);
    assert_eq!(first_join.room_id, "lobby");

    // The server dropped the connection; the client reconnects and
    // re-issues the join for the same room with the same balance.
    let second_join = timeout(Duration::from_secs(5), seen.recv())
        .await
        .expect("rejoin not observed")
        .unwrap();
    assert_eq!(second_join.kind, EnvelopeKind::JoinRoom);
    assert_eq!(second_join.room_id, "lobby");
    let data: JoinRoomData = second_join.payload_as().unwrap();
    assert_eq!(data.starting_balance, 75.0);
    assert_eq!(data.display_name, "Alice");

    assert!(client.is_connected().await);
    assert_eq!(client.current_room().await.as_deref(), Some("lobby"));

    client.disconnect().await;
    server.abort();
}

#[tokio::test]
async fn connect_is_idempotent_and_disconnect_stops_retries() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    // Hold connections open until the test ends.
    let server = tokio::spawn(async move {
        let mut held = Vec::new();
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            held.push(tokio::spawn(async move {
                let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                while let Some(Ok(_)) = ws.next().await {}
            }));
        }
    });

    let client = SessionClient::new(test_config(port), "p1".into(), "Alice".into());
    client.connect().await.unwrap();
    client.connect().await.unwrap();
    assert!(client.is_connected().await);

    let mut errors = client.take_error_stream().unwrap();
    client.disconnect().await;
    assert!(!client.is_connected().await);

    // An intentional disconnect does not trip the retry machine.
    assert!(
        timeout(Duration::from_millis(300), errors.recv())
            .await
            .is_err()
    );

    server.abort();
}
