//! Session registry tests: dispatch routing, error replies, per-room
//! relay with drop-on-saturation, reaping, and shutdown.

use std::sync::Arc;
use std::time::Duration;

use coinflip::game::{CoinFlipper, FlipError, SecureFlipper, Side};
use coinflip::net::messages::{
    BetData, Envelope, EnvelopeKind, ErrorData, JoinRoomData,
};
use coinflip::room::RoomConfig;
use coinflip::session::{ConnState, RegistryConfig, SessionRegistry};
use coinflip::storage::MemoryStore;
use tokio::sync::mpsc;
use tokio::sync::Notify;
use tokio::time::timeout;

struct FixedFlipper;

impl CoinFlipper for FixedFlipper {
    fn secure_seed(&self) -> Result<String, FlipError> {
        Ok("test-seed-1".to_string())
    }

    fn flip(&self, seed: &str) -> Result<Side, FlipError> {
        SecureFlipper.flip(seed)
    }
}

fn registry_with(max_rooms: usize) -> Arc<SessionRegistry> {
    let room = RoomConfig {
        min_players: 2,
        max_players: 4,
        betting_duration: Duration::from_secs(60),
        ..RoomConfig::default()
    };
    Arc::new(SessionRegistry::new(
        RegistryConfig {
            max_rooms,
            cleanup_interval: Duration::from_secs(600),
        },
        room,
        Arc::new(FixedFlipper),
        Arc::new(MemoryStore::new()),
    ))
}

struct FakeConn {
    id: u64,
    rx: mpsc::Receiver<String>,
    kick: Arc<Notify>,
}

async fn fake_conn(registry: &Arc<SessionRegistry>, capacity: usize) -> FakeConn {
    let (tx, rx) = mpsc::channel(capacity);
    let kick = Arc::new(Notify::new());
    let id = registry.register(tx, kick.clone()).await;
    FakeConn { id, rx, kick }
}

fn join_envelope(room_id: &str, player_id: &str, name: &str) -> Envelope {
    Envelope::new(
        EnvelopeKind::JoinRoom,
        room_id,
        player_id,
        &JoinRoomData {
            display_name: name.to_string(),
            starting_balance: 100.0,
        },
    )
    .unwrap()
}

/// Read frames from a connection until one matches, with a timeout.
async fn expect_kind(conn: &mut FakeConn, kind: EnvelopeKind) -> Envelope {
    timeout(Duration::from_secs(5), async {
        loop {
            let text = conn.rx.recv().await.expect("connection open");
            let envelope = Envelope::decode(&text).expect("valid envelope");
            if envelope.kind == kind {
                return envelope;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("no {kind} frame arrived in time"))
}

async fn expect_error_code(conn: &mut FakeConn, code: &str) {
    let envelope = expect_kind(conn, EnvelopeKind::Error).await;
    let data: ErrorData = envelope.payload_as().unwrap();
    assert_eq!(data.code, code);
}

#[tokio::test]
async fn join_creates_room_and_snapshots_roster() {
    let registry = registry_with(10);
    let mut conn = fake_conn(&registry, 64).await;

    assert_eq!(registry.connection_state(conn.id).await, Some(ConnState::Unauthenticated));

    registry
        .dispatch(conn.id, join_envelope("lobby", "p1", "Alice"))
        .await;

    assert_eq!(registry.room_count().await, 1);
    assert_eq!(registry.connection_state(conn.id).await, Some(ConnState::Joined));

    let snapshot = expect_kind(&mut conn, EnvelopeKind::PlayerList).await;
    let data: coinflip::net::messages::PlayerListData = snapshot.payload_as().unwrap();
    assert_eq!(data.players.len(), 1);
    assert_eq!(data.players[0].id, "p1");

    // The room's own broadcast also reaches the member.
    expect_kind(&mut conn, EnvelopeKind::RoomUpdate).await;
}

#[tokio::test]
async fn unknown_kind_gets_structured_reply() {
    let registry = registry_with(10);
    let mut conn = fake_conn(&registry, 64).await;

    registry
        .dispatch(conn.id, Envelope::bare(EnvelopeKind::RoomUpdate, "", ""))
        .await;
    expect_error_code(&mut conn, "unknown_message_kind").await;
}

#[tokio::test]
async fn malformed_join_payload_gets_structured_reply() {
    let registry = registry_with(10);
    let mut conn = fake_conn(&registry, 64).await;

    // join_room with a null payload.
    registry
        .dispatch(conn.id, Envelope::bare(EnvelopeKind::JoinRoom, "lobby", "p1"))
        .await;
    expect_error_code(&mut conn, "malformed_envelope").await;
}

#[tokio::test]
async fn bet_before_join_is_rejected() {
    let registry = registry_with(10);
    let mut conn = fake_conn(&registry, 64).await;

    let bet = Envelope::new(
        EnvelopeKind::BetPlaced,
        "lobby",
        "p1",
        &BetData {
            player_id: "p1".to_string(),
            amount: 10.0,
            side: Side::Heads,
            bet_id: "bet_x".to_string(),
        },
    )
    .unwrap();
    registry.dispatch(conn.id, bet).await;
    expect_error_code(&mut conn, "not_in_room").await;
}

#[tokio::test]
async fn room_errors_propagate_to_the_issuing_connection() {
    let registry = registry_with(10);
    let mut conn = fake_conn(&registry, 64).await;

    registry
        .dispatch(conn.id, join_envelope("lobby", "p1", "Alice"))
        .await;

    // Only one player, so the room is waiting and the bet is out of phase.
    let bet = Envelope::new(
        EnvelopeKind::BetPlaced,
        "lobby",
        "p1",
        &BetData {
            player_id: "p1".to_string(),
            amount: 10.0,
            side: Side::Heads,
            bet_id: "bet_x".to_string(),
        },
    )
    .unwrap();
    registry.dispatch(conn.id, bet).await;
    expect_error_code(&mut conn, "invalid_phase").await;
}

#[tokio::test]
async fn room_table_is_bounded() {
    let registry = registry_with(1);
    let mut first = fake_conn(&registry, 64).await;
    let mut second = fake_conn(&registry, 64).await;

    registry
        .dispatch(first.id, join_envelope("room-a", "p1", "Alice"))
        .await;
    expect_kind(&mut first, EnvelopeKind::PlayerList).await;

    registry
        .dispatch(second.id, join_envelope("room-b", "p2", "Bob"))
        .await;
    expect_error_code(&mut second, "max_rooms_reached").await;
    assert_eq!(registry.room_count().await, 1);
}

#[tokio::test]
async fn saturated_connection_is_dropped_without_stalling_others() {
    // Scenario: one member's outbound buffer saturates; only that member
    // is disconnected and the rest keep receiving.
    let registry = registry_with(10);
    let narrow = fake_conn(&registry, 2).await;
    let mut wide = fake_conn(&registry, 64).await;

    registry
        .dispatch(narrow.id, join_envelope("lobby", "p1", "Alice"))
        .await;
    // The narrow buffer already holds its player_list and room_update and
    // is never drained. The broadcast for the second join overflows it.
    registry
        .dispatch(wide.id, join_envelope("lobby", "p2", "Bob"))
        .await;

    // The saturated connection is kicked.
    timeout(Duration::from_secs(5), narrow.kick.notified())
        .await
        .expect("saturated connection was not kicked");

    // The kick precedes removal from the table by a moment.
    timeout(Duration::from_secs(5), async {
        while registry.connection_state(narrow.id).await.is_some() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("kicked connection was not removed");
    assert_eq!(registry.connection_count().await, 1);

    // The healthy connection still receives traffic.
    expect_kind(&mut wide, EnvelopeKind::RoomUpdate).await;
}

#[tokio::test]
async fn leave_detaches_and_reap_collects_empty_rooms() {
    let registry = registry_with(10);
    let mut conn = fake_conn(&registry, 64).await;

    registry
        .dispatch(conn.id, join_envelope("lobby", "p1", "Alice"))
        .await;
    expect_kind(&mut conn, EnvelopeKind::PlayerList).await;

    registry
        .dispatch(conn.id, Envelope::bare(EnvelopeKind::LeaveRoom, "lobby", "p1"))
        .await;
    assert_eq!(registry.connection_state(conn.id).await, Some(ConnState::Detached));

    // The roster is empty now, so the reaper discards the room.
    registry.reap().await;
    assert_eq!(registry.room_count().await, 0);

    // Leaving again without membership is an error reply, not a crash.
    registry
        .dispatch(conn.id, Envelope::bare(EnvelopeKind::LeaveRoom, "lobby", "p1"))
        .await;
    expect_error_code(&mut conn, "not_in_room").await;
}

#[tokio::test]
async fn unregister_removes_player_from_room() {
    let registry = registry_with(10);
    let conn = fake_conn(&registry, 64).await;
    let mut other = fake_conn(&registry, 64).await;

    registry
        .dispatch(conn.id, join_envelope("lobby", "p1", "Alice"))
        .await;
    registry
        .dispatch(other.id, join_envelope("lobby", "p2", "Bob"))
        .await;

    registry.unregister(conn.id).await;
    assert_eq!(registry.connection_count().await, 1);

    // The surviving member sees a roster of one.
    let update = timeout(Duration::from_secs(5), async {
        loop {
            let text = other.rx.recv().await.expect("connection open");
            let envelope = Envelope::decode(&text).unwrap();
            if envelope.kind == EnvelopeKind::RoomUpdate {
                let data: coinflip::net::messages::RoomUpdateData =
                    envelope.payload_as().unwrap();
                if data.players.len() == 1 {
                    return data;
                }
            }
        }
    })
    .await
    .expect("no single-player roster update arrived");
    assert_eq!(update.players[0].id, "p2");
}

#[tokio::test]
async fn shutdown_is_idempotent_and_clears_everything() {
    let registry = registry_with(10);
    let conn = fake_conn(&registry, 64).await;

    registry
        .dispatch(conn.id, join_envelope("lobby", "p1", "Alice"))
        .await;
    assert_eq!(registry.room_count().await, 1);

    registry.shutdown().await;
    registry.shutdown().await;

    assert_eq!(registry.room_count().await, 0);
    assert_eq!(registry.connection_count().await, 0);
    timeout(Duration::from_secs(1), conn.kick.notified())
        .await
        .expect("connection was not kicked on shutdown");

    // New joins are refused after shutdown.
    let mut late = fake_conn(&registry, 64).await;
    registry
        .dispatch(late.id, join_envelope("lobby", "p9", "Zed"))
        .await;
    expect_error_code(&mut late, "shutting_down").await;
}
