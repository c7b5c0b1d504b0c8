//! Room actor with deadline-driven phase transitions.
//!
//! The actor owns every phase deadline as plain `Instant`s checked by its
//! own select loop. When the actor stops, its deadlines stop with it, so a
//! torn-down room can never be mutated by a stray timer.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tokio::time::{Instant, interval, sleep_until};

use super::{
    config::RoomConfig,
    entities::{Player, Round},
    errors::RoomError,
    messages::{RoomMessage, RoomState},
};
use crate::game::{CoinFlipper, Side, seed_digest};
use crate::net::messages::{
    BetData, Envelope, EnvelopeKind, GameResultData, Phase, PlayerInfo, PlayerOutcome, RoomUpdateData,
    RoundRef, SeedCommitData, SeedRevealData, TimerData,
};
use crate::storage::{HistoryStore, PlayerLedger, RoundRecord};
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

const INBOX_CAPACITY: usize = 100;
const EVENT_QUEUE_CAPACITY: usize = 100;

/// Handle for sending messages to a room actor.
#[derive(Clone)]
pub struct RoomHandle {
    sender: mpsc::Sender<RoomMessage>,
    id: String,
}

impl RoomHandle {
    /// Room id this handle addresses.
    pub fn id(&self) -> &str {
        &self.id
    }

    async fn send(&self, message: RoomMessage) -> Result<(), RoomError> {
        self.sender
            .send(message)
            .await
            .map_err(|_| RoomError::RoomClosed)
    }

    pub async fn add_player(
        &self,
        player_id: String,
        name: String,
        balance: f64,
    ) -> Result<(), RoomError> {
        let (tx, rx) = oneshot::channel();
        self.send(RoomMessage::AddPlayer {
            player_id,
            name,
            balance,
            response: tx,
        })
        .await?;
        rx.await.map_err(|_| RoomError::RoomClosed)?
    }

    pub async fn remove_player(&self, player_id: String) -> Result<(), RoomError> {
        let (tx, rx) = oneshot::channel();
        self.send(RoomMessage::RemovePlayer {
            player_id,
            response: tx,
        })
        .await?;
        rx.await.map_err(|_| RoomError::RoomClosed)?
    }

    pub async fn place_bet(
        &self,
        player_id: String,
        amount: f64,
        side: Side,
    ) -> Result<BetData, RoomError> {
        let (tx, rx) = oneshot::channel();
        self.send(RoomMessage::PlaceBet {
            player_id,
            amount,
            side,
            response: tx,
        })
        .await?;
        rx.await.map_err(|_| RoomError::RoomClosed)?
    }

    pub async fn start_round(&self) -> Result<(), RoomError> {
        let (tx, rx) = oneshot::channel();
        self.send(RoomMessage::StartRound { response: tx }).await?;
        rx.await.map_err(|_| RoomError::RoomClosed)?
    }

    pub async fn state(&self) -> Result<RoomState, RoomError> {
        let (tx, rx) = oneshot::channel();
        self.send(RoomMessage::GetState { response: tx }).await?;
        rx.await.map_err(|_| RoomError::RoomClosed)
    }

    /// Stop the room. Succeeds silently if the room is already gone.
    pub async fn close(&self) {
        let (tx, rx) = oneshot::channel();
        if self.send(RoomMessage::Close { response: tx }).await.is_ok() {
            let _ = rx.await;
        }
    }
}

/// Actor managing a single game room.
pub struct RoomActor {
    id: String,
    name: String,
    config: RoomConfig,
    players: HashMap<String, Player>,
    phase: Phase,
    round: Option<Round>,
    total_rounds: u64,
    created_at: chrono::DateTime<Utc>,
    last_activity: chrono::DateTime<Utc>,

    inbox: mpsc::Receiver<RoomMessage>,
    events: mpsc::Sender<Envelope>,
    flipper: Arc<dyn CoinFlipper>,
    store: Arc<dyn HistoryStore>,

    // Phase deadlines, owned and checked only by the actor loop.
    betting_deadline: Option<Instant>,
    result_deadline: Option<Instant>,
    next_round_at: Option<Instant>,

    is_closed: bool,
}

impl RoomActor {
    /// Create a room actor, its handle, and the receiving end of its
    /// bounded event queue.
    pub fn new(
        id: String,
        name: String,
        config: RoomConfig,
        flipper: Arc<dyn CoinFlipper>,
        store: Arc<dyn HistoryStore>,
    ) -> (Self, RoomHandle, mpsc::Receiver<Envelope>) {
        let (sender, inbox) = mpsc::channel(INBOX_CAPACITY);
        let (events, events_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);

        let handle = RoomHandle {
            sender,
            id: id.clone(),
        };
        let actor = Self {
            id,
            name,
            config,
            players: HashMap::new(),
            phase: Phase::Waiting,
            round: None,
            total_rounds: 0,
            created_at: Utc::now(),
            last_activity: Utc::now(),
            inbox,
            events,
            flipper,
            store,
            betting_deadline: None,
            result_deadline: None,
            next_round_at: None,
            is_closed: false,
        };

        (actor, handle, events_rx)
    }

    /// Run the room's event loop until the room is closed or every handle
    /// is dropped.
    pub async fn run(mut self) {
        log::info!("room {} '{}' starting", self.id, self.name);

        let mut countdown = interval(std::time::Duration::from_secs(1));

        loop {
            let deadline = self.nearest_deadline();
            tokio::select! {
                maybe_message = self.inbox.recv() => match maybe_message {
                    Some(message) => self.handle_message(message).await,
                    None => break,
                },
                _ = countdown.tick() => self.broadcast_countdown(),
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.handle_deadline().await;
                }
            }

            if self.is_closed {
                break;
            }
        }

        log::info!("room {} '{}' closed", self.id, self.name);
    }

    async fn handle_message(&mut self, message: RoomMessage) {
        match message {
            RoomMessage::AddPlayer {
                player_id,
                name,
                balance,
                response,
            } => {
                let result = self.handle_add_player(player_id, name, balance);
                let _ = response.send(result);
            }

            RoomMessage::RemovePlayer {
                player_id,
                response,
            } => {
                let result = self.handle_remove_player(&player_id).await;
                let _ = response.send(result);
            }

            RoomMessage::PlaceBet {
                player_id,
                amount,
                side,
                response,
            } => {
                let result = self.handle_place_bet(&player_id, amount, side);
                let _ = response.send(result);
            }

            RoomMessage::StartRound { response } => {
                let _ = response.send(self.start_round());
            }

            RoomMessage::GetState { response } => {
                let _ = response.send(self.snapshot());
            }

            RoomMessage::Close { response } => {
                self.is_closed = true;
                let _ = response.send(());
            }
        }
    }

    fn handle_add_player(
        &mut self,
        player_id: String,
        name: String,
        balance: f64,
    ) -> Result<(), RoomError> {
        if let Some(existing) = self.players.get_mut(&player_id) {
            // Reconnecting player keeps their balance and any open bet.
            existing.is_online = true;
            existing.last_seen = Utc::now();
            log::info!("room {}: player {player_id} rejoined", self.id);
            self.broadcast_room_update();
            return Ok(());
        }

        if self.players.len() >= self.config.max_players {
            return Err(RoomError::RoomFull);
        }

        self.players
            .insert(player_id.clone(), Player::new(player_id.clone(), name, balance));
        self.last_activity = Utc::now();

        log::info!(
            "room {}: player {player_id} joined, {} total",
            self.id,
            self.players.len()
        );
        self.broadcast_room_update();

        if self.phase == Phase::Paused && self.players.len() >= self.config.min_players {
            self.phase = Phase::Waiting;
        }
        if self.phase == Phase::Waiting && self.players.len() >= self.config.min_players {
            if let Err(e) = self.start_round() {
                log::error!("room {}: failed to auto-start round: {e}", self.id);
            }
        }

        Ok(())
    }

    async fn handle_remove_player(&mut self, player_id: &str) -> Result<(), RoomError> {
        let mut player = self
            .players
            .remove(player_id)
            .ok_or(RoomError::PlayerNotFound)?;

        if let Some(round) = self.round.as_mut() {
            if let Some(bet) = round.bets.remove(player_id) {
                player.balance += bet.amount;
                player.current_bet = None;
                log::info!(
                    "room {}: refunded {} to departing player {player_id}",
                    self.id,
                    bet.amount
                );
            }
        }

        self.last_activity = Utc::now();
        log::info!(
            "room {}: player {player_id} left, {} remaining",
            self.id,
            self.players.len()
        );

        self.persist_player(&player).await;

        if self.phase == Phase::Betting && self.players.len() < self.config.min_players {
            self.pause_round();
        }

        self.broadcast_room_update();
        Ok(())
    }

    fn handle_place_bet(
        &mut self,
        player_id: &str,
        amount: f64,
        side: Side,
    ) -> Result<BetData, RoomError> {
        match self.phase {
            Phase::Betting => {}
            Phase::Revealing | Phase::Result => return Err(RoomError::BettingClosed),
            Phase::Waiting | Phase::Paused => return Err(RoomError::InvalidPhase),
        }
        let round = self.round.as_mut().ok_or(RoomError::InvalidPhase)?;
        let player = self
            .players
            .get_mut(player_id)
            .ok_or(RoomError::PlayerNotFound)?;

        if round.bets.contains_key(player_id) {
            return Err(RoomError::DuplicateBet);
        }
        if amount < self.config.min_bet || amount > self.config.max_bet {
            return Err(RoomError::InvalidAmount {
                amount,
                min: self.config.min_bet,
                max: self.config.max_bet,
            });
        }
        if player.balance < amount {
            return Err(RoomError::InsufficientBalance {
                available: player.balance,
                required: amount,
            });
        }

        let bet = BetData {
            player_id: player_id.to_string(),
            amount,
            side,
            bet_id: format!("bet_{}", Uuid::new_v4().simple()),
        };

        // Funds are held, not merely reserved.
        player.balance -= amount;
        player.current_bet = Some(bet.clone());
        round.bets.insert(player_id.to_string(), bet.clone());

        self.last_activity = Utc::now();
        log::info!("room {}: player {player_id} bet {amount} on {side}", self.id);

        self.emit(EnvelopeKind::BetPlaced, player_id, &bet);
        self.broadcast_room_update();

        Ok(bet)
    }

    fn start_round(&mut self) -> Result<(), RoomError> {
        if self.phase != Phase::Waiting {
            return Err(RoomError::InvalidPhase);
        }
        if self.players.len() < self.config.min_players {
            return Err(RoomError::NotEnoughPlayers);
        }

        let round = Round::new(&self.id);
        log::info!(
            "room {}: round {} started with {} players",
            self.id,
            round.id,
            self.players.len()
        );

        self.phase = Phase::Betting;
        self.total_rounds += 1;
        self.betting_deadline = Some(Instant::now() + self.config.betting_duration);
        self.next_round_at = None;

        self.emit(
            EnvelopeKind::GameStart,
            "",
            &RoundRef {
                round_id: round.id.clone(),
            },
        );
        let betting_secs = self.config.betting_duration.as_secs();
        self.emit(
            EnvelopeKind::BetPhase,
            "",
            &TimerData {
                phase: Phase::Betting,
                seconds_left: betting_secs,
                total_seconds: betting_secs,
            },
        );

        self.round = Some(round);
        Ok(())
    }

    fn nearest_deadline(&self) -> Option<Instant> {
        [self.betting_deadline, self.result_deadline, self.next_round_at]
            .into_iter()
            .flatten()
            .min()
    }

    async fn handle_deadline(&mut self) {
        let now = Instant::now();
        if self.betting_deadline.is_some_and(|d| d <= now) {
            self.betting_deadline = None;
            self.end_betting().await;
        } else if self.result_deadline.is_some_and(|d| d <= now) {
            self.result_deadline = None;
            self.finish_round();
        } else if self.next_round_at.is_some_and(|d| d <= now) {
            self.next_round_at = None;
            if self.phase == Phase::Waiting && self.players.len() >= self.config.min_players {
                if let Err(e) = self.start_round() {
                    log::error!("room {}: failed to start scheduled round: {e}", self.id);
                }
            }
        }
    }

    /// Countdown broadcast, active only while betting.
    fn broadcast_countdown(&self) {
        if self.phase != Phase::Betting {
            return;
        }
        let Some(deadline) = self.betting_deadline else {
            return;
        };
        let seconds_left = deadline.saturating_duration_since(Instant::now()).as_secs();
        if seconds_left == 0 {
            return;
        }
        self.emit(
            EnvelopeKind::TimerUpdate,
            "",
            &TimerData {
                phase: Phase::Betting,
                seconds_left,
                total_seconds: self.config.betting_duration.as_secs(),
            },
        );
    }

    async fn end_betting(&mut self) {
        if self.phase != Phase::Betting {
            return;
        }
        let Some(mut round) = self.round.take() else {
            log::error!("room {}: betting deadline with no active round", self.id);
            self.phase = Phase::Waiting;
            return;
        };

        log::info!(
            "room {}: betting closed for round {} with {} bets",
            self.id,
            round.id,
            round.bets.len()
        );

        if round.bets.is_empty() {
            // Nothing staked, nothing to resolve.
            self.phase = Phase::Waiting;
            self.broadcast_room_update();
            return;
        }

        self.phase = Phase::Revealing;
        self.emit(
            EnvelopeKind::RevealPhase,
            "",
            &RoundRef {
                round_id: round.id.clone(),
            },
        );

        let (seed, side) = match self.draw_outcome() {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("room {}: outcome generation failed: {e}", self.id);
                self.refund_bets(&mut round);
                self.phase = Phase::Waiting;
                self.broadcast_room_update();
                return;
            }
        };

        self.emit(
            EnvelopeKind::SeedCommit,
            "",
            &SeedCommitData {
                round_id: round.id.clone(),
                seed_hash: seed_digest(&seed),
            },
        );

        self.settle(&mut round, &seed, side);

        self.phase = Phase::Result;
        self.result_deadline = Some(Instant::now() + self.config.result_duration);

        self.emit(
            EnvelopeKind::SeedReveal,
            "",
            &SeedRevealData {
                round_id: round.id.clone(),
                seed: seed.clone(),
            },
        );

        let result = Self::result_data(&round, side, &seed);
        log::info!(
            "room {}: round {} resolved {side}, {} winners and {} losers",
            self.id,
            round.id,
            result.winners.len(),
            result.losers.len()
        );
        self.emit(EnvelopeKind::GameResult, "", &result);

        self.persist_round(&round, side, &seed).await;

        self.round = Some(round);
        self.broadcast_room_update();
    }

    fn draw_outcome(&self) -> Result<(String, Side), crate::game::FlipError> {
        let seed = self.flipper.secure_seed()?;
        let side = self.flipper.flip(&seed)?;
        Ok((seed, side))
    }

    fn settle(&mut self, round: &mut Round, seed: &str, side: Side) {
        let mut results = HashMap::new();
        for (player_id, bet) in &round.bets {
            let Some(player) = self.players.get_mut(player_id) else {
                // Bets are refunded on departure, so this indicates a bug.
                log::warn!(
                    "room {}: bet from absent player {player_id} ignored",
                    self.id
                );
                continue;
            };

            let won = bet.side == side;
            let mut payout = 0.0;
            if won {
                payout = bet.amount * self.config.payout_ratio;
                player.balance += payout;
                player.total_wins += 1;
                player.net_profit += payout - bet.amount;
            } else {
                player.net_profit -= bet.amount;
            }
            player.total_games += 1;
            player.current_bet = None;

            results.insert(
                player_id.clone(),
                PlayerOutcome {
                    player_id: player_id.clone(),
                    player_name: player.name.clone(),
                    bet: Some(bet.clone()),
                    won,
                    payout,
                    new_balance: player.balance,
                },
            );
        }
        round.results = results;
        round.outcome = Some(side);
        round.seed = Some(seed.to_string());
    }

    fn result_data(round: &Round, side: Side, seed: &str) -> GameResultData {
        let mut winners = Vec::new();
        let mut losers = Vec::new();
        for outcome in round.results.values() {
            if outcome.won {
                winners.push(outcome.clone());
            } else {
                losers.push(outcome.clone());
            }
        }
        winners.sort_by(|a, b| a.player_id.cmp(&b.player_id));
        losers.sort_by(|a, b| a.player_id.cmp(&b.player_id));
        GameResultData {
            round_id: round.id.clone(),
            side,
            seed: seed.to_string(),
            winners,
            losers,
        }
    }

    fn finish_round(&mut self) {
        if self.phase != Phase::Result {
            return;
        }
        let round = self.round.take();
        self.phase = Phase::Waiting;

        if let Some(round) = round {
            self.emit(EnvelopeKind::RoundEnd, "", &RoundRef { round_id: round.id });
        }
        self.broadcast_room_update();

        if self.players.len() >= self.config.min_players {
            self.next_round_at = Some(Instant::now() + self.config.round_gap);
        }
    }

    fn pause_round(&mut self) {
        self.betting_deadline = None;
        if let Some(mut round) = self.round.take() {
            self.refund_bets(&mut round);
        }
        self.phase = Phase::Paused;
        log::info!("room {}: paused, roster below minimum", self.id);
    }

    fn refund_bets(&mut self, round: &mut Round) {
        for (player_id, bet) in round.bets.drain() {
            if let Some(player) = self.players.get_mut(&player_id) {
                player.balance += bet.amount;
                player.current_bet = None;
            }
        }
    }

    fn broadcast_room_update(&self) {
        let update = RoomUpdateData {
            room_id: self.id.clone(),
            players: self.roster(),
            phase: self.phase,
            timer_seconds: self
                .betting_deadline
                .map(|d| d.saturating_duration_since(Instant::now()).as_secs())
                .unwrap_or(0),
            min_players: self.config.min_players,
            max_players: self.config.max_players,
        };
        self.emit(EnvelopeKind::RoomUpdate, "", &update);
    }

    fn roster(&self) -> Vec<PlayerInfo> {
        let mut players: Vec<PlayerInfo> = self.players.values().map(PlayerInfo::from).collect();
        players.sort_by(|a, b| a.id.cmp(&b.id));
        players
    }

    fn snapshot(&self) -> RoomState {
        RoomState {
            room_id: self.id.clone(),
            name: self.name.clone(),
            phase: self.phase,
            round_id: self.round.as_ref().map(|r| r.id.clone()),
            players: self.roster(),
            min_players: self.config.min_players,
            max_players: self.config.max_players,
            total_rounds: self.total_rounds,
            created_at: self.created_at,
            last_activity: self.last_activity,
        }
    }

    /// Push an event onto the bounded queue, shedding the newest event when
    /// the relay cannot keep up.
    fn emit<T: Serialize>(&self, kind: EnvelopeKind, player_id: &str, payload: &T) {
        let envelope = match Envelope::new(kind, &self.id, player_id, payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                log::error!("room {}: failed to encode {kind} event: {e}", self.id);
                return;
            }
        };
        match self.events.try_send(envelope) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                log::warn!("room {}: event queue full, dropping {kind}", self.id);
            }
            Err(TrySendError::Closed(_)) => {
                log::debug!("room {}: event queue closed, dropping {kind}", self.id);
            }
        }
    }

    async fn persist_round(&self, round: &Round, side: Side, seed: &str) {
        let mut outcomes: Vec<PlayerOutcome> = round.results.values().cloned().collect();
        outcomes.sort_by(|a, b| a.player_id.cmp(&b.player_id));
        let record = RoundRecord {
            round_id: round.id.clone(),
            room_id: self.id.clone(),
            side,
            seed: seed.to_string(),
            outcomes,
            finished_at: Utc::now(),
        };
        if let Err(e) = self.store.save_round(&record).await {
            log::warn!("room {}: failed to save round {}: {e}", self.id, round.id);
        }
        for player_id in round.results.keys() {
            if let Some(player) = self.players.get(player_id) {
                self.persist_player(player).await;
            }
        }
    }

    async fn persist_player(&self, player: &Player) {
        let ledger = PlayerLedger {
            player_id: player.id.clone(),
            name: player.name.clone(),
            balance: player.balance,
            total_games: player.total_games,
            total_wins: player.total_wins,
            net_profit: player.net_profit,
            updated_at: Utc::now(),
        };
        if let Err(e) = self.store.save_player(&ledger).await {
            log::warn!(
                "room {}: failed to save ledger for {}: {e}",
                self.id,
                player.id
            );
        }
    }
}
