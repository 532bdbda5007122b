//! The table actor: single-writer owner of one table's state.
//!
//! Generalized from the teacher's instruction handlers (`create_table`,
//! `join_table`, `player_action`, `start_hand`, `showdown`,
//! `timeout_player`, `close_inactive_table`) into one long-lived async task
//! that serialises every mutation by processing one inbox message at a
//! time, per spec.md §4.5/§5. Where the teacher dispatches each instruction
//! as its own Anchor entrypoint, here they become variants of one
//! `ActorMessage` enum handled in a single `tokio::select!` loop.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::audit::{AuditBuffer, AuditRecord, AuditSink, OperationKind, SecurityAlertRecord};
use crate::betting::{self, Action, BettingEvent};
use crate::card::Card;
use crate::constants::{DEFAULT_GRACE_PERIOD, DEFAULT_INTER_HAND_DELAY, DEFAULT_TIME_BANK};
use crate::deck::{self, CommittedDeck};
use crate::error::CoreError;
use crate::events::{view_for, TableEvent};
use crate::player::{Player, PlayerStatus};
use crate::rng::RngCore;
use crate::table::button;
use crate::table::state::{Phase, TableConfig, TableState};
use crate::wallet::Wallet;

#[derive(Debug)]
pub enum CommandPayload {
    JoinSeat { seat: u8, buy_in: u64 },
    StandUp,
    SitOut,
    SitIn,
    PlayerAction { action: Action },
    Chat { text: String },
    Leave,
}

#[derive(Debug, Clone)]
pub enum CommandResponse {
    Joined { seat: u8 },
    Ack,
}

#[derive(Debug)]
pub enum SupervisorMessage {
    MovePlayerHere { player: Player },
    RemovePlayer { player_id: Uuid },
    CloseTable { reason: String },
    Pause,
    Resume,
    LevelChange { level: u32 },
    /// A tournament-wide announcement with no single originating player.
    Announce { text: String },
}

pub enum ActorMessage {
    SessionBind { player_id: Uuid, sender: mpsc::Sender<TableEvent> },
    SessionUnbind { player_id: Uuid },
    Command {
        player_id: Uuid,
        idempotency_key: Option<String>,
        payload: CommandPayload,
        reply: oneshot::Sender<Result<CommandResponse, CoreError>>,
    },
    Tick,
    Supervisor(SupervisorMessage),
}

/// A cheaply-cloneable reference to a running table actor's inbox.
#[derive(Clone)]
pub struct TableHandle {
    pub table_id: Uuid,
    inbox: mpsc::Sender<ActorMessage>,
}

impl TableHandle {
    pub async fn session_bind(&self, player_id: Uuid, sender: mpsc::Sender<TableEvent>) {
        let _ = self.inbox.send(ActorMessage::SessionBind { player_id, sender }).await;
    }

    pub async fn session_unbind(&self, player_id: Uuid) {
        let _ = self.inbox.send(ActorMessage::SessionUnbind { player_id }).await;
    }

    pub async fn command(
        &self,
        player_id: Uuid,
        idempotency_key: Option<String>,
        payload: CommandPayload,
    ) -> Result<CommandResponse, CoreError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.inbox
            .send(ActorMessage::Command { player_id, idempotency_key, payload, reply: reply_tx })
            .await
            .map_err(|_| CoreError::TableClosed { reason: "actor stopped".into() })?;
        reply_rx.await.map_err(|_| CoreError::TableClosed { reason: "actor stopped".into() })?
    }

    pub async fn supervisor(&self, message: SupervisorMessage) {
        let _ = self.inbox.send(ActorMessage::Supervisor(message)).await;
    }
}

/// Per-seat bookkeeping the table actor needs but that does not belong in
/// the pure betting-engine state: the action-timer deadline and each
/// session's (weak) send handle.
struct ActorExtras {
    subscriptions: HashMap<Uuid, mpsc::WeakSender<TableEvent>>,
    action_deadline: Option<Instant>,
    inter_hand_deadline: Option<Instant>,
    hole_cards: BTreeMap<u8, [Card; 2]>,
    committed_deck: Option<CommittedDeck>,
    grace_period: Duration,
    time_bank: Duration,
    inter_hand_delay: Duration,
    paused: bool,
    closed: bool,
}

impl Default for ActorExtras {
    fn default() -> Self {
        ActorExtras {
            subscriptions: HashMap::new(),
            action_deadline: None,
            inter_hand_deadline: None,
            hole_cards: BTreeMap::new(),
            committed_deck: None,
            grace_period: DEFAULT_GRACE_PERIOD,
            time_bank: DEFAULT_TIME_BANK,
            inter_hand_delay: DEFAULT_INTER_HAND_DELAY,
            paused: false,
            closed: false,
        }
    }
}

pub struct TableActor {
    state: TableState,
    rng: RngCore,
    audit: AuditBuffer,
    sink: Arc<dyn AuditSink>,
    wallet: Arc<dyn Wallet>,
    extras: ActorExtras,
}

impl TableActor {
    /// Spawns the actor as a tokio task and returns a handle to its inbox.
    pub fn spawn(table_id: Uuid, config: TableConfig, sink: Arc<dyn AuditSink>, wallet: Arc<dyn Wallet>) -> TableHandle {
        let (tx, rx) = mpsc::channel(256);
        let actor = TableActor {
            state: TableState::new(table_id, config),
            rng: RngCore::with_default_rate_limit(Duration::from_secs(300)),
            audit: AuditBuffer::default(),
            sink,
            wallet,
            extras: ActorExtras::default(),
        };
        tokio::spawn(actor.run(rx));
        TableHandle { table_id, inbox: tx }
    }

    async fn run(mut self, mut inbox: mpsc::Receiver<ActorMessage>) {
        let mut ticker = tokio::time::interval(Duration::from_millis(250));
        loop {
            tokio::select! {
                msg = inbox.recv() => {
                    match msg {
                        Some(msg) => self.handle(msg).await,
                        None => break,
                    }
                }
                _ = ticker.tick() => {
                    self.handle(ActorMessage::Tick).await;
                }
            }
            if self.extras.closed {
                break;
            }
        }
        self.audit.flush(self.state.table_id, self.sink.as_ref());
    }

    async fn handle(&mut self, msg: ActorMessage) {
        match msg {
            ActorMessage::SessionBind { player_id, sender } => {
                self.extras.subscriptions.insert(player_id, sender.downgrade());
                self.send_to(player_id, TableEvent::StateUpdate { view: view_for(&self.state, player_id) }).await;
            }
            ActorMessage::SessionUnbind { player_id } => {
                self.extras.subscriptions.remove(&player_id);
            }
            ActorMessage::Command { player_id, idempotency_key: _, payload, reply } => {
                let result = self.handle_command(player_id, payload).await;
                let _ = reply.send(result);
            }
            ActorMessage::Tick => self.handle_tick().await,
            ActorMessage::Supervisor(sup) => self.handle_supervisor(sup).await,
        }
    }

    async fn handle_command(&mut self, player_id: Uuid, payload: CommandPayload) -> Result<CommandResponse, CoreError> {
        if self.extras.closed {
            return Err(CoreError::TableClosed { reason: "table closed".into() });
        }
        match payload {
            CommandPayload::JoinSeat { seat, buy_in } => self.join_seat(player_id, seat, buy_in).await,
            CommandPayload::StandUp => self.stand_up(player_id).await,
            CommandPayload::SitOut => self.set_status(player_id, PlayerStatus::SittingOut).await,
            CommandPayload::SitIn => self.set_status(player_id, PlayerStatus::Active).await,
            CommandPayload::PlayerAction { action } => self.player_action(player_id, action).await,
            CommandPayload::Chat { text } => {
                self.broadcast(TableEvent::Chat { player_id, text }).await;
                Ok(CommandResponse::Ack)
            }
            CommandPayload::Leave => self.stand_up(player_id).await,
        }
    }

    async fn join_seat(&mut self, player_id: Uuid, seat: u8, buy_in: u64) -> Result<CommandResponse, CoreError> {
        if seat as usize >= self.state.seats.len() || self.state.seats[seat as usize].is_some() {
            return Err(CoreError::SeatTaken);
        }
        if buy_in < self.state.config.min_buy_in || buy_in > self.state.config.max_buy_in {
            return Err(CoreError::InvalidBetAmount);
        }
        self.wallet.reserve(player_id, buy_in).map_err(|_| CoreError::InsufficientChips)?;
        self.state.seats[seat as usize] = Some(Player::new(player_id, player_id.to_string(), seat, buy_in));
        self.broadcast(TableEvent::PlayerJoined { seat, player_id }).await;
        self.maybe_start_hand().await;
        Ok(CommandResponse::Joined { seat })
    }

    async fn stand_up(&mut self, player_id: Uuid) -> Result<CommandResponse, CoreError> {
        let seat = self.seat_of(player_id).ok_or(CoreError::InvalidPhase)?;
        let chips = self.state.player(seat).map(|p| p.chips).unwrap_or(0);
        self.state.seats[seat as usize] = None;
        self.wallet.release(player_id, chips);
        self.broadcast(TableEvent::PlayerLeft { seat, player_id }).await;
        Ok(CommandResponse::Ack)
    }

    async fn set_status(&mut self, player_id: Uuid, status: PlayerStatus) -> Result<CommandResponse, CoreError> {
        let seat = self.seat_of(player_id).ok_or(CoreError::InvalidPhase)?;
        if let Some(p) = self.state.player_mut(seat) {
            p.status = status;
        }
        Ok(CommandResponse::Ack)
    }

    fn seat_of(&self, player_id: Uuid) -> Option<u8> {
        self.state.occupied_seats().find(|(_, p)| p.id == player_id).map(|(s, _)| s)
    }

    async fn player_action(&mut self, player_id: Uuid, action: Action) -> Result<CommandResponse, CoreError> {
        let seat = self.seat_of(player_id).ok_or(CoreError::NotYourTurn)?;
        let (new_state, events) = betting::apply_action(&self.state, seat, action)?;
        self.state = new_state;
        self.extras.action_deadline = None;

        self.push_audit(OperationKind::PlayerAction, None, None, None);

        let hand_ended = events.iter().any(|e| matches!(e, BettingEvent::HandEnded));
        self.broadcast(TableEvent::StateUpdate { view: view_for(&self.state, Uuid::nil()) }).await;

        if hand_ended {
            self.finish_hand().await;
        } else {
            self.advance_through_forced_streets().await;
        }

        Ok(CommandResponse::Ack)
    }

    /// After a street closes, deals the next street's board cards. If every
    /// remaining player is all-in and nobody can act, keeps dealing straight
    /// through to showdown instead of waiting on an action that will never
    /// come (spec's all-in runout).
    async fn advance_through_forced_streets(&mut self) {
        loop {
            if self.state.phase.is_betting_phase() {
                self.reveal_board_if_needed().await;
            }
            if self.state.active_player.is_some() {
                self.extras.action_deadline = Some(Instant::now() + self.extras.time_bank);
                break;
            }
            if !self.state.phase.is_betting_phase() {
                break;
            }
            self.state.phase = if self.state.phase == Phase::River { Phase::Showdown } else { self.state.phase.next() };
            self.state.reset_betting_round();
        }
        self.broadcast(TableEvent::StateUpdate { view: view_for(&self.state, Uuid::nil()) }).await;
        if self.state.phase == Phase::Showdown {
            self.finish_hand().await;
        }
    }

    /// Reveals community cards via the deck manager when phase has just
    /// advanced and the board is behind what the phase calls for.
    async fn reveal_board_if_needed(&mut self) {
        let Some(deck) = self.extras.committed_deck.as_mut() else { return };
        let needed = match self.state.phase {
            Phase::Flop => 3,
            Phase::Turn => 4,
            Phase::River => 5,
            _ => return,
        };
        if self.state.community_cards.len() >= needed {
            return;
        }
        match self.state.phase {
            Phase::Flop => self.state.community_cards.extend(deck::deal_flop(deck)),
            Phase::Turn => self.state.community_cards.push(deck::deal_turn(deck)),
            Phase::River => self.state.community_cards.push(deck::deal_river(deck)),
            _ => {}
        }
    }

    async fn finish_hand(&mut self) {
        if let Some(deck) = self.extras.committed_deck.take() {
            let reveal = deck.reveal(&self.rng);
            self.state.side_pots = betting::compute_side_pots(&self.state);
            match betting::resolve_showdown(&self.state, &self.extras.hole_cards) {
                Ok((new_state, result)) => {
                    self.state = new_state;
                    self.settle_wallet(&result);
                    self.push_audit(OperationKind::HandCompleted, None, Some(reveal.shuffle_proof.output_hash), None);
                    self.broadcast(TableEvent::HandCompleted {
                        hand_id: Uuid::new_v4(),
                        result,
                        revealed_hole_cards: self.extras.hole_cards.clone(),
                        deck_reveal_hash: reveal.shuffle_proof.output_hash,
                    })
                    .await;
                }
                Err(err) => warn!(table_id = %self.state.table_id, %err, "showdown failed"),
            }
        }
        self.extras.hole_cards.clear();
        self.state.phase = Phase::Finished;
        self.extras.inter_hand_deadline = Some(Instant::now() + self.extras.inter_hand_delay);
        self.audit.flush(self.state.table_id, self.sink.as_ref());
    }

    /// Reports each seat's showdown delta to the wallet collaborator:
    /// winners get `commit_win` for their award, non-winning contributors
    /// get `commit_loss` for what they put in this hand. The two sides
    /// balance because every chip in the pot came from a contributor's bet
    /// and every chip leaves the pot through an award.
    fn settle_wallet(&self, result: &betting::ShowdownResult) {
        use std::collections::BTreeSet;

        let winning_seats: BTreeSet<u8> = result.awards.iter().map(|a| a.seat).collect();
        for award in &result.awards {
            if let Some(player) = self.state.player(award.seat) {
                self.wallet.commit_win(player.id, award.amount);
            }
        }
        for (seat, player) in self.state.occupied_seats() {
            if winning_seats.contains(&seat) || player.total_bet_this_hand == 0 {
                continue;
            }
            self.wallet.commit_loss(player.id, player.total_bet_this_hand);
        }
    }

    async fn handle_tick(&mut self) {
        if self.extras.paused || self.extras.closed {
            return;
        }
        if self.audit.should_flush() {
            self.audit.flush(self.state.table_id, self.sink.as_ref());
        }
        if let Some(alert) = self.rng.scan_for_anomalies() {
            self.sink.append_alert(SecurityAlertRecord {
                id: Uuid::new_v4(),
                table_id: self.state.table_id,
                timestamp_unix: unix_now(),
                alert,
            });
        }

        if let Some(deadline) = self.extras.action_deadline {
            if Instant::now() >= deadline {
                self.synthesize_default_action().await;
            }
        }

        if self.state.phase == Phase::Finished {
            if let Some(deadline) = self.extras.inter_hand_deadline {
                if Instant::now() >= deadline {
                    self.extras.inter_hand_deadline = None;
                    self.state.phase = Phase::Waiting;
                    self.maybe_start_hand().await;
                }
            }
        }
    }

    async fn synthesize_default_action(&mut self) {
        let Some(seat) = self.state.active_player else { return };
        let player_id = self.state.player(seat).map(|p| p.id);
        let to_call = self
            .state
            .player(seat)
            .map(|p| self.state.current_bet.saturating_sub(p.current_bet))
            .unwrap_or(0);
        let action = if to_call == 0 { Action::Check } else { Action::Fold };
        info!(table_id = %self.state.table_id, seat, ?action, "action timer expired, synthesizing default action");
        if let Some(player_id) = player_id {
            let _ = self.player_action(player_id, action).await;
        }
    }

    /// `waiting -> pre_flop`: requires >=2 active-and-connected players and
    /// succeeds only if deck commitment succeeds.
    async fn maybe_start_hand(&mut self) {
        if self.state.phase != Phase::Waiting || self.extras.paused || self.extras.closed {
            return;
        }
        let now = unix_now();
        let button_seat = match button::rotate_button(&self.state, &mut self.rng, self.extras.grace_period, now) {
            Ok(b) => b,
            Err(_) => return,
        };
        let (sb_seat, bb_seat) = match button::assign_blinds(&self.state, button_seat, self.extras.grace_period, now) {
            Ok(v) => v,
            Err(_) => return,
        };

        self.rng.refresh_entropy();
        self.state.hand_number += 1;
        let hand_id = Uuid::new_v4();

        let committed = match deck::commit_and_shuffle(&mut self.rng, self.state.table_id, hand_id) {
            Ok(d) => d,
            Err(err) => {
                warn!(table_id = %self.state.table_id, %err, "hand_start_failed, will retry next tick");
                return;
            }
        };

        let commitment_hash = committed.commitment().hash;
        self.push_audit(OperationKind::DeckCommit, Some(hand_id), Some(commitment_hash), None);

        self.state.dealer_seat = Some(button_seat);
        self.state.phase = Phase::PreFlop;
        self.state.community_cards.clear();
        for (_, player) in self.state.seats.iter_mut().enumerate().filter_map(|(i, p)| p.as_mut().map(|p| (i, p))) {
            player.reset_for_new_hand();
        }

        let seat_order = deal_order_from(&self.state, button_seat);
        let mut deck = committed;
        let hole = deck::deal_hole_cards(&mut deck, &seat_order);
        for (seat, cards) in hole {
            self.extras.hole_cards.insert(seat, cards);
            if let Some(p) = self.state.player_mut(seat) {
                p.hole_cards = Some(cards);
            }
        }
        self.extras.committed_deck = Some(deck);

        let (posted_state, _blind_events) = betting::post_blinds(&self.state, sb_seat, bb_seat);
        self.state = posted_state;
        self.state.pot = self.state.occupied_seats().map(|(_, p)| p.current_bet).sum();
        self.state.active_player = first_to_act_preflop(&self.state, bb_seat);
        self.extras.action_deadline = Some(Instant::now() + self.extras.time_bank);

        self.broadcast(TableEvent::HandStarted {
            hand_id,
            button: button_seat,
            small_blind: sb_seat,
            big_blind: bb_seat,
            commitment_hash,
        })
        .await;
        self.broadcast(TableEvent::StateUpdate { view: view_for(&self.state, Uuid::nil()) }).await;
    }

    async fn handle_supervisor(&mut self, msg: SupervisorMessage) {
        match msg {
            SupervisorMessage::MovePlayerHere { mut player } => {
                if let Some(seat) = self.state.find_empty_seat() {
                    player.seat_index = seat;
                    let player_id = player.id;
                    self.state.seats[seat as usize] = Some(player);
                    self.broadcast(TableEvent::PlayerJoined { seat, player_id }).await;
                    self.maybe_start_hand().await;
                } else {
                    warn!(table_id = %self.state.table_id, "move_player_here with no free seat");
                }
            }
            SupervisorMessage::RemovePlayer { player_id } => {
                let _ = self.stand_up(player_id).await;
            }
            SupervisorMessage::CloseTable { reason } => {
                self.extras.closed = true;
                self.broadcast(TableEvent::TableClosed { reason }).await;
            }
            SupervisorMessage::Pause => self.extras.paused = true,
            SupervisorMessage::Resume => {
                self.extras.paused = false;
                self.maybe_start_hand().await;
            }
            SupervisorMessage::LevelChange { level } => {
                debug!(table_id = %self.state.table_id, level, "level change broadcast");
                self.broadcast(TableEvent::Chat { player_id: Uuid::nil(), text: format!("level_change:{level}") }).await;
            }
            SupervisorMessage::Announce { text } => {
                self.broadcast(TableEvent::Chat { player_id: Uuid::nil(), text }).await;
            }
        }
    }

    fn push_audit(&mut self, operation: OperationKind, hand_id: Option<Uuid>, output_hash: Option<[u8; 32]>, input_hash: Option<[u8; 32]>) {
        self.audit.push(AuditRecord {
            id: Uuid::new_v4(),
            operation,
            table_id: self.state.table_id,
            hand_id,
            timestamp_unix: unix_now(),
            entropy_bytes_consumed: 0,
            input_hash,
            output_hash,
            metadata: BTreeMap::new(),
        });
        if self.audit.should_flush() {
            self.audit.flush(self.state.table_id, self.sink.as_ref());
        }
    }

    async fn send_to(&mut self, player_id: Uuid, event: TableEvent) {
        if let Some(weak) = self.extras.subscriptions.get(&player_id) {
            if let Some(sender) = weak.upgrade() {
                let _ = sender.try_send(event);
            } else {
                self.extras.subscriptions.remove(&player_id);
            }
        }
    }

    async fn broadcast(&mut self, event: TableEvent) {
        let ids: Vec<Uuid> = self.extras.subscriptions.keys().copied().collect();
        for id in ids {
            let view_event = match &event {
                TableEvent::StateUpdate { .. } => TableEvent::StateUpdate { view: view_for(&self.state, id) },
                other => other.clone(),
            };
            self.send_to(id, view_event).await;
        }
    }
}

/// Seats in deal order starting left of the button.
fn deal_order_from(state: &TableState, button: u8) -> Vec<u8> {
    let n = state.seats.len() as u8;
    let mut order = Vec::new();
    let mut pos = (button + 1) % n;
    for _ in 0..n {
        if state.player(pos).is_some() {
            order.push(pos);
        }
        pos = (pos + 1) % n;
    }
    order
}

/// First player to act pre-flop is left of the big blind.
fn first_to_act_preflop(state: &TableState, bb_seat: u8) -> Option<u8> {
    let n = state.seats.len() as u8;
    let mut pos = (bb_seat + 1) % n;
    for _ in 0..n {
        if let Some(p) = state.player(pos) {
            if p.can_act() {
                return Some(pos);
            }
        }
        pos = (pos + 1) % n;
    }
    None
}

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::InMemoryAuditSink;
    use crate::wallet::NullWallet;

    fn config() -> TableConfig {
        TableConfig { small_blind: 10, big_blind: 20, ante: 0, min_buy_in: 200, max_buy_in: 2000, max_seats: 4 }
    }

    #[tokio::test]
    async fn join_seat_then_hand_starts_once_two_players_seated() {
        let sink = InMemoryAuditSink::new();
        let wallet: Arc<dyn Wallet> = Arc::new(NullWallet);
        let handle = TableActor::spawn(Uuid::new_v4(), config(), sink, wallet);

        let p1 = Uuid::new_v4();
        let p2 = Uuid::new_v4();
        let r1 = handle.command(p1, None, CommandPayload::JoinSeat { seat: 0, buy_in: 1000 }).await;
        assert!(matches!(r1, Ok(CommandResponse::Joined { seat: 0 })));
        let r2 = handle.command(p2, None, CommandPayload::JoinSeat { seat: 1, buy_in: 1000 }).await;
        assert!(matches!(r2, Ok(CommandResponse::Joined { seat: 1 })));

        // Allow the actor's tick to run maybe_start_hand via the join path
        // (join_seat calls maybe_start_hand synchronously already).
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test]
    async fn joining_an_occupied_seat_is_rejected() {
        let sink = InMemoryAuditSink::new();
        let wallet: Arc<dyn Wallet> = Arc::new(NullWallet);
        let handle = TableActor::spawn(Uuid::new_v4(), config(), sink, wallet);
        let p1 = Uuid::new_v4();
        let p2 = Uuid::new_v4();
        handle.command(p1, None, CommandPayload::JoinSeat { seat: 0, buy_in: 1000 }).await.unwrap();
        let result = handle.command(p2, None, CommandPayload::JoinSeat { seat: 0, buy_in: 1000 }).await;
        assert_eq!(result.unwrap_err(), CoreError::SeatTaken);
    }
}
