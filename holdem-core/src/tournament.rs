//! Tournament coordinator: multi-table lifecycle for one tournament.
//!
//! The teacher has no multi-table analogue (its program is one table per
//! account); this module is grounded instead on the same single-writer
//! mailbox pattern `table::actor` uses, reusing its
//! `tokio::sync::mpsc` + reply-`oneshot` shape so the two actors read the
//! same way side by side.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::{AuditRecord, AuditSink, OperationKind};
use crate::error::TournamentError;
use crate::player::Player;
use crate::table::actor::{SupervisorMessage, TableActor, TableHandle};
use crate::table::state::TableConfig;
use crate::wallet::Wallet;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RebalanceStrategy {
    /// Moves the fewest players necessary to even out seat counts.
    MinimizeMoves,
    /// Prefers moving the shortest stacks, to keep big stacks at the table
    /// they built up chips at.
    BalanceStacks,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TournamentConfig {
    pub starting_chips: u64,
    pub level_duration: Duration,
    pub min_players: u32,
    pub max_players: u32,
    pub seats_per_table: u8,
    pub small_blind: u64,
    pub big_blind: u64,
    pub rebalance_strategy: RebalanceStrategy,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TournamentPhase {
    Registering,
    Starting,
    InProgress,
    FinalTable,
    Finished,
    Cancelled,
}

#[derive(Clone, Debug)]
struct PlayerRecord {
    table_id: Option<Uuid>,
    chips: u64,
    eliminated: bool,
    finishing_position: Option<u32>,
}

struct TableEntry {
    handle: TableHandle,
    player_count: u32,
    feature_table: bool,
    created_order: u32,
    active: bool,
}

pub enum TournamentMessage {
    Register { player_id: Uuid, reply: oneshot::Sender<Result<(), TournamentError>> },
    Start { reply: oneshot::Sender<Result<(), TournamentError>> },
    PlayerEliminated { table_id: Uuid, player_id: Uuid, finishing_position: u32 },
    UpdateChipCount { player_id: Uuid, chips: u64 },
    Break { duration: Duration },
    Broadcast { text: String },
    TableFailure { table_id: Uuid, reason: String },
    Tick,
}

/// A cheaply-cloneable reference to a running tournament coordinator's inbox.
#[derive(Clone)]
pub struct TournamentHandle {
    pub tournament_id: Uuid,
    inbox: mpsc::Sender<TournamentMessage>,
}

impl TournamentHandle {
    pub async fn register(&self, player_id: Uuid) -> Result<(), TournamentError> {
        let (reply, rx) = oneshot::channel();
        let _ = self.inbox.send(TournamentMessage::Register { player_id, reply }).await;
        rx.await.unwrap_or(Err(TournamentError::TableNotFound))
    }

    pub async fn start(&self) -> Result<(), TournamentError> {
        let (reply, rx) = oneshot::channel();
        let _ = self.inbox.send(TournamentMessage::Start { reply }).await;
        rx.await.unwrap_or(Err(TournamentError::TableNotFound))
    }

    pub async fn player_eliminated(&self, table_id: Uuid, player_id: Uuid, finishing_position: u32) {
        let _ = self
            .inbox
            .send(TournamentMessage::PlayerEliminated { table_id, player_id, finishing_position })
            .await;
    }

    pub async fn update_chip_count(&self, player_id: Uuid, chips: u64) {
        let _ = self.inbox.send(TournamentMessage::UpdateChipCount { player_id, chips }).await;
    }

    pub async fn take_break(&self, duration: Duration) {
        let _ = self.inbox.send(TournamentMessage::Break { duration }).await;
    }

    pub async fn broadcast(&self, text: String) {
        let _ = self.inbox.send(TournamentMessage::Broadcast { text }).await;
    }

    pub async fn table_failure(&self, table_id: Uuid, reason: String) {
        let _ = self.inbox.send(TournamentMessage::TableFailure { table_id, reason }).await;
    }
}

pub struct TournamentCoordinator {
    id: Uuid,
    config: TournamentConfig,
    phase: TournamentPhase,
    tables: HashMap<Uuid, TableEntry>,
    players: HashMap<Uuid, PlayerRecord>,
    level: u32,
    next_level_deadline: Option<Instant>,
    break_deadline: Option<Instant>,
    total_chips: u64,
    next_created_order: u32,
    sink: Arc<dyn AuditSink>,
    wallet: Arc<dyn Wallet>,
}

impl TournamentCoordinator {
    pub fn spawn(config: TournamentConfig, sink: Arc<dyn AuditSink>, wallet: Arc<dyn Wallet>) -> TournamentHandle {
        let (tx, rx) = mpsc::channel(256);
        let id = Uuid::new_v4();
        let coordinator = TournamentCoordinator {
            id,
            config,
            phase: TournamentPhase::Registering,
            tables: HashMap::new(),
            players: HashMap::new(),
            level: 0,
            next_level_deadline: None,
            break_deadline: None,
            total_chips: 0,
            next_created_order: 0,
            sink,
            wallet,
        };
        tokio::spawn(coordinator.run(rx));
        TournamentHandle { tournament_id: id, inbox: tx }
    }

    async fn run(mut self, mut inbox: mpsc::Receiver<TournamentMessage>) {
        let mut ticker = tokio::time::interval(Duration::from_millis(500));
        loop {
            tokio::select! {
                msg = inbox.recv() => {
                    match msg {
                        Some(msg) => self.handle(msg).await,
                        None => break,
                    }
                }
                _ = ticker.tick() => {
                    self.handle(TournamentMessage::Tick).await;
                }
            }
            if self.phase == TournamentPhase::Finished || self.phase == TournamentPhase::Cancelled {
                break;
            }
        }
    }

    async fn handle(&mut self, msg: TournamentMessage) {
        match msg {
            TournamentMessage::Register { player_id, reply } => {
                let _ = reply.send(self.register(player_id).await);
            }
            TournamentMessage::Start { reply } => {
                let _ = reply.send(self.start().await);
            }
            TournamentMessage::PlayerEliminated { table_id, player_id, finishing_position } => {
                self.player_eliminated(table_id, player_id, finishing_position).await;
            }
            TournamentMessage::UpdateChipCount { player_id, chips } => {
                if let Some(rec) = self.players.get_mut(&player_id) {
                    rec.chips = chips;
                }
            }
            TournamentMessage::Break { duration } => self.take_break(duration).await,
            TournamentMessage::Broadcast { text } => self.broadcast_to_all(text).await,
            TournamentMessage::TableFailure { table_id, reason } => self.table_failure(table_id, reason).await,
            TournamentMessage::Tick => self.handle_tick().await,
        }
    }

    async fn handle_tick(&mut self) {
        if let Some(deadline) = self.break_deadline {
            if Instant::now() >= deadline {
                self.break_deadline = None;
                for entry in self.tables.values() {
                    if entry.active {
                        entry.handle.supervisor(SupervisorMessage::Resume).await;
                    }
                }
            }
            return;
        }
        if self.phase != TournamentPhase::InProgress && self.phase != TournamentPhase::FinalTable {
            return;
        }
        if let Some(deadline) = self.next_level_deadline {
            if Instant::now() >= deadline {
                self.level += 1;
                self.next_level_deadline = Some(Instant::now() + self.config.level_duration);
                for entry in self.tables.values() {
                    if entry.active {
                        entry.handle.supervisor(SupervisorMessage::LevelChange { level: self.level }).await;
                    }
                }
                info!(tournament_id = %self.id, level = self.level, "level advanced");
            }
        }
    }

    fn table_config_template(&self) -> TableConfig {
        TableConfig {
            small_blind: self.config.small_blind,
            big_blind: self.config.big_blind,
            ante: 0,
            min_buy_in: self.config.starting_chips,
            max_buy_in: self.config.starting_chips,
            max_seats: self.config.seats_per_table,
        }
    }

    fn table_with_space(&self) -> Option<Uuid> {
        self.tables
            .iter()
            .filter(|(_, e)| e.active && e.player_count < self.config.seats_per_table as u32)
            .min_by_key(|(_, e)| e.created_order)
            .map(|(id, _)| *id)
    }

    fn spawn_table(&mut self) -> Uuid {
        let handle = TableActor::spawn(Uuid::new_v4(), self.table_config_template(), self.sink.clone(), self.wallet.clone());
        let table_id = handle.table_id;
        let created_order = self.next_created_order;
        self.next_created_order += 1;
        self.tables.insert(
            table_id,
            TableEntry { handle, player_count: 0, feature_table: created_order == 0, created_order, active: true },
        );
        table_id
    }

    async fn register(&mut self, player_id: Uuid) -> Result<(), TournamentError> {
        if self.players.contains_key(&player_id) {
            return Err(TournamentError::DuplicateRegistration);
        }
        if matches!(self.phase, TournamentPhase::InProgress | TournamentPhase::FinalTable | TournamentPhase::Finished) {
            return Err(TournamentError::RegistrationClosed);
        }
        if self.players.len() as u32 >= self.config.max_players {
            return Err(TournamentError::TournamentFull);
        }

        let table_id = self.table_with_space().unwrap_or_else(|| self.spawn_table());
        let chips = self.config.starting_chips;
        let seat = self.tables[&table_id].player_count as u8;
        let entry = self.tables.get(&table_id).expect("just resolved");
        let _ = entry
            .handle
            .command(player_id, None, crate::table::actor::CommandPayload::JoinSeat { seat, buy_in: chips })
            .await;

        self.tables.get_mut(&table_id).unwrap().player_count += 1;
        self.players.insert(player_id, PlayerRecord { table_id: Some(table_id), chips, eliminated: false, finishing_position: None });
        self.total_chips += chips;
        Ok(())
    }

    async fn start(&mut self) -> Result<(), TournamentError> {
        if (self.players.len() as u32) < self.config.min_players {
            return Err(TournamentError::NotEnoughPlayers);
        }
        self.phase = TournamentPhase::InProgress;
        self.level = 1;
        self.next_level_deadline = Some(Instant::now() + self.config.level_duration);
        for entry in self.tables.values() {
            entry.handle.supervisor(SupervisorMessage::Resume).await;
        }
        info!(tournament_id = %self.id, players = self.players.len(), "tournament started");
        Ok(())
    }

    async fn take_break(&mut self, duration: Duration) {
        self.break_deadline = Some(Instant::now() + duration);
        for entry in self.tables.values() {
            if entry.active {
                entry.handle.supervisor(SupervisorMessage::Pause).await;
            }
        }
    }

    async fn broadcast_to_all(&self, text: String) {
        for entry in self.tables.values() {
            if entry.active {
                entry.handle.supervisor(SupervisorMessage::Announce { text: text.clone() }).await;
            }
        }
    }

    async fn player_eliminated(&mut self, table_id: Uuid, player_id: Uuid, finishing_position: u32) {
        if let Some(rec) = self.players.get_mut(&player_id) {
            rec.eliminated = true;
            rec.finishing_position = Some(finishing_position);
        }
        if let Some(entry) = self.tables.get_mut(&table_id) {
            entry.player_count = entry.player_count.saturating_sub(1);
        }
        self.rebalance().await;
    }

    async fn table_failure(&mut self, table_id: Uuid, reason: String) {
        warn!(tournament_id = %self.id, %table_id, %reason, "table reported failure, relocating its players");
        if let Some(entry) = self.tables.get_mut(&table_id) {
            entry.active = false;
        }
        let stranded: Vec<Uuid> = self
            .players
            .iter()
            .filter(|(_, r)| !r.eliminated && r.table_id == Some(table_id))
            .map(|(pid, _)| *pid)
            .collect();
        for player_id in stranded {
            let dest = self.table_with_space().unwrap_or_else(|| self.spawn_table());
            self.move_player(player_id, dest).await;
        }
    }

    fn active_table_ids_sorted(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self.tables.iter().filter(|(_, e)| e.active).map(|(id, _)| *id).collect();
        ids.sort_by_key(|id| self.tables[id].created_order);
        ids
    }

    /// Implements spec.md §4.7's table-balancing rule: consolidate to a
    /// final table once the field fits in one, otherwise move players one at
    /// a time until every active table's seat count is within 1 of the rest.
    async fn rebalance(&mut self) {
        let active = self.active_table_ids_sorted();
        if active.len() <= 1 {
            return;
        }
        let remaining: u32 = active.iter().map(|id| self.tables[id].player_count).sum();

        if remaining <= self.config.seats_per_table as u32 {
            self.consolidate_to_final_table(&active).await;
            return;
        }

        self.even_out_seat_counts(&active).await;
    }

    async fn consolidate_to_final_table(&mut self, active: &[Uuid]) {
        let destination = active
            .iter()
            .find(|id| self.tables[id].feature_table)
            .copied()
            .unwrap_or(active[0]);

        self.phase = TournamentPhase::FinalTable;
        info!(tournament_id = %self.id, %destination, "consolidating to final table");

        for &source in active {
            if source == destination {
                continue;
            }
            let players_here: Vec<Uuid> = self
                .players
                .iter()
                .filter(|(_, r)| !r.eliminated && r.table_id == Some(source))
                .map(|(pid, _)| *pid)
                .collect();
            for player_id in players_here {
                self.move_player(player_id, destination).await;
            }
            if let Some(entry) = self.tables.get_mut(&source) {
                entry.active = false;
                entry.handle.supervisor(SupervisorMessage::CloseTable { reason: "consolidated to final table".into() }).await;
            }
        }
    }

    async fn even_out_seat_counts(&mut self, active: &[Uuid]) {
        loop {
            let mut counts: Vec<(Uuid, u32)> = active.iter().map(|id| (*id, self.tables[id].player_count)).collect();
            counts.sort_by_key(|&(id, count)| (count, self.tables[&id].created_order));
            let Some(&(fewest_id, fewest)) = counts.first() else { return };
            let Some(&(most_id, most)) = counts.last() else { return };
            if most <= fewest + 1 {
                break;
            }

            let candidate = match self.config.rebalance_strategy {
                RebalanceStrategy::MinimizeMoves => self.any_player_at(most_id),
                RebalanceStrategy::BalanceStacks => self.shortest_stack_at(most_id),
            };
            let Some(player_id) = candidate else { break };
            self.move_player(player_id, fewest_id).await;
        }
    }

    fn any_player_at(&self, table_id: Uuid) -> Option<Uuid> {
        self.players
            .iter()
            .filter(|(_, r)| !r.eliminated && r.table_id == Some(table_id))
            .map(|(pid, _)| *pid)
            .next()
    }

    fn shortest_stack_at(&self, table_id: Uuid) -> Option<Uuid> {
        self.players
            .iter()
            .filter(|(_, r)| !r.eliminated && r.table_id == Some(table_id))
            .min_by_key(|(_, r)| r.chips)
            .map(|(pid, _)| *pid)
    }

    /// Moves one player between tables, preserving their chip count exactly.
    /// The source and destination receive independent messages on their own
    /// inboxes, matching §4.7's move protocol.
    async fn move_player(&mut self, player_id: Uuid, destination: Uuid) {
        let Some(record) = self.players.get(&player_id).cloned() else { return };
        let Some(source) = record.table_id else { return };
        if source == destination {
            return;
        }

        if let Some(entry) = self.tables.get(&source) {
            entry.handle.supervisor(SupervisorMessage::RemovePlayer { player_id }).await;
        }
        if let Some(entry) = self.tables.get_mut(&source) {
            entry.player_count = entry.player_count.saturating_sub(1);
        }

        if let Some(entry) = self.tables.get(&destination) {
            let player = Player::new(player_id, player_id.to_string(), 0, record.chips);
            entry.handle.supervisor(SupervisorMessage::MovePlayerHere { player }).await;
        }
        if let Some(entry) = self.tables.get_mut(&destination) {
            entry.player_count += 1;
        }

        if let Some(rec) = self.players.get_mut(&player_id) {
            rec.table_id = Some(destination);
        }

        self.sink.append_batch(
            destination,
            vec![AuditRecord {
                id: Uuid::new_v4(),
                operation: OperationKind::TableBalanceMove,
                table_id: destination,
                hand_id: None,
                timestamp_unix: unix_now(),
                entropy_bytes_consumed: 0,
                input_hash: None,
                output_hash: None,
                metadata: BTreeMap::from([("source_table".to_string(), source.to_string()), ("player_id".to_string(), player_id.to_string())]),
            }],
        );
    }
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

    fn config() -> TournamentConfig {
        TournamentConfig {
            starting_chips: 1000,
            level_duration: Duration::from_secs(600),
            min_players: 2,
            max_players: 20,
            seats_per_table: 3,
            small_blind: 10,
            big_blind: 20,
            rebalance_strategy: RebalanceStrategy::MinimizeMoves,
        }
    }

    #[tokio::test]
    async fn registering_past_max_players_is_rejected() {
        let sink = InMemoryAuditSink::new();
        let wallet: Arc<dyn Wallet> = Arc::new(NullWallet);
        let mut cfg = config();
        cfg.max_players = 1;
        let handle = TournamentCoordinator::spawn(cfg, sink, wallet);
        handle.register(Uuid::new_v4()).await.unwrap();
        let err = handle.register(Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err, TournamentError::TournamentFull);
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let sink = InMemoryAuditSink::new();
        let wallet: Arc<dyn Wallet> = Arc::new(NullWallet);
        let handle = TournamentCoordinator::spawn(config(), sink, wallet);
        let player = Uuid::new_v4();
        handle.register(player).await.unwrap();
        let err = handle.register(player).await.unwrap_err();
        assert_eq!(err, TournamentError::DuplicateRegistration);
    }

    #[tokio::test]
    async fn starting_below_min_players_is_rejected() {
        let sink = InMemoryAuditSink::new();
        let wallet: Arc<dyn Wallet> = Arc::new(NullWallet);
        let handle = TournamentCoordinator::spawn(config(), sink, wallet);
        handle.register(Uuid::new_v4()).await.unwrap();
        let err = handle.start().await.unwrap_err();
        assert_eq!(err, TournamentError::NotEnoughPlayers);
    }

    #[tokio::test]
    async fn registration_fills_first_table_before_opening_a_second() {
        let sink = InMemoryAuditSink::new();
        let wallet: Arc<dyn Wallet> = Arc::new(NullWallet);
        let handle = TournamentCoordinator::spawn(config(), sink, wallet);
        for _ in 0..3 {
            handle.register(Uuid::new_v4()).await.unwrap();
        }
        handle.register(Uuid::new_v4()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
