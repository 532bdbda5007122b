//! One WebSocket session: a player's duplex connection to the server.
//!
//! Mirrors the table actor's shape — a struct owning its own state plus an
//! outbound queue, driven by whatever transport loop (axum's WebSocket
//! split sink/stream, in `holdem-server::ws`) pumps frames in and out. The
//! session itself never touches a socket; it only knows `mpsc` queues and
//! the `TableRegistry`.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use holdem_core::error::CoreError;
use holdem_core::events::TableEvent;
use holdem_core::table::actor::CommandPayload;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use crate::error::SessionError;
use crate::idempotency::{CoalescedOutcome, DedupeStrategy, IdempotencyCache, MergeStrategy, Outcome};
use crate::protocol::{ClientMessage, ClientPayload, ServerMessage, ServerPayload};
use crate::registry::TableRegistry;

/// Default bound on a session's outbound queue before it is treated as a
/// slow consumer and disconnected.
pub const DEFAULT_SEND_QUEUE_CAPACITY: usize = 256;
/// Default interval between server-initiated heartbeat frames.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);
/// Default cap on requests folded into a single coalesced batch.
pub const DEFAULT_MAX_COALESCE_BATCH_SIZE: usize = 64;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandOutcome(pub Result<(), (String, String)>);

impl Outcome for CommandOutcome {
    fn is_cacheable(&self) -> bool {
        self.0.is_ok()
    }
}

impl From<Result<holdem_core::table::actor::CommandResponse, CoreError>> for CommandOutcome {
    fn from(result: Result<holdem_core::table::actor::CommandResponse, CoreError>) -> Self {
        CommandOutcome(result.map(|_| ()).map_err(|e| (e.code().to_string(), e.to_string())))
    }
}

/// Verifies a bearer token and resolves it to a stable player identity.
/// `holdem-server` supplies the concrete implementation (JWT, opaque
/// token lookup, whatever the deployment uses); the session layer only
/// needs the trait.
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, bearer_token: &str) -> Result<Uuid, SessionError>;
}

#[derive(Clone)]
pub struct SessionConfig {
    pub send_queue_capacity: usize,
    pub heartbeat_interval: Duration,
    pub bypass_header_value: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            send_queue_capacity: DEFAULT_SEND_QUEUE_CAPACITY,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            bypass_header_value: None,
        }
    }
}

/// A connected client, bound to a single player identity, able to touch
/// multiple tables over its lifetime (one join per table at a time).
pub struct Session {
    pub session_id: Uuid,
    pub player_id: Uuid,
    pub config: SessionConfig,
    outbound: mpsc::Sender<ServerMessage>,
    registry: Arc<TableRegistry>,
    idempotency: Arc<IdempotencyCache<CommandOutcome>>,
    /// Last filtered view broadcast per table, replayed verbatim on
    /// reconnect so a client that dropped and rejoined does not miss the
    /// table's current shape.
    last_snapshot: Arc<DashMap<Uuid, ServerPayload>>,
}

impl Session {
    pub fn new(
        player_id: Uuid,
        registry: Arc<TableRegistry>,
        idempotency: Arc<IdempotencyCache<CommandOutcome>>,
        config: SessionConfig,
    ) -> (Self, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(config.send_queue_capacity);
        let session = Session {
            session_id: Uuid::new_v4(),
            player_id,
            config,
            outbound: tx,
            registry,
            idempotency,
            last_snapshot: Arc::new(DashMap::new()),
        };
        (session, rx)
    }

    /// Attempts to enqueue `msg` for delivery. A full queue means the
    /// client is not draining fast enough; per spec the session is torn
    /// down rather than letting the queue grow unbounded.
    pub fn try_send(&self, msg: ServerMessage) -> Result<(), SessionError> {
        self.outbound.try_send(msg).map_err(|_| SessionError::SlowConsumer)
    }

    /// Replays the last known snapshot for a table a reconnecting client
    /// re-subscribes to, so it does not have to wait for the next natural
    /// state-delta broadcast to see where the hand stands.
    pub fn replay_snapshot(&self, table_id: Uuid) -> Option<ServerMessage> {
        let payload = self.last_snapshot.get(&table_id)?.clone();
        Some(ServerMessage::new(payload, unix_now(), None))
    }

    pub async fn bind_to_table(&self, table_id: Uuid) -> Result<(), SessionError> {
        let handle = self.registry.table(table_id).ok_or(SessionError::TableNotFound)?;
        handle.session_bind(self.player_id, self.outbound_for_events(table_id)).await;
        self.registry.bind_player(self.player_id, table_id);
        Ok(())
    }

    pub async fn unbind_from_table(&self, table_id: Uuid) {
        if let Some(handle) = self.registry.table(table_id) {
            handle.session_unbind(self.player_id).await;
        }
        self.registry.unbind_player(self.player_id);
    }

    /// A translating sender so the table actor's `TableEvent`s land on this
    /// session's `ServerMessage` queue without the actor knowing the wire
    /// format exists.
    fn outbound_for_events(&self, table_id: Uuid) -> mpsc::Sender<TableEvent> {
        let (tx, mut rx) = mpsc::channel::<TableEvent>(self.config.send_queue_capacity);
        let outbound = self.outbound.clone();
        let last_snapshot = self.last_snapshot.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let payload = ServerPayload::from(event);
                if matches!(payload, ServerPayload::StateUpdate { .. }) {
                    last_snapshot.insert(table_id, payload.clone());
                }
                let msg = ServerMessage::new(payload, unix_now(), None);
                if outbound.send(msg).await.is_err() {
                    break;
                }
            }
        });
        tx
    }

    /// Routes one client frame: resolves the target table, runs the
    /// command through the idempotency cache, and enqueues a direct reply
    /// only on rejection — a successful command's effect reaches the
    /// client through the table actor's broadcast instead.
    pub async fn handle_client_message(
        &self,
        msg: ClientMessage,
        strategy: DedupeStrategy,
        merge: MergeStrategy,
    ) -> Result<(), SessionError> {
        let bypass = self.config.bypass_header_value.is_some();
        let correlation_id = msg.correlation_id.clone();

        match msg.payload {
            ClientPayload::Heartbeat => {
                let reply = ServerMessage::new(ServerPayload::Heartbeat, unix_now(), correlation_id);
                let _ = self.try_send(reply);
                Ok(())
            }
            ClientPayload::JoinTable { table_id, seat, buy_in } => {
                if let Err(e) = self.bind_to_table(table_id).await {
                    let reply = ServerMessage::new(
                        ServerPayload::Error { code: e.code().to_string(), message: e.to_string(), details: e.details() },
                        unix_now(),
                        correlation_id,
                    );
                    let _ = self.try_send(reply);
                    return Ok(());
                }
                let outcome = self
                    .run_command(
                        table_id,
                        msg.idempotency_key.as_deref(),
                        strategy,
                        merge,
                        bypass,
                        CommandPayload::JoinSeat { seat, buy_in },
                    )
                    .await;
                self.reply_on_error(outcome, correlation_id);
                Ok(())
            }
            ClientPayload::LeaveTable { table_id } => {
                let outcome = self
                    .run_command(
                        table_id,
                        msg.idempotency_key.as_deref(),
                        strategy,
                        merge,
                        bypass,
                        CommandPayload::Leave,
                    )
                    .await;
                self.reply_on_error(outcome, correlation_id);
                self.unbind_from_table(table_id).await;
                Ok(())
            }
            ClientPayload::PlayerAction { table_id, action } => {
                let outcome = self
                    .run_command(
                        table_id,
                        msg.idempotency_key.as_deref(),
                        strategy,
                        merge,
                        bypass,
                        CommandPayload::PlayerAction { action },
                    )
                    .await;
                self.reply_on_error(outcome, correlation_id);
                Ok(())
            }
            ClientPayload::Chat { table_id, text } => {
                let outcome = self
                    .run_command(
                        table_id,
                        msg.idempotency_key.as_deref(),
                        strategy,
                        merge,
                        bypass,
                        CommandPayload::Chat { text },
                    )
                    .await;
                self.reply_on_error(outcome, correlation_id);
                Ok(())
            }
        }
    }

    async fn run_command(
        &self,
        table_id: Uuid,
        idempotency_key: Option<&str>,
        strategy: DedupeStrategy,
        merge: MergeStrategy,
        bypass: bool,
        payload: CommandPayload,
    ) -> CoalescedOutcome<CommandOutcome> {
        let registry = self.registry.clone();
        let player_id = self.player_id;
        let key = idempotency_key.map(|k| format!("{table_id}:{player_id}:{k}"));

        self.idempotency
            .execute(key.as_deref(), strategy, merge, bypass, move || {
                let registry = registry.clone();
                let payload = clone_payload(&payload);
                async move {
                    let Some(handle) = registry.table(table_id) else {
                        return CommandOutcome(Err((
                            "table_not_found".to_string(),
                            "no table registered with that id".to_string(),
                        )));
                    };
                    let result = handle.command(player_id, None, payload).await;
                    CommandOutcome::from(result)
                }
            })
            .await
    }

    fn reply_on_error(&self, outcome: CoalescedOutcome<CommandOutcome>, correlation_id: Option<String>) {
        if let Err((code, message)) = outcome.result.0 {
            let reply = ServerMessage::new(
                ServerPayload::Error { code, message, details: Default::default() },
                unix_now(),
                correlation_id,
            );
            if self.try_send(reply).is_err() {
                warn!(session_id = %self.session_id, "dropped error reply, send queue full");
            }
        }
    }
}

/// `CommandPayload` isn't `Clone` (it borrows nothing that would need it
/// elsewhere), but the idempotency closure needs an owned copy per retry
/// inside the coalescing loop, so build one by hand.
fn clone_payload(payload: &CommandPayload) -> CommandPayload {
    match payload {
        CommandPayload::JoinSeat { seat, buy_in } => CommandPayload::JoinSeat { seat: *seat, buy_in: *buy_in },
        CommandPayload::StandUp => CommandPayload::StandUp,
        CommandPayload::SitOut => CommandPayload::SitOut,
        CommandPayload::SitIn => CommandPayload::SitIn,
        CommandPayload::PlayerAction { action } => CommandPayload::PlayerAction { action: action.clone() },
        CommandPayload::Chat { text } => CommandPayload::Chat { text: text.clone() },
        CommandPayload::Leave => CommandPayload::Leave,
    }
}

fn unix_now() -> i64 {
    use std::time::SystemTime;
    SystemTime::now().duration_since(SystemTime::UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn slow_consumer_is_reported_instead_of_blocking() {
        let registry = Arc::new(TableRegistry::new());
        let idempotency = Arc::new(IdempotencyCache::new(Duration::from_secs(60), Duration::from_millis(100), 8));
        let config = SessionConfig { send_queue_capacity: 1, ..Default::default() };
        let (session, mut rx) = Session::new(Uuid::new_v4(), registry, idempotency, config);

        session.try_send(ServerMessage::new(ServerPayload::Heartbeat, 0, None)).unwrap();
        let overflow = session.try_send(ServerMessage::new(ServerPayload::Heartbeat, 0, None));
        assert_eq!(overflow, Err(SessionError::SlowConsumer));

        rx.recv().await;
    }

    #[tokio::test]
    async fn join_unknown_table_replies_with_table_not_found_error() {
        let registry = Arc::new(TableRegistry::new());
        let idempotency = Arc::new(IdempotencyCache::new(Duration::from_secs(60), Duration::from_millis(100), 8));
        let (session, mut rx) = Session::new(Uuid::new_v4(), registry, idempotency, SessionConfig::default());

        let table_id = Uuid::new_v4();
        let msg = ClientMessage {
            payload: ClientPayload::JoinTable { table_id, seat: 0, buy_in: 1000 },
            timestamp: 0,
            id: None,
            seq: None,
            idempotency_key: None,
            correlation_id: Some("corr-1".into()),
            state_version: None,
        };

        session.handle_client_message(msg, DedupeStrategy::Both, MergeStrategy::First).await.unwrap();
        let reply = rx.recv().await.expect("an error reply is enqueued");
        match reply.payload {
            ServerPayload::Error { code, .. } => assert_eq!(code, "table_not_found"),
            other => panic!("expected error, got {other:?}"),
        }
        assert_eq!(reply.correlation_id.as_deref(), Some("corr-1"));
    }
}
