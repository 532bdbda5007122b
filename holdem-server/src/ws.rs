//! The WebSocket upgrade handler: wires one axum connection to a
//! `holdem_session::Session`, which in turn talks to table actors through
//! the shared `TableRegistry`.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use holdem_session::idempotency::{DedupeStrategy, IdempotencyCache, MergeStrategy};
use holdem_session::protocol::{ClientMessage, ServerMessage, ServerPayload};
use holdem_session::session::{CommandOutcome, Session, SessionConfig, TokenVerifier};
use holdem_session::registry::TableRegistry;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<TableRegistry>,
    pub idempotency: Arc<IdempotencyCache<CommandOutcome>>,
    pub verifier: Arc<dyn TokenVerifier>,
    pub session_config: SessionConfig,
    pub heartbeat_interval: Duration,
}

impl AppState {
    pub fn new(config: &Config, registry: Arc<TableRegistry>, verifier: Arc<dyn TokenVerifier>) -> Self {
        AppState {
            registry,
            idempotency: Arc::new(IdempotencyCache::new(
                config.idempotency_ttl(),
                config.coalesce_window(),
                config.max_coalesce_batch_size,
            )),
            verifier,
            session_config: SessionConfig {
                send_queue_capacity: config.send_queue_capacity,
                heartbeat_interval: config.heartbeat_interval(),
                bypass_header_value: None,
            },
            heartbeat_interval: config.heartbeat_interval(),
        }
    }
}

/// An always-accept verifier for local development, where no real identity
/// provider is wired in front of the server yet.
pub struct DevTokenVerifier;

impl TokenVerifier for DevTokenVerifier {
    fn verify(&self, bearer_token: &str) -> Result<Uuid, holdem_session::SessionError> {
        Uuid::parse_str(bearer_token).map_err(|_| holdem_session::SessionError::MalformedToken)
    }
}

#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    /// Bearer token carried as a query param since `WebSocketUpgrade` has no
    /// header-rewriting hook browsers can drive without a JS `Authorization`
    /// header on the handshake request.
    pub token: String,
    /// Present when this is the client's dedupe/coalesce bypass request.
    #[serde(default)]
    pub bypass: bool,
}

pub async fn upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<ConnectQuery>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query))
}

async fn handle_socket(socket: WebSocket, state: AppState, query: ConnectQuery) {
    let player_id = match state.verifier.verify(&query.token) {
        Ok(id) => id,
        Err(e) => {
            warn!(error = %e, "rejected connection: invalid bearer token");
            return;
        }
    };

    let mut session_config = state.session_config.clone();
    if query.bypass {
        session_config.bypass_header_value = Some("true".to_string());
    }

    let (session, mut outbound_rx) = Session::new(player_id, state.registry.clone(), state.idempotency.clone(), session_config);
    let session = Arc::new(session);
    info!(session_id = %session.session_id, %player_id, "session connected");

    let (mut ws_sink, mut ws_stream) = socket.split();

    let ack = ServerMessage::new(
        ServerPayload::ConnectionAck {
            session_id: session.session_id,
            heartbeat_interval_ms: state.heartbeat_interval.as_millis() as u64,
        },
        unix_now(),
        None,
    );
    if let Err(e) = send_json(&mut ws_sink, &ack).await {
        warn!(error = %e, "failed to send connection_ack");
        return;
    }

    let mut heartbeat = tokio::time::interval(state.heartbeat_interval);

    loop {
        tokio::select! {
            Some(outgoing) = outbound_rx.recv() => {
                if send_json(&mut ws_sink, &outgoing).await.is_err() {
                    break;
                }
            }
            _ = heartbeat.tick() => {
                let beat = ServerMessage::new(ServerPayload::Heartbeat, unix_now(), None);
                if send_json(&mut ws_sink, &beat).await.is_err() {
                    break;
                }
            }
            incoming = ws_stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(e) = dispatch_text(&session, &text).await {
                            warn!(session_id = %session.session_id, error = %e, "failed to handle client frame");
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // binary/ping/pong frames carry no protocol meaning here
                    Some(Err(e)) => {
                        warn!(session_id = %session.session_id, error = %e, "websocket error");
                        break;
                    }
                }
            }
        }
    }

    info!(session_id = %session.session_id, %player_id, "session disconnected");
}

async fn dispatch_text(session: &Arc<Session>, text: &str) -> anyhow::Result<()> {
    let msg: ClientMessage = serde_json::from_str(text).map_err(|e| anyhow::anyhow!("{e}"))?;
    session
        .handle_client_message(msg, DedupeStrategy::Both, MergeStrategy::Merge)
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))
}

async fn send_json<S>(sink: &mut S, msg: &ServerMessage) -> anyhow::Result<()>
where
    S: futures::Sink<Message> + Unpin,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    let text = serde_json::to_string(msg)?;
    sink.send(Message::Text(text)).await?;
    Ok(())
}

fn unix_now() -> i64 {
    use std::time::SystemTime;
    SystemTime::now().duration_since(SystemTime::UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
}
