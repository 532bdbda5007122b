//! Wire envelope for the client protocol (spec §6).
//!
//! The teacher serialises on-chain instruction args with
//! `AnchorSerialize`/`AnchorDeserialize`; off a blockchain there is no
//! instruction discriminator to lean on, so the envelope here is a plain
//! `serde` tagged union over a JSON/WebSocket text frame.

use std::collections::BTreeMap;

use holdem_core::betting::{Action, ShowdownResult};
use holdem_core::card::Card;
use holdem_core::events::{TableEvent, TableView};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientPayload {
    JoinTable { table_id: Uuid, seat: u8, buy_in: u64 },
    LeaveTable { table_id: Uuid },
    PlayerAction { table_id: Uuid, action: Action },
    Chat { table_id: Uuid, text: String },
    Heartbeat,
}

/// One client→server frame: the envelope fields from §6 plus the tagged
/// payload itself, flattened into the same JSON object.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientMessage {
    #[serde(flatten)]
    pub payload: ClientPayload,
    pub timestamp: i64,
    pub id: Option<String>,
    pub seq: Option<u64>,
    pub idempotency_key: Option<String>,
    pub correlation_id: Option<String>,
    pub state_version: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerPayload {
    ConnectionAck { session_id: Uuid, heartbeat_interval_ms: u64 },
    StateUpdate { view: TableView },
    HandStarted { hand_id: Uuid, button: u8, small_blind: u8, big_blind: u8, commitment_hash: [u8; 32] },
    HandCompleted {
        hand_id: Uuid,
        result: ShowdownResult,
        revealed_hole_cards: BTreeMap<u8, [Card; 2]>,
        deck_reveal_hash: [u8; 32],
    },
    PlayerJoined { seat: u8, player_id: Uuid },
    PlayerLeft { seat: u8, player_id: Uuid },
    Chat { player_id: Uuid, text: String },
    Error { code: String, message: String, details: BTreeMap<String, String> },
    Heartbeat,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerMessage {
    #[serde(flatten)]
    pub payload: ServerPayload,
    pub timestamp: i64,
    pub correlation_id: Option<String>,
}

impl ServerMessage {
    pub fn new(payload: ServerPayload, timestamp: i64, correlation_id: Option<String>) -> Self {
        ServerMessage { payload, timestamp, correlation_id }
    }
}

impl From<TableEvent> for ServerPayload {
    fn from(event: TableEvent) -> Self {
        match event {
            TableEvent::StateUpdate { view } => ServerPayload::StateUpdate { view },
            TableEvent::HandStarted { hand_id, button, small_blind, big_blind, commitment_hash } => {
                ServerPayload::HandStarted { hand_id, button, small_blind, big_blind, commitment_hash }
            }
            TableEvent::HandCompleted { hand_id, result, revealed_hole_cards, deck_reveal_hash } => {
                ServerPayload::HandCompleted { hand_id, result, revealed_hole_cards, deck_reveal_hash }
            }
            TableEvent::PlayerJoined { seat, player_id } => ServerPayload::PlayerJoined { seat, player_id },
            TableEvent::PlayerLeft { seat, player_id } => ServerPayload::PlayerLeft { seat, player_id },
            TableEvent::Chat { player_id, text } => ServerPayload::Chat { player_id, text },
            TableEvent::Error { code, message, details } => {
                ServerPayload::Error { code: code.to_string(), message, details }
            }
            TableEvent::TableClosed { reason } => ServerPayload::Error {
                code: "table_closed".to_string(),
                message: reason,
                details: BTreeMap::new(),
            },
            TableEvent::Heartbeat => ServerPayload::Heartbeat,
            TableEvent::ConnectionAck { session_id, heartbeat_interval_ms } => {
                ServerPayload::ConnectionAck { session_id, heartbeat_interval_ms }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_message_round_trips_through_json() {
        let msg = ClientMessage {
            payload: ClientPayload::PlayerAction { table_id: Uuid::new_v4(), action: Action::Check },
            timestamp: 0,
            id: None,
            seq: Some(1),
            idempotency_key: Some("abc".into()),
            correlation_id: None,
            state_version: None,
        };
        let json = serde_json::to_string(&msg).unwrap();
        let back: ClientMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back.seq, Some(1));
        assert!(matches!(back.payload, ClientPayload::PlayerAction { .. }));
    }

    #[test]
    fn unknown_type_fails_to_parse_as_a_client_message() {
        let json = r#"{"type":"not_a_real_type","timestamp":0}"#;
        assert!(serde_json::from_str::<ClientMessage>(json).is_err());
    }
}
