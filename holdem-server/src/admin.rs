//! Minimal operator surface for bringing a table actor into existence.
//!
//! The client protocol (spec §6) only covers what a seated player does at
//! a table that already exists; something still has to create the table
//! in the first place. The teacher's on-chain program has an explicit
//! `create_table` instruction for this; here it is a plain authenticated
//! REST endpoint rather than another WebSocket message type, since it is
//! an operator action, not a player one.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use holdem_core::audit::InMemoryAuditSink;
use holdem_core::table::actor::TableActor;
use holdem_core::table::state::TableConfig;
use holdem_core::wallet::NullWallet;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ws::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateTableRequest {
    pub small_blind: u64,
    pub big_blind: u64,
    #[serde(default)]
    pub ante: u64,
    pub min_buy_in: u64,
    pub max_buy_in: u64,
    #[serde(default = "default_max_seats")]
    pub max_seats: u8,
}

fn default_max_seats() -> u8 {
    9
}

#[derive(Debug, Serialize)]
pub struct CreateTableResponse {
    pub table_id: Uuid,
}

pub async fn create_table(State(state): State<AppState>, Json(req): Json<CreateTableRequest>) -> Json<CreateTableResponse> {
    let table_id = Uuid::new_v4();
    let config = TableConfig {
        small_blind: req.small_blind,
        big_blind: req.big_blind,
        ante: req.ante,
        min_buy_in: req.min_buy_in,
        max_buy_in: req.max_buy_in,
        max_seats: req.max_seats,
    };

    // Each table runs against its own audit sink and an unlimited-faucet
    // wallet until a real ledger service is wired in (see DESIGN.md).
    let sink = InMemoryAuditSink::new();
    let wallet: Arc<dyn holdem_core::wallet::Wallet> = Arc::new(NullWallet);
    let handle = TableActor::spawn(table_id, config, sink, wallet);
    state.registry.register_table(handle);

    Json(CreateTableResponse { table_id })
}
