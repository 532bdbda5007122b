//! Domain events a table actor fans out to its bound sessions.
//!
//! The teacher emits on-chain `#[event]` logs (`events::HandCompleted`).
//! Off-chain there is no transaction log to index, so the table actor
//! instead produces these directly and the session layer (see
//! `holdem-session::protocol`) maps them onto the wire envelope described
//! in spec.md §6.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::betting::ShowdownResult;
use crate::card::Card;
use crate::error::CoreError;
use crate::rng::Commitment;
use crate::table::state::{Phase, TableState};

/// A filtered view of table state for one recipient: other players' hole
/// cards are replaced by a card-back marker until showdown.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TableView {
    pub table_id: Uuid,
    pub hand_number: u64,
    pub phase: Phase,
    pub pot: u64,
    pub current_bet: u64,
    pub community_cards: Vec<Card>,
    pub active_player: Option<u8>,
    pub dealer_seat: Option<u8>,
    pub seats: Vec<Option<SeatView>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SeatView {
    pub player_id: Uuid,
    pub display_name: String,
    pub chips: u64,
    pub current_bet: u64,
    pub folded: bool,
    pub all_in: bool,
    /// `Some` only for the recipient's own seat, or any seat at showdown.
    pub hole_cards: Option<[Card; 2]>,
}

/// Builds a `TableView` filtered for `recipient`: the recipient's own hole
/// cards (and everyone's, at/after showdown) are visible; every other
/// player's are not.
pub fn view_for(state: &TableState, recipient: Uuid) -> TableView {
    let reveal_all = matches!(state.phase, Phase::Showdown | Phase::Finished);
    TableView {
        table_id: state.table_id,
        hand_number: state.hand_number,
        phase: state.phase,
        pot: state.pot,
        current_bet: state.current_bet,
        community_cards: state.community_cards.clone(),
        active_player: state.active_player,
        dealer_seat: state.dealer_seat,
        seats: state
            .seats
            .iter()
            .map(|slot| {
                slot.as_ref().map(|p| SeatView {
                    player_id: p.id,
                    display_name: p.display_name.clone(),
                    chips: p.chips,
                    current_bet: p.current_bet,
                    folded: p.folded,
                    all_in: p.all_in,
                    hole_cards: if reveal_all || p.id == recipient { p.hole_cards } else { None },
                })
            })
            .collect(),
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum TableEvent {
    StateUpdate { view: TableView },
    HandStarted { hand_id: Uuid, button: u8, small_blind: u8, big_blind: u8, commitment_hash: [u8; 32] },
    HandCompleted { hand_id: Uuid, result: ShowdownResult, revealed_hole_cards: BTreeMap<u8, [Card; 2]>, deck_reveal_hash: [u8; 32] },
    PlayerJoined { seat: u8, player_id: Uuid },
    PlayerLeft { seat: u8, player_id: Uuid },
    Chat { player_id: Uuid, text: String },
    Error { code: &'static str, message: String, details: BTreeMap<String, String> },
    TableClosed { reason: String },
    Heartbeat,
    ConnectionAck { session_id: Uuid, heartbeat_interval_ms: u64 },
}

impl From<CoreError> for TableEvent {
    fn from(err: CoreError) -> Self {
        TableEvent::Error { code: err.code(), message: err.to_string(), details: err.details() }
    }
}

/// A single published commitment, surfaced alongside `HandStarted`.
pub fn commitment_hash(commitment: &Commitment) -> [u8; 32] {
    commitment.hash
}
