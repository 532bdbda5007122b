//! Table state: the data a single table actor owns exclusively.
//!
//! Generalized from the teacher's `state/table.rs` (`Table`) and
//! `state/hand.rs` (`HandState`), merged into one struct since this crate
//! has no account-size budget forcing them apart, and widened from a
//! seat-occupancy bitmap to a `Vec<Option<Player>>` so `max_seats` is not
//! capped at 8 (the teacher's `u8` bitmap only ever needed 6).

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::card::Card;
use crate::player::Player;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Waiting,
    PreFlop,
    Flop,
    Turn,
    River,
    Showdown,
    Finished,
}

impl Phase {
    pub fn next(self) -> Phase {
        match self {
            Phase::Waiting => Phase::PreFlop,
            Phase::PreFlop => Phase::Flop,
            Phase::Flop => Phase::Turn,
            Phase::Turn => Phase::River,
            Phase::River => Phase::Showdown,
            Phase::Showdown => Phase::Finished,
            Phase::Finished => Phase::Waiting,
        }
    }

    pub fn is_betting_phase(self) -> bool {
        matches!(self, Phase::PreFlop | Phase::Flop | Phase::Turn | Phase::River)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TableConfig {
    pub small_blind: u64,
    pub big_blind: u64,
    pub ante: u64,
    pub min_buy_in: u64,
    pub max_buy_in: u64,
    pub max_seats: u8,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SidePot {
    pub amount: u64,
    pub eligible_seats: BTreeSet<u8>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TableState {
    pub table_id: Uuid,
    pub config: TableConfig,
    pub seats: Vec<Option<Player>>,
    pub dealer_seat: Option<u8>,
    pub small_blind_seat: Option<u8>,
    pub big_blind_seat: Option<u8>,
    pub phase: Phase,
    pub pot: u64,
    pub side_pots: Vec<SidePot>,
    pub current_bet: u64,
    pub min_raise: u64,
    pub community_cards: Vec<Card>,
    pub active_player: Option<u8>,
    pub hand_number: u64,
}

impl TableState {
    pub fn new(table_id: Uuid, config: TableConfig) -> Self {
        let max_seats = config.max_seats as usize;
        TableState {
            table_id,
            config,
            seats: vec![None; max_seats],
            dealer_seat: None,
            small_blind_seat: None,
            big_blind_seat: None,
            phase: Phase::Waiting,
            pot: 0,
            side_pots: Vec::new(),
            current_bet: 0,
            min_raise: 0,
            community_cards: Vec::new(),
            active_player: None,
            hand_number: 0,
        }
    }

    pub fn player(&self, seat: u8) -> Option<&Player> {
        self.seats.get(seat as usize).and_then(|s| s.as_ref())
    }

    pub fn player_mut(&mut self, seat: u8) -> Option<&mut Player> {
        self.seats.get_mut(seat as usize).and_then(|s| s.as_mut())
    }

    pub fn occupied_seats(&self) -> impl Iterator<Item = (u8, &Player)> {
        self.seats
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.as_ref().map(|p| (i as u8, p)))
    }

    pub fn find_empty_seat(&self) -> Option<u8> {
        self.seats.iter().position(|s| s.is_none()).map(|i| i as u8)
    }

    /// Non-folded, not-yet-settled players still in the current hand.
    pub fn players_in_hand(&self) -> Vec<u8> {
        self.occupied_seats().filter(|(_, p)| !p.folded).map(|(i, _)| i).collect()
    }

    pub fn reset_betting_round(&mut self) {
        self.current_bet = 0;
        for (_, player) in self.seats.iter_mut().enumerate().filter_map(|(i, p)| p.as_mut().map(|p| (i, p))) {
            player.reset_for_betting_round();
        }
    }

    /// Total of everyone's current live stack plus the main pot and any
    /// side pots. Invariant checked at every broadcast per spec.md §8.
    pub fn total_chips_in_play(&self) -> u64 {
        let stacks: u64 = self.occupied_seats().map(|(_, p)| p.chips).sum();
        let side: u64 = self.side_pots.iter().map(|s| s.amount).sum();
        stacks + self.pot + side
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> TableConfig {
        TableConfig { small_blind: 10, big_blind: 20, ante: 0, min_buy_in: 200, max_buy_in: 2000, max_seats: 6 }
    }

    #[test]
    fn new_table_has_empty_seats() {
        let t = TableState::new(Uuid::new_v4(), config());
        assert_eq!(t.seats.len(), 6);
        assert_eq!(t.find_empty_seat(), Some(0));
    }

    #[test]
    fn phase_advances_in_order() {
        assert_eq!(Phase::Waiting.next(), Phase::PreFlop);
        assert_eq!(Phase::River.next(), Phase::Showdown);
        assert_eq!(Phase::Showdown.next(), Phase::Finished);
        assert_eq!(Phase::Finished.next(), Phase::Waiting);
    }
}
