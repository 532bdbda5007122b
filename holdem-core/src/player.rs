//! A seated player's persistent and per-hand state.
//!
//! Generalized from the teacher's `state/player.rs` `PlayerSeat`: chips are
//! a plain `u64` instead of lamports in a token vault, hole cards are
//! `Card`s instead of Inco ciphertext handles, and a `PlayerStatus` now also
//! distinguishes `Disconnected`/`Eliminated` per spec.md §3.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::card::Card;
use crate::constants::DEFAULT_TIME_BANK;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerStatus {
    Active,
    SittingOut,
    Disconnected,
    Eliminated,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Player {
    pub id: Uuid,
    pub display_name: String,
    pub seat_index: u8,
    pub chips: u64,
    pub current_bet: u64,
    pub total_bet_this_hand: u64,
    pub has_acted: bool,
    pub folded: bool,
    pub all_in: bool,
    pub status: PlayerStatus,
    pub time_bank_remaining: Duration,
    pub hole_cards: Option<[Card; 2]>,
    pub disconnected_at_unix: Option<i64>,
}

impl Player {
    pub fn new(id: Uuid, display_name: String, seat_index: u8, chips: u64) -> Self {
        Player {
            id,
            display_name,
            seat_index,
            chips,
            current_bet: 0,
            total_bet_this_hand: 0,
            has_acted: false,
            folded: false,
            all_in: false,
            status: PlayerStatus::Active,
            time_bank_remaining: DEFAULT_TIME_BANK,
            hole_cards: None,
            disconnected_at_unix: None,
        }
    }

    pub fn reset_for_new_hand(&mut self) {
        self.current_bet = 0;
        self.total_bet_this_hand = 0;
        self.has_acted = false;
        self.folded = false;
        self.all_in = false;
        self.hole_cards = None;
        self.time_bank_remaining = DEFAULT_TIME_BANK;
    }

    pub fn reset_for_betting_round(&mut self) {
        self.current_bet = 0;
        self.has_acted = false;
    }

    /// Places a bet, capping at the player's remaining stack and flipping
    /// `all_in` when the stack hits zero. Returns the amount actually bet.
    pub fn place_bet(&mut self, amount: u64) -> u64 {
        let actual = amount.min(self.chips);
        self.chips -= actual;
        self.current_bet += actual;
        self.total_bet_this_hand += actual;
        if self.chips == 0 {
            self.all_in = true;
        }
        actual
    }

    pub fn award_chips(&mut self, amount: u64) {
        self.chips += amount;
    }

    pub fn fold(&mut self) {
        self.folded = true;
    }

    pub fn can_act(&self) -> bool {
        !self.folded && !self.all_in
    }

    /// Active-and-connected per §4.4's button-rotation definition: seated
    /// and either currently connected, or disconnected less than
    /// `grace_period` ago while still holding chips.
    pub fn is_active_and_connected(&self, grace_period: Duration, now_unix: i64) -> bool {
        match self.status {
            PlayerStatus::Active => true,
            PlayerStatus::Disconnected => {
                self.chips > 0
                    && self
                        .disconnected_at_unix
                        .map(|t| now_unix - t < grace_period.as_secs() as i64)
                        .unwrap_or(false)
            }
            PlayerStatus::SittingOut | PlayerStatus::Eliminated => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn place_bet_caps_at_stack_and_marks_all_in() {
        let mut p = Player::new(Uuid::new_v4(), "a".into(), 0, 1000);
        let actual = p.place_bet(1500);
        assert_eq!(actual, 1000);
        assert_eq!(p.chips, 0);
        assert!(p.all_in);
    }

    #[test]
    fn disconnected_player_within_grace_is_active_and_connected() {
        let mut p = Player::new(Uuid::new_v4(), "a".into(), 0, 100);
        p.status = PlayerStatus::Disconnected;
        p.disconnected_at_unix = Some(1000);
        assert!(p.is_active_and_connected(Duration::from_secs(30), 1010));
        assert!(!p.is_active_and_connected(Duration::from_secs(30), 1040));
    }

    #[test]
    fn disconnected_with_no_chips_is_never_active() {
        let mut p = Player::new(Uuid::new_v4(), "a".into(), 0, 0);
        p.status = PlayerStatus::Disconnected;
        p.disconnected_at_unix = Some(1000);
        assert!(!p.is_active_and_connected(Duration::from_secs(30), 1001));
    }
}
