//! Deck manager: commits a shuffled deck for a hand, deals hole and board
//! cards in standard burn order, and reveals post-showdown.
//!
//! Grounded on the teacher's `state/deck.rs` (`DeckState::deal_card`,
//! `deal_index`) and `instructions/deal_cards.rs`/`deal_cards_vrf.rs`
//! (commit → shuffle → deal-hole → burn/deal-flop/turn/river), generalized
//! from Inco-encrypted `u128` handles to plain `Card`s since this crate has
//! no on-chain encryption layer.

use uuid::Uuid;

use crate::card::{canonical_deck, Card};
use crate::error::CoreError;
use crate::rng::{Commitment, RevealProof, RngCore, ShuffleProof};

/// A deck committed for exactly one hand: the original canonical deck (kept
/// so `reveal` can recompute the commitment hash), the shuffled order, the
/// proof of how it was shuffled, and how many cards have been dealt.
pub struct CommittedDeck {
    pub commitment: Commitment,
    original: [Card; 52],
    shuffled: Vec<Card>,
    shuffle_proof: ShuffleProof,
    deal_index: usize,
}

impl CommittedDeck {
    pub fn commitment(&self) -> &Commitment {
        &self.commitment
    }

    pub fn cards_dealt(&self) -> usize {
        self.deal_index
    }

    pub fn cards_remaining(&self) -> usize {
        self.shuffled.len() - self.deal_index
    }

    fn deal_one(&mut self) -> Card {
        let card = self.shuffled[self.deal_index];
        self.deal_index += 1;
        card
    }

    /// Reveals this deck: the shuffled order and nonce are bound back to
    /// the commitment hash so any client can verify the shuffle post hoc.
    pub fn reveal(&self, rng: &RngCore) -> RevealProof {
        rng.reveal(&self.original, &self.shuffled, &self.commitment, self.shuffle_proof.clone())
    }
}

/// Commits and shuffles a fresh canonical deck for `table_id`/`hand_id`.
///
/// Failure modes per §4.3: if the RNG core returns `rate_limited` or
/// `entropy_failed`, the hand does not start; the caller should report
/// `hand_start_failed` and retry after backoff.
pub fn commit_and_shuffle(rng: &mut RngCore, table_id: Uuid, hand_id: Uuid) -> Result<CommittedDeck, CoreError> {
    let original = canonical_deck();
    let commitment = rng.commit(&original, table_id, hand_id)?;
    let (shuffled, shuffle_proof) = rng.shuffle(&original)?;
    Ok(CommittedDeck { commitment, original, shuffled, shuffle_proof, deal_index: 0 })
}

/// Deals hole cards burn-free: one card per active seat starting left of the
/// button, twice around. `seat_order` must already start at the seat left of
/// the button and contain only active-and-connected seats.
pub fn deal_hole_cards(deck: &mut CommittedDeck, seat_order: &[u8]) -> Vec<(u8, [Card; 2])> {
    let mut first = Vec::with_capacity(seat_order.len());
    for &seat in seat_order {
        first.push((seat, deck.deal_one()));
    }
    let mut hands: Vec<(u8, [Card; 2])> = Vec::with_capacity(seat_order.len());
    for (i, &seat) in seat_order.iter().enumerate() {
        let second = deck.deal_one();
        hands.push((seat, [first[i].1, second]));
    }
    hands
}

/// Burns one card, then deals the flop (3 cards).
pub fn deal_flop(deck: &mut CommittedDeck) -> [Card; 3] {
    let _burn = deck.deal_one();
    [deck.deal_one(), deck.deal_one(), deck.deal_one()]
}

/// Burns one card, then deals the turn (1 card).
pub fn deal_turn(deck: &mut CommittedDeck) -> Card {
    let _burn = deck.deal_one();
    deck.deal_one()
}

/// Burns one card, then deals the river (1 card).
pub fn deal_river(deck: &mut CommittedDeck) -> Card {
    let _burn = deck.deal_one();
    deck.deal_one()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn rng() -> RngCore {
        RngCore::with_default_rate_limit(Duration::from_secs(300))
    }

    #[test]
    fn deals_hole_cards_without_duplicates() {
        let mut r = rng();
        let mut deck = commit_and_shuffle(&mut r, Uuid::new_v4(), Uuid::new_v4()).unwrap();
        let seats = [2u8, 3, 4];
        let hands = deal_hole_cards(&mut deck, &seats);
        assert_eq!(hands.len(), 3);
        let mut all_cards: Vec<Card> = hands.iter().flat_map(|(_, h)| h.to_vec()).collect();
        all_cards.sort();
        all_cards.dedup();
        assert_eq!(all_cards.len(), 6);
        assert_eq!(deck.cards_dealt(), 6);
    }

    #[test]
    fn flop_turn_river_burn_one_card_each() {
        let mut r = rng();
        let mut deck = commit_and_shuffle(&mut r, Uuid::new_v4(), Uuid::new_v4()).unwrap();
        let seats = [0u8, 1];
        deal_hole_cards(&mut deck, &seats);
        assert_eq!(deck.cards_dealt(), 4);
        deal_flop(&mut deck);
        assert_eq!(deck.cards_dealt(), 8); // 4 hole + 1 burn + 3 flop
        deal_turn(&mut deck);
        assert_eq!(deck.cards_dealt(), 10);
        deal_river(&mut deck);
        assert_eq!(deck.cards_dealt(), 12);
    }

    #[test]
    fn reveal_verifies_against_commitment() {
        let mut r = rng();
        let deck = commit_and_shuffle(&mut r, Uuid::new_v4(), Uuid::new_v4()).unwrap();
        let reveal = deck.reveal(&r);
        assert!(reveal.is_valid());
    }
}
