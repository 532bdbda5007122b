//! Card and canonical deck representation.
//!
//! Cards are encoded exactly as the teacher's `card_utils` module encodes
//! them (`suit * 13 + rank`), generalized from a `u8` handle into a typed
//! struct since this crate does not need an FHE ciphertext handle.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Suit {
    Hearts = 0,
    Diamonds = 1,
    Clubs = 2,
    Spades = 3,
}

impl Suit {
    pub const ALL: [Suit; 4] = [Suit::Hearts, Suit::Diamonds, Suit::Clubs, Suit::Spades];

    fn from_index(i: u8) -> Suit {
        match i {
            0 => Suit::Hearts,
            1 => Suit::Diamonds,
            2 => Suit::Clubs,
            _ => Suit::Spades,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Rank {
    Two = 0,
    Three = 1,
    Four = 2,
    Five = 3,
    Six = 4,
    Seven = 5,
    Eight = 6,
    Nine = 7,
    Ten = 8,
    Jack = 9,
    Queen = 10,
    King = 11,
    Ace = 12,
}

impl Rank {
    pub const ALL: [Rank; 13] = [
        Rank::Two,
        Rank::Three,
        Rank::Four,
        Rank::Five,
        Rank::Six,
        Rank::Seven,
        Rank::Eight,
        Rank::Nine,
        Rank::Ten,
        Rank::Jack,
        Rank::Queen,
        Rank::King,
        Rank::Ace,
    ];

    fn from_index(i: u8) -> Rank {
        match i {
            0 => Rank::Two,
            1 => Rank::Three,
            2 => Rank::Four,
            3 => Rank::Five,
            4 => Rank::Six,
            5 => Rank::Seven,
            6 => Rank::Eight,
            7 => Rank::Nine,
            8 => Rank::Ten,
            9 => Rank::Jack,
            10 => Rank::Queen,
            11 => Rank::King,
            _ => Rank::Ace,
        }
    }
}

/// A single playing card, encoded as `suit * 13 + rank` (0..52).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Card(pub u8);

impl Card {
    pub fn new(suit: Suit, rank: Rank) -> Card {
        Card((suit as u8) * 13 + rank as u8)
    }

    pub fn suit(self) -> Suit {
        Suit::from_index(self.0 / 13)
    }

    pub fn rank(self) -> Rank {
        Rank::from_index(self.0 % 13)
    }

    pub fn index(self) -> u8 {
        self.0
    }
}

impl std::fmt::Debug for Card {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rank = match self.0 % 13 {
            0 => "2",
            1 => "3",
            2 => "4",
            3 => "5",
            4 => "6",
            5 => "7",
            6 => "8",
            7 => "9",
            8 => "T",
            9 => "J",
            10 => "Q",
            11 => "K",
            _ => "A",
        };
        let suit = match self.0 / 13 {
            0 => "h",
            1 => "d",
            2 => "c",
            _ => "s",
        };
        write!(f, "{rank}{suit}")
    }
}

/// Returns the 52 canonical cards in a fixed, deterministic order:
/// hearts 2..A, diamonds 2..A, clubs 2..A, spades 2..A.
pub fn canonical_deck() -> [Card; 52] {
    let mut cards = [Card(0); 52];
    let mut i = 0;
    for suit in Suit::ALL {
        for rank in Rank::ALL {
            cards[i] = Card::new(suit, rank);
            i += 1;
        }
    }
    cards
}

/// Serializes a deck into its canonical byte form for hashing.
pub fn serialize_deck(cards: &[Card]) -> Vec<u8> {
    cards.iter().map(|c| c.0).collect()
}

/// Checks that `cards` is exactly a permutation of the 52 canonical cards.
pub fn is_permutation_of_canonical(cards: &[Card]) -> bool {
    if cards.len() != DECK_SIZE {
        return false;
    }
    let mut seen = [false; 52];
    for c in cards {
        let idx = c.0 as usize;
        if idx >= 52 || seen[idx] {
            return false;
        }
        seen[idx] = true;
    }
    true
}

use crate::constants::DECK_SIZE;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_deck_has_52_distinct_cards() {
        let deck = canonical_deck();
        assert!(is_permutation_of_canonical(&deck));
    }

    #[test]
    fn card_round_trips_through_suit_rank() {
        let c = Card::new(Suit::Spades, Rank::Ace);
        assert_eq!(c.suit(), Suit::Spades);
        assert_eq!(c.rank(), Rank::Ace);
        assert_eq!(c.index(), 3 * 13 + 12);
    }

    #[test]
    fn non_permutation_is_rejected() {
        let mut deck = canonical_deck().to_vec();
        deck[5] = deck[6];
        assert!(!is_permutation_of_canonical(&deck));
    }
}
