//! The betting engine: a pure function over `(TableState, Action)` that
//! produces either `(new TableState, events)` or a typed rejection.
//!
//! Generalized from the teacher's `instructions/player_action.rs` (turn
//! validation, call/raise/all-in arithmetic, phase advance) and
//! `instructions/showdown.rs` (uncalled-bet return, split-pot remainder),
//! restructured into a side-effect-free function so it can be called from
//! the table actor without touching any account/runtime state, and so it is
//! trivially property-testable per spec.md §8 ("deterministic given
//! (state, action)").

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::card::Card;
use crate::error::CoreError;
use crate::eval::evaluate_hand;
use crate::table::state::{Phase, SidePot, TableState};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Fold,
    Check,
    Call,
    Bet { amount: u64 },
    Raise { to_amount: u64 },
    AllIn,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum BettingEvent {
    PlayerFolded { seat: u8 },
    PlayerChecked { seat: u8 },
    PlayerCalled { seat: u8, amount: u64 },
    PlayerBet { seat: u8, amount: u64 },
    PlayerRaised { seat: u8, to_amount: u64 },
    PlayerAllIn { seat: u8, amount: u64 },
    UncalledBetReturned { seat: u8, amount: u64 },
    RoundClosed,
    PhaseAdvanced { from: Phase, to: Phase },
    HandEnded,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PotAward {
    pub seat: u8,
    pub amount: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ShowdownResult {
    pub awards: Vec<PotAward>,
    pub hand_ranks: BTreeMap<u8, crate::eval::HandRank>,
}

/// Posts the small and big blind automatically. Called once per hand before
/// the first `apply_action`.
pub fn post_blinds(state: &TableState, sb_seat: u8, bb_seat: u8) -> (TableState, Vec<BettingEvent>) {
    let mut next = state.clone();
    let mut events = Vec::new();

    if let Some(p) = next.player_mut(sb_seat) {
        let amount = p.place_bet(next.config.small_blind);
        events.push(BettingEvent::PlayerBet { seat: sb_seat, amount });
        next.pot += amount;
    }
    if let Some(p) = next.player_mut(bb_seat) {
        let amount = p.place_bet(next.config.big_blind);
        events.push(BettingEvent::PlayerBet { seat: bb_seat, amount });
        next.pot += amount;
    }
    next.current_bet = next.config.big_blind;
    next.min_raise = next.config.big_blind;
    next.small_blind_seat = Some(sb_seat);
    next.big_blind_seat = Some(bb_seat);
    (next, events)
}

/// Validates and applies a single player action, returning the resulting
/// state and the events it produced, or a typed rejection that leaves the
/// caller's state untouched.
pub fn apply_action(state: &TableState, seat: u8, action: Action) -> Result<(TableState, Vec<BettingEvent>), CoreError> {
    if state.active_player != Some(seat) {
        return Err(CoreError::NotYourTurn);
    }
    if !state.phase.is_betting_phase() {
        return Err(CoreError::InvalidPhase);
    }

    let mut next = state.clone();
    let mut events = Vec::new();

    let to_call = {
        let player = next.player(seat).ok_or(CoreError::NotYourTurn)?;
        if !player.can_act() {
            return Err(CoreError::InvalidPhase);
        }
        next.current_bet.saturating_sub(player.current_bet)
    };

    match action {
        Action::Fold => {
            let player = next.player_mut(seat).ok_or(CoreError::NotYourTurn)?;
            player.fold();
            events.push(BettingEvent::PlayerFolded { seat });
        }
        Action::Check => {
            if to_call != 0 {
                return Err(CoreError::InvalidBetAmount);
            }
            events.push(BettingEvent::PlayerChecked { seat });
        }
        Action::Call => {
            if to_call == 0 {
                return Err(CoreError::InvalidBetAmount);
            }
            let player = next.player_mut(seat).ok_or(CoreError::NotYourTurn)?;
            let actual = player.place_bet(to_call);
            next.pot += actual;
            if player.all_in {
                events.push(BettingEvent::PlayerAllIn { seat, amount: actual });
            } else {
                events.push(BettingEvent::PlayerCalled { seat, amount: actual });
            }
        }
        Action::Bet { amount } => {
            if next.current_bet != 0 {
                return Err(CoreError::InvalidBetAmount);
            }
            let player = next.player(seat).ok_or(CoreError::NotYourTurn)?;
            if amount == 0 || amount > player.chips {
                return Err(CoreError::InvalidBetAmount);
            }
            let min_bet = next.config.big_blind.max(next.min_raise);
            if amount < min_bet && amount < player.chips {
                return Err(CoreError::InvalidBetAmount);
            }
            let player = next.player_mut(seat).ok_or(CoreError::NotYourTurn)?;
            let actual = player.place_bet(amount);
            next.pot += actual;
            next.current_bet = player.current_bet;
            next.min_raise = actual;
            reset_acted_except(&mut next, seat);
            events.push(BettingEvent::PlayerBet { seat, amount: actual });
        }
        Action::Raise { to_amount } => {
            let player = next.player(seat).ok_or(CoreError::NotYourTurn)?;
            let needed = to_amount.saturating_sub(player.current_bet);
            let is_full_raise = to_amount >= next.current_bet + next.min_raise;
            let is_all_in_for_less = needed >= player.chips;
            if !is_full_raise && !is_all_in_for_less {
                return Err(CoreError::InvalidBetAmount);
            }
            if needed > player.chips {
                return Err(CoreError::InsufficientChips);
            }
            let raise_delta = to_amount.saturating_sub(next.current_bet);
            let player = next.player_mut(seat).ok_or(CoreError::NotYourTurn)?;
            let actual = player.place_bet(needed);
            next.pot += actual;
            let new_bet = player.current_bet;
            let went_all_in = player.all_in;

            if new_bet > next.current_bet {
                // A short all-in raise does not reopen action; only a full
                // raise updates min_raise and clears acted flags.
                if is_full_raise {
                    next.min_raise = raise_delta;
                    next.current_bet = new_bet;
                    reset_acted_except(&mut next, seat);
                } else {
                    next.current_bet = new_bet;
                }
            }
            if went_all_in {
                events.push(BettingEvent::PlayerAllIn { seat, amount: actual });
            } else {
                events.push(BettingEvent::PlayerRaised { seat, to_amount: new_bet });
            }
        }
        Action::AllIn => {
            let player = next.player_mut(seat).ok_or(CoreError::NotYourTurn)?;
            let amount = player.chips;
            let actual = player.place_bet(amount);
            next.pot += actual;
            let new_bet = player.current_bet;
            let is_full_raise = new_bet >= next.current_bet + next.min_raise;
            if new_bet > next.current_bet {
                if is_full_raise {
                    next.min_raise = new_bet - next.current_bet;
                    next.current_bet = new_bet;
                    reset_acted_except(&mut next, seat);
                } else {
                    next.current_bet = new_bet;
                }
            }
            events.push(BettingEvent::PlayerAllIn { seat, amount: actual });
        }
    }

    if let Some(player) = next.player_mut(seat) {
        player.has_acted = true;
    }

    let live = next.players_in_hand();
    if live.len() <= 1 {
        events.push(BettingEvent::HandEnded);
        return Ok((next, events));
    }

    if round_is_closed(&next) {
        events.push(BettingEvent::RoundClosed);
        let from = next.phase;
        next.phase = next.phase.next();
        next.reset_betting_round();
        events.push(BettingEvent::PhaseAdvanced { from, to: next.phase });
        if next.phase == Phase::Showdown {
            events.push(BettingEvent::HandEnded);
            next.active_player = None;
        } else {
            // Action on a new street starts left of the button, not left of
            // whoever just closed the prior street.
            next.active_player = next_to_act(&next, next.dealer_seat.unwrap_or(0));
        }
    } else {
        next.active_player = next_to_act(&next, seat);
    }

    Ok((next, events))
}

fn reset_acted_except(state: &mut TableState, seat: u8) {
    for (s, player) in state.seats.iter_mut().enumerate().filter_map(|(i, p)| p.as_mut().map(|p| (i as u8, p))) {
        if s != seat {
            player.has_acted = false;
        }
    }
}

fn next_to_act(state: &TableState, after_seat: u8) -> Option<u8> {
    let n = state.seats.len() as u8;
    let mut pos = (after_seat + 1) % n;
    for _ in 0..n {
        if let Some(p) = state.player(pos) {
            if p.can_act() {
                return Some(pos);
            }
        }
        pos = (pos + 1) % n;
    }
    None
}

/// A round is closed once every non-folded, non-all-in player has acted at
/// least once this round and everyone still live has matched the current
/// bet (or is all-in for less).
fn round_is_closed(state: &TableState) -> bool {
    for (_, player) in state.occupied_seats() {
        if player.folded || player.all_in {
            continue;
        }
        if !player.has_acted || player.current_bet != state.current_bet {
            return false;
        }
    }
    true
}

/// Partitions contributions into layered side pots. Each layer carries the
/// set of seats eligible to win it: those who contributed at or above that
/// layer and have not folded.
pub fn compute_side_pots(state: &TableState) -> Vec<SidePot> {
    let mut contributions: Vec<(u8, u64, bool)> = state
        .occupied_seats()
        .filter(|(_, p)| p.total_bet_this_hand > 0)
        .map(|(s, p)| (s, p.total_bet_this_hand, p.folded))
        .collect();
    contributions.sort_by_key(|&(_, amount, _)| amount);

    let mut pots = Vec::new();
    let mut prev_level = 0u64;
    let n = contributions.len();
    for i in 0..n {
        let level = contributions[i].1;
        if level == prev_level {
            continue;
        }
        let layer_height = level - prev_level;
        let contributors_at_or_above = &contributions[i..];
        let amount = layer_height * contributors_at_or_above.len() as u64;
        let eligible = contributors_at_or_above
            .iter()
            .filter(|(_, _, folded)| !folded)
            .map(|(seat, _, _)| *seat)
            .collect();
        pots.push(SidePot { amount, eligible_seats: eligible });
        prev_level = level;
    }
    pots.retain(|p| p.amount > 0 && !p.eligible_seats.is_empty());
    pots
}

/// Resolves showdown: evaluates every live player's best hand, distributes
/// each pot (main pot then side pots, in contribution order) to its
/// eligible winners, splitting ties with integer division and handing any
/// remainder chip to the earliest seat left of the button.
pub fn resolve_showdown(
    state: &TableState,
    hole_cards: &BTreeMap<u8, [Card; 2]>,
) -> Result<(TableState, ShowdownResult), CoreError> {
    let mut next = state.clone();
    let live: Vec<u8> = next.players_in_hand();

    if live.len() == 1 {
        let winner = live[0];
        let amount = next.pot + next.side_pots.iter().map(|p| p.amount).sum::<u64>();
        if let Some(p) = next.player_mut(winner) {
            p.award_chips(amount);
        }
        next.pot = 0;
        next.side_pots.clear();
        return Ok((
            next,
            ShowdownResult { awards: vec![PotAward { seat: winner, amount }], hand_ranks: BTreeMap::new() },
        ));
    }

    let mut hand_ranks = BTreeMap::new();
    let mut evaluated = BTreeMap::new();
    for &seat in &live {
        let hole = hole_cards.get(&seat).ok_or(CoreError::InvalidPhase)?;
        let mut seven: Vec<Card> = hole.to_vec();
        seven.extend(next.community_cards.iter().copied());
        let eval = evaluate_hand(&seven);
        hand_ranks.insert(seat, eval.rank);
        evaluated.insert(seat, eval);
    }

    let pots = if next.side_pots.is_empty() {
        vec![SidePot { amount: next.pot, eligible_seats: live.iter().copied().collect() }]
    } else {
        next.side_pots.clone()
    };

    let mut awards_by_seat: BTreeMap<u8, u64> = BTreeMap::new();
    let button = next.dealer_seat.unwrap_or(0);

    for pot in &pots {
        let eligible: Vec<u8> = pot.eligible_seats.iter().copied().filter(|s| live.contains(s)).collect();
        if eligible.is_empty() {
            continue;
        }
        let best = eligible
            .iter()
            .map(|s| evaluated[s])
            .max()
            .expect("eligible is non-empty");
        let winners: Vec<u8> = eligible.iter().copied().filter(|s| evaluated[s] == best).collect();

        let share = pot.amount / winners.len() as u64;
        let remainder = pot.amount % winners.len() as u64;

        // Remainder goes to the earliest seat left of the button.
        let n = next.seats.len() as u8;
        let remainder_seat = (0..n)
            .map(|offset| (button + 1 + offset) % n)
            .find(|s| winners.contains(s));

        for &w in &winners {
            let extra = if Some(w) == remainder_seat { remainder } else { 0 };
            *awards_by_seat.entry(w).or_insert(0) += share + extra;
        }
    }

    for (&seat, &amount) in &awards_by_seat {
        if let Some(p) = next.player_mut(seat) {
            p.award_chips(amount);
        }
    }
    next.pot = 0;
    next.side_pots.clear();

    let awards = awards_by_seat.into_iter().map(|(seat, amount)| PotAward { seat, amount }).collect();
    Ok((next, ShowdownResult { awards, hand_ranks }))
}

pub type HandId = Uuid;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::{Rank, Suit};
    use crate::player::Player;
    use crate::table::state::TableConfig;
    use uuid::Uuid;

    fn config() -> TableConfig {
        TableConfig { small_blind: 10, big_blind: 20, ante: 0, min_buy_in: 200, max_buy_in: 2000, max_seats: 4 }
    }

    fn heads_up(chips0: u64, chips1: u64) -> TableState {
        let mut t = TableState::new(Uuid::new_v4(), config());
        t.seats[0] = Some(Player::new(Uuid::new_v4(), "p0".into(), 0, chips0));
        t.seats[1] = Some(Player::new(Uuid::new_v4(), "p1".into(), 1, chips1));
        t.dealer_seat = Some(0);
        t.phase = Phase::PreFlop;
        let (posted, _) = post_blinds(&t, 0, 1);
        let mut posted = posted;
        posted.active_player = Some(0);
        posted
    }

    #[test]
    fn heads_up_preflop_fold_awards_pot_to_big_blind() {
        let t = heads_up(1000, 1000);
        let (after, events) = apply_action(&t, 0, Action::Fold).unwrap();
        assert!(events.contains(&BettingEvent::HandEnded));
        assert_eq!(after.player(0).unwrap().chips, 990);
        assert_eq!(after.pot, 30);
    }

    #[test]
    fn not_your_turn_is_rejected() {
        let t = heads_up(1000, 1000);
        let err = apply_action(&t, 1, Action::Check).unwrap_err();
        assert_eq!(err, CoreError::NotYourTurn);
    }

    #[test]
    fn check_is_illegal_when_facing_a_bet() {
        let t = heads_up(1000, 1000);
        let err = apply_action(&t, 0, Action::Check).unwrap_err();
        assert_eq!(err, CoreError::InvalidBetAmount);
    }

    #[test]
    fn call_then_check_closes_preflop_round() {
        let t = heads_up(1000, 1000);
        let (after_call, _) = apply_action(&t, 0, Action::Call).unwrap();
        assert_eq!(after_call.active_player, Some(1));
        let (after_check, events) = apply_action(&after_call, 1, Action::Check).unwrap();
        assert!(events.iter().any(|e| matches!(e, BettingEvent::PhaseAdvanced { to: Phase::Flop, .. })));
        assert_eq!(after_check.phase, Phase::Flop);
    }

    #[test]
    fn new_street_action_starts_left_of_button_not_left_of_last_actor() {
        let mut t = TableState::new(Uuid::new_v4(), config());
        t.seats[0] = Some(Player::new(Uuid::new_v4(), "a".into(), 0, 1000));
        t.seats[1] = Some(Player::new(Uuid::new_v4(), "b".into(), 1, 1000));
        t.seats[2] = Some(Player::new(Uuid::new_v4(), "c".into(), 2, 1000));
        t.dealer_seat = Some(0);
        t.phase = Phase::PreFlop;
        let (posted, _) = post_blinds(&t, 1, 2);
        let mut posted = posted;
        posted.active_player = Some(0);
        let (after_call, _) = apply_action(&posted, 0, Action::Call).unwrap();
        let (after_call2, _) = apply_action(&after_call, 1, Action::Call).unwrap();
        let (after_flop, events) = apply_action(&after_call2, 2, Action::Check).unwrap();
        assert!(events.iter().any(|e| matches!(e, BettingEvent::PhaseAdvanced { to: Phase::Flop, .. })));
        assert_eq!(after_flop.active_player, Some(1));
    }

    #[test]
    fn three_way_all_in_creates_layered_side_pots() {
        let mut t = TableState::new(Uuid::new_v4(), config());
        t.seats[0] = Some(Player::new(Uuid::new_v4(), "a".into(), 0, 100));
        t.seats[1] = Some(Player::new(Uuid::new_v4(), "b".into(), 1, 300));
        t.seats[2] = Some(Player::new(Uuid::new_v4(), "c".into(), 2, 300));
        t.player_mut(0).unwrap().total_bet_this_hand = 100;
        t.player_mut(1).unwrap().total_bet_this_hand = 300;
        t.player_mut(2).unwrap().total_bet_this_hand = 300;
        let pots = compute_side_pots(&t);
        assert_eq!(pots.len(), 2);
        assert_eq!(pots[0].amount, 300); // 100 * 3 contributors
        assert_eq!(pots[0].eligible_seats.len(), 3);
        assert_eq!(pots[1].amount, 400); // 200 * 2 contributors
        assert_eq!(pots[1].eligible_seats.len(), 2);
        assert!(!pots[1].eligible_seats.contains(&0));
    }

    #[test]
    fn split_pot_remainder_goes_left_of_button() {
        let mut t = TableState::new(Uuid::new_v4(), config());
        t.seats[0] = Some(Player::new(Uuid::new_v4(), "a".into(), 0, 0));
        t.seats[1] = Some(Player::new(Uuid::new_v4(), "b".into(), 1, 0));
        t.dealer_seat = Some(0);
        t.pot = 201;
        t.community_cards = vec![
            Card::new(Suit::Hearts, Rank::Two),
            Card::new(Suit::Diamonds, Rank::Three),
            Card::new(Suit::Clubs, Rank::Four),
            Card::new(Suit::Spades, Rank::Five),
            Card::new(Suit::Hearts, Rank::Seven),
        ];
        let mut hole_cards = BTreeMap::new();
        hole_cards.insert(0, [Card::new(Suit::Spades, Rank::King), Card::new(Suit::Clubs, Rank::Queen)]);
        hole_cards.insert(1, [Card::new(Suit::Diamonds, Rank::King), Card::new(Suit::Hearts, Rank::Queen)]);
        let (after, result) = resolve_showdown(&t, &hole_cards).unwrap();
        let by_seat: BTreeMap<u8, u64> = result.awards.iter().map(|a| (a.seat, a.amount)).collect();
        assert_eq!(by_seat[&1], 101); // seat 1 is left of button (seat 0)
        assert_eq!(by_seat[&0], 100);
        assert_eq!(after.pot, 0);
    }
}
