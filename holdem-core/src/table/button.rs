//! Button rotation and blind assignment (spec.md §4.4).
//!
//! Generalized from the teacher's `Table::advance_dealer` (a bitmap scan for
//! the next occupied seat) into a scan for the next *active-and-connected*
//! seat, since disconnect/grace-period handling has no analogue on-chain.

use std::time::Duration;

use crate::error::CoreError;
use crate::rng::RngCore;
use crate::table::state::TableState;

/// Seats eligible for the button, in clockwise order starting just after
/// `after_seat` (exclusive).
fn active_and_connected_seats_from(
    state: &TableState,
    after_seat: u8,
    grace_period: Duration,
    now_unix: i64,
) -> Vec<u8> {
    let n = state.seats.len() as u8;
    if n == 0 {
        return Vec::new();
    }
    let mut out = Vec::new();
    let mut pos = (after_seat + 1) % n;
    for _ in 0..n {
        if let Some(player) = state.player(pos) {
            if player.is_active_and_connected(grace_period, now_unix) {
                out.push(pos);
            }
        }
        pos = (pos + 1) % n;
    }
    out
}

/// Picks the next button seat. If the current button holder is no longer
/// active-and-connected, the button moves to the first eligible seat
/// clockwise from the prior position. On the very first hand (no prior
/// button), a random eligible seat is chosen via the RNG core.
pub fn rotate_button(
    state: &TableState,
    rng: &mut RngCore,
    grace_period: Duration,
    now_unix: i64,
) -> Result<u8, CoreError> {
    let anchor = state.dealer_seat.unwrap_or(state.seats.len() as u8 - 1);
    let eligible = active_and_connected_seats_from(state, anchor, grace_period, now_unix);
    if eligible.len() < 2 {
        return Err(CoreError::InsufficientPlayers);
    }

    if state.dealer_seat.is_none() {
        let idx = rng.random_int(0, eligible.len() as u64 - 1)? as usize;
        return Ok(eligible[idx]);
    }

    Ok(eligible[0])
}

/// Assigns small-blind and big-blind seats clockwise from the button.
/// Heads-up, the button itself posts the small blind.
pub fn assign_blinds(
    state: &TableState,
    button: u8,
    grace_period: Duration,
    now_unix: i64,
) -> Result<(u8, u8), CoreError> {
    let eligible = active_and_connected_seats_from(state, button, grace_period, now_unix);
    if eligible.len() < 2 {
        return Err(CoreError::InsufficientPlayers);
    }
    if eligible.len() == 2 {
        // Heads-up: button is the small blind.
        return Ok((button, eligible[0]));
    }
    Ok((eligible[0], eligible[1]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::Player;
    use crate::table::state::TableConfig;
    use std::time::Duration;
    use uuid::Uuid;

    fn config() -> TableConfig {
        TableConfig { small_blind: 10, big_blind: 20, ante: 0, min_buy_in: 200, max_buy_in: 2000, max_seats: 4 }
    }

    fn seated(seats: &[u8]) -> TableState {
        let mut t = TableState::new(Uuid::new_v4(), config());
        for &s in seats {
            t.seats[s as usize] = Some(Player::new(Uuid::new_v4(), format!("p{s}"), s, 1000));
        }
        t
    }

    #[test]
    fn first_hand_picks_a_random_eligible_seat() {
        let t = seated(&[0, 1, 2]);
        let mut rng = RngCore::with_default_rate_limit(Duration::from_secs(300));
        let button = rotate_button(&t, &mut rng, Duration::from_secs(30), 0).unwrap();
        assert!([0u8, 1, 2].contains(&button));
    }

    #[test]
    fn insufficient_players_is_rejected() {
        let t = seated(&[0]);
        let mut rng = RngCore::with_default_rate_limit(Duration::from_secs(300));
        assert_eq!(
            rotate_button(&t, &mut rng, Duration::from_secs(30), 0).unwrap_err(),
            CoreError::InsufficientPlayers
        );
    }

    #[test]
    fn heads_up_button_is_small_blind() {
        let t = seated(&[0, 1]);
        let (sb, bb) = assign_blinds(&t, 0, Duration::from_secs(30), 0).unwrap();
        assert_eq!(sb, 0);
        assert_eq!(bb, 1);
    }

    #[test]
    fn three_handed_blinds_are_next_two_clockwise() {
        let t = seated(&[0, 1, 2]);
        let (sb, bb) = assign_blinds(&t, 0, Duration::from_secs(30), 0).unwrap();
        assert_eq!(sb, 1);
        assert_eq!(bb, 2);
    }

    #[test]
    fn button_skips_seat_disconnected_past_grace() {
        let mut t = seated(&[0, 1, 2]);
        t.dealer_seat = Some(0);
        let p1 = t.player_mut(1).unwrap();
        p1.status = crate::player::PlayerStatus::Disconnected;
        p1.disconnected_at_unix = Some(0);
        let mut rng = RngCore::with_default_rate_limit(Duration::from_secs(300));
        // now_unix far past grace period for seat 1
        let button = rotate_button(&t, &mut rng, Duration::from_secs(30), 1000).unwrap();
        assert_eq!(button, 2);
    }
}
