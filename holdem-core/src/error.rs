//! Error taxonomy for the game core.
//!
//! The source system leaned on class inheritance for domain errors; here
//! each kind is a closed enum variant carrying a stable `code()` string and
//! a structured detail map, per §7/§9 of the design notes.

use std::collections::BTreeMap;

use thiserror::Error;

/// A single validation/game-rule rejection, replied to the commanding
/// session without mutating table state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("not your turn")]
    NotYourTurn,

    #[error("invalid bet amount")]
    InvalidBetAmount,

    #[error("insufficient chips")]
    InsufficientChips,

    #[error("invalid phase for this action")]
    InvalidPhase,

    #[error("seat is already taken")]
    SeatTaken,

    #[error("rate limited")]
    RateLimited,

    #[error("insufficient active-and-connected players to start a hand")]
    InsufficientPlayers,

    #[error("hand failed to start")]
    HandStartFailed,

    #[error("session expired")]
    SessionExpired,

    #[error("entropy source failed")]
    EntropyFailed,

    #[error("table is not accepting commands: {reason}")]
    TableClosed { reason: String },

    #[error("unknown message type: {0}")]
    UnknownType(String),
}

impl CoreError {
    /// Stable wire code, matching the §6 client-protocol error code table.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::NotYourTurn => "not_your_turn",
            CoreError::InvalidBetAmount => "invalid_bet_amount",
            CoreError::InsufficientChips => "insufficient_chips",
            CoreError::InvalidPhase => "invalid_phase",
            CoreError::SeatTaken => "seat_taken",
            CoreError::RateLimited => "rate_limited",
            CoreError::InsufficientPlayers => "insufficient_players",
            CoreError::HandStartFailed => "hand_start_failed",
            CoreError::SessionExpired => "session_expired",
            CoreError::EntropyFailed => "entropy_failed",
            CoreError::TableClosed { .. } => "table_closed",
            CoreError::UnknownType(_) => "unknown_type",
        }
    }

    /// Structured detail map attached to the `error` event sent to clients.
    pub fn details(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        if let CoreError::TableClosed { reason } = self {
            map.insert("reason".to_string(), reason.clone());
        }
        if let CoreError::UnknownType(t) = self {
            map.insert("type".to_string(), t.clone());
        }
        map
    }
}

/// Errors from tournament-level operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TournamentError {
    #[error("tournament is full")]
    TournamentFull,

    #[error("player is already registered")]
    DuplicateRegistration,

    #[error("registration is closed")]
    RegistrationClosed,

    #[error("not enough registered players to start")]
    NotEnoughPlayers,

    #[error("table not found")]
    TableNotFound,

    #[error("player not found")]
    PlayerNotFound,
}

impl TournamentError {
    pub fn code(&self) -> &'static str {
        match self {
            TournamentError::TournamentFull => "tournament_full",
            TournamentError::DuplicateRegistration => "duplicate_registration",
            TournamentError::RegistrationClosed => "registration_closed",
            TournamentError::NotEnoughPlayers => "insufficient_players",
            TournamentError::TableNotFound => "table_not_found",
            TournamentError::PlayerNotFound => "player_not_found",
        }
    }
}

/// A fatal, invariant-violation error. Halts the table actor.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("fatal table error: {reason}")]
pub struct FatalError {
    pub reason: String,
}
