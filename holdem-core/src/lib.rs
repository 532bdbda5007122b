//! The game core: table actor, betting engine, hand evaluator, deck/RNG,
//! audit sink, and tournament coordinator. No networking of its own — the
//! `holdem-session` and `holdem-server` crates are the only things that
//! know a socket exists.
//!
//! Grounded on the teacher's `lib.rs` module re-export list, split the same
//! way: one module per concern, unit tests colocated with each.

pub mod audit;
pub mod betting;
pub mod card;
pub mod constants;
pub mod deck;
pub mod error;
pub mod eval;
pub mod events;
pub mod player;
pub mod rng;
pub mod table;
pub mod tournament;
pub mod wallet;

pub use error::{CoreError, FatalError, TournamentError};
pub use events::TableEvent;
pub use table::actor::{TableActor, TableHandle};
pub use tournament::{TournamentCoordinator, TournamentHandle};
