//! The WebSocket session layer: authenticates a connection, binds it to a
//! player identity, looks its target table up in the registry, and
//! dedupes/coalesces its commands before they reach a `TableActor`.
//!
//! Owns no game rules — `holdem-core` is the only crate that knows what a
//! legal bet is. This crate only knows sessions, queues, and idempotency.

pub mod error;
pub mod idempotency;
pub mod protocol;
pub mod registry;
pub mod session;

pub use error::SessionError;
pub use idempotency::{CoalescedOutcome, DedupeStrategy, IdempotencyCache, MergeStrategy, Outcome};
pub use protocol::{ClientMessage, ClientPayload, ServerMessage, ServerPayload};
pub use registry::TableRegistry;
pub use session::{CommandOutcome, Session, SessionConfig, TokenVerifier};
