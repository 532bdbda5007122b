//! The wallet collaborator: consulted for buy-ins and cash-outs, never
//! owned. Settlement itself lives outside this crate (§1 Non-goals); this
//! is only the contract the table actor calls against.

use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletError {
    InsufficientFunds,
}

/// Implemented by the wallet ledger service. The in-process `table` module
/// only ever holds a `dyn Wallet`, matching §9's "process-wide services
/// constructed at start-up and injected into actors" redesign note.
pub trait Wallet: Send + Sync {
    fn reserve(&self, player: Uuid, amount: u64) -> Result<(), WalletError>;
    fn commit_win(&self, player: Uuid, amount: u64);
    fn commit_loss(&self, player: Uuid, amount: u64);
    fn release(&self, player: Uuid, amount: u64);
}

/// An in-memory wallet used by tests and local runs: an unlimited faucet
/// that always approves reservations. Production deployments inject a real
/// ledger-backed implementation instead.
#[derive(Default)]
pub struct NullWallet;

impl Wallet for NullWallet {
    fn reserve(&self, _player: Uuid, _amount: u64) -> Result<(), WalletError> {
        Ok(())
    }
    fn commit_win(&self, _player: Uuid, _amount: u64) {}
    fn commit_loss(&self, _player: Uuid, _amount: u64) {}
    fn release(&self, _player: Uuid, _amount: u64) {}
}
