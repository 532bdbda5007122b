//! Cryptographic RNG core: uniform bytes, unbiased integers, Fisher-Yates
//! shuffle, and commit/reveal deck proofs.
//!
//! The teacher crate delegates all of this to an on-chain VRF oracle
//! (`request_shuffle`/`callback_shuffle` in `instructions/`). Off-chain, the
//! same contract is served by a CSPRNG seeded from OS entropy: `rand_chacha`
//! re-seeded from `rand::rngs::OsRng`, matching the pack's use of
//! `rand::{RngCore, SeedableRng}` in `session_factory.rs`.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use rand::{RngCore as _, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::card::Card;
use crate::constants::DEFAULT_RNG_RATE_LIMIT_PER_MINUTE;
use crate::error::CoreError;

/// Proof that a shuffle was produced by the declared algorithm, with enough
/// metadata for an auditor to recompute the hashes independently.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShuffleProof {
    pub algorithm: &'static str,
    pub entropy_bytes_used: usize,
    pub input_hash: [u8; 32],
    pub output_hash: [u8; 32],
}

/// A published commitment: `hash = SHA-256(nonce || canonical(deck))`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Commitment {
    pub table_id: Uuid,
    pub hand_id: Uuid,
    pub nonce: [u8; 32],
    pub hash: [u8; 32],
    pub timestamp_unix: i64,
}

/// Proof that a later-shuffled deck matches an earlier commitment.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RevealProof {
    pub commitment_hash_matches: bool,
    pub is_valid_permutation: bool,
    pub shuffle_proof: ShuffleProof,
}

impl RevealProof {
    pub fn is_valid(&self) -> bool {
        self.commitment_hash_matches && self.is_valid_permutation
    }
}

fn sha256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// Per-table RNG state: entropy source, rate limiter, audit buffer.
///
/// One instance is owned by each table actor, matching §4.1's "state kept
/// per table".
pub struct RngCore {
    rng: ChaCha20Rng,
    last_refresh: Instant,
    refresh_interval: Duration,
    rate_limit_per_minute: u32,
    window_start: Instant,
    window_op_count: u32,
    op_counter: u64,
    /// Timestamps of every op in the current minute window, used by the
    /// security-alert heuristic scan below.
    recent_ops: VecDeque<(Instant, usize)>,
}

impl RngCore {
    pub fn new(refresh_interval: Duration, rate_limit_per_minute: u32) -> Self {
        RngCore {
            rng: ChaCha20Rng::from_entropy(),
            last_refresh: Instant::now(),
            refresh_interval,
            rate_limit_per_minute,
            window_start: Instant::now(),
            window_op_count: 0,
            op_counter: 0,
            recent_ops: VecDeque::new(),
        }
    }

    pub fn with_default_rate_limit(refresh_interval: Duration) -> Self {
        Self::new(refresh_interval, DEFAULT_RNG_RATE_LIMIT_PER_MINUTE)
    }

    /// Forces an entropy refresh; called on the refresh timer and whenever a
    /// "new hand" event arrives.
    pub fn refresh_entropy(&mut self) {
        self.rng = ChaCha20Rng::from_entropy();
        self.last_refresh = Instant::now();
    }

    fn maybe_auto_refresh(&mut self) {
        if self.last_refresh.elapsed() >= self.refresh_interval {
            self.refresh_entropy();
        }
    }

    fn check_rate_limit(&mut self) -> Result<(), CoreError> {
        if self.window_start.elapsed() >= Duration::from_secs(60) {
            self.window_start = Instant::now();
            self.window_op_count = 0;
        }
        if self.window_op_count >= self.rate_limit_per_minute {
            return Err(CoreError::RateLimited);
        }
        self.window_op_count += 1;
        Ok(())
    }

    fn record_op(&mut self, entropy_bytes: usize) {
        self.op_counter += 1;
        self.recent_ops.push_back((Instant::now(), entropy_bytes));
        while self.recent_ops.len() > 4096 {
            self.recent_ops.pop_front();
        }
    }

    /// Returns `n` cryptographically uniform bytes.
    pub fn random_bytes(&mut self, n: usize) -> Result<Vec<u8>, CoreError> {
        self.maybe_auto_refresh();
        self.check_rate_limit()?;
        let mut buf = vec![0u8; n];
        self.rng.fill_bytes(&mut buf);
        self.record_op(n);
        Ok(buf)
    }

    /// Returns a uniform integer in `[min, max]` inclusive, via rejection
    /// sampling on the byte stream so that non-power-of-two ranges are not
    /// modulo-biased.
    pub fn random_int(&mut self, min: u64, max: u64) -> Result<u64, CoreError> {
        assert!(min <= max, "random_int requires min <= max");
        self.maybe_auto_refresh();
        self.check_rate_limit()?;

        let span = max - min + 1;
        if span == 1 {
            self.record_op(0);
            return Ok(min);
        }
        let zone = u64::MAX - (u64::MAX % span);
        let mut entropy_used = 0usize;
        loop {
            let candidate = self.rng.next_u64();
            entropy_used += 8;
            if candidate < zone {
                self.record_op(entropy_used);
                return Ok(min + candidate % span);
            }
        }
    }

    /// Fisher-Yates shuffle of `seq`, returning the new ordering and a proof
    /// of how it was produced.
    pub fn shuffle<T: Clone>(&mut self, seq: &[T]) -> Result<(Vec<T>, ShuffleProof), CoreError>
    where
        T: AsBytes,
    {
        let input_hash = sha256(&concat_bytes(seq));
        let mut out = seq.to_vec();
        let mut entropy_bytes_used = 0usize;
        let n = out.len();
        for i in (1..n).rev() {
            let j = self.random_int(0, i as u64)? as usize;
            entropy_bytes_used += 8;
            out.swap(i, j);
        }
        let output_hash = sha256(&concat_bytes(&out));
        let proof = ShuffleProof {
            algorithm: "fisher_yates",
            entropy_bytes_used,
            input_hash,
            output_hash,
        };
        Ok((out, proof))
    }

    /// Publishes a commitment for `deck` ahead of dealing.
    pub fn commit(&mut self, deck: &[Card], table_id: Uuid, hand_id: Uuid) -> Result<Commitment, CoreError> {
        let nonce_bytes = self.random_bytes(32)?;
        let mut nonce = [0u8; 32];
        nonce.copy_from_slice(&nonce_bytes);

        let mut preimage = Vec::with_capacity(32 + deck.len());
        preimage.extend_from_slice(&nonce);
        preimage.extend(deck.iter().map(|c| c.index()));
        let hash = sha256(&preimage);

        Ok(Commitment {
            table_id,
            hand_id,
            nonce,
            hash,
            timestamp_unix: unix_now(),
        })
    }

    /// Verifies that `shuffled_deck` matches `commitment` and that the
    /// shuffle that produced it is well-formed.
    pub fn reveal(
        &self,
        original_deck: &[Card],
        shuffled_deck: &[Card],
        commitment: &Commitment,
        shuffle_proof: ShuffleProof,
    ) -> RevealProof {
        let mut preimage = Vec::with_capacity(32 + original_deck.len());
        preimage.extend_from_slice(&commitment.nonce);
        preimage.extend(original_deck.iter().map(|c| c.index()));
        let recomputed = sha256(&preimage);

        RevealProof {
            commitment_hash_matches: recomputed == commitment.hash,
            is_valid_permutation: crate::card::is_permutation_of_canonical(shuffled_deck),
            shuffle_proof,
        }
    }

    pub fn op_counter(&self) -> u64 {
        self.op_counter
    }

    /// Heuristic scan over recent operations for suspicious patterns:
    /// excessive ops/minute, extreme entropy-per-op outliers, long runs of
    /// identical-looking ops. Returns a severity if something looks off.
    pub fn scan_for_anomalies(&self) -> Option<SecurityAlert> {
        let minute_ago = Instant::now() - Duration::from_secs(60);
        let ops_last_minute = self.recent_ops.iter().filter(|(t, _)| *t >= minute_ago).count();
        if ops_last_minute as u32 > self.rate_limit_per_minute {
            return Some(SecurityAlert {
                severity: Severity::Critical,
                description: format!("{ops_last_minute} rng ops in the last minute exceeds the configured limit"),
            });
        }

        if let Some(max_entropy) = self.recent_ops.iter().map(|(_, e)| *e).max() {
            let avg: usize = self.recent_ops.iter().map(|(_, e)| *e).sum::<usize>()
                / self.recent_ops.len().max(1);
            if avg > 0 && max_entropy > avg * 20 {
                return Some(SecurityAlert {
                    severity: Severity::Warning,
                    description: "extreme entropy-per-op outlier detected".to_string(),
                });
            }
        }

        let identical_run = self
            .recent_ops
            .iter()
            .rev()
            .take_while(|(_, e)| *e == self.recent_ops.back().map(|(_, e)| *e).unwrap_or(0))
            .count();
        if identical_run >= 50 {
            return Some(SecurityAlert {
                severity: Severity::Warning,
                description: format!("{identical_run} consecutive identical-shaped rng ops"),
            });
        }

        None
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SecurityAlert {
    pub severity: Severity,
    pub description: String,
}

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn concat_bytes<T: AsBytes>(seq: &[T]) -> Vec<u8> {
    let mut out = Vec::new();
    for item in seq {
        out.extend_from_slice(&item.as_bytes());
    }
    out
}

/// Minimal serialization contract so `shuffle`/`commit` can hash arbitrary
/// sequences (cards today, but kept generic so other ordered collections
/// could reuse the same shuffle/proof machinery).
pub trait AsBytes {
    fn as_bytes(&self) -> Vec<u8>;
}

impl AsBytes for Card {
    fn as_bytes(&self) -> Vec<u8> {
        vec![self.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::canonical_deck;

    fn rng() -> RngCore {
        RngCore::with_default_rate_limit(Duration::from_secs(300))
    }

    #[test]
    fn random_int_stays_in_bounds() {
        let mut r = rng();
        for _ in 0..1000 {
            let v = r.random_int(5, 9).unwrap();
            assert!((5..=9).contains(&v));
        }
    }

    #[test]
    fn random_int_single_value_range_is_trivial() {
        let mut r = rng();
        assert_eq!(r.random_int(7, 7).unwrap(), 7);
    }

    #[test]
    fn shuffle_is_a_permutation() {
        let mut r = rng();
        let deck = canonical_deck();
        let (shuffled, _proof) = r.shuffle(&deck).unwrap();
        assert!(crate::card::is_permutation_of_canonical(&shuffled));
    }

    #[test]
    fn commit_then_reveal_round_trips() {
        let mut r = rng();
        let deck = canonical_deck().to_vec();
        let table_id = Uuid::new_v4();
        let hand_id = Uuid::new_v4();
        let commitment = r.commit(&deck, table_id, hand_id).unwrap();
        let (shuffled, proof) = r.shuffle(&deck).unwrap();
        let reveal = r.reveal(&deck, &shuffled, &commitment, proof);
        assert!(reveal.is_valid());
    }

    #[test]
    fn reveal_rejects_tampered_commitment() {
        let mut r = rng();
        let deck = canonical_deck().to_vec();
        let table_id = Uuid::new_v4();
        let hand_id = Uuid::new_v4();
        let mut commitment = r.commit(&deck, table_id, hand_id).unwrap();
        commitment.hash[0] ^= 0xFF;
        let (shuffled, proof) = r.shuffle(&deck).unwrap();
        let reveal = r.reveal(&deck, &shuffled, &commitment, proof);
        assert!(!reveal.is_valid());
    }

    #[test]
    fn rate_limit_trips_after_configured_ops() {
        let mut r = RngCore::new(Duration::from_secs(300), 3);
        assert!(r.random_bytes(1).is_ok());
        assert!(r.random_bytes(1).is_ok());
        assert!(r.random_bytes(1).is_ok());
        assert!(matches!(r.random_bytes(1), Err(CoreError::RateLimited)));
    }
}
