//! Idempotency cache and request coalescing (spec §4.6, §9).
//!
//! Three strategies apply per command: `cache` (TTL map keyed by
//! `idempotency_key`, hit returns the stored response without
//! re-executing), `coalesce` (concurrent same-key commands arriving within
//! a window share one execution), and `both` (cache first, coalesce on
//! miss). Only successful outcomes are cached — a rejected command is
//! never replayed as a cached success.
//!
//! The source's merge strategy for coalesced responses is a string enum
//! ("first", "last", "merge"); since a coalesced batch only ever runs the
//! underlying command once, "first" and "last" are the same value in
//! practice and only "merge" differs, wrapping the single result into a
//! `{results, batch_size}` shape so callers can see how many requests were
//! folded into the batch.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::broadcast;

/// A cacheable/coalesceable result: only [`Outcome::is_cacheable`] values
/// are ever written into the TTL cache.
pub trait Outcome: Clone + Send + Sync + 'static {
    fn is_cacheable(&self) -> bool;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DedupeStrategy {
    Cache,
    Coalesce,
    Both,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeStrategy {
    First,
    Last,
    Merge,
}

#[derive(Clone, Debug)]
pub struct CoalescedOutcome<T> {
    pub result: T,
    pub merged: Option<MergedBatch<T>>,
}

#[derive(Clone, Debug)]
pub struct MergedBatch<T> {
    pub results: Vec<T>,
    pub batch_size: usize,
}

impl<T> CoalescedOutcome<T> {
    fn solo(result: T) -> Self {
        CoalescedOutcome { result, merged: None }
    }
}

struct CacheEntry<T> {
    value: T,
    expires_at: Instant,
}

struct InFlight<T> {
    tx: broadcast::Sender<(T, usize)>,
    batch_size: Arc<AtomicUsize>,
}

pub struct IdempotencyCache<T: Outcome> {
    entries: DashMap<String, CacheEntry<T>>,
    in_flight: DashMap<String, InFlight<T>>,
    ttl: Duration,
    coalesce_window: Duration,
    max_batch_size: usize,
}

impl<T: Outcome> IdempotencyCache<T> {
    pub fn new(ttl: Duration, coalesce_window: Duration, max_batch_size: usize) -> Self {
        IdempotencyCache {
            entries: DashMap::new(),
            in_flight: DashMap::new(),
            ttl,
            coalesce_window,
            max_batch_size,
        }
    }

    fn cached(&self, key: &str) -> Option<T> {
        let entry = self.entries.get(key)?;
        if entry.expires_at > Instant::now() {
            Some(entry.value.clone())
        } else {
            drop(entry);
            self.entries.remove(key);
            None
        }
    }

    fn store(&self, key: &str, value: &T) {
        if value.is_cacheable() {
            self.entries.insert(
                key.to_string(),
                CacheEntry { value: value.clone(), expires_at: Instant::now() + self.ttl },
            );
        }
    }

    /// Runs `f` under the given dedupe/merge strategy. `key = None` (no
    /// `idempotency_key` sent) or `bypass = true` (bypass header set)
    /// always executes `f` directly.
    pub async fn execute<F, Fut>(
        &self,
        key: Option<&str>,
        strategy: DedupeStrategy,
        merge: MergeStrategy,
        bypass: bool,
        f: F,
    ) -> CoalescedOutcome<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        let Some(key) = key.filter(|_| !bypass) else {
            return CoalescedOutcome::solo(f().await);
        };

        let check_cache = matches!(strategy, DedupeStrategy::Cache | DedupeStrategy::Both);
        let use_coalesce = matches!(strategy, DedupeStrategy::Coalesce | DedupeStrategy::Both);

        if check_cache {
            if let Some(value) = self.cached(key) {
                return CoalescedOutcome::solo(value);
            }
        }

        if !use_coalesce {
            let value = f().await;
            self.store(key, &value);
            return CoalescedOutcome::solo(value);
        }

        match self.in_flight.entry(key.to_string()) {
            Entry::Vacant(slot) => {
                let (tx, _rx) = broadcast::channel(1);
                let batch_size = Arc::new(AtomicUsize::new(1));
                slot.insert(InFlight { tx: tx.clone(), batch_size: batch_size.clone() });

                tokio::time::sleep(self.coalesce_window).await;
                self.in_flight.remove(key);

                let value = f().await;
                self.store(key, &value);
                let size = batch_size.load(Ordering::SeqCst);
                let _ = tx.send((value.clone(), size));
                self.shape(value, size, merge)
            }
            Entry::Occupied(existing) => {
                let batch_size = existing.get().batch_size.clone();
                let size_now = batch_size.fetch_add(1, Ordering::SeqCst) + 1;
                if size_now > self.max_batch_size {
                    batch_size.fetch_sub(1, Ordering::SeqCst);
                    drop(existing);
                    // This batch is already full; run standalone rather than
                    // waiting on the entry for the leader's window to close.
                    let value = f().await;
                    self.store(key, &value);
                    return CoalescedOutcome::solo(value);
                }
                let mut rx = existing.get().tx.subscribe();
                drop(existing);
                match rx.recv().await {
                    Ok((value, size)) => self.shape(value, size, merge),
                    Err(_) => {
                        // Leader vanished without sending; fall back to executing ourselves.
                        let value = f().await;
                        self.store(key, &value);
                        CoalescedOutcome::solo(value)
                    }
                }
            }
        }
    }

    fn shape(&self, value: T, batch_size: usize, merge: MergeStrategy) -> CoalescedOutcome<T> {
        match merge {
            MergeStrategy::First | MergeStrategy::Last => CoalescedOutcome::solo(value),
            MergeStrategy::Merge => CoalescedOutcome {
                result: value.clone(),
                merged: Some(MergedBatch { results: vec![value; batch_size], batch_size }),
            },
        }
    }

    pub fn evict_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.expires_at > now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[derive(Clone, Debug, PartialEq, Eq)]
    struct TestOutcome(Result<u32, &'static str>);

    impl Outcome for TestOutcome {
        fn is_cacheable(&self) -> bool {
            self.0.is_ok()
        }
    }

    #[tokio::test]
    async fn cache_hit_skips_re_execution() {
        let cache: IdempotencyCache<TestOutcome> =
            IdempotencyCache::new(Duration::from_secs(60), Duration::from_millis(100), 8);
        let calls = Arc::new(AtomicU32::new(0));

        let run = |calls: Arc<AtomicU32>| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            TestOutcome(Ok(7))
        };

        let first = cache
            .execute(Some("k1"), DedupeStrategy::Cache, MergeStrategy::First, false, || run(calls.clone()))
            .await;
        let second = cache
            .execute(Some("k1"), DedupeStrategy::Cache, MergeStrategy::First, false, || run(calls.clone()))
            .await;

        assert_eq!(first.result, TestOutcome(Ok(7)));
        assert_eq!(second.result, TestOutcome(Ok(7)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_commands_with_same_key_coalesce_into_one_execution() {
        let cache: Arc<IdempotencyCache<TestOutcome>> =
            Arc::new(IdempotencyCache::new(Duration::from_secs(60), Duration::from_millis(50), 8));
        let calls = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .execute(Some("join-3"), DedupeStrategy::Coalesce, MergeStrategy::Merge, false, || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        TestOutcome(Ok(42))
                    })
                    .await
            }));
        }

        let mut outcomes = Vec::new();
        for h in handles {
            outcomes.push(h.await.unwrap());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for outcome in &outcomes {
            assert_eq!(outcome.result, TestOutcome(Ok(42)));
            let merged = outcome.merged.as_ref().expect("merge strategy always sets merged");
            assert_eq!(merged.batch_size, 5);
        }
    }

    #[tokio::test]
    async fn bypass_always_executes() {
        let cache: IdempotencyCache<TestOutcome> =
            IdempotencyCache::new(Duration::from_secs(60), Duration::from_millis(100), 8);
        let calls = Arc::new(AtomicU32::new(0));

        for _ in 0..3 {
            let calls = calls.clone();
            cache
                .execute(Some("k2"), DedupeStrategy::Both, MergeStrategy::First, true, || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    TestOutcome(Ok(1))
                })
                .await;
        }

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn rejected_outcomes_are_not_cached() {
        let cache: IdempotencyCache<TestOutcome> =
            IdempotencyCache::new(Duration::from_secs(60), Duration::from_millis(100), 8);
        let calls = Arc::new(AtomicU32::new(0));

        for _ in 0..2 {
            let calls = calls.clone();
            cache
                .execute(Some("k3"), DedupeStrategy::Cache, MergeStrategy::First, false, || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    TestOutcome(Err("rejected"))
                })
                .await;
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
