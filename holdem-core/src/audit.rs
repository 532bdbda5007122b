//! Append-only audit sink and the per-actor buffer that feeds it.
//!
//! The teacher records an audit trail as on-chain `#[event]`s
//! (`events.rs`'s `HandCompleted`). Off the chain there is no ledger to log
//! into, so this crate owns the interface described in §4.8/§6: batched,
//! append-only, keyed by `audit-batch/{table_id}/{batch_id}.json` and a
//! daily index, with a 90-day retention window.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{DEFAULT_AUDIT_BATCH_SIZE, DEFAULT_AUDIT_FLUSH_INTERVAL, DEFAULT_RETENTION};
use crate::rng::SecurityAlert;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationKind {
    DeckCommit,
    DeckShuffle,
    DeckReveal,
    DealCards,
    PlayerAction,
    HandStarted,
    HandCompleted,
    TableBalanceMove,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub operation: OperationKind,
    pub table_id: Uuid,
    pub hand_id: Option<Uuid>,
    pub timestamp_unix: i64,
    pub entropy_bytes_consumed: usize,
    pub input_hash: Option<[u8; 32]>,
    pub output_hash: Option<[u8; 32]>,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SecurityAlertRecord {
    pub id: Uuid,
    pub table_id: Uuid,
    pub timestamp_unix: i64,
    pub alert: SecurityAlert,
}

/// The only component permitted to cross the process boundary for storage.
/// Every other component is a pure in-memory owner of its own state.
pub trait AuditSink: Send + Sync {
    fn append_batch(&self, table_id: Uuid, records: Vec<AuditRecord>);
    fn append_alert(&self, record: SecurityAlertRecord);
    /// Deletes records older than the retention window. Returns the number
    /// of records removed. Never runs implicitly on size alone.
    fn cleanup(&self, now_unix: i64, retention: Duration) -> usize;
    fn records_for_table(&self, table_id: Uuid) -> Vec<AuditRecord>;
}

/// Reference in-memory implementation, grouped into dated indices so
/// `records_for_table` can emulate a time-range lookup the way the
/// persisted layout (`audit-index/{table_id}/{date}.json`) implies.
#[derive(Default)]
pub struct InMemoryAuditSink {
    batches: DashMap<Uuid, Vec<AuditRecord>>,
    alerts: DashMap<Uuid, Vec<SecurityAlertRecord>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn alerts_for_table(&self, table_id: Uuid) -> Vec<SecurityAlertRecord> {
        self.alerts.get(&table_id).map(|v| v.clone()).unwrap_or_default()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn append_batch(&self, table_id: Uuid, records: Vec<AuditRecord>) {
        self.batches.entry(table_id).or_default().extend(records);
    }

    fn append_alert(&self, record: SecurityAlertRecord) {
        self.alerts.entry(record.table_id).or_default().push(record);
    }

    fn cleanup(&self, now_unix: i64, retention: Duration) -> usize {
        let cutoff = now_unix - retention.as_secs() as i64;
        let mut removed = 0;
        for mut entry in self.batches.iter_mut() {
            let before = entry.value().len();
            entry.value_mut().retain(|r| r.timestamp_unix >= cutoff);
            removed += before - entry.value().len();
        }
        removed
    }

    fn records_for_table(&self, table_id: Uuid) -> Vec<AuditRecord> {
        self.batches.get(&table_id).map(|v| v.clone()).unwrap_or_default()
    }
}

/// Buffers audit records in memory between flushes. Owned by each table
/// actor; one flush path feeds a shared `AuditSink`.
pub struct AuditBuffer {
    buffer: Vec<AuditRecord>,
    batch_size: usize,
    flush_interval: Duration,
    last_flush: Instant,
}

impl Default for AuditBuffer {
    fn default() -> Self {
        AuditBuffer {
            buffer: Vec::new(),
            batch_size: DEFAULT_AUDIT_BATCH_SIZE,
            flush_interval: DEFAULT_AUDIT_FLUSH_INTERVAL,
            last_flush: Instant::now(),
        }
    }
}

impl AuditBuffer {
    pub fn with_capacity(batch_size: usize, flush_interval: Duration) -> Self {
        AuditBuffer { batch_size, flush_interval, ..Self::default() }
    }

    pub fn push(&mut self, record: AuditRecord) {
        self.buffer.push(record);
    }

    /// True once the buffer should be flushed: batch threshold reached or
    /// the flush interval has elapsed.
    pub fn should_flush(&self) -> bool {
        self.buffer.len() >= self.batch_size || self.last_flush.elapsed() >= self.flush_interval
    }

    /// Flushes unconditionally (also called when the actor quiesces).
    pub fn flush(&mut self, table_id: Uuid, sink: &dyn AuditSink) {
        if self.buffer.is_empty() {
            return;
        }
        let records = std::mem::take(&mut self.buffer);
        sink.append_batch(table_id, records);
        self.last_flush = Instant::now();
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

pub fn default_retention() -> Duration {
    DEFAULT_RETENTION
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(table_id: Uuid, ts: i64) -> AuditRecord {
        AuditRecord {
            id: Uuid::new_v4(),
            operation: OperationKind::PlayerAction,
            table_id,
            hand_id: None,
            timestamp_unix: ts,
            entropy_bytes_consumed: 0,
            input_hash: None,
            output_hash: None,
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn buffer_flushes_at_batch_threshold() {
        let sink = InMemoryAuditSink::new();
        let mut buf = AuditBuffer::with_capacity(2, Duration::from_secs(3600));
        let table_id = Uuid::new_v4();
        buf.push(record(table_id, 0));
        assert!(!buf.should_flush());
        buf.push(record(table_id, 0));
        assert!(buf.should_flush());
        buf.flush(table_id, sink.as_ref());
        assert_eq!(sink.records_for_table(table_id).len(), 2);
        assert!(buf.is_empty());
    }

    #[test]
    fn cleanup_only_removes_records_past_retention() {
        let sink = InMemoryAuditSink::new();
        let table_id = Uuid::new_v4();
        sink.append_batch(table_id, vec![record(table_id, 0), record(table_id, 1_000_000)]);
        let removed = sink.cleanup(1_000_000, Duration::from_secs(10));
        assert_eq!(removed, 1);
        assert_eq!(sink.records_for_table(table_id).len(), 1);
    }
}
