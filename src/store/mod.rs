//! Keyed record store for VIRTA
//!
//! The store is the only shared mutable resource in the pipeline. Its
//! conditional put is the sole correctness backstop against duplicate and
//! out-of-order delivery: concurrent processor invocations coordinate
//! through it, never through in-process locking.

pub mod memory;

use crate::error::StoreError;
use crate::reading::StoredRecord;
use async_trait::async_trait;

pub use memory::MemoryTable;

/// Outcome of a conditional put
#[derive(Debug, Clone, PartialEq)]
pub enum PutOutcome {
    /// The record was written
    Stored,
    /// A record with the same key and identical content already exists;
    /// the put resolved as a no-op
    Duplicate,
    /// A record with the same key but different content exists. The first
    /// write is preserved; the caller decides how loudly to report it.
    Conflict { existing: StoredRecord },
}

/// RecordStore trait - conditional, idempotent writes into a keyed table
///
/// The write succeeds only if no record exists for the key, or one exists
/// with identical content. Redelivered events therefore resolve to
/// [`PutOutcome::Duplicate`] rather than overwriting anything.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Store name for identification and logging
    fn name(&self) -> &'static str;

    /// Conditionally write one record
    async fn put(&self, record: &StoredRecord) -> Result<PutOutcome, StoreError>;

    /// Write several records, preserving per-record idempotency.
    ///
    /// The batch is not atomic: each record gets its own outcome, and a
    /// failure for one record does not undo the others.
    async fn put_batch(&self, records: &[StoredRecord]) -> Vec<Result<PutOutcome, StoreError>> {
        let mut outcomes = Vec::with_capacity(records.len());
        for record in records {
            outcomes.push(self.put(record).await);
        }
        outcomes
    }
}
