//! In-memory keyed table
//!
//! The store used by tests and local mode. Implements the same conditional
//! write contract a remote keyed store provides natively, so the processor
//! behaves identically against either.

use crate::error::StoreError;
use crate::reading::{ReadingKey, StoredRecord};
use crate::store::{PutOutcome, RecordStore};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::collections::hash_map::Entry;

/// Thread-safe in-memory table keyed by `(site_id, timestamp)`
pub struct MemoryTable {
    rows: Mutex<HashMap<ReadingKey, StoredRecord>>,
}

impl MemoryTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch one record by key
    pub fn get(&self, key: &ReadingKey) -> Option<StoredRecord> {
        self.rows.lock().get(key).cloned()
    }

    /// Number of records in the table
    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    /// Check if the table is empty
    pub fn is_empty(&self) -> bool {
        self.rows.lock().is_empty()
    }
}

impl Default for MemoryTable {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for MemoryTable {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn put(&self, record: &StoredRecord) -> Result<PutOutcome, StoreError> {
        let mut rows = self.rows.lock();
        match rows.entry(record.key()) {
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(PutOutcome::Stored)
            }
            Entry::Occupied(slot) => {
                if slot.get().content_matches(record) {
                    Ok(PutOutcome::Duplicate)
                } else {
                    Ok(PutOutcome::Conflict {
                        existing: slot.get().clone(),
                    })
                }
            }
        }
    }
}
