//! Dead letter buffer for poison payloads
//!
//! In-memory buffer preserving unparseable object payloads for inspection.
//! NOT durable dead letter infrastructure - entries are lost on process
//! restart. For durable semantics, drain into external storage.

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// A payload that could not be parsed, kept with its failure context
#[derive(Debug, Clone)]
pub struct PoisonEntry {
    /// Bucket the object came from
    pub bucket: String,
    /// Object key
    pub key: String,
    /// The raw bytes exactly as fetched
    pub payload: Bytes,
    /// Error message from the parse failure
    pub error: String,
    /// When the failure occurred
    pub failed_at: Instant,
    /// Number of processing attempts observed for this object
    pub attempts: u32,
}

/// Bounded in-memory buffer of poison payloads
///
/// When full, the oldest entry is evicted; eviction is counted so capacity
/// pressure stays visible.
pub struct DeadLetterBuffer {
    entries: Mutex<VecDeque<PoisonEntry>>,
    capacity: usize,
    total_captured: AtomicU64,
    total_dropped: AtomicU64,
}

impl DeadLetterBuffer {
    /// Create a new buffer with the given capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
            total_captured: AtomicU64::new(0),
            total_dropped: AtomicU64::new(0),
        }
    }

    /// Capture one poison payload
    pub fn push(&self, entry: PoisonEntry) {
        let mut queue = self.entries.lock();
        if queue.len() >= self.capacity {
            queue.pop_front();
            self.total_dropped.fetch_add(1, Ordering::Relaxed);
        }
        queue.push_back(entry);
        self.total_captured.fetch_add(1, Ordering::Relaxed);
    }

    /// Remove and return up to n entries for inspection or reprocessing
    pub fn drain(&self, n: usize) -> Vec<PoisonEntry> {
        let mut queue = self.entries.lock();
        let count = n.min(queue.len());
        queue.drain(..count).collect()
    }

    /// Look at entries without removing them
    pub fn peek(&self, n: usize) -> Vec<PoisonEntry> {
        let queue = self.entries.lock();
        queue.iter().take(n).cloned().collect()
    }

    /// Current number of entries
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Check if the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Total entries ever captured
    pub fn total_captured(&self) -> u64 {
        self.total_captured.load(Ordering::Relaxed)
    }

    /// Total entries evicted due to capacity
    pub fn total_dropped(&self) -> u64 {
        self.total_dropped.load(Ordering::Relaxed)
    }

    /// Clear all entries
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
