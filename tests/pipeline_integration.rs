//! Integration tests for the ingestion pipeline
//!
//! These tests drive the full producer/consumer contract: sink writes,
//! notification decoding, processing with retries, and the conditional
//! keyed write.

use async_trait::async_trait;
use bytes::Bytes;
use object_store::ObjectStore;
use object_store::memory::InMemory;
use object_store::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use virta::error::{SinkError, StoreError};
use virta::processor::{ProcessOutcome, Processor, ProcessorConfig};
use virta::reading::{Reading, StoredRecord};
use virta::sink::{RemoteSink, Sink};
use virta::store::{MemoryTable, PutOutcome, RecordStore};
use virta::{
    BackoffConfig, DeadLetterBuffer, Decoded, IngestEvent, ObjectHandle, ObjectNotification,
    ProcessError, SimulatorLoop, decode,
};

// ============================================================================
// Test doubles
// ============================================================================

/// Record store that fails a configurable number of times, then delegates
struct FlakyStore {
    inner: MemoryTable,
    failures_remaining: AtomicU32,
    put_count: AtomicU32,
}

impl FlakyStore {
    fn new(failures: u32) -> Self {
        Self {
            inner: MemoryTable::new(),
            failures_remaining: AtomicU32::new(failures),
            put_count: AtomicU32::new(0),
        }
    }

    fn put_count(&self) -> u32 {
        self.put_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordStore for FlakyStore {
    fn name(&self) -> &'static str {
        "flaky"
    }

    async fn put(&self, record: &StoredRecord) -> Result<PutOutcome, StoreError> {
        self.put_count.fetch_add(1, Ordering::SeqCst);
        if self.failures_remaining.load(Ordering::SeqCst) > 0 {
            self.failures_remaining.fetch_sub(1, Ordering::SeqCst);
            return Err(StoreError::Transient("simulated throttling".into()));
        }
        self.inner.put(record).await
    }
}

/// Sink whose writes take a while, for observing in-flight completion
struct SlowSink {
    delay: Duration,
    started: AtomicU32,
    completed: AtomicU32,
}

impl SlowSink {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            started: AtomicU32::new(0),
            completed: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl Sink for SlowSink {
    fn name(&self) -> &'static str {
        "slow"
    }

    async fn write(&self, reading: &Reading) -> Result<ObjectHandle, SinkError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(ObjectHandle::new(
            "slow-bucket",
            format!("{}/{}.json", reading.site_id, reading.timestamp),
            0,
            "application/json",
        ))
    }

    async fn health(&self) -> bool {
        true
    }
}

/// Sink that always fails
struct BrokenSink {
    write_count: AtomicU32,
}

impl BrokenSink {
    fn new() -> Self {
        Self {
            write_count: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl Sink for BrokenSink {
    fn name(&self) -> &'static str {
        "broken"
    }

    async fn write(&self, _: &Reading) -> Result<ObjectHandle, SinkError> {
        self.write_count.fetch_add(1, Ordering::SeqCst);
        Err(SinkError::Io(std::io::Error::other("destination down")))
    }

    async fn health(&self) -> bool {
        false
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn fast_backoff() -> BackoffConfig {
    BackoffConfig {
        max_attempts: 5,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(10),
        multiplier: 2.0,
        jitter: 0.0,
    }
}

fn fast_processor_config() -> ProcessorConfig {
    ProcessorConfig {
        fetch_backoff: BackoffConfig {
            max_attempts: 3,
            ..fast_backoff()
        },
        put_backoff: fast_backoff(),
        op_timeout: Duration::from_millis(500),
        deadline: Duration::from_secs(5),
    }
}

fn make_processor(
    objects: Arc<dyn ObjectStore>,
    records: Arc<dyn RecordStore>,
) -> (Processor, Arc<DeadLetterBuffer>) {
    let dead_letter = Arc::new(DeadLetterBuffer::new(100));
    let processor = Processor::new(objects, records, dead_letter.clone())
        .with_config(fast_processor_config());
    (processor, dead_letter)
}

/// Decode a synthesized created-object notification into its single event
fn event_for(handle: &ObjectHandle) -> IngestEvent {
    let payload = ObjectNotification::object_created(&handle.bucket, &handle.key, handle.size)
        .to_bytes();
    let mut decoded = decode(&payload).expect("notification should decode");
    match decoded.remove(0) {
        Decoded::Actionable(event) => event,
        other => panic!("expected actionable event, got {other:?}"),
    }
}

// ============================================================================
// End-to-end: write → notify → decode → process
// ============================================================================

#[tokio::test]
async fn test_round_trip_produces_exactly_one_matching_record() {
    let objects = Arc::new(InMemory::new());
    let sink = RemoteSink::new(objects.clone(), "data-bucket");
    let table = Arc::new(MemoryTable::new());
    let (processor, _) = make_processor(objects, table.clone());

    let reading = Reading::new("site-42", 1000, 12.5).with_unit("kWh");
    let handle = sink.write(&reading).await.expect("write should succeed");
    assert_eq!(handle.key, "site-42/1000.json");

    let event = event_for(&handle);
    assert_eq!(event.bucket, "data-bucket");
    assert_eq!(event.key, "site-42/1000.json");

    let outcome = processor.handle(&event).await.expect("handle should succeed");
    assert!(matches!(outcome, ProcessOutcome::Stored(_)));

    assert_eq!(table.len(), 1);
    let record = table.get(&reading.key()).expect("record should exist");
    assert_eq!(record.site_id, "site-42");
    assert_eq!(record.timestamp, 1000);
    assert_eq!(record.value, 12.5);
    assert_eq!(record.unit.as_deref(), Some("kWh"));
    assert!(!record.anomaly);
    assert_eq!(record.source_object, "data-bucket/site-42/1000.json");
}

#[tokio::test]
async fn test_redelivered_event_is_an_idempotent_noop() {
    let objects = Arc::new(InMemory::new());
    let sink = RemoteSink::new(objects.clone(), "data-bucket");
    let table = Arc::new(MemoryTable::new());
    let (processor, _) = make_processor(objects, table.clone());

    let reading = Reading::new("site-42", 1000, 12.5);
    let handle = sink.write(&reading).await.expect("write should succeed");

    let first = processor.handle(&event_for(&handle)).await.expect("first");
    assert!(matches!(first, ProcessOutcome::Stored(_)));

    // At-least-once delivery: the same object arrives again.
    let second = processor.handle(&event_for(&handle)).await.expect("second");
    assert!(matches!(second, ProcessOutcome::Duplicate(_)));

    assert_eq!(table.len(), 1);
}

#[tokio::test]
async fn test_concurrent_redelivery_yields_exactly_one_record() {
    let objects = Arc::new(InMemory::new());
    let sink = RemoteSink::new(objects.clone(), "data-bucket");
    let table = Arc::new(MemoryTable::new());
    let (processor, _) = make_processor(objects, table.clone());
    let processor = Arc::new(processor);

    let handle = sink
        .write(&Reading::new("site-42", 1000, 12.5))
        .await
        .expect("write");

    // The hosting environment may invoke several processor instances for the
    // same event at once; the store's conditional write is the only
    // coordination point.
    let mut tasks = vec![];
    for _ in 0..8 {
        let processor = Arc::clone(&processor);
        let event = event_for(&handle);
        tasks.push(tokio::spawn(
            async move { processor.handle(&event).await },
        ));
    }
    let results: Vec<_> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.expect("task should not panic"))
        .collect();

    let stored = results
        .iter()
        .filter(|r| matches!(r, Ok(ProcessOutcome::Stored(_))))
        .count();
    let duplicates = results
        .iter()
        .filter(|r| matches!(r, Ok(ProcessOutcome::Duplicate(_))))
        .count();
    assert_eq!(stored, 1, "exactly one invocation wins the write");
    assert_eq!(stored + duplicates, 8, "the rest resolve as no-op duplicates");
    assert_eq!(table.len(), 1);
}

#[tokio::test]
async fn test_conflicting_content_is_reported_and_first_write_kept() {
    let objects = Arc::new(InMemory::new());
    let sink = RemoteSink::new(objects.clone(), "data-bucket");
    let table = Arc::new(MemoryTable::new());
    let (processor, _) = make_processor(objects.clone(), table.clone());

    let reading = Reading::new("site-42", 1000, 12.5);
    let handle = sink.write(&reading).await.expect("write should succeed");
    processor
        .handle(&event_for(&handle))
        .await
        .expect("first ingest");

    // The object is replaced with different content under the same key,
    // then the notification is redelivered.
    let altered = Reading::new("site-42", 1000, 99.0);
    objects
        .put(
            &Path::from("site-42/1000.json"),
            Bytes::from(altered.to_json_bytes().expect("serialize")).into(),
        )
        .await
        .expect("overwrite");

    let outcome = processor
        .handle(&event_for(&handle))
        .await
        .expect("conflict is a reported outcome, not an error");
    assert!(matches!(outcome, ProcessOutcome::Conflict(_)));

    // First writer wins.
    assert_eq!(table.len(), 1);
    assert_eq!(table.get(&reading.key()).expect("record").value, 12.5);
}

#[tokio::test]
async fn test_malformed_object_is_poison_and_payload_is_retained() {
    let objects = Arc::new(InMemory::new());
    objects
        .put(
            &Path::from("site-42/1000.json"),
            Bytes::from_static(b"{ definitely not json").into(),
        )
        .await
        .expect("seed object");

    let table = Arc::new(MemoryTable::new());
    let (processor, dead_letter) = make_processor(objects, table.clone());

    let payload =
        ObjectNotification::object_created("data-bucket", "site-42/1000.json", 21).to_bytes();
    let decoded = decode(&payload).expect("decode");
    let event = match &decoded[0] {
        Decoded::Actionable(event) => event.clone(),
        other => panic!("expected actionable, got {other:?}"),
    };

    let result = processor.handle(&event).await;
    assert!(matches!(result, Err(ProcessError::Poison { .. })));

    // No record written, raw bytes preserved for inspection.
    assert!(table.is_empty());
    assert_eq!(dead_letter.len(), 1);
    let entries = dead_letter.peek(1);
    assert_eq!(&entries[0].payload[..], b"{ definitely not json");
    assert_eq!(entries[0].key, "site-42/1000.json");

    // Redelivery of a poison event must not retry into success.
    let again = processor.handle(&event).await;
    assert!(matches!(again, Err(ProcessError::Poison { .. })));
    assert!(table.is_empty());
}

#[tokio::test]
async fn test_missing_object_is_reported_as_lost() {
    let objects = Arc::new(InMemory::new());
    let table = Arc::new(MemoryTable::new());
    let (processor, dead_letter) = make_processor(objects, table.clone());

    let payload =
        ObjectNotification::object_created("data-bucket", "site-7/555.json", 0).to_bytes();
    let decoded = decode(&payload).expect("decode");
    let event = match &decoded[0] {
        Decoded::Actionable(event) => event.clone(),
        other => panic!("expected actionable, got {other:?}"),
    };

    let result = processor.handle(&event).await;
    match result {
        Err(ProcessError::LostObject { bucket, key }) => {
            assert_eq!(bucket, "data-bucket");
            assert_eq!(key, "site-7/555.json");
        }
        other => panic!("expected lost object, got {other:?}"),
    }
    assert!(table.is_empty());
    assert!(dead_letter.is_empty());
}

// ============================================================================
// Retry behavior
// ============================================================================

#[tokio::test]
async fn test_transient_store_failures_are_retried_to_success() {
    let objects = Arc::new(InMemory::new());
    let sink = RemoteSink::new(objects.clone(), "data-bucket");
    let store = Arc::new(FlakyStore::new(2)); // fails twice, then works
    let (processor, _) = make_processor(objects, store.clone());

    let reading = Reading::new("site-42", 1000, 12.5);
    let handle = sink.write(&reading).await.expect("write");

    let outcome = processor
        .handle(&event_for(&handle))
        .await
        .expect("should succeed on the third attempt");
    assert!(matches!(outcome, ProcessOutcome::Stored(_)));
    assert_eq!(store.put_count(), 3);
    assert_eq!(store.inner.len(), 1);
}

#[tokio::test]
async fn test_store_outage_longer_than_budget_surfaces_transient() {
    let objects = Arc::new(InMemory::new());
    let sink = RemoteSink::new(objects.clone(), "data-bucket");
    let store = Arc::new(FlakyStore::new(100));
    let (processor, _) = make_processor(objects, store.clone());

    let handle = sink
        .write(&Reading::new("site-42", 1000, 12.5))
        .await
        .expect("write");

    let result = processor.handle(&event_for(&handle)).await;
    assert!(matches!(result, Err(ProcessError::Transient(_))));
    assert_eq!(store.put_count(), 5); // full retry budget spent
    assert_eq!(store.inner.len(), 0);
}

// ============================================================================
// Simulator loop
// ============================================================================

#[tokio::test]
async fn test_cancellation_lets_inflight_publish_complete() {
    let sink = Arc::new(SlowSink::new(Duration::from_millis(80)));
    let simulator = SimulatorLoop::new(
        sink.clone() as Arc<dyn Sink>,
        vec!["site-1"],
        Duration::from_millis(10),
    );
    let cancel = simulator.cancel_token();

    let handle = tokio::spawn(simulator.run());

    // Wait until a write is in flight, then cancel mid-publish.
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(sink.started.load(Ordering::SeqCst) >= 1);
    cancel.cancel();

    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("loop should stop promptly")
        .expect("loop task should not panic");

    // Nothing was abandoned partway: every started write finished.
    assert_eq!(
        sink.started.load(Ordering::SeqCst),
        sink.completed.load(Ordering::SeqCst)
    );
    assert!(sink.completed.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn test_publish_failures_never_terminate_the_loop() {
    let sink = Arc::new(BrokenSink::new());
    let simulator = SimulatorLoop::new(
        sink.clone() as Arc<dyn Sink>,
        vec!["site-1", "site-2"],
        Duration::from_millis(10),
    );
    let cancel = simulator.cancel_token();

    let handle = tokio::spawn(simulator.run());
    tokio::time::sleep(Duration::from_millis(100)).await;

    // The loop kept ticking through repeated failures.
    assert!(sink.write_count.load(Ordering::SeqCst) > 4);

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("loop should stop cleanly after sustained failures")
        .expect("loop task should not panic");
}

#[tokio::test]
async fn test_simulator_feeds_processor_through_notifications() {
    let objects = Arc::new(InMemory::new());
    let sink = Arc::new(RemoteSink::new(objects.clone(), "data-bucket"));
    let table = Arc::new(MemoryTable::new());
    let (processor, _) = make_processor(objects, table.clone());
    let processor = Arc::new(processor);

    let (tx, mut rx) = tokio::sync::mpsc::channel(64);
    let simulator = SimulatorLoop::new(
        sink as Arc<dyn Sink>,
        vec!["site-a", "site-b"],
        Duration::from_millis(20),
    )
    .on_publish(tx);
    let cancel = simulator.cancel_token();
    let sim_handle = tokio::spawn(simulator.run());

    let ingest = tokio::spawn({
        let processor = Arc::clone(&processor);
        async move {
            while let Some(handle) = rx.recv().await {
                let event = event_for(&handle);
                processor.handle(&event).await.expect("ingest should succeed");
            }
        }
    });

    tokio::time::sleep(Duration::from_millis(120)).await;
    cancel.cancel();
    sim_handle.await.expect("simulator task");
    ingest.await.expect("ingest task");

    // Both sites produced at least one stored record with intact keys.
    assert!(table.len() >= 2, "expected records from both sites");
}
