//! Processor for VIRTA
//!
//! One invocation per inbound event: fetch the object bytes, parse them into
//! a Reading, and conditionally write the derived record. The processor owns
//! no mutable state, so the host may run any number of invocations
//! concurrently; idempotency under redelivery comes entirely from the
//! store's conditional put.
//!
//! Each step is its own failure point:
//!
//! ```text
//! fetch  ─► transient (retried) or lost-object (reported, not retried)
//! parse  ─► poison (dead-lettered, never retried)
//! write  ─► transient (retried), duplicate (no-op), conflict (warned)
//! ```

use crate::deadletter::{DeadLetterBuffer, PoisonEntry};
use crate::error::{ProcessError, StoreError};
use crate::event::IngestEvent;
use crate::metrics;
use crate::reading::{Reading, ReadingKey, StoredRecord};
use crate::retry::{BackoffConfig, retry_with_backoff};
use crate::store::{PutOutcome, RecordStore};
use bytes::Bytes;
use object_store::ObjectStore;
use object_store::path::Path;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Processor tuning knobs
///
/// The backoff constants are policy: hosts override them through
/// configuration rather than editing call sites.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Backoff for object fetches
    pub fetch_backoff: BackoffConfig,
    /// Backoff for store puts
    pub put_backoff: BackoffConfig,
    /// Deadline for each individual external call
    pub op_timeout: Duration,
    /// Deadline for the whole invocation; overruns map to the transient
    /// case so the invoking environment may redeliver
    pub deadline: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            fetch_backoff: BackoffConfig::default(),
            put_backoff: BackoffConfig::default(),
            op_timeout: Duration::from_secs(10),
            deadline: Duration::from_secs(30),
        }
    }
}

/// Successful processing outcomes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// A new record was written
    Stored(ReadingKey),
    /// Redelivery resolved as an idempotent no-op
    Duplicate(ReadingKey),
    /// Same key, different content; the first write was preserved and the
    /// conflict reported
    Conflict(ReadingKey),
}

impl ProcessOutcome {
    /// Short label for metrics and logs
    pub fn label(&self) -> &'static str {
        match self {
            ProcessOutcome::Stored(_) => "stored",
            ProcessOutcome::Duplicate(_) => "duplicate",
            ProcessOutcome::Conflict(_) => "conflict",
        }
    }
}

/// Event processor: fetch, parse, keyed write
pub struct Processor {
    objects: Arc<dyn ObjectStore>,
    records: Arc<dyn RecordStore>,
    dead_letter: Arc<DeadLetterBuffer>,
    config: ProcessorConfig,
}

impl Processor {
    /// Create a processor with default configuration
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        records: Arc<dyn RecordStore>,
        dead_letter: Arc<DeadLetterBuffer>,
    ) -> Self {
        Self {
            objects,
            records,
            dead_letter,
            config: ProcessorConfig::default(),
        }
    }

    /// Override the configuration
    pub fn with_config(mut self, config: ProcessorConfig) -> Self {
        self.config = config;
        self
    }

    /// The buffer holding poison payloads captured by this processor
    pub fn dead_letter(&self) -> &Arc<DeadLetterBuffer> {
        &self.dead_letter
    }

    /// Process one inbound event under the invocation deadline
    pub async fn handle(&self, event: &IngestEvent) -> Result<ProcessOutcome, ProcessError> {
        let started = Instant::now();
        let result = match timeout(self.config.deadline, self.process(event)).await {
            Ok(result) => result,
            Err(_) => Err(ProcessError::Transient(format!(
                "invocation deadline of {:?} exceeded",
                self.config.deadline
            ))),
        };

        let elapsed = started.elapsed().as_secs_f64();
        match &result {
            Ok(outcome) => {
                metrics::try_record_written(outcome.label());
                metrics::try_record_latency("ok", elapsed);
                debug!(
                    event = %event.id,
                    key = %event.key,
                    outcome = outcome.label(),
                    "event processed"
                );
            }
            Err(err) => {
                metrics::try_record_process_failure(err.reason());
                metrics::try_record_latency("error", elapsed);
            }
        }
        result
    }

    async fn process(&self, event: &IngestEvent) -> Result<ProcessOutcome, ProcessError> {
        let bytes = self.fetch(event).await?;

        let reading = match Reading::from_object_bytes(&bytes, &event.key) {
            Ok(reading) => reading,
            Err(err) => {
                self.dead_letter.push(PoisonEntry {
                    bucket: event.bucket.clone(),
                    key: event.key.clone(),
                    payload: bytes,
                    error: err.to_string(),
                    failed_at: Instant::now(),
                    attempts: 1,
                });
                metrics::try_set_dead_letter_size(self.dead_letter.len());
                warn!(
                    event = %event.id,
                    key = %event.key,
                    error = %err,
                    "poison payload captured for inspection"
                );
                return Err(ProcessError::Poison {
                    key: event.key.clone(),
                    reason: err.to_string(),
                });
            }
        };

        let record = StoredRecord::from_reading(&reading, event.uri());
        let key = record.key();
        match self.put(&record, event).await? {
            PutOutcome::Stored => {
                info!(key = %key, value = record.value, "record stored");
                Ok(ProcessOutcome::Stored(key))
            }
            PutOutcome::Duplicate => {
                debug!(key = %key, "redelivered event resolved as duplicate");
                Ok(ProcessOutcome::Duplicate(key))
            }
            PutOutcome::Conflict { existing } => {
                warn!(
                    key = %key,
                    stored_value = existing.value,
                    incoming_value = record.value,
                    source_object = %record.source_object,
                    "content conflict under existing key, keeping first write"
                );
                Ok(ProcessOutcome::Conflict(key))
            }
        }
    }

    /// Retrieve the object bytes, retrying transient failures.
    ///
    /// Not-found is retried too - object visibility can lag the notification
    /// - and classified as lost only once the budget is spent.
    async fn fetch(&self, event: &IngestEvent) -> Result<Bytes, ProcessError> {
        let path = Path::from(event.key.as_str());
        let result = retry_with_backoff(
            &self.config.fetch_backoff,
            "object fetch",
            || async {
                match timeout(self.config.op_timeout, read_object(&*self.objects, &path)).await {
                    Ok(fetched) => fetched.map_err(FetchFailure::Store),
                    Err(_) => Err(FetchFailure::Timeout(self.config.op_timeout)),
                }
            },
            |_| true,
        )
        .await;

        result.map_err(|err| match err {
            FetchFailure::Store(object_store::Error::NotFound { .. }) => {
                warn!(
                    event = %event.id,
                    key = %event.key,
                    "referenced object no longer exists"
                );
                ProcessError::LostObject {
                    bucket: event.bucket.clone(),
                    key: event.key.clone(),
                }
            }
            FetchFailure::Store(err) => ProcessError::Transient(err.to_string()),
            FetchFailure::Timeout(limit) => {
                ProcessError::Transient(format!("fetch exceeded {limit:?}"))
            }
        })
    }

    /// Write the record, retrying transient store failures
    async fn put(
        &self,
        record: &StoredRecord,
        event: &IngestEvent,
    ) -> Result<PutOutcome, ProcessError> {
        let result = retry_with_backoff(
            &self.config.put_backoff,
            "record put",
            || async {
                match timeout(self.config.op_timeout, self.records.put(record)).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(StoreError::Transient(format!(
                        "put exceeded {:?}",
                        self.config.op_timeout
                    ))),
                }
            },
            StoreError::is_transient,
        )
        .await;

        result.map_err(|err| match err {
            StoreError::Transient(reason) => ProcessError::Transient(reason),
            StoreError::Rejected(reason) => ProcessError::Rejected {
                key: event.key.clone(),
                reason,
            },
        })
    }
}

async fn read_object(store: &dyn ObjectStore, path: &Path) -> Result<Bytes, object_store::Error> {
    store.get(path).await?.bytes().await
}

/// Internal classification for fetch attempts
enum FetchFailure {
    Store(object_store::Error),
    Timeout(Duration),
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchFailure::Store(err) => write!(f, "{err}"),
            FetchFailure::Timeout(limit) => write!(f, "timed out after {limit:?}"),
        }
    }
}
