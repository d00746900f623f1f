//! Error types for VIRTA

use thiserror::Error;

/// Result type alias for VIRTA operations
pub type Result<T> = std::result::Result<T, VirtaError>;

/// Main error type for VIRTA
#[derive(Error, Debug)]
pub enum VirtaError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A reading failed validation
    #[error("invalid reading: {0}")]
    InvalidReading(String),

    /// Metrics error
    #[error("metrics error: {0}")]
    Metrics(String),
}

/// Error type for sink writes
#[derive(Error, Debug)]
pub enum SinkError {
    /// The reading failed validation before serialization
    #[error("invalid reading: {0}")]
    InvalidReading(String),

    /// Serialization failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// IO error (local filesystem variant)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Object store error (remote variant)
    #[error("object store error: {0}")]
    Store(#[from] object_store::Error),

    /// Retry budget exhausted
    #[error("write failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

impl SinkError {
    /// Whether retrying the write can plausibly succeed.
    ///
    /// IO and store errors cover connectivity and throttling; a reading that
    /// fails validation or serialization will fail the same way every time.
    pub fn is_transient(&self) -> bool {
        matches!(self, SinkError::Io(_) | SinkError::Store(_))
    }
}

/// Error type for inbound event decoding
///
/// Distinct from the "ignored" case: a notification for a non-created event
/// or a filtered key is not an error at all.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The payload was not a recognizable notification
    #[error("malformed event payload: {0}")]
    Malformed(String),

    /// A record was present but missing a required field
    #[error("event record missing required field: {0}")]
    MissingField(&'static str),
}

/// Error type for keyed store writes
#[derive(Error, Debug)]
pub enum StoreError {
    /// Connectivity or throttling; retry with backoff
    #[error("transient store error: {0}")]
    Transient(String),

    /// The store rejected the record outright (schema mismatch etc.)
    #[error("store rejected record: {0}")]
    Rejected(String),
}

impl StoreError {
    /// Whether retrying the put can plausibly succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

/// Error type for event processing
///
/// The variants map onto the redelivery contract with the invoking
/// environment: only `Transient` is worth redelivering.
#[derive(Error, Debug)]
pub enum ProcessError {
    /// Retries exhausted or deadline exceeded; the event may be redelivered
    #[error("transient failure: {0}")]
    Transient(String),

    /// The event referenced an object that no longer exists
    #[error("object {bucket}/{key} no longer exists")]
    LostObject { bucket: String, key: String },

    /// Malformed payload; preserved in the dead letter buffer, never retried
    #[error("poison payload at {key}: {reason}")]
    Poison { key: String, reason: String },

    /// The store rejected the record; not retryable
    #[error("store rejected record for {key}: {reason}")]
    Rejected { key: String, reason: String },
}

impl ProcessError {
    /// Short label for metrics and logs
    pub fn reason(&self) -> &'static str {
        match self {
            ProcessError::Transient(_) => "transient",
            ProcessError::LostObject { .. } => "lost_object",
            ProcessError::Poison { .. } => "poison",
            ProcessError::Rejected { .. } => "rejected",
        }
    }
}
