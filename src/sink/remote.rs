//! Object store sink
//!
//! Uploads each reading to an object store key derived from the reading's
//! identity. The store is injected at construction; the sink never resolves
//! credentials or endpoints itself.

use crate::error::SinkError;
use crate::object::{ObjectHandle, object_key};
use crate::reading::Reading;
use crate::sink::Sink;
use async_trait::async_trait;
use bytes::Bytes;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Sink that uploads readings to an object store
pub struct RemoteSink {
    store: Arc<dyn ObjectStore>,
    /// Bucket label carried into ObjectHandles (the store itself is already
    /// bound to the bucket)
    bucket: String,
    prefix: Option<String>,
    written_count: AtomicU64,
}

impl RemoteSink {
    /// Create a new RemoteSink over an injected store
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            prefix: None,
            written_count: AtomicU64::new(0),
        }
    }

    /// Place all objects under a key prefix
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Total objects written
    pub fn written_count(&self) -> u64 {
        self.written_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Sink for RemoteSink {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn write(&self, reading: &Reading) -> Result<ObjectHandle, SinkError> {
        reading
            .validate()
            .map_err(|e| SinkError::InvalidReading(e.to_string()))?;
        let body = reading
            .to_json_bytes()
            .map_err(|e| SinkError::Serialization(e.to_string()))?;

        let key = object_key(&reading.site_id, reading.timestamp, self.prefix.as_deref());
        let size = body.len();
        self.store
            .put(&Path::from(key.as_str()), PutPayload::from(Bytes::from(body)))
            .await?;

        self.written_count.fetch_add(1, Ordering::Relaxed);
        debug!(
            bucket = %self.bucket,
            key = %key,
            bytes = size,
            "reading uploaded"
        );

        Ok(ObjectHandle::new(
            self.bucket.clone(),
            key,
            size,
            "application/json",
        ))
    }

    async fn health(&self) -> bool {
        // A missing probe object still proves the store is reachable.
        match self.store.head(&Path::from(".virta-health")).await {
            Ok(_) => true,
            Err(object_store::Error::NotFound { .. }) => true,
            Err(_) => false,
        }
    }
}
