//! Retry wrapper for sinks
//!
//! Wraps any Sink with bounded exponential backoff over transient failures.
//! Permanent failures (validation, serialization) pass through untouched;
//! a spent retry budget surfaces as `SinkError::RetriesExhausted`.

use crate::error::SinkError;
use crate::object::ObjectHandle;
use crate::reading::Reading;
use crate::retry::{BackoffConfig, retry_with_backoff};
use crate::sink::Sink;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// Sink wrapper that retries transient write failures
///
/// # Example
///
/// ```ignore
/// let sink = RetrySink::wrap(RemoteSink::new(store, "data"), BackoffConfig::default());
/// ```
pub struct RetrySink {
    inner: Arc<dyn Sink>,
    config: BackoffConfig,
}

impl RetrySink {
    /// Wrap an Arc'd sink
    pub fn new(inner: Arc<dyn Sink>, config: BackoffConfig) -> Self {
        Self { inner, config }
    }

    /// Wrap an owned sink
    pub fn wrap<S: Sink + 'static>(sink: S, config: BackoffConfig) -> Self {
        Self::new(Arc::new(sink), config)
    }
}

#[async_trait]
impl Sink for RetrySink {
    fn name(&self) -> &'static str {
        "retry"
    }

    async fn write(&self, reading: &Reading) -> Result<ObjectHandle, SinkError> {
        let result = retry_with_backoff(
            &self.config,
            "sink write",
            || self.inner.write(reading),
            SinkError::is_transient,
        )
        .await;

        result.map_err(|err| {
            if err.is_transient() {
                warn!(
                    sink = self.inner.name(),
                    site = %reading.site_id,
                    attempts = self.config.max_attempts,
                    error = %err,
                    "sink write failed after retries"
                );
                SinkError::RetriesExhausted {
                    attempts: self.config.max_attempts,
                    last: err.to_string(),
                }
            } else {
                err
            }
        })
    }

    async fn health(&self) -> bool {
        self.inner.health().await
    }

    async fn shutdown(&self) -> Result<(), SinkError> {
        self.inner.shutdown().await
    }
}
