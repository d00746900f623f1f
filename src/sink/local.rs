//! Local filesystem sink
//!
//! Writes each reading under a configured directory, one file per reading.
//! Publication is atomic: the payload lands in a temp file first and is
//! renamed into place, so a reader never observes a partial object.

use crate::error::SinkError;
use crate::object::{ObjectHandle, object_key};
use crate::reading::Reading;
use crate::sink::Sink;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tracing::debug;

/// Sink that writes readings as files under a root directory
pub struct LocalSink {
    root: PathBuf,
    /// Count of objects written
    written_count: AtomicU64,
}

impl LocalSink {
    /// Create a new LocalSink rooted at the given directory
    ///
    /// The directory (and per-site subdirectories) are created on demand.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            written_count: AtomicU64::new(0),
        }
    }

    /// Total objects written
    pub fn written_count(&self) -> u64 {
        self.written_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Sink for LocalSink {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn write(&self, reading: &Reading) -> Result<ObjectHandle, SinkError> {
        reading
            .validate()
            .map_err(|e| SinkError::InvalidReading(e.to_string()))?;
        let body = reading
            .to_json_bytes()
            .map_err(|e| SinkError::Serialization(e.to_string()))?;

        let key = object_key(&reading.site_id, reading.timestamp, None);
        let final_path = self.root.join(&key);
        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Temp-then-rename keeps partially written objects invisible.
        let tmp_path = final_path.with_extension("json.tmp");
        fs::write(&tmp_path, &body).await?;
        fs::rename(&tmp_path, &final_path).await?;

        self.written_count.fetch_add(1, Ordering::Relaxed);
        debug!(
            path = %final_path.display(),
            bytes = body.len(),
            "reading published locally"
        );

        Ok(ObjectHandle::new(
            self.root.display().to_string(),
            key,
            body.len(),
            "application/json",
        ))
    }

    async fn health(&self) -> bool {
        fs::create_dir_all(&self.root).await.is_ok()
    }
}
