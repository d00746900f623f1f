//! Sink system for VIRTA
//!
//! Sinks persist one Reading as one whole object. Either the full serialized
//! payload exists at the destination key or nothing does: the local variant
//! publishes via temp-file-and-rename, the remote variant relies on the
//! store's atomic PUT.

pub mod local;
pub mod remote;
pub mod retry;

use crate::error::SinkError;
use crate::object::ObjectHandle;
use crate::reading::Reading;
use async_trait::async_trait;

pub use local::LocalSink;
pub use remote::RemoteSink;
pub use retry::RetrySink;

/// Sink trait - persists Readings as objects
///
/// # Example
///
/// ```ignore
/// struct MyBackendSink {
///     client: MyStorageClient,
/// }
///
/// #[async_trait]
/// impl Sink for MyBackendSink {
///     fn name(&self) -> &'static str { "my-backend" }
///
///     async fn write(&self, reading: &Reading) -> Result<ObjectHandle, SinkError> {
///         let key = object_key(&reading.site_id, reading.timestamp, None);
///         self.client.put(&key, reading.to_json_bytes()?).await?;
///         Ok(ObjectHandle::new("my-bucket", key, len, "application/json"))
///     }
///
///     async fn health(&self) -> bool {
///         self.client.ping().await.is_ok()
///     }
/// }
/// ```
#[async_trait]
pub trait Sink: Send + Sync {
    /// Sink name for identification and logging
    fn name(&self) -> &'static str;

    /// Persist one reading as one object
    ///
    /// # Returns
    /// A handle to the created object, or a SinkError on failure. Exactly one
    /// object is created per successful call.
    async fn write(&self, reading: &Reading) -> Result<ObjectHandle, SinkError>;

    /// Health check for the destination
    async fn health(&self) -> bool;

    /// Graceful shutdown
    async fn shutdown(&self) -> Result<(), SinkError> {
        Ok(())
    }
}
