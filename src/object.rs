//! Object references and the key naming convention
//!
//! Published objects follow `{site_id}/{timestamp}.json` (optionally under a
//! configured prefix). The convention is stable enough that the processor can
//! recover site and timestamp from the key alone when a payload omits them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reference to one stored object
///
/// Produced by a sink write, consumed by the event decoder. An object is read
/// once under normal operation but must stay re-readable: notifications may
/// be delivered more than once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectHandle {
    /// Bucket name, or the root directory for the local variant
    pub bucket: String,
    /// Object key relative to the bucket
    pub key: String,
    /// Payload size in bytes
    pub size: usize,
    /// MIME type of the payload
    pub content_type: String,
}

impl ObjectHandle {
    /// Create a new ObjectHandle
    pub fn new(
        bucket: impl Into<String>,
        key: impl Into<String>,
        size: usize,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            size,
            content_type: content_type.into(),
        }
    }

    /// Provenance pointer stored alongside each record
    pub fn uri(&self) -> String {
        format!("{}/{}", self.bucket, self.key)
    }
}

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

/// Derive the object key for a reading
pub fn object_key(site_id: &str, timestamp: i64, prefix: Option<&str>) -> String {
    match prefix {
        Some(prefix) => format!(
            "{}/{site_id}/{timestamp}.json",
            prefix.trim_end_matches('/')
        ),
        None => format!("{site_id}/{timestamp}.json"),
    }
}

/// Recover `(site_id, timestamp)` from an object key.
///
/// Only the last two path components matter, so keys under any prefix parse
/// the same way. Returns `None` for keys outside the naming convention.
pub fn parse_object_key(key: &str) -> Option<(String, i64)> {
    let stem = key.strip_suffix(".json")?;
    let mut components = stem.rsplitn(3, '/');
    let timestamp: i64 = components.next()?.parse().ok()?;
    let site_id = components.next()?;
    if site_id.is_empty() {
        return None;
    }
    Some((site_id.to_string(), timestamp))
}
