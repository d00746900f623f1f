//! Inbound event decoding for VIRTA
//!
//! Buckets announce new objects with a records-wrapped notification payload.
//! Decoding sorts each record into one of three buckets: actionable (a
//! created object matching the key filter), ignored (wrong event type or
//! key, no action needed), or malformed (reported as a [`DecodeError`]).
//!
//! Decoding is pure: no IO, no retries, no panics on hostile input.

use crate::error::DecodeError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Only keys with this suffix are processed
pub const OBJECT_SUFFIX: &str = ".json";

const CREATED_PREFIX: &str = "ObjectCreated";

/// Wire shape of a bucket notification
///
/// Serialize is derived as well so hosts and tests can synthesize payloads
/// when looping locally published objects back into the processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectNotification {
    #[serde(rename = "Records", default)]
    pub records: Vec<NotificationRecord>,
}

/// One record inside a notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    #[serde(rename = "eventName", default)]
    pub event_name: String,
    #[serde(rename = "s3")]
    pub storage: StorageEntity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageEntity {
    pub bucket: BucketRef,
    pub object: ObjectRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketRef {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectRef {
    #[serde(default)]
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl ObjectNotification {
    /// Synthesize a created-object notification for one object
    pub fn object_created(bucket: &str, key: &str, size: usize) -> Self {
        Self {
            records: vec![NotificationRecord {
                event_name: format!("{CREATED_PREFIX}:Put"),
                storage: StorageEntity {
                    bucket: BucketRef {
                        name: bucket.to_string(),
                    },
                    object: ObjectRef {
                        key: key.to_string(),
                        size: Some(size as u64),
                    },
                },
            }],
        }
    }

    /// Serialize to the wire payload
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }
}

/// A decoded, actionable notification: one created object to process
#[derive(Debug, Clone)]
pub struct IngestEvent {
    /// Unique identifier (ULID) for log correlation
    pub id: String,
    pub bucket: String,
    pub key: String,
    /// The raw event name (always a created variant for actionable events)
    pub event_type: String,
    pub size: Option<u64>,
    pub received_at: DateTime<Utc>,
}

impl IngestEvent {
    /// Provenance pointer carried into stored records
    pub fn uri(&self) -> String {
        format!("{}/{}", self.bucket, self.key)
    }
}

/// Outcome for one notification record
#[derive(Debug, Clone)]
pub enum Decoded {
    /// A created object matching the key filter; process it
    Actionable(IngestEvent),
    /// Valid but not actionable; no action, no alert
    Ignored(IgnoreReason),
}

/// Why a valid record was not actionable
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Not a created-object event (delete, restore, ...)
    EventType(String),
    /// Key does not match the expected suffix filter
    KeySuffix(String),
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IgnoreReason::EventType(name) => write!(f, "event type {name:?} is not actionable"),
            IgnoreReason::KeySuffix(key) => {
                write!(f, "key {key:?} does not match {OBJECT_SUFFIX}")
            }
        }
    }
}

/// Decode a raw notification payload.
///
/// Returns one [`Decoded`] per record. Structural failures and records
/// missing their bucket or key are [`DecodeError`]s; the caller decides
/// whether to alert. An empty records list decodes to an empty vec.
pub fn decode(raw: &[u8]) -> Result<Vec<Decoded>, DecodeError> {
    let notification: ObjectNotification =
        serde_json::from_slice(raw).map_err(|e| DecodeError::Malformed(e.to_string()))?;

    let mut decoded = Vec::with_capacity(notification.records.len());
    for record in notification.records {
        if record.storage.bucket.name.is_empty() {
            return Err(DecodeError::MissingField("s3.bucket.name"));
        }
        if record.storage.object.key.is_empty() {
            return Err(DecodeError::MissingField("s3.object.key"));
        }

        if !record.event_name.starts_with(CREATED_PREFIX) {
            decoded.push(Decoded::Ignored(IgnoreReason::EventType(record.event_name)));
            continue;
        }
        if !record.storage.object.key.ends_with(OBJECT_SUFFIX) {
            decoded.push(Decoded::Ignored(IgnoreReason::KeySuffix(
                record.storage.object.key,
            )));
            continue;
        }

        decoded.push(Decoded::Actionable(IngestEvent {
            id: ulid::Ulid::new().to_string(),
            bucket: record.storage.bucket.name,
            key: record.storage.object.key,
            event_type: record.event_name,
            size: record.storage.object.size,
            received_at: Utc::now(),
        }));
    }
    Ok(decoded)
}
