//! Reading and record types for VIRTA
//!
//! The Reading is the atomic unit produced by the simulator. Its natural key
//! is `(site_id, timestamp)`: two readings with the same key and identical
//! content are duplicates, not conflicts.

use crate::error::VirtaError;
use crate::object::parse_object_key;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// One timestamped measurement for one site
///
/// # Example
///
/// ```
/// use virta::reading::Reading;
///
/// let reading = Reading::new("site-42", 1000, 12.5).with_unit("kWh");
/// assert_eq!(reading.key().to_string(), "site-42@1000");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Stable identifier of the physical site
    pub site_id: String,

    /// Unix timestamp in seconds, unique per site
    pub timestamp: i64,

    /// The measurement
    pub value: f64,

    /// Measurement unit (e.g. "kWh")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,

    /// Free-form context propagated into the stored record
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl Reading {
    /// Create a new Reading
    pub fn new(site_id: impl Into<String>, timestamp: i64, value: f64) -> Self {
        Self {
            site_id: site_id.into(),
            timestamp,
            value,
            unit: None,
            metadata: HashMap::new(),
        }
    }

    /// Set the measurement unit
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Add a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// The natural key `(site_id, timestamp)`
    pub fn key(&self) -> ReadingKey {
        ReadingKey {
            site_id: self.site_id.clone(),
            timestamp: self.timestamp,
        }
    }

    /// Validate the reading before it is published
    pub fn validate(&self) -> Result<(), VirtaError> {
        if self.site_id.is_empty() {
            return Err(VirtaError::InvalidReading("empty site_id".into()));
        }
        if self.timestamp <= 0 {
            return Err(VirtaError::InvalidReading(format!(
                "non-positive timestamp {}",
                self.timestamp
            )));
        }
        if !self.value.is_finite() {
            return Err(VirtaError::InvalidReading(format!(
                "non-finite value {}",
                self.value
            )));
        }
        Ok(())
    }

    /// Serialize to the object payload format
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, VirtaError> {
        serde_json::to_vec_pretty(self).map_err(|e| VirtaError::Serialization(e.to_string()))
    }

    /// Parse object bytes back into a Reading.
    ///
    /// The object key is the fallback identity source: a payload that omits
    /// `site_id` or `timestamp` is still usable when the key follows the
    /// `{site_id}/{timestamp}.json` convention. A payload without a `value`
    /// is unusable and reported as a serialization error.
    pub fn from_object_bytes(bytes: &[u8], key: &str) -> Result<Self, VirtaError> {
        #[derive(Deserialize)]
        struct Payload {
            #[serde(default)]
            site_id: Option<String>,
            #[serde(default)]
            timestamp: Option<i64>,
            value: Option<f64>,
            #[serde(default)]
            unit: Option<String>,
            #[serde(default)]
            metadata: HashMap<String, String>,
        }

        let payload: Payload = serde_json::from_slice(bytes)
            .map_err(|e| VirtaError::Serialization(e.to_string()))?;

        let hint = parse_object_key(key);
        let site_id = payload
            .site_id
            .filter(|s| !s.is_empty())
            .or_else(|| hint.as_ref().map(|(site, _)| site.clone()))
            .ok_or_else(|| VirtaError::Serialization("payload has no site_id".into()))?;
        let timestamp = payload
            .timestamp
            .or(hint.map(|(_, ts)| ts))
            .ok_or_else(|| VirtaError::Serialization("payload has no timestamp".into()))?;
        let value = payload
            .value
            .ok_or_else(|| VirtaError::Serialization("payload has no value".into()))?;

        let reading = Self {
            site_id,
            timestamp,
            value,
            unit: payload.unit,
            metadata: payload.metadata,
        };
        reading.validate()?;
        Ok(reading)
    }
}

/// The composite key of the destination table: partition by site, sort by
/// timestamp
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReadingKey {
    pub site_id: String,
    pub timestamp: i64,
}

impl fmt::Display for ReadingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.site_id, self.timestamp)
    }
}

/// The row written into the keyed store
///
/// Carries the Reading fields plus ingestion time and a provenance pointer
/// back to the source object. Negative measurements are flagged as anomalies
/// rather than rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub site_id: String,
    pub timestamp: i64,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
    pub anomaly: bool,
    pub ingested_at: i64,
    pub source_object: String,
}

impl StoredRecord {
    /// Derive a record from a parsed Reading and its source object
    pub fn from_reading(reading: &Reading, source_object: impl Into<String>) -> Self {
        Self {
            site_id: reading.site_id.clone(),
            timestamp: reading.timestamp,
            value: reading.value,
            unit: reading.unit.clone(),
            metadata: reading.metadata.clone(),
            anomaly: reading.value < 0.0,
            ingested_at: chrono::Utc::now().timestamp(),
            source_object: source_object.into(),
        }
    }

    /// The natural key of the record
    pub fn key(&self) -> ReadingKey {
        ReadingKey {
            site_id: self.site_id.clone(),
            timestamp: self.timestamp,
        }
    }

    /// Compare measurement content, ignoring ingestion time and provenance.
    ///
    /// A redelivered event re-derives the same record with a later
    /// `ingested_at`; that must compare equal so redelivery resolves as a
    /// duplicate rather than a conflict.
    pub fn content_matches(&self, other: &Self) -> bool {
        self.site_id == other.site_id
            && self.timestamp == other.timestamp
            && self.value.to_bits() == other.value.to_bits()
            && self.unit == other.unit
            && self.metadata == other.metadata
            && self.anomaly == other.anomaly
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_reading_builder() {
        let reading = Reading::new("site-42", 1000, 12.5)
            .with_unit("kWh")
            .with_metadata("source", "simulator");

        assert_eq!(reading.site_id, "site-42");
        assert_eq!(reading.timestamp, 1000);
        assert_eq!(reading.unit.as_deref(), Some("kWh"));
        assert_eq!(reading.metadata.get("source").unwrap(), "simulator");
        assert!(reading.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_readings() {
        assert!(Reading::new("", 1000, 1.0).validate().is_err());
        assert!(Reading::new("site-1", 0, 1.0).validate().is_err());
        assert!(Reading::new("site-1", 1000, f64::NAN).validate().is_err());
        assert!(Reading::new("site-1", 1000, -1.5).validate().is_ok()); // anomaly, not invalid
    }

    #[test]
    fn test_json_round_trip() {
        let reading = Reading::new("site-42", 1000, 12.5).with_unit("kWh");
        let bytes = reading.to_json_bytes().unwrap();
        let parsed = Reading::from_object_bytes(&bytes, "site-42/1000.json").unwrap();
        assert_eq!(parsed, reading);
    }

    #[test]
    fn test_parse_falls_back_to_key() {
        let bytes = br#"{"value": 7.25}"#;
        let parsed = Reading::from_object_bytes(bytes, "site-9/12345.json").unwrap();
        assert_eq!(parsed.site_id, "site-9");
        assert_eq!(parsed.timestamp, 12345);
        assert_eq!(parsed.value, 7.25);
    }

    #[test]
    fn test_parse_without_value_is_an_error() {
        let bytes = br#"{"site_id": "site-9", "timestamp": 12345}"#;
        assert!(Reading::from_object_bytes(bytes, "site-9/12345.json").is_err());
    }

    #[test]
    fn test_parse_garbage_is_an_error() {
        assert!(Reading::from_object_bytes(b"not json at all", "site-9/1.json").is_err());
    }

    #[test]
    fn test_record_content_matches_ignores_provenance() {
        let reading = Reading::new("site-42", 1000, 12.5);
        let mut a = StoredRecord::from_reading(&reading, "bucket/site-42/1000.json");
        let mut b = StoredRecord::from_reading(&reading, "bucket-two/other.json");
        a.ingested_at = 1;
        b.ingested_at = 2;

        assert!(a.content_matches(&b));

        b.value = 13.0;
        assert!(!a.content_matches(&b));
    }

    #[test]
    fn test_negative_value_flags_anomaly() {
        let reading = Reading::new("site-42", 1000, -0.75);
        let record = StoredRecord::from_reading(&reading, "b/k");
        assert!(record.anomaly);
    }
}
