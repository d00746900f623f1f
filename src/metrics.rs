//! Prometheus metrics for VIRTA

use crate::error::{Result, VirtaError};
use prometheus::{
    CounterVec, Encoder, Gauge, HistogramVec, TextEncoder, register_counter_vec, register_gauge,
    register_histogram_vec,
};
use std::sync::OnceLock;

/// Global metrics instance
static METRICS: OnceLock<Metrics> = OnceLock::new();

/// All VIRTA metrics
pub struct Metrics {
    /// Readings generated (by site)
    pub readings_generated: CounterVec,

    /// Objects published (by sink)
    pub objects_published: CounterVec,

    /// Publish failures after retries (by sink)
    pub publish_failures: CounterVec,

    /// Decoded notification records (by outcome)
    pub events_decoded: CounterVec,

    /// Keyed store write outcomes (stored / duplicate / conflict)
    pub records_written: CounterVec,

    /// Processing failures (by reason)
    pub process_failures: CounterVec,

    /// Current dead letter buffer size
    pub dead_letter_size: Gauge,

    /// Event processing latency (by result)
    pub process_latency: HistogramVec,
}

impl Metrics {
    /// Initialize metrics (call once at startup)
    ///
    /// Returns error if metric registration fails.
    pub fn init() -> Result<&'static Metrics> {
        if let Some(metrics) = METRICS.get() {
            return Ok(metrics);
        }

        let metrics = Metrics {
            readings_generated: register_counter_vec!(
                "virta_readings_generated_total",
                "Total readings generated by the simulator",
                &["site"]
            )
            .map_err(|e| VirtaError::Metrics(format!("readings_generated: {e}")))?,

            objects_published: register_counter_vec!(
                "virta_objects_published_total",
                "Total objects successfully published",
                &["sink"]
            )
            .map_err(|e| VirtaError::Metrics(format!("objects_published: {e}")))?,

            publish_failures: register_counter_vec!(
                "virta_publish_failures_total",
                "Total publishes abandoned after retries",
                &["sink"]
            )
            .map_err(|e| VirtaError::Metrics(format!("publish_failures: {e}")))?,

            events_decoded: register_counter_vec!(
                "virta_events_decoded_total",
                "Decoded notification records",
                &["outcome"]
            )
            .map_err(|e| VirtaError::Metrics(format!("events_decoded: {e}")))?,

            records_written: register_counter_vec!(
                "virta_records_written_total",
                "Keyed store write outcomes",
                &["outcome"]
            )
            .map_err(|e| VirtaError::Metrics(format!("records_written: {e}")))?,

            process_failures: register_counter_vec!(
                "virta_process_failures_total",
                "Event processing failures",
                &["reason"]
            )
            .map_err(|e| VirtaError::Metrics(format!("process_failures: {e}")))?,

            dead_letter_size: register_gauge!(
                "virta_dead_letter_size",
                "Current number of poison payloads held for inspection"
            )
            .map_err(|e| VirtaError::Metrics(format!("dead_letter_size: {e}")))?,

            process_latency: register_histogram_vec!(
                "virta_process_latency_seconds",
                "Event processing latency",
                &["result"],
                vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0]
            )
            .map_err(|e| VirtaError::Metrics(format!("process_latency: {e}")))?,
        };

        // Set the metrics (only succeeds once)
        let _ = METRICS.set(metrics);

        METRICS
            .get()
            .ok_or_else(|| VirtaError::Metrics("failed to initialize metrics".to_string()))
    }

    /// Get the global metrics instance
    ///
    /// Returns None if metrics haven't been initialized yet.
    pub fn get() -> Option<&'static Metrics> {
        METRICS.get()
    }
}

/// Gather all metrics and encode as Prometheus text format
pub fn gather() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_ok() {
        String::from_utf8(buffer).unwrap_or_default()
    } else {
        String::new()
    }
}

/// Record a generated reading if metrics are initialized
pub fn try_record_generated(site: &str) {
    if let Some(m) = Metrics::get() {
        m.readings_generated.with_label_values(&[site]).inc();
    }
}

/// Record a published object if metrics are initialized
pub fn try_record_published(sink: &str) {
    if let Some(m) = Metrics::get() {
        m.objects_published.with_label_values(&[sink]).inc();
    }
}

/// Record an abandoned publish if metrics are initialized
pub fn try_record_publish_failure(sink: &str) {
    if let Some(m) = Metrics::get() {
        m.publish_failures.with_label_values(&[sink]).inc();
    }
}

/// Record a decode outcome (actionable / ignored / malformed)
pub fn try_record_decoded(outcome: &str) {
    if let Some(m) = Metrics::get() {
        m.events_decoded.with_label_values(&[outcome]).inc();
    }
}

/// Record a keyed store write outcome
pub fn try_record_written(outcome: &str) {
    if let Some(m) = Metrics::get() {
        m.records_written.with_label_values(&[outcome]).inc();
    }
}

/// Record a processing failure by reason
pub fn try_record_process_failure(reason: &str) {
    if let Some(m) = Metrics::get() {
        m.process_failures.with_label_values(&[reason]).inc();
    }
}

/// Update the dead letter gauge
pub fn try_set_dead_letter_size(size: usize) {
    if let Some(m) = Metrics::get() {
        m.dead_letter_size.set(size as f64);
    }
}

/// Record event processing latency
pub fn try_record_latency(result: &str, seconds: f64) {
    if let Some(m) = Metrics::get() {
        m.process_latency
            .with_label_values(&[result])
            .observe(seconds);
    }
}
