//! Simulator loop for VIRTA
//!
//! One logical producer cycling Idle → Generating → Publishing → Idle until
//! cancelled. Each tick generates one Reading per configured site and hands
//! it to the sink. A failed publish is absorbed - logged, counted, and the
//! tick skipped for that site - because the next tick matters more than the
//! completeness of any one tick. Duplicate suppression is the processor's
//! job, not the producer's.

use crate::metrics;
use crate::object::ObjectHandle;
use crate::reading::Reading;
use crate::sink::Sink;
use chrono::Utc;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Per-site measurement model: a bounded random walk with occasional
/// negative anomaly dips standing in for faulty meter samples
#[derive(Debug, Clone)]
pub struct SiteModel {
    site_id: String,
    value: f64,
    min: f64,
    max: f64,
    max_step: f64,
    anomaly_probability: f64,
    last_timestamp: i64,
}

impl SiteModel {
    /// Create a model with the default operating range (10-200 kWh)
    pub fn new(site_id: impl Into<String>) -> Self {
        Self {
            site_id: site_id.into(),
            value: 100.0,
            min: 10.0,
            max: 200.0,
            max_step: 15.0,
            anomaly_probability: 0.1,
            last_timestamp: 0,
        }
    }

    /// Override the walk's operating range
    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.min = min;
        self.max = max;
        self.value = (min + max) / 2.0;
        self
    }

    /// Override the anomaly probability (0.0 disables anomalies)
    pub fn with_anomaly_probability(mut self, probability: f64) -> Self {
        self.anomaly_probability = probability;
        self
    }

    /// The site this model produces readings for
    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    /// Generate the next reading.
    ///
    /// Timestamps are kept strictly increasing per site: a tick landing on
    /// the same second as the previous one advances by one, preserving the
    /// uniqueness of `(site_id, timestamp)` in the destination table.
    pub fn next_reading(&mut self, now: i64) -> Reading {
        let timestamp = if now <= self.last_timestamp {
            self.last_timestamp + 1
        } else {
            now
        };
        self.last_timestamp = timestamp;

        let mut rng = rand::thread_rng();
        let value = if rng.gen::<f64>() < self.anomaly_probability {
            -rng.gen_range(0.0..2.0)
        } else {
            let step = rng.gen_range(-self.max_step..=self.max_step);
            self.value = (self.value + step).clamp(self.min, self.max);
            self.value
        };

        Reading::new(&self.site_id, timestamp, round2(value)).with_unit("kWh")
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// The producing side of the pipeline
pub struct SimulatorLoop {
    sink: Arc<dyn Sink>,
    models: Vec<SiteModel>,
    tick_interval: Duration,
    cancel: CancellationToken,
    published: Option<mpsc::Sender<ObjectHandle>>,
}

impl SimulatorLoop {
    /// Create a loop producing one reading per site per tick
    pub fn new<I, S>(sink: Arc<dyn Sink>, sites: I, tick_interval: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sink,
            models: sites.into_iter().map(SiteModel::new).collect(),
            tick_interval,
            cancel: CancellationToken::new(),
            published: None,
        }
    }

    /// Use custom site models instead of the defaults
    pub fn with_models(mut self, models: Vec<SiteModel>) -> Self {
        self.models = models;
        self
    }

    /// Receive a handle for every successfully published object.
    ///
    /// Hosts use this to loop published objects back into a processor when
    /// no real bucket notifications are available.
    pub fn on_publish(mut self, tx: mpsc::Sender<ObjectHandle>) -> Self {
        self.published = Some(tx);
        self
    }

    /// Token that stops the loop cooperatively
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run until cancelled.
    ///
    /// Cancellation is observed at the top of each tick only; an in-flight
    /// publish always runs to completion before the loop exits.
    pub async fn run(mut self) {
        info!(
            sites = self.models.len(),
            interval_ms = self.tick_interval.as_millis() as u64,
            sink = self.sink.name(),
            "simulator started"
        );

        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let now = Utc::now().timestamp();
            for model in &mut self.models {
                let reading = model.next_reading(now);
                metrics::try_record_generated(&reading.site_id);

                match self.sink.write(&reading).await {
                    Ok(handle) => {
                        metrics::try_record_published(self.sink.name());
                        debug!(site = %reading.site_id, key = %handle.key, "reading published");
                        let mut listener_gone = false;
                        if let Some(tx) = &self.published {
                            if tx.send(handle).await.is_err() {
                                debug!("publish listener dropped, notifications disabled");
                                listener_gone = true;
                            }
                        }
                        if listener_gone {
                            self.published = None;
                        }
                    }
                    Err(err) => {
                        // Skip this site's tick; the loop itself never stops
                        // on a publish failure.
                        metrics::try_record_publish_failure(self.sink.name());
                        warn!(
                            site = %reading.site_id,
                            error = %err,
                            "publish failed, skipping tick"
                        );
                    }
                }
            }
        }

        info!("simulator stopped");
    }
}
