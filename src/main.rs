//! VIRTA - Site Energy Telemetry Pipeline
//!
//! Runs the whole pipeline in one process: the simulator publishes readings
//! through the configured sink, every published object is replayed as a
//! bucket notification, and the processor ingests it into the keyed table.
//!
//! ## Usage
//!
//! ```bash
//! # Run locally, writing objects under ./data
//! cargo run
//!
//! # Run against an object store bucket
//! VIRTA_BUCKET=energy-data VIRTA_REGION=eu-north-1 cargo run
//! ```
//!
//! ## Environment Variables
//!
//! - `VIRTA_DATA_DIR`: local object directory (default: "data")
//! - `VIRTA_BUCKET`: object store bucket; presence selects the remote sink
//! - `VIRTA_KEY_PREFIX`: key prefix for uploaded objects
//! - `VIRTA_SITES`: comma-separated site ids (default: site-001..site-003)
//! - `VIRTA_TICK_INTERVAL_MS`: simulator tick interval (default: 5000)
//! - `VIRTA_LOG_LEVEL`: log level (default: "info")
//! - `VIRTA_LOG_FORMAT`: "json" or "pretty"

use object_store::ObjectStore;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use virta::metrics::Metrics;
use virta::processor::{Processor, ProcessorConfig};
use virta::sink::{LocalSink, RemoteSink, RetrySink, Sink};
use virta::store::MemoryTable;
use virta::{
    Config, DeadLetterBuffer, Decoded, LogFormat, ObjectNotification, SimulatorLoop, SinkMode,
    metrics,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.log_level.clone().into());
    match config.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }

    Metrics::init().map_err(|e| anyhow::anyhow!("{e}"))?;

    info!(
        sites = config.sites.len(),
        tick_interval_ms = config.tick_interval.as_millis() as u64,
        "starting VIRTA"
    );

    // Resolve storage for both sides of the pipeline: the sink publishes
    // into it, the processor reads objects back out of it.
    let (objects, sink, bucket_label): (Arc<dyn ObjectStore>, Arc<dyn Sink>, String) =
        match &config.sink {
            SinkMode::Local { data_dir } => {
                std::fs::create_dir_all(data_dir)?;
                let objects: Arc<dyn ObjectStore> =
                    Arc::new(LocalFileSystem::new_with_prefix(data_dir)?);
                let sink: Arc<dyn Sink> = Arc::new(LocalSink::new(data_dir.clone()));
                info!(data_dir = %data_dir.display(), "local sink selected");
                (objects, sink, data_dir.display().to_string())
            }
            SinkMode::Remote {
                bucket,
                prefix,
                region,
            } => {
                let store = AmazonS3Builder::from_env()
                    .with_bucket_name(bucket)
                    .with_region(region)
                    .build()?;
                let objects: Arc<dyn ObjectStore> = Arc::new(store);
                let mut sink = RemoteSink::new(Arc::clone(&objects), bucket.clone());
                if let Some(prefix) = prefix {
                    sink = sink.with_prefix(prefix.clone());
                }
                info!(bucket = %bucket, region = %region, "remote sink selected");
                (objects, Arc::new(sink), bucket.clone())
            }
        };

    let sink: Arc<dyn Sink> = Arc::new(RetrySink::new(sink, config.publish_backoff.clone()));

    let records = Arc::new(MemoryTable::new());
    let dead_letter = Arc::new(DeadLetterBuffer::new(config.dead_letter_capacity));
    let processor = Arc::new(
        Processor::new(objects, records.clone(), dead_letter.clone()).with_config(
            ProcessorConfig {
                fetch_backoff: config.process_backoff.clone(),
                put_backoff: config.process_backoff.clone(),
                op_timeout: config.op_timeout,
                deadline: config.deadline,
            },
        ),
    );

    let (tx, mut rx) = mpsc::channel(1024);
    let simulator = SimulatorLoop::new(
        Arc::clone(&sink),
        config.sites.clone(),
        config.tick_interval,
    )
    .on_publish(tx);
    let cancel = simulator.cancel_token();

    let simulator_handle = tokio::spawn(simulator.run());

    // Replay each published object as a bucket notification, exactly the
    // payload a real bucket would deliver.
    let ingest_handle = tokio::spawn(async move {
        while let Some(handle) = rx.recv().await {
            let payload =
                ObjectNotification::object_created(&bucket_label, &handle.key, handle.size)
                    .to_bytes();
            match virta::decode(&payload) {
                Ok(decoded) => {
                    for item in decoded {
                        match item {
                            Decoded::Actionable(event) => {
                                metrics::try_record_decoded("actionable");
                                if let Err(err) = processor.handle(&event).await {
                                    warn!(key = %event.key, error = %err, "event processing failed");
                                }
                            }
                            Decoded::Ignored(reason) => {
                                metrics::try_record_decoded("ignored");
                                debug!(%reason, "event ignored");
                            }
                        }
                    }
                }
                Err(err) => {
                    metrics::try_record_decoded("malformed");
                    warn!(error = %err, "event decode failed");
                }
            }
        }
    });

    shutdown_signal(cancel).await;

    // The simulator finishes its in-flight publish, drops the notification
    // sender, and the ingest task drains whatever is left in the channel.
    simulator_handle.await.ok();
    ingest_handle.await.ok();

    if let Err(err) = sink.shutdown().await {
        warn!(error = %err, "sink shutdown failed");
    }
    if !dead_letter.is_empty() {
        warn!(
            pending = dead_letter.len(),
            total_captured = dead_letter.total_captured(),
            "dead letter buffer has unprocessed payloads - inspect before discarding"
        );
    }
    info!(records = records.len(), "VIRTA shutdown complete");
    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = ?e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = ?e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }

    cancel.cancel();
}
