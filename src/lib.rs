//! VIRTA - Site Energy Telemetry Pipeline
//!
//! A small ingestion pipeline: a simulator produces timestamped site-energy
//! readings and publishes each one as an object; a processor, driven by
//! object-created notifications, fetches the object, parses it, and performs
//! an idempotent keyed write into a record store.
//!
//! # Architecture
//!
//! ```text
//! Simulator Loop ──► Sink (one object per Reading)
//!                         │
//!                         ▼  object-created notification
//!                    Event Decoder ──► Processor (fetch, parse, put)
//!                                           │
//!                                           ▼
//!                                     Keyed record store
//! ```
//!
//! Storage backends sit behind traits: [`sink::Sink`] for the producer side,
//! [`store::RecordStore`] for the keyed table, and `object_store::ObjectStore`
//! for reading object bytes back. All coordination between concurrent
//! processor invocations is delegated to the store's conditional write.

#![deny(unsafe_code)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]

pub mod config;
pub mod deadletter;
pub mod error;
pub mod event;
pub mod metrics;
pub mod object;
pub mod processor;
pub mod reading;
pub mod retry;
pub mod simulator;
pub mod sink;
pub mod store;

pub use config::{Config, LogFormat, SinkMode};
pub use deadletter::{DeadLetterBuffer, PoisonEntry};
pub use error::{DecodeError, ProcessError, Result, SinkError, StoreError, VirtaError};
pub use event::{Decoded, IngestEvent, ObjectNotification, decode};
pub use object::ObjectHandle;
pub use processor::{ProcessOutcome, Processor, ProcessorConfig};
pub use reading::{Reading, ReadingKey, StoredRecord};
pub use retry::BackoffConfig;
pub use simulator::{SimulatorLoop, SiteModel};
pub use sink::{LocalSink, RemoteSink, RetrySink, Sink};
pub use store::{MemoryTable, PutOutcome, RecordStore};
