//! # signalhub - In-Memory Telemetry & Broadcast Engine
//!
//! signalhub records what domain classifiers decide about incoming
//! events, derives per-source statistics and an audit trail from those
//! reports, and broadcasts the emitted records to live subscribers.
//! Everything lives in bounded in-memory stores: the system degrades by
//! evicting old data, never by blocking producers.
//!
//! ## Core Concepts
//!
//! - **Source**: a named producer with a status machine and counters
//! - **EventOutcome**: what a classifier decided about one event
//! - **SignalRecord**: the structured record a triggered event emits
//! - **AuditEntry**: fingerprinted audit row capturing every mutation
//! - **BroadcastHub**: filtered fan-out of emitted records to subscribers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use signalhub::{
//!     BroadcastHub, EventReport, HubConfig, OutcomeKind, PermissiveCatalog,
//!     StateStore, TelemetryEngine,
//! };
//!
//! let engine = TelemetryEngine::new(
//!     Arc::new(StateStore::new()),
//!     Arc::new(BroadcastHub::new(HubConfig::default())),
//!     Arc::new(PermissiveCatalog),
//! );
//!
//! let stream = engine.subscribe_stream(None)?;
//!
//! let outcome = engine.report(
//!     EventReport::builder()
//!         .source_id("cpu-watcher")
//!         .source_name("CPU Watcher")
//!         .record_type("anomaly.detected")
//!         .outcome(OutcomeKind::Triggered)
//!         .payload(serde_json::json!({"metric": "cpu", "value": 97.5}))
//!         .confidence(0.93)
//!         .build()?,
//! )?;
//! assert!(outcome.is_accepted());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core data types
pub mod error;
pub mod event;
pub mod record;

// Stores and aggregation
pub mod history;
pub mod state;
pub mod stats;

// Broadcast, validation and the facade
pub mod broadcast;
pub mod catalog;
pub mod engine;
pub mod wire;

// Re-export primary types at crate root for convenience
pub use broadcast::{
    BroadcastHub, ChannelSink, HubConfig, HubStats, RecordFilter, RecordSink, RecordStream,
    SinkError, SubscriberId, SubscriberStats,
};
pub use catalog::{
    CatalogVerdict, PermissiveCatalog, SignalCatalog, SignalDescriptor, StaticCatalog,
};
pub use engine::{EventReport, ReportBuilder, ReportOutcome, TelemetryEngine};
pub use error::{
    StateError, StreamError, TelemetryError, TelemetryResult, ValidationError,
};
pub use event::{AuditEntry, AuditKind, EntryId, EventId, EventOutcome, OutcomeKind};
pub use history::{BoundedHistory, QueryOrder, TimeWindow, Timestamped};
pub use record::{
    BroadcastId, Classification, Priority, RecordId, SignalRecord, StreamRecord,
};
pub use state::{
    AuditQuery, SourceSnapshot, SourceState, SourceStatisticsEntry, SourceStatus, StateStore,
    StateStoreConfig, StateUpdate, SystemStatistics,
};
pub use stats::{RunningStats, SourceStatistics};
pub use wire::{FrameKind, StreamFrame};
