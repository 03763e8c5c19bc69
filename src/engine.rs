//! Telemetry engine facade.
//!
//! `TelemetryEngine` is the single entry point domain classifiers call
//! when they have decided what an event means. One `report` call covers
//! the whole pipeline: source registration, the Processing transition,
//! catalog validation, the statistics/history commit and the broadcast
//! push. The commit itself happens under the source's cell lock, so the
//! public read surface never observes a half-applied report.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::Value;

use crate::broadcast::{
    BroadcastHub, HubStats, RecordFilter, RecordSink, RecordStream, SubscriberId,
};
use crate::catalog::{SignalCatalog, DEFAULT_GLYPH};
use crate::error::{TelemetryResult, ValidationError};
use crate::event::{AuditEntry, EventOutcome, OutcomeKind};
use crate::record::{Classification, RecordId, SignalRecord, StreamRecord};
use crate::state::{
    AuditQuery, SourceSnapshot, SourceState, SourceStatus, StateStore, StateUpdate,
    SystemStatistics,
};

/// One classified event, ready to be reported.
///
/// Construct through [`ReportBuilder`]; `build` enforces the field
/// invariants so the engine never sees an empty source id or an
/// out-of-range confidence.
#[derive(Debug, Clone, PartialEq)]
pub struct EventReport {
    source_id: String,
    source_name: String,
    record_type: String,
    outcome: OutcomeKind,
    payload: Value,
    processing_time_ms: f64,
    confidence: Option<f32>,
    success: bool,
}

impl EventReport {
    /// Starts a builder.
    #[must_use]
    pub fn builder() -> ReportBuilder {
        ReportBuilder::default()
    }

    /// Source that produced the event.
    #[must_use]
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Display name of the source.
    #[must_use]
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Record type the event maps to.
    #[must_use]
    pub fn record_type(&self) -> &str {
        &self.record_type
    }

    /// What the classifier decided.
    #[must_use]
    pub const fn outcome(&self) -> OutcomeKind {
        self.outcome
    }
}

/// Builder for [`EventReport`].
///
/// # Example
/// ```rust,ignore
/// let report = EventReport::builder()
///     .source_id("cpu-watcher")
///     .source_name("CPU Watcher")
///     .record_type("anomaly.detected")
///     .outcome(OutcomeKind::Triggered)
///     .payload(json!({"metric": "cpu", "value": 97.5}))
///     .processing_time_ms(12.0)
///     .confidence(0.93)
///     .build()?;
/// ```
#[derive(Debug, Clone)]
pub struct ReportBuilder {
    source_id: String,
    source_name: String,
    record_type: String,
    outcome: OutcomeKind,
    payload: Value,
    processing_time_ms: f64,
    confidence: Option<f32>,
    success: bool,
}

impl Default for ReportBuilder {
    fn default() -> Self {
        Self {
            source_id: String::new(),
            source_name: String::new(),
            record_type: String::new(),
            outcome: OutcomeKind::Ignored,
            payload: Value::Null,
            processing_time_ms: 0.0,
            confidence: None,
            success: true,
        }
    }
}

impl ReportBuilder {
    /// Creates a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the source id (required).
    #[must_use]
    pub fn source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = source_id.into();
        self
    }

    /// Set the source display name (required).
    #[must_use]
    pub fn source_name(mut self, source_name: impl Into<String>) -> Self {
        self.source_name = source_name.into();
        self
    }

    /// Set the record type this event maps to (required).
    #[must_use]
    pub fn record_type(mut self, record_type: impl Into<String>) -> Self {
        self.record_type = record_type.into();
        self
    }

    /// Set the classifier's decision (default: `Ignored`).
    #[must_use]
    pub const fn outcome(mut self, outcome: OutcomeKind) -> Self {
        self.outcome = outcome;
        self
    }

    /// Set the event payload (default: JSON null).
    #[must_use]
    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Set the classification wall time in milliseconds.
    ///
    /// Negative or non-finite values are clamped to zero at build time.
    #[must_use]
    pub const fn processing_time_ms(mut self, processing_time_ms: f64) -> Self {
        self.processing_time_ms = processing_time_ms;
        self
    }

    /// Set the classifier's confidence, in `[0, 1]` (optional).
    #[must_use]
    pub const fn confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Mark the emitted record as reporting a failure (default: success).
    ///
    /// Only meaningful for `Triggered` outcomes; the flag rides on the
    /// emitted record and feeds the success-rate statistics.
    #[must_use]
    pub const fn success(mut self, success: bool) -> Self {
        self.success = success;
        self
    }

    /// Build the report.
    ///
    /// Rejects empty source id, source name or record type, and any
    /// confidence outside `[0, 1]`.
    pub fn build(self) -> Result<EventReport, ValidationError> {
        let source_id = self.source_id.trim().to_string();
        if source_id.is_empty() {
            return Err(ValidationError::EmptySourceId);
        }

        let source_name = self.source_name.trim().to_string();
        if source_name.is_empty() {
            return Err(ValidationError::EmptySourceName);
        }

        let record_type = self.record_type.trim().to_string();
        if record_type.is_empty() {
            return Err(ValidationError::EmptyRecordType);
        }

        if let Some(value) = self.confidence {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(ValidationError::ConfidenceOutOfRange { value });
            }
        }

        let processing_time_ms = if self.processing_time_ms.is_finite() {
            self.processing_time_ms.max(0.0)
        } else {
            0.0
        };

        Ok(EventReport {
            source_id,
            source_name,
            record_type,
            outcome: self.outcome,
            payload: self.payload,
            processing_time_ms,
            confidence: self.confidence,
            success: self.success,
        })
    }
}

/// What the engine did with a report.
///
/// Schema rejections are values, not errors: the report itself was
/// well-formed and fully recorded, the payload just failed the catalog.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportOutcome {
    /// The report was recorded; `record` is the broadcast record for
    /// `Triggered` outcomes and `None` otherwise.
    Accepted {
        /// Emitted record, if the event triggered one.
        record: Option<StreamRecord>,
    },
    /// The payload failed catalog validation; the event was recorded as
    /// an error and nothing was broadcast.
    Rejected {
        /// Reasons from the catalog verdict.
        errors: Vec<String>,
    },
}

impl ReportOutcome {
    /// True unless the catalog rejected the payload.
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    /// The emitted record, if any.
    #[must_use]
    pub const fn record(&self) -> Option<&StreamRecord> {
        match self {
            Self::Accepted { record } => record.as_ref(),
            Self::Rejected { .. } => None,
        }
    }

    /// Catalog errors for a rejected report.
    #[must_use]
    pub fn errors(&self) -> &[String] {
        match self {
            Self::Accepted { .. } => &[],
            Self::Rejected { errors } => errors,
        }
    }
}

/// Facade over the state store, the broadcast hub and the catalog.
#[derive(Clone)]
pub struct TelemetryEngine {
    store: Arc<StateStore>,
    hub: Arc<BroadcastHub>,
    catalog: Arc<dyn SignalCatalog>,
}

impl TelemetryEngine {
    /// Create an engine over the given collaborators.
    #[must_use]
    pub fn new(
        store: Arc<StateStore>,
        hub: Arc<BroadcastHub>,
        catalog: Arc<dyn SignalCatalog>,
    ) -> Self {
        Self {
            store,
            hub,
            catalog,
        }
    }

    /// Records a classified event and broadcasts its record, if any.
    ///
    /// Sequence: idempotent source registration, transition to
    /// `Processing`, catalog validation for `Triggered` outcomes, then a
    /// single commit of statistics, counters, histories and the final
    /// status, followed by the broadcast push. A catalog rejection is
    /// returned as [`ReportOutcome::Rejected`] after being recorded; an
    /// `Err` means the engine itself could not proceed.
    pub fn report(&self, report: EventReport) -> TelemetryResult<ReportOutcome> {
        self.store
            .initialize(&report.source_id, &report.source_name)?;
        self.store.update(
            &report.source_id,
            StateUpdate::status(SourceStatus::Processing),
        )?;

        if report.outcome != OutcomeKind::Triggered {
            let outcome = EventOutcome::new(
                &report.source_id,
                &report.record_type,
                report.outcome,
                report.processing_time_ms,
                report.payload,
            );
            self.store.commit(&report.source_id, outcome, None)?;
            return Ok(ReportOutcome::Accepted { record: None });
        }

        let verdict = self.catalog.validate(&report.record_type, &report.payload);
        if !verdict.valid {
            let outcome = EventOutcome::new(
                &report.source_id,
                &report.record_type,
                OutcomeKind::Error,
                report.processing_time_ms,
                report.payload,
            );
            self.store
                .commit_rejected(&report.source_id, outcome, &verdict.errors)?;
            return Ok(ReportOutcome::Rejected {
                errors: verdict.errors,
            });
        }

        let descriptor = self.catalog.descriptor(&report.record_type);
        let record = SignalRecord {
            record_id: RecordId::new(),
            source_id: report.source_id.clone(),
            source_name: report.source_name.clone(),
            record_type: report.record_type.clone(),
            glyph: descriptor
                .as_ref()
                .map_or_else(|| DEFAULT_GLYPH.to_string(), |d| d.glyph.clone()),
            emitted_at: Utc::now(),
            confidence: report.confidence,
            success: report.success,
            processing_time_ms: report.processing_time_ms,
            payload: report.payload.clone(),
        };

        let outcome = EventOutcome::new(
            &report.source_id,
            &report.record_type,
            OutcomeKind::Triggered,
            report.processing_time_ms,
            report.payload,
        );
        self.store
            .commit(&report.source_id, outcome, Some(record.clone()))?;

        // Classification needs both halves of the descriptor; a partial
        // descriptor broadcasts unclassified.
        let classification = descriptor.and_then(|d| {
            Some(Classification {
                priority: d.priority?,
                category: d.category?,
                source_id: report.source_id.clone(),
            })
        });
        let stream = StreamRecord::new(record, classification);
        self.hub.publish(&stream)?;

        Ok(ReportOutcome::Accepted {
            record: Some(stream),
        })
    }

    /// Current state of a source.
    pub fn state(&self, source_id: &str) -> TelemetryResult<Option<SourceState>> {
        self.store.get(source_id)
    }

    /// Composite snapshot of a source: state, statistics and recent
    /// history.
    pub fn snapshot(&self, source_id: &str) -> TelemetryResult<Option<SourceSnapshot>> {
        self.store.snapshot(source_id)
    }

    /// All known sources.
    pub fn sources(&self) -> TelemetryResult<Vec<SourceState>> {
        self.store.sources()
    }

    /// Searches the audit trail.
    pub fn search_history(&self, query: &AuditQuery) -> TelemetryResult<Vec<AuditEntry>> {
        self.store.search_audit(query)
    }

    /// Aggregate statistics across every source.
    pub fn system_statistics(&self) -> TelemetryResult<SystemStatistics> {
        self.store.system_statistics()
    }

    /// Recent broadcast records, newest first.
    pub fn recent_records(
        &self,
        filter: Option<&RecordFilter>,
        limit: usize,
    ) -> TelemetryResult<Vec<StreamRecord>> {
        self.hub.recent_records(filter, limit)
    }

    /// Registers a subscriber with its own sink.
    pub fn subscribe(
        &self,
        subscriber_id: SubscriberId,
        sink: Box<dyn RecordSink>,
        filter: Option<RecordFilter>,
    ) -> TelemetryResult<()> {
        self.hub.subscribe(subscriber_id, sink, filter)
    }

    /// Registers a channel-backed subscriber and returns its stream.
    pub fn subscribe_stream(&self, filter: Option<RecordFilter>) -> TelemetryResult<RecordStream> {
        self.hub.subscribe_stream(filter)
    }

    /// Removes a subscriber. Idempotent.
    pub fn unsubscribe(&self, subscriber_id: SubscriberId) -> TelemetryResult<bool> {
        self.hub.unsubscribe(subscriber_id)
    }

    /// Drops history older than `max_age` across all sources, returning
    /// the number of entries removed. Invoked on an operator-controlled
    /// schedule, never automatically.
    pub fn purge_older_than(&self, max_age: Duration) -> TelemetryResult<usize> {
        self.store.purge_older_than(max_age)
    }

    /// Broadcast-side operational counters.
    pub fn hub_stats(&self) -> TelemetryResult<HubStats> {
        self.hub.stats()
    }

    /// Shuts down the broadcast side: disconnects subscribers and stops
    /// the sweeper. The state store stays readable.
    pub fn close(&self) -> TelemetryResult<()> {
        self.hub.close()
    }

    /// The underlying state store.
    #[must_use]
    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    /// The underlying broadcast hub.
    #[must_use]
    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration as StdDuration;

    use crate::broadcast::HubConfig;
    use crate::catalog::{PermissiveCatalog, SignalDescriptor, StaticCatalog};
    use crate::event::AuditKind;
    use crate::record::Priority;

    fn catalog() -> StaticCatalog {
        StaticCatalog::new()
            .with_signal(
                "anomaly.detected",
                SignalDescriptor::glyph("⚠️")
                    .with_category("anomaly")
                    .with_priority(Priority::High),
                &["metric", "value"],
            )
            .with_signal("metric.sampled", SignalDescriptor::glyph("📈"), &[])
    }

    fn engine_with(catalog: Arc<dyn SignalCatalog>) -> TelemetryEngine {
        TelemetryEngine::new(
            Arc::new(StateStore::new()),
            Arc::new(BroadcastHub::new(HubConfig {
                sweep_interval: StdDuration::from_secs(3600),
                ..HubConfig::default()
            })),
            catalog,
        )
    }

    fn triggered(source_id: &str, record_type: &str, payload: Value) -> EventReport {
        EventReport::builder()
            .source_id(source_id)
            .source_name(format!("{source_id}-name"))
            .record_type(record_type)
            .outcome(OutcomeKind::Triggered)
            .payload(payload)
            .processing_time_ms(10.0)
            .confidence(0.9)
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_rejects_blank_fields() {
        let err = EventReport::builder()
            .source_name("n")
            .record_type("t")
            .build()
            .unwrap_err();
        assert_eq!(err, ValidationError::EmptySourceId);

        let err = EventReport::builder()
            .source_id("  ")
            .source_name("n")
            .record_type("t")
            .build()
            .unwrap_err();
        assert_eq!(err, ValidationError::EmptySourceId);

        let err = EventReport::builder()
            .source_id("s")
            .record_type("t")
            .build()
            .unwrap_err();
        assert_eq!(err, ValidationError::EmptySourceName);

        let err = EventReport::builder()
            .source_id("s")
            .source_name("n")
            .build()
            .unwrap_err();
        assert_eq!(err, ValidationError::EmptyRecordType);
    }

    #[test]
    fn test_builder_rejects_out_of_range_confidence() {
        for value in [-0.1_f32, 1.5, f32::NAN, f32::INFINITY] {
            let err = EventReport::builder()
                .source_id("s")
                .source_name("n")
                .record_type("t")
                .confidence(value)
                .build()
                .unwrap_err();
            assert!(matches!(err, ValidationError::ConfidenceOutOfRange { .. }));
        }
    }

    #[test]
    fn test_builder_clamps_processing_time() {
        let report = EventReport::builder()
            .source_id("s")
            .source_name("n")
            .record_type("t")
            .processing_time_ms(-5.0)
            .build()
            .unwrap();
        assert_eq!(report.processing_time_ms, 0.0);

        let report = EventReport::builder()
            .source_id("s")
            .source_name("n")
            .record_type("t")
            .processing_time_ms(f64::NAN)
            .build()
            .unwrap();
        assert_eq!(report.processing_time_ms, 0.0);
    }

    #[test]
    fn test_triggered_report_emits_and_broadcasts() {
        let engine = engine_with(Arc::new(catalog()));
        let stream = engine.subscribe_stream(None).unwrap();

        let outcome = engine
            .report(triggered(
                "cpu-watcher",
                "anomaly.detected",
                json!({"metric": "cpu", "value": 97.5}),
            ))
            .unwrap();

        assert!(outcome.is_accepted());
        let record = outcome.record().unwrap();
        assert_eq!(record.record.glyph, "⚠️");
        let classification = record.classification.as_ref().unwrap();
        assert_eq!(classification.priority, Priority::High);
        assert_eq!(classification.category, "anomaly");
        assert_eq!(classification.source_id, "cpu-watcher");

        let received = stream.recv_timeout(StdDuration::from_secs(1)).unwrap();
        assert_eq!(received.broadcast_id, record.broadcast_id);

        let state = engine.state("cpu-watcher").unwrap().unwrap();
        assert_eq!(state.status, SourceStatus::Active);
        assert_eq!(state.total_events, 1);
        assert_eq!(state.total_signals, 1);
        assert_eq!(state.triggers, 1);
    }

    #[test]
    fn test_descriptorless_type_gets_default_glyph_and_no_classification() {
        let engine = engine_with(Arc::new(PermissiveCatalog));
        let outcome = engine
            .report(triggered("s1", "custom.type", json!({})))
            .unwrap();
        let record = outcome.record().unwrap();
        assert_eq!(record.record.glyph, DEFAULT_GLYPH);
        assert!(record.classification.is_none());
    }

    #[test]
    fn test_rejected_payload_is_recorded_and_not_broadcast() {
        let engine = engine_with(Arc::new(catalog()));
        let stream = engine.subscribe_stream(None).unwrap();

        let outcome = engine
            .report(triggered(
                "cpu-watcher",
                "anomaly.detected",
                json!({"metric": "cpu"}),
            ))
            .unwrap();

        assert!(!outcome.is_accepted());
        assert_eq!(outcome.errors(), ["missing required field: value"]);
        assert!(outcome.record().is_none());

        let state = engine.state("cpu-watcher").unwrap().unwrap();
        assert_eq!(state.status, SourceStatus::Error);
        assert_eq!(state.total_events, 1);
        assert_eq!(state.total_signals, 0);
        assert_eq!(state.triggers, 0);

        let errors = engine
            .search_history(&AuditQuery {
                source_id: Some("cpu-watcher".to_string()),
                kind: Some(AuditKind::Error),
                ..AuditQuery::default()
            })
            .unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].payload["errors"][0], "missing required field: value");

        assert!(stream.try_recv().is_none());
        assert!(engine.recent_records(None, 10).unwrap().is_empty());
    }

    #[test]
    fn test_ignored_report_records_without_emitting() {
        let engine = engine_with(Arc::new(catalog()));
        let report = EventReport::builder()
            .source_id("cpu-watcher")
            .source_name("CPU Watcher")
            .record_type("anomaly.detected")
            .outcome(OutcomeKind::Ignored)
            .payload(json!({"metric": "cpu", "value": 12.0}))
            .build()
            .unwrap();

        let outcome = engine.report(report).unwrap();
        assert!(outcome.is_accepted());
        assert!(outcome.record().is_none());

        let state = engine.state("cpu-watcher").unwrap().unwrap();
        assert_eq!(state.status, SourceStatus::Idle);
        assert_eq!(state.total_events, 1);
        assert_eq!(state.total_signals, 0);
    }

    #[test]
    fn test_error_status_is_not_terminal() {
        let engine = engine_with(Arc::new(catalog()));

        engine
            .report(triggered("s1", "anomaly.detected", json!({})))
            .unwrap();
        assert_eq!(
            engine.state("s1").unwrap().unwrap().status,
            SourceStatus::Error
        );

        engine
            .report(triggered(
                "s1",
                "anomaly.detected",
                json!({"metric": "cpu", "value": 99.0}),
            ))
            .unwrap();
        assert_eq!(
            engine.state("s1").unwrap().unwrap().status,
            SourceStatus::Active
        );
    }

    #[test]
    fn test_initialize_is_idempotent_across_reports() {
        let engine = engine_with(Arc::new(catalog()));
        engine
            .report(triggered("s1", "metric.sampled", json!({})))
            .unwrap();

        // A later report with a different name does not rename.
        let report = EventReport::builder()
            .source_id("s1")
            .source_name("renamed")
            .record_type("metric.sampled")
            .outcome(OutcomeKind::Triggered)
            .payload(json!({}))
            .build()
            .unwrap();
        engine.report(report).unwrap();

        let state = engine.state("s1").unwrap().unwrap();
        assert_eq!(state.display_name, "s1-name");
        assert_eq!(state.total_events, 2);
    }

    #[test]
    fn test_failed_record_feeds_success_rate() {
        let engine = engine_with(Arc::new(catalog()));
        engine
            .report(triggered("s1", "metric.sampled", json!({})))
            .unwrap();

        let failing = EventReport::builder()
            .source_id("s1")
            .source_name("s1-name")
            .record_type("metric.sampled")
            .outcome(OutcomeKind::Triggered)
            .payload(json!({}))
            .success(false)
            .build()
            .unwrap();
        engine.report(failing).unwrap();

        let snapshot = engine.snapshot("s1").unwrap().unwrap();
        assert_eq!(snapshot.statistics.total_signals, 2);
        assert_eq!(snapshot.statistics.successful_signals, 1);
        assert_eq!(snapshot.statistics.failed_signals, 1);
        assert!((snapshot.statistics.success_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_unknown_source_reads_are_empty_not_errors() {
        let engine = engine_with(Arc::new(catalog()));
        assert!(engine.state("ghost").unwrap().is_none());
        assert!(engine.snapshot("ghost").unwrap().is_none());
        assert!(engine
            .search_history(&AuditQuery {
                source_id: Some("ghost".to_string()),
                ..AuditQuery::default()
            })
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_close_stops_broadcast_but_keeps_reads() {
        let engine = engine_with(Arc::new(catalog()));
        engine
            .report(triggered("s1", "metric.sampled", json!({})))
            .unwrap();
        engine.close().unwrap();

        // Reports still commit; only the broadcast side is gone.
        let outcome = engine
            .report(triggered("s1", "metric.sampled", json!({})))
            .unwrap();
        assert!(outcome.is_accepted());
        assert_eq!(engine.state("s1").unwrap().unwrap().total_events, 2);
        assert!(engine.subscribe_stream(None).is_err());
    }
}
