//! Source lifecycle state and the in-memory state store.
//!
//! [`StateStore`] owns everything the engine knows about a source: its
//! [`SourceState`], a [`RunningStats`] accumulator, and the three bounded
//! histories (audit trail, emitted signals, event outcomes). Each source
//! lives in its own cell behind a mutex, so operations for one source are
//! serialized while unrelated sources proceed in parallel; the outer map
//! lock is only written when a source is seen for the first time.
//!
//! Sources must be initialized explicitly. Updating a source that was
//! never initialized fails with [`StateError::NotInitialized`] instead of
//! conjuring a half-configured entry into existence.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{StateError, TelemetryError, TelemetryResult};
use crate::event::{AuditEntry, AuditKind, EventOutcome, OutcomeKind};
use crate::history::{BoundedHistory, QueryOrder, TimeWindow};
use crate::record::SignalRecord;
use crate::stats::{RunningStats, SourceStatistics};

/// Lifecycle status of a source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    /// Resting state: registered, and not currently handling an event.
    #[default]
    Idle,
    /// An event report is in flight.
    Processing,
    /// The last event produced a signal.
    Active,
    /// The last event failed; cleared by the next successful report.
    Error,
}

impl fmt::Display for SourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Processing => "processing",
            Self::Active => "active",
            Self::Error => "error",
        };
        write!(f, "{name}")
    }
}

/// Current state of one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceState {
    /// Caller-chosen stable id.
    pub source_id: String,
    /// Human-readable name, set at initialization.
    pub display_name: String,
    /// Lifecycle status.
    pub status: SourceStatus,
    /// When the source was first initialized.
    pub created_at: DateTime<Utc>,
    /// When the source last reported anything.
    pub last_activity: DateTime<Utc>,
    /// Events reported over the source's lifetime. Never decremented;
    /// history eviction does not touch counters.
    pub total_events: u64,
    /// Signals emitted over the source's lifetime.
    pub total_signals: u64,
    /// Events that triggered an emission.
    pub triggers: u64,
    /// Free-form metadata, shallow-merged by updates.
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Partial update applied to a source's state.
///
/// Absent fields are left untouched. Counters are not updatable from the
/// outside; they only move when reports are committed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateUpdate {
    /// Replaces the display name when present.
    pub display_name: Option<String>,
    /// Replaces the status when present.
    pub status: Option<SourceStatus>,
    /// Keys merged over the existing metadata when present.
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

impl StateUpdate {
    /// Update that only sets the status.
    #[must_use]
    pub fn status(status: SourceStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Sets the status on this update.
    #[must_use]
    pub fn with_status(mut self, status: SourceStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Sets the display name on this update.
    #[must_use]
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    /// Sets metadata keys to merge on this update.
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Map<String, serde_json::Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Composite read of one source: state, derived statistics and the recent
/// windows of each history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSnapshot {
    /// Current state.
    pub state: SourceState,
    /// Statistics as of the snapshot instant.
    pub statistics: SourceStatistics,
    /// Most recent audit entries, in insertion order.
    pub recent_entries: Vec<AuditEntry>,
    /// Most recent emitted signals, in insertion order.
    pub recent_signals: Vec<SignalRecord>,
    /// Most recent event outcomes, in insertion order.
    pub recent_outcomes: Vec<EventOutcome>,
}

/// Administrative query over the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditQuery {
    /// Restrict to one source; absent scans every source.
    pub source_id: Option<String>,
    /// Restrict to one entry kind.
    pub kind: Option<AuditKind>,
    /// Restrict to a time window.
    pub window: Option<TimeWindow>,
    /// Result ordering, newest first by default.
    pub order: QueryOrder,
    /// Results to skip after ordering.
    pub offset: usize,
    /// Maximum results to return.
    pub limit: usize,
}

impl Default for AuditQuery {
    fn default() -> Self {
        Self {
            source_id: None,
            kind: None,
            window: None,
            order: QueryOrder::NewestFirst,
            offset: 0,
            limit: 100,
        }
    }
}

/// Statistics entry for one source inside [`SystemStatistics`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceStatisticsEntry {
    /// Source id.
    pub source_id: String,
    /// Display name.
    pub display_name: String,
    /// Current status.
    pub status: SourceStatus,
    /// Per-source statistics snapshot.
    pub statistics: SourceStatistics,
}

/// Aggregate statistics across every known source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStatistics {
    /// When the snapshot was taken.
    pub generated_at: DateTime<Utc>,
    /// Seconds since the store was created.
    pub uptime_seconds: i64,
    /// Number of known sources.
    pub source_count: usize,
    /// Events reported across all sources.
    pub total_events: u64,
    /// Signals emitted across all sources.
    pub total_signals: u64,
    /// Errors recorded across all sources.
    pub total_errors: u64,
    /// Successful signals over total signals, 1.0 while nothing emitted.
    pub overall_success_rate: f64,
    /// Per-source breakdown, sorted by source id.
    pub sources: Vec<SourceStatisticsEntry>,
}

/// Capacity configuration for a [`StateStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateStoreConfig {
    /// Audit entries retained per source. Default 1000.
    pub audit_capacity: usize,
    /// Emitted signals retained per source. Default 500.
    pub emission_capacity: usize,
    /// Event outcomes retained per source. Default 500.
    pub outcome_capacity: usize,
    /// Items of each history included in a snapshot. Default 50.
    pub snapshot_limit: usize,
}

impl Default for StateStoreConfig {
    fn default() -> Self {
        Self {
            audit_capacity: 1000,
            emission_capacity: 500,
            outcome_capacity: 500,
            snapshot_limit: 50,
        }
    }
}

struct CellInner {
    state: SourceState,
    stats: RunningStats,
}

struct SourceCell {
    inner: Mutex<CellInner>,
}

/// In-memory store of source state, statistics and bounded histories.
pub struct StateStore {
    config: StateStoreConfig,
    started_at: DateTime<Utc>,
    sources: RwLock<HashMap<String, Arc<SourceCell>>>,
    audit: BoundedHistory<AuditEntry>,
    emissions: BoundedHistory<SignalRecord>,
    outcomes: BoundedHistory<EventOutcome>,
}

fn lock_err(context: &'static str) -> TelemetryError {
    TelemetryError::internal(format!("lock poisoned in {context}"))
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    /// Creates a store with default capacities.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(StateStoreConfig::default())
    }

    /// Creates a store with explicit capacities.
    #[must_use]
    pub fn with_config(config: StateStoreConfig) -> Self {
        Self {
            config,
            started_at: Utc::now(),
            sources: RwLock::new(HashMap::new()),
            audit: BoundedHistory::new(config.audit_capacity),
            emissions: BoundedHistory::new(config.emission_capacity),
            outcomes: BoundedHistory::new(config.outcome_capacity),
        }
    }

    /// Capacity configuration of this store.
    #[must_use]
    pub const fn config(&self) -> &StateStoreConfig {
        &self.config
    }

    /// When the store was created.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Registers a source, or returns the existing state untouched.
    ///
    /// Idempotent: calling this again, even with a different display name,
    /// neither resets counters nor renames the source. Renames go through
    /// [`StateStore::update`] so they leave an audit trail.
    pub fn initialize(&self, source_id: &str, display_name: &str) -> TelemetryResult<SourceState> {
        if let Some(cell) = self.existing_cell(source_id)? {
            let inner = cell.inner.lock().map_err(|_| lock_err("state initialize"))?;
            return Ok(inner.state.clone());
        }

        let mut sources = self.sources.write().map_err(|_| lock_err("state initialize"))?;
        let cell = sources.entry(source_id.to_string()).or_insert_with(|| {
            let now = Utc::now();
            Arc::new(SourceCell {
                inner: Mutex::new(CellInner {
                    state: SourceState {
                        source_id: source_id.to_string(),
                        display_name: display_name.to_string(),
                        status: SourceStatus::Idle,
                        created_at: now,
                        last_activity: now,
                        total_events: 0,
                        total_signals: 0,
                        triggers: 0,
                        metadata: serde_json::Map::new(),
                    },
                    stats: RunningStats::new(),
                }),
            })
        });
        let inner = cell.inner.lock().map_err(|_| lock_err("state initialize"))?;
        Ok(inner.state.clone())
    }

    /// Applies a partial update to an initialized source.
    ///
    /// Fails with [`StateError::NotInitialized`] for unknown sources and
    /// leaves no trace of them. Every successful update stamps
    /// `last_activity` and appends a `state_change` audit entry recording
    /// the before and after status.
    pub fn update(&self, source_id: &str, update: StateUpdate) -> TelemetryResult<SourceState> {
        let cell = self.cell(source_id)?;
        let mut inner = cell.inner.lock().map_err(|_| lock_err("state update"))?;

        let from = inner.state.status;
        let mut changes = serde_json::Map::new();

        if let Some(display_name) = update.display_name {
            if display_name != inner.state.display_name {
                changes.insert("renamed_to".to_string(), json!(display_name));
            }
            inner.state.display_name = display_name;
        }
        if let Some(status) = update.status {
            inner.state.status = status;
        }
        if let Some(metadata) = update.metadata {
            let keys: Vec<&String> = metadata.keys().collect();
            changes.insert("metadata_keys".to_string(), json!(keys));
            for (key, value) in metadata {
                inner.state.metadata.insert(key, value);
            }
        }
        inner.state.last_activity = Utc::now();

        let mut payload = serde_json::Map::new();
        payload.insert("from".to_string(), json!(from.to_string()));
        payload.insert("to".to_string(), json!(inner.state.status.to_string()));
        payload.extend(changes);
        self.audit.append(
            source_id,
            AuditEntry::new(source_id, AuditKind::StateChange, payload.into()),
        )?;

        Ok(inner.state.clone())
    }

    /// Returns the current state of a source, or `None` if it was never
    /// initialized.
    pub fn get(&self, source_id: &str) -> TelemetryResult<Option<SourceState>> {
        match self.existing_cell(source_id)? {
            Some(cell) => {
                let inner = cell.inner.lock().map_err(|_| lock_err("state get"))?;
                Ok(Some(inner.state.clone()))
            }
            None => Ok(None),
        }
    }

    /// Returns the composite snapshot of a source, or `None` if it was
    /// never initialized.
    ///
    /// The snapshot is taken under the source's lock, so it never shows a
    /// half-committed report.
    pub fn snapshot(&self, source_id: &str) -> TelemetryResult<Option<SourceSnapshot>> {
        let Some(cell) = self.existing_cell(source_id)? else {
            return Ok(None);
        };
        let inner = cell.inner.lock().map_err(|_| lock_err("state snapshot"))?;
        let limit = self.config.snapshot_limit;
        Ok(Some(SourceSnapshot {
            state: inner.state.clone(),
            statistics: inner.stats.snapshot(Utc::now()),
            recent_entries: self.audit.for_key(source_id, limit)?,
            recent_signals: self.emissions.for_key(source_id, limit)?,
            recent_outcomes: self.outcomes.for_key(source_id, limit)?,
        }))
    }

    /// Commits an accepted report: statistics, counters, status transition,
    /// histories and audit entries move together under the source's lock.
    pub(crate) fn commit(
        &self,
        source_id: &str,
        outcome: EventOutcome,
        emission: Option<SignalRecord>,
    ) -> TelemetryResult<SourceState> {
        self.commit_with(source_id, outcome, emission, None)
    }

    /// Commits a rejected report: the event is recorded as an error and the
    /// validation failures land in an `error` audit entry.
    pub(crate) fn commit_rejected(
        &self,
        source_id: &str,
        outcome: EventOutcome,
        errors: &[String],
    ) -> TelemetryResult<SourceState> {
        self.commit_with(source_id, outcome, None, Some(errors))
    }

    fn commit_with(
        &self,
        source_id: &str,
        outcome: EventOutcome,
        emission: Option<SignalRecord>,
        rejection: Option<&[String]>,
    ) -> TelemetryResult<SourceState> {
        let cell = self.cell(source_id)?;
        let mut inner = cell.inner.lock().map_err(|_| lock_err("state commit"))?;

        let from = inner.state.status;
        let to = match outcome.outcome {
            OutcomeKind::Triggered => SourceStatus::Active,
            OutcomeKind::Ignored => SourceStatus::Idle,
            OutcomeKind::Error => SourceStatus::Error,
        };

        inner.stats.record_event(outcome.processed, outcome.processing_time_ms);
        if outcome.outcome == OutcomeKind::Error {
            inner.stats.record_error();
        }
        inner.state.total_events += 1;
        if outcome.outcome == OutcomeKind::Triggered {
            inner.state.triggers += 1;
        }

        self.outcomes.append(source_id, outcome.clone())?;
        self.audit.append(
            source_id,
            AuditEntry::new(
                source_id,
                AuditKind::EventProcessed,
                json!({
                    "event_id": outcome.event_id.to_string(),
                    "event_type": outcome.event_type,
                    "outcome": outcome.outcome.to_string(),
                    "processing_time_ms": outcome.processing_time_ms,
                }),
            ),
        )?;

        if let Some(errors) = rejection {
            self.audit.append(
                source_id,
                AuditEntry::new(
                    source_id,
                    AuditKind::Error,
                    json!({
                        "event_id": outcome.event_id.to_string(),
                        "event_type": outcome.event_type,
                        "errors": errors,
                    }),
                ),
            )?;
        }

        if let Some(record) = emission {
            inner.stats.record_signal(
                &record.record_type,
                record.success,
                record.processing_time_ms,
                record.confidence,
            );
            inner.state.total_signals += 1;
            self.audit.append(
                source_id,
                AuditEntry::new(
                    source_id,
                    AuditKind::RecordEmitted,
                    json!({
                        "record_id": record.record_id.to_string(),
                        "record_type": record.record_type,
                        "success": record.success,
                        "confidence": record.confidence,
                    }),
                ),
            )?;
            self.emissions.append(source_id, record)?;
        }

        inner.state.status = to;
        inner.state.last_activity = Utc::now();

        if from != to {
            self.audit.append(
                source_id,
                AuditEntry::new(
                    source_id,
                    AuditKind::StateChange,
                    json!({"from": from.to_string(), "to": to.to_string()}),
                ),
            )?;
        }

        Ok(inner.state.clone())
    }

    /// Searches the audit trail.
    ///
    /// Unknown sources or filters matching nothing yield empty results.
    pub fn search_audit(&self, query: &AuditQuery) -> TelemetryResult<Vec<AuditEntry>> {
        self.audit.query(
            query.source_id.as_deref(),
            |entry| query.kind.map_or(true, |kind| entry.kind == kind),
            query.window.as_ref(),
            query.order,
            query.offset,
            query.limit,
        )
    }

    /// Removes history items older than `max_age` from every history and
    /// returns the total removed. Counters and statistics are untouched.
    pub fn purge_older_than(&self, max_age: Duration) -> TelemetryResult<usize> {
        let mut removed = self.audit.purge_older_than(max_age)?;
        removed += self.emissions.purge_older_than(max_age)?;
        removed += self.outcomes.purge_older_than(max_age)?;
        Ok(removed)
    }

    /// Aggregate statistics across all sources.
    #[allow(clippy::cast_precision_loss)]
    pub fn system_statistics(&self) -> TelemetryResult<SystemStatistics> {
        let now = Utc::now();
        let cells = self.all_cells()?;

        let mut entries = Vec::with_capacity(cells.len());
        let mut total_events = 0;
        let mut total_signals = 0;
        let mut successful_signals = 0;
        let mut total_errors = 0;

        for cell in cells {
            let inner = cell.inner.lock().map_err(|_| lock_err("state statistics"))?;
            let statistics = inner.stats.snapshot(now);
            total_events += statistics.total_events;
            total_signals += statistics.total_signals;
            successful_signals += statistics.successful_signals;
            total_errors += statistics.error_count;
            entries.push(SourceStatisticsEntry {
                source_id: inner.state.source_id.clone(),
                display_name: inner.state.display_name.clone(),
                status: inner.state.status,
                statistics,
            });
        }
        entries.sort_by(|a, b| a.source_id.cmp(&b.source_id));

        let overall_success_rate = if total_signals == 0 {
            1.0
        } else {
            successful_signals as f64 / total_signals as f64
        };

        Ok(SystemStatistics {
            generated_at: now,
            uptime_seconds: (now - self.started_at).num_seconds(),
            source_count: entries.len(),
            total_events,
            total_signals,
            total_errors,
            overall_success_rate,
            sources: entries,
        })
    }

    /// All known sources, sorted by id.
    pub fn sources(&self) -> TelemetryResult<Vec<SourceState>> {
        let cells = self.all_cells()?;
        let mut states = Vec::with_capacity(cells.len());
        for cell in cells {
            let inner = cell.inner.lock().map_err(|_| lock_err("state sources"))?;
            states.push(inner.state.clone());
        }
        states.sort_by(|a, b| a.source_id.cmp(&b.source_id));
        Ok(states)
    }

    /// Number of known sources.
    pub fn source_count(&self) -> TelemetryResult<usize> {
        Ok(self.sources.read().map_err(|_| lock_err("state count"))?.len())
    }

    fn existing_cell(&self, source_id: &str) -> TelemetryResult<Option<Arc<SourceCell>>> {
        let sources = self.sources.read().map_err(|_| lock_err("state read"))?;
        Ok(sources.get(source_id).map(Arc::clone))
    }

    fn cell(&self, source_id: &str) -> TelemetryResult<Arc<SourceCell>> {
        self.existing_cell(source_id)?.ok_or_else(|| {
            TelemetryError::State(StateError::NotInitialized {
                source_id: source_id.to_string(),
            })
        })
    }

    fn all_cells(&self) -> TelemetryResult<Vec<Arc<SourceCell>>> {
        let sources = self.sources.read().map_err(|_| lock_err("state read"))?;
        Ok(sources.values().map(Arc::clone).collect())
    }
}
