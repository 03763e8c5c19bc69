//! Event outcomes and the audit trail.
//!
//! Every report leaves a trace: an [`EventOutcome`] describing what the
//! source did with the event, and [`AuditEntry`] rows recording the
//! observable side effects (processing, emission, state changes, errors).
//! Audit payloads carry a blake3 fingerprint of their canonical JSON so
//! downstream consumers can deduplicate and tamper-check entries.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::history::Timestamped;

/// Unique identifier for a reported event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub Uuid);

impl EventId {
    /// Creates a new random event id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for an audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub Uuid);

impl EntryId {
    /// Creates a new random entry id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a source did with a reported event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// The event triggered a signal emission.
    Triggered,
    /// The event was examined and deliberately skipped.
    Ignored,
    /// Handling the event failed.
    Error,
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Triggered => "triggered",
            Self::Ignored => "ignored",
            Self::Error => "error",
        };
        write!(f, "{name}")
    }
}

/// The recorded outcome of one reported event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventOutcome {
    /// Id of the event.
    pub event_id: EventId,
    /// Source that handled the event.
    pub source_id: String,
    /// Event type as reported by the producer.
    pub event_type: String,
    /// When the outcome was recorded.
    pub occurred_at: DateTime<Utc>,
    /// Whether the handler completed without error.
    pub processed: bool,
    /// Processing time in milliseconds, never negative.
    pub processing_time_ms: f64,
    /// How the event was resolved.
    pub outcome: OutcomeKind,
    /// Free-form event payload.
    pub payload: serde_json::Value,
}

impl EventOutcome {
    /// Records an outcome as of now. `processed` is derived from the
    /// outcome kind: everything except [`OutcomeKind::Error`] counts as
    /// processed.
    #[must_use]
    pub fn new(
        source_id: impl Into<String>,
        event_type: impl Into<String>,
        outcome: OutcomeKind,
        processing_time_ms: f64,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_id: EventId::new(),
            source_id: source_id.into(),
            event_type: event_type.into(),
            occurred_at: Utc::now(),
            processed: !matches!(outcome, OutcomeKind::Error),
            processing_time_ms,
            outcome,
            payload,
        }
    }
}

impl Timestamped for EventOutcome {
    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

/// Category of an audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum AuditKind {
    EventProcessed,
    RecordEmitted,
    StateChange,
    Error,
}

/// One row of a source's audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Id of the entry.
    pub entry_id: EntryId,
    /// Source the entry belongs to.
    pub source_id: String,
    /// When the entry was recorded.
    pub recorded_at: DateTime<Utc>,
    /// What kind of side effect the entry records.
    pub kind: AuditKind,
    /// Summary payload describing the side effect.
    pub payload: serde_json::Value,
    /// Blake3 hex digest of the payload's canonical JSON.
    pub fingerprint: String,
}

impl AuditEntry {
    /// Records an audit entry as of now, fingerprinting the payload.
    #[must_use]
    pub fn new(source_id: impl Into<String>, kind: AuditKind, payload: serde_json::Value) -> Self {
        let fingerprint = fingerprint(&payload);
        Self {
            entry_id: EntryId::new(),
            source_id: source_id.into(),
            recorded_at: Utc::now(),
            kind,
            payload,
            fingerprint,
        }
    }
}

impl Timestamped for AuditEntry {
    fn occurred_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }
}

/// Blake3 hex digest of a JSON value's canonical encoding.
///
/// `serde_json` maps are ordered by key, so two structurally equal values
/// always produce the same digest regardless of how they were built.
#[must_use]
pub fn fingerprint(payload: &serde_json::Value) -> String {
    blake3::hash(payload.to_string().as_bytes())
        .to_hex()
        .to_string()
}
