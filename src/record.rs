//! Signal records and their broadcast projection.
//!
//! A [`SignalRecord`] is the durable-in-memory form of an emitted signal;
//! a [`StreamRecord`] is the same emission wrapped for fan-out, carrying a
//! synthetic broadcast id and the classification assigned by the catalog.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::history::Timestamped;

/// Unique identifier for an emitted signal record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub Uuid);

impl RecordId {
    /// Creates a new random record id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier minted for each broadcast of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BroadcastId(pub Uuid);

impl BroadcastId {
    /// Creates a new random broadcast id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BroadcastId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BroadcastId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Priority assigned to a broadcast record by the catalog.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[allow(missing_docs)]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        write!(f, "{name}")
    }
}

/// Classification block attached to a broadcast record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// Priority of the record for consumers.
    pub priority: Priority,
    /// Category the record type belongs to.
    pub category: String,
    /// Source the classification was derived for.
    pub source_id: String,
}

/// An emitted signal record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    /// Stable id of the emission.
    pub record_id: RecordId,
    /// Source that emitted the signal.
    pub source_id: String,
    /// Display name of the source at emission time.
    pub source_name: String,
    /// Record type as known to the catalog.
    pub record_type: String,
    /// Marker glyph for the record type.
    pub glyph: String,
    /// When the signal was emitted.
    pub emitted_at: DateTime<Utc>,
    /// Producer-supplied confidence in `[0.0, 1.0]`, when given.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    /// Whether the producing operation succeeded.
    pub success: bool,
    /// Processing time in milliseconds, never negative.
    pub processing_time_ms: f64,
    /// Free-form record payload.
    pub payload: serde_json::Value,
}

impl Timestamped for SignalRecord {
    fn occurred_at(&self) -> DateTime<Utc> {
        self.emitted_at
    }
}

/// A signal record prepared for broadcast.
///
/// Every publish mints a fresh [`BroadcastId`]; the underlying record
/// fields are flattened into the serialized form so subscribers see one
/// flat object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamRecord {
    /// Id minted for this broadcast.
    pub broadcast_id: BroadcastId,
    /// The emitted record.
    #[serde(flatten)]
    pub record: SignalRecord,
    /// Classification from the catalog descriptor, when one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<Classification>,
}

impl StreamRecord {
    /// Wraps a record for broadcast with a fresh broadcast id.
    #[must_use]
    pub fn new(record: SignalRecord, classification: Option<Classification>) -> Self {
        Self {
            broadcast_id: BroadcastId::new(),
            record,
            classification,
        }
    }
}

impl Timestamped for StreamRecord {
    fn occurred_at(&self) -> DateTime<Utc> {
        self.record.emitted_at
    }
}
