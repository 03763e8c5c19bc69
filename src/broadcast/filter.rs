//! Record filtering for subscriptions and queries.

use serde::{Deserialize, Serialize};

use crate::record::{Priority, StreamRecord};

/// Criteria a broadcast record must satisfy to reach a subscriber.
///
/// All present criteria must hold (AND); absent criteria match
/// everything, so the default filter is a wildcard. Equality criteria are
/// exact string or enum matches. `min_confidence` is inclusive; a record
/// that carries no confidence does not satisfy it, and a record without a
/// classification does not satisfy `category` or `priority`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordFilter {
    /// Exact source display name.
    pub source_name: Option<String>,
    /// Exact source id.
    pub source_id: Option<String>,
    /// Exact record type.
    pub record_type: Option<String>,
    /// Exact classification category.
    pub category: Option<String>,
    /// Exact classification priority.
    pub priority: Option<Priority>,
    /// Minimum confidence, inclusive.
    pub min_confidence: Option<f32>,
}

impl RecordFilter {
    /// Wildcard filter matching every record.
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    /// Restricts to an exact source display name.
    #[must_use]
    pub fn with_source_name(mut self, source_name: impl Into<String>) -> Self {
        self.source_name = Some(source_name.into());
        self
    }

    /// Restricts to an exact source id.
    #[must_use]
    pub fn with_source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    /// Restricts to an exact record type.
    #[must_use]
    pub fn with_record_type(mut self, record_type: impl Into<String>) -> Self {
        self.record_type = Some(record_type.into());
        self
    }

    /// Restricts to an exact classification category.
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Restricts to an exact classification priority.
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Requires a confidence of at least `min_confidence`.
    #[must_use]
    pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = Some(min_confidence);
        self
    }

    /// True if no criterion is set.
    #[must_use]
    pub const fn is_wildcard(&self) -> bool {
        self.source_name.is_none()
            && self.source_id.is_none()
            && self.record_type.is_none()
            && self.category.is_none()
            && self.priority.is_none()
            && self.min_confidence.is_none()
    }

    /// Evaluates the filter against a record.
    ///
    /// Cheap equality criteria are checked before the classification and
    /// confidence criteria so mismatches bail out early on the hot path.
    #[must_use]
    pub fn matches(&self, record: &StreamRecord) -> bool {
        if let Some(source_id) = &self.source_id {
            if record.record.source_id != *source_id {
                return false;
            }
        }
        if let Some(source_name) = &self.source_name {
            if record.record.source_name != *source_name {
                return false;
            }
        }
        if let Some(record_type) = &self.record_type {
            if record.record.record_type != *record_type {
                return false;
            }
        }

        if self.category.is_some() || self.priority.is_some() {
            let Some(classification) = &record.classification else {
                return false;
            };
            if let Some(category) = &self.category {
                if classification.category != *category {
                    return false;
                }
            }
            if let Some(priority) = self.priority {
                if classification.priority != priority {
                    return false;
                }
            }
        }

        if let Some(min_confidence) = self.min_confidence {
            match record.record.confidence {
                Some(confidence) if confidence >= min_confidence => {}
                _ => return false,
            }
        }

        true
    }
}
