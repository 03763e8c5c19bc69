//! Signal catalog: the schema oracle consulted before a record is
//! accepted.
//!
//! The catalog is an external collaborator behind the [`SignalCatalog`]
//! trait. The engine treats it as a pure, fast, side-effect-free check:
//! `validate` decides whether a payload is well-formed for its record
//! type, and `descriptor` supplies presentation metadata (glyph,
//! category, priority) for records that pass.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::record::Priority;

/// Glyph used when the catalog has no descriptor for a record type.
pub const DEFAULT_GLYPH: &str = "📡";

/// Outcome of a catalog validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogVerdict {
    /// Whether the payload is acceptable for the record type.
    pub valid: bool,
    /// Human-readable reasons when `valid` is false.
    pub errors: Vec<String>,
}

impl CatalogVerdict {
    /// A passing verdict.
    #[must_use]
    pub const fn valid() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    /// A failing verdict carrying its reasons.
    #[must_use]
    pub const fn invalid(errors: Vec<String>) -> Self {
        Self {
            valid: false,
            errors,
        }
    }
}

/// Presentation metadata the catalog knows about a record type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalDescriptor {
    /// Marker glyph attached to emitted records.
    pub glyph: String,
    /// Category used for classification and filtering.
    pub category: Option<String>,
    /// Priority used for classification and filtering.
    pub priority: Option<Priority>,
}

impl SignalDescriptor {
    /// Descriptor with only a glyph.
    #[must_use]
    pub fn glyph(glyph: impl Into<String>) -> Self {
        Self {
            glyph: glyph.into(),
            category: None,
            priority: None,
        }
    }

    /// Sets the category.
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Sets the priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }
}

/// Schema oracle consulted for every triggered event.
///
/// Implementations must be cheap to call on the hot path and must not
/// mutate state observable by the engine.
pub trait SignalCatalog: Send + Sync {
    /// Validates a payload against the schema for `record_type`.
    fn validate(&self, record_type: &str, payload: &Value) -> CatalogVerdict;

    /// Returns presentation metadata for `record_type`, if known.
    fn descriptor(&self, record_type: &str) -> Option<SignalDescriptor>;
}

/// Catalog that accepts every payload and knows no descriptors.
///
/// Useful for tests and for deployments that do schema enforcement
/// upstream.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissiveCatalog;

impl SignalCatalog for PermissiveCatalog {
    fn validate(&self, _record_type: &str, _payload: &Value) -> CatalogVerdict {
        CatalogVerdict::valid()
    }

    fn descriptor(&self, _record_type: &str) -> Option<SignalDescriptor> {
        None
    }
}

struct SignalSchema {
    descriptor: SignalDescriptor,
    required_fields: Vec<String>,
}

/// Fixed catalog mapping record types to descriptors and required
/// payload fields.
///
/// Unknown record types fail validation, as does any payload missing a
/// required top-level field.
#[derive(Default)]
pub struct StaticCatalog {
    schemas: HashMap<String, SignalSchema>,
}

impl StaticCatalog {
    /// Creates an empty catalog. Every record type is unknown until
    /// registered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a record type with its descriptor and required
    /// top-level payload fields.
    #[must_use]
    pub fn with_signal(
        mut self,
        record_type: impl Into<String>,
        descriptor: SignalDescriptor,
        required_fields: &[&str],
    ) -> Self {
        self.schemas.insert(
            record_type.into(),
            SignalSchema {
                descriptor,
                required_fields: required_fields.iter().map(ToString::to_string).collect(),
            },
        );
        self
    }
}

impl SignalCatalog for StaticCatalog {
    fn validate(&self, record_type: &str, payload: &Value) -> CatalogVerdict {
        let Some(schema) = self.schemas.get(record_type) else {
            return CatalogVerdict::invalid(vec![format!("unknown record type: {record_type}")]);
        };

        if schema.required_fields.is_empty() {
            return CatalogVerdict::valid();
        }

        let Some(object) = payload.as_object() else {
            return CatalogVerdict::invalid(vec![format!(
                "payload for {record_type} must be a JSON object"
            )]);
        };

        let missing: Vec<String> = schema
            .required_fields
            .iter()
            .filter(|field| !object.contains_key(field.as_str()))
            .map(|field| format!("missing required field: {field}"))
            .collect();

        if missing.is_empty() {
            CatalogVerdict::valid()
        } else {
            CatalogVerdict::invalid(missing)
        }
    }

    fn descriptor(&self, record_type: &str) -> Option<SignalDescriptor> {
        self.schemas
            .get(record_type)
            .map(|schema| schema.descriptor.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // Compile-time test: the catalog must stay object-safe.
    fn _assert_catalog_object_safe(_: &dyn SignalCatalog) {}

    fn sample_catalog() -> StaticCatalog {
        StaticCatalog::new()
            .with_signal(
                "anomaly.detected",
                SignalDescriptor::glyph("⚠️")
                    .with_category("anomaly")
                    .with_priority(Priority::High),
                &["metric", "value"],
            )
            .with_signal("heartbeat", SignalDescriptor::glyph("💓"), &[])
    }

    #[test]
    fn test_permissive_catalog_accepts_anything() {
        let catalog = PermissiveCatalog;
        let verdict = catalog.validate("whatever", &json!(null));
        assert!(verdict.valid);
        assert!(verdict.errors.is_empty());
        assert!(catalog.descriptor("whatever").is_none());
    }

    #[test]
    fn test_static_catalog_rejects_unknown_type() {
        let catalog = sample_catalog();
        let verdict = catalog.validate("no.such.type", &json!({}));
        assert!(!verdict.valid);
        assert_eq!(verdict.errors, vec!["unknown record type: no.such.type"]);
    }

    #[test]
    fn test_static_catalog_reports_each_missing_field() {
        let catalog = sample_catalog();
        let verdict = catalog.validate("anomaly.detected", &json!({"metric": "cpu"}));
        assert!(!verdict.valid);
        assert_eq!(verdict.errors, vec!["missing required field: value"]);

        let verdict = catalog.validate("anomaly.detected", &json!({}));
        assert_eq!(verdict.errors.len(), 2);
    }

    #[test]
    fn test_static_catalog_requires_object_payload_when_fields_are_required() {
        let catalog = sample_catalog();
        let verdict = catalog.validate("anomaly.detected", &json!([1, 2, 3]));
        assert!(!verdict.valid);
        assert!(verdict.errors[0].contains("must be a JSON object"));

        // No required fields means shape goes unchecked.
        let verdict = catalog.validate("heartbeat", &json!("alive"));
        assert!(verdict.valid);
    }

    #[test]
    fn test_static_catalog_accepts_complete_payload() {
        let catalog = sample_catalog();
        let verdict = catalog.validate(
            "anomaly.detected",
            &json!({"metric": "cpu", "value": 97.5, "extra": true}),
        );
        assert!(verdict.valid);
    }

    #[test]
    fn test_descriptor_lookup() {
        let catalog = sample_catalog();
        let descriptor = catalog.descriptor("anomaly.detected").unwrap();
        assert_eq!(descriptor.glyph, "⚠️");
        assert_eq!(descriptor.category.as_deref(), Some("anomaly"));
        assert_eq!(descriptor.priority, Some(Priority::High));
        assert!(catalog.descriptor("no.such.type").is_none());
    }
}
