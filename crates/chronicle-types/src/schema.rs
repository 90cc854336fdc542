//! Event kind schemas and record validation.
//!
//! Each event kind has a fixed schema (field name to [`ValueType`]) that is
//! decided when descriptors are loaded. The bus validates every record
//! against its kind's schema before any subscriber sees it; the stats layer
//! uses the same registry to check that descriptors reference real fields.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::EventKindId;
use crate::record::EventRecord;
use crate::value::ValueType;

/// Reasons a record is rejected by [`EventSchemas::validate`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    /// The record carries the empty ("no kind") kind id.
    #[error("record has no event kind")]
    NoKind,

    /// The record's kind has no registered schema.
    #[error("unknown event kind: {0}")]
    UnknownKind(EventKindId),

    /// The record has a different number of fields than its schema.
    #[error("event {kind} expects {expected} fields, got {actual}")]
    ArityMismatch {
        /// The record's kind.
        kind: EventKindId,
        /// Field count declared by the schema.
        expected: usize,
        /// Field count carried by the record.
        actual: usize,
    },

    /// The record lacks a field its schema declares.
    #[error("event {kind} is missing field {field}")]
    MissingField {
        /// The record's kind.
        kind: EventKindId,
        /// The missing field.
        field: String,
    },

    /// A field's value has the wrong type.
    #[error("event {kind} field {field} should be {expected}, got {actual}")]
    TypeMismatch {
        /// The record's kind.
        kind: EventKindId,
        /// The offending field.
        field: String,
        /// Declared type.
        expected: ValueType,
        /// Type of the supplied value.
        actual: ValueType,
    },
}

/// The schema of one event kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSchema {
    /// The kind this schema describes.
    pub kind: EventKindId,
    /// Declared fields and their types.
    #[serde(default)]
    pub fields: BTreeMap<String, ValueType>,
}

impl EventSchema {
    /// Create a schema with no fields.
    pub fn new(kind: impl Into<EventKindId>) -> Self {
        Self {
            kind: kind.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Return the schema with one more declared field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, ty: ValueType) -> Self {
        self.fields.insert(name.into(), ty);
        self
    }
}

/// Registry of every known event kind's schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventSchemas {
    schemas: BTreeMap<EventKindId, EventSchema>,
}

impl EventSchemas {
    /// Create an empty registry.
    pub const fn new() -> Self {
        Self {
            schemas: BTreeMap::new(),
        }
    }

    /// Register a schema, returning the one it replaced (if any).
    pub fn register(&mut self, schema: EventSchema) -> Option<EventSchema> {
        self.schemas.insert(schema.kind.clone(), schema)
    }

    /// Return the schema for `kind`.
    pub fn get(&self, kind: &EventKindId) -> Option<&EventSchema> {
        self.schemas.get(kind)
    }

    /// Return whether `kind` is registered.
    pub fn contains(&self, kind: &EventKindId) -> bool {
        self.schemas.contains_key(kind)
    }

    /// Return the declared type of `field` on `kind`, if both exist.
    pub fn field_type(&self, kind: &EventKindId, field: &str) -> Option<&ValueType> {
        self.get(kind).and_then(|schema| schema.fields.get(field))
    }

    /// Iterate over all registered schemas in kind order.
    pub fn iter(&self) -> impl Iterator<Item = &EventSchema> {
        self.schemas.values()
    }

    /// Check a record against its kind's schema.
    ///
    /// Null values are accepted for any declared type (a producer may have
    /// nothing to report for a field).
    ///
    /// # Errors
    ///
    /// Returns the first [`RecordError`] found.
    pub fn validate(&self, record: &EventRecord) -> Result<(), RecordError> {
        let kind = record.kind();
        if kind.is_empty() {
            return Err(RecordError::NoKind);
        }
        let schema = self
            .get(kind)
            .ok_or_else(|| RecordError::UnknownKind(kind.clone()))?;

        let fields = record.fields();
        if fields.len() != schema.fields.len() {
            return Err(RecordError::ArityMismatch {
                kind: kind.clone(),
                expected: schema.fields.len(),
                actual: fields.len(),
            });
        }

        for (name, expected) in &schema.fields {
            let value = fields.get(name).ok_or_else(|| RecordError::MissingField {
                kind: kind.clone(),
                field: name.clone(),
            })?;
            let actual = value.value_type();
            if !value.is_null() && actual != *expected {
                return Err(RecordError::TypeMismatch {
                    kind: kind.clone(),
                    field: name.clone(),
                    expected: expected.clone(),
                    actual,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::Turn;
    use crate::value::TaggedValue;

    fn schemas() -> EventSchemas {
        let mut schemas = EventSchemas::new();
        schemas.register(
            EventSchema::new("kill")
                .field("monster", ValueType::String)
                .field("damage", ValueType::Int),
        );
        schemas
    }

    #[test]
    fn well_formed_record_passes() {
        let record = EventRecord::of("kill", Turn(0))
            .with("monster", "zombie")
            .with("damage", 5);
        assert_eq!(schemas().validate(&record), Ok(()));
    }

    #[test]
    fn empty_kind_is_rejected() {
        let record = EventRecord::of("", Turn(0));
        assert_eq!(schemas().validate(&record), Err(RecordError::NoKind));
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let record = EventRecord::of("sneeze", Turn(0));
        assert!(matches!(
            schemas().validate(&record),
            Err(RecordError::UnknownKind(_))
        ));
    }

    #[test]
    fn wrong_arity_is_rejected() {
        let record = EventRecord::of("kill", Turn(0)).with("monster", "zombie");
        assert!(matches!(
            schemas().validate(&record),
            Err(RecordError::ArityMismatch {
                expected: 2,
                actual: 1,
                ..
            })
        ));
    }

    #[test]
    fn renamed_field_is_missing() {
        let record = EventRecord::of("kill", Turn(0))
            .with("monster", "zombie")
            .with("dmg", 5);
        assert!(matches!(
            schemas().validate(&record),
            Err(RecordError::MissingField { .. })
        ));
    }

    #[test]
    fn wrong_type_is_rejected_but_null_is_accepted() {
        let wrong = EventRecord::of("kill", Turn(0))
            .with("monster", "zombie")
            .with("damage", "lots");
        assert!(matches!(
            schemas().validate(&wrong),
            Err(RecordError::TypeMismatch { .. })
        ));

        let null = EventRecord::of("kill", Turn(0))
            .with("monster", TaggedValue::Null)
            .with("damage", 1);
        assert_eq!(schemas().validate(&null), Ok(()));
    }

    #[test]
    fn field_type_lookup() {
        let schemas = schemas();
        let kill = EventKindId::new("kill");
        assert_eq!(schemas.field_type(&kill, "damage"), Some(&ValueType::Int));
        assert_eq!(schemas.field_type(&kill, "weapon"), None);
    }
}
