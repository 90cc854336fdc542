//! Immutable, timestamped event records.
//!
//! A record is what a producer hands to the bus: an event kind, the turn it
//! happened on, and a map from field name to [`TaggedValue`]. The field map
//! doubles as the record's partition key inside the stats tracker, so it is
//! an ordered map with value equality.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::EventKindId;
use crate::time::Turn;
use crate::value::TaggedValue;

/// Field name to value map; also the partition key of a record.
pub type FieldMap = BTreeMap<String, TaggedValue>;

/// One immutable instance of an event kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Which kind of thing happened.
    kind: EventKindId,
    /// The turn on which it happened.
    timestamp: Turn,
    /// The concrete field values.
    #[serde(default)]
    fields: FieldMap,
}

impl EventRecord {
    /// Create a record from its parts.
    pub const fn new(kind: EventKindId, timestamp: Turn, fields: FieldMap) -> Self {
        Self {
            kind,
            timestamp,
            fields,
        }
    }

    /// Create a record with no fields, to be filled with [`with`](Self::with).
    pub fn of(kind: impl Into<EventKindId>, timestamp: Turn) -> Self {
        Self::new(kind.into(), timestamp, FieldMap::new())
    }

    /// Return the record with `field` set to `value`.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<TaggedValue>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// Return the event kind.
    pub const fn kind(&self) -> &EventKindId {
        &self.kind
    }

    /// Return the turn the event happened on.
    pub const fn timestamp(&self) -> Turn {
        self.timestamp
    }

    /// Return the full field map.
    pub const fn fields(&self) -> &FieldMap {
        &self.fields
    }

    /// Return one field's value, if present.
    pub fn get(&self, field: &str) -> Option<&TaggedValue> {
        self.fields.get(field)
    }

    /// Return one field's integer value, if present and an integer.
    pub fn get_int(&self, field: &str) -> Option<i64> {
        self.get(field).and_then(TaggedValue::as_int)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_fields() {
        let record = EventRecord::of("kill", Turn(3))
            .with("monster", "zombie")
            .with("damage", 5);
        assert_eq!(record.kind().as_str(), "kill");
        assert_eq!(record.timestamp(), Turn(3));
        assert_eq!(record.get("monster"), Some(&TaggedValue::from("zombie")));
        assert_eq!(record.get_int("damage"), Some(5));
        assert_eq!(record.get_int("monster"), None);
        assert_eq!(record.get("missing"), None);
    }

    #[test]
    fn structurally_equal_records_share_a_key() {
        let a = EventRecord::of("kill", Turn(1)).with("monster", "zombie");
        let b = EventRecord::of("kill", Turn(9)).with("monster", "zombie");
        assert_eq!(a.fields(), b.fields());
    }

    #[test]
    fn record_serde_roundtrip() {
        let record = EventRecord::of("kill", Turn(2)).with("damage", 7);
        let json = serde_json::to_string(&record).ok();
        let restored: Option<EventRecord> =
            json.as_deref().and_then(|j| serde_json::from_str(j).ok());
        assert_eq!(restored, Some(record));
    }
}
