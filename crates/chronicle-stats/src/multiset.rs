//! Partitioned event multisets and the criteria queries over them.
//!
//! An [`EventMultiset`] groups every record of one kind (or one
//! transformation's output) by its exact field map. Each partition carries
//! an [`EventSummary`]: how many records landed there and the first and
//! last turns one was seen. Absorbing a record touches exactly one
//! partition, so update cost does not grow with history.
//!
//! Every query takes a criteria map: a partial field map whose entries must
//! all be present and equal in a partition's key. An empty criteria map
//! matches every partition. A criterion naming a field the partition lacks
//! fails the match.

use std::collections::BTreeMap;

use chronicle_types::{EventRecord, FieldMap, TaggedValue, Turn};
use serde::{Deserialize, Serialize};

/// Running summary of one partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSummary {
    /// Number of records in the partition.
    pub count: u64,
    /// Earliest turn a record of the partition was seen.
    pub first_seen: Turn,
    /// Latest turn a record of the partition was seen.
    pub last_seen: Turn,
}

impl EventSummary {
    /// Summary of a single record seen on `turn`.
    pub const fn new(turn: Turn) -> Self {
        Self {
            count: 1,
            first_seen: turn,
            last_seen: turn,
        }
    }

    /// Absorb one more record seen on `turn`.
    pub fn absorb(&mut self, turn: Turn) {
        self.count = self.count.saturating_add(1);
        self.first_seen = self.first_seen.min(turn);
        self.last_seen = self.last_seen.max(turn);
    }

    /// Merge another summary of the same partition into this one.
    pub fn merge(&mut self, other: &Self) {
        self.count = self.count.saturating_add(other.count);
        self.first_seen = self.first_seen.min(other.first_seen);
        self.last_seen = self.last_seen.max(other.last_seen);
    }
}

/// Return whether `key` satisfies every entry of `criteria`.
pub fn matches_criteria(key: &FieldMap, criteria: &FieldMap) -> bool {
    criteria
        .iter()
        .all(|(field, wanted)| key.get(field) == Some(wanted))
}

/// A multiset of records, partitioned by exact field map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "MultisetRepr", into = "MultisetRepr")]
pub struct EventMultiset {
    counts: BTreeMap<FieldMap, EventSummary>,
}

impl EventMultiset {
    /// Create an empty multiset.
    pub const fn new() -> Self {
        Self {
            counts: BTreeMap::new(),
        }
    }

    /// Absorb one record into its partition, creating it if needed.
    pub fn add(&mut self, record: &EventRecord) {
        let turn = record.timestamp();
        if let Some(summary) = self.counts.get_mut(record.fields()) {
            summary.absorb(turn);
        } else {
            self.counts
                .insert(record.fields().clone(), EventSummary::new(turn));
        }
    }

    /// Merge a whole partition summary into this multiset.
    pub fn add_partition(&mut self, key: FieldMap, summary: EventSummary) {
        self.counts
            .entry(key)
            .and_modify(|existing| existing.merge(&summary))
            .or_insert(summary);
    }

    /// Return the summary of the partition with exactly this key.
    pub fn summary(&self, key: &FieldMap) -> Option<&EventSummary> {
        self.counts.get(key)
    }

    /// Return all partitions in key order.
    pub const fn counts(&self) -> &BTreeMap<FieldMap, EventSummary> {
        &self.counts
    }

    /// Iterate over all partitions in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&FieldMap, &EventSummary)> {
        self.counts.iter()
    }

    /// Iterate over the partitions matching `criteria`.
    pub fn matching<'a, 'c>(
        &'a self,
        criteria: &'c FieldMap,
    ) -> impl Iterator<Item = (&'a FieldMap, &'a EventSummary)> + use<'a, 'c> {
        self.counts
            .iter()
            .filter(move |(key, _)| matches_criteria(key, criteria))
    }

    /// Number of distinct partitions.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Whether no record has been absorbed.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Number of records in partitions matching `criteria`.
    pub fn count(&self, criteria: &FieldMap) -> u64 {
        self.matching(criteria)
            .fold(0_u64, |acc, (_, summary)| acc.saturating_add(summary.count))
    }

    /// Sum of `count * key[field]` over matching partitions.
    ///
    /// Partitions whose `field` is missing or not an integer contribute
    /// nothing.
    pub fn total(&self, field: &str, criteria: &FieldMap) -> i64 {
        self.matching(criteria).fold(0_i64, |acc, (key, summary)| {
            let Some(value) = key.get(field).and_then(TaggedValue::as_int) else {
                return acc;
            };
            let weight = i64::try_from(summary.count).unwrap_or(i64::MAX);
            acc.saturating_add(weight.saturating_mul(value))
        })
    }

    /// Smallest non-null value of `field` among matching partitions.
    pub fn minimum(&self, field: &str, criteria: &FieldMap) -> Option<&TaggedValue> {
        self.field_values(field, criteria).min()
    }

    /// Largest non-null value of `field` among matching partitions.
    pub fn maximum(&self, field: &str, criteria: &FieldMap) -> Option<&TaggedValue> {
        self.field_values(field, criteria).max()
    }

    /// The matching partition seen earliest; ties go to the smallest key.
    pub fn first(&self, criteria: &FieldMap) -> Option<(&FieldMap, &EventSummary)> {
        self.matching(criteria)
            .min_by_key(|(_, summary)| summary.first_seen)
    }

    /// The matching partition seen latest; ties go to the largest key.
    pub fn last(&self, criteria: &FieldMap) -> Option<(&FieldMap, &EventSummary)> {
        self.matching(criteria)
            .max_by_key(|(_, summary)| summary.last_seen)
    }

    fn field_values<'a, 'q>(
        &'a self,
        field: &'q str,
        criteria: &'q FieldMap,
    ) -> impl Iterator<Item = &'a TaggedValue> + use<'a, 'q> {
        self.matching(criteria)
            .filter_map(move |(key, _)| key.get(field))
            .filter(|value| !value.is_null())
    }
}

/// Persisted form: `{"event_counts": [[fields, count, first, last], ...]}`.
#[derive(Serialize, Deserialize)]
struct MultisetRepr {
    event_counts: Vec<PartitionRepr>,
}

#[derive(Serialize, Deserialize)]
struct PartitionRepr(FieldMap, u64, Turn, Turn);

impl From<MultisetRepr> for EventMultiset {
    fn from(repr: MultisetRepr) -> Self {
        let mut multiset = Self::new();
        for PartitionRepr(key, count, first_seen, last_seen) in repr.event_counts {
            multiset.add_partition(
                key,
                EventSummary {
                    count,
                    first_seen,
                    last_seen,
                },
            );
        }
        multiset
    }
}

impl From<EventMultiset> for MultisetRepr {
    fn from(multiset: EventMultiset) -> Self {
        Self {
            event_counts: multiset
                .counts
                .into_iter()
                .map(|(key, s)| PartitionRepr(key, s.count, s.first_seen, s.last_seen))
                .collect(),
        }
    }
}
