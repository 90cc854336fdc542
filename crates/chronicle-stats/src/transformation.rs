//! Event transformations: named filters that derive one multiset from
//! another.
//!
//! A [`Transformation`] reads from an [`EventSource`] (an event kind, or
//! another transformation) and keeps the partitions whose field values
//! satisfy every [`ValueConstraint`]. The batch path
//! ([`Transformation::filter`]) runs when a transformation is first
//! materialized or a constraint's statistic changes; the live path runs
//! [`Transformation::matches`] on the single new record.

use std::collections::BTreeMap;

use chronicle_types::{
    EventKindId, EventSchemas, FieldMap, StatisticId, TaggedValue, TransformationId, ValueType,
};
use serde::{Deserialize, Serialize};

use crate::catalog::StatsCatalog;
use crate::diagnostic::Diagnostic;
use crate::multiset::EventMultiset;

/// Where a multiset comes from.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    /// The raw multiset of an event kind.
    EventKind(EventKindId),
    /// The output of a transformation.
    Transformation(TransformationId),
}

impl core::fmt::Display for EventSource {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::EventKind(kind) => write!(f, "event kind {kind}"),
            Self::Transformation(id) => write!(f, "transformation {id}"),
        }
    }
}

/// A condition one field of a record must satisfy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueConstraint {
    /// Equal to a literal value.
    Equals(TaggedValue),
    /// Equal, in string form, to a literal string.
    EqualsString(String),
    /// Equal to the current value of a statistic.
    EqualsStatistic(StatisticId),
    /// Equal to any one of several literal values.
    EqualsAny(Vec<TaggedValue>),
}

impl ValueConstraint {
    /// Return whether `value` satisfies the constraint.
    ///
    /// `statistic_value` resolves [`ValueConstraint::EqualsStatistic`].
    pub fn permits<F>(&self, value: &TaggedValue, statistic_value: &F) -> bool
    where
        F: Fn(&StatisticId) -> TaggedValue,
    {
        match self {
            Self::Equals(expected) => value == expected,
            Self::EqualsString(expected) => value.to_repr() == *expected,
            Self::EqualsStatistic(statistic) => statistic_value(statistic) == *value,
            Self::EqualsAny(options) => options.contains(value),
        }
    }

    /// The statistic this constraint depends on, if any.
    pub const fn statistic(&self) -> Option<&StatisticId> {
        match self {
            Self::EqualsStatistic(statistic) => Some(statistic),
            Self::Equals(_) | Self::EqualsString(_) | Self::EqualsAny(_) => None,
        }
    }
}

/// A named filter over a source multiset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transformation {
    /// Unique identifier.
    pub id: TransformationId,
    /// The multiset being filtered.
    pub source: EventSource,
    /// Per-field constraints, all of which must hold.
    #[serde(default)]
    pub value_constraints: BTreeMap<String, ValueConstraint>,
}

impl Transformation {
    /// Create a transformation with no constraints yet.
    pub fn new(id: impl Into<TransformationId>, source: EventSource) -> Self {
        Self {
            id: id.into(),
            source,
            value_constraints: BTreeMap::new(),
        }
    }

    /// Return the transformation with one more field constraint.
    #[must_use]
    pub fn constrain(mut self, field: impl Into<String>, constraint: ValueConstraint) -> Self {
        self.value_constraints.insert(field.into(), constraint);
        self
    }

    /// Return whether a record with these fields passes the filter.
    ///
    /// A constrained field the record lacks fails the match.
    pub fn matches<F>(&self, fields: &FieldMap, statistic_value: &F) -> bool
    where
        F: Fn(&StatisticId) -> TaggedValue,
    {
        self.value_constraints.iter().all(|(field, constraint)| {
            fields
                .get(field)
                .is_some_and(|value| constraint.permits(value, statistic_value))
        })
    }

    /// Compute the derived multiset from the source multiset.
    pub fn filter<F>(&self, input: &EventMultiset, statistic_value: &F) -> EventMultiset
    where
        F: Fn(&StatisticId) -> TaggedValue,
    {
        let mut output = EventMultiset::new();
        for (key, summary) in input.iter() {
            if self.matches(key, statistic_value) {
                output.add_partition(key.clone(), *summary);
            }
        }
        output
    }

    /// Statistics whose current values this transformation reads.
    pub fn statistic_dependencies(&self) -> impl Iterator<Item = &StatisticId> {
        self.value_constraints
            .values()
            .filter_map(ValueConstraint::statistic)
    }

    /// Whether the output only ever grows as records arrive.
    ///
    /// A constraint that reads a statistic can shrink the output when that
    /// statistic changes.
    pub fn is_append_only(&self) -> bool {
        self.statistic_dependencies().next().is_none()
    }

    /// Cross-reference this transformation against the catalog and schemas.
    pub fn check(&self, catalog: &StatsCatalog, schemas: &EventSchemas, out: &mut Vec<Diagnostic>) {
        let subject = format!("transformation {}", self.id);
        let Some(kind) = catalog.check_source(&subject, &self.source, schemas, out) else {
            return;
        };

        for (field, constraint) in &self.value_constraints {
            let Some(declared) = schemas.field_type(&kind, field) else {
                out.push(Diagnostic::UnknownField {
                    subject: subject.clone(),
                    kind: kind.clone(),
                    field: field.clone(),
                });
                continue;
            };
            let literals: &[TaggedValue] = match constraint {
                ValueConstraint::Equals(value) => std::slice::from_ref(value),
                ValueConstraint::EqualsAny(values) => values,
                ValueConstraint::EqualsStatistic(statistic) => {
                    if catalog.statistic(statistic).is_none() {
                        out.push(Diagnostic::UnknownStatistic {
                            subject: subject.clone(),
                            statistic: statistic.clone(),
                        });
                    }
                    &[]
                }
                ValueConstraint::EqualsString(_) => &[],
            };
            if let Some(literal) = literals
                .iter()
                .map(TaggedValue::value_type)
                .find(|ty| *ty != ValueType::Void && ty != declared)
            {
                out.push(Diagnostic::FieldTypeMismatch {
                    subject: subject.clone(),
                    kind: kind.clone(),
                    field: field.clone(),
                    expected: literal,
                    actual: declared.clone(),
                });
            }
        }
    }
}
