//! Event statistics: named scalar summaries of a multiset.
//!
//! A [`Statistic`] reduces the multiset of its [`EventSource`] to a single
//! [`TaggedValue`]. Each [`StatisticKind`] has a batch form
//! ([`Statistic::evaluate`]) and an incremental form that folds in one
//! record at a time. The propagation graph relies on the two agreeing after
//! every record.

use chronicle_types::{
    EventRecord, EventSchemas, FieldMap, StatisticId, TaggedValue, Turn, ValueType,
};
use serde::{Deserialize, Serialize};

use crate::catalog::StatsCatalog;
use crate::diagnostic::Diagnostic;
use crate::multiset::EventMultiset;
use crate::transformation::EventSource;

/// How a statistic's value reduces its source multiset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stat_type", rename_all = "snake_case")]
pub enum StatisticKind {
    /// Number of records.
    Count,
    /// Sum of an integer field over all records.
    Total {
        /// The summed field.
        field: String,
    },
    /// The field's value if exactly one distinct partition exists, else null.
    UniqueValue {
        /// The reported field.
        field: String,
    },
    /// Smallest value the field has taken.
    Minimum {
        /// The compared field.
        field: String,
    },
    /// Largest value the field has taken.
    Maximum {
        /// The compared field.
        field: String,
    },
    /// The field's value in the earliest-seen partition.
    FirstValue {
        /// The reported field.
        field: String,
    },
    /// The field's value in the latest-seen partition.
    LastValue {
        /// The reported field.
        field: String,
    },
}

impl StatisticKind {
    /// The field this kind reads, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Count => None,
            Self::Total { field }
            | Self::UniqueValue { field }
            | Self::Minimum { field }
            | Self::Maximum { field }
            | Self::FirstValue { field }
            | Self::LastValue { field } => Some(field),
        }
    }
}

/// The direction a statistic's value can move over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Monotonicity {
    /// Never changes.
    Constant,
    /// Never decreases.
    Increasing,
    /// Never increases.
    Decreasing,
    /// May move either way.
    Unknown,
}

impl Monotonicity {
    /// Whether the value may still grow.
    pub const fn can_increase(self) -> bool {
        matches!(self, Self::Increasing | Self::Unknown)
    }

    /// Whether the value may still shrink.
    pub const fn can_decrease(self) -> bool {
        matches!(self, Self::Decreasing | Self::Unknown)
    }
}

/// A named scalar summary of an event source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistic {
    /// Unique identifier.
    pub id: StatisticId,
    /// The multiset being summarized.
    pub source: EventSource,
    /// The reduction applied.
    #[serde(flatten)]
    pub kind: StatisticKind,
    /// Human-readable description, used by requirement text.
    #[serde(default)]
    pub description: String,
}

/// Live state of a watched statistic.
///
/// `anchor` remembers the `(turn, key)` of the partition currently reported
/// by [`StatisticKind::FirstValue`] and [`StatisticKind::LastValue`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct StatState {
    pub(crate) value: TaggedValue,
    anchor: Option<(Turn, FieldMap)>,
}

impl Statistic {
    /// Create a statistic with an empty description.
    pub fn new(id: impl Into<StatisticId>, source: EventSource, kind: StatisticKind) -> Self {
        Self {
            id: id.into(),
            source,
            kind,
            description: String::new(),
        }
    }

    /// Return the statistic with a description.
    #[must_use]
    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Compute the value from scratch over `events`.
    pub fn evaluate(&self, events: &EventMultiset) -> TaggedValue {
        self.initial_state(events).value
    }

    /// How this statistic's value can move, given where its records come from.
    pub fn monotonicity(&self, catalog: &StatsCatalog) -> Monotonicity {
        let append_only = catalog.is_append_only(&self.source);
        match (&self.kind, append_only) {
            (StatisticKind::Count | StatisticKind::Maximum { .. }, true) => {
                Monotonicity::Increasing
            }
            (StatisticKind::Minimum { .. }, true) => Monotonicity::Decreasing,
            _ => Monotonicity::Unknown,
        }
    }

    pub(crate) fn initial_state(&self, events: &EventMultiset) -> StatState {
        let none = FieldMap::new();
        let pick = |key: &FieldMap, field: &str| key.get(field).cloned().unwrap_or_default();
        match &self.kind {
            StatisticKind::Count => StatState {
                value: TaggedValue::Int(saturating_i64(events.count(&none))),
                anchor: None,
            },
            StatisticKind::Total { field } => StatState {
                value: TaggedValue::Int(events.total(field, &none)),
                anchor: None,
            },
            StatisticKind::UniqueValue { field } => {
                let mut partitions = events.iter();
                let value = match (partitions.next(), partitions.next()) {
                    (Some((key, _)), None) => pick(key, field),
                    _ => TaggedValue::Null,
                };
                StatState { value, anchor: None }
            }
            StatisticKind::Minimum { field } => StatState {
                value: events.minimum(field, &none).cloned().unwrap_or_default(),
                anchor: None,
            },
            StatisticKind::Maximum { field } => StatState {
                value: events.maximum(field, &none).cloned().unwrap_or_default(),
                anchor: None,
            },
            StatisticKind::FirstValue { field } => {
                let anchor = events
                    .first(&none)
                    .map(|(key, summary)| (summary.first_seen, key.clone()));
                anchored(anchor, field)
            }
            StatisticKind::LastValue { field } => {
                let anchor = events
                    .last(&none)
                    .map(|(key, summary)| (summary.last_seen, key.clone()));
                anchored(anchor, field)
            }
        }
    }

    /// Fold one record into `state`. `events` already contains the record.
    pub(crate) fn absorb(&self, state: &mut StatState, record: &EventRecord, events: &EventMultiset) {
        let fields = record.fields();
        match &self.kind {
            StatisticKind::Count => {
                let count = state.value.as_int().unwrap_or(0);
                state.value = TaggedValue::Int(count.saturating_add(1));
            }
            StatisticKind::Total { field } => {
                if let Some(amount) = record.get_int(field) {
                    let total = state.value.as_int().unwrap_or(0);
                    state.value = TaggedValue::Int(total.saturating_add(amount));
                }
            }
            StatisticKind::UniqueValue { field } => {
                state.value = if events.len() == 1 {
                    fields.get(field).cloned().unwrap_or_default()
                } else {
                    TaggedValue::Null
                };
            }
            StatisticKind::Minimum { field } => {
                if let Some(candidate) = record.get(field).filter(|v| !v.is_null()) {
                    if state.value.is_null() || *candidate < state.value {
                        state.value = candidate.clone();
                    }
                }
            }
            StatisticKind::Maximum { field } => {
                if let Some(candidate) = record.get(field).filter(|v| !v.is_null()) {
                    if state.value.is_null() || *candidate > state.value {
                        state.value = candidate.clone();
                    }
                }
            }
            StatisticKind::FirstValue { field } => {
                let Some(summary) = events.summary(fields) else {
                    return;
                };
                let earlier = state.anchor.as_ref().is_none_or(|(turn, key)| {
                    (summary.first_seen, fields) < (*turn, key)
                });
                if earlier {
                    *state = anchored(Some((summary.first_seen, fields.clone())), field);
                }
            }
            StatisticKind::LastValue { field } => {
                let Some(summary) = events.summary(fields) else {
                    return;
                };
                let later = state.anchor.as_ref().is_none_or(|(turn, key)| {
                    (summary.last_seen, fields) >= (*turn, key)
                });
                if later {
                    *state = anchored(Some((summary.last_seen, fields.clone())), field);
                }
            }
        }
    }

    /// Cross-reference this statistic against the catalog and schemas.
    pub fn check(&self, catalog: &StatsCatalog, schemas: &EventSchemas, out: &mut Vec<Diagnostic>) {
        let subject = format!("statistic {}", self.id);
        let Some(kind) = catalog.check_source(&subject, &self.source, schemas, out) else {
            return;
        };
        let Some(field) = self.kind.field() else {
            return;
        };
        match schemas.field_type(&kind, field) {
            None => out.push(Diagnostic::UnknownField {
                subject,
                kind,
                field: field.to_owned(),
            }),
            Some(declared)
                if matches!(self.kind, StatisticKind::Total { .. })
                    && *declared != ValueType::Int =>
            {
                out.push(Diagnostic::FieldTypeMismatch {
                    subject,
                    kind,
                    field: field.to_owned(),
                    expected: ValueType::Int,
                    actual: declared.clone(),
                });
            }
            Some(_) => {}
        }
    }
}

fn anchored(anchor: Option<(Turn, FieldMap)>, field: &str) -> StatState {
    let value = anchor
        .as_ref()
        .and_then(|(_, key)| key.get(field).cloned())
        .unwrap_or_default();
    StatState { value, anchor }
}

fn saturating_i64(count: u64) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}
