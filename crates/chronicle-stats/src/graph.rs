//! The derived-state graph behind live statistic and transformation values.
//!
//! Nodes are materialized lazily the first time a statistic or
//! transformation is watched, dependencies first. Index order is therefore
//! a topological order: every node's inputs and constraint statistics sit
//! at lower indices than the node itself.
//!
//! # Design
//!
//! - A record wave seeds `Record` marks on the nodes reading the record's
//!   kind and pops marks in index order. A node whose input was re-filtered,
//!   or whose constraint statistic changed value, gets a `Reset` mark and
//!   is recomputed in batch; otherwise it folds in the single record.
//! - The wave only updates state and collects [`Change`]s. Watchers are
//!   called by the tracker after the wave, with no borrow held.
//! - Unmaterialized sources and statistics are computed in batch on demand,
//!   bounded by the catalog size so a cyclic catalog cannot recurse forever.

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};

use chronicle_types::{EventKindId, EventRecord, StatisticId, TaggedValue, TransformationId};
use tracing::{debug, warn};

use crate::catalog::StatsCatalog;
use crate::multiset::EventMultiset;
use crate::statistic::{StatState, Statistic};
use crate::transformation::{EventSource, Transformation};

/// Position of a node; lower indices never depend on higher ones.
pub(crate) type NodeIndex = usize;

/// Raw multisets by event kind.
pub(crate) type KindData = BTreeMap<EventKindId, EventMultiset>;

static EMPTY: EventMultiset = EventMultiset::new();

/// Something watchers must hear about once the wave completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Change {
    /// The wave's record was added to this transformation.
    Added(EventSource),
    /// This transformation was re-filtered to a different multiset.
    Reset(EventSource, EventMultiset),
    /// This statistic took a new value.
    Value(StatisticId, TaggedValue),
}

#[derive(Debug)]
enum Input {
    Kind(EventKindId),
    Node(NodeIndex),
}

#[derive(Debug)]
enum NodeState {
    Transformation {
        descriptor: Transformation,
        events: EventMultiset,
    },
    Statistic {
        descriptor: Statistic,
        state: StatState,
    },
}

#[derive(Debug)]
struct Node {
    input: Input,
    state: NodeState,
    /// Nodes reading this node's multiset.
    input_dependents: Vec<NodeIndex>,
    /// Transformations constrained by this node's value.
    stat_dependents: Vec<NodeIndex>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Record,
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Unchanged,
    RecordAdded,
    Reset,
    ValueChanged,
}

/// Descriptor currently being materialized, for cycle detection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Visit {
    Transformation(TransformationId),
    Statistic(StatisticId),
}

/// Materialized statistic and transformation states.
#[derive(Debug, Default)]
pub(crate) struct DerivedGraph {
    nodes: Vec<Node>,
    transformations: BTreeMap<TransformationId, NodeIndex>,
    statistics: BTreeMap<StatisticId, NodeIndex>,
    kind_dependents: BTreeMap<EventKindId, Vec<NodeIndex>>,
}

impl DerivedGraph {
    #[cfg(test)]
    const fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Materialize a statistic and everything it reads.
    ///
    /// Returns `None` if the statistic does not resolve.
    pub(crate) fn statistic(
        &mut self,
        id: &StatisticId,
        catalog: &StatsCatalog,
        data: &KindData,
    ) -> Option<NodeIndex> {
        self.ensure_statistic(id, catalog, data, &mut BTreeSet::new())
    }

    /// Materialize a transformation and everything it reads.
    pub(crate) fn transformation(
        &mut self,
        id: &TransformationId,
        catalog: &StatsCatalog,
        data: &KindData,
    ) -> Option<NodeIndex> {
        self.ensure_transformation(id, catalog, data, &mut BTreeSet::new())
    }

    /// Live value of a materialized statistic node.
    pub(crate) fn value_at(&self, index: NodeIndex) -> TaggedValue {
        match self.nodes.get(index).map(|node| &node.state) {
            Some(NodeState::Statistic { state, .. }) => state.value.clone(),
            _ => TaggedValue::Null,
        }
    }

    /// Live multiset of a materialized transformation node.
    pub(crate) fn events_at(&self, index: NodeIndex) -> &EventMultiset {
        match self.nodes.get(index).map(|node| &node.state) {
            Some(NodeState::Transformation { events, .. }) => events,
            _ => &EMPTY,
        }
    }

    /// Current multiset of `source`, live if materialized, else in batch.
    pub(crate) fn events<'a>(
        &'a self,
        source: &EventSource,
        catalog: &StatsCatalog,
        data: &'a KindData,
    ) -> Cow<'a, EventMultiset> {
        self.batch_events(source, catalog, data, catalog.len().saturating_add(1))
    }

    /// Current value of a statistic, live if materialized, else in batch.
    pub(crate) fn value(
        &self,
        id: &StatisticId,
        catalog: &StatsCatalog,
        data: &KindData,
    ) -> TaggedValue {
        self.batch_value(id, catalog, data, catalog.len().saturating_add(1))
    }

    /// Propagate one record, already added to `data`, through the graph.
    pub(crate) fn record_added(&mut self, record: &EventRecord, data: &KindData) -> Vec<Change> {
        let marks = self
            .kind_dependents
            .get(record.kind())
            .into_iter()
            .flatten()
            .map(|&index| (index, Mark::Record))
            .collect();
        self.propagate(marks, Some(record), data)
    }

    /// Recompute every node after `data` was replaced wholesale.
    pub(crate) fn reset_all(&mut self, data: &KindData) -> Vec<Change> {
        let marks = self
            .kind_dependents
            .values()
            .flatten()
            .map(|&index| (index, Mark::Reset))
            .collect();
        self.propagate(marks, None, data)
    }

    fn propagate(
        &mut self,
        mut marks: BTreeMap<NodeIndex, Mark>,
        record: Option<&EventRecord>,
        data: &KindData,
    ) -> Vec<Change> {
        let mut changes = Vec::new();
        while let Some((index, mark)) = marks.pop_first() {
            let outcome = match (mark, record) {
                (Mark::Record, Some(record)) => self.absorb(index, record, data),
                _ => self.recompute(index, data),
            };
            let Some(node) = self.nodes.get(index) else {
                continue;
            };
            let (change, dependents, next) = match (&node.state, outcome) {
                (NodeState::Transformation { descriptor, .. }, Outcome::RecordAdded) => (
                    Change::Added(EventSource::Transformation(descriptor.id.clone())),
                    &node.input_dependents,
                    Mark::Record,
                ),
                (NodeState::Transformation { descriptor, events }, Outcome::Reset) => (
                    Change::Reset(
                        EventSource::Transformation(descriptor.id.clone()),
                        events.clone(),
                    ),
                    &node.input_dependents,
                    Mark::Reset,
                ),
                (NodeState::Statistic { descriptor, state }, Outcome::ValueChanged) => (
                    Change::Value(descriptor.id.clone(), state.value.clone()),
                    &node.stat_dependents,
                    Mark::Reset,
                ),
                _ => continue,
            };
            for &dependent in dependents {
                let mark = marks.entry(dependent).or_insert(next);
                if next == Mark::Reset {
                    *mark = Mark::Reset;
                }
            }
            changes.push(change);
        }
        changes
    }

    fn absorb(&mut self, index: NodeIndex, record: &EventRecord, data: &KindData) -> Outcome {
        let Some(node) = self.nodes.get(index) else {
            return Outcome::Unchanged;
        };
        match &node.state {
            NodeState::Transformation { descriptor, .. } => {
                let matched =
                    descriptor.matches(record.fields(), &|s: &StatisticId| self.statistic_value(s));
                if !matched {
                    return Outcome::Unchanged;
                }
                if let Some(NodeState::Transformation { events, .. }) =
                    self.nodes.get_mut(index).map(|node| &mut node.state)
                {
                    events.add(record);
                }
                Outcome::RecordAdded
            }
            NodeState::Statistic { descriptor, state } => {
                let mut next = state.clone();
                descriptor.absorb(&mut next, record, self.input_events(&node.input, data));
                let changed = next.value != state.value;
                self.replace_state(index, next);
                if changed {
                    Outcome::ValueChanged
                } else {
                    Outcome::Unchanged
                }
            }
        }
    }

    fn recompute(&mut self, index: NodeIndex, data: &KindData) -> Outcome {
        let Some(node) = self.nodes.get(index) else {
            return Outcome::Unchanged;
        };
        match &node.state {
            NodeState::Transformation { descriptor, events } => {
                let fresh = descriptor.filter(self.input_events(&node.input, data), &|s: &StatisticId| {
                    self.statistic_value(s)
                });
                if fresh == *events {
                    return Outcome::Unchanged;
                }
                if let Some(NodeState::Transformation { events, .. }) =
                    self.nodes.get_mut(index).map(|node| &mut node.state)
                {
                    *events = fresh;
                }
                Outcome::Reset
            }
            NodeState::Statistic { descriptor, state } => {
                let fresh = descriptor.initial_state(self.input_events(&node.input, data));
                let changed = fresh.value != state.value;
                self.replace_state(index, fresh);
                if changed {
                    Outcome::ValueChanged
                } else {
                    Outcome::Unchanged
                }
            }
        }
    }

    fn replace_state(&mut self, index: NodeIndex, next: StatState) {
        if let Some(NodeState::Statistic { state, .. }) =
            self.nodes.get_mut(index).map(|node| &mut node.state)
        {
            *state = next;
        }
    }

    fn statistic_value(&self, id: &StatisticId) -> TaggedValue {
        self.statistics
            .get(id)
            .map_or(TaggedValue::Null, |&index| self.value_at(index))
    }

    fn input_events<'a>(&'a self, input: &Input, data: &'a KindData) -> &'a EventMultiset {
        match input {
            Input::Kind(kind) => data.get(kind).unwrap_or(&EMPTY),
            Input::Node(index) => self.events_at(*index),
        }
    }

    fn ensure_source(
        &mut self,
        source: &EventSource,
        catalog: &StatsCatalog,
        data: &KindData,
        visiting: &mut BTreeSet<Visit>,
    ) -> Option<Input> {
        match source {
            EventSource::EventKind(kind) => Some(Input::Kind(kind.clone())),
            EventSource::Transformation(id) => self
                .ensure_transformation(id, catalog, data, visiting)
                .map(Input::Node),
        }
    }

    fn ensure_statistic(
        &mut self,
        id: &StatisticId,
        catalog: &StatsCatalog,
        data: &KindData,
        visiting: &mut BTreeSet<Visit>,
    ) -> Option<NodeIndex> {
        if let Some(&index) = self.statistics.get(id) {
            return Some(index);
        }
        let Some(descriptor) = catalog.statistic(id) else {
            warn!(statistic = %id, "Unknown statistic");
            return None;
        };
        let visit = Visit::Statistic(id.clone());
        if !visiting.insert(visit.clone()) {
            warn!(statistic = %id, "Statistic depends on itself");
            return None;
        }
        let input = self.ensure_source(&descriptor.source, catalog, data, visiting);
        visiting.remove(&visit);

        let input = input?;
        let state = descriptor.initial_state(self.input_events(&input, data));
        let index = self.push(Node {
            input,
            state: NodeState::Statistic {
                descriptor: descriptor.clone(),
                state,
            },
            input_dependents: Vec::new(),
            stat_dependents: Vec::new(),
        });
        self.statistics.insert(id.clone(), index);
        debug!(statistic = %id, index, "Statistic materialized");
        Some(index)
    }

    fn ensure_transformation(
        &mut self,
        id: &TransformationId,
        catalog: &StatsCatalog,
        data: &KindData,
        visiting: &mut BTreeSet<Visit>,
    ) -> Option<NodeIndex> {
        if let Some(&index) = self.transformations.get(id) {
            return Some(index);
        }
        let Some(descriptor) = catalog.transformation(id) else {
            warn!(transformation = %id, "Unknown transformation");
            return None;
        };
        let visit = Visit::Transformation(id.clone());
        if !visiting.insert(visit.clone()) {
            warn!(transformation = %id, "Transformation depends on itself");
            return None;
        }
        let input = self.ensure_source(&descriptor.source, catalog, data, visiting);
        let mut constraints = Vec::new();
        for statistic in descriptor.statistic_dependencies() {
            if let Some(index) = self.ensure_statistic(statistic, catalog, data, visiting) {
                constraints.push(index);
            }
        }
        visiting.remove(&visit);

        let input = input?;
        let events = descriptor.filter(self.input_events(&input, data), &|s: &StatisticId| {
            self.statistic_value(s)
        });
        let index = self.push(Node {
            input,
            state: NodeState::Transformation {
                descriptor: descriptor.clone(),
                events,
            },
            input_dependents: Vec::new(),
            stat_dependents: Vec::new(),
        });
        for constraint in constraints {
            if let Some(node) = self.nodes.get_mut(constraint) {
                node.stat_dependents.push(index);
            }
        }
        self.transformations.insert(id.clone(), index);
        debug!(transformation = %id, index, "Transformation materialized");
        Some(index)
    }

    fn push(&mut self, node: Node) -> NodeIndex {
        let index = self.nodes.len();
        match &node.input {
            Input::Kind(kind) => self
                .kind_dependents
                .entry(kind.clone())
                .or_default()
                .push(index),
            Input::Node(parent) => {
                if let Some(parent) = self.nodes.get_mut(*parent) {
                    parent.input_dependents.push(index);
                }
            }
        }
        self.nodes.push(node);
        index
    }

    fn batch_events<'a>(
        &'a self,
        source: &EventSource,
        catalog: &StatsCatalog,
        data: &'a KindData,
        depth: usize,
    ) -> Cow<'a, EventMultiset> {
        match source {
            EventSource::EventKind(kind) => Cow::Borrowed(data.get(kind).unwrap_or(&EMPTY)),
            EventSource::Transformation(id) => {
                if let Some(&index) = self.transformations.get(id) {
                    return Cow::Borrowed(self.events_at(index));
                }
                let (Some(descriptor), Some(depth)) =
                    (catalog.transformation(id), depth.checked_sub(1))
                else {
                    return Cow::Borrowed(&EMPTY);
                };
                let input = self.batch_events(&descriptor.source, catalog, data, depth);
                Cow::Owned(descriptor.filter(&input, &|s: &StatisticId| {
                    self.batch_value(s, catalog, data, depth)
                }))
            }
        }
    }

    fn batch_value(
        &self,
        id: &StatisticId,
        catalog: &StatsCatalog,
        data: &KindData,
        depth: usize,
    ) -> TaggedValue {
        if let Some(&index) = self.statistics.get(id) {
            return self.value_at(index);
        }
        let (Some(descriptor), Some(depth)) = (catalog.statistic(id), depth.checked_sub(1)) else {
            return TaggedValue::Null;
        };
        descriptor.evaluate(&self.batch_events(&descriptor.source, catalog, data, depth))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statistic::StatisticKind;
    use crate::transformation::ValueConstraint;
    use chronicle_types::Turn;

    fn kill(turn: u64, monster: &str) -> EventRecord {
        EventRecord::of("kill", Turn(turn)).with("monster", monster)
    }

    fn tame(turn: u64, monster: &str) -> EventRecord {
        EventRecord::of("tame", Turn(turn)).with("monster", monster)
    }

    /// `pet` is the unique tamed monster; `pet_kills` counts kills of it.
    fn catalog() -> StatsCatalog {
        StatsCatalog::new()
            .with_statistic(Statistic::new(
                "pet",
                EventSource::EventKind("tame".into()),
                StatisticKind::UniqueValue {
                    field: "monster".to_owned(),
                },
            ))
            .with_transformation(
                Transformation::new("pet_killed", EventSource::EventKind("kill".into()))
                    .constrain("monster", ValueConstraint::EqualsStatistic("pet".into())),
            )
            .with_statistic(Statistic::new(
                "pet_kills",
                EventSource::Transformation("pet_killed".into()),
                StatisticKind::Count,
            ))
    }

    fn add(data: &mut KindData, graph: &mut DerivedGraph, record: &EventRecord) -> Vec<Change> {
        data.entry(record.kind().clone()).or_default().add(record);
        graph.record_added(record, data)
    }

    #[test]
    fn dependencies_materialize_first() {
        let catalog = catalog();
        let data = KindData::new();
        let mut graph = DerivedGraph::default();
        let index = graph.statistic(&"pet_kills".into(), &catalog, &data);
        assert_eq!(index, Some(2));
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.statistics.get(&StatisticId::new("pet")), Some(&0));
    }

    #[test]
    fn constraint_change_resets_the_transformation() {
        let catalog = catalog();
        let mut data = KindData::new();
        let mut graph = DerivedGraph::default();
        let index = graph.statistic(&"pet_kills".into(), &catalog, &data);

        add(&mut data, &mut graph, &kill(1, "dog"));
        add(&mut data, &mut graph, &kill(2, "dog"));
        assert_eq!(index.map(|i| graph.value_at(i)), Some(TaggedValue::Int(0)));

        let changes = add(&mut data, &mut graph, &tame(3, "dog"));
        assert_eq!(
            changes.first(),
            Some(&Change::Value("pet".into(), TaggedValue::from("dog")))
        );
        assert!(matches!(changes.get(1), Some(Change::Reset(..))));
        assert_eq!(
            changes.last(),
            Some(&Change::Value("pet_kills".into(), TaggedValue::Int(2)))
        );

        let changes = add(&mut data, &mut graph, &kill(4, "dog"));
        assert_eq!(
            changes,
            vec![
                Change::Added(EventSource::Transformation("pet_killed".into())),
                Change::Value("pet_kills".into(), TaggedValue::Int(3)),
            ]
        );
    }

    #[test]
    fn live_values_match_batch_values() {
        let catalog = catalog();
        let mut data = KindData::new();
        let mut live = DerivedGraph::default();
        let index = live.statistic(&"pet_kills".into(), &catalog, &data);
        let records = [
            kill(1, "dog"),
            tame(2, "dog"),
            kill(3, "dog"),
            kill(4, "cat"),
            tame(5, "cat"),
            kill(6, "cat"),
        ];
        for record in &records {
            add(&mut data, &mut live, record);
            let batch = DerivedGraph::default().value(&"pet_kills".into(), &catalog, &data);
            assert_eq!(index.map(|i| live.value_at(i)), Some(batch));
        }
    }

    #[test]
    fn cyclic_descriptors_resolve_without_recursing_forever() {
        let catalog = StatsCatalog::new()
            .with_transformation(
                Transformation::new("loop", EventSource::EventKind("kill".into()))
                    .constrain("monster", ValueConstraint::EqualsStatistic("loop_count".into())),
            )
            .with_statistic(Statistic::new(
                "loop_count",
                EventSource::Transformation("loop".into()),
                StatisticKind::Count,
            ));
        let data = KindData::new();
        let mut graph = DerivedGraph::default();
        assert!(graph.statistic(&"loop_count".into(), &catalog, &data).is_some());
        assert_eq!(
            DerivedGraph::default().value(&"loop_count".into(), &catalog, &data),
            TaggedValue::Int(0)
        );
    }

    #[test]
    fn unknown_ids_do_not_materialize() {
        let data = KindData::new();
        let mut graph = DerivedGraph::default();
        assert_eq!(graph.statistic(&"nothing".into(), &catalog(), &data), None);
        assert_eq!(graph.len(), 0);
    }
}
