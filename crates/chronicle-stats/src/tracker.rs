//! The stats tracker: raw event multisets, live derived values, and
//! watcher dispatch.
//!
//! # Design
//!
//! - All methods take `&self`. State sits behind a `RefCell` that is only
//!   borrowed inside a method body, never across a watcher call. Watchers
//!   may therefore query the tracker, add watchers, or drop owners from
//!   inside their callbacks.
//! - Absorbing a record runs one wave through the derived-state graph
//!   and then dispatches: kind-level `event_added` first, then every
//!   derived change in topological order.
//! - Each dispatch iterates over a snapshot of the registrations and skips
//!   any watcher unregistered since the snapshot was taken.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use chronicle_events::EventSubscriber;
use chronicle_types::{
    EventKindId, EventRecord, FieldMap, ScoreId, StatisticId, TaggedValue, TransformationId,
};
use tracing::{debug, info, warn};

use crate::catalog::StatsCatalog;
use crate::graph::{Change, DerivedGraph, KindData};
use crate::multiset::{EventMultiset, EventSummary};
use crate::score::Score;
use crate::snapshot::StatsSnapshot;
use crate::transformation::EventSource;
use crate::watch::{MultisetWatcher, SharedRegistry, StatWatcher, WatchOwner, WatcherRegistry};

#[derive(Default)]
struct TrackerState {
    data: KindData,
    graph: DerivedGraph,
    initial_scores: BTreeSet<ScoreId>,
}

/// Aggregates every record into per-kind multisets and keeps watched
/// statistics and transformations up to date.
pub struct StatsTracker {
    catalog: Rc<StatsCatalog>,
    state: RefCell<TrackerState>,
    watchers: SharedRegistry,
}

impl StatsTracker {
    /// Create an empty tracker over `catalog`.
    pub fn new(catalog: Rc<StatsCatalog>) -> Self {
        Self {
            catalog,
            state: RefCell::new(TrackerState::default()),
            watchers: Rc::new(RefCell::new(WatcherRegistry::default())),
        }
    }

    /// The descriptor catalog.
    pub fn catalog(&self) -> &StatsCatalog {
        &self.catalog
    }

    /// Absorb one record and notify every affected watcher.
    pub fn absorb(&self, record: &EventRecord) {
        let changes = {
            let mut state = self.state.borrow_mut();
            let TrackerState {
                data,
                graph,
                initial_scores,
            } = &mut *state;
            data.entry(record.kind().clone()).or_default().add(record);
            if record.kind().is_game_start() {
                *initial_scores = self.catalog.scores().map(|s| s.id.clone()).collect();
                info!(scores = initial_scores.len(), "Valid scores recorded at game start");
            }
            graph.record_added(record, data)
        };
        self.notify_added(&EventSource::EventKind(record.kind().clone()), record);
        self.dispatch(changes, Some(record));
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Number of records of `kind` matching `criteria`.
    pub fn count(&self, kind: &EventKindId, criteria: &FieldMap) -> u64 {
        self.with_events(kind, |events| events.count(criteria))
    }

    /// Sum of the integer `field` over records of `kind` matching `criteria`.
    pub fn total(&self, kind: &EventKindId, field: &str, criteria: &FieldMap) -> i64 {
        self.with_events(kind, |events| events.total(field, criteria))
    }

    /// Smallest value of `field` across matching partitions; null if none.
    pub fn minimum(&self, kind: &EventKindId, field: &str, criteria: &FieldMap) -> TaggedValue {
        self.with_events(kind, |events| {
            events.minimum(field, criteria).cloned().unwrap_or_default()
        })
    }

    /// Largest value of `field` across matching partitions; null if none.
    pub fn maximum(&self, kind: &EventKindId, field: &str, criteria: &FieldMap) -> TaggedValue {
        self.with_events(kind, |events| {
            events.maximum(field, criteria).cloned().unwrap_or_default()
        })
    }

    /// The matching partition seen earliest.
    pub fn first(&self, kind: &EventKindId, criteria: &FieldMap) -> Option<(FieldMap, EventSummary)> {
        self.with_events(kind, |events| {
            events
                .first(criteria)
                .map(|(key, summary)| (key.clone(), *summary))
        })
    }

    /// The matching partition seen latest.
    pub fn last(&self, kind: &EventKindId, criteria: &FieldMap) -> Option<(FieldMap, EventSummary)> {
        self.with_events(kind, |events| {
            events
                .last(criteria)
                .map(|(key, summary)| (key.clone(), *summary))
        })
    }

    /// The whole multiset of `kind`.
    pub fn get_events(&self, kind: &EventKindId) -> EventMultiset {
        self.with_events(kind, Clone::clone)
    }

    /// The whole multiset of a transformation; empty if it does not resolve.
    pub fn get_transformed(&self, transformation: &TransformationId) -> EventMultiset {
        self.source_events(&EventSource::Transformation(transformation.clone()))
    }

    /// The current value of a statistic; null if it does not resolve.
    pub fn value_of(&self, statistic: &StatisticId) -> TaggedValue {
        let state = self.state.borrow();
        state.graph.value(statistic, &self.catalog, &state.data)
    }

    /// Scores valid when the game started.
    pub fn initial_scores(&self) -> BTreeSet<ScoreId> {
        self.state.borrow().initial_scores.clone()
    }

    /// Catalog scores that were valid at game start, in id order.
    pub fn valid_scores(&self) -> Vec<&Score> {
        let initial = self.initial_scores();
        self.catalog
            .scores()
            .filter(|score| initial.contains(&score.id))
            .collect()
    }

    fn with_events<R>(&self, kind: &EventKindId, f: impl FnOnce(&EventMultiset) -> R) -> R {
        let state = self.state.borrow();
        match state.data.get(kind) {
            Some(events) => f(events),
            None => f(&EventMultiset::new()),
        }
    }

    fn source_events(&self, source: &EventSource) -> EventMultiset {
        let state = self.state.borrow();
        state
            .graph
            .events(source, &self.catalog, &state.data)
            .into_owned()
    }

    // -----------------------------------------------------------------------
    // Watchers
    // -----------------------------------------------------------------------

    /// Issue a new scoped owner for watcher registrations.
    pub fn new_owner(&self) -> WatchOwner {
        WatchOwner::new(&self.watchers)
    }

    /// Watch a statistic; returns its current value.
    ///
    /// A statistic that does not resolve is not watched and reads as null.
    pub fn add_watcher(
        &self,
        owner: &WatchOwner,
        statistic: &StatisticId,
        watcher: Rc<dyn StatWatcher>,
    ) -> TaggedValue {
        if !self.owns(owner) {
            return TaggedValue::Null;
        }
        let value = {
            let mut state = self.state.borrow_mut();
            let TrackerState { data, graph, .. } = &mut *state;
            let Some(index) = graph.statistic(statistic, &self.catalog, data) else {
                warn!(statistic = %statistic, "Cannot watch unresolvable statistic");
                return TaggedValue::Null;
            };
            graph.value_at(index)
        };
        self.watchers
            .borrow_mut()
            .add_statistic(owner.id(), statistic.clone(), watcher);
        debug!(statistic = %statistic, "Statistic watcher added");
        value
    }

    /// Watch a multiset source; returns its current multiset.
    ///
    /// A transformation that does not resolve is not watched and reads as
    /// empty.
    pub fn add_multiset_watcher(
        &self,
        owner: &WatchOwner,
        source: &EventSource,
        watcher: Rc<dyn MultisetWatcher>,
    ) -> EventMultiset {
        if !self.owns(owner) {
            return EventMultiset::new();
        }
        let events = {
            let mut state = self.state.borrow_mut();
            let TrackerState { data, graph, .. } = &mut *state;
            match source {
                EventSource::EventKind(kind) => data.get(kind).cloned().unwrap_or_default(),
                EventSource::Transformation(id) => {
                    let Some(index) = graph.transformation(id, &self.catalog, data) else {
                        warn!(transformation = %id, "Cannot watch unresolvable transformation");
                        return EventMultiset::new();
                    };
                    graph.events_at(index).clone()
                }
            }
        };
        self.watchers
            .borrow_mut()
            .add_multiset(owner.id(), source.clone(), watcher);
        debug!(source = %source, "Multiset watcher added");
        events
    }

    /// Remove every watcher registered under `owner`.
    pub fn unwatch(&self, owner: &WatchOwner) {
        if self.owns(owner) {
            let removed = self.watchers.borrow_mut().remove_owner(owner.id());
            debug!(removed, "Watchers removed");
        }
    }

    /// Number of live watcher registrations.
    pub fn watcher_count(&self) -> usize {
        self.watchers.borrow().len()
    }

    fn owns(&self, owner: &WatchOwner) -> bool {
        let owns = owner.belongs_to(&self.watchers);
        if !owns {
            warn!(?owner, "Watch owner belongs to a different tracker");
        }
        owns
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Forget every record, as for a new game. Watchers stay registered and
    /// see the reset.
    pub fn clear(&self) {
        self.replace(StatsSnapshot::default());
        info!("Stats cleared");
    }

    /// Capture the raw state for persistence.
    pub fn snapshot(&self) -> StatsSnapshot {
        let state = self.state.borrow();
        StatsSnapshot {
            data: state.data.clone(),
            initial_scores: state.initial_scores.clone(),
        }
    }

    /// Replace the raw state with a snapshot and notify watchers.
    pub fn load(&self, snapshot: StatsSnapshot) {
        let kinds = snapshot.data.len();
        self.replace(snapshot);
        info!(kinds, "Stats loaded");
    }

    fn replace(&self, snapshot: StatsSnapshot) {
        let sources = self.watchers.borrow().watched_sources();
        let (resets, changes) = {
            let mut state = self.state.borrow_mut();
            state.data = snapshot.data;
            state.initial_scores = snapshot.initial_scores;
            let TrackerState { data, graph, .. } = &mut *state;
            let resets: Vec<(EventSource, EventMultiset)> = sources
                .into_iter()
                .filter_map(|source| match &source {
                    EventSource::EventKind(kind) => {
                        let events = data.get(kind).cloned().unwrap_or_default();
                        Some((source, events))
                    }
                    EventSource::Transformation(_) => None,
                })
                .collect();
            (resets, graph.reset_all(data))
        };
        for (source, events) in resets {
            self.notify_reset(&source, &events);
        }
        self.dispatch(changes, None);
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    fn dispatch(&self, changes: Vec<Change>, record: Option<&EventRecord>) {
        for change in changes {
            match change {
                Change::Added(source) => {
                    if let Some(record) = record {
                        self.notify_added(&source, record);
                    }
                }
                Change::Reset(source, events) => self.notify_reset(&source, &events),
                Change::Value(statistic, value) => self.notify_value(&statistic, &value),
            }
        }
    }

    fn notify_added(&self, source: &EventSource, record: &EventRecord) {
        let watchers = self.watchers.borrow().multiset_watchers(source);
        for (id, watcher) in watchers {
            let live = self.watchers.borrow().is_live(id);
            if live {
                watcher.event_added(source, record, self);
            }
        }
    }

    fn notify_reset(&self, source: &EventSource, events: &EventMultiset) {
        let watchers = self.watchers.borrow().multiset_watchers(source);
        for (id, watcher) in watchers {
            let live = self.watchers.borrow().is_live(id);
            if live {
                watcher.events_reset(source, events, self);
            }
        }
    }

    fn notify_value(&self, statistic: &StatisticId, value: &TaggedValue) {
        let watchers = self.watchers.borrow().statistic_watchers(statistic);
        for (id, watcher) in watchers {
            let live = self.watchers.borrow().is_live(id);
            if live {
                watcher.new_value(statistic, value, self);
            }
        }
    }
}

impl EventSubscriber for StatsTracker {
    fn notify(&self, record: &EventRecord) {
        self.absorb(record);
    }
}

impl core::fmt::Debug for StatsTracker {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let kinds = self.state.try_borrow().map(|s| s.data.len()).ok();
        f.debug_struct("StatsTracker")
            .field("kinds", &kinds)
            .field("watchers", &self.watcher_count())
            .finish_non_exhaustive()
    }
}
