//! Watcher traits, the watcher registry, and scoped watch ownership.
//!
//! A watcher is registered against one statistic or one multiset source
//! under a [`WatchOwner`]. The owner is a scoped handle: dropping it
//! unregisters every watcher it owns, so a destroyed owner can never leave
//! a dangling registration behind.
//!
//! # Design
//!
//! - The registry lives behind `Rc<RefCell<_>>`, shared by the tracker and
//!   (weakly) by every owner.
//! - The tracker never holds a registry borrow while calling a watcher. It
//!   snapshots the registrations, releases the borrow, and re-checks that
//!   each watcher is still registered right before calling it.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::{Rc, Weak};

use chronicle_types::{EventRecord, StatisticId, TaggedValue};
use tracing::{debug, warn};

use crate::multiset::EventMultiset;
use crate::tracker::StatsTracker;
use crate::transformation::EventSource;

/// Observer of a statistic's value.
pub trait StatWatcher {
    /// Called with the statistic's new value whenever it changes.
    ///
    /// A record that leaves the value as it was produces no call, even when
    /// the record feeds the statistic.
    fn new_value(&self, statistic: &StatisticId, value: &TaggedValue, stats: &StatsTracker);
}

/// Observer of a multiset (an event kind or a transformation).
pub trait MultisetWatcher {
    /// Called once for every record added to the multiset.
    fn event_added(&self, source: &EventSource, record: &EventRecord, stats: &StatsTracker);

    /// Called when the multiset is replaced wholesale.
    fn events_reset(&self, source: &EventSource, events: &EventMultiset, stats: &StatsTracker);
}

/// Identity of one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct WatchId(u64);

/// Identity of one [`WatchOwner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct OwnerId(u64);

struct Registration<W: ?Sized> {
    id: WatchId,
    owner: OwnerId,
    watcher: Rc<W>,
}

/// Registry shared between a tracker and its owners.
pub(crate) type SharedRegistry = Rc<RefCell<WatcherRegistry>>;

/// All live watcher registrations of one stats tracker.
#[derive(Default)]
pub(crate) struct WatcherRegistry {
    next_watch: u64,
    next_owner: u64,
    live: BTreeSet<WatchId>,
    statistics: BTreeMap<StatisticId, Vec<Registration<dyn StatWatcher>>>,
    multisets: BTreeMap<EventSource, Vec<Registration<dyn MultisetWatcher>>>,
}

impl WatcherRegistry {
    pub(crate) fn new_owner(&mut self) -> OwnerId {
        self.next_owner = self.next_owner.saturating_add(1);
        OwnerId(self.next_owner)
    }

    fn next_id(&mut self) -> WatchId {
        self.next_watch = self.next_watch.saturating_add(1);
        let id = WatchId(self.next_watch);
        self.live.insert(id);
        id
    }

    pub(crate) fn add_statistic(
        &mut self,
        owner: OwnerId,
        statistic: StatisticId,
        watcher: Rc<dyn StatWatcher>,
    ) -> WatchId {
        let id = self.next_id();
        self.statistics
            .entry(statistic)
            .or_default()
            .push(Registration { id, owner, watcher });
        id
    }

    pub(crate) fn add_multiset(
        &mut self,
        owner: OwnerId,
        source: EventSource,
        watcher: Rc<dyn MultisetWatcher>,
    ) -> WatchId {
        let id = self.next_id();
        self.multisets
            .entry(source)
            .or_default()
            .push(Registration { id, owner, watcher });
        id
    }

    /// Remove every registration of `owner`; returns how many were removed.
    pub(crate) fn remove_owner(&mut self, owner: OwnerId) -> usize {
        let before = self.live.len();
        let live = &mut self.live;
        let mut keep = |registration_owner: OwnerId, id: WatchId| {
            if registration_owner == owner {
                live.remove(&id);
                false
            } else {
                true
            }
        };
        for registrations in self.statistics.values_mut() {
            registrations.retain(|r| keep(r.owner, r.id));
        }
        for registrations in self.multisets.values_mut() {
            registrations.retain(|r| keep(r.owner, r.id));
        }
        self.statistics.retain(|_, registrations| !registrations.is_empty());
        self.multisets.retain(|_, registrations| !registrations.is_empty());
        before.saturating_sub(self.live.len())
    }

    pub(crate) fn is_live(&self, id: WatchId) -> bool {
        self.live.contains(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.live.len()
    }

    pub(crate) fn statistic_watchers(
        &self,
        statistic: &StatisticId,
    ) -> Vec<(WatchId, Rc<dyn StatWatcher>)> {
        self.statistics
            .get(statistic)
            .map(|registrations| {
                registrations
                    .iter()
                    .map(|r| (r.id, Rc::clone(&r.watcher)))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn multiset_watchers(
        &self,
        source: &EventSource,
    ) -> Vec<(WatchId, Rc<dyn MultisetWatcher>)> {
        self.multisets
            .get(source)
            .map(|registrations| {
                registrations
                    .iter()
                    .map(|r| (r.id, Rc::clone(&r.watcher)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Multiset sources with at least one watcher.
    pub(crate) fn watched_sources(&self) -> Vec<EventSource> {
        self.multisets.keys().cloned().collect()
    }
}

/// Scoped owner of watcher registrations.
///
/// Obtained from [`StatsTracker::new_owner`]. Every watcher added under
/// this owner is unregistered when the owner is dropped (or earlier, via
/// [`StatsTracker::unwatch`]).
pub struct WatchOwner {
    id: OwnerId,
    registry: Weak<RefCell<WatcherRegistry>>,
}

impl WatchOwner {
    pub(crate) fn new(registry: &SharedRegistry) -> Self {
        let id = registry.borrow_mut().new_owner();
        Self {
            id,
            registry: Rc::downgrade(registry),
        }
    }

    pub(crate) const fn id(&self) -> OwnerId {
        self.id
    }

    /// Whether this owner was issued by the tracker owning `registry`.
    pub(crate) fn belongs_to(&self, registry: &SharedRegistry) -> bool {
        std::ptr::eq(self.registry.as_ptr(), Rc::as_ptr(registry))
    }
}

impl core::fmt::Debug for WatchOwner {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WatchOwner").field("id", &self.id.0).finish()
    }
}

impl Drop for WatchOwner {
    fn drop(&mut self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        match registry.try_borrow_mut() {
            Ok(mut registry) => {
                let removed = registry.remove_owner(self.id);
                if removed > 0 {
                    debug!(owner = self.id.0, removed, "Watch owner dropped");
                }
            }
            Err(_) => warn!(owner = self.id.0, "Watcher registry busy; registrations leaked"),
        }
    }
}
