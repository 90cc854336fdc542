//! The achievements tracker: every achievement of a session, pending or
//! decided.
//!
//! # Design
//!
//! - Each tracked achievement is either pending, with a live tracker, or
//!   decided, with an [`AchievementState`]. Never both. Decisions are
//!   terminal: nothing moves an achievement back to pending except
//!   [`clear`] and [`load`].
//! - In active mode every requirement statistic is watched through the
//!   stats tracker, under one [`WatchOwner`] per achievement tracker.
//!   Destroying the tracker drops the owner and with it every registration.
//! - In inactive mode values are read once and nothing is watched, so
//!   nothing is ever decided. Used to show progress without a game running.
//! - A decision is reported after every internal borrow is released, so
//!   completion callbacks may query or mutate the tracker freely.
//!
//! [`WatchOwner`]: chronicle_stats::WatchOwner
//! [`clear`]: AchievementsTracker::clear
//! [`load`]: AchievementsTracker::load

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::{Rc, Weak};

use chronicle_events::EventSubscriber;
use chronicle_stats::{StatWatcher, StatsTracker};
use chronicle_types::{AchievementId, ClockHandle, EventRecord, StatisticId, TaggedValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::achievement::{Achievement, AchievementCatalog, RequirementTarget};
use crate::state::{AchievementState, Completion};
use crate::text;
use crate::tracker::{AchievementTracker, RequirementValues, Side};

/// Called with the decided achievement and whether achievements are
/// enabled for the session.
pub type AchievementCallback = Rc<dyn Fn(&Achievement, bool)>;

/// Persisted form of an [`AchievementsTracker`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AchievementsSnapshot {
    /// Whether achievements were enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Achievements valid at game start that are still undecided.
    #[serde(default)]
    pub pending: BTreeSet<AchievementId>,
    /// Every decided achievement.
    #[serde(default)]
    pub status: BTreeMap<AchievementId, AchievementState>,
}

const fn default_enabled() -> bool {
    true
}

/// Mutable state, shared with the requirement watchers.
struct Inner {
    stats: Weak<StatsTracker>,
    clock: ClockHandle,
    active: bool,
    enabled: bool,
    initial_achievements: BTreeSet<AchievementId>,
    trackers: BTreeMap<AchievementId, AchievementTracker>,
    status: BTreeMap<AchievementId, AchievementState>,
    on_completed: Option<AchievementCallback>,
    on_failed: Option<AchievementCallback>,
}

impl Inner {
    /// Turn a decision into a stored state and a pending report.
    fn settle(&mut self, id: &AchievementId, completion: Completion) -> Option<Report> {
        let tracker = self.trackers.remove(id)?;
        let last_state_change = match (completion, tracker.achievement().time_constraint) {
            // A deadline missed between polls fails at the deadline.
            (Completion::Failed, Some(bound)) if tracker.time_is_expired(&self.clock.get()) => {
                bound.target(&self.clock.get())
            }
            _ => self.clock.now(),
        };
        self.status.insert(
            id.clone(),
            AchievementState {
                completion,
                last_state_change,
                final_values: tracker.current_values(),
            },
        );
        info!(achievement = %id, %completion, turn = %last_state_change, "Achievement decided");
        let callback = match completion {
            Completion::Completed => self.on_completed.clone(),
            Completion::Failed => self.on_failed.clone(),
            Completion::Pending => None,
        };
        Some(Report {
            achievement: tracker.achievement().clone(),
            enabled: self.enabled,
            callback,
            _tracker: tracker,
        })
    }
}

/// A decision waiting to be announced.
struct Report {
    achievement: Achievement,
    enabled: bool,
    callback: Option<AchievementCallback>,
    /// Dropped with the report, after the callback; its watchers go with it.
    _tracker: AchievementTracker,
}

impl Report {
    fn deliver(self) {
        if let Some(callback) = &self.callback {
            callback(&self.achievement, self.enabled);
        }
    }
}

/// Forwards one side of one requirement to its achievement tracker.
struct RequirementWatcher {
    inner: Weak<RefCell<Inner>>,
    achievement: AchievementId,
    index: usize,
    side: Side,
}

impl StatWatcher for RequirementWatcher {
    fn new_value(&self, statistic: &StatisticId, value: &TaggedValue, _stats: &StatsTracker) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let report = {
            let Ok(mut state) = inner.try_borrow_mut() else {
                warn!(
                    achievement = %self.achievement,
                    statistic = %statistic,
                    "Achievements tracker busy; requirement update dropped"
                );
                return;
            };
            let clock = state.clock.get();
            let Some(tracker) = state.trackers.get_mut(&self.achievement) else {
                return;
            };
            let decision = tracker.set_requirement(self.index, self.side, value, &clock);
            debug!(
                achievement = %self.achievement,
                statistic = %statistic,
                value = %value,
                "Requirement updated"
            );
            decision.and_then(|completion| state.settle(&self.achievement, completion))
        };
        if let Some(report) = report {
            report.deliver();
        }
    }
}

/// Tracks every achievement of a catalog against live statistics.
pub struct AchievementsTracker {
    catalog: Rc<AchievementCatalog>,
    inner: Rc<RefCell<Inner>>,
}

impl AchievementsTracker {
    /// Create a tracker. Nothing is tracked until a `game_start` record or
    /// [`load`](Self::load) fixes the set of valid achievements.
    ///
    /// `active` selects between watching statistics (a running game) and
    /// reading them once (progress display only).
    pub fn new(
        catalog: Rc<AchievementCatalog>,
        stats: &Rc<StatsTracker>,
        clock: ClockHandle,
        active: bool,
    ) -> Self {
        Self::with_callbacks(catalog, stats, clock, active, None, None)
    }

    /// Create a tracker with completion and failure callbacks.
    pub fn with_callbacks(
        catalog: Rc<AchievementCatalog>,
        stats: &Rc<StatsTracker>,
        clock: ClockHandle,
        active: bool,
        on_completed: Option<AchievementCallback>,
        on_failed: Option<AchievementCallback>,
    ) -> Self {
        let tracker = Self {
            catalog,
            inner: Rc::new(RefCell::new(Inner {
                stats: Rc::downgrade(stats),
                clock,
                active,
                enabled: true,
                initial_achievements: BTreeSet::new(),
                trackers: BTreeMap::new(),
                status: BTreeMap::new(),
                on_completed,
                on_failed,
            })),
        };
        info!(
            achievements = tracker.catalog.len(),
            active, "Achievements tracker ready"
        );
        tracker
    }

    /// The descriptor catalog.
    pub fn catalog(&self) -> &AchievementCatalog {
        &self.catalog
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Where an achievement stands. A pending achievement whose deadline
    /// has passed reads as failed even before the next poll.
    pub fn is_completed(&self, id: &AchievementId) -> Completion {
        let inner = self.inner.borrow();
        if let Some(state) = inner.status.get(id) {
            return state.completion;
        }
        let clock = inner.clock.get();
        match inner.trackers.get(id) {
            Some(tracker) if tracker.time_is_expired(&clock) => Completion::Failed,
            _ => Completion::Pending,
        }
    }

    /// Whether an achievement is hidden: it has not reached its own end
    /// state and some achievement named in its `hidden_by` has not reached
    /// that same end state. Unknown names count as unreached.
    pub fn is_hidden(&self, id: &AchievementId) -> bool {
        let Some(achievement) = self.catalog.get(id) else {
            return false;
        };
        let end_state = achievement.end_state();
        if self.is_completed(id) == end_state {
            return false;
        }
        achievement
            .hidden_by
            .iter()
            .any(|other| self.is_completed(other) != end_state)
    }

    /// The stored state of a decided achievement.
    pub fn state(&self, id: &AchievementId) -> Option<AchievementState> {
        self.inner.borrow().status.get(id).cloned()
    }

    /// Achievements that existed when the game started.
    pub fn initial_achievements(&self) -> BTreeSet<AchievementId> {
        self.inner.borrow().initial_achievements.clone()
    }

    /// Catalog achievements that were valid at game start, in id order.
    pub fn valid_achievements(&self) -> Vec<&Achievement> {
        let initial = self.initial_achievements();
        self.catalog
            .iter()
            .filter(|achievement| initial.contains(&achievement.id))
            .collect()
    }

    /// Number of live achievement trackers.
    pub fn pending_count(&self) -> usize {
        self.inner.borrow().trackers.len()
    }

    /// Whether achievements are enabled for this session.
    pub fn enabled(&self) -> bool {
        self.inner.borrow().enabled
    }

    /// Enable or disable achievements. Tracking continues either way; the
    /// flag is passed to callbacks.
    pub fn set_enabled(&self, enabled: bool) {
        self.inner.borrow_mut().enabled = enabled;
        info!(enabled, "Achievements enabled flag changed");
    }

    /// Plain-text progress for one achievement.
    pub fn ui_text_for(&self, achievement: &Achievement) -> String {
        let stats = self.stats();
        let catalog = stats.as_deref().map(StatsTracker::catalog);
        let inner = self.inner.borrow();
        let clock = inner.clock.get();
        if let Some(state) = inner.status.get(&achievement.id) {
            let targets: Vec<TaggedValue> = achievement
                .requirements
                .iter()
                .map(|requirement| match (&requirement.target, stats.as_deref()) {
                    (Some(RequirementTarget::Value(value)), _) => TaggedValue::Int(*value),
                    (Some(RequirementTarget::Statistic(_)), Some(stats)) => {
                        requirement.target_value(stats)
                    }
                    _ => TaggedValue::Null,
                })
                .collect();
            return text::state_text(achievement, state, &targets, &clock, catalog);
        }
        if let Some(tracker) = inner.trackers.get(&achievement.id) {
            return text::tracker_text(tracker, &clock, catalog);
        }
        let untracked = AchievementState {
            completion: Completion::Pending,
            last_state_change: clock.now(),
            final_values: Vec::new(),
        };
        text::state_text(achievement, &untracked, &[], &clock, catalog)
    }

    // -----------------------------------------------------------------------
    // Time
    // -----------------------------------------------------------------------

    /// Decide time-bounded achievements from the clock alone. Call once per
    /// turn.
    ///
    /// A missed deadline fails the achievement; a minimum duration that has
    /// been reached completes it when every requirement already holds.
    pub fn update_time(&self) {
        let reports: Vec<Report> = {
            let mut inner = self.inner.borrow_mut();
            if !inner.active {
                return;
            }
            let clock = inner.clock.get();
            let decisions: Vec<(AchievementId, Completion)> = inner
                .trackers
                .iter()
                .filter_map(|(id, tracker)| {
                    tracker
                        .poll_time(&clock)
                        .map(|completion| (id.clone(), completion))
                })
                .collect();
            decisions
                .into_iter()
                .filter_map(|(id, completion)| inner.settle(&id, completion))
                .collect()
        };
        for report in reports {
            report.deliver();
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Forget every decision and stop tracking, as for a new game.
    /// Tracking restarts on the next `game_start` record or [`load`].
    ///
    /// Clear before the stats tracker so its reset cannot decide anything.
    ///
    /// [`load`]: Self::load
    pub fn clear(&self) {
        let retired = {
            let mut inner = self.inner.borrow_mut();
            inner.status.clear();
            inner.initial_achievements.clear();
            std::mem::take(&mut inner.trackers)
        };
        drop(retired);
        info!("Achievements cleared");
    }

    /// Capture the state for persistence.
    pub fn snapshot(&self) -> AchievementsSnapshot {
        let inner = self.inner.borrow();
        AchievementsSnapshot {
            enabled: inner.enabled,
            pending: inner
                .initial_achievements
                .iter()
                .filter(|id| !inner.status.contains_key(*id))
                .cloned()
                .collect(),
            status: inner.status.clone(),
        }
    }

    /// Replace the state with a snapshot and restart tracking of every
    /// undecided achievement.
    ///
    /// Load the stats tracker first so restarted trackers read restored
    /// values.
    pub fn load(&self, snapshot: AchievementsSnapshot) {
        let decided = snapshot.status.len();
        let retired = {
            let mut inner = self.inner.borrow_mut();
            inner.enabled = snapshot.enabled;
            inner.initial_achievements = snapshot
                .pending
                .into_iter()
                .chain(snapshot.status.keys().cloned())
                .collect();
            inner.status = snapshot.status;
            std::mem::take(&mut inner.trackers)
        };
        drop(retired);
        self.start_trackers();
        info!(decided, "Achievements loaded");
    }

    fn stats(&self) -> Option<Rc<StatsTracker>> {
        self.inner.borrow().stats.upgrade()
    }

    /// Create trackers for every achievement valid at game start that is
    /// neither decided nor already tracked.
    fn start_trackers(&self) {
        let Some(stats) = self.stats() else {
            warn!("Stats tracker is gone; achievements are not tracked");
            return;
        };
        let (active, untracked): (bool, Vec<&Achievement>) = {
            let inner = self.inner.borrow();
            let untracked = self
                .catalog
                .iter()
                .filter(|a| {
                    inner.initial_achievements.contains(&a.id)
                        && !inner.status.contains_key(&a.id)
                        && !inner.trackers.contains_key(&a.id)
                })
                .collect();
            (inner.active, untracked)
        };
        // No borrow of `inner` while registering; watchers hold a weak
        // reference to it.
        let trackers: Vec<(AchievementId, AchievementTracker)> = untracked
            .into_iter()
            .map(|achievement| {
                let tracker = if active {
                    self.watch(achievement, &stats)
                } else {
                    Self::read(achievement, &stats)
                };
                (achievement.id.clone(), tracker)
            })
            .collect();
        let started = trackers.len();
        self.inner.borrow_mut().trackers.extend(trackers);
        debug!(started, active, "Achievement trackers started");
    }

    fn watch(&self, achievement: &Achievement, stats: &StatsTracker) -> AchievementTracker {
        let owner = stats.new_owner();
        let monotonicities = AchievementTracker::monotonicities(achievement, stats.catalog());
        let values = achievement
            .requirements
            .iter()
            .zip(monotonicities)
            .enumerate()
            .map(|(index, (requirement, monotonicity))| {
                let watcher = |side: Side| -> Rc<dyn StatWatcher> {
                    Rc::new(RequirementWatcher {
                        inner: Rc::downgrade(&self.inner),
                        achievement: achievement.id.clone(),
                        index,
                        side,
                    })
                };
                let current =
                    stats.add_watcher(&owner, &requirement.statistic, watcher(Side::Current));
                let target = match requirement.target_statistic() {
                    Some(statistic) => stats.add_watcher(&owner, statistic, watcher(Side::Target)),
                    None => requirement.target_value(stats),
                };
                RequirementValues::new(current, target, monotonicity)
            })
            .collect();
        AchievementTracker::new(achievement.clone(), values, Some(owner))
    }

    fn read(achievement: &Achievement, stats: &StatsTracker) -> AchievementTracker {
        let monotonicities = AchievementTracker::monotonicities(achievement, stats.catalog());
        let values = achievement
            .requirements
            .iter()
            .zip(monotonicities)
            .map(|(requirement, monotonicity)| {
                RequirementValues::new(
                    stats.value_of(&requirement.statistic),
                    requirement.target_value(stats),
                    monotonicity,
                )
            })
            .collect();
        AchievementTracker::new(achievement.clone(), values, None)
    }
}

impl EventSubscriber for AchievementsTracker {
    fn notify(&self, record: &EventRecord) {
        if !record.kind().is_game_start() {
            return;
        }
        let initial: BTreeSet<AchievementId> =
            self.catalog.iter().map(|a| a.id.clone()).collect();
        let count = initial.len();
        self.inner.borrow_mut().initial_achievements = initial;
        self.start_trackers();
        info!(achievements = count, "Initial achievements recorded");
    }

    fn on_unsubscribe(&self) {
        debug!("Achievements tracker unsubscribed from the bus");
    }
}

impl core::fmt::Debug for AchievementsTracker {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let counts = self
            .inner
            .try_borrow()
            .map(|inner| (inner.trackers.len(), inner.status.len()))
            .ok();
        f.debug_struct("AchievementsTracker")
            .field("achievements", &self.catalog.len())
            .field("pending_and_decided", &counts)
            .finish_non_exhaustive()
    }
}
