//! Live tracking of one pending achievement.
//!
//! An [`AchievementTracker`] holds both sides of every requirement and
//! splits the requirement indices into a satisfied and an unsatisfied set,
//! so "all satisfied" is a single emptiness check. It decides, but never
//! reports: the owning achievements tracker turns a decision into a stored
//! state and a callback.

use std::collections::BTreeSet;

use chronicle_stats::{Monotonicity, StatsCatalog, WatchOwner};
use chronicle_types::{GameClock, TaggedValue};

use crate::achievement::{Achievement, Comparison};
use crate::state::Completion;

/// Which side of a requirement a value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Side {
    /// The requirement's own statistic.
    Current,
    /// The statistic it is compared against.
    Target,
}

/// Live values of one requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RequirementValues {
    pub(crate) current: TaggedValue,
    pub(crate) target: TaggedValue,
    monotonicity: (Monotonicity, Monotonicity),
}

impl RequirementValues {
    pub(crate) const fn new(
        current: TaggedValue,
        target: TaggedValue,
        monotonicity: (Monotonicity, Monotonicity),
    ) -> Self {
        Self {
            current,
            target,
            monotonicity,
        }
    }
}

/// The live state of one pending achievement.
#[derive(Debug)]
pub(crate) struct AchievementTracker {
    achievement: Achievement,
    values: Vec<RequirementValues>,
    satisfied: BTreeSet<usize>,
    unsatisfied: BTreeSet<usize>,
    /// Scope of this tracker's statistic watchers; `None` when inactive.
    _watch: Option<WatchOwner>,
}

impl AchievementTracker {
    /// Sort the initial values into satisfied and unsatisfied. Never
    /// decides anything on its own.
    pub(crate) fn new(
        achievement: Achievement,
        values: Vec<RequirementValues>,
        watch: Option<WatchOwner>,
    ) -> Self {
        let mut tracker = Self {
            achievement,
            values,
            satisfied: BTreeSet::new(),
            unsatisfied: BTreeSet::new(),
            _watch: watch,
        };
        for index in 0..tracker.values.len() {
            let satisfied = tracker.is_satisfied(index);
            tracker.sort(index, satisfied);
        }
        tracker
    }

    /// Monotonicity of both sides of each requirement, resolved once.
    pub(crate) fn monotonicities(
        achievement: &Achievement,
        catalog: &StatsCatalog,
    ) -> Vec<(Monotonicity, Monotonicity)> {
        achievement
            .requirements
            .iter()
            .map(|requirement| requirement.monotonicity(catalog))
            .collect()
    }

    pub(crate) const fn achievement(&self) -> &Achievement {
        &self.achievement
    }

    pub(crate) fn values(&self) -> &[RequirementValues] {
        &self.values
    }

    /// Requirement values as reported in a terminal state.
    pub(crate) fn current_values(&self) -> Vec<TaggedValue> {
        self.values.iter().map(|v| v.current.clone()).collect()
    }

    /// Whether the time bound has already been missed.
    pub(crate) fn time_is_expired(&self, clock: &GameClock) -> bool {
        self.achievement
            .time_constraint
            .is_some_and(|bound| bound.completed(clock) == Completion::Failed)
    }

    /// Whether every requirement currently holds.
    pub(crate) fn all_satisfied(&self) -> bool {
        self.unsatisfied.is_empty()
    }

    /// Take a new value for one side of a requirement and decide.
    ///
    /// Values freeze once the time bound has expired, so a failed state
    /// reports what was true at the deadline.
    pub(crate) fn set_requirement(
        &mut self,
        index: usize,
        side: Side,
        value: &TaggedValue,
        clock: &GameClock,
    ) -> Option<Completion> {
        if !self.time_is_expired(clock) {
            if let Some(values) = self.values.get_mut(index) {
                match side {
                    Side::Current => values.current = value.clone(),
                    Side::Target => values.target = value.clone(),
                }
            }
        }
        let satisfied = self.is_satisfied(index);
        self.sort(index, satisfied);

        let time = self
            .achievement
            .time_constraint
            .map_or(Completion::Completed, |bound| bound.completed(clock));
        if self.all_satisfied() && time == Completion::Completed && !self.achievement.is_conduct() {
            return Some(Completion::Completed);
        }
        if time == Completion::Failed || (!satisfied && self.is_irrecoverable(index)) {
            return Some(Completion::Failed);
        }
        None
    }

    /// Decide from the clock alone, for per-turn polling.
    ///
    /// A missed deadline fails the achievement. A minimum-duration bound
    /// that has just been reached completes it if every requirement holds.
    pub(crate) fn poll_time(&self, clock: &GameClock) -> Option<Completion> {
        let bound = self.achievement.time_constraint?;
        match bound.completed(clock) {
            Completion::Failed => Some(Completion::Failed),
            Completion::Completed
                if bound.is != Comparison::LessEqual
                    && self.all_satisfied()
                    && !self.achievement.is_conduct() =>
            {
                Some(Completion::Completed)
            }
            _ => None,
        }
    }

    fn is_satisfied(&self, index: usize) -> bool {
        match (self.achievement.requirements.get(index), self.values.get(index)) {
            (Some(requirement), Some(values)) => {
                requirement.satisfied_by(&values.current, &values.target)
            }
            _ => false,
        }
    }

    fn is_irrecoverable(&self, index: usize) -> bool {
        match (self.achievement.requirements.get(index), self.values.get(index)) {
            (Some(requirement), Some(values)) => requirement.is_irrecoverable(
                &values.current,
                &values.target,
                values.monotonicity,
            ),
            _ => false,
        }
    }

    fn sort(&mut self, index: usize, satisfied: bool) {
        if satisfied {
            self.unsatisfied.remove(&index);
            self.satisfied.insert(index);
        } else {
            self.satisfied.remove(&index);
            self.unsatisfied.insert(index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::achievement::{Epoch, Requirement, TimeBound};
    use chronicle_types::{Turn, TurnSpan};

    const COUNT: (Monotonicity, Monotonicity) = (Monotonicity::Increasing, Monotonicity::Constant);

    fn clock(now: u64) -> GameClock {
        GameClock::from_parts(Turn(now), Turn(0), Turn(0)).unwrap_or_default()
    }

    fn values(current: i64, target: i64) -> RequirementValues {
        RequirementValues::new(TaggedValue::Int(current), TaggedValue::Int(target), COUNT)
    }

    fn hunter() -> AchievementTracker {
        let achievement = Achievement::new("hunter", "Hunter")
            .require(Requirement::new("num_kills", Comparison::GreaterEqual, 3));
        AchievementTracker::new(achievement, vec![values(0, 3)], None)
    }

    #[test]
    fn completes_when_the_last_requirement_holds() {
        let mut tracker = hunter();
        assert!(!tracker.all_satisfied());
        let now = clock(1);
        assert_eq!(
            tracker.set_requirement(0, Side::Current, &TaggedValue::Int(2), &now),
            None
        );
        assert_eq!(
            tracker.set_requirement(0, Side::Current, &TaggedValue::Int(3), &now),
            Some(Completion::Completed)
        );
    }

    #[test]
    fn construction_sorts_but_never_decides() {
        let achievement = Achievement::new("easy", "Easy")
            .require(Requirement::new("num_kills", Comparison::GreaterEqual, 0));
        let tracker = AchievementTracker::new(achievement, vec![values(0, 0)], None);
        assert!(tracker.all_satisfied());
        assert_eq!(tracker.poll_time(&clock(100)), None);
    }

    #[test]
    fn conduct_fails_once_broken_for_good() {
        let achievement = Achievement::new("pacifist", "Pacifist")
            .conduct()
            .require(Requirement::new("num_kills", Comparison::LessEqual, 0));
        let mut tracker = AchievementTracker::new(achievement, vec![values(0, 0)], None);
        assert_eq!(
            tracker.set_requirement(0, Side::Current, &TaggedValue::Int(1), &clock(5)),
            Some(Completion::Failed)
        );
    }

    #[test]
    fn values_freeze_after_the_deadline() {
        let achievement = Achievement::new("quick", "Quick")
            .within(TimeBound::new(Epoch::GameStart, Comparison::LessEqual, TurnSpan(1)))
            .require(Requirement::new("num_kills", Comparison::GreaterEqual, 3));
        let mut tracker = AchievementTracker::new(achievement, vec![values(1, 3)], None);
        assert!(tracker.time_is_expired(&clock(2)));
        assert_eq!(tracker.poll_time(&clock(2)), Some(Completion::Failed));
        assert_eq!(
            tracker.set_requirement(0, Side::Current, &TaggedValue::Int(5), &clock(2)),
            Some(Completion::Failed)
        );
        assert_eq!(tracker.current_values(), vec![TaggedValue::Int(1)]);
    }

    #[test]
    fn minimum_duration_completes_on_the_clock() {
        let achievement = Achievement::new("patient", "Patient")
            .within(TimeBound::new(Epoch::GameStart, Comparison::GreaterEqual, TurnSpan(10)))
            .require(Requirement::new("num_kills", Comparison::GreaterEqual, 1));
        let mut tracker = AchievementTracker::new(achievement, vec![values(0, 1)], None);
        assert_eq!(
            tracker.set_requirement(0, Side::Current, &TaggedValue::Int(1), &clock(3)),
            None
        );
        assert_eq!(tracker.poll_time(&clock(9)), None);
        assert_eq!(tracker.poll_time(&clock(10)), Some(Completion::Completed));
    }

    #[test]
    fn target_side_updates_move_the_goalposts() {
        let achievement = Achievement::new("rival", "Rival").require(Requirement::versus(
            "num_kills",
            Comparison::GreaterEqual,
            "rival_kills",
        ));
        let unknown = (Monotonicity::Increasing, Monotonicity::Unknown);
        let mut tracker = AchievementTracker::new(
            achievement,
            vec![RequirementValues::new(
                TaggedValue::Int(2),
                TaggedValue::Int(4),
                unknown,
            )],
            None,
        );
        assert_eq!(
            tracker.set_requirement(0, Side::Target, &TaggedValue::Int(2), &clock(1)),
            Some(Completion::Completed)
        );
    }
}
