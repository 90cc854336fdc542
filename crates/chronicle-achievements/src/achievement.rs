//! Achievement descriptors: requirements, time bounds, and the catalog.
//!
//! An [`Achievement`] is a named goal made of one or more [`Requirement`]s
//! (a statistic compared against a literal or another statistic) and an
//! optional [`TimeBound`]. A conduct is the inverse: it never completes and
//! exists only to be failed.
//!
//! # Design
//!
//! - Whether an unsatisfied requirement can still recover is decided from
//!   the monotonicity of both sides of its comparison. A count that must
//!   stay at or below a literal fails for good the moment it passes it.
//! - [`AchievementCatalog::check`] is diagnostic only. An achievement that
//!   fails it still loads and simply behaves inertly.

use std::collections::BTreeMap;

use chronicle_stats::{Diagnostic, Monotonicity, StatsCatalog, StatsTracker};
use chronicle_types::{AchievementId, GameClock, StatisticId, TaggedValue, Turn, TurnSpan};
use serde::{Deserialize, Serialize};

use crate::state::Completion;

// ---------------------------------------------------------------------------
// Comparison
// ---------------------------------------------------------------------------

/// How a requirement's statistic (or the clock) is compared to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    /// Exactly the target.
    #[serde(rename = "==")]
    Equal,
    /// At most the target.
    #[serde(rename = "<=")]
    LessEqual,
    /// At least the target.
    #[serde(rename = ">=")]
    GreaterEqual,
    /// Any value; satisfied as soon as the statistic changes.
    #[serde(rename = "anything")]
    Anything,
}

impl Comparison {
    /// Evaluate `lhs <op> rhs`.
    pub fn holds<T: Ord>(self, lhs: &T, rhs: &T) -> bool {
        match self {
            Self::Equal => lhs == rhs,
            Self::LessEqual => lhs <= rhs,
            Self::GreaterEqual => lhs >= rhs,
            Self::Anything => true,
        }
    }

    /// Whether an unsatisfied comparison can never hold again, given how
    /// each side may still move.
    ///
    /// `lhs_below` says which side of the target the left-hand side sits on.
    const fn stuck(self, lhs_below: bool, lhs: Monotonicity, rhs: Monotonicity) -> bool {
        let rises = !lhs.can_increase() && !rhs.can_decrease();
        let falls = !lhs.can_decrease() && !rhs.can_increase();
        match self {
            Self::LessEqual => falls,
            Self::GreaterEqual => rises,
            Self::Equal => {
                if lhs_below {
                    rises
                } else {
                    falls
                }
            }
            Self::Anything => false,
        }
    }
}

impl core::fmt::Display for Comparison {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::Equal => "==",
            Self::LessEqual => "<=",
            Self::GreaterEqual => ">=",
            Self::Anything => "anything",
        })
    }
}

// ---------------------------------------------------------------------------
// Requirement
// ---------------------------------------------------------------------------

/// The right-hand side of a requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequirementTarget {
    /// A literal integer.
    Value(i64),
    /// The live value of another statistic.
    Statistic(StatisticId),
}

/// When a requirement line is shown to the player.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Always shown.
    #[default]
    Always,
    /// Shown once the requirement itself is satisfied.
    WhenRequirementCompleted,
    /// Shown once the whole achievement is completed.
    WhenAchievementCompleted,
    /// Never shown.
    Never,
}

/// One condition of an achievement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    /// The statistic compared.
    #[serde(rename = "event_statistic")]
    pub statistic: StatisticId,
    /// The comparison applied.
    pub is: Comparison,
    /// What the statistic is compared against; unused by `anything`.
    #[serde(default)]
    pub target: Option<RequirementTarget>,
    /// When the requirement is shown.
    #[serde(default)]
    pub visible: Visibility,
    /// Text for the requirement line; defaults to the statistic's description.
    #[serde(default)]
    pub description: Option<String>,
}

impl Requirement {
    /// A requirement comparing `statistic` against a literal.
    pub fn new(statistic: impl Into<StatisticId>, is: Comparison, target: i64) -> Self {
        Self {
            statistic: statistic.into(),
            is,
            target: Some(RequirementTarget::Value(target)),
            visible: Visibility::Always,
            description: None,
        }
    }

    /// A requirement comparing `statistic` against another statistic.
    pub fn versus(
        statistic: impl Into<StatisticId>,
        is: Comparison,
        target: impl Into<StatisticId>,
    ) -> Self {
        Self {
            target: Some(RequirementTarget::Statistic(target.into())),
            ..Self::new(statistic, is, 0)
        }
    }

    /// A requirement satisfied by any change of `statistic`.
    pub fn triggered_by(statistic: impl Into<StatisticId>) -> Self {
        Self {
            target: None,
            ..Self::new(statistic, Comparison::Anything, 0)
        }
    }

    /// Return the requirement with a visibility rule.
    #[must_use]
    pub const fn visible(mut self, visible: Visibility) -> Self {
        self.visible = visible;
        self
    }

    /// The statistic on the right-hand side, if any.
    pub const fn target_statistic(&self) -> Option<&StatisticId> {
        match &self.target {
            Some(RequirementTarget::Statistic(statistic)) => Some(statistic),
            Some(RequirementTarget::Value(_)) | None => None,
        }
    }

    /// Current value of the right-hand side.
    pub fn target_value(&self, stats: &StatsTracker) -> TaggedValue {
        match &self.target {
            Some(RequirementTarget::Value(value)) => TaggedValue::Int(*value),
            Some(RequirementTarget::Statistic(statistic)) => stats.value_of(statistic),
            None => TaggedValue::Null,
        }
    }

    /// Whether `current <op> target` holds.
    ///
    /// Only integer values compare; a null on either side is unsatisfied
    /// unless the comparison is `anything`.
    pub fn satisfied_by(&self, current: &TaggedValue, target: &TaggedValue) -> bool {
        if self.is == Comparison::Anything {
            return true;
        }
        match (current.as_int(), target.as_int()) {
            (Some(lhs), Some(rhs)) => self.is.holds(&lhs, &rhs),
            _ => false,
        }
    }

    /// Monotonicity of each side of the comparison.
    ///
    /// A literal target is constant; a missing one is unknown.
    pub fn monotonicity(&self, catalog: &StatsCatalog) -> (Monotonicity, Monotonicity) {
        let rhs = match &self.target {
            Some(RequirementTarget::Value(_)) => Monotonicity::Constant,
            Some(RequirementTarget::Statistic(statistic)) => catalog.monotonicity(statistic),
            None => Monotonicity::Unknown,
        };
        (catalog.monotonicity(&self.statistic), rhs)
    }

    /// Whether the requirement, unsatisfied with these values, can never be
    /// satisfied again.
    pub fn is_irrecoverable(
        &self,
        current: &TaggedValue,
        target: &TaggedValue,
        (lhs, rhs): (Monotonicity, Monotonicity),
    ) -> bool {
        match (current.as_int(), target.as_int()) {
            (Some(current), Some(target)) if !self.is.holds(&current, &target) => {
                self.is.stuck(current < target, lhs, rhs)
            }
            _ => false,
        }
    }

    /// Whether the requirement is bound to turn false at some point.
    ///
    /// Used by the check pass: an achievement whose conditions all become
    /// false is impossible or trivial, and a conduct needs every condition
    /// to be able to fail.
    pub fn becomes_false(&self, catalog: &StatsCatalog) -> bool {
        let (lhs, rhs) = self.monotonicity(catalog);
        let fixed = |m: Monotonicity| matches!(m, Monotonicity::Constant);
        match self.is {
            Comparison::LessEqual => lhs == Monotonicity::Increasing && !rhs.can_increase(),
            Comparison::GreaterEqual => lhs == Monotonicity::Decreasing && !rhs.can_decrease(),
            Comparison::Equal => {
                matches!(lhs, Monotonicity::Increasing | Monotonicity::Decreasing) && fixed(rhs)
            }
            Comparison::Anything => true,
        }
    }

    /// Whether the line is shown, given the achievement's and the
    /// requirement's state.
    pub const fn is_visible(&self, achievement: Completion, satisfied: bool) -> bool {
        match self.visible {
            Visibility::Always => true,
            Visibility::WhenRequirementCompleted => satisfied,
            Visibility::WhenAchievementCompleted => matches!(achievement, Completion::Completed),
            Visibility::Never => false,
        }
    }

    /// Text for the requirement line.
    pub fn describe(&self, catalog: Option<&StatsCatalog>) -> String {
        if let Some(description) = &self.description {
            return description.clone();
        }
        catalog
            .and_then(|catalog| catalog.statistic(&self.statistic))
            .map(|statistic| statistic.description.clone())
            .filter(|description| !description.is_empty())
            .unwrap_or_else(|| self.statistic.to_string())
    }

    fn check(&self, subject: &str, catalog: &StatsCatalog, out: &mut Vec<Diagnostic>) {
        let named = std::iter::once(&self.statistic).chain(self.target_statistic());
        for statistic in named {
            if catalog.statistic(statistic).is_none() {
                out.push(Diagnostic::UnknownStatistic {
                    subject: subject.to_owned(),
                    statistic: statistic.clone(),
                });
            }
        }
        if self.target.is_none() && self.is != Comparison::Anything {
            out.push(Diagnostic::Inconsistent {
                subject: subject.to_owned(),
                reason: format!("requirement on {} has no target", self.statistic),
            });
        }
    }
}

// ---------------------------------------------------------------------------
// Time bound
// ---------------------------------------------------------------------------

/// The moment a time bound counts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Epoch {
    /// The start of the world.
    Cataclysm,
    /// The start of the current game.
    GameStart,
}

impl Epoch {
    /// The epoch's turn on `clock`.
    pub const fn turn(self, clock: &GameClock) -> Turn {
        match self {
            Self::Cataclysm => clock.start_of_cataclysm(),
            Self::GameStart => clock.start_of_game(),
        }
    }

    /// Human-readable name.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Cataclysm => "time of cataclysm",
            Self::GameStart => "start of game",
        }
    }
}

/// A deadline (or minimum duration) attached to an achievement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBound {
    /// Where the period is counted from.
    pub since: Epoch,
    /// How the current turn compares to the deadline.
    pub is: Comparison,
    /// Length of the period.
    pub target: TurnSpan,
}

impl TimeBound {
    /// Create a time bound.
    pub const fn new(since: Epoch, is: Comparison, target: TurnSpan) -> Self {
        Self { since, is, target }
    }

    /// The deadline turn: epoch plus period.
    pub const fn target(&self, clock: &GameClock) -> Turn {
        self.since.turn(clock).saturating_add(self.target)
    }

    /// The bound's own verdict at the clock's current turn.
    pub const fn completed(&self, clock: &GameClock) -> Completion {
        let now = clock.now().get();
        let target = self.target(clock).get();
        match self.is {
            Comparison::LessEqual => {
                if now <= target {
                    Completion::Completed
                } else {
                    Completion::Failed
                }
            }
            Comparison::GreaterEqual => {
                if now >= target {
                    Completion::Completed
                } else {
                    Completion::Pending
                }
            }
            Comparison::Equal => {
                if now < target {
                    Completion::Pending
                } else if now == target {
                    Completion::Completed
                } else {
                    Completion::Failed
                }
            }
            Comparison::Anything => Completion::Completed,
        }
    }

    /// Whether the bound is bound to fail once enough time passes.
    pub const fn becomes_false(&self) -> bool {
        !matches!(self.is, Comparison::GreaterEqual)
    }
}

// ---------------------------------------------------------------------------
// Achievement
// ---------------------------------------------------------------------------

/// Whether a descriptor is an achievement or a conduct.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AchievementKind {
    /// Completes when every requirement holds.
    #[default]
    Achievement,
    /// Never completes; fails when a requirement is irrecoverably broken.
    Conduct,
}

/// A named goal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Achievement {
    /// Unique identifier.
    pub id: AchievementId,
    /// Display name.
    pub name: String,
    /// Longer description.
    #[serde(default)]
    pub description: String,
    /// Achievement or conduct.
    #[serde(rename = "type", default)]
    pub kind: AchievementKind,
    /// Achievements that must reach their end state before this one is shown.
    #[serde(default)]
    pub hidden_by: Vec<AchievementId>,
    /// Optional deadline.
    #[serde(default)]
    pub time_constraint: Option<TimeBound>,
    /// Conditions, all of which must hold.
    pub requirements: Vec<Requirement>,
}

impl Achievement {
    /// Create an achievement with no requirements yet.
    pub fn new(id: impl Into<AchievementId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            kind: AchievementKind::Achievement,
            hidden_by: Vec::new(),
            time_constraint: None,
            requirements: Vec::new(),
        }
    }

    /// Return the descriptor with one more requirement.
    #[must_use]
    pub fn require(mut self, requirement: Requirement) -> Self {
        self.requirements.push(requirement);
        self
    }

    /// Return the descriptor with a time bound.
    #[must_use]
    pub const fn within(mut self, bound: TimeBound) -> Self {
        self.time_constraint = Some(bound);
        self
    }

    /// Return the descriptor as a conduct.
    #[must_use]
    pub const fn conduct(mut self) -> Self {
        self.kind = AchievementKind::Conduct;
        self
    }

    /// Return the descriptor with a description.
    #[must_use]
    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Return the descriptor hidden until `other` reaches its end state.
    #[must_use]
    pub fn hidden_by(mut self, other: impl Into<AchievementId>) -> Self {
        self.hidden_by.push(other.into());
        self
    }

    /// Whether this is a conduct.
    pub const fn is_conduct(&self) -> bool {
        matches!(self.kind, AchievementKind::Conduct)
    }

    /// The completion that means "done" for this descriptor.
    pub const fn end_state(&self) -> Completion {
        if self.is_conduct() {
            Completion::Failed
        } else {
            Completion::Completed
        }
    }

    fn check(
        &self,
        achievements: &AchievementCatalog,
        stats: &StatsCatalog,
        out: &mut Vec<Diagnostic>,
    ) {
        let subject = format!("achievement {}", self.id);
        for other in &self.hidden_by {
            match achievements.get(other) {
                None => out.push(Diagnostic::UnknownAchievement {
                    subject: subject.clone(),
                    achievement: other.clone(),
                }),
                Some(other) if other.is_conduct() != self.is_conduct() => {
                    out.push(Diagnostic::Inconsistent {
                        subject: subject.clone(),
                        reason: format!(
                            "hidden by {} but only one of them is a conduct",
                            other.id
                        ),
                    });
                }
                Some(_) => {}
            }
        }

        let mut all_become_false = true;
        if let Some(bound) = &self.time_constraint {
            if bound.is == Comparison::Anything {
                out.push(Diagnostic::Inconsistent {
                    subject: subject.clone(),
                    reason: "time constraint compares with \"anything\"".to_owned(),
                });
            }
            all_become_false = bound.becomes_false();
        }
        for requirement in &self.requirements {
            requirement.check(&subject, stats, out);
            if !requirement.becomes_false(stats) {
                all_become_false = false;
            }
        }

        if all_become_false && !self.is_conduct() {
            out.push(Diagnostic::Inconsistent {
                subject,
                reason: "every requirement becomes false, so it is impossible or trivial"
                    .to_owned(),
            });
        } else if !all_become_false && self.is_conduct() {
            out.push(Diagnostic::Inconsistent {
                subject,
                reason: "a conduct needs every requirement to become false".to_owned(),
            });
        }
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Registry of achievement descriptors, keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Achievement>", into = "Vec<Achievement>")]
pub struct AchievementCatalog {
    achievements: BTreeMap<AchievementId, Achievement>,
}

impl AchievementCatalog {
    /// Create an empty catalog.
    pub const fn new() -> Self {
        Self {
            achievements: BTreeMap::new(),
        }
    }

    /// Register an achievement, replacing any with the same id.
    pub fn add(&mut self, achievement: Achievement) {
        self.achievements
            .insert(achievement.id.clone(), achievement);
    }

    /// Builder form of [`add`](Self::add).
    #[must_use]
    pub fn with(mut self, achievement: Achievement) -> Self {
        self.add(achievement);
        self
    }

    /// Look up an achievement.
    pub fn get(&self, id: &AchievementId) -> Option<&Achievement> {
        self.achievements.get(id)
    }

    /// All achievements in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Achievement> {
        self.achievements.values()
    }

    /// Number of achievements.
    pub fn len(&self) -> usize {
        self.achievements.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.achievements.is_empty()
    }

    /// Cross-reference every achievement against this catalog and the
    /// statistics catalog.
    pub fn check(&self, stats: &StatsCatalog) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        for achievement in self.iter() {
            achievement.check(self, stats, &mut out);
        }
        out
    }
}

impl From<Vec<Achievement>> for AchievementCatalog {
    fn from(achievements: Vec<Achievement>) -> Self {
        let mut catalog = Self::new();
        for achievement in achievements {
            catalog.add(achievement);
        }
        catalog
    }
}

impl From<AchievementCatalog> for Vec<Achievement> {
    fn from(catalog: AchievementCatalog) -> Self {
        catalog.achievements.into_values().collect()
    }
}
