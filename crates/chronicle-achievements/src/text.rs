//! Plain-text rendering of achievement progress.
//!
//! Output is line-oriented: the name, an indented description, an indented
//! status or time-bound line, then one indented line per visible
//! requirement. No colour or markup; the presentation layer owns that.

use chronicle_stats::StatsCatalog;
use chronicle_types::{GameClock, TaggedValue};

use crate::achievement::{Achievement, Comparison, Requirement, TimeBound};
use crate::state::{AchievementState, Completion};
use crate::tracker::AchievementTracker;

/// Text for a decided achievement.
///
/// `targets` holds the right-hand side of each requirement. Requirement
/// lines are omitted when the stored values no longer line up with the
/// descriptor's requirements.
pub(crate) fn state_text(
    achievement: &Achievement,
    state: &AchievementState,
    targets: &[TaggedValue],
    clock: &GameClock,
    catalog: Option<&StatsCatalog>,
) -> String {
    let mut text = header(achievement);
    match state.completion {
        Completion::Completed => text.push_str(&format!("  Completed {}\n", state.last_state_change)),
        Completion::Failed => text.push_str(&format!("  Failed {}\n", state.last_state_change)),
        Completion::Pending => {
            if let Some(bound) = &achievement.time_constraint {
                text.push_str(&format!("  {}\n", time_bound_text(bound, clock)));
            }
        }
    }
    if state.final_values.len() == achievement.requirements.len() {
        let lines = achievement
            .requirements
            .iter()
            .zip(&state.final_values)
            .enumerate()
            .map(|(index, (requirement, current))| {
                let target = targets.get(index).unwrap_or(&TaggedValue::Null);
                requirement_text(requirement, current, target, state.completion, catalog)
            });
        text.push_str(&format_requirements(lines));
    }
    text
}

/// Text for a pending achievement. A tracker whose deadline has passed
/// renders as failed at the deadline.
pub(crate) fn tracker_text(
    tracker: &AchievementTracker,
    clock: &GameClock,
    catalog: Option<&StatsCatalog>,
) -> String {
    let achievement = tracker.achievement();
    let targets: Vec<TaggedValue> = tracker.values().iter().map(|v| v.target.clone()).collect();
    if let Some(bound) = achievement
        .time_constraint
        .filter(|_| tracker.time_is_expired(clock))
    {
        let state = AchievementState {
            completion: Completion::Failed,
            last_state_change: bound.target(clock),
            final_values: tracker.current_values(),
        };
        return state_text(achievement, &state, &targets, clock, catalog);
    }

    let mut text = header(achievement);
    if let Some(bound) = &achievement.time_constraint {
        text.push_str(&format!("  {}\n", time_bound_text(bound, clock)));
    }
    let lines = achievement
        .requirements
        .iter()
        .zip(tracker.values())
        .map(|(requirement, values)| {
            requirement_text(
                requirement,
                &values.current,
                &values.target,
                Completion::Pending,
                catalog,
            )
        });
    text.push_str(&format_requirements(lines));
    text
}

fn header(achievement: &Achievement) -> String {
    let mut text = format!("{}\n", achievement.name);
    if !achievement.description.is_empty() {
        text.push_str(&format!("  {}\n", achievement.description));
    }
    text
}

fn time_bound_text(bound: &TimeBound, clock: &GameClock) -> String {
    let period = bound.target;
    let epoch = bound.since.label();
    let remaining = bound.target(clock).saturating_since(clock.now());
    match bound.completed(clock) {
        Completion::Pending => {
            format!("At least {period} from {epoch} ({remaining} remaining)")
        }
        Completion::Completed => match bound.is {
            Comparison::LessEqual => {
                format!("Within {period} of {epoch} ({remaining} remaining)")
            }
            Comparison::GreaterEqual => format!("At least {period} from {epoch} (passed)"),
            Comparison::Equal => format!("Exactly {period} from {epoch}"),
            Comparison::Anything => String::new(),
        },
        Completion::Failed => format!("Within {period} of {epoch} (passed)"),
    }
}

fn requirement_text(
    requirement: &Requirement,
    current: &TaggedValue,
    target: &TaggedValue,
    completion: Completion,
    catalog: Option<&StatsCatalog>,
) -> Option<String> {
    let satisfied = requirement.satisfied_by(current, target);
    if !requirement.is_visible(completion, satisfied) {
        return None;
    }
    let description = requirement.describe(catalog);
    Some(if requirement.is == Comparison::Anything {
        format!("Triggered by {description}")
    } else {
        format!("{}/{} {description}", shown(current), shown(target))
    })
}

fn shown(value: &TaggedValue) -> String {
    if value.is_null() {
        "-".to_owned()
    } else {
        value.to_repr()
    }
}

fn format_requirements(lines: impl Iterator<Item = Option<String>>) -> String {
    let mut text = String::new();
    let mut some_hidden = false;
    for line in lines {
        match line {
            Some(line) => {
                text.push_str("  ");
                text.push_str(&line);
                text.push('\n');
            }
            None => some_hidden = true,
        }
    }
    if some_hidden && !text.is_empty() {
        text.push_str("  (further requirements hidden)");
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::achievement::{Epoch, Visibility};
    use chronicle_stats::{EventSource, Statistic, StatisticKind};
    use chronicle_types::{Turn, TurnSpan};

    fn clock(now: u64) -> GameClock {
        GameClock::from_parts(Turn(now), Turn(0), Turn(0)).unwrap_or_default()
    }

    fn catalog() -> StatsCatalog {
        StatsCatalog::new().with_statistic(
            Statistic::new(
                "num_kills",
                EventSource::EventKind("kill".into()),
                StatisticKind::Count,
            )
            .described("monsters killed"),
        )
    }

    fn hunter() -> Achievement {
        Achievement::new("hunter", "Hunter")
            .described("Kill things")
            .require(Requirement::new("num_kills", Comparison::GreaterEqual, 10))
            .require(
                Requirement::new("num_kills", Comparison::GreaterEqual, 20)
                    .visible(Visibility::WhenRequirementCompleted),
            )
    }

    #[test]
    fn completed_state_lists_final_values() {
        let state = AchievementState {
            completion: Completion::Completed,
            last_state_change: Turn(7),
            final_values: vec![TaggedValue::Int(10), TaggedValue::Int(10)],
        };
        let targets = [TaggedValue::Int(10), TaggedValue::Int(20)];
        let text = state_text(&hunter(), &state, &targets, &clock(9), Some(&catalog()));
        assert_eq!(
            text,
            "Hunter\n  Kill things\n  Completed turn 7\n  10/10 monsters killed\n  (further requirements hidden)"
        );
    }

    #[test]
    fn mismatched_final_values_skip_requirement_lines() {
        let state = AchievementState {
            completion: Completion::Failed,
            last_state_change: Turn(3),
            final_values: vec![TaggedValue::Int(1)],
        };
        let text = state_text(&hunter(), &state, &[], &clock(9), None);
        assert_eq!(text, "Hunter\n  Kill things\n  Failed turn 3\n");
    }

    #[test]
    fn time_bound_lines() {
        let within = TimeBound::new(Epoch::GameStart, Comparison::LessEqual, TurnSpan::minutes(1));
        assert_eq!(
            time_bound_text(&within, &clock(20)),
            "Within 1 minute of start of game (40 seconds remaining)"
        );
        assert_eq!(
            time_bound_text(&within, &clock(61)),
            "Within 1 minute of start of game (passed)"
        );

        let survive = TimeBound::new(Epoch::Cataclysm, Comparison::GreaterEqual, TurnSpan::days(1));
        assert_eq!(
            time_bound_text(&survive, &clock(0)),
            "At least 1 day from time of cataclysm (1 day remaining)"
        );
    }

    #[test]
    fn triggered_requirements_and_null_values() {
        let requirement = Requirement::triggered_by("num_kills");
        assert_eq!(
            requirement_text(
                &requirement,
                &TaggedValue::Null,
                &TaggedValue::Null,
                Completion::Pending,
                Some(&catalog()),
            ),
            Some("Triggered by monsters killed".to_owned())
        );
        let requirement = Requirement::new("num_kills", Comparison::LessEqual, 0);
        assert_eq!(
            requirement_text(
                &requirement,
                &TaggedValue::Null,
                &TaggedValue::Int(0),
                Completion::Pending,
                None,
            ),
            Some("-/0 num_kills".to_owned())
        );
    }
}
