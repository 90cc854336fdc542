//! Descriptor cross-reference diagnostics.
//!
//! Descriptors arrive already parsed; the only validation left is semantic:
//! does every name a descriptor mentions resolve, and do the references
//! form a DAG. Problems are reported as [`Diagnostic`] values, logged by the
//! caller, and never abort anything. The affected descriptor simply stays
//! inert at runtime.

use chronicle_types::{AchievementId, EventKindId, StatisticId, TransformationId, ValueType};

/// One semantic problem found by a `check` pass.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Diagnostic {
    /// A descriptor names an event kind with no registered schema.
    #[error("{subject} refers to unknown event kind {kind}")]
    UnknownEventKind {
        /// The descriptor at fault, e.g. `statistic num_kills`.
        subject: String,
        /// The unresolved kind.
        kind: EventKindId,
    },

    /// A descriptor names a field its event kind does not have.
    #[error("{subject} refers to field {field} of event kind {kind}, which has no such field")]
    UnknownField {
        /// The descriptor at fault.
        subject: String,
        /// The event kind that was searched.
        kind: EventKindId,
        /// The missing field.
        field: String,
    },

    /// A descriptor uses a field with an unsuitable type.
    #[error("{subject} expects field {field} of event kind {kind} to be {expected}, but it is {actual}")]
    FieldTypeMismatch {
        /// The descriptor at fault.
        subject: String,
        /// The event kind declaring the field.
        kind: EventKindId,
        /// The field in question.
        field: String,
        /// The type the descriptor needs.
        expected: ValueType,
        /// The type the schema declares.
        actual: ValueType,
    },

    /// A descriptor names a statistic that does not exist.
    #[error("{subject} refers to invalid statistic {statistic}")]
    UnknownStatistic {
        /// The descriptor at fault.
        subject: String,
        /// The unresolved statistic.
        statistic: StatisticId,
    },

    /// A descriptor names a transformation that does not exist.
    #[error("{subject} refers to invalid transformation {transformation}")]
    UnknownTransformation {
        /// The descriptor at fault.
        subject: String,
        /// The unresolved transformation.
        transformation: TransformationId,
    },

    /// A descriptor names an achievement that does not exist.
    #[error("{subject} refers to invalid achievement {achievement}")]
    UnknownAchievement {
        /// The descriptor at fault.
        subject: String,
        /// The unresolved achievement.
        achievement: AchievementId,
    },

    /// Statistic and transformation references loop back on themselves.
    #[error("dependency cycle: {}", path.join(" -> "))]
    DependencyCycle {
        /// The descriptors on the cycle, in reference order.
        path: Vec<String>,
    },

    /// A descriptor is well-formed but cannot behave sensibly.
    #[error("{subject}: {reason}")]
    Inconsistent {
        /// The descriptor at fault.
        subject: String,
        /// What is wrong with it.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_renders_its_path() {
        let diagnostic = Diagnostic::DependencyCycle {
            path: vec![
                "statistic a".to_owned(),
                "transformation b".to_owned(),
                "statistic a".to_owned(),
            ],
        };
        assert_eq!(
            diagnostic.to_string(),
            "dependency cycle: statistic a -> transformation b -> statistic a"
        );
    }
}
