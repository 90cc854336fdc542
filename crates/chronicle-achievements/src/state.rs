//! Terminal achievement states.

use chronicle_types::{TaggedValue, Turn};
use serde::{Deserialize, Serialize};

/// Where an achievement stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    /// Not yet decided.
    Pending,
    /// Attained.
    Completed,
    /// Lost for good.
    Failed,
}

impl core::fmt::Display for Completion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        })
    }
}

/// The record kept once an achievement is decided. Never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AchievementState {
    /// Completed or failed.
    pub completion: Completion,
    /// The turn the decision was made.
    pub last_state_change: Turn,
    /// Each requirement's value at that moment, in requirement order.
    pub final_values: Vec<TaggedValue>,
}
