//! Serializable stats state: the persistence boundary of the tracker.

use std::collections::{BTreeMap, BTreeSet};

use chronicle_types::{EventKindId, ScoreId};
use serde::{Deserialize, Serialize};

use crate::multiset::EventMultiset;

/// Everything needed to rebuild a [`StatsTracker`](crate::StatsTracker)'s
/// query results.
///
/// Derived state (transformations, statistic values) is not stored; it is
/// recomputed from `data` on load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Raw multisets by event kind.
    #[serde(default)]
    pub data: BTreeMap<EventKindId, EventMultiset>,
    /// Scores valid when the game started.
    #[serde(default)]
    pub initial_scores: BTreeSet<ScoreId>,
}
