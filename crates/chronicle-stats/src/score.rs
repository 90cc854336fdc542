//! Scores: a statistic paired with a message template.

use chronicle_types::{ScoreId, StatisticId, TaggedValue};
use serde::{Deserialize, Serialize};

use crate::catalog::StatsCatalog;
use crate::diagnostic::Diagnostic;
use crate::tracker::StatsTracker;

/// A presentation-ready statistic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    /// Unique identifier.
    pub id: ScoreId,
    /// Message template; the first `{}` is replaced by the value.
    #[serde(rename = "description")]
    pub template: String,
    /// The statistic reported.
    pub statistic: StatisticId,
}

impl Score {
    /// Create a score.
    pub fn new(
        id: impl Into<ScoreId>,
        template: impl Into<String>,
        statistic: impl Into<StatisticId>,
    ) -> Self {
        Self {
            id: id.into(),
            template: template.into(),
            statistic: statistic.into(),
        }
    }

    /// The statistic's current value (null if it does not resolve).
    pub fn value(&self, stats: &StatsTracker) -> TaggedValue {
        stats.value_of(&self.statistic)
    }

    /// The template with the current value substituted in.
    pub fn description(&self, stats: &StatsTracker) -> String {
        render(&self.template, &self.value(stats))
    }

    /// Cross-reference this score against the catalog.
    pub fn check(&self, catalog: &StatsCatalog, out: &mut Vec<Diagnostic>) {
        if catalog.statistic(&self.statistic).is_none() {
            out.push(Diagnostic::UnknownStatistic {
                subject: format!("score {}", self.id),
                statistic: self.statistic.clone(),
            });
        }
    }
}

fn render(template: &str, value: &TaggedValue) -> String {
    template.replacen("{}", &value.to_repr(), 1)
}
