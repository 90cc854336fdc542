//! The statistics catalog: every transformation, statistic, and score
//! descriptor, keyed by id.
//!
//! The catalog is immutable once built and shared (`Rc`) between the stats
//! tracker and anything that renders scores. [`StatsCatalog::check`] is
//! the semantic cross-reference pass run once after loading.
//!
//! # Design
//!
//! - Descriptors reference one another by id. References are resolved on
//!   use, so a dangling id degrades to a null value or an empty multiset.
//! - Cycles are reported by [`StatsCatalog::check`] but not prevented; every
//!   walk along references is bounded by the catalog size.

use std::collections::{BTreeMap, BTreeSet};

use chronicle_types::{
    EventKindId, EventSchemas, ScoreId, StatisticId, TransformationId,
};
use serde::{Deserialize, Serialize};

use crate::diagnostic::Diagnostic;
use crate::score::Score;
use crate::statistic::{Monotonicity, Statistic};
use crate::transformation::{EventSource, Transformation};

/// Registry of transformation, statistic, and score descriptors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "CatalogRepr", into = "CatalogRepr")]
pub struct StatsCatalog {
    transformations: BTreeMap<TransformationId, Transformation>,
    statistics: BTreeMap<StatisticId, Statistic>,
    scores: BTreeMap<ScoreId, Score>,
}

impl StatsCatalog {
    /// Create an empty catalog.
    pub const fn new() -> Self {
        Self {
            transformations: BTreeMap::new(),
            statistics: BTreeMap::new(),
            scores: BTreeMap::new(),
        }
    }

    /// Register a transformation, replacing any with the same id.
    pub fn add_transformation(&mut self, transformation: Transformation) {
        self.transformations
            .insert(transformation.id.clone(), transformation);
    }

    /// Register a statistic, replacing any with the same id.
    pub fn add_statistic(&mut self, statistic: Statistic) {
        self.statistics.insert(statistic.id.clone(), statistic);
    }

    /// Register a score, replacing any with the same id.
    pub fn add_score(&mut self, score: Score) {
        self.scores.insert(score.id.clone(), score);
    }

    /// Builder form of [`add_transformation`](Self::add_transformation).
    #[must_use]
    pub fn with_transformation(mut self, transformation: Transformation) -> Self {
        self.add_transformation(transformation);
        self
    }

    /// Builder form of [`add_statistic`](Self::add_statistic).
    #[must_use]
    pub fn with_statistic(mut self, statistic: Statistic) -> Self {
        self.add_statistic(statistic);
        self
    }

    /// Builder form of [`add_score`](Self::add_score).
    #[must_use]
    pub fn with_score(mut self, score: Score) -> Self {
        self.add_score(score);
        self
    }

    /// Look up a transformation.
    pub fn transformation(&self, id: &TransformationId) -> Option<&Transformation> {
        self.transformations.get(id)
    }

    /// Look up a statistic.
    pub fn statistic(&self, id: &StatisticId) -> Option<&Statistic> {
        self.statistics.get(id)
    }

    /// Look up a score.
    pub fn score(&self, id: &ScoreId) -> Option<&Score> {
        self.scores.get(id)
    }

    /// All transformations in id order.
    pub fn transformations(&self) -> impl Iterator<Item = &Transformation> {
        self.transformations.values()
    }

    /// All statistics in id order.
    pub fn statistics(&self) -> impl Iterator<Item = &Statistic> {
        self.statistics.values()
    }

    /// All scores in id order.
    pub fn scores(&self) -> impl Iterator<Item = &Score> {
        self.scores.values()
    }

    /// Total number of descriptors; bounds every reference walk.
    pub fn len(&self) -> usize {
        self.transformations
            .len()
            .saturating_add(self.statistics.len())
            .saturating_add(self.scores.len())
    }

    /// Whether the catalog holds no descriptors.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Follow a source through transformations to its event kind.
    ///
    /// Returns `None` for a dangling or cyclic chain.
    pub fn source_kind(&self, source: &EventSource) -> Option<EventKindId> {
        let mut current = source;
        for _ in 0..=self.transformations.len() {
            match current {
                EventSource::EventKind(kind) => return Some(kind.clone()),
                EventSource::Transformation(id) => current = &self.transformation(id)?.source,
            }
        }
        None
    }

    /// Whether a source's multiset only ever grows as records arrive.
    pub fn is_append_only(&self, source: &EventSource) -> bool {
        let mut current = source;
        for _ in 0..=self.transformations.len() {
            match current {
                EventSource::EventKind(_) => return true,
                EventSource::Transformation(id) => {
                    let Some(transformation) = self.transformation(id) else {
                        return false;
                    };
                    if !transformation.is_append_only() {
                        return false;
                    }
                    current = &transformation.source;
                }
            }
        }
        false
    }

    /// Monotonicity of a statistic; [`Monotonicity::Unknown`] if it does
    /// not resolve.
    pub fn monotonicity(&self, id: &StatisticId) -> Monotonicity {
        self.statistic(id)
            .map_or(Monotonicity::Unknown, |statistic| statistic.monotonicity(self))
    }

    /// Run the cross-reference pass over every descriptor.
    pub fn check(&self, schemas: &EventSchemas) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        for transformation in self.transformations() {
            transformation.check(self, schemas, &mut out);
        }
        for statistic in self.statistics() {
            statistic.check(self, schemas, &mut out);
        }
        for score in self.scores() {
            score.check(self, &mut out);
        }
        self.check_cycles(&mut out);
        out
    }

    /// Resolve `source` for `subject`'s check, reporting a dangling first
    /// link. A broken link further along is reported by the transformation
    /// that owns it.
    pub(crate) fn check_source(
        &self,
        subject: &str,
        source: &EventSource,
        schemas: &EventSchemas,
        out: &mut Vec<Diagnostic>,
    ) -> Option<EventKindId> {
        match source {
            EventSource::EventKind(kind) if !schemas.contains(kind) => {
                out.push(Diagnostic::UnknownEventKind {
                    subject: subject.to_owned(),
                    kind: kind.clone(),
                });
                None
            }
            EventSource::Transformation(id) if self.transformation(id).is_none() => {
                out.push(Diagnostic::UnknownTransformation {
                    subject: subject.to_owned(),
                    transformation: id.clone(),
                });
                None
            }
            _ => self
                .source_kind(source)
                .filter(|kind| schemas.contains(kind)),
        }
    }

    fn check_cycles(&self, out: &mut Vec<Diagnostic>) {
        let mut finished = BTreeSet::new();
        let mut path = Vec::new();
        let roots = self
            .transformations
            .keys()
            .map(|id| Dependency::Transformation(id.clone()))
            .chain(
                self.statistics
                    .keys()
                    .map(|id| Dependency::Statistic(id.clone())),
            );
        for root in roots {
            self.visit(root, &mut path, &mut finished, out);
        }
    }

    /// Depth-first walk; `path` holds the nodes on the current branch.
    fn visit(
        &self,
        node: Dependency,
        path: &mut Vec<Dependency>,
        finished: &mut BTreeSet<Dependency>,
        out: &mut Vec<Diagnostic>,
    ) {
        if finished.contains(&node) {
            return;
        }
        if let Some(start) = path.iter().position(|on_path| *on_path == node) {
            let mut cycle: Vec<String> = path
                .iter()
                .skip(start)
                .map(ToString::to_string)
                .collect();
            cycle.push(node.to_string());
            out.push(Diagnostic::DependencyCycle { path: cycle });
            return;
        }
        path.push(node.clone());
        for next in self.dependencies(&node) {
            self.visit(next, path, finished, out);
        }
        path.pop();
        finished.insert(node);
    }

    fn dependencies(&self, node: &Dependency) -> Vec<Dependency> {
        let upstream = |source: &EventSource| match source {
            EventSource::Transformation(id) if self.transformation(id).is_some() => {
                Some(Dependency::Transformation(id.clone()))
            }
            _ => None,
        };
        match node {
            Dependency::Transformation(id) => self
                .transformation(id)
                .map(|t| {
                    upstream(&t.source)
                        .into_iter()
                        .chain(
                            t.statistic_dependencies()
                                .filter(|s| self.statistic(s).is_some())
                                .map(|s| Dependency::Statistic(s.clone())),
                        )
                        .collect()
                })
                .unwrap_or_default(),
            Dependency::Statistic(id) => self
                .statistic(id)
                .and_then(|s| upstream(&s.source))
                .into_iter()
                .collect(),
        }
    }
}

/// A node of the descriptor reference graph.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Dependency {
    Transformation(TransformationId),
    Statistic(StatisticId),
}

impl core::fmt::Display for Dependency {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Transformation(id) => write!(f, "transformation {id}"),
            Self::Statistic(id) => write!(f, "statistic {id}"),
        }
    }
}

/// Loader form: plain lists of descriptors.
#[derive(Default, Serialize, Deserialize)]
struct CatalogRepr {
    #[serde(default)]
    transformations: Vec<Transformation>,
    #[serde(default)]
    statistics: Vec<Statistic>,
    #[serde(default)]
    scores: Vec<Score>,
}

impl From<CatalogRepr> for StatsCatalog {
    fn from(repr: CatalogRepr) -> Self {
        let mut catalog = Self::new();
        for transformation in repr.transformations {
            catalog.add_transformation(transformation);
        }
        for statistic in repr.statistics {
            catalog.add_statistic(statistic);
        }
        for score in repr.scores {
            catalog.add_score(score);
        }
        catalog
    }
}

impl From<StatsCatalog> for CatalogRepr {
    fn from(catalog: StatsCatalog) -> Self {
        Self {
            transformations: catalog.transformations.into_values().collect(),
            statistics: catalog.statistics.into_values().collect(),
            scores: catalog.scores.into_values().collect(),
        }
    }
}
