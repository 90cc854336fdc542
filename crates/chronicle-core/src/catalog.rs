//! The full descriptor catalog of a session.
//!
//! A host loads event kinds, transformations, statistics, scores and
//! achievements from one JSON document:
//!
//! ```json
//! {
//!   "event_kinds": [{ "kind": "kill", "fields": { "monster": "string" } }],
//!   "transformations": [],
//!   "statistics": [{ "id": "num_kills", "source": { "event_kind": "kill" }, "stat_type": "count" }],
//!   "scores": [],
//!   "achievements": []
//! }
//! ```
//!
//! Loading performs no semantic validation. [`Catalog::check`] is the
//! single cross-reference pass; its findings are logged and returned, and
//! the descriptors they concern simply behave inertly.

use std::path::Path;

use chronicle_achievements::AchievementCatalog;
use chronicle_stats::{Diagnostic, StatsCatalog};
use chronicle_types::{EventKindId, EventSchema, EventSchemas};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Errors that can occur when loading a catalog.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// Failed to read the catalog file from disk.
    #[error("failed to read catalog file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse JSON content.
    #[error("failed to parse catalog JSON: {source}")]
    Json {
        /// The underlying JSON parse error.
        #[from]
        source: serde_json::Error,
    },
}

/// Every descriptor a session runs on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "CatalogRepr", into = "CatalogRepr")]
pub struct Catalog {
    schemas: EventSchemas,
    stats: StatsCatalog,
    achievements: AchievementCatalog,
}

impl Catalog {
    /// Assemble a catalog. The `game_start` kind is registered if the
    /// schemas do not already declare it.
    pub fn new(
        mut schemas: EventSchemas,
        stats: StatsCatalog,
        achievements: AchievementCatalog,
    ) -> Self {
        let game_start = EventKindId::game_start();
        if !schemas.contains(&game_start) {
            schemas.register(EventSchema::new(game_start));
        }
        Self {
            schemas,
            stats,
            achievements,
        }
    }

    /// Load a catalog from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Io`] if the file cannot be read, or
    /// [`CatalogError::Json`] if the content is not a valid catalog.
    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let contents = std::fs::read_to_string(path)?;
        let catalog = Self::parse(&contents)?;
        info!(path = %path.display(), "Catalog loaded");
        Ok(catalog)
    }

    /// Parse a catalog from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Json`] if the string is not a valid catalog.
    pub fn parse(json: &str) -> Result<Self, CatalogError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Event kind schemas.
    pub const fn schemas(&self) -> &EventSchemas {
        &self.schemas
    }

    /// Transformations, statistics and scores.
    pub const fn stats(&self) -> &StatsCatalog {
        &self.stats
    }

    /// Achievements and conducts.
    pub const fn achievements(&self) -> &AchievementCatalog {
        &self.achievements
    }

    /// Split into the parts each tracker owns.
    pub fn into_parts(self) -> (EventSchemas, StatsCatalog, AchievementCatalog) {
        (self.schemas, self.stats, self.achievements)
    }

    /// Cross-reference every descriptor and log each finding.
    pub fn check(&self) -> Vec<Diagnostic> {
        let mut findings = self.stats.check(&self.schemas);
        findings.extend(self.achievements.check(&self.stats));
        for finding in &findings {
            warn!(%finding, "Catalog check finding");
        }
        info!(findings = findings.len(), "Catalog check complete");
        findings
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new(
            EventSchemas::new(),
            StatsCatalog::new(),
            AchievementCatalog::new(),
        )
    }
}

/// Loader form: the stats lists inline, schemas and achievements as lists.
#[derive(Serialize, Deserialize)]
struct CatalogRepr {
    #[serde(default)]
    event_kinds: Vec<EventSchema>,
    #[serde(flatten)]
    stats: StatsCatalog,
    #[serde(default)]
    achievements: AchievementCatalog,
}

impl From<CatalogRepr> for Catalog {
    fn from(repr: CatalogRepr) -> Self {
        let mut schemas = EventSchemas::new();
        for schema in repr.event_kinds {
            if let Some(previous) = schemas.register(schema) {
                warn!(kind = %previous.kind, "Event kind declared twice; keeping the later schema");
            }
        }
        Self::new(schemas, repr.stats, repr.achievements)
    }
}

impl From<Catalog> for CatalogRepr {
    fn from(catalog: Catalog) -> Self {
        Self {
            event_kinds: catalog.schemas.iter().cloned().collect(),
            stats: catalog.stats,
            achievements: catalog.achievements,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_types::StatisticId;

    const CATALOG: &str = r#"{
        "event_kinds": [
            { "kind": "kill", "fields": { "monster": "string", "damage": "int" } }
        ],
        "statistics": [
            { "id": "num_kills", "source": { "event_kind": "kill" }, "stat_type": "count" },
            { "id": "lost", "source": { "event_kind": "death" }, "stat_type": "count" }
        ],
        "achievements": [
            {
                "id": "hunter",
                "name": "Hunter",
                "requirements": [
                    { "event_statistic": "num_kills", "is": ">=", "target": 10 }
                ]
            }
        ]
    }"#;

    #[test]
    fn parses_every_section() {
        let catalog = Catalog::parse(CATALOG).unwrap_or_default();
        assert!(catalog.schemas().contains(&EventKindId::new("kill")));
        assert!(catalog.schemas().contains(&EventKindId::game_start()));
        assert!(catalog.stats().statistic(&StatisticId::new("num_kills")).is_some());
        assert_eq!(catalog.achievements().len(), 1);
    }

    #[test]
    fn check_reports_unknown_event_kinds() {
        let findings = Catalog::parse(CATALOG)
            .map(|catalog| catalog.check())
            .unwrap_or_default();
        assert!(findings.iter().any(|finding| matches!(
            finding,
            Diagnostic::UnknownEventKind { kind, .. } if kind.as_str() == "death"
        )));
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(matches!(
            Catalog::parse("{ \"statistics\": 3 }"),
            Err(CatalogError::Json { .. })
        ));
    }
}
