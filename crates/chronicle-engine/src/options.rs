//! Run options, read from the environment.
//!
//! | Variable | Meaning | Default |
//! |---|---|---|
//! | `CHRONICLE_CONFIG` | Session config (YAML) | `chronicle-config.yaml` |
//! | `CHRONICLE_CATALOG` | Descriptor catalog (JSON) | required |
//! | `CHRONICLE_EVENTS` | Event log (JSON lines) | standard input |
//! | `CHRONICLE_RESTORE` | Snapshot to resume from | none |
//! | `CHRONICLE_SNAPSHOT` | Where to write the final snapshot | none |

use std::path::PathBuf;

use crate::error::EngineError;

const DEFAULT_CONFIG_PATH: &str = "chronicle-config.yaml";

/// Paths a replay run reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Session config file; defaults are used when it does not exist.
    pub config: PathBuf,
    /// Descriptor catalog.
    pub catalog: PathBuf,
    /// Event log; `None` reads standard input.
    pub events: Option<PathBuf>,
    /// Snapshot to restore before replaying.
    pub restore: Option<PathBuf>,
    /// Where to write the snapshot taken after replaying.
    pub snapshot: Option<PathBuf>,
}

impl Options {
    /// Read options from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::MissingEnv`] if `CHRONICLE_CATALOG` is unset.
    pub fn from_env() -> Result<Self, EngineError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read options through `lookup`, which maps a variable name to its
    /// value.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::MissingEnv`] if `CHRONICLE_CATALOG` is unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, EngineError> {
        let path = |name: &str| lookup(name).filter(|v| !v.is_empty()).map(PathBuf::from);
        Ok(Self {
            config: path("CHRONICLE_CONFIG").unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH)),
            catalog: path("CHRONICLE_CATALOG").ok_or(EngineError::MissingEnv {
                name: "CHRONICLE_CATALOG",
            })?,
            events: path("CHRONICLE_EVENTS"),
            restore: path("CHRONICLE_RESTORE"),
            snapshot: path("CHRONICLE_SNAPSHOT"),
        })
    }
}
