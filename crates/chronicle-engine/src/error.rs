//! Error types for the replay binary.
//!
//! [`EngineError`] wraps every failure mode of a replay run so `main` can
//! propagate it with `?`.

/// Top-level error for the replay binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: chronicle_core::ConfigError,
    },

    /// Descriptor catalog loading failed.
    #[error("catalog error: {source}")]
    Catalog {
        /// The underlying catalog error.
        #[from]
        source: chronicle_core::CatalogError,
    },

    /// Session construction or restore failed.
    #[error("session error: {source}")]
    Session {
        /// The underlying session error.
        #[from]
        source: chronicle_core::SessionError,
    },

    /// Reading the event log or writing the snapshot failed.
    #[error("I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// A snapshot could not be encoded or decoded.
    #[error("snapshot error: {source}")]
    Snapshot {
        /// The underlying JSON error.
        #[from]
        source: serde_json::Error,
    },

    /// A required environment variable is not set.
    #[error("missing environment variable: {name}")]
    MissingEnv {
        /// Name of the variable.
        name: &'static str,
    },
}
