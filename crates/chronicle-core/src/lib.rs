//! Session context for the Chronicle telemetry engine.
//!
//! A [`Session`] ties the event bus, the game clock, the stats tracker and
//! the achievements tracker together for one game. It is built from a
//! [`Catalog`] of descriptors and a [`SessionConfig`].
//!
//! # Modules
//!
//! - [`catalog`] -- The full descriptor catalog and its check pass
//! - [`config`] -- Configuration loading from YAML into typed structs
//! - [`session`] -- The session itself, its snapshot, and [`SessionError`]

pub mod catalog;
pub mod config;
pub mod session;

pub use catalog::{Catalog, CatalogError};
pub use config::{ConfigError, LogFormat, SessionConfig};
pub use session::{Session, SessionError, SessionSnapshot};
