//! Shared type definitions for the Chronicle telemetry engine.
//!
//! This crate is the leaf of the workspace: every other crate speaks in
//! terms of the values, records, schemas, and turns defined here.
//!
//! # Modules
//!
//! - [`ids`] -- String identifiers for event kinds and descriptors
//! - [`value`] -- [`TaggedValue`], the type-erased, string-round-trippable value
//! - [`schema`] -- Event kind schemas and record validation
//! - [`record`] -- Immutable, timestamped [`EventRecord`]s
//! - [`time`] -- Turns, turn spans, and the game clock

pub mod ids;
pub mod record;
pub mod schema;
pub mod time;
pub mod value;

// Re-export all public types at crate root for convenience.
pub use ids::{AchievementId, EventKindId, ScoreId, StatisticId, TransformationId};
pub use record::{EventRecord, FieldMap};
pub use schema::{EventSchema, EventSchemas, RecordError};
pub use time::{ClockError, ClockHandle, GameClock, Turn, TurnSpan};
pub use value::{Point, TaggedValue, ValueError, ValueType};
