//! Event aggregation and derived statistics for the Chronicle telemetry
//! engine.
//!
//! The [`StatsTracker`] subscribes to the event bus and folds every record
//! into a per-kind [`EventMultiset`]. [`Transformation`]s filter those
//! multisets, [`Statistic`]s reduce them to single values, and [`Score`]s
//! pair a statistic with a message. Watchers registered through a
//! [`WatchOwner`] hear about every change as it happens.
//!
//! # Modules
//!
//! - [`multiset`] -- Partitioned multisets and criteria queries
//! - [`transformation`] -- Filters deriving one multiset from another
//! - [`statistic`] -- Scalar reductions and their monotonicity
//! - [`score`] -- Statistics with a presentation template
//! - [`catalog`] -- The descriptor registry and its check pass
//! - [`diagnostic`] -- Findings of the check pass
//! - [`watch`] -- Watcher traits and scoped ownership
//! - [`tracker`] -- The tracker itself
//! - [`snapshot`] -- Serializable tracker state

pub mod catalog;
pub mod diagnostic;
pub(crate) mod graph;
pub mod multiset;
pub mod score;
pub mod snapshot;
pub mod statistic;
pub mod tracker;
pub mod transformation;
pub mod watch;

pub use catalog::StatsCatalog;
pub use diagnostic::Diagnostic;
pub use multiset::{EventMultiset, EventSummary, matches_criteria};
pub use score::Score;
pub use snapshot::StatsSnapshot;
pub use statistic::{Monotonicity, Statistic, StatisticKind};
pub use tracker::StatsTracker;
pub use transformation::{EventSource, Transformation, ValueConstraint};
pub use watch::{MultisetWatcher, StatWatcher, WatchOwner};
