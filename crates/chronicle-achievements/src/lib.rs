//! Achievements and conducts for the Chronicle telemetry engine.
//!
//! An [`AchievementsTracker`] watches the statistics every
//! [`Achievement`] depends on and flips each one to completed or failed at
//! the moment its outcome can no longer change. Decisions are terminal and
//! reported exactly once.
//!
//! # Modules
//!
//! - [`achievement`] -- Descriptors: requirements, time bounds, the catalog
//! - [`state`] -- Terminal states
//! - [`achievements`] -- The tracker of every achievement in a session

pub mod achievement;
pub mod achievements;
pub mod state;
pub(crate) mod text;
pub(crate) mod tracker;

pub use achievement::{
    Achievement, AchievementCatalog, AchievementKind, Comparison, Epoch, Requirement,
    RequirementTarget, TimeBound, Visibility,
};
pub use achievements::{AchievementCallback, AchievementsSnapshot, AchievementsTracker};
pub use state::{AchievementState, Completion};
