//! The session: one game's bus, clock and trackers.
//!
//! # Design
//!
//! - A [`Session`] owns everything; there are no globals. Subsystems that
//!   emit or query are handed the session (or the piece they need).
//! - The stats tracker subscribes to the bus before the achievements
//!   tracker, so every record is absorbed before achievements look at it.
//! - Teardown runs achievements first: the achievements tracker drops its
//!   watchers while the stats tracker is still alive.

use std::rc::Rc;

use chronicle_achievements::{
    AchievementCallback, AchievementCatalog, AchievementsSnapshot, AchievementsTracker,
};
use chronicle_events::{BusError, EventBus, EventSubscriber};
use chronicle_stats::{StatsSnapshot, StatsTracker};
use chronicle_types::{
    ClockError, ClockHandle, EventKindId, EventRecord, FieldMap, GameClock, ScoreId, Turn,
    TurnSpan,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::catalog::Catalog;
use crate::config::SessionConfig;

/// Errors that can occur while building or driving a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Invalid clock configuration or turn.
    #[error("clock error: {0}")]
    Clock(#[from] ClockError),

    /// A tracker could not be subscribed to the bus.
    #[error("event bus error: {0}")]
    Bus(#[from] BusError),
}

/// Everything needed to resume a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// The clock at the moment of the snapshot.
    pub clock: GameClock,
    /// Raw stats state.
    pub stats: StatsSnapshot,
    /// Achievement decisions.
    pub achievements: AchievementsSnapshot,
}

/// One game session.
pub struct Session {
    // Declared first so it drops first.
    achievements: Rc<AchievementsTracker>,
    stats: Rc<StatsTracker>,
    bus: EventBus,
    clock: ClockHandle,
}

impl Session {
    /// Build a session without achievement callbacks.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Clock`] if the configured epochs are
    /// inconsistent.
    pub fn new(catalog: Catalog, config: &SessionConfig) -> Result<Self, SessionError> {
        Self::with_callbacks(catalog, config, None, None)
    }

    /// Build a session whose achievements tracker reports decisions
    /// through the given callbacks.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Clock`] if the configured epochs are
    /// inconsistent.
    pub fn with_callbacks(
        catalog: Catalog,
        config: &SessionConfig,
        on_completed: Option<AchievementCallback>,
        on_failed: Option<AchievementCallback>,
    ) -> Result<Self, SessionError> {
        let clock = ClockHandle::new(GameClock::new(
            Turn(config.clock.start_of_cataclysm),
            Turn(config.clock.start_of_game),
        )?);
        if config.diagnostics.check_on_start {
            catalog.check();
        }

        let (schemas, stats_catalog, achievement_catalog) = catalog.into_parts();
        let bus = EventBus::new(Rc::new(schemas));
        let stats = Rc::new(StatsTracker::new(Rc::new(stats_catalog)));
        let achievements = Rc::new(AchievementsTracker::with_callbacks(
            Rc::new(achievement_catalog),
            &stats,
            clock.clone(),
            config.achievements.active,
            on_completed,
            on_failed,
        ));
        achievements.set_enabled(config.achievements.enabled);

        let stats_listener: Rc<dyn EventSubscriber> = stats.clone();
        bus.subscribe(&stats_listener)?;
        let achievements_listener: Rc<dyn EventSubscriber> = achievements.clone();
        bus.subscribe(&achievements_listener)?;

        info!(
            now = %clock.now(),
            active = config.achievements.active,
            "Session started"
        );
        Ok(Self {
            achievements,
            stats,
            bus,
            clock,
        })
    }

    /// The event bus.
    pub const fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// The shared game clock.
    pub const fn clock(&self) -> &ClockHandle {
        &self.clock
    }

    /// The stats tracker.
    pub fn stats(&self) -> &StatsTracker {
        &self.stats
    }

    /// The achievements tracker.
    pub fn achievements(&self) -> &AchievementsTracker {
        &self.achievements
    }

    /// The achievement descriptors.
    pub fn achievement_catalog(&self) -> &AchievementCatalog {
        self.achievements.catalog()
    }

    // -----------------------------------------------------------------------
    // Producing events
    // -----------------------------------------------------------------------

    /// Send a record stamped with the current turn.
    pub fn emit(&self, kind: impl Into<EventKindId>, fields: FieldMap) {
        let record = EventRecord::new(kind.into(), self.clock.now(), fields);
        self.bus.send(record);
    }

    /// Send a record as is.
    pub fn send(&self, record: EventRecord) {
        self.bus.send(record);
    }

    /// Start a new game: forget all stats and decisions, then announce
    /// `game_start` at the current turn.
    pub fn start_game(&self) {
        self.clear();
        self.emit(EventKindId::game_start(), FieldMap::new());
    }

    // -----------------------------------------------------------------------
    // Time
    // -----------------------------------------------------------------------

    /// Advance the clock and poll time-bounded achievements.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Clock`] if the turn counter would overflow.
    pub fn advance(&self, span: TurnSpan) -> Result<Turn, SessionError> {
        let now = self.clock.advance(span)?;
        self.achievements.update_time();
        Ok(now)
    }

    /// Move the clock to `turn` and poll time-bounded achievements.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Clock`] if `turn` precedes the start of the
    /// game.
    pub fn set_turn(&self, turn: Turn) -> Result<(), SessionError> {
        self.clock.set_now(turn)?;
        self.achievements.update_time();
        Ok(())
    }

    /// Poll time-bounded achievements without moving the clock.
    pub fn update_time(&self) {
        self.achievements.update_time();
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Description of every score valid at game start, in id order.
    pub fn score_descriptions(&self) -> Vec<(ScoreId, String)> {
        self.stats
            .valid_scores()
            .into_iter()
            .map(|score| (score.id.clone(), score.description(&self.stats)))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Forget every record and decision. Achievements are tracked again
    /// from the next `game_start`.
    pub fn clear(&self) {
        self.achievements.clear();
        self.stats.clear();
        debug!("Session cleared");
    }

    /// Capture the session for persistence.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            clock: self.clock.get(),
            stats: self.stats.snapshot(),
            achievements: self.achievements.snapshot(),
        }
    }

    /// Restore a snapshot. Stats are restored before achievements so
    /// restarted achievement trackers read the restored values.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Clock`] if the snapshot's clock is
    /// inconsistent; nothing is restored in that case.
    pub fn restore(&self, snapshot: SessionSnapshot) -> Result<(), SessionError> {
        let clock = snapshot.clock;
        let clock = GameClock::from_parts(
            clock.now(),
            clock.start_of_game(),
            clock.start_of_cataclysm(),
        )?;
        self.clock.set(clock);
        self.achievements.clear();
        self.stats.load(snapshot.stats);
        self.achievements.load(snapshot.achievements);
        info!(now = %clock.now(), "Session restored");
        Ok(())
    }
}

impl core::fmt::Debug for Session {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Session")
            .field("now", &self.clock.now())
            .field("stats", &self.stats)
            .field("achievements", &self.achievements)
            .finish_non_exhaustive()
    }
}
