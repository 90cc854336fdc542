//! Turns, turn spans, and the game clock.
//!
//! The host simulation advances in discrete turns (one turn is one second
//! of game time). Every [`EventRecord`](crate::EventRecord) is stamped with
//! the turn it happened on, and achievement time bounds are measured from
//! one of two epochs held by the [`GameClock`]: the cataclysm and the start
//! of the current game.
//!
//! # Design Principles
//!
//! - All turn arithmetic is checked or saturating (no silent overflow).
//! - The clock is a plain `Copy` value. Components that need to read the
//!   current turn share it through a [`ClockHandle`] instead of a global.

use std::cell::Cell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

/// Turns per minute of game time.
const TURNS_PER_MINUTE: u64 = 60;
/// Turns per hour of game time.
const TURNS_PER_HOUR: u64 = 60 * TURNS_PER_MINUTE;
/// Turns per day of game time.
const TURNS_PER_DAY: u64 = 24 * TURNS_PER_HOUR;

/// Errors that can occur during clock operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClockError {
    /// Turn counter would overflow.
    #[error("turn counter overflow: cannot advance beyond u64::MAX")]
    TurnOverflow,

    /// The epochs are inconsistent (e.g. the game starts before the cataclysm).
    #[error("invalid clock configuration: {reason}")]
    InvalidConfig {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Turn and TurnSpan
// ---------------------------------------------------------------------------

/// A point in game time, counted in turns.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Turn(pub u64);

impl Turn {
    /// Turn zero.
    pub const ZERO: Self = Self(0);

    /// Return the raw turn number.
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Add a span, returning `None` on overflow.
    pub const fn checked_add(self, span: TurnSpan) -> Option<Self> {
        match self.0.checked_add(span.0) {
            Some(t) => Some(Self(t)),
            None => None,
        }
    }

    /// Add a span, clamping at the largest representable turn.
    pub const fn saturating_add(self, span: TurnSpan) -> Self {
        Self(self.0.saturating_add(span.0))
    }

    /// Return the span from `earlier` to `self`, or zero if `earlier` is later.
    pub const fn saturating_since(self, earlier: Self) -> TurnSpan {
        TurnSpan(self.0.saturating_sub(earlier.0))
    }
}

impl core::fmt::Display for Turn {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "turn {}", self.0)
    }
}

/// A length of game time, counted in turns.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TurnSpan(pub u64);

impl TurnSpan {
    /// A span of `n` turns.
    pub const fn turns(n: u64) -> Self {
        Self(n)
    }

    /// A span of `n` minutes.
    pub const fn minutes(n: u64) -> Self {
        Self(n.saturating_mul(TURNS_PER_MINUTE))
    }

    /// A span of `n` hours.
    pub const fn hours(n: u64) -> Self {
        Self(n.saturating_mul(TURNS_PER_HOUR))
    }

    /// A span of `n` days.
    pub const fn days(n: u64) -> Self {
        Self(n.saturating_mul(TURNS_PER_DAY))
    }

    /// Return the span length in turns.
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// Renders in the largest unit that divides the span exactly,
/// e.g. `1 minute`, `30 seconds`, `2 days`.
impl core::fmt::Display for TurnSpan {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let units = [
            (TURNS_PER_DAY, "day"),
            (TURNS_PER_HOUR, "hour"),
            (TURNS_PER_MINUTE, "minute"),
        ];
        let (amount, unit) = units
            .iter()
            .find(|(size, _)| self.0 != 0 && self.0.checked_rem(*size) == Some(0))
            .map_or((self.0, "second"), |(size, unit)| {
                (self.0.checked_div(*size).unwrap_or(0), *unit)
            });
        let plural = if amount == 1 { "" } else { "s" };
        write!(f, "{amount} {unit}{plural}")
    }
}

// ---------------------------------------------------------------------------
// Game clock
// ---------------------------------------------------------------------------

/// The game clock: the current turn plus the two epochs time bounds use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameClock {
    /// Current turn.
    now: Turn,
    /// Turn on which the current game started.
    start_of_game: Turn,
    /// Turn of the cataclysm (never after the start of the game).
    start_of_cataclysm: Turn,
}

impl GameClock {
    /// Create a clock positioned at the start of the game.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidConfig`] if the game starts before the
    /// cataclysm.
    pub fn new(start_of_cataclysm: Turn, start_of_game: Turn) -> Result<Self, ClockError> {
        Self::from_parts(start_of_game, start_of_game, start_of_cataclysm)
    }

    /// Create a clock from explicit parameters (useful for testing and
    /// state restoration).
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidConfig`] if the game starts before the
    /// cataclysm or `now` precedes the start of the game.
    pub fn from_parts(
        now: Turn,
        start_of_game: Turn,
        start_of_cataclysm: Turn,
    ) -> Result<Self, ClockError> {
        if start_of_game < start_of_cataclysm {
            return Err(ClockError::InvalidConfig {
                reason: format!(
                    "start of game ({start_of_game}) precedes the cataclysm ({start_of_cataclysm})"
                ),
            });
        }
        if now < start_of_game {
            return Err(ClockError::InvalidConfig {
                reason: format!("current turn ({now}) precedes the start of game ({start_of_game})"),
            });
        }
        Ok(Self {
            now,
            start_of_game,
            start_of_cataclysm,
        })
    }

    /// Advance the clock by `span`. Returns the new turn.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::TurnOverflow`] if the turn counter would exceed
    /// `u64::MAX`.
    pub fn advance(&mut self, span: TurnSpan) -> Result<Turn, ClockError> {
        self.now = self.now.checked_add(span).ok_or(ClockError::TurnOverflow)?;
        Ok(self.now)
    }

    /// Move the clock to `turn`, which may not precede the start of game.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidConfig`] if `turn` is before the start of
    /// the game.
    pub fn set_now(&mut self, turn: Turn) -> Result<(), ClockError> {
        *self = Self::from_parts(turn, self.start_of_game, self.start_of_cataclysm)?;
        Ok(())
    }

    /// Return the current turn.
    pub const fn now(&self) -> Turn {
        self.now
    }

    /// Return the turn on which the current game started.
    pub const fn start_of_game(&self) -> Turn {
        self.start_of_game
    }

    /// Return the turn of the cataclysm.
    pub const fn start_of_cataclysm(&self) -> Turn {
        self.start_of_cataclysm
    }

    /// Return the time elapsed since the start of the game.
    pub const fn since_game_start(&self) -> TurnSpan {
        self.now.saturating_since(self.start_of_game)
    }
}

impl Default for GameClock {
    fn default() -> Self {
        Self {
            now: Turn::ZERO,
            start_of_game: Turn::ZERO,
            start_of_cataclysm: Turn::ZERO,
        }
    }
}

/// A shared, single-threaded handle to the session's [`GameClock`].
///
/// Cloning the handle shares the clock; every holder observes advances made
/// through any other holder.
#[derive(Debug, Clone, Default)]
pub struct ClockHandle(Rc<Cell<GameClock>>);

impl ClockHandle {
    /// Wrap a clock in a new shared handle.
    pub fn new(clock: GameClock) -> Self {
        Self(Rc::new(Cell::new(clock)))
    }

    /// Return a copy of the current clock state.
    pub fn get(&self) -> GameClock {
        self.0.get()
    }

    /// Replace the clock state.
    pub fn set(&self, clock: GameClock) {
        self.0.set(clock);
    }

    /// Return the current turn.
    pub fn now(&self) -> Turn {
        self.0.get().now()
    }

    /// Advance the shared clock by `span`.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::TurnOverflow`] on overflow; the clock is left
    /// unchanged.
    pub fn advance(&self, span: TurnSpan) -> Result<Turn, ClockError> {
        let mut clock = self.0.get();
        let now = clock.advance(span)?;
        self.0.set(clock);
        Ok(now)
    }

    /// Move the shared clock to `turn`.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidConfig`] if `turn` precedes the start of
    /// the game; the clock is left unchanged.
    pub fn set_now(&self, turn: Turn) -> Result<(), ClockError> {
        let mut clock = self.0.get();
        clock.set_now(turn)?;
        self.0.set(clock);
        Ok(())
    }
}
