//! Replaying a JSON-lines event log through a session.
//!
//! Each non-blank line holds one record:
//!
//! ```json
//! {"kind": "kill", "timestamp": 12, "fields": {"monster": ["string", "zombie"]}}
//! ```
//!
//! The clock follows the log: a record stamped later than the current turn
//! moves the clock there (polling time-bounded achievements) before it is
//! sent. Records stamped earlier are sent as is. A `game_start` record
//! resets the session first. Lines starting with `#` are comments.

use std::io::BufRead;

use chronicle_core::Session;
use chronicle_types::EventRecord;
use tracing::{debug, warn};

use crate::error::EngineError;

/// Counts from one replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Records handed to the bus.
    pub sent: usize,
    /// Lines that did not parse as a record.
    pub malformed: usize,
    /// Records stamped before the clock at the time they were read.
    pub late: usize,
}

/// Feed every record in `input` to `session`.
///
/// # Errors
///
/// Returns [`EngineError::Io`] if reading fails, or
/// [`EngineError::Session`] if the clock cannot be moved.
pub fn replay(session: &Session, input: impl BufRead) -> Result<ReplaySummary, EngineError> {
    let mut summary = ReplaySummary::default();
    for (index, line) in input.lines().enumerate() {
        let line = line?;
        let text = line.trim();
        if text.is_empty() || text.starts_with('#') {
            continue;
        }
        let record: EventRecord = match serde_json::from_str(text) {
            Ok(record) => record,
            Err(error) => {
                warn!(line = index.saturating_add(1), %error, "Skipping malformed record");
                summary.malformed = summary.malformed.saturating_add(1);
                continue;
            }
        };

        let now = session.clock().now();
        if record.timestamp() > now {
            session.set_turn(record.timestamp())?;
        } else if record.timestamp() < now {
            debug!(
                line = index.saturating_add(1),
                timestamp = %record.timestamp(),
                %now,
                "Record predates the clock"
            );
            summary.late = summary.late.saturating_add(1);
        }
        if record.kind().is_game_start() {
            session.clear();
        }
        session.send(record);
        summary.sent = summary.sent.saturating_add(1);
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use chronicle_achievements::Completion;
    use chronicle_core::{Catalog, SessionConfig};
    use chronicle_types::{AchievementId, EventKindId, FieldMap, Turn};

    use super::*;

    const CATALOG: &str = r#"{
        "event_kinds": [{ "kind": "kill", "fields": { "monster": "string" } }],
        "statistics": [
            { "id": "num_kills", "source": { "event_kind": "kill" }, "stat_type": "count" }
        ],
        "achievements": [
            {
                "id": "quick",
                "name": "Quick",
                "time_constraint": { "since": "game_start", "is": "<=", "target": 10 },
                "requirements": [
                    { "event_statistic": "num_kills", "is": ">=", "target": 2 }
                ]
            }
        ]
    }"#;

    fn session() -> Option<Session> {
        let catalog = Catalog::parse(CATALOG).ok()?;
        let session = Session::new(catalog, &SessionConfig::default()).ok()?;
        session.start_game();
        Some(session)
    }

    fn kills(session: &Session) -> u64 {
        session
            .stats()
            .count(&EventKindId::new("kill"), &FieldMap::new())
    }

    #[test]
    fn records_move_the_clock_forward() {
        let Some(session) = session() else {
            return;
        };
        let log = br#"
{"kind": "kill", "timestamp": 3, "fields": {"monster": ["string", "zombie"]}}
# a comment
{"kind": "kill", "timestamp": 2, "fields": {"monster": ["string", "triffid"]}}
"#;
        let summary = replay(&session, &log[..]).ok();
        assert_eq!(
            summary,
            Some(ReplaySummary {
                sent: 2,
                malformed: 0,
                late: 1
            })
        );
        assert_eq!(session.clock().now(), Turn(3));
        assert_eq!(kills(&session), 2);
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let Some(session) = session() else {
            return;
        };
        let log = br#"
{"kind": "kill", "timestamp": 1, "fields": {"monster": ["string", "zombie"]}}
not json
{"kind": "kill"}
"#;
        let summary = replay(&session, &log[..]).unwrap_or_default();
        assert_eq!(summary.sent, 1);
        assert_eq!(summary.malformed, 2);
        assert_eq!(kills(&session), 1);
    }

    #[test]
    fn game_start_resets_the_session() {
        let Some(session) = session() else {
            return;
        };
        let log = br#"
{"kind": "kill", "timestamp": 1, "fields": {"monster": ["string", "zombie"]}}
{"kind": "game_start", "timestamp": 5}
{"kind": "kill", "timestamp": 6, "fields": {"monster": ["string", "zombie"]}}
"#;
        assert!(replay(&session, &log[..]).is_ok());
        assert_eq!(kills(&session), 1);
    }

    #[test]
    fn passing_the_deadline_fails_time_bounded_achievements() {
        let Some(session) = session() else {
            return;
        };
        let log = br#"
{"kind": "kill", "timestamp": 1, "fields": {"monster": ["string", "zombie"]}}
{"kind": "kill", "timestamp": 50, "fields": {"monster": ["string", "zombie"]}}
"#;
        assert!(replay(&session, &log[..]).is_ok());
        assert_eq!(
            session
                .achievements()
                .is_completed(&AchievementId::new("quick")),
            Completion::Failed
        );
    }
}
