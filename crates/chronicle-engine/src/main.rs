//! Replay binary for the Chronicle telemetry engine.
//!
//! Feeds a recorded event log through a fresh (or restored) session, then
//! prints every score and achievement and optionally writes a snapshot to
//! resume from.
//!
//! # Startup Sequence
//!
//! 1. Read run options from the environment
//! 2. Load configuration from `chronicle-config.yaml`
//! 3. Initialize structured logging (tracing)
//! 4. Load the descriptor catalog
//! 5. Build the session, then restore a snapshot or start a new game
//! 6. Replay the event log
//! 7. Print the report and write the snapshot

mod error;
mod options;
mod replay;

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::rc::Rc;

use anyhow::Context;
use chronicle_achievements::{Achievement, AchievementCallback};
use chronicle_core::{Catalog, LogFormat, Session, SessionConfig, SessionSnapshot};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::options::Options;

fn main() -> anyhow::Result<()> {
    // 1-2. Options and configuration; logging depends on the latter.
    let options = Options::from_env()?;
    let config = load_config(&options.config)?;

    // 3. Initialize structured logging. The report owns stdout.
    init_logging(&config);
    info!(config = %options.config.display(), "chronicle-engine starting");

    run(&options, &config).context("replay failed")
}

/// Steps 4 to 7 of the startup sequence.
fn run(options: &Options, config: &SessionConfig) -> Result<(), EngineError> {
    // 4. Load the catalog.
    let catalog = Catalog::from_file(&options.catalog)?;

    // 5. Build the session.
    let on_completed: AchievementCallback =
        Rc::new(|achievement: &Achievement, enabled: bool| {
            info!(id = %achievement.id, name = %achievement.name, enabled, "Achievement completed");
        });
    let on_failed: AchievementCallback = Rc::new(|achievement: &Achievement, enabled: bool| {
        info!(id = %achievement.id, name = %achievement.name, enabled, "Achievement failed");
    });
    let session = Session::with_callbacks(catalog, config, Some(on_completed), Some(on_failed))?;
    if let Some(path) = &options.restore {
        let snapshot: SessionSnapshot = serde_json::from_reader(BufReader::new(File::open(path)?))?;
        session.restore(snapshot)?;
    } else {
        session.start_game();
    }

    // 6. Replay.
    let summary = match &options.events {
        Some(path) => replay::replay(&session, BufReader::new(File::open(path)?))?,
        None => replay::replay(&session, std::io::stdin().lock())?,
    };
    info!(
        sent = summary.sent,
        malformed = summary.malformed,
        late = summary.late,
        now = %session.clock().now(),
        "Replay complete"
    );

    // 7. Report and persist.
    print_report(&session);
    if let Some(path) = &options.snapshot {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, &session.snapshot())?;
        info!(path = %path.display(), "Snapshot written");
    }
    Ok(())
}

/// Load the session configuration.
///
/// Falls back to defaults if the file does not exist.
fn load_config(path: &Path) -> Result<SessionConfig, EngineError> {
    if path.exists() {
        Ok(SessionConfig::from_file(path)?)
    } else {
        Ok(SessionConfig::default())
    }
}

fn init_logging(config: &SessionConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);
    match config.logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

/// Print every valid score and every visible achievement.
fn print_report(session: &Session) {
    println!("Scores");
    for (id, description) in session.score_descriptions() {
        println!("  {id}: {description}");
    }

    let achievements = session.achievements();
    println!("Achievements ({} pending)", achievements.pending_count());
    for achievement in achievements.valid_achievements() {
        if achievements.is_hidden(&achievement.id) {
            continue;
        }
        println!("{}", achievements.ui_text_for(achievement));
    }
}
