//! End-to-end tests: records sent through a session's bus, observed through
//! its stats and achievements trackers.

// Integration tests use expect/unwrap extensively for clarity -- panicking
// on failure is the correct behavior in test code.
#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::items_after_statements,
    clippy::missing_panics_doc,
    clippy::too_many_lines,
    clippy::indexing_slicing
)]

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use chronicle_achievements::{Achievement, AchievementCallback, AchievementCatalog, Completion};
use chronicle_core::{Catalog, Session, SessionConfig, SessionSnapshot};
use chronicle_events::{EventBus, EventSubscriber};
use chronicle_stats::{StatWatcher, StatsSnapshot, StatsTracker};
use chronicle_types::{
    AchievementId, EventKindId, EventRecord, EventSchema, EventSchemas, FieldMap, StatisticId,
    TaggedValue, Turn, TurnSpan, ValueType,
};

const CATALOG: &str = r#"{
    "event_kinds": [
        { "kind": "kill", "fields": { "monster": "string", "damage": "int" } }
    ],
    "transformations": [
        {
            "id": "zombie_kills",
            "source": { "event_kind": "kill" },
            "value_constraints": { "monster": { "equals": ["string", "zombie"] } }
        }
    ],
    "statistics": [
        { "id": "num_kills", "source": { "event_kind": "kill" }, "stat_type": "count",
          "description": "monsters killed" },
        { "id": "num_zombie_kills", "source": { "transformation": "zombie_kills" },
          "stat_type": "count" },
        { "id": "damage", "source": { "event_kind": "kill" }, "stat_type": "total",
          "field": "damage" },
        { "id": "zombie_damage", "source": { "transformation": "zombie_kills" },
          "stat_type": "total", "field": "damage" },
        { "id": "max_damage", "source": { "event_kind": "kill" }, "stat_type": "maximum",
          "field": "damage" },
        { "id": "first_victim", "source": { "event_kind": "kill" }, "stat_type": "first_value",
          "field": "monster" }
    ],
    "scores": [
        { "id": "score_kills", "description": "Number of monsters killed: {}",
          "statistic": "num_kills" }
    ],
    "achievements": [
        {
            "id": "hunter",
            "name": "Hunter",
            "requirements": [
                { "event_statistic": "num_kills", "is": ">=", "target": 10 }
            ]
        },
        {
            "id": "quick",
            "name": "Quick Start",
            "time_constraint": { "since": "game_start", "is": "<=", "target": 1 },
            "requirements": [
                { "event_statistic": "num_kills", "is": ">=", "target": 5 }
            ]
        },
        {
            "id": "pacifist",
            "name": "Pacifist",
            "type": "conduct",
            "requirements": [
                { "event_statistic": "num_kills", "is": "<=", "target": 0 }
            ]
        }
    ]
}"#;

fn catalog() -> Catalog {
    Catalog::parse(CATALOG).expect("catalog parses")
}

fn kill(monster: &str, damage: i64) -> FieldMap {
    FieldMap::from([
        ("monster".to_owned(), TaggedValue::from(monster)),
        ("damage".to_owned(), TaggedValue::Int(damage)),
    ])
}

fn criteria(monster: &str) -> FieldMap {
    FieldMap::from([("monster".to_owned(), TaggedValue::from(monster))])
}

fn kind() -> EventKindId {
    EventKindId::new("kill")
}

/// The stats descriptors alone, so only the test's own watchers register.
fn stats_only_catalog() -> Catalog {
    let (schemas, stats, _) = catalog().into_parts();
    Catalog::new(schemas, stats, AchievementCatalog::new())
}

fn started_session() -> Session {
    let session = Session::new(catalog(), &SessionConfig::default()).expect("session builds");
    session.start_game();
    session
}

#[derive(Default)]
struct Decisions {
    completed: RefCell<Vec<(AchievementId, Turn)>>,
    failed: RefCell<Vec<(AchievementId, Turn)>>,
}

fn session_with_decisions() -> (Session, Rc<Decisions>, Rc<Cell<Turn>>) {
    let decisions = Rc::new(Decisions::default());
    let now = Rc::new(Cell::new(Turn::ZERO));
    let on_completed: AchievementCallback = {
        let decisions = Rc::clone(&decisions);
        let now = Rc::clone(&now);
        Rc::new(move |achievement: &Achievement, _enabled| {
            decisions
                .completed
                .borrow_mut()
                .push((achievement.id.clone(), now.get()));
        })
    };
    let on_failed: AchievementCallback = {
        let decisions = Rc::clone(&decisions);
        let now = Rc::clone(&now);
        Rc::new(move |achievement: &Achievement, _enabled| {
            decisions
                .failed
                .borrow_mut()
                .push((achievement.id.clone(), now.get()));
        })
    };
    let session = Session::with_callbacks(
        catalog(),
        &SessionConfig::default(),
        Some(on_completed),
        Some(on_failed),
    )
    .expect("session builds");
    session.start_game();
    (session, decisions, now)
}

// =============================================================================
// Aggregation
// =============================================================================

#[test]
fn count_matches_every_superset_match() {
    let session = started_session();
    let monsters = ["zombie", "triffid", "zombie", "dog", "zombie", "dog"];
    for (i, monster) in monsters.iter().enumerate() {
        session.emit("kill", kill(monster, i64::try_from(i).unwrap()));
    }

    assert_eq!(session.stats().count(&kind(), &FieldMap::new()), 6);
    for monster in ["zombie", "triffid", "dog", "ghoul"] {
        let expected = u64::try_from(monsters.iter().filter(|m| **m == monster).count()).unwrap();
        assert_eq!(session.stats().count(&kind(), &criteria(monster)), expected);
    }

    // Identical field maps share a partition.
    session.emit("kill", kill("dog", 5));
    assert_eq!(session.stats().get_events(&kind()).len(), 6);
    assert_eq!(session.stats().count(&kind(), &criteria("dog")), 3);
}

#[test]
fn totals_sum_matching_records() {
    let session = started_session();
    session.emit("kill", kill("zombie", 5));
    session.advance(TurnSpan(1)).unwrap();
    session.emit("kill", kill("zombie", 7));
    session.advance(TurnSpan(1)).unwrap();
    session.emit("kill", kill("triffid", 3));

    let stats = session.stats();
    assert_eq!(stats.count(&kind(), &FieldMap::new()), 3);
    assert_eq!(stats.count(&kind(), &criteria("zombie")), 2);
    assert_eq!(stats.total(&kind(), "damage", &FieldMap::new()), 15);
    assert_eq!(stats.total(&kind(), "damage", &criteria("zombie")), 12);

    assert_eq!(
        stats.value_of(&StatisticId::new("zombie_damage")),
        TaggedValue::Int(12)
    );
    assert_eq!(
        stats.value_of(&StatisticId::new("first_victim")),
        TaggedValue::from("zombie")
    );
    assert_eq!(
        session.score_descriptions()[0].1,
        "Number of monsters killed: 3"
    );
}

#[test]
fn first_value_breaks_same_turn_ties_by_smallest_partition() {
    let session = started_session();
    session.emit("kill", kill("zombie", 5));
    session.emit("kill", kill("triffid", 3));

    // Both partitions were first seen on turn 0; damage 3 sorts first.
    assert_eq!(
        session.stats().value_of(&StatisticId::new("first_victim")),
        TaggedValue::from("triffid")
    );
}

#[test]
fn invalid_records_change_nothing() {
    let session = started_session();
    session.emit("kill", criteria("zombie"));
    let mut wrong_type = kill("zombie", 1);
    wrong_type.insert("damage".to_owned(), TaggedValue::from("lots"));
    session.emit("kill", wrong_type);
    session.emit("unheard_of", FieldMap::new());
    assert_eq!(session.stats().count(&kind(), &FieldMap::new()), 0);
}

// =============================================================================
// Incremental watcher equivalence
// =============================================================================

struct Recorder {
    seen: RefCell<Vec<(StatisticId, TaggedValue)>>,
}

impl StatWatcher for Recorder {
    fn new_value(&self, statistic: &StatisticId, value: &TaggedValue, _stats: &StatsTracker) {
        self.seen
            .borrow_mut()
            .push((statistic.clone(), value.clone()));
    }
}

#[test]
fn watched_values_equal_fresh_values() {
    let session = Session::new(stats_only_catalog(), &SessionConfig::default()).unwrap();
    session.start_game();
    let stats = session.stats();
    let ids: Vec<StatisticId> = [
        "num_kills",
        "num_zombie_kills",
        "damage",
        "zombie_damage",
        "max_damage",
        "first_victim",
    ]
    .into_iter()
    .map(StatisticId::new)
    .collect();

    assert_eq!(stats.watcher_count(), 0);
    let owner = stats.new_owner();
    let recorder = Rc::new(Recorder {
        seen: RefCell::new(Vec::new()),
    });
    for id in &ids {
        let initial = stats.add_watcher(&owner, id, recorder.clone());
        assert_eq!(initial, stats.value_of(id));
    }

    let records = [
        kill("zombie", 5),
        kill("triffid", 9),
        kill("zombie", 5),
        kill("zombie", 2),
        kill("dog", 11),
    ];
    for record in records {
        recorder.seen.borrow_mut().clear();
        session.emit("kill", record);
        for (statistic, value) in recorder.seen.borrow().iter() {
            assert_eq!(*value, stats.value_of(statistic), "statistic {statistic}");
        }
    }

    assert_eq!(stats.watcher_count(), ids.len());
    drop(owner);
    assert_eq!(stats.watcher_count(), 0);
    recorder.seen.borrow_mut().clear();
    session.emit("kill", kill("zombie", 1));
    assert!(recorder.seen.borrow().is_empty());
}

// =============================================================================
// Achievements
// =============================================================================

#[test]
fn tenth_kill_completes_hunter_exactly_once() {
    let (session, decisions, now) = session_with_decisions();
    let hunter = AchievementId::new("hunter");

    for i in 1..=9 {
        now.set(Turn(i));
        session.set_turn(Turn(i)).unwrap();
        session.emit("kill", kill("zombie", 1));
        assert_eq!(session.achievements().is_completed(&hunter), Completion::Pending);
    }
    now.set(Turn(10));
    session.set_turn(Turn(10)).unwrap();
    session.emit("kill", kill("zombie", 1));
    assert_eq!(session.achievements().is_completed(&hunter), Completion::Completed);

    for i in 11..20 {
        now.set(Turn(i));
        session.set_turn(Turn(i)).unwrap();
        session.emit("kill", kill("triffid", 1));
    }
    let completed: Vec<_> = decisions
        .completed
        .borrow()
        .iter()
        .filter(|(id, _)| *id == hunter)
        .cloned()
        .collect();
    assert_eq!(completed, vec![(hunter.clone(), Turn(10))]);
    let state = session.achievements().state(&hunter).unwrap();
    assert_eq!(state.last_state_change, Turn(10));
    assert_eq!(state.final_values, vec![TaggedValue::Int(10)]);

    // The conduct failed on the first kill.
    assert_eq!(
        decisions.failed.borrow().first().map(|(id, _)| id.clone()),
        Some(AchievementId::new("pacifist"))
    );
}

#[test]
fn missed_deadline_fails_with_frozen_values() {
    let (session, decisions, _now) = session_with_decisions();
    let quick = AchievementId::new("quick");

    session.emit("kill", kill("zombie", 1));
    session.emit("kill", kill("zombie", 1));
    session.advance(TurnSpan(2)).unwrap();

    assert_eq!(session.achievements().is_completed(&quick), Completion::Failed);
    let state = session.achievements().state(&quick).unwrap();
    assert_eq!(state.completion, Completion::Failed);
    assert_eq!(state.last_state_change, Turn(1));
    assert_eq!(state.final_values, vec![TaggedValue::Int(2)]);
    assert!(decisions.failed.borrow().iter().any(|(id, _)| *id == quick));

    for _ in 0..5 {
        session.emit("kill", kill("zombie", 1));
    }
    let state = session.achievements().state(&quick).unwrap();
    assert_eq!(state.final_values, vec![TaggedValue::Int(2)]);
    assert!(session
        .achievements()
        .ui_text_for(session.achievement_catalog().get(&quick).unwrap())
        .contains("Failed turn 1"));
}

#[test]
fn new_game_restarts_achievements() {
    let session = started_session();
    session.emit("kill", kill("zombie", 1));
    let pacifist = AchievementId::new("pacifist");
    assert_eq!(session.achievements().is_completed(&pacifist), Completion::Failed);

    session.start_game();
    assert_eq!(session.achievements().is_completed(&pacifist), Completion::Pending);
    assert_eq!(session.stats().count(&kind(), &FieldMap::new()), 0);
    assert_eq!(session.achievements().valid_achievements().len(), 3);
}

// =============================================================================
// Persistence
// =============================================================================

#[test]
fn stats_round_trip_reproduces_every_query() {
    let session = started_session();
    session.emit("kill", kill("zombie", 5));
    session.advance(TurnSpan(4)).unwrap();
    session.emit("kill", kill("zombie", 7));
    session.emit("kill", kill("triffid", 3));
    session.emit("kill", kill("zombie", 5));

    let json = serde_json::to_string(&session.stats().snapshot()).unwrap();
    let snapshot: StatsSnapshot = serde_json::from_str(&json).unwrap();
    let restored = Session::new(catalog(), &SessionConfig::default()).unwrap();
    restored.stats().load(snapshot);

    let (before, after) = (session.stats(), restored.stats());
    for criteria in [FieldMap::new(), criteria("zombie"), criteria("triffid")] {
        assert_eq!(before.count(&kind(), &criteria), after.count(&kind(), &criteria));
        assert_eq!(
            before.total(&kind(), "damage", &criteria),
            after.total(&kind(), "damage", &criteria)
        );
        assert_eq!(
            before.minimum(&kind(), "damage", &criteria),
            after.minimum(&kind(), "damage", &criteria)
        );
        assert_eq!(
            before.maximum(&kind(), "damage", &criteria),
            after.maximum(&kind(), "damage", &criteria)
        );
        assert_eq!(before.first(&kind(), &criteria), after.first(&kind(), &criteria));
        assert_eq!(before.last(&kind(), &criteria), after.last(&kind(), &criteria));
    }
    assert_eq!(before.initial_scores(), after.initial_scores());
}

#[test]
fn session_snapshot_resumes_tracking() {
    let session = started_session();
    for _ in 0..8 {
        session.emit("kill", kill("zombie", 1));
    }
    let json = serde_json::to_string(&session.snapshot()).unwrap();
    let snapshot: SessionSnapshot = serde_json::from_str(&json).unwrap();

    let resumed = Session::new(catalog(), &SessionConfig::default()).unwrap();
    resumed.restore(snapshot).unwrap();
    let hunter = AchievementId::new("hunter");
    assert_eq!(
        resumed.achievements().is_completed(&AchievementId::new("pacifist")),
        Completion::Failed
    );
    resumed.emit("kill", kill("zombie", 1));
    assert_eq!(resumed.achievements().is_completed(&hunter), Completion::Pending);
    resumed.emit("kill", kill("zombie", 1));
    assert_eq!(resumed.achievements().is_completed(&hunter), Completion::Completed);
}

// =============================================================================
// Bus re-entrancy
// =============================================================================

struct Counter {
    hits: Cell<u32>,
}

impl EventSubscriber for Counter {
    fn notify(&self, _record: &EventRecord) {
        self.hits.set(self.hits.get().saturating_add(1));
    }
}

struct Saboteur {
    bus: Weak<EventBus>,
    victim: Rc<Counter>,
    hits: Cell<u32>,
}

impl EventSubscriber for Saboteur {
    fn notify(&self, _record: &EventRecord) {
        self.hits.set(self.hits.get().saturating_add(1));
        if let Some(bus) = self.bus.upgrade() {
            let _ = bus.unsubscribe(self.victim.as_ref());
        }
    }
}

#[test]
fn unsubscribing_a_later_listener_does_not_skip_it() {
    let mut schemas = EventSchemas::new();
    schemas.register(EventSchema::new("kill").field("monster", ValueType::String));
    let bus = Rc::new(EventBus::new(Rc::new(schemas)));

    let first = Rc::new(Counter { hits: Cell::new(0) });
    let victim = Rc::new(Counter { hits: Cell::new(0) });
    let saboteur = Rc::new(Saboteur {
        bus: Rc::downgrade(&bus),
        victim: Rc::clone(&victim),
        hits: Cell::new(0),
    });

    let first_listener: Rc<dyn EventSubscriber> = first.clone();
    let saboteur_listener: Rc<dyn EventSubscriber> = saboteur.clone();
    let victim_listener: Rc<dyn EventSubscriber> = victim.clone();
    bus.subscribe(&first_listener).unwrap();
    bus.subscribe(&saboteur_listener).unwrap();
    bus.subscribe(&victim_listener).unwrap();

    bus.send(EventRecord::of("kill", Turn(1)).with("monster", "zombie"));
    assert_eq!(first.hits.get(), 1);
    assert_eq!(saboteur.hits.get(), 1);
    assert_eq!(victim.hits.get(), 1);

    bus.send(EventRecord::of("kill", Turn(2)).with("monster", "zombie"));
    assert_eq!(first.hits.get(), 2);
    assert_eq!(victim.hits.get(), 1);
    assert_eq!(bus.subscriber_count(), 2);
}
