//! Persistence tests.
//!
//! Verifies:
//! - SQLite and in-memory stores honour get/set semantics
//! - A saved session restores events, objectives, clock and outcome
//! - Corrupt, stale-version and unreadable blobs fall back to a fresh session
//! - Storage failures never fail a tick
//! - A repeated claim leaves the persisted blob untouched

use cityfi_core::{
    config::EconomyConfig,
    engine::{SimEngine, TickInput},
    error::{SimError, SimResult},
    event::SimEvent,
    objective_subsystem::LiveState,
    persistence::{KvStore, MemoryStore, SqliteStore},
    snapshot::{SessionSnapshot, SESSION_KEY},
};

struct BrokenStore;

impl KvStore for BrokenStore {
    fn get(&self, _key: &str) -> SimResult<Option<String>> {
        Err(SimError::Other(anyhow::anyhow!("disk unavailable")))
    }

    fn set(&mut self, _key: &str, _blob: &str) -> SimResult<()> {
        Err(SimError::Other(anyhow::anyhow!("disk full")))
    }
}

const WEEK: u64 = 202_643;

fn live() -> LiveState {
    LiveState {
        population: 120,
        happiness: 65.0,
        treasury: 5_000.0,
        tvl: 20_000.0,
        building_count: 6,
        category_count: 3,
    }
}

fn engine_with(store: Box<dyn KvStore>) -> SimEngine {
    let mut engine = SimEngine::build_seeded(EconomyConfig::builtin(), store, 11);
    engine.clock.resume();
    engine
}

fn run(engine: &mut SimEngine, ticks: u64) {
    let live = live();
    let input = TickInput { buildings: &[], live: &live, week_number: WEEK };
    for _ in 0..ticks {
        engine.tick(&input);
    }
}

#[test]
fn sqlite_store_upserts_by_key() {
    let mut store = SqliteStore::in_memory().expect("in-memory sqlite");
    assert_eq!(store.get("missing").expect("get"), None);

    store.set("k", "{\"a\":1}").expect("set");
    store.set("k", "{\"a\":2}").expect("overwrite");
    assert_eq!(store.get("k").expect("get").as_deref(), Some("{\"a\":2}"));
    assert_eq!(store.key_count().expect("count"), 1);

    store.migrate().expect("migrations are idempotent");
}

#[test]
fn file_store_keeps_blobs_across_reopen() {
    let path = std::env::temp_dir().join(format!("cityfi-kv-{}.db", std::process::id()));
    let _ = std::fs::remove_file(&path);
    let path_str = path.to_str().expect("utf-8 temp path");

    {
        let mut store = SqliteStore::open(path_str).expect("open file store");
        store.set(SESSION_KEY, "{\"tick\":7}").expect("set");
    }
    let store = SqliteStore::open(path_str).expect("reopen file store");
    assert_eq!(store.get(SESSION_KEY).expect("get").as_deref(), Some("{\"tick\":7}"));

    drop(store);
    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{path_str}{suffix}"));
    }
}

#[test]
fn memory_store_counts_writes() {
    let mut store = MemoryStore::new();
    store.set("a", "1").expect("set");
    store.set("a", "2").expect("set");
    assert_eq!(store.write_count(), 2);
    assert_eq!(store.get("a").expect("get").as_deref(), Some("2"));
}

#[test]
fn saved_session_restores_into_a_new_engine() {
    let mut original = engine_with(Box::new(MemoryStore::new()));
    original.force_event("market_crash", &[]).expect("crash");
    original.force_event("network_congestion", &[]).expect("congestion");
    original.events.defer_yield(250.0);
    run(&mut original, 50);
    original.objectives.record_rug_pull_survived();
    assert!(original.save());

    let blob = original.stored_blob().expect("blob written");
    let mut store = MemoryStore::new();
    store.set(SESSION_KEY, &blob).expect("seed store");

    let mut restored = engine_with(Box::new(store));
    assert!(restored.load());
    assert_eq!(restored.clock.current_tick, 50);
    assert!(restored.clock.paused, "a restored session starts paused");
    assert!(restored.events.is_active("market_crash"));
    assert_eq!(restored.events.pending_delayed_value(), 250.0);
    assert_eq!(restored.events.aggregate_yield_multiplier(), 0.5);
    let ids = |e: &SimEngine| {
        e.objectives
            .weekly()
            .objectives
            .iter()
            .map(|o| (o.objective_id.clone(), o.completed))
            .collect::<Vec<_>>()
    };
    assert_eq!(ids(&restored), ids(&original));
    assert_eq!(restored.objectives.weekly().week_number, WEEK);
    assert_eq!(restored.objectives.long_lived().rug_pulls_survived, 1);
    assert_eq!(
        restored.export_state().events.last_triggered,
        original.export_state().events.last_triggered
    );
    assert_eq!(restored.events.event_log().count(), 2);

    restored.clock.resume();
    let live = live();
    let report = restored.tick(&TickInput { buildings: &[], live: &live, week_number: WEEK });
    assert!(report.events.contains(&SimEvent::SessionRestored { tick: 50, active_events: 2 }));
    assert_eq!(report.tick, 51);
}

#[test]
fn restore_drops_events_that_expired_before_the_snapshot_tick() {
    let mut engine = engine_with(Box::new(MemoryStore::new()));
    engine.force_event("market_crash", &[]).expect("crash");
    run(&mut engine, 10);

    let mut snapshot = engine.export_state();
    snapshot.clock.current_tick = 2_000;
    let mut fresh = engine_with(Box::new(MemoryStore::new()));
    assert_eq!(fresh.import_state(snapshot), 0);
    assert!(!fresh.events.is_active("market_crash"));
}

#[test]
fn forced_damage_queued_before_a_snapshot_is_still_applied() {
    let mut engine = engine_with(Box::new(MemoryStore::new()));
    run(&mut engine, 3);
    engine.force_event("exploit_hack", &[]).expect("hack");
    let snapshot = engine.export_state();

    let mut restored = engine_with(Box::new(MemoryStore::new()));
    restored.import_state(snapshot);
    restored.clock.resume();

    let live = live();
    let input = TickInput { buildings: &[], live: &live, week_number: WEEK };
    let original = engine.tick(&input);
    let reloaded = restored.tick(&input);
    assert_eq!(original.effects.treasury_delta, -5_000.0);
    assert_eq!(reloaded.effects.treasury_delta, -5_000.0, "damage lost across reload");
    assert!(reloaded.events.contains(&SimEvent::TreasuryAdjusted { tick: 4, delta: -5_000.0 }));
}

#[test]
fn missing_blob_leaves_session_untouched() {
    let mut engine = engine_with(Box::new(MemoryStore::new()));
    run(&mut engine, 3);
    assert!(!engine.load());
    assert_eq!(engine.clock.current_tick, 3);
}

#[test]
fn corrupt_blob_falls_back_to_fresh_session() {
    let mut store = MemoryStore::new();
    store.set(SESSION_KEY, "{not json").expect("seed");
    let mut engine = engine_with(Box::new(store));
    run(&mut engine, 5);

    assert!(!engine.load());
    assert_eq!(engine.clock.current_tick, 0, "corrupt state resets the session");
    assert!(engine.objectives.weekly().objectives.is_empty());
}

#[test]
fn snapshot_from_another_version_is_rejected() {
    let engine = engine_with(Box::new(MemoryStore::new()));
    let mut snapshot = engine.export_state();
    snapshot.version += 1;
    let blob = snapshot.to_json().expect("serialise");

    assert!(SessionSnapshot::from_json(&blob).is_err());

    let mut store = MemoryStore::new();
    store.set(SESSION_KEY, &blob).expect("seed");
    let mut engine = engine_with(Box::new(store));
    assert!(!engine.load());
}

#[test]
fn storage_failures_never_fail_a_tick() {
    let mut config = EconomyConfig::builtin();
    config.snapshot_interval_ticks = 1;
    let mut engine = SimEngine::build_seeded(config, Box::new(BrokenStore), 3);
    engine.clock.resume();

    run(&mut engine, 5);
    assert_eq!(engine.clock.current_tick, 5);
    assert!(!engine.save());
    assert!(!engine.load());
    assert_eq!(engine.clock.current_tick, 0, "unreadable store starts fresh");
}

#[test]
fn sessions_are_snapshotted_on_the_interval() {
    let mut config = EconomyConfig::builtin();
    config.snapshot_interval_ticks = 5;
    let mut engine = SimEngine::build_seeded(config, Box::new(MemoryStore::new()), 3);
    engine.clock.resume();

    run(&mut engine, 4);
    assert!(engine.stored_blob().is_none());
    run(&mut engine, 1);
    let blob = engine.stored_blob().expect("snapshot at tick 5");
    let snapshot = SessionSnapshot::from_json(&blob).expect("valid blob");
    assert_eq!(snapshot.clock.current_tick, 5);
}

#[test]
fn repeated_claim_leaves_persisted_state_unchanged() {
    let mut engine = engine_with(Box::new(SqliteStore::in_memory().expect("sqlite")));
    run(&mut engine, 1);

    // Enough to complete any easy objective.
    let rich = LiveState { treasury: 50_000.0, happiness: 90.0, building_count: 20, ..live() };
    let input = TickInput { buildings: &[], live: &rich, week_number: WEEK };
    engine.tick(&input);

    let easy_id = engine.objectives.weekly().objectives[0].objective_id.clone();
    assert!(engine.objectives.weekly().objectives[0].completed, "{easy_id} should be complete");

    let first = engine.claim_objective(&easy_id);
    assert!(first.claimed);
    assert_eq!(first.treasury_reward, 500.0);
    let blob_after_first = engine.stored_blob().expect("claim persists");

    let second = engine.claim_objective(&easy_id);
    assert!(!second.claimed);
    assert_eq!(second.treasury_reward, 0.0);
    assert_eq!(
        engine.stored_blob().expect("blob"),
        blob_after_first,
        "a no-op claim must not touch storage"
    );
}
