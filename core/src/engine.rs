//! The session engine: owns one game session's economy state.
//!
//! EXECUTION ORDER (fixed, documented, never reordered):
//!   1. Event lifecycle     (expire, daily roll, immediate effects)
//!   2. Rug survival        (expired rug events feed the tracker)
//!   3. Week rollover       (fresh weekly objectives on week change)
//!   4. Run tracking        (consecutive counters, peaks, streak)
//!   5. Objective progress
//!   6. Win / lose          (sticky once decided)
//!   7. Snapshot            (every snapshot_interval_ticks, best-effort)
//!
//! RULES:
//!   - One engine per session; nothing in this crate is a global.
//!   - Components never call each other; the engine carries values between
//!     them.
//!   - Persistence failures are logged and never fail a tick.

use crate::{
    clock::SimClock,
    config::EconomyConfig,
    error::{SimError, SimResult},
    event::SimEvent,
    event_subsystem::{ActiveEventInstance, EventLifecycleManager, TickOutcome},
    objective_subsystem::{ClaimOutcome, GameOutcome, LiveState, ObjectiveTracker},
    overlay::{OverlayType, SpatialEffectEngine, TileEffectSample},
    persistence::{KvStore, MemoryStore},
    registry::{self, BuildingSnapshot},
    rng::SubsystemRng,
    snapshot::{SessionSnapshot, SESSION_KEY, SNAPSHOT_VERSION},
    types::Tick,
};
use std::sync::Arc;

/// Stable stream index for the event roll source in seeded sessions.
const EVENT_STREAM: u64 = 0;

/// What the host loop hands the engine each step.
#[derive(Debug, Clone, Copy)]
pub struct TickInput<'a> {
    pub buildings:   &'a [BuildingSnapshot],
    pub live:        &'a LiveState,
    /// Current week number, e.g. from `week_number_for(Utc::now())`.
    pub week_number: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub tick:    Tick,
    pub effects: TickOutcome,
    pub events:  Vec<SimEvent>,
    pub outcome: GameOutcome,
}

pub struct SimEngine {
    pub config:     EconomyConfig,
    pub clock:      SimClock,
    pub events:     EventLifecycleManager,
    pub overlays:   SpatialEffectEngine,
    pub objectives: ObjectiveTracker,
    store:          Box<dyn KvStore>,
    outcome:        GameOutcome,
    /// Notices raised outside a tick, reported with the next one.
    queued:         Vec<SimEvent>,
}

impl SimEngine {
    pub fn new(config: EconomyConfig, store: Box<dyn KvStore>) -> Self {
        Self {
            clock:      SimClock::new(config.ticks_per_day),
            events:     EventLifecycleManager::new(config.events.clone(), config.ticks_per_day),
            overlays:   SpatialEffectEngine::new(config.overlays.clone()),
            objectives: ObjectiveTracker::new(
                config.objectives.clone(),
                config.rules.clone(),
                config.ticks_per_day,
            ),
            store,
            outcome: GameOutcome::InProgress,
            queued: Vec::new(),
            config,
        }
    }

    /// Engine whose event rolls come from a seeded PCG stream.
    pub fn build_seeded(config: EconomyConfig, store: Box<dyn KvStore>, seed: u64) -> Self {
        let mut engine = Self::new(config, store);
        let rng = SubsystemRng::new(seed, EVENT_STREAM).with_name("events");
        engine.events = EventLifecycleManager::new(engine.config.events.clone(), engine.config.ticks_per_day)
            .with_roll_source(Box::new(rng));
        engine
    }

    /// Built-in config over an in-memory store.
    pub fn build_test(seed: u64) -> Self {
        Self::build_seeded(EconomyConfig::builtin(), Box::new(MemoryStore::new()), seed)
    }

    pub fn outcome(&self) -> GameOutcome {
        self.outcome
    }

    /// Start the session over. Catalogs and subscribers are kept.
    pub fn reset(&mut self) {
        self.clock = SimClock::new(self.config.ticks_per_day);
        self.events.reset();
        self.objectives.reset();
        self.overlays.invalidate();
        self.outcome = GameOutcome::InProgress;
        self.queued.clear();
    }

    /// Advance one tick. This is the core simulation step.
    pub fn tick(&mut self, input: &TickInput) -> TickReport {
        assert!(!self.clock.paused, "tick() called on paused engine");

        let tick = self.clock.advance();
        let mut notes = vec![SimEvent::TickStarted { tick }];
        notes.append(&mut self.queued);

        // 1. Event lifecycle
        let participants = registry::participant_ids(input.buildings);
        let effects = self.events.tick(tick, &participants);
        notes.extend(self.events.take_notices());

        if effects.treasury_delta != 0.0 {
            notes.push(SimEvent::TreasuryAdjusted { tick, delta: effects.treasury_delta });
        }
        if !effects.buildings_to_rug.is_empty() {
            notes.push(SimEvent::BuildingsRugged {
                tick,
                building_ids: effects.buildings_to_rug.clone(),
            });
        }
        if !effects.buildings_to_shutdown.is_empty() {
            notes.push(SimEvent::BuildingsShutDown {
                tick,
                building_ids: effects.buildings_to_shutdown.clone(),
            });
        }

        // 2. Rug survival
        for ended in &effects.ended {
            let was_rug = self
                .events
                .definition(&ended.event_id)
                .is_some_and(|def| def.effects.rug_random_building);
            if was_rug {
                let total = self.objectives.record_rug_pull_survived();
                notes.push(SimEvent::RugPullSurvived { tick, total });
            }
        }

        // 3. Week rollover
        if self.objectives.roll_week(input.week_number) {
            notes.push(SimEvent::WeekRolledOver {
                tick,
                week_number: input.week_number,
                objective_ids: self
                    .objectives
                    .weekly()
                    .objectives
                    .iter()
                    .map(|o| o.objective_id.clone())
                    .collect(),
            });
        }

        // 4, 5. Tracking and progress
        self.objectives.update_tracking(tick, input.live);
        for objective_id in self.objectives.refresh_progress(input.live) {
            log::info!("tick={tick} objective completed: {objective_id}");
            notes.push(SimEvent::ObjectiveCompleted { tick, objective_id });
        }

        // 6. Win / lose
        if !self.outcome.is_decided() {
            let outcome = self.objectives.check_win_lose(input.live);
            if outcome.is_decided() {
                log::info!("tick={tick} game decided: {outcome:?}");
                self.outcome = outcome;
                notes.push(SimEvent::GameDecided { tick, outcome });
            }
        }

        notes.push(SimEvent::TickCompleted { tick });

        // 7. Snapshot
        if self.config.snapshot_interval_ticks > 0
            && tick.is_multiple_of(self.config.snapshot_interval_ticks)
        {
            self.save();
        }

        TickReport { tick, effects, events: notes, outcome: self.outcome }
    }

    /// Run n ticks with a fixed input. Used for testing and fast-forward.
    pub fn run_ticks(&mut self, n: u64, input: &TickInput) -> Vec<TickReport> {
        self.clock.resume();
        let reports = (0..n).map(|_| self.tick(input)).collect();
        self.clock.pause();
        reports
    }

    // ── Host-facing operations ───────────────────────────────────────────

    pub fn force_event(
        &mut self,
        event_id: &str,
        buildings: &[BuildingSnapshot],
    ) -> Option<ActiveEventInstance> {
        let participants = registry::participant_ids(buildings);
        self.events.force_trigger(event_id, &participants)
    }

    /// Claim a weekly objective. Persists only when something changed.
    pub fn claim_objective(&mut self, objective_id: &str) -> ClaimOutcome {
        let outcome = self.objectives.claim(objective_id);
        if outcome.claimed {
            self.queued.push(SimEvent::ObjectiveClaimed {
                tick:            self.clock.current_tick,
                objective_id:    objective_id.to_string(),
                treasury_reward: outcome.treasury_reward,
            });
            self.save();
        }
        outcome
    }

    /// Cached overlay for the current building snapshot. `version` should
    /// change whenever the registry's contents change.
    pub fn overlay(
        &mut self,
        overlay: OverlayType,
        buildings: &[BuildingSnapshot],
        grid_size: i32,
        version: u64,
    ) -> Arc<[TileEffectSample]> {
        let sources = registry::point_sources(buildings, overlay);
        self.overlays.get_cached(overlay, &sources, grid_size, version)
    }

    // ── Persistence ──────────────────────────────────────────────────────

    pub fn export_state(&self) -> SessionSnapshot {
        SessionSnapshot {
            version:    SNAPSHOT_VERSION,
            clock:      self.clock.clone(),
            events:     self.events.export_state(),
            objectives: self.objectives.export_state(),
            outcome:    self.outcome,
            queued:     self.queued.clone(),
        }
    }

    /// Replace session state. Expired events are dropped against the
    /// snapshot's own tick.
    pub fn import_state(&mut self, snapshot: SessionSnapshot) -> usize {
        let mut clock = snapshot.clock;
        clock.ticks_per_day = self.config.ticks_per_day;
        clock.paused = true;
        let restored = self.events.import_state(snapshot.events, clock.current_tick);
        self.objectives.import_state(snapshot.objectives);
        self.outcome = snapshot.outcome;
        self.queued = snapshot.queued;
        self.clock = clock;
        self.overlays.invalidate();
        restored
    }

    /// Best-effort write. Returns false (after logging) on failure.
    pub fn save(&mut self) -> bool {
        let tick = self.clock.current_tick;
        let result = self
            .export_state()
            .to_json()
            .map_err(SimError::from)
            .and_then(|blob| self.store.set(SESSION_KEY, &blob));
        match result {
            Ok(()) => {
                log::debug!("tick={tick} session saved");
                true
            }
            Err(e) => {
                log::warn!("tick={tick} session save failed: {e}");
                false
            }
        }
    }

    /// Restore from the store. A missing blob leaves the session as is; an
    /// unreadable or corrupt one resets to a fresh session. Returns true
    /// only when a snapshot was applied.
    pub fn load(&mut self) -> bool {
        let blob = match self.store.get(SESSION_KEY) {
            Ok(Some(blob)) => blob,
            Ok(None) => return false,
            Err(e) => {
                log::warn!("session load failed, starting fresh: {e}");
                self.reset();
                return false;
            }
        };
        match decode_session(&blob) {
            Ok(snapshot) => {
                let restored = self.import_state(snapshot);
                let tick = self.clock.current_tick;
                log::info!("tick={tick} session restored with {restored} active events");
                self.queued.push(SimEvent::SessionRestored { tick, active_events: restored });
                true
            }
            Err(e) => {
                log::warn!("{e}; starting fresh");
                self.reset();
                false
            }
        }
    }

    /// Raw read of the persisted blob (tooling and tests).
    pub fn stored_blob(&self) -> Option<String> {
        self.store.get(SESSION_KEY).ok().flatten()
    }
}

fn decode_session(blob: &str) -> SimResult<SessionSnapshot> {
    SessionSnapshot::from_json(blob).map_err(|reason| SimError::CorruptState {
        key: SESSION_KEY.to_string(),
        reason,
    })
}
