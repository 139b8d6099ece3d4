//! Economic event lifecycle: disasters and windfalls.
//!
//! This subsystem:
//!   1. Expires instances whose end tick has been reached (releases any
//!      delayed yield, closes the log record, notifies subscribers)
//!   2. On day boundaries, rolls definitions in catalog order; the first
//!      success wins the day
//!   3. Resolves one-shot effects (treasury damage/bonus, rug, shutdown)
//!      at trigger time
//!   4. Composes continuous effects over all active instances:
//!      multipliers multiply, deltas add
//!
//! Execution: every tick, first in the session order.
//! Depends on: the participant building list supplied by the registry.

use crate::{
    event::SimEvent,
    event_catalog::{EffectBundle, EventDefinition},
    rng::{EntropyRng, RollSource},
    snapshot::{ActiveInstanceSnapshot, EventManagerSnapshot, PendingEffectsSnapshot},
    types::{EntityId, Tick, Tier, TICKS_PER_DAY},
};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, VecDeque},
    sync::Arc,
};

/// Jitter applied around a definition's shutdown percentage.
pub const SHUTDOWN_JITTER: f64 = 0.05;

/// Most recent log records kept in memory and in snapshots.
pub const MAX_LOG_RECORDS: usize = 100;

// ── Public types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct ActiveEventInstance {
    pub definition:                Arc<EventDefinition>,
    pub instance_id:               String,
    pub start_tick:                Tick,
    pub end_tick:                  Tick,
    pub accumulated_delayed_value: f64,
    pub affected_building_ids:     Vec<EntityId>,
    pub forced:                    bool,
}

impl ActiveEventInstance {
    pub fn event_id(&self) -> &str {
        &self.definition.id
    }

    pub fn remaining_ticks(&self, tick: Tick) -> Tick {
        self.end_tick.saturating_sub(tick)
    }

    fn to_snapshot(&self) -> ActiveInstanceSnapshot {
        ActiveInstanceSnapshot {
            event_id:                  self.definition.id.clone(),
            instance_id:               self.instance_id.clone(),
            start_tick:                self.start_tick,
            end_tick:                  self.end_tick,
            accumulated_delayed_value: self.accumulated_delayed_value,
            affected_building_ids:     self.affected_building_ids.clone(),
            forced:                    self.forced,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExpiredEvent {
    pub event_id:               String,
    pub instance_id:            String,
    pub released_delayed_value: f64,
}

/// Everything the economy needs to apply after one `tick()`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickOutcome {
    pub treasury_delta:         f64,
    pub buildings_to_rug:       Vec<EntityId>,
    pub buildings_to_shutdown:  Vec<EntityId>,
    pub released_delayed_value: f64,
    /// Instance ids started during this tick (including queued forced ones).
    pub started:                Vec<String>,
    pub ended:                  Vec<ExpiredEvent>,
}

impl TickOutcome {
    fn absorb(&mut self, other: TickOutcome) {
        self.treasury_delta += other.treasury_delta;
        self.buildings_to_rug.extend(other.buildings_to_rug);
        self.buildings_to_shutdown.extend(other.buildings_to_shutdown);
        self.released_delayed_value += other.released_delayed_value;
        self.started.extend(other.started);
        self.ended.extend(other.ended);
    }

    pub fn is_empty(&self) -> bool {
        *self == TickOutcome::default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventLogRecord {
    pub instance_id:        String,
    pub event_id:           String,
    pub start_tick:         Tick,
    pub scheduled_end_tick: Tick,
    pub closed_at:          Option<Tick>,
    pub forced:             bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub type EventCallback = Box<dyn FnMut(&SimEvent) + Send>;

// ── Manager ──────────────────────────────────────────────────────────────────

pub struct EventLifecycleManager {
    catalog:           Vec<Arc<EventDefinition>>,
    ticks_per_day:     Tick,
    current_tick:      Tick,
    active:            Vec<ActiveEventInstance>,
    last_triggered:    BTreeMap<String, Tick>,
    log:               VecDeque<EventLogRecord>,
    /// Immediate effects of forced triggers, folded into the next tick().
    pending:           TickOutcome,
    rng:               Box<dyn RollSource>,
    subscribers:       Vec<(SubscriptionId, EventCallback)>,
    next_subscription: u64,
    notices:           Vec<SimEvent>,
}

impl EventLifecycleManager {
    pub fn new(catalog: Vec<EventDefinition>, ticks_per_day: Tick) -> Self {
        Self {
            catalog: catalog.into_iter().map(Arc::new).collect(),
            ticks_per_day: ticks_per_day.max(1),
            current_tick: 0,
            active: Vec::new(),
            last_triggered: BTreeMap::new(),
            log: VecDeque::new(),
            pending: TickOutcome::default(),
            rng: Box::new(EntropyRng::new()),
            subscribers: Vec::new(),
            next_subscription: 0,
            notices: Vec::new(),
        }
    }

    /// Replace the general-purpose draw source (seeded runs and tests).
    pub fn with_roll_source(mut self, rng: Box<dyn RollSource>) -> Self {
        self.rng = rng;
        self
    }

    pub fn ticks_per_day(&self) -> Tick {
        self.ticks_per_day
    }

    pub fn catalog(&self) -> impl Iterator<Item = &EventDefinition> {
        self.catalog.iter().map(|d| d.as_ref())
    }

    pub fn definition(&self, event_id: &str) -> Option<&Arc<EventDefinition>> {
        self.catalog.iter().find(|d| d.id == event_id)
    }

    /// Drop all run state. Catalog, roll source and subscribers survive.
    pub fn reset(&mut self) {
        self.current_tick = 0;
        self.active.clear();
        self.last_triggered.clear();
        self.log.clear();
        self.pending = TickOutcome::default();
        self.notices.clear();
    }

    // ── Per-tick lifecycle ───────────────────────────────────────────────

    /// Advance the lifecycle to `current_tick`. Call exactly once per step.
    pub fn tick(&mut self, current_tick: Tick, participants: &[EntityId]) -> TickOutcome {
        self.current_tick = current_tick;
        let mut outcome = std::mem::take(&mut self.pending);

        self.expire(current_tick, &mut outcome);

        if current_tick.is_multiple_of(self.ticks_per_day) {
            if let Some(def) = self.roll_daily(current_tick) {
                self.trigger(def, current_tick, participants, false, &mut outcome);
            }
        }

        outcome
    }

    /// Start `event_id` now, skipping the probability roll and cooldown.
    /// Returns None for unknown ids. Immediate effects surface in the next
    /// `tick()` outcome.
    pub fn force_trigger(
        &mut self,
        event_id: &str,
        participants: &[EntityId],
    ) -> Option<ActiveEventInstance> {
        self.force_trigger_at(event_id, self.current_tick, participants)
    }

    pub fn force_trigger_at(
        &mut self,
        event_id: &str,
        tick: Tick,
        participants: &[EntityId],
    ) -> Option<ActiveEventInstance> {
        let Some(def) = self.definition(event_id).cloned() else {
            log::warn!("tick={tick} force_trigger: unknown event '{event_id}'");
            return None;
        };
        let mut queued = std::mem::take(&mut self.pending);
        let instance = self.trigger(def, tick, participants, true, &mut queued);
        self.pending = queued;
        Some(instance)
    }

    fn expire(&mut self, tick: Tick, outcome: &mut TickOutcome) {
        let (expired, remaining): (Vec<_>, Vec<_>) = std::mem::take(&mut self.active)
            .into_iter()
            .partition(|inst| inst.end_tick <= tick);
        self.active = remaining;

        for inst in expired {
            outcome.released_delayed_value += inst.accumulated_delayed_value;
            self.close_log(&inst.instance_id, tick);

            log::info!(
                "tick={tick} event ended: {} ({}) after {} ticks",
                inst.definition.name,
                inst.instance_id,
                tick.saturating_sub(inst.start_tick)
            );

            outcome.ended.push(ExpiredEvent {
                event_id:               inst.definition.id.clone(),
                instance_id:            inst.instance_id.clone(),
                released_delayed_value: inst.accumulated_delayed_value,
            });
            self.notify(SimEvent::EconomicEventEnded {
                tick,
                event_id:               inst.definition.id.clone(),
                instance_id:            inst.instance_id,
                released_delayed_value: inst.accumulated_delayed_value,
            });
        }
    }

    /// Scan the catalog in order. At most one definition wins per day.
    fn roll_daily(&mut self, tick: Tick) -> Option<Arc<EventDefinition>> {
        let mut rolled = 0usize;
        for def in &self.catalog {
            if self.active.iter().any(|i| i.definition.id == def.id) {
                continue;
            }
            if self.in_cooldown(def, tick) {
                continue;
            }
            rolled += 1;
            if self.rng.chance(def.daily_probability) {
                log::debug!("tick={tick} daily roll: '{}' won after {rolled} rolls", def.id);
                return Some(Arc::clone(def));
            }
        }
        log::debug!("tick={tick} daily roll: no event ({rolled} eligible)");
        None
    }

    /// Cooldown runs from the last trigger, not the last expiry.
    fn in_cooldown(&self, def: &EventDefinition, tick: Tick) -> bool {
        let cooldown_ticks = def.cooldown_days as Tick * self.ticks_per_day;
        self.last_triggered
            .get(&def.id)
            .is_some_and(|&last| tick.saturating_sub(last) < cooldown_ticks)
    }

    pub fn cooldown_remaining(&self, event_id: &str, tick: Tick) -> Tick {
        let Some(def) = self.definition(event_id) else { return 0 };
        let cooldown_ticks = def.cooldown_days as Tick * self.ticks_per_day;
        self.last_triggered
            .get(event_id)
            .map(|&last| cooldown_ticks.saturating_sub(tick.saturating_sub(last)))
            .unwrap_or(0)
    }

    fn trigger(
        &mut self,
        def: Arc<EventDefinition>,
        tick: Tick,
        participants: &[EntityId],
        forced: bool,
        outcome: &mut TickOutcome,
    ) -> ActiveEventInstance {
        // Zero-day definitions still last one tick so end > start holds.
        let duration = (def.duration_days as Tick * self.ticks_per_day).max(1);
        let mut instance = ActiveEventInstance {
            definition:                Arc::clone(&def),
            instance_id:               uuid::Uuid::new_v4().to_string(),
            start_tick:                tick,
            end_tick:                  tick + duration,
            accumulated_delayed_value: 0.0,
            affected_building_ids:     Vec::new(),
            forced,
        };

        let mut immediate = TickOutcome::default();
        self.resolve_immediate(&def.effects, participants, &mut instance, &mut immediate);
        immediate.started.push(instance.instance_id.clone());
        outcome.absorb(immediate);

        self.last_triggered.insert(def.id.clone(), tick);
        self.open_log(&instance);

        log::info!(
            "tick={tick} event started: {} ({:?}, {:?}) until tick {}{}",
            def.name,
            def.severity,
            def.polarity,
            instance.end_tick,
            if forced { " [forced]" } else { "" }
        );

        self.notify(SimEvent::EconomicEventStarted {
            tick,
            event_id:    def.id.clone(),
            instance_id: instance.instance_id.clone(),
            name:        def.name.clone(),
            polarity:    def.polarity,
            end_tick:    instance.end_tick,
            forced,
        });

        self.active.push(instance.clone());
        instance
    }

    fn resolve_immediate(
        &mut self,
        effects: &EffectBundle,
        participants: &[EntityId],
        instance: &mut ActiveEventInstance,
        outcome: &mut TickOutcome,
    ) {
        if let Some(damage) = effects.treasury_damage {
            outcome.treasury_delta -= damage;
        }

        if let Some(range) = effects.treasury_bonus_range {
            let (lo, hi) = if range.min <= range.max {
                (range.min, range.max)
            } else {
                (range.max, range.min)
            };
            outcome.treasury_delta += self.rng.range(lo, hi);
        }

        if effects.rug_random_building && !participants.is_empty() {
            let idx = self.rng.next_u64_below(participants.len() as u64) as usize;
            let victim = participants[idx].clone();
            instance.affected_building_ids.push(victim.clone());
            outcome.buildings_to_rug.push(victim);
        }

        if let Some(target) = effects.building_shutdown_percent {
            let shut = self.pick_shutdowns(target, participants);
            instance.affected_building_ids.extend(shut.iter().cloned());
            outcome.buildings_to_shutdown.extend(shut);
        }
    }

    /// Choose `round(n × jittered%)` distinct participants.
    fn pick_shutdowns(&mut self, target: f64, participants: &[EntityId]) -> Vec<EntityId> {
        if participants.is_empty() {
            return Vec::new();
        }
        let pct = (target + self.rng.range(-SHUTDOWN_JITTER, SHUTDOWN_JITTER)).clamp(0.0, 1.0);
        let count = ((participants.len() as f64 * pct).round() as usize).min(participants.len());

        // Partial Fisher-Yates over indices.
        let mut indices: Vec<usize> = (0..participants.len()).collect();
        for i in 0..count {
            let remaining = (indices.len() - i) as u64;
            let j = i + self.rng.next_u64_below(remaining) as usize;
            indices.swap(i, j);
        }
        indices[..count].iter().map(|&i| participants[i].clone()).collect()
    }

    // ── Continuous effects ───────────────────────────────────────────────

    pub fn is_active(&self, event_id: &str) -> bool {
        self.active.iter().any(|i| i.definition.id == event_id)
    }

    pub fn active_instances(&self) -> &[ActiveEventInstance] {
        &self.active
    }

    pub fn aggregate_yield_multiplier(&self) -> f64 {
        self.active
            .iter()
            .filter_map(|i| i.definition.effects.yield_multiplier)
            .product()
    }

    /// Product of every active tier boost aimed at `tier`.
    pub fn tier_yield_multiplier(&self, tier: Tier) -> f64 {
        self.active
            .iter()
            .filter_map(|i| i.definition.effects.tier_yield_boost)
            .filter(|boost| boost.tier == tier)
            .map(|boost| boost.multiplier)
            .product()
    }

    pub fn aggregate_sentiment_delta(&self) -> f64 {
        self.active
            .iter()
            .filter_map(|i| i.definition.effects.sentiment_impact)
            .sum()
    }

    pub fn cost_multiplier(&self) -> f64 {
        self.active
            .iter()
            .filter_map(|i| i.definition.effects.cost_multiplier)
            .product()
    }

    pub fn prestige_multiplier(&self) -> f64 {
        self.active
            .iter()
            .filter_map(|i| i.definition.effects.prestige_multiplier)
            .product()
    }

    pub fn are_yields_delayed(&self) -> bool {
        self.active.iter().any(|i| i.definition.effects.delay_yields)
    }

    /// Park `amount` on the oldest delaying instance until it expires.
    /// Returns false (and parks nothing) when no delay is active.
    pub fn defer_yield(&mut self, amount: f64) -> bool {
        match self.active.iter_mut().find(|i| i.definition.effects.delay_yields) {
            Some(inst) => {
                inst.accumulated_delayed_value += amount;
                true
            }
            None => false,
        }
    }

    pub fn pending_delayed_value(&self) -> f64 {
        self.active.iter().map(|i| i.accumulated_delayed_value).sum()
    }

    // ── Subscribers ──────────────────────────────────────────────────────

    pub fn subscribe(&mut self, callback: EventCallback) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscribers.push((id, callback));
        id
    }

    /// Returns false if the subscription was already gone.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    /// Drain start/end notices accumulated since the last call.
    pub fn take_notices(&mut self) -> Vec<SimEvent> {
        std::mem::take(&mut self.notices)
    }

    fn notify(&mut self, event: SimEvent) {
        for (_, callback) in &mut self.subscribers {
            callback(&event);
        }
        self.notices.push(event);
    }

    // ── Event log ────────────────────────────────────────────────────────

    pub fn event_log(&self) -> impl Iterator<Item = &EventLogRecord> {
        self.log.iter()
    }

    fn open_log(&mut self, instance: &ActiveEventInstance) {
        self.log.push_back(EventLogRecord {
            instance_id:        instance.instance_id.clone(),
            event_id:           instance.definition.id.clone(),
            start_tick:         instance.start_tick,
            scheduled_end_tick: instance.end_tick,
            closed_at:          None,
            forced:             instance.forced,
        });
        while self.log.len() > MAX_LOG_RECORDS {
            self.log.pop_front();
        }
    }

    fn close_log(&mut self, instance_id: &str, tick: Tick) {
        if let Some(record) = self.log.iter_mut().rev().find(|r| r.instance_id == instance_id) {
            record.closed_at = Some(tick);
        }
    }

    // ── Snapshot ─────────────────────────────────────────────────────────

    pub fn export_state(&self) -> EventManagerSnapshot {
        EventManagerSnapshot {
            active:         self.active.iter().map(ActiveEventInstance::to_snapshot).collect(),
            last_triggered: self.last_triggered.clone(),
            log:            self.log.iter().cloned().collect(),
            pending:        PendingEffectsSnapshot {
                treasury_delta:        self.pending.treasury_delta,
                buildings_to_rug:      self.pending.buildings_to_rug.clone(),
                buildings_to_shutdown: self.pending.buildings_to_shutdown.clone(),
                started:               self.pending.started.clone(),
            },
            notices:        self.notices.clone(),
        }
    }

    /// Replace run state from a snapshot taken earlier. Instances that have
    /// already expired by `current_tick`, or whose definition is no longer
    /// in the catalog, are dropped. Returns the number restored.
    pub fn import_state(&mut self, snapshot: EventManagerSnapshot, current_tick: Tick) -> usize {
        self.active.clear();
        self.current_tick = current_tick;
        self.pending = TickOutcome {
            treasury_delta:        snapshot.pending.treasury_delta,
            buildings_to_rug:      snapshot.pending.buildings_to_rug,
            buildings_to_shutdown: snapshot.pending.buildings_to_shutdown,
            started:               snapshot.pending.started,
            ..TickOutcome::default()
        };
        self.notices = snapshot.notices;

        for snap in snapshot.active {
            if snap.end_tick <= current_tick {
                log::debug!(
                    "tick={current_tick} import: dropping expired instance {} ({})",
                    snap.instance_id, snap.event_id
                );
                continue;
            }
            if snap.end_tick <= snap.start_tick {
                log::warn!("tick={current_tick} import: malformed instance {}", snap.instance_id);
                continue;
            }
            let Some(def) = self.definition(&snap.event_id).cloned() else {
                log::warn!(
                    "tick={current_tick} import: unknown event '{}' in snapshot",
                    snap.event_id
                );
                continue;
            };
            self.active.push(ActiveEventInstance {
                definition:                def,
                instance_id:               snap.instance_id,
                start_tick:                snap.start_tick,
                end_tick:                  snap.end_tick,
                accumulated_delayed_value: snap.accumulated_delayed_value,
                affected_building_ids:     snap.affected_building_ids,
                forced:                    snap.forced,
            });
        }

        self.last_triggered = snapshot.last_triggered;
        self.log = snapshot.log.into_iter().collect();
        while self.log.len() > MAX_LOG_RECORDS {
            self.log.pop_front();
        }
        self.active.len()
    }
}

impl Default for EventLifecycleManager {
    fn default() -> Self {
        Self::new(crate::event_catalog::builtin_event_catalog(), TICKS_PER_DAY)
    }
}
