//! Weekly objectives, run tracking, and win/lose evaluation.
//!
//! This subsystem:
//!   1. Selects three weekly objectives (easy/medium/hard) from a sequence
//!      seeded only by the week number, so every reload agrees
//!   2. Resets the weekly set when the week number changes, keeping the
//!      long-lived accumulators (rug pulls survived, happiness streak)
//!   3. Tracks consecutive-tick counters and monotonic peaks every tick
//!   4. Recomputes objective progress and handles idempotent claims
//!   5. Evaluates win conditions, then lose conditions; first match wins
//!
//! Execution: every tick, after the event subsystem.
//! Depends on: live game state; rug survival is reported by the session.

use crate::{
    objective_catalog::{Difficulty, ObjectiveDefinition, ObjectivePools, ObjectiveType},
    rng::{weekly_lcg_factory, SequenceFactory},
    snapshot::ObjectiveSnapshot,
    types::{Tick, TICKS_PER_DAY},
};
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

// ── Public types ─────────────────────────────────────────────────────────────

/// Live values supplied by the simulation loop each tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveState {
    pub population:     u64,
    /// Percent, 0-100.
    pub happiness:      f64,
    pub treasury:       f64,
    pub tvl:            f64,
    pub building_count: usize,
    pub category_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackingState {
    pub game_days:                       u64,
    pub consecutive_bankruptcy_ticks:    u64,
    pub consecutive_low_happiness_ticks: u64,
    pub peak_tvl:                        f64,
    pub peak_population:                 u64,
    pub peak_buildings:                  usize,
    pub had_any_buildings:               bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveInstance {
    pub objective_id: String,
    /// Percent, 0-100.
    pub progress:     f64,
    pub completed:    bool,
    pub claimed:      bool,
}

impl ObjectiveInstance {
    pub fn new(objective_id: impl Into<String>) -> Self {
        Self { objective_id: objective_id.into(), progress: 0.0, completed: false, claimed: false }
    }
}

/// Resets whenever the week number changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeeklyState {
    pub week_number:  u64,
    pub objectives:   Vec<ObjectiveInstance>,
    /// `rug_pulls_survived` when this week began.
    pub rug_baseline: u32,
}

/// Survives week rollover.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LongLivedProgress {
    pub rug_pulls_survived:    u32,
    pub happiness_streak_days: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WinLoseRules {
    /// Zero or less disables the condition.
    pub tvl_win_target:              f64,
    pub population_win_target:       u64,
    pub bankruptcy_ticks_to_lose:    u64,
    pub low_happiness_floor:         f64,
    pub low_happiness_ticks_to_lose: u64,
}

impl Default for WinLoseRules {
    fn default() -> Self {
        Self {
            tvl_win_target:              10_000_000.0,
            population_win_target:       10_000,
            bankruptcy_ticks_to_lose:    3 * TICKS_PER_DAY,
            low_happiness_floor:         20.0,
            low_happiness_ticks_to_lose: 2 * TICKS_PER_DAY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WinCondition {
    TvlTarget,
    PopulationTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoseCondition {
    Bankruptcy,
    Unrest,
    Abandoned,
}

/// Evaluation order. Append only.
pub const WIN_ORDER: [WinCondition; 2] = [WinCondition::TvlTarget, WinCondition::PopulationTarget];
pub const LOSE_ORDER: [LoseCondition; 3] =
    [LoseCondition::Bankruptcy, LoseCondition::Unrest, LoseCondition::Abandoned];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "status", content = "condition", rename_all = "snake_case")]
pub enum GameOutcome {
    #[default]
    InProgress,
    Won(WinCondition),
    Lost(LoseCondition),
}

impl GameOutcome {
    pub fn is_decided(&self) -> bool {
        !matches!(self, GameOutcome::InProgress)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClaimOutcome {
    pub treasury_reward: f64,
    /// False when nothing changed (unknown, incomplete or already claimed).
    pub claimed:         bool,
}

/// Everything progress is measured from.
#[derive(Debug, Clone, Copy)]
pub struct ProgressInputs<'a> {
    pub live:         &'a LiveState,
    pub long_lived:   &'a LongLivedProgress,
    pub rug_baseline: u32,
}

/// ISO year × 100 + ISO week, e.g. 202642.
pub fn week_number_for(now: DateTime<Utc>) -> u64 {
    let iso = now.iso_week();
    iso.year().max(0) as u64 * 100 + iso.week() as u64
}

// ── Pure evaluation ──────────────────────────────────────────────────────────

fn measured_value(objective_type: ObjectiveType, inputs: &ProgressInputs) -> f64 {
    let live = inputs.live;
    match objective_type {
        ObjectiveType::ReachPopulation    => live.population as f64,
        ObjectiveType::ReachTvl           => live.tvl,
        ObjectiveType::ReachTreasury      => live.treasury.max(0.0),
        ObjectiveType::OwnBuildings       => live.building_count as f64,
        ObjectiveType::ReachHappiness     => live.happiness,
        ObjectiveType::BuildingCategories => live.category_count as f64,
        ObjectiveType::SurviveRugPulls => {
            inputs.long_lived.rug_pulls_survived.saturating_sub(inputs.rug_baseline) as f64
        }
        ObjectiveType::HappinessStreak => inputs.long_lived.happiness_streak_days as f64,
    }
}

/// Recompute progress for every unclaimed objective. Progress tracks the
/// live value; completion is sticky and never reverts once reached.
pub fn update_progress(
    objectives: &[ObjectiveInstance],
    pools: &ObjectivePools,
    inputs: &ProgressInputs,
) -> Vec<ObjectiveInstance> {
    objectives
        .iter()
        .map(|inst| {
            if inst.claimed {
                return inst.clone();
            }
            let Some(def) = pools.find(&inst.objective_id) else {
                return inst.clone();
            };
            let required = def.required_value();
            let progress = if required <= 0.0 {
                100.0
            } else {
                (measured_value(def.objective_type, inputs) / required * 100.0).clamp(0.0, 100.0)
            };
            ObjectiveInstance {
                objective_id: inst.objective_id.clone(),
                progress,
                completed: inst.completed || progress >= 100.0,
                claimed: false,
            }
        })
        .collect()
}

fn win_holds(condition: WinCondition, live: &LiveState, rules: &WinLoseRules) -> bool {
    match condition {
        WinCondition::TvlTarget => rules.tvl_win_target > 0.0 && live.tvl >= rules.tvl_win_target,
        WinCondition::PopulationTarget => {
            rules.population_win_target > 0 && live.population >= rules.population_win_target
        }
    }
}

fn lose_holds(
    condition: LoseCondition,
    tracking: &TrackingState,
    live: &LiveState,
    rules: &WinLoseRules,
) -> bool {
    match condition {
        LoseCondition::Bankruptcy => {
            rules.bankruptcy_ticks_to_lose > 0
                && tracking.consecutive_bankruptcy_ticks >= rules.bankruptcy_ticks_to_lose
        }
        LoseCondition::Unrest => {
            rules.low_happiness_ticks_to_lose > 0
                && tracking.consecutive_low_happiness_ticks >= rules.low_happiness_ticks_to_lose
        }
        LoseCondition::Abandoned => tracking.had_any_buildings && live.building_count == 0,
    }
}

/// Wins before losses, each in fixed order; the first match decides.
pub fn check_win_lose(tracking: &TrackingState, live: &LiveState, rules: &WinLoseRules) -> GameOutcome {
    if let Some(win) = WIN_ORDER.into_iter().find(|&c| win_holds(c, live, rules)) {
        return GameOutcome::Won(win);
    }
    if let Some(loss) = LOSE_ORDER.into_iter().find(|&c| lose_holds(c, tracking, live, rules)) {
        return GameOutcome::Lost(loss);
    }
    GameOutcome::InProgress
}

// ── Tracker ──────────────────────────────────────────────────────────────────

pub struct ObjectiveTracker {
    pools:         ObjectivePools,
    rules:         WinLoseRules,
    ticks_per_day: Tick,
    weekly:        WeeklyState,
    long_lived:    LongLivedProgress,
    tracking:      TrackingState,
    sequence:      SequenceFactory,
}

impl ObjectiveTracker {
    pub fn new(pools: ObjectivePools, rules: WinLoseRules, ticks_per_day: Tick) -> Self {
        Self {
            pools,
            rules,
            ticks_per_day: ticks_per_day.max(1),
            weekly: WeeklyState::default(),
            long_lived: LongLivedProgress::default(),
            tracking: TrackingState::default(),
            sequence: weekly_lcg_factory(),
        }
    }

    /// Swap the weekly sequence generator (tests, alternative seeding).
    pub fn with_sequence(mut self, sequence: SequenceFactory) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn pools(&self) -> &ObjectivePools             { &self.pools }
    pub fn rules(&self) -> &WinLoseRules               { &self.rules }
    pub fn weekly(&self) -> &WeeklyState               { &self.weekly }
    pub fn long_lived(&self) -> &LongLivedProgress     { &self.long_lived }
    pub fn tracking(&self) -> &TrackingState           { &self.tracking }

    pub fn reset(&mut self) {
        self.weekly = WeeklyState::default();
        self.long_lived = LongLivedProgress::default();
        self.tracking = TrackingState::default();
    }

    /// The week's [easy, medium, hard] picks. Same week, same picks.
    /// An empty pool is skipped.
    pub fn select_weekly(&self, week_number: u64) -> Vec<ObjectiveDefinition> {
        let mut sequence = (self.sequence)(week_number);
        let mut picks = Vec::with_capacity(Difficulty::ALL.len());
        for difficulty in Difficulty::ALL {
            let pool = self.pools.pool(difficulty);
            if pool.is_empty() {
                log::warn!("week={week_number} objective pool {difficulty:?} is empty");
                continue;
            }
            let idx = sequence.next_u64_below(pool.len() as u64) as usize;
            picks.push(pool[idx].clone());
        }
        picks
    }

    /// Start a fresh weekly set if `current_week` differs from the stored
    /// one. Long-lived accumulators are untouched. Returns true on rollover.
    pub fn roll_week(&mut self, current_week: u64) -> bool {
        if self.weekly.week_number == current_week && !self.weekly.objectives.is_empty() {
            return false;
        }
        let picks = self.select_weekly(current_week);
        log::info!(
            "week={current_week} objectives rolled over (was week {}): {}",
            self.weekly.week_number,
            picks.iter().map(|d| d.id.as_str()).collect::<Vec<_>>().join(", ")
        );
        self.weekly = WeeklyState {
            week_number:  current_week,
            objectives:   picks.iter().map(|d| ObjectiveInstance::new(d.id.clone())).collect(),
            rug_baseline: self.long_lived.rug_pulls_survived,
        };
        true
    }

    /// Once per tick. Counters reset the instant their condition clears.
    pub fn update_tracking(&mut self, tick: Tick, live: &LiveState) {
        let t = &mut self.tracking;
        t.game_days = tick / self.ticks_per_day;

        if live.treasury < 0.0 {
            t.consecutive_bankruptcy_ticks += 1;
        } else {
            t.consecutive_bankruptcy_ticks = 0;
        }

        if live.happiness < self.rules.low_happiness_floor {
            t.consecutive_low_happiness_ticks += 1;
        } else {
            t.consecutive_low_happiness_ticks = 0;
        }

        t.peak_tvl = t.peak_tvl.max(live.tvl);
        t.peak_population = t.peak_population.max(live.population);
        t.peak_buildings = t.peak_buildings.max(live.building_count);
        t.had_any_buildings |= live.building_count > 0;

        if tick > 0 && tick.is_multiple_of(self.ticks_per_day) {
            if live.happiness >= self.pools.happiness_streak_floor {
                self.long_lived.happiness_streak_days += 1;
            } else {
                self.long_lived.happiness_streak_days = 0;
            }
        }
    }

    pub fn record_rug_pull_survived(&mut self) -> u32 {
        self.long_lived.rug_pulls_survived += 1;
        self.long_lived.rug_pulls_survived
    }

    /// Recompute this week's progress. Returns ids that completed just now.
    pub fn refresh_progress(&mut self, live: &LiveState) -> Vec<String> {
        let inputs = ProgressInputs {
            live,
            long_lived: &self.long_lived,
            rug_baseline: self.weekly.rug_baseline,
        };
        let updated = update_progress(&self.weekly.objectives, &self.pools, &inputs);
        let newly_completed = updated
            .iter()
            .zip(&self.weekly.objectives)
            .filter(|(new, old)| new.completed && !old.completed)
            .map(|(new, _)| new.objective_id.clone())
            .collect();
        self.weekly.objectives = updated;
        newly_completed
    }

    /// Claim a completed objective's reward once. Any other call is a no-op
    /// returning a zero reward.
    pub fn claim(&mut self, objective_id: &str) -> ClaimOutcome {
        let Some(inst) = self.weekly.objectives.iter_mut().find(|o| o.objective_id == objective_id)
        else {
            return ClaimOutcome::default();
        };
        if !inst.completed || inst.claimed {
            return ClaimOutcome::default();
        }
        let Some(def) = self.pools.find(objective_id) else {
            return ClaimOutcome::default();
        };
        inst.claimed = true;
        log::info!("objective claimed: {} (+{:.0})", def.id, def.treasury_reward);
        ClaimOutcome { treasury_reward: def.treasury_reward, claimed: true }
    }

    pub fn check_win_lose(&self, live: &LiveState) -> GameOutcome {
        check_win_lose(&self.tracking, live, &self.rules)
    }

    pub fn export_state(&self) -> ObjectiveSnapshot {
        ObjectiveSnapshot {
            weekly:     self.weekly.clone(),
            long_lived: self.long_lived.clone(),
            tracking:   self.tracking.clone(),
        }
    }

    /// Restore from a snapshot, normalising `claimed ⇒ completed ⇒ 100%`.
    pub fn import_state(&mut self, snapshot: ObjectiveSnapshot) {
        let mut weekly = snapshot.weekly;
        for inst in &mut weekly.objectives {
            inst.completed |= inst.claimed;
            if inst.completed {
                inst.progress = 100.0;
            }
            inst.progress = inst.progress.clamp(0.0, 100.0);
        }
        self.weekly = weekly;
        self.long_lived = snapshot.long_lived;
        self.tracking = snapshot.tracking;
    }
}

impl Default for ObjectiveTracker {
    fn default() -> Self {
        Self::new(ObjectivePools::default(), WinLoseRules::default(), TICKS_PER_DAY)
    }
}
