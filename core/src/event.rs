//! The notification stream: everything the session reports outward.
//!
//! Event-manager subscribers receive the `EconomicEvent*` variants as they
//! happen; `SimEngine::tick` returns the full list for the tick so the UI
//! notification layer can render toasts without polling component state.

use crate::{
    event_catalog::Polarity,
    objective_subsystem::GameOutcome,
    types::{EntityId, Tick},
};
use serde::{Deserialize, Serialize};

/// Every notification emitted during simulation.
/// Variants are appended, never removed or reordered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SimEvent {
    // ── Engine events ──────────────────────────────
    TickStarted {
        tick: Tick,
    },
    TickCompleted {
        tick: Tick,
    },
    SessionRestored {
        tick: Tick,
        active_events: usize,
    },

    // ── Economic events ────────────────────────────
    EconomicEventStarted {
        tick:        Tick,
        event_id:    String,
        instance_id: String,
        name:        String,
        polarity:    Polarity,
        end_tick:    Tick,
        forced:      bool,
    },
    EconomicEventEnded {
        tick:                   Tick,
        event_id:               String,
        instance_id:            String,
        released_delayed_value: f64,
    },
    BuildingsRugged {
        tick:         Tick,
        building_ids: Vec<EntityId>,
    },
    BuildingsShutDown {
        tick:         Tick,
        building_ids: Vec<EntityId>,
    },
    TreasuryAdjusted {
        tick:  Tick,
        delta: f64,
    },
    RugPullSurvived {
        tick:  Tick,
        total: u32,
    },

    // ── Objective events ───────────────────────────
    WeekRolledOver {
        tick:          Tick,
        week_number:   u64,
        objective_ids: Vec<String>,
    },
    ObjectiveCompleted {
        tick:         Tick,
        objective_id: String,
    },
    ObjectiveClaimed {
        tick:            Tick,
        objective_id:    String,
        treasury_reward: f64,
    },
    GameDecided {
        tick:    Tick,
        outcome: GameOutcome,
    },
}

impl SimEvent {
    /// Stable string name for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            SimEvent::TickStarted { .. }          => "tick_started",
            SimEvent::TickCompleted { .. }        => "tick_completed",
            SimEvent::SessionRestored { .. }      => "session_restored",
            SimEvent::EconomicEventStarted { .. } => "economic_event_started",
            SimEvent::EconomicEventEnded { .. }   => "economic_event_ended",
            SimEvent::BuildingsRugged { .. }      => "buildings_rugged",
            SimEvent::BuildingsShutDown { .. }    => "buildings_shut_down",
            SimEvent::TreasuryAdjusted { .. }     => "treasury_adjusted",
            SimEvent::RugPullSurvived { .. }      => "rug_pull_survived",
            SimEvent::WeekRolledOver { .. }       => "week_rolled_over",
            SimEvent::ObjectiveCompleted { .. }   => "objective_completed",
            SimEvent::ObjectiveClaimed { .. }     => "objective_claimed",
            SimEvent::GameDecided { .. }          => "game_decided",
        }
    }
}
