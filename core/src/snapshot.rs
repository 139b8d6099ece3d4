//! Snapshot serialization: session state to/from JSON.
//!
//! A snapshot is written every `snapshot_interval_ticks` and on demand.
//! It captures what is needed to resume a session without replaying:
//! active events (by definition id), cooldown bookkeeping, the event log,
//! weekly objectives, tracking accumulators, and forced-trigger effects
//! and notices that no tick has reported yet.
//!
//! Catalog entries are never cloned into a snapshot. Import resolves ids
//! against the live catalog.

use crate::{
    clock::SimClock,
    event::SimEvent,
    event_subsystem::EventLogRecord,
    objective_subsystem::{GameOutcome, LongLivedProgress, TrackingState, WeeklyState},
    types::{EntityId, Tick},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Bump when the layout changes incompatibly; older blobs load as fresh.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Storage key for the session blob.
pub const SESSION_KEY: &str = "cityfi.session";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActiveInstanceSnapshot {
    pub event_id:    String,
    pub instance_id: String,
    pub start_tick:  Tick,
    pub end_tick:    Tick,
    #[serde(default)]
    pub accumulated_delayed_value: f64,
    #[serde(default)]
    pub affected_building_ids: Vec<EntityId>,
    #[serde(default)]
    pub forced: bool,
}

/// Immediate effects of forced triggers that no tick has reported yet.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PendingEffectsSnapshot {
    pub treasury_delta:        f64,
    pub buildings_to_rug:      Vec<EntityId>,
    pub buildings_to_shutdown: Vec<EntityId>,
    pub started:               Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EventManagerSnapshot {
    pub active:         Vec<ActiveInstanceSnapshot>,
    pub last_triggered: BTreeMap<String, Tick>,
    #[serde(default)]
    pub log:            Vec<EventLogRecord>,
    #[serde(default)]
    pub pending:        PendingEffectsSnapshot,
    #[serde(default)]
    pub notices:        Vec<SimEvent>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ObjectiveSnapshot {
    pub weekly:     WeeklyState,
    pub long_lived: LongLivedProgress,
    pub tracking:   TrackingState,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSnapshot {
    pub version:    u32,
    pub clock:      SimClock,
    pub events:     EventManagerSnapshot,
    pub objectives: ObjectiveSnapshot,
    pub outcome:    GameOutcome,
    /// Session notices raised since the last tick.
    #[serde(default)]
    pub queued:     Vec<SimEvent>,
}

impl SessionSnapshot {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parse a stored blob. Any mismatch is reported as a reason string;
    /// callers treat it as corrupt state and start fresh.
    pub fn from_json(blob: &str) -> Result<Self, String> {
        let snapshot: SessionSnapshot = serde_json::from_str(blob).map_err(|e| e.to_string())?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(format!(
                "snapshot version {} (expected {SNAPSHOT_VERSION})",
                snapshot.version
            ));
        }
        Ok(snapshot)
    }
}
