//! Building registry adapter.
//!
//! The registry owns the grid. This core only reads a snapshot of it each
//! tick and turns per-building effect parameters into point sources.

use crate::{
    overlay::{EffectType, OverlayType, PointSource},
    types::{EntityId, GridPos, Tier},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SourceParams {
    pub magnitude: f64,
    pub radius:    i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildingEffects {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yield_boost: Option<SourceParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk:        Option<SourceParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protection:  Option<SourceParams>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildingSnapshot {
    pub id:       EntityId,
    pub position: GridPos,
    pub category: String,
    pub tier:     Tier,
    /// Shut-down buildings still occupy their tile but emit nothing and do
    /// not participate in events.
    #[serde(default = "default_true")]
    pub operational: bool,
    #[serde(default)]
    pub effects:  BuildingEffects,
}

fn default_true() -> bool { true }

impl BuildingSnapshot {
    fn source(&self, effect_type: EffectType, params: Option<SourceParams>) -> Option<PointSource> {
        params.map(|p| PointSource {
            position: self.position,
            effect_type,
            magnitude: p.magnitude,
            radius: p.radius,
        })
    }
}

/// Point sources feeding `overlay`.
pub fn point_sources(buildings: &[BuildingSnapshot], overlay: OverlayType) -> Vec<PointSource> {
    let live = buildings.iter().filter(|b| b.operational);
    match overlay {
        OverlayType::Yield => live
            .filter_map(|b| b.source(EffectType::Yield, b.effects.yield_boost))
            .collect(),
        OverlayType::Protection => live
            .filter_map(|b| b.source(EffectType::Protection, b.effects.protection))
            .collect(),
        OverlayType::Risk => live
            .flat_map(|b| {
                [
                    b.source(EffectType::Risk, b.effects.risk),
                    b.source(EffectType::Protection, b.effects.protection),
                ]
            })
            .flatten()
            .collect(),
        // Every building counts, shut down or not.
        OverlayType::Density => buildings
            .iter()
            .map(|b| PointSource {
                position: b.position,
                effect_type: EffectType::Presence,
                magnitude: 1.0,
                radius: 0,
            })
            .collect(),
    }
}

/// Ids eligible for event effects (rug, shutdown).
pub fn participant_ids(buildings: &[BuildingSnapshot]) -> Vec<EntityId> {
    buildings.iter().filter(|b| b.operational).map(|b| b.id.clone()).collect()
}

pub fn category_count(buildings: &[BuildingSnapshot]) -> usize {
    buildings.iter().map(|b| b.category.as_str()).collect::<BTreeSet<_>>().len()
}
