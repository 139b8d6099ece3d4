use crate::{
    event_catalog::{builtin_event_catalog, EventDefinition},
    objective_catalog::{builtin_objective_pools, Difficulty, ObjectivePools},
    objective_subsystem::WinLoseRules,
    overlay::OverlaySettings,
    types::{Tick, TICKS_PER_DAY},
};
use serde::{Deserialize, Serialize};

/// Ticks between automatic snapshots (one game day).
pub const DEFAULT_SNAPSHOT_INTERVAL: Tick = TICKS_PER_DAY;

#[derive(Debug, Clone, Deserialize)]
struct EventCatalogFile {
    events: Vec<EventDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EconomyConfig {
    pub ticks_per_day:           Tick,
    pub snapshot_interval_ticks: Tick,
    pub events:                  Vec<EventDefinition>,
    pub overlays:                OverlaySettings,
    pub objectives:              ObjectivePools,
    pub rules:                   WinLoseRules,
}

impl EconomyConfig {
    /// The shipped catalog and balance values.
    pub fn builtin() -> Self {
        Self {
            ticks_per_day:           TICKS_PER_DAY,
            snapshot_interval_ticks: DEFAULT_SNAPSHOT_INTERVAL,
            events:                  builtin_event_catalog(),
            overlays:                OverlaySettings::default(),
            objectives:              builtin_objective_pools(),
            rules:                   WinLoseRules::default(),
        }
    }

    /// Load from the data/ directory.
    /// In tests, use EconomyConfig::builtin().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let events_path = format!("{data_dir}/events/event_catalog.json");
        let events_content = std::fs::read_to_string(&events_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {events_path}: {e}"))?;
        let events_file: EventCatalogFile = serde_json::from_str(&events_content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {events_path}: {e}"))?;

        let overlay_path = format!("{data_dir}/overlays/overlay_scales.json");
        let overlay_content = std::fs::read_to_string(&overlay_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {overlay_path}: {e}"))?;
        let overlays: OverlaySettings = serde_json::from_str(&overlay_content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {overlay_path}: {e}"))?;

        let objective_path = format!("{data_dir}/objectives/objective_pool.json");
        let objective_content = std::fs::read_to_string(&objective_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {objective_path}: {e}"))?;
        let objectives: ObjectivePools = serde_json::from_str(&objective_content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {objective_path}: {e}"))?;

        let rules_path = format!("{data_dir}/rules/win_lose.json");
        let rules_content = std::fs::read_to_string(&rules_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {rules_path}: {e}"))?;
        let rules: WinLoseRules = serde_json::from_str(&rules_content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {rules_path}: {e}"))?;

        let config = Self {
            ticks_per_day: TICKS_PER_DAY,
            snapshot_interval_ticks: DEFAULT_SNAPSHOT_INTERVAL,
            events: events_file.events,
            overlays,
            objectives,
            rules,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values the simulation cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.ticks_per_day == 0 {
            anyhow::bail!("ticks_per_day must be > 0");
        }
        let mut seen = std::collections::HashSet::new();
        for def in &self.events {
            if !seen.insert(def.id.as_str()) {
                anyhow::bail!("duplicate event id '{}'", def.id);
            }
            if def.duration_days == 0 {
                anyhow::bail!("event '{}' has zero duration", def.id);
            }
            if !(0.0..=1.0).contains(&def.daily_probability) {
                anyhow::bail!(
                    "event '{}' probability {} outside [0, 1]",
                    def.id, def.daily_probability
                );
            }
            if let Some(pct) = def.effects.building_shutdown_percent {
                if !(0.0..=1.0).contains(&pct) {
                    anyhow::bail!("event '{}' shutdown percent {pct} outside [0, 1]", def.id);
                }
            }
        }
        for difficulty in Difficulty::ALL {
            if self.objectives.pool(difficulty).is_empty() {
                anyhow::bail!("objective pool {difficulty:?} is empty");
            }
        }
        if self.overlays.density_radius < 0 {
            anyhow::bail!("density_radius must be >= 0");
        }
        for scale in &self.overlays.scales {
            if scale.stops.windows(2).any(|w| w[0].value > w[1].value) {
                anyhow::bail!("colour stops for {} are not sorted", scale.overlay.as_str());
            }
        }
        Ok(())
    }
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self::builtin()
    }
}
