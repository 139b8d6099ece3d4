//! Economic event catalog: the static definitions the lifecycle manager
//! rolls against.
//!
//! Definitions are immutable once loaded. The manager shares them through
//! `Arc`, and snapshots refer to them by id only.
//!
//! Catalog order is priority order: on a day boundary the first definition
//! whose roll succeeds wins the day.

use crate::types::Tier;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    Positive,
    Negative,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TierBoost {
    pub tier:       Tier,
    pub multiplier: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TreasuryRange {
    pub min: f64,
    pub max: f64,
}

/// Sparse effect description. Absent fields have no effect.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EffectBundle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yield_multiplier: Option<f64>,
    /// One-shot treasury loss at trigger time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub treasury_damage: Option<f64>,
    /// One-shot treasury gain drawn uniformly from the range at trigger time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub treasury_bonus_range: Option<TreasuryRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment_impact: Option<f64>,
    /// Target fraction of participants shut down (jittered ±5%).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub building_shutdown_percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_multiplier: Option<f64>,
    #[serde(default)]
    pub delay_yields: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prestige_multiplier: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier_yield_boost: Option<TierBoost>,
    #[serde(default)]
    pub rug_random_building: bool,
}

impl EffectBundle {
    /// True when the bundle resolves anything at trigger time.
    pub fn has_immediate_effects(&self) -> bool {
        self.treasury_damage.is_some()
            || self.treasury_bonus_range.is_some()
            || self.building_shutdown_percent.is_some()
            || self.rug_random_building
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventDefinition {
    pub id:            String,
    pub name:          String,
    pub severity:      Severity,
    pub polarity:      Polarity,
    pub duration_days: u32,
    /// Chance of triggering on any given day boundary, in [0, 1].
    pub daily_probability: f64,
    pub cooldown_days: u32,
    #[serde(default)]
    pub effects:       EffectBundle,
}

impl EventDefinition {
    pub fn is_negative(&self) -> bool {
        self.polarity == Polarity::Negative
    }
}

/// The shipped catalog, in priority order.
pub fn builtin_event_catalog() -> Vec<EventDefinition> {
    vec![
        EventDefinition {
            id: "market_crash".into(),
            name: "Market Crash".into(),
            severity: Severity::High,
            polarity: Polarity::Negative,
            duration_days: 3,
            daily_probability: 0.02,
            cooldown_days: 14,
            effects: EffectBundle {
                yield_multiplier: Some(0.5),
                sentiment_impact: Some(-15.0),
                ..Default::default()
            },
        },
        EventDefinition {
            id: "rug_pull".into(),
            name: "Rug Pull".into(),
            severity: Severity::Critical,
            polarity: Polarity::Negative,
            duration_days: 1,
            daily_probability: 0.015,
            cooldown_days: 10,
            effects: EffectBundle {
                sentiment_impact: Some(-10.0),
                rug_random_building: true,
                ..Default::default()
            },
        },
        EventDefinition {
            id: "exploit_hack".into(),
            name: "Protocol Exploit".into(),
            severity: Severity::High,
            polarity: Polarity::Negative,
            duration_days: 1,
            daily_probability: 0.01,
            cooldown_days: 20,
            effects: EffectBundle {
                treasury_damage: Some(5_000.0),
                sentiment_impact: Some(-8.0),
                ..Default::default()
            },
        },
        EventDefinition {
            id: "regulatory_crackdown".into(),
            name: "Regulatory Crackdown".into(),
            severity: Severity::Medium,
            polarity: Polarity::Negative,
            duration_days: 5,
            daily_probability: 0.01,
            cooldown_days: 30,
            effects: EffectBundle {
                cost_multiplier: Some(1.25),
                building_shutdown_percent: Some(0.10),
                sentiment_impact: Some(-5.0),
                ..Default::default()
            },
        },
        EventDefinition {
            id: "network_congestion".into(),
            name: "Network Congestion".into(),
            severity: Severity::Low,
            polarity: Polarity::Negative,
            duration_days: 2,
            daily_probability: 0.03,
            cooldown_days: 7,
            effects: EffectBundle {
                delay_yields: true,
                sentiment_impact: Some(-3.0),
                ..Default::default()
            },
        },
        EventDefinition {
            id: "bull_run".into(),
            name: "Bull Run".into(),
            severity: Severity::Medium,
            polarity: Polarity::Positive,
            duration_days: 4,
            daily_probability: 0.02,
            cooldown_days: 14,
            effects: EffectBundle {
                yield_multiplier: Some(2.0),
                sentiment_impact: Some(12.0),
                ..Default::default()
            },
        },
        EventDefinition {
            id: "airdrop".into(),
            name: "Airdrop Season".into(),
            severity: Severity::Low,
            polarity: Polarity::Positive,
            duration_days: 1,
            daily_probability: 0.03,
            cooldown_days: 7,
            effects: EffectBundle {
                treasury_bonus_range: Some(TreasuryRange { min: 1_000.0, max: 5_000.0 }),
                sentiment_impact: Some(5.0),
                ..Default::default()
            },
        },
        EventDefinition {
            id: "blue_chip_rally".into(),
            name: "Blue Chip Rally".into(),
            severity: Severity::Low,
            polarity: Polarity::Positive,
            duration_days: 3,
            daily_probability: 0.02,
            cooldown_days: 10,
            effects: EffectBundle {
                tier_yield_boost: Some(TierBoost { tier: 3, multiplier: 1.5 }),
                ..Default::default()
            },
        },
        EventDefinition {
            id: "celebrity_endorsement".into(),
            name: "Celebrity Endorsement".into(),
            severity: Severity::Low,
            polarity: Polarity::Positive,
            duration_days: 2,
            daily_probability: 0.015,
            cooldown_days: 21,
            effects: EffectBundle {
                prestige_multiplier: Some(1.5),
                sentiment_impact: Some(8.0),
                ..Default::default()
            },
        },
    ]
}
