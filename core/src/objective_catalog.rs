//! Weekly objective pools.
//!
//! Each week draws one objective from each difficulty pool. Pool order is
//! part of the deterministic contract: reordering a pool changes which
//! objective every client sees for a given week. Append only.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveType {
    ReachPopulation,
    ReachTvl,
    ReachTreasury,
    OwnBuildings,
    ReachHappiness,
    BuildingCategories,
    /// Rug pulls survived since the week began.
    SurviveRugPulls,
    /// Consecutive days at or above the happiness streak floor.
    HappinessStreak,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObjectiveDefinition {
    pub id:             String,
    pub label:          String,
    pub objective_type: ObjectiveType,
    pub difficulty:     Difficulty,
    pub target_value:   f64,
    /// Streak length in days for `HappinessStreak`; other types ignore it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_days:  Option<u32>,
    pub treasury_reward: f64,
}

impl ObjectiveDefinition {
    /// The value progress is measured against.
    pub fn required_value(&self) -> f64 {
        match (self.objective_type, self.duration_days) {
            (ObjectiveType::HappinessStreak, Some(days)) => days as f64,
            _ => self.target_value,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObjectivePools {
    pub easy:   Vec<ObjectiveDefinition>,
    pub medium: Vec<ObjectiveDefinition>,
    pub hard:   Vec<ObjectiveDefinition>,
    /// Daily happiness at or above this extends the long-lived streak.
    pub happiness_streak_floor: f64,
}

impl ObjectivePools {
    pub fn pool(&self, difficulty: Difficulty) -> &[ObjectiveDefinition] {
        match difficulty {
            Difficulty::Easy   => &self.easy,
            Difficulty::Medium => &self.medium,
            Difficulty::Hard   => &self.hard,
        }
    }

    pub fn all(&self) -> impl Iterator<Item = &ObjectiveDefinition> {
        self.easy.iter().chain(&self.medium).chain(&self.hard)
    }

    pub fn find(&self, objective_id: &str) -> Option<&ObjectiveDefinition> {
        self.all().find(|d| d.id == objective_id)
    }
}

impl Default for ObjectivePools {
    fn default() -> Self {
        builtin_objective_pools()
    }
}

fn objective(
    id: &str,
    label: &str,
    objective_type: ObjectiveType,
    difficulty: Difficulty,
    target_value: f64,
    treasury_reward: f64,
) -> ObjectiveDefinition {
    ObjectiveDefinition {
        id: id.into(),
        label: label.into(),
        objective_type,
        difficulty,
        target_value,
        duration_days: None,
        treasury_reward,
    }
}

pub fn builtin_objective_pools() -> ObjectivePools {
    use Difficulty::*;
    use ObjectiveType::*;

    let mut streak = objective("happy_streak_5", "Keep the city happy for 5 days", HappinessStreak, Hard, 5.0, 7_500.0);
    streak.duration_days = Some(5);

    ObjectivePools {
        easy: vec![
            objective("pop_100", "Reach 100 citizens", ReachPopulation, Easy, 100.0, 500.0),
            objective("build_10", "Own 10 buildings", OwnBuildings, Easy, 10.0, 500.0),
            objective("treasury_10k", "Hold 10k in the treasury", ReachTreasury, Easy, 10_000.0, 500.0),
            objective("happy_60", "Reach 60% happiness", ReachHappiness, Easy, 60.0, 500.0),
        ],
        medium: vec![
            objective("tvl_100k", "Reach 100k TVL", ReachTvl, Medium, 100_000.0, 2_000.0),
            objective("pop_500", "Reach 500 citizens", ReachPopulation, Medium, 500.0, 2_000.0),
            objective("survive_rug_1", "Survive a rug pull", SurviveRugPulls, Medium, 1.0, 2_000.0),
            objective("diverse_4", "Own buildings in 4 categories", BuildingCategories, Medium, 4.0, 2_000.0),
        ],
        hard: vec![
            objective("tvl_1m", "Reach 1M TVL", ReachTvl, Hard, 1_000_000.0, 7_500.0),
            streak,
            objective("survive_rug_3", "Survive 3 rug pulls", SurviveRugPulls, Hard, 3.0, 7_500.0),
            objective("pop_2000", "Reach 2,000 citizens", ReachPopulation, Hard, 2_000.0, 7_500.0),
        ],
        happiness_streak_floor: 70.0,
    }
}
