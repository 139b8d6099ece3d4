//! Shared primitive types used across the entire simulation.

use serde::{Deserialize, Serialize};

/// A simulation tick. One tick = five simulated seconds.
pub type Tick = u64;

/// Ticks in one game day (24h / 5s).
pub const TICKS_PER_DAY: Tick = 288;

/// A stable, unique identifier for any entity in the simulation.
pub type EntityId = String;

/// Building tier as reported by the registry (1 = starter, higher = rarer).
pub type Tier = u8;

/// A cell on the square city grid.
///
/// Ordered row-major (`y` then `x`) so overlay output is stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridPos {
    pub x: i32,
    pub y: i32,
}

impl GridPos {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// `max(|dx|, |dy|)`, so a radius covers a square.
    pub fn chebyshev(&self, other: &GridPos) -> i32 {
        (self.x - other.x).abs().max((self.y - other.y).abs())
    }

    pub fn in_grid(&self, grid_size: i32) -> bool {
        self.x >= 0 && self.y >= 0 && self.x < grid_size && self.y < grid_size
    }
}

impl Ord for GridPos {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.y, self.x).cmp(&(other.y, other.x))
    }
}

impl PartialOrd for GridPos {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
