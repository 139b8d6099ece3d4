//! Simulation clock: tick state, day boundaries and pause.

use crate::types::{Tick, TICKS_PER_DAY};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimClock {
    pub current_tick:  Tick,
    pub ticks_per_day: Tick,
    pub paused:        bool,
}

impl SimClock {
    pub fn new(ticks_per_day: Tick) -> Self {
        Self {
            current_tick: 0,
            ticks_per_day: ticks_per_day.max(1),
            paused: true,
        }
    }

    /// Advance one tick. Returns the new tick number.
    /// Panics if called while paused; callers must check.
    pub fn advance(&mut self) -> Tick {
        assert!(!self.paused, "advance() called on paused clock");
        self.current_tick += 1;
        self.current_tick
    }

    pub fn pause(&mut self)  { self.paused = true;  }
    pub fn resume(&mut self) { self.paused = false; }

    /// Whole game days elapsed at `tick`.
    pub fn day_of(&self, tick: Tick) -> u64 {
        tick / self.ticks_per_day
    }

    pub fn is_day_boundary(&self, tick: Tick) -> bool {
        tick.is_multiple_of(self.ticks_per_day)
    }

    pub fn days_to_ticks(&self, days: u32) -> Tick {
        days as Tick * self.ticks_per_day
    }
}

impl Default for SimClock {
    fn default() -> Self { Self::new(TICKS_PER_DAY) }
}
