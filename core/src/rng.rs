//! Random number sources.
//!
//! Two families, kept apart on purpose:
//!   - General-purpose draws (natural event rolls, bonus amounts, which
//!     building gets rugged) come from a `RollSource` owned by the event
//!     manager. Production uses `EntropyRng`; tests and seeded runs inject
//!     a `SubsystemRng`.
//!   - Weekly objective selection uses `WeeklyLcg`, seeded only by the week
//!     number, so every client picks the same objectives for a given week.

use rand::{rngs::StdRng, RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;

/// Anything that can produce uniform draws in [0.0, 1.0).
pub trait RollSource: Send {
    /// Roll a float in [0.0, 1.0).
    fn next_f64(&mut self) -> f64;

    /// Roll a u64 in [0, n).
    fn next_u64_below(&mut self, n: u64) -> u64 {
        assert!(n > 0, "n must be > 0");
        ((self.next_f64() * n as f64) as u64).min(n - 1)
    }

    /// Bernoulli trial: returns true with probability p.
    fn chance(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }

    /// Uniform float in [min, max).
    fn range(&mut self, min: f64, max: f64) -> f64 {
        min + (max - min) * self.next_f64()
    }
}

fn bits_to_unit(bits: u64) -> f64 {
    (bits >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
}

/// A named, deterministic PCG stream.
pub struct SubsystemRng {
    pub name: &'static str,
    inner: Pcg64Mcg,
}

impl SubsystemRng {
    /// Create a stream from a master seed and a stable stream index.
    /// The index must never change once assigned.
    pub fn new(master_seed: u64, stream_index: u64) -> Self {
        let derived_seed = master_seed ^ (stream_index.wrapping_mul(0x9e37_79b9_7f4a_7c15));
        Self {
            name: "unnamed",
            inner: Pcg64Mcg::seed_from_u64(derived_seed),
        }
    }

    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Draw a raw u64 (full range).
    pub fn next_u64(&mut self) -> u64 {
        self.inner.next_u64()
    }
}

impl RollSource for SubsystemRng {
    fn next_f64(&mut self) -> f64 {
        bits_to_unit(self.inner.next_u64())
    }

    fn next_u64_below(&mut self, n: u64) -> u64 {
        assert!(n > 0, "n must be > 0");
        self.inner.next_u64() % n
    }
}

/// OS-seeded general-purpose source.
pub struct EntropyRng {
    inner: StdRng,
}

impl EntropyRng {
    pub fn new() -> Self {
        Self { inner: StdRng::from_entropy() }
    }
}

impl Default for EntropyRng {
    fn default() -> Self { Self::new() }
}

impl RollSource for EntropyRng {
    fn next_f64(&mut self) -> f64 {
        bits_to_unit(self.inner.next_u64())
    }
}

const LCG_MULTIPLIER: u64 = 9301;
const LCG_INCREMENT:  u64 = 49297;
const LCG_MODULUS:    u64 = 233_280;

/// Classic `(s * 9301 + 49297) mod 233280` generator.
///
/// Tiny state and platform-independent integer arithmetic, so the
/// sequence for a seed is identical on every client.
#[derive(Debug, Clone)]
pub struct WeeklyLcg {
    state: u64,
}

impl WeeklyLcg {
    pub fn new(seed: u64) -> Self {
        Self { state: seed % LCG_MODULUS }
    }
}

impl RollSource for WeeklyLcg {
    fn next_f64(&mut self) -> f64 {
        self.state = (self.state * LCG_MULTIPLIER + LCG_INCREMENT) % LCG_MODULUS;
        self.state as f64 / LCG_MODULUS as f64
    }
}

/// Builds the deterministic sequence used for one week's selection.
pub type SequenceFactory = Box<dyn Fn(u64) -> Box<dyn RollSource> + Send + Sync>;

pub fn weekly_lcg_factory() -> SequenceFactory {
    Box::new(|week| Box::new(WeeklyLcg::new(week)))
}
