//! Spatial effect overlays: per-tile yield, risk, protection and density.
//!
//! Every building contributes a point source with a square (Chebyshev)
//! radius. Inside the radius the contribution decays linearly:
//!
//!   falloff = 1 − distance / (radius + 1)
//!
//! which is 1 at the centre and never reaches 0 inside the radius.
//!
//! Overlay kinds:
//!   - Yield, Protection: contributions add per cell
//!   - Risk: two passes. Pass 1 keeps the worst (max) base risk per cell,
//!     pass 2 adds protection capped at 1.0, and the cell shows
//!     `base × (1 − protection)`
//!   - Density: every cell in the grid against every source within a fixed
//!     radius. O(grid² × sources), the reason results are cached
//!
//! Normalisation divides by a fixed per-overlay ceiling from config and
//! clamps to [0, 1]; hot spots clip at full colour instead of rescaling.

use crate::types::GridPos;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
    time::{Duration, Instant},
};

pub const DEFAULT_CACHE_TTL_MS: u64 = 1_000;
pub const DEFAULT_DENSITY_RADIUS: i32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayType {
    Yield,
    Risk,
    Protection,
    Density,
}

impl OverlayType {
    pub const ALL: [OverlayType; 4] = [
        OverlayType::Yield,
        OverlayType::Risk,
        OverlayType::Protection,
        OverlayType::Density,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Yield      => "yield",
            Self::Risk       => "risk",
            Self::Protection => "protection",
            Self::Density    => "density",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }
}

/// What a point source feeds. Density counts every source regardless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectType {
    Yield,
    Risk,
    Protection,
    /// Footprint only; feeds nothing but density.
    Presence,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointSource {
    pub position:    GridPos,
    pub effect_type: EffectType,
    pub magnitude:   f64,
    pub radius:      i32,
}

// ── Colour ───────────────────────────────────────────────────────────────────

/// 8-bit RGB colour, serialised as `#rrggbb`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    fn lerp(a: Rgb, b: Rgb, t: f64) -> Rgb {
        let mix = |x: u8, y: u8| (x as f64 + (y as f64 - x as f64) * t).round().clamp(0.0, 255.0) as u8;
        Rgb::new(mix(a.r, b.r), mix(a.g, b.g), mix(a.b, b.b))
    }
}

impl TryFrom<String> for Rgb {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let hex = value.strip_prefix('#').unwrap_or(&value);
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(format!("colour '{value}' is not #rrggbb"));
        }
        let channel = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16).map_err(|e| format!("colour '{value}': {e}"))
        };
        Ok(Rgb::new(channel(0)?, channel(2)?, channel(4)?))
    }
}

impl From<Rgb> for String {
    fn from(value: Rgb) -> Self {
        value.to_hex()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorStop {
    pub value: f64,
    pub color: Rgb,
}

/// Piecewise-linear lookup over stops sorted by `value`. Values at or
/// beyond either end clamp to that end's colour.
pub fn color_for(normalized_value: f64, stops: &[ColorStop]) -> Rgb {
    let (Some(first), Some(last)) = (stops.first(), stops.last()) else {
        return Rgb::default();
    };
    if normalized_value <= first.value {
        return first.color;
    }
    if normalized_value >= last.value {
        return last.color;
    }
    for pair in stops.windows(2) {
        let (lo, hi) = (pair[0], pair[1]);
        if normalized_value >= lo.value && normalized_value <= hi.value {
            let span = hi.value - lo.value;
            if span <= f64::EPSILON {
                return hi.color;
            }
            return Rgb::lerp(lo.color, hi.color, (normalized_value - lo.value) / span);
        }
    }
    last.color
}

// ── Settings ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayScale {
    pub overlay:   OverlayType,
    /// Fixed display ceiling: raw values at or above map to 1.0.
    pub max_value: f64,
    pub stops:     Vec<ColorStop>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlaySettings {
    pub density_radius: i32,
    pub cache_ttl_ms:   u64,
    pub scales:         Vec<OverlayScale>,
}

impl OverlaySettings {
    pub fn scale_for(&self, overlay: OverlayType) -> Option<&OverlayScale> {
        self.scales.iter().find(|s| s.overlay == overlay)
    }
}

impl Default for OverlaySettings {
    fn default() -> Self {
        let green = Rgb::new(0x16, 0xa3, 0x4a);
        let grey = Rgb::new(0x1f, 0x29, 0x37);
        let amber = Rgb::new(0xf5, 0x9e, 0x0b);
        let red = Rgb::new(0xdc, 0x26, 0x26);
        let blue = Rgb::new(0x25, 0x63, 0xeb);
        let stop = |value, color| ColorStop { value, color };
        Self {
            density_radius: DEFAULT_DENSITY_RADIUS,
            cache_ttl_ms: DEFAULT_CACHE_TTL_MS,
            scales: vec![
                OverlayScale {
                    overlay: OverlayType::Yield,
                    max_value: 50.0,
                    stops: vec![stop(0.0, grey), stop(1.0, green)],
                },
                OverlayScale {
                    overlay: OverlayType::Risk,
                    max_value: 1.0,
                    stops: vec![stop(0.0, green), stop(0.5, amber), stop(1.0, red)],
                },
                OverlayScale {
                    overlay: OverlayType::Protection,
                    max_value: 1.0,
                    stops: vec![stop(0.0, grey), stop(1.0, blue)],
                },
                OverlayScale {
                    overlay: OverlayType::Density,
                    max_value: 8.0,
                    stops: vec![stop(0.0, grey), stop(0.6, amber), stop(1.0, red)],
                },
            ],
        }
    }
}

// ── Samples ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileEffectSample {
    pub position:         GridPos,
    pub normalized_value: f64,
    pub raw_value:        f64,
    pub render_color:     Rgb,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverlayStats {
    pub cells:           usize,
    pub max_raw:         f64,
    pub mean_normalized: f64,
}

pub fn summarize(samples: &[TileEffectSample]) -> OverlayStats {
    if samples.is_empty() {
        return OverlayStats::default();
    }
    let max_raw = samples.iter().map(|s| s.raw_value).fold(0.0, f64::max);
    let mean_normalized =
        samples.iter().map(|s| s.normalized_value).sum::<f64>() / samples.len() as f64;
    OverlayStats { cells: samples.len(), max_raw, mean_normalized }
}

/// Linear falloff inside a Chebyshev radius.
pub fn falloff(distance: i32, radius: i32) -> f64 {
    1.0 - distance as f64 / (radius as f64 + 1.0)
}

/// Visit every in-grid cell within `source.radius`, passing its falloff.
fn scan_source(source: &PointSource, grid_size: i32, mut visit: impl FnMut(GridPos, f64)) {
    debug_assert!(source.radius >= 0, "negative radius {} at {:?}", source.radius, source.position);
    if source.radius < 0 || grid_size <= 0 {
        return;
    }
    let r = source.radius;
    let centre = source.position;
    let span = |c: i32| c.saturating_sub(r).max(0)..=c.saturating_add(r).min(grid_size - 1);
    for y in span(centre.y) {
        for x in span(centre.x) {
            let cell = GridPos::new(x, y);
            visit(cell, falloff(centre.chebyshev(&cell), r));
        }
    }
}

// ── Engine ───────────────────────────────────────────────────────────────────

struct CachedOverlay {
    source_count: usize,
    grid_size:    i32,
    version:      u64,
    computed_at:  Instant,
    samples:      Arc<[TileEffectSample]>,
}

pub struct SpatialEffectEngine {
    settings:   OverlaySettings,
    cache:      HashMap<OverlayType, CachedOverlay>,
    recomputes: u64,
}

impl SpatialEffectEngine {
    pub fn new(settings: OverlaySettings) -> Self {
        Self { settings, cache: HashMap::new(), recomputes: 0 }
    }

    pub fn settings(&self) -> &OverlaySettings {
        &self.settings
    }

    /// Number of cache misses so far.
    pub fn recompute_count(&self) -> u64 {
        self.recomputes
    }

    pub fn invalidate(&mut self) {
        self.cache.clear();
    }

    pub fn invalidate_overlay(&mut self, overlay: OverlayType) {
        self.cache.remove(&overlay);
    }

    /// Compute an overlay by name. Unknown names are a programming error:
    /// panic in debug builds, empty overlay in release.
    pub fn compute_overlay_named(
        &self,
        name: &str,
        sources: &[PointSource],
        grid_size: i32,
    ) -> Vec<TileEffectSample> {
        match OverlayType::parse(name) {
            Some(overlay) => self.compute_overlay(overlay, sources, grid_size),
            None => {
                debug_assert!(OverlayType::parse(name).is_some(), "unknown overlay type '{name}'");
                log::error!("unknown overlay type '{name}'");
                Vec::new()
            }
        }
    }

    pub fn compute_overlay(
        &self,
        overlay: OverlayType,
        sources: &[PointSource],
        grid_size: i32,
    ) -> Vec<TileEffectSample> {
        let raw = match overlay {
            OverlayType::Yield => additive(sources, EffectType::Yield, grid_size),
            OverlayType::Protection => additive(sources, EffectType::Protection, grid_size),
            OverlayType::Risk => effective_risk(sources, grid_size),
            OverlayType::Density => density(sources, grid_size, self.settings.density_radius),
        };
        self.to_samples(overlay, raw)
    }

    /// Cached variant of `compute_overlay`. Reuses the previous result while
    /// the source count, grid size and version token are unchanged and the
    /// entry is younger than the TTL.
    pub fn get_cached(
        &mut self,
        overlay: OverlayType,
        sources: &[PointSource],
        grid_size: i32,
        version: u64,
    ) -> Arc<[TileEffectSample]> {
        self.get_cached_at(overlay, sources, grid_size, version, Instant::now())
    }

    pub fn get_cached_at(
        &mut self,
        overlay: OverlayType,
        sources: &[PointSource],
        grid_size: i32,
        version: u64,
        now: Instant,
    ) -> Arc<[TileEffectSample]> {
        let ttl = Duration::from_millis(self.settings.cache_ttl_ms);
        if let Some(entry) = self.cache.get(&overlay) {
            let fresh = entry.source_count == sources.len()
                && entry.grid_size == grid_size
                && entry.version == version
                && now.saturating_duration_since(entry.computed_at) < ttl;
            if fresh {
                return Arc::clone(&entry.samples);
            }
        }

        let samples: Arc<[TileEffectSample]> =
            self.compute_overlay(overlay, sources, grid_size).into();
        self.recomputes += 1;
        log::debug!(
            "overlay {}: recomputed {} cells from {} sources (version {version})",
            overlay.as_str(),
            samples.len(),
            sources.len()
        );
        self.cache.insert(
            overlay,
            CachedOverlay {
                source_count: sources.len(),
                grid_size,
                version,
                computed_at: now,
                samples: Arc::clone(&samples),
            },
        );
        samples
    }

    fn to_samples(&self, overlay: OverlayType, raw: BTreeMap<GridPos, f64>) -> Vec<TileEffectSample> {
        let (max_value, stops) = match self.settings.scale_for(overlay) {
            Some(scale) => (scale.max_value, scale.stops.as_slice()),
            None => (1.0, &[][..]),
        };
        raw.into_iter()
            .map(|(position, raw_value)| {
                let normalized_value = if max_value > 0.0 {
                    (raw_value / max_value).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                TileEffectSample {
                    position,
                    normalized_value,
                    raw_value,
                    render_color: color_for(normalized_value, stops),
                }
            })
            .collect()
    }
}

impl Default for SpatialEffectEngine {
    fn default() -> Self {
        Self::new(OverlaySettings::default())
    }
}

// ── Overlay kernels ──────────────────────────────────────────────────────────

fn additive(sources: &[PointSource], kind: EffectType, grid_size: i32) -> BTreeMap<GridPos, f64> {
    let mut cells = BTreeMap::new();
    for source in sources.iter().filter(|s| s.effect_type == kind) {
        scan_source(source, grid_size, |pos, f| {
            *cells.entry(pos).or_insert(0.0) += source.magnitude * f;
        });
    }
    cells
}

fn effective_risk(sources: &[PointSource], grid_size: i32) -> BTreeMap<GridPos, f64> {
    // Pass 1: worst-case exposure, not cumulative danger.
    let mut base: BTreeMap<GridPos, f64> = BTreeMap::new();
    for source in sources.iter().filter(|s| s.effect_type == EffectType::Risk) {
        scan_source(source, grid_size, |pos, f| {
            let cell = base.entry(pos).or_insert(0.0);
            *cell = cell.max(source.magnitude * f);
        });
    }

    // Pass 2: flat cover anywhere inside a protector's radius; stacks, capped at 1.
    let mut protection: HashMap<GridPos, f64> = HashMap::new();
    for source in sources.iter().filter(|s| s.effect_type == EffectType::Protection) {
        scan_source(source, grid_size, |pos, _| {
            if base.contains_key(&pos) {
                let cell = protection.entry(pos).or_insert(0.0);
                *cell = (*cell + source.magnitude).min(1.0);
            }
        });
    }

    base.into_iter()
        .map(|(pos, risk)| {
            let cover = protection.get(&pos).copied().unwrap_or(0.0).min(1.0);
            (pos, risk * (1.0 - cover))
        })
        .collect()
}

fn density(sources: &[PointSource], grid_size: i32, radius: i32) -> BTreeMap<GridPos, f64> {
    debug_assert!(radius >= 0, "negative density radius {radius}");
    let mut cells = BTreeMap::new();
    if radius < 0 || grid_size <= 0 {
        return cells;
    }
    for y in 0..grid_size {
        for x in 0..grid_size {
            let cell = GridPos::new(x, y);
            let value: f64 = sources
                .iter()
                .map(|s| s.position.chebyshev(&cell))
                .filter(|&d| d <= radius)
                .map(|d| falloff(d, radius))
                .sum();
            cells.insert(cell, value);
        }
    }
    cells
}
