//! Spatial overlay tests.
//!
//! Verifies:
//! - Linear falloff inside the Chebyshev radius, clipped at the grid edge
//! - Yield and protection accumulate additively
//! - Risk takes the worst source, then protection (capped at 1) reduces it
//! - Protection cover is flat inside its radius
//! - Very large radii are clipped to the grid
//! - Density samples every cell
//! - Fixed-ceiling normalisation and colour-stop clamping
//! - Cache reuse, TTL expiry and version invalidation

use cityfi_core::{
    overlay::{
        color_for, falloff, summarize, ColorStop, EffectType, OverlaySettings, OverlayType,
        PointSource, Rgb, SpatialEffectEngine, TileEffectSample,
    },
    registry::{point_sources, BuildingEffects, BuildingSnapshot, SourceParams},
    types::GridPos,
};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

const GRID: i32 = 16;

fn source(x: i32, y: i32, effect_type: EffectType, magnitude: f64, radius: i32) -> PointSource {
    PointSource { position: GridPos::new(x, y), effect_type, magnitude, radius }
}

fn at(samples: &[TileEffectSample], x: i32, y: i32) -> Option<&TileEffectSample> {
    samples.iter().find(|s| s.position == GridPos::new(x, y))
}

fn raw_at(samples: &[TileEffectSample], x: i32, y: i32) -> f64 {
    at(samples, x, y).map(|s| s.raw_value).unwrap_or(0.0)
}

fn assert_close(actual: f64, expected: f64, what: &str) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "{what}: expected {expected}, got {actual}"
    );
}

#[test]
fn falloff_is_one_at_centre_and_positive_at_the_edge() {
    assert_eq!(falloff(0, 3), 1.0);
    assert_eq!(falloff(3, 3), 0.25);
    assert!(falloff(3, 3) > 0.0);
    assert_eq!(falloff(0, 0), 1.0);
}

#[test]
fn yield_source_covers_its_square_and_clips_at_edges() {
    let engine = SpatialEffectEngine::default();

    let centre = engine.compute_overlay(
        OverlayType::Yield,
        &[source(8, 8, EffectType::Yield, 10.0, 2)],
        GRID,
    );
    assert_eq!(centre.len(), 25, "radius 2 covers a 5×5 square");
    assert_close(raw_at(&centre, 8, 8), 10.0, "centre");
    assert_close(raw_at(&centre, 10, 10), 10.0 * (1.0 - 2.0 / 3.0), "corner");

    let corner = engine.compute_overlay(
        OverlayType::Yield,
        &[source(0, 0, EffectType::Yield, 10.0, 2)],
        GRID,
    );
    assert_eq!(corner.len(), 9, "cells off the grid are skipped");
    assert!(corner.iter().all(|s| s.position.in_grid(GRID)));
}

#[test]
fn yield_accumulates_and_normalises_against_fixed_ceiling() {
    let engine = SpatialEffectEngine::default();
    let sources = [
        source(4, 4, EffectType::Yield, 10.0, 0),
        source(4, 4, EffectType::Yield, 10.0, 0),
        source(6, 6, EffectType::Yield, 500.0, 0),
        source(5, 5, EffectType::Risk, 1.0, 3),
    ];
    let samples = engine.compute_overlay(OverlayType::Yield, &sources, GRID);

    let stacked = at(&samples, 4, 4).expect("stacked cell");
    assert_close(stacked.raw_value, 20.0, "stacked raw");
    assert_close(stacked.normalized_value, 0.4, "20 / 50");

    let hot = at(&samples, 6, 6).expect("hot cell");
    assert_eq!(hot.normalized_value, 1.0, "values above the ceiling clip");
    assert_eq!(samples.len(), 2, "risk sources do not feed the yield overlay");
}

#[test]
fn effective_risk_applies_protection_after_worst_case() {
    let engine = SpatialEffectEngine::default();
    let sources = [
        source(5, 5, EffectType::Risk, 0.4, 3),
        source(5, 5, EffectType::Protection, 0.5, 0),
    ];
    let samples = engine.compute_overlay(OverlayType::Risk, &sources, GRID);

    assert_close(raw_at(&samples, 5, 5), 0.4 * 1.0 * (1.0 - 0.5), "protected centre");
    assert_close(raw_at(&samples, 6, 5), 0.4 * 0.75, "unprotected neighbour");
}

#[test]
fn protection_covers_its_whole_radius_without_falloff() {
    let engine = SpatialEffectEngine::default();
    let sources = [
        source(5, 5, EffectType::Risk, 0.4, 3),
        source(5, 5, EffectType::Protection, 0.5, 2),
    ];
    let samples = engine.compute_overlay(OverlayType::Risk, &sources, GRID);

    assert_close(raw_at(&samples, 6, 5), 0.4 * falloff(1, 3) * (1.0 - 0.5), "covered neighbour");
    assert_close(raw_at(&samples, 7, 7), 0.4 * falloff(2, 3) * (1.0 - 0.5), "edge of cover");
    assert_close(raw_at(&samples, 8, 5), 0.4 * falloff(3, 3), "outside cover");
}

#[test]
fn huge_radius_is_clipped_to_the_grid() {
    let engine = SpatialEffectEngine::default();
    let samples = engine.compute_overlay(
        OverlayType::Yield,
        &[source(5, 5, EffectType::Yield, 10.0, i32::MAX)],
        8,
    );
    assert_eq!(samples.len(), 64, "every cell of the 8×8 grid is covered once");
    assert!(samples.iter().all(|s| s.raw_value > 9.9), "falloff is negligible at this radius");

    let risk = engine.compute_overlay(
        OverlayType::Risk,
        &[
            source(-3, 20, EffectType::Risk, 0.5, i32::MAX),
            source(2, 2, EffectType::Protection, 0.5, i32::MAX),
        ],
        8,
    );
    assert_eq!(risk.len(), 64, "off-grid centre still reaches the grid");
    assert!(risk.iter().all(|s| (s.raw_value - 0.25).abs() < 1e-6));
}

#[test]
fn risk_takes_the_maximum_not_the_sum() {
    let engine = SpatialEffectEngine::default();
    let sources = [
        source(5, 5, EffectType::Risk, 0.4, 1),
        source(5, 5, EffectType::Risk, 0.3, 1),
    ];
    let samples = engine.compute_overlay(OverlayType::Risk, &sources, GRID);
    assert_close(raw_at(&samples, 5, 5), 0.4, "worst case");
}

#[test]
fn protection_caps_at_full_cover_and_needs_base_risk() {
    let engine = SpatialEffectEngine::default();
    let sources = [
        source(5, 5, EffectType::Risk, 0.9, 0),
        source(5, 5, EffectType::Protection, 0.8, 2),
        source(5, 5, EffectType::Protection, 0.8, 2),
    ];
    let samples = engine.compute_overlay(OverlayType::Risk, &sources, GRID);

    assert_eq!(samples.len(), 1, "protection alone produces no risk cells");
    assert_close(raw_at(&samples, 5, 5), 0.0, "1.6 cover caps at 1.0");
}

#[test]
fn protection_overlay_is_additive() {
    let engine = SpatialEffectEngine::default();
    let sources = [
        source(3, 3, EffectType::Protection, 0.3, 1),
        source(3, 3, EffectType::Protection, 0.3, 1),
    ];
    let samples = engine.compute_overlay(OverlayType::Protection, &sources, GRID);
    assert_close(raw_at(&samples, 3, 3), 0.6, "stacked protection");
}

#[test]
fn density_samples_every_cell() {
    let engine = SpatialEffectEngine::default();
    let sources = [source(0, 0, EffectType::Presence, 1.0, 0)];
    let samples = engine.compute_overlay(OverlayType::Density, &sources, 10);

    assert_eq!(samples.len(), 100, "density covers the whole grid");
    assert_close(raw_at(&samples, 0, 0), 1.0, "source cell");
    assert_close(raw_at(&samples, 4, 0), 0.2, "edge of density radius 4");
    assert_close(raw_at(&samples, 9, 9), 0.0, "out of range");
}

#[test]
fn output_is_sorted_row_major() {
    let engine = SpatialEffectEngine::default();
    let samples = engine.compute_overlay(
        OverlayType::Yield,
        &[source(3, 3, EffectType::Yield, 1.0, 1), source(9, 1, EffectType::Yield, 1.0, 1)],
        GRID,
    );
    let positions: Vec<GridPos> = samples.iter().map(|s| s.position).collect();
    let mut sorted = positions.clone();
    sorted.sort();
    assert_eq!(positions, sorted);
}

#[test]
fn color_for_interpolates_and_clamps() {
    let black = Rgb::new(0, 0, 0);
    let white = Rgb::new(255, 255, 255);
    let stops = [
        ColorStop { value: 0.25, color: black },
        ColorStop { value: 0.75, color: white },
    ];

    assert_eq!(color_for(0.0, &stops), black, "below first stop clamps");
    assert_eq!(color_for(0.25, &stops), black);
    assert_eq!(color_for(1.0, &stops), white, "above last stop clamps");
    assert_eq!(color_for(0.5, &stops), Rgb::new(128, 128, 128));
    assert_eq!(color_for(0.5, &[]), Rgb::default());
}

#[test]
fn rgb_serialises_as_hex() {
    let json = serde_json::to_string(&Rgb::new(0x16, 0xa3, 0x4a)).expect("serialise");
    assert_eq!(json, "\"#16a34a\"");
    let parsed: Rgb = serde_json::from_str("\"#dc2626\"").expect("parse");
    assert_eq!(parsed, Rgb::new(0xdc, 0x26, 0x26));
    assert!(serde_json::from_str::<Rgb>("\"red\"").is_err());
}

#[test]
fn cache_reuses_until_ttl_or_version_changes() {
    let mut engine = SpatialEffectEngine::new(OverlaySettings::default());
    let sources = vec![source(5, 5, EffectType::Yield, 10.0, 2)];
    let t0 = Instant::now();

    let first = engine.get_cached_at(OverlayType::Yield, &sources, GRID, 1, t0);
    let again = engine.get_cached_at(
        OverlayType::Yield, &sources, GRID, 1, t0 + Duration::from_millis(500),
    );
    assert!(Arc::ptr_eq(&first, &again), "fresh entry should be reused");
    assert_eq!(engine.recompute_count(), 1);

    let stale = engine.get_cached_at(
        OverlayType::Yield, &sources, GRID, 1, t0 + Duration::from_millis(1_500),
    );
    assert!(!Arc::ptr_eq(&first, &stale), "entry older than the TTL is recomputed");
    assert_eq!(engine.recompute_count(), 2);

    let t1 = t0 + Duration::from_millis(1_600);
    engine.get_cached_at(OverlayType::Yield, &sources, GRID, 2, t1);
    assert_eq!(engine.recompute_count(), 3, "new version token forces recompute");

    let mut more = sources.clone();
    more.push(source(1, 1, EffectType::Yield, 1.0, 0));
    engine.get_cached_at(OverlayType::Yield, &more, GRID, 2, t1);
    assert_eq!(engine.recompute_count(), 4, "source count change forces recompute");

    engine.get_cached_at(OverlayType::Risk, &more, GRID, 2, t1);
    assert_eq!(engine.recompute_count(), 5, "each overlay type has its own entry");

    engine.invalidate();
    engine.get_cached_at(OverlayType::Risk, &more, GRID, 2, t1);
    assert_eq!(engine.recompute_count(), 6);
}

#[test]
fn named_overlays_resolve() {
    let engine = SpatialEffectEngine::default();
    let sources = [source(2, 2, EffectType::Yield, 5.0, 1)];
    let by_name = engine.compute_overlay_named("yield", &sources, GRID);
    assert_eq!(by_name, engine.compute_overlay(OverlayType::Yield, &sources, GRID));
}

#[cfg(debug_assertions)]
#[test]
#[should_panic(expected = "unknown overlay type")]
fn unknown_overlay_name_asserts_in_debug() {
    let engine = SpatialEffectEngine::default();
    engine.compute_overlay_named("pollution", &[], GRID);
}

#[cfg(debug_assertions)]
#[test]
#[should_panic(expected = "negative radius")]
fn negative_radius_asserts_in_debug() {
    let engine = SpatialEffectEngine::default();
    engine.compute_overlay(OverlayType::Yield, &[source(2, 2, EffectType::Yield, 1.0, -1)], GRID);
}

#[test]
fn registry_sources_respect_operational_state() {
    let building = |id: &str, x: i32, operational: bool| BuildingSnapshot {
        id: id.into(),
        position: GridPos::new(x, 0),
        category: "defi".into(),
        tier: 1,
        operational,
        effects: BuildingEffects {
            yield_boost: Some(SourceParams { magnitude: 5.0, radius: 1 }),
            risk: Some(SourceParams { magnitude: 0.3, radius: 1 }),
            protection: None,
        },
    };
    let buildings = [building("a", 0, true), building("b", 4, false)];

    assert_eq!(point_sources(&buildings, OverlayType::Yield).len(), 1);
    assert_eq!(point_sources(&buildings, OverlayType::Risk).len(), 1);
    assert_eq!(point_sources(&buildings, OverlayType::Protection).len(), 0);
    assert_eq!(
        point_sources(&buildings, OverlayType::Density).len(), 2,
        "shut-down buildings still count toward density"
    );
}

#[test]
fn summary_reports_peak_and_mean() {
    let engine = SpatialEffectEngine::default();
    let samples = engine.compute_overlay(
        OverlayType::Yield,
        &[source(5, 5, EffectType::Yield, 25.0, 0)],
        GRID,
    );
    let stats = summarize(&samples);
    assert_eq!(stats.cells, 1);
    assert_eq!(stats.max_raw, 25.0);
    assert_close(stats.mean_normalized, 0.5, "25 / 50");
}
