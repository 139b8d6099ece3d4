//! CityFi economy core: event lifecycle, spatial overlays and objectives
//! for one game session, driven by the host's tick loop.

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod event_catalog;
pub mod event_subsystem;
pub mod objective_catalog;
pub mod objective_subsystem;
pub mod overlay;
pub mod persistence;
pub mod registry;
pub mod rng;
pub mod snapshot;
pub mod types;
