//! sim-runner: headless economy runner for CityFi.
//!
//! Usage:
//!   sim-runner --seed 12345 --ticks 8640 --db session.db
//!   sim-runner --seed 12345 --force market_crash
//!   sim-runner --ipc-mode

use anyhow::Result;
use chrono::Utc;
use cityfi_core::{
    config::EconomyConfig,
    engine::{SimEngine, TickInput, TickReport},
    event::SimEvent,
    objective_subsystem::{week_number_for, GameOutcome, LiveState, ObjectiveInstance},
    overlay::{summarize, OverlayType, TileEffectSample},
    persistence::{KvStore, MemoryStore, SqliteStore},
    registry::{self, BuildingEffects, BuildingSnapshot, SourceParams},
    types::{GridPos, Tick},
};
use std::collections::BTreeMap;
use std::env;
use std::io::{self, BufRead, Write};

const GRID_SIZE: i32 = 24;
const CATEGORIES: [&str; 5] = ["defi", "nft", "dao", "exchange", "bridge"];

/// Per-building, per-tick base income before event multipliers.
const BASE_INCOME: f64 = 0.4;
const BASE_UPKEEP: f64 = 0.15;

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcCommand {
    GetState,
    Tick { count: u64 },
    ForceEvent { event_id: String },
    Claim { objective_id: String },
    Overlay { overlay: String },
    Quit,
}

#[derive(serde::Serialize)]
struct UiState {
    tick:             Tick,
    paused:           bool,
    outcome:          GameOutcome,
    live:             LiveState,
    active_events:    Vec<String>,
    yield_multiplier: f64,
    sentiment_delta:  f64,
    weekly:           Vec<ObjectiveInstance>,
}

/// The host-side city the engine reports against.
struct City {
    buildings: Vec<BuildingSnapshot>,
    live:      LiveState,
    /// Bumped whenever the building set changes (overlay cache token).
    version:   u64,
}

impl City {
    fn synthetic(seed: u64, count: usize) -> Self {
        let buildings: Vec<BuildingSnapshot> = (0..count)
            .map(|i| {
                // Spread buildings over the grid in a seed-dependent pattern.
                let cell = (i as u64 * 7 + seed % 13) % (GRID_SIZE * GRID_SIZE) as u64;
                let category = CATEGORIES[i % CATEGORIES.len()];
                BuildingSnapshot {
                    id: format!("bldg-{i:03}"),
                    position: GridPos::new(cell as i32 % GRID_SIZE, cell as i32 / GRID_SIZE),
                    category: category.into(),
                    tier: (i % 3 + 1) as u8,
                    operational: true,
                    effects: effects_for(category),
                }
            })
            .collect();
        let live = LiveState {
            population: 20,
            happiness: 60.0,
            treasury: 2_500.0,
            tvl: 10_000.0,
            building_count: buildings.len(),
            category_count: registry::category_count(&buildings),
        };
        Self { buildings, live, version: 0 }
    }

    fn input(&self) -> TickInput<'_> {
        TickInput {
            buildings:   &self.buildings,
            live:        &self.live,
            week_number: week_number_for(Utc::now()),
        }
    }

    /// Apply one tick's event outcome and run the toy economy.
    fn apply(&mut self, engine: &mut SimEngine, report: &TickReport) {
        let effects = &report.effects;
        self.live.treasury += effects.treasury_delta + effects.released_delayed_value;

        if !effects.buildings_to_rug.is_empty() {
            self.buildings.retain(|b| !effects.buildings_to_rug.contains(&b.id));
            self.version += 1;
        }
        if !effects.buildings_to_shutdown.is_empty() {
            for b in &mut self.buildings {
                if effects.buildings_to_shutdown.contains(&b.id) {
                    b.operational = false;
                }
            }
            self.version += 1;
        }

        let events = &engine.events;
        let income: f64 = self
            .buildings
            .iter()
            .filter(|b| b.operational)
            .map(|b| BASE_INCOME * b.tier as f64 * events.tier_yield_multiplier(b.tier))
            .sum::<f64>()
            * events.aggregate_yield_multiplier();
        let upkeep = BASE_UPKEEP * self.buildings.len() as f64 * events.cost_multiplier();
        let prestige = events.prestige_multiplier();
        let sentiment = events.aggregate_sentiment_delta();

        if !engine.events.defer_yield(income) {
            self.live.treasury += income;
        }
        self.live.treasury -= upkeep;
        self.live.tvl = (self.live.tvl + income * 4.0).max(0.0);
        self.live.happiness = (60.0 + sentiment).clamp(0.0, 100.0);
        if report.tick.is_multiple_of(engine.config.ticks_per_day) {
            let growth = (self.buildings.len() as f64 * 2.0 * prestige).round() as u64;
            self.live.population += growth;
        }
        self.live.building_count = self.buildings.len();
        self.live.category_count = registry::category_count(&self.buildings);
    }
}

fn effects_for(category: &str) -> BuildingEffects {
    let params = |magnitude, radius| Some(SourceParams { magnitude, radius });
    match category {
        "defi"     => BuildingEffects { yield_boost: params(6.0, 3), risk: params(0.4, 2), ..Default::default() },
        "exchange" => BuildingEffects { yield_boost: params(8.0, 2), risk: params(0.6, 3), ..Default::default() },
        "bridge"   => BuildingEffects { risk: params(0.8, 4), ..Default::default() },
        "dao"      => BuildingEffects { protection: params(0.5, 3), ..Default::default() },
        _          => BuildingEffects { yield_boost: params(3.0, 1), ..Default::default() },
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let ticks = parse_arg(&args, "--ticks", 30 * 288u64);
    let buildings = parse_arg(&args, "--buildings", 40usize);
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let db = flag_value(&args, "--db");
    let data_dir = flag_value(&args, "--data-dir").unwrap_or("./data");
    let forced: Vec<&str> = args
        .windows(2)
        .filter(|w| w[0] == "--force")
        .map(|w| w[1].as_str())
        .collect();

    if !ipc_mode {
        println!("CityFi - sim-runner");
        println!("  seed:      {seed}");
        println!("  ticks:     {ticks}");
        println!("  buildings: {buildings}");
        println!("  db:        {}", db.unwrap_or(":memory:"));
        println!("  data_dir:  {data_dir}");
        println!();
    }

    let config = EconomyConfig::load(data_dir)?;
    let store: Box<dyn KvStore> = match db {
        Some(path) => Box::new(SqliteStore::open(path)?),
        None => Box::new(MemoryStore::new()),
    };
    let mut engine = SimEngine::build_seeded(config, store, seed);
    if engine.load() {
        log::info!("resumed session at tick {}", engine.clock.current_tick);
    }
    let mut city = City::synthetic(seed, buildings);

    for event_id in forced {
        if engine.force_event(event_id, &city.buildings).is_none() {
            log::warn!("--force: unknown event '{event_id}'");
        }
    }

    if ipc_mode {
        run_ipc_loop(&mut engine, &mut city)?;
    } else {
        let reports = run(&mut engine, &mut city, ticks);
        engine.save();
        print_summary(&mut engine, &city, &reports);
    }

    Ok(())
}

/// Step the session, feeding each tick's outcome back into the city.
/// Stops early once the game is decided.
fn run(engine: &mut SimEngine, city: &mut City, ticks: u64) -> Vec<TickReport> {
    engine.clock.resume();
    let mut reports = Vec::new();
    for _ in 0..ticks {
        let report = engine.tick(&city.input());
        city.apply(engine, &report);
        let decided = report.outcome.is_decided();
        reports.push(report);
        if decided {
            break;
        }
    }
    engine.clock.pause();
    reports
}

fn run_ipc_loop(engine: &mut SimEngine, city: &mut City) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }

        let cmd: IpcCommand = match serde_json::from_str(&buffer) {
            Ok(c) => c,
            Err(e) => {
                let err_json = serde_json::json!({ "error": e.to_string() });
                writeln!(stdout, "{err_json}")?;
                stdout.flush()?;
                continue;
            }
        };

        match cmd {
            IpcCommand::Quit => break,
            IpcCommand::Tick { count } => {
                let reports = run(engine, city, count);
                let notices: Vec<&SimEvent> = reports
                    .iter()
                    .flat_map(|r| &r.events)
                    .filter(|e| !matches!(e, SimEvent::TickStarted { .. } | SimEvent::TickCompleted { .. }))
                    .collect();
                let reply = serde_json::json!({ "state": build_ui_state(engine, city), "events": notices });
                writeln!(stdout, "{reply}")?;
            }
            IpcCommand::GetState => {
                writeln!(stdout, "{}", serde_json::to_string(&build_ui_state(engine, city))?)?;
            }
            IpcCommand::ForceEvent { event_id } => {
                let started = engine.force_event(&event_id, &city.buildings).is_some();
                let reply = serde_json::json!({ "started": started, "state": build_ui_state(engine, city) });
                writeln!(stdout, "{reply}")?;
            }
            IpcCommand::Claim { objective_id } => {
                let outcome = engine.claim_objective(&objective_id);
                city.live.treasury += outcome.treasury_reward;
                let reply = serde_json::json!({
                    "claimed": outcome.claimed,
                    "treasury_reward": outcome.treasury_reward,
                    "state": build_ui_state(engine, city),
                });
                writeln!(stdout, "{reply}")?;
            }
            IpcCommand::Overlay { overlay } => match OverlayType::parse(&overlay) {
                Some(kind) => {
                    let samples = engine.overlay(kind, &city.buildings, GRID_SIZE, city.version);
                    let samples: &[TileEffectSample] = &samples;
                    writeln!(stdout, "{}", serde_json::to_string(samples)?)?;
                }
                None => {
                    let err_json = serde_json::json!({ "error": format!("unknown overlay '{overlay}'") });
                    writeln!(stdout, "{err_json}")?;
                }
            },
        }
        stdout.flush()?;
    }
    Ok(())
}

fn build_ui_state(engine: &SimEngine, city: &City) -> UiState {
    UiState {
        tick:             engine.clock.current_tick,
        paused:           engine.clock.paused,
        outcome:          engine.outcome(),
        live:             city.live.clone(),
        active_events:    engine.events.active_instances().iter().map(|i| i.event_id().to_string()).collect(),
        yield_multiplier: engine.events.aggregate_yield_multiplier(),
        sentiment_delta:  engine.events.aggregate_sentiment_delta(),
        weekly:           engine.objectives.weekly().objectives.clone(),
    }
}

fn print_summary(engine: &mut SimEngine, city: &City, reports: &[TickReport]) {
    let mut started: BTreeMap<&str, u32> = BTreeMap::new();
    for event in reports.iter().flat_map(|r| &r.events) {
        if let SimEvent::EconomicEventStarted { event_id, .. } = event {
            *started.entry(event_id.as_str()).or_default() += 1;
        }
    }
    let rugged: usize = reports.iter().map(|r| r.effects.buildings_to_rug.len()).sum();
    let shut: usize = reports.iter().map(|r| r.effects.buildings_to_shutdown.len()).sum();

    println!("=== RUN SUMMARY ===");
    println!("  ticks run:      {}", reports.len());
    println!("  final tick:     {}", engine.clock.current_tick);
    println!("  outcome:        {:?}", engine.outcome());
    println!("  treasury:       {:.0}", city.live.treasury);
    println!("  tvl:            {:.0}", city.live.tvl);
    println!("  population:     {}", city.live.population);
    println!("  happiness:      {:.1}", city.live.happiness);
    println!("  buildings:      {} ({} rugged, {} shut down)", city.buildings.len(), rugged, shut);
    println!("  rugs survived:  {}", engine.objectives.long_lived().rug_pulls_survived);

    println!();
    println!("=== ECONOMIC EVENTS ===");
    if started.is_empty() {
        println!("  (No events triggered)");
    } else {
        for (event_id, count) in &started {
            println!("  {event_id:<24} x{count}");
        }
    }
    let active: Vec<&str> = engine.events.active_instances().iter().map(|i| i.event_id()).collect();
    if !active.is_empty() {
        println!("  still active: {}", active.join(", "));
    }

    println!();
    println!("=== WEEKLY OBJECTIVES (week {}) ===", engine.objectives.weekly().week_number);
    for inst in &engine.objectives.weekly().objectives {
        let mark = if inst.claimed { "claimed" } else if inst.completed { "done" } else { "" };
        println!("  {:<16} {:>5.1}% {mark}", inst.objective_id, inst.progress);
    }

    println!();
    println!("=== OVERLAYS ===");
    for kind in OverlayType::ALL {
        let samples = engine.overlay(kind, &city.buildings, GRID_SIZE, city.version);
        let stats = summarize(&samples);
        println!(
            "  {:<10} cells: {:>4} | peak: {:>7.2} | mean: {:.3}",
            kind.as_str(), stats.cells, stats.max_raw, stats.mean_normalized
        );
    }
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2).find(|w| w[0] == flag).map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
