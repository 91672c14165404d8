//! Airseal Headless Scenario Harness
//!
//! Drives the room controller against simulated doors and vents and checks
//! the safety properties end to end. Runs entirely in-process: no device
//! backend, no threads.
//!
//! Usage:
//!   cargo run -p airseal-simtest
//!   cargo run -p airseal-simtest -- --verbose
//!   cargo run -p airseal-simtest -- --settings my_settings.json
//!
//! `RUST_LOG=airseal_logic=debug` shows every door decision.

use airseal_logic::command::OverrideCommand;
use airseal_logic::controller::{Controller, ControllerError};
use airseal_logic::devices::{Door, DoorStatus, Vent};
use airseal_logic::door::LockCycle;
use airseal_logic::registry::{RoomRegistry, TickReport, TopologyError};
use airseal_logic::room::{EmergencyCause, RoomSnapshot, RoomVerdict};
use airseal_logic::settings::Settings;
use airseal_logic::sim::{SimDoor, SimGrid, SimVent};
use airseal_logic::topology::NamePatterns;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

// ── Station layout (embedded) ───────────────────────────────────────────
const STATION_JSON: &str = include_str!("../data/station.json");

/// Upper bound on ticks for any room to finish venting.
const MAX_VENT_TICKS: usize = 60;

/// Ticks of random occupant activity in the fuzz section.
const FUZZ_TICKS: usize = 500;

#[derive(Debug, Deserialize)]
struct StationLayout {
    #[serde(default)]
    settings: Settings,
    vent_rate: f32,
    doors: Vec<String>,
    vents: Vec<VentLayout>,
}

#[derive(Debug, Deserialize)]
struct VentLayout {
    name: String,
    #[serde(default = "full_oxygen")]
    oxygen: f32,
}

fn full_oxygen() -> f32 {
    1.0
}

impl StationLayout {
    fn build(&self) -> SimGrid {
        let mut grid = SimGrid::with_vent_rate(self.vent_rate);
        for name in &self.doors {
            grid.add_door(name);
        }
        for vent in &self.vents {
            grid.add_vent_at(&vent.name, vent.oxygen);
        }
        grid
    }
}

// ── Test harness ────────────────────────────────────────────────────────

struct TestResult {
    name: String,
    passed: bool,
    detail: String,
}

/// Scenario outcome: a detail line on success, the failure reason otherwise.
type Outcome = Result<String, String>;

fn record(name: &str, outcome: Outcome) -> TestResult {
    match outcome {
        Ok(detail) => TestResult {
            name: name.into(),
            passed: true,
            detail,
        },
        Err(detail) => TestResult {
            name: name.into(),
            passed: false,
            detail,
        },
    }
}

struct Options {
    verbose: bool,
    settings_path: Option<String>,
    unknown: Vec<String>,
}

fn parse_options() -> Options {
    let mut options = Options {
        verbose: false,
        settings_path: None,
        unknown: Vec::new(),
    };
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--verbose" => options.verbose = true,
            "--settings" => options.settings_path = args.next(),
            _ => options.unknown.push(arg),
        }
    }
    options
}

fn load_settings(path: &str) -> Result<Settings, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

fn main() {
    let options = parse_options();
    let default_filter = if options.verbose { "info" } else { "off" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .init();
    for arg in &options.unknown {
        log::warn!("Ignoring unknown argument '{}'", arg);
    }

    println!("=== Airseal Scenario Harness ===\n");

    let station: StationLayout = match serde_json::from_str(STATION_JSON) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("embedded station layout is invalid: {}", e);
            std::process::exit(1);
        }
    };
    let settings = match &options.settings_path {
        Some(path) => match load_settings(path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("could not load settings from {}: {}", path, e);
                std::process::exit(1);
            }
        },
        None => station.settings.clone(),
    };
    let errors = settings.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("invalid settings: {}", e);
        }
        std::process::exit(1);
    }
    let verbose = options.verbose;

    let mut results = Vec::new();

    // 1. Station layout and room inference
    results.extend(validate_station(&station, &settings, verbose));

    // 2. Documented scenarios on minimal grids
    results.extend(validate_documented_scenarios(&settings));

    // 3. Manual override commands
    results.extend(validate_override_commands(&station, &settings));

    // 4. Full airlock cycle with vent physics
    results.extend(validate_airlock_cycle(&station, &settings, verbose));

    // 5. Hysteresis under sensor noise
    results.extend(validate_noisy_venting(&station, &settings));

    // 6. Random occupant activity
    results.extend(validate_occupant_fuzz(&station, &settings, verbose));

    // 7. Topology changes and halting
    results.extend(validate_topology_changes(&station, &settings));

    // ── Summary ──
    println!();
    let passed = results.iter().filter(|r| r.passed).count();
    let failed = results.iter().filter(|r| !r.passed).count();
    let total = results.len();

    for r in &results {
        let icon = if r.passed { "✓" } else { "✗" };
        if !r.passed || verbose {
            println!("  {} {}: {}", icon, r.name, r.detail);
        }
    }

    println!(
        "\n=== RESULT: {}/{} passed, {} failed ===",
        passed, total, failed
    );

    if failed > 0 {
        std::process::exit(1);
    }
}

// ── Shared helpers ──────────────────────────────────────────────────────

fn start(grid: &SimGrid, settings: &Settings) -> Result<Controller, String> {
    let mut controller = Controller::new(settings.clone()).map_err(|e| e.to_string())?;
    controller
        .reinitialize(grid, &NamePatterns)
        .map_err(|e| e.to_string())?;
    Ok(controller)
}

fn tick(controller: &mut Controller) -> Result<TickReport, String> {
    controller.tick().map_err(|e| e.to_string())
}

fn door(grid: &SimGrid, name: &str) -> Result<SimDoor, String> {
    grid.door(name)
        .ok_or_else(|| format!("grid has no door '{}'", name))
}

fn vent(grid: &SimGrid, name: &str) -> Result<SimVent, String> {
    grid.vent(name)
        .ok_or_else(|| format!("grid has no vent '{}'", name))
}

fn snapshot(controller: &Controller, room: &str) -> Result<RoomSnapshot, String> {
    controller
        .registry()
        .and_then(|r| r.room(room))
        .map(|r| r.snapshot())
        .ok_or_else(|| format!("room {} is not managed", room))
}

fn ensure(condition: bool, failure: impl Into<String>) -> Result<(), String> {
    if condition {
        Ok(())
    } else {
        Err(failure.into())
    }
}

fn expect_verdict(report: &TickReport, room: &str, expected: RoomVerdict) -> Result<(), String> {
    match report.verdict(room) {
        Some(v) if v == expected => Ok(()),
        other => Err(format!("{}: expected {:?}, got {:?}", room, expected, other)),
    }
}

fn print_snapshots(controller: &Controller) {
    let Some(registry) = controller.registry() else {
        return;
    };
    let snapshots: Vec<RoomSnapshot> = registry.rooms().iter().map(|r| r.snapshot()).collect();
    match serde_json::to_string_pretty(&snapshots) {
        Ok(json) => println!("{}", json),
        Err(e) => println!("  (could not serialize snapshots: {})", e),
    }
}

// ── 1. Station Layout ───────────────────────────────────────────────────

fn validate_station(station: &StationLayout, settings: &Settings, verbose: bool) -> Vec<TestResult> {
    println!("--- Station Layout ---");
    let mut results = Vec::new();

    let grid = station.build();
    let registry = match RoomRegistry::rebuild(&grid, &NamePatterns, settings) {
        Ok(r) => r,
        Err(e) => {
            results.push(TestResult {
                name: "station_rebuild".into(),
                passed: false,
                detail: e.to_string(),
            });
            return results;
        }
    };

    let names: Vec<&str> = registry.rooms().iter().map(|r| r.name()).collect();
    results.push(TestResult {
        name: "station_rooms".into(),
        passed: names == ["Cargo", "Dock"],
        detail: format!("managed rooms: {}", names.join(", ")),
    });

    // Hall and Galley have no outer doors
    let interior: Vec<_> = ["Hall", "Galley"]
        .into_iter()
        .filter(|name| registry.room(name).is_some())
        .collect();
    results.push(TestResult {
        name: "station_interior_pruned".into(),
        passed: interior.is_empty(),
        detail: if interior.is_empty() {
            "interior rooms are not managed".into()
        } else {
            format!("interior rooms kept: {}", interior.join(", "))
        },
    });

    let owners = registry
        .door_by_name("Cargo/Dock")
        .map(|d| d.owners().map(str::to_string).collect::<Vec<_>>());
    results.push(TestResult {
        name: "station_shared_partition".into(),
        passed: owners == Some(vec!["Cargo".to_string(), "Dock".to_string()]),
        detail: format!("Cargo/Dock owners: {:?}", owners),
    });

    let cargo_counts = registry
        .room("Cargo")
        .map(|r| (r.outer_doors().len(), r.vent_count()));
    results.push(TestResult {
        name: "station_numbered_devices".into(),
        passed: cargo_counts == Some((2, 2)),
        detail: format!("Cargo (outer doors, vents): {:?}", cargo_counts),
    });

    results.push(TestResult {
        name: "station_unmatched_ignored".into(),
        passed: registry.door_by_name("Hangar Door").is_none(),
        detail: "unnamed doors and orphan vents are skipped".into(),
    });

    if verbose {
        println!("  Rooms:");
        for room in registry.rooms() {
            println!(
                "    {:<8} {} inner, {} outer, {} vents",
                room.name(),
                room.inner_doors().len(),
                room.outer_doors().len(),
                room.vent_count()
            );
        }
    }

    results
}

// ── 2. Documented Scenarios ─────────────────────────────────────────────

fn validate_documented_scenarios(settings: &Settings) -> Vec<TestResult> {
    println!("--- Documented Scenarios ---");
    vec![
        record("scenario_alpha", scenario_alpha(settings)),
        record("scenario_bravo", scenario_bravo(settings)),
        record("scenario_override_on_off", scenario_override_on_off(settings)),
        record("scenario_sticky_shared_door", scenario_sticky_shared_door(settings)),
        record("scenario_single_cycle", scenario_single_cycle(settings)),
    ]
}

fn twin_airlocks() -> SimGrid {
    let mut grid = SimGrid::new();
    grid.add_door("Alpha Outer");
    grid.add_door("Bravo Outer");
    grid.add_door("Alpha/Bravo");
    grid.add_vent("Alpha Vent");
    grid.add_vent("Bravo Vent");
    grid
}

fn scenario_alpha(settings: &Settings) -> Outcome {
    let mut grid = SimGrid::new();
    let outer = grid.add_door("Alpha Outer");
    let inner = grid.add_door("Alpha/Hall");
    grid.add_vent("Alpha Vent");
    inner.force_status(DoorStatus::Open);

    let mut c = start(&grid, settings)?;
    let report = tick(&mut c)?;
    expect_verdict(&report, "Alpha", RoomVerdict::Normal)?;
    ensure(!outer.is_enabled(), "outer door left enabled")?;
    ensure(inner.is_enabled(), "inner door disabled")?;
    Ok("inner open, outer locked, no emergency".into())
}

fn scenario_bravo(settings: &Settings) -> Outcome {
    let grid = twin_airlocks();
    let mut bravo_vent = vent(&grid, "Bravo Vent")?;
    bravo_vent.set_depressurize(true);
    bravo_vent.set_oxygen_level(0.0);
    door(&grid, "Bravo Outer")?.force_status(DoorStatus::Open);
    door(&grid, "Alpha/Bravo")?.force_status(DoorStatus::Open);

    let mut c = start(&grid, settings)?;
    let report = tick(&mut c)?;
    expect_verdict(
        &report,
        "Bravo",
        RoomVerdict::Emergency(EmergencyCause::BothDoorSetsOpen),
    )?;
    ensure(bravo_vent.is_depressurizing(), "Bravo vents not depressurizing")?;
    let shared = c
        .registry()
        .and_then(|r| r.door_by_name("Alpha/Bravo"))
        .ok_or("Alpha/Bravo not coordinated")?;
    ensure(
        shared.room_in_emergency("Bravo") == Some(true),
        "shared door did not record Bravo's emergency",
    )?;
    Ok("both sides open → emergency reaches the shared door".into())
}

fn scenario_override_on_off(settings: &Settings) -> Outcome {
    let mut grid = SimGrid::new();
    grid.add_door("Lock Outer");
    grid.add_door("Lock/Hall");
    let lock_vent = grid.add_vent("Lock Vent");

    let mut c = start(&grid, settings)?;
    tick(&mut c)?;

    c.run_command("-emergency");
    let report = tick(&mut c)?;
    expect_verdict(
        &report,
        "Lock",
        RoomVerdict::Emergency(EmergencyCause::UserOverride),
    )?;
    ensure(lock_vent.is_depressurizing(), "override did not depressurize")?;

    c.run_command("");
    let report = tick(&mut c)?;
    expect_verdict(&report, "Lock", RoomVerdict::Recovered)?;
    ensure(!lock_vent.is_depressurizing(), "vents not restored to pressurize")?;
    let released = c
        .registry()
        .map(|r| r.doors().iter().all(|d| d.lock_cycle() == LockCycle::Released))
        .unwrap_or(false);
    ensure(released, "doors still in lock cycle after recovery")?;
    Ok("override declared, cleared, vents restored".into())
}

fn scenario_sticky_shared_door(settings: &Settings) -> Outcome {
    let grid = twin_airlocks();
    let alpha_outer = door(&grid, "Alpha Outer")?;
    let bravo_outer = door(&grid, "Bravo Outer")?;
    let partition = door(&grid, "Alpha/Bravo")?;
    let mut c = start(&grid, settings)?;
    tick(&mut c)?;

    alpha_outer.force_status(DoorStatus::Open);
    bravo_outer.force_status(DoorStatus::Open);
    let report = tick(&mut c)?;
    ensure(report.emergencies().count() == 2, "expected two emergencies")?;

    alpha_outer.force_status(DoorStatus::Closed);
    let report = tick(&mut c)?;
    expect_verdict(&report, "Alpha", RoomVerdict::Recovered)?;
    ensure(
        !partition.is_enabled(),
        "partition released while Bravo is still open to space",
    )?;

    bravo_outer.force_status(DoorStatus::Closed);
    let report = tick(&mut c)?;
    expect_verdict(&report, "Bravo", RoomVerdict::Recovered)?;
    ensure(partition.is_enabled(), "partition not released after both cleared")?;
    Ok("partition held until both rooms cleared".into())
}

fn scenario_single_cycle(settings: &Settings) -> Outcome {
    let mut grid = SimGrid::new();
    grid.add_door("Lock Outer");
    let partition = grid.add_door("Lock/Hall");
    grid.add_vent("Lock Vent");
    let mut c = start(&grid, settings)?;
    c.run_command("-emergency");

    let cycle = |c: &Controller| {
        c.registry()
            .and_then(|r| r.door_by_name("Lock/Hall"))
            .map(|d| d.lock_cycle())
    };

    tick(&mut c)?;
    tick(&mut c)?;
    ensure(cycle(&c) == Some(LockCycle::Sealed), "partition never sealed")?;

    partition.force_status(DoorStatus::Open);
    for _ in 0..3 {
        tick(&mut c)?;
    }
    ensure(
        cycle(&c) == Some(LockCycle::PassThrough),
        format!("expected one pass-through, got {:?}", cycle(&c)),
    )?;

    partition.force_status(DoorStatus::Closed);
    tick(&mut c)?;
    ensure(!partition.is_enabled(), "door enabled after pass-through")?;
    tick(&mut c)?;
    ensure(cycle(&c) == Some(LockCycle::Sealed), "partition not resealed")?;
    Ok("one manual pass per open/close".into())
}

// ── 3. Override Commands ────────────────────────────────────────────────

fn validate_override_commands(station: &StationLayout, settings: &Settings) -> Vec<TestResult> {
    println!("--- Override Commands ---");
    let mut results = Vec::new();

    let grid = station.build();
    let mut c = match start(&grid, settings) {
        Ok(c) => c,
        Err(e) => {
            results.push(TestResult {
                name: "override_start".into(),
                passed: false,
                detail: e,
            });
            return results;
        }
    };

    let parsed = [
        ("-EMERGENCY", c.run_command("-EMERGENCY")),
        ("-panic", c.run_command("-panic")),
        ("-recovery", c.run_command("-recovery")),
    ];
    let expected = [
        OverrideCommand::Activate,
        OverrideCommand::Unrecognized("-panic".into()),
        OverrideCommand::Activate,
    ];
    let mismatched: Vec<_> = parsed
        .iter()
        .zip(&expected)
        .filter(|((_, got), want)| got != *want)
        .map(|((arg, got), _)| format!("{} → {:?}", arg, got))
        .collect();
    results.push(TestResult {
        name: "override_parse".into(),
        passed: mismatched.is_empty(),
        detail: if mismatched.is_empty() {
            "switches match case-insensitively, typos clear".into()
        } else {
            mismatched.join(", ")
        },
    });

    results.push(record("override_locks_every_room", override_all_rooms(&mut c, &grid)));
    results
}

fn override_all_rooms(c: &mut Controller, grid: &SimGrid) -> Outcome {
    let rooms = c.registry().map(|r| r.len()).unwrap_or(0);
    let report = tick(c)?;
    let declared = report
        .emergencies()
        .filter(|(_, cause)| *cause == EmergencyCause::UserOverride)
        .count();
    ensure(
        declared == rooms,
        format!("{} of {} rooms declared emergency", declared, rooms),
    )?;

    c.run_command("");
    let report = tick(c)?;
    let recovered = report
        .rooms
        .iter()
        .filter(|r| r.verdict == RoomVerdict::Recovered)
        .count();
    ensure(
        recovered == rooms,
        format!("{} of {} rooms recovered", recovered, rooms),
    )?;
    for name in ["Dock Vent", "Cargo Air Vent", "Cargo AirVent 2"] {
        ensure(
            !vent(grid, name)?.is_depressurizing(),
            format!("{} still depressurizing", name),
        )?;
    }
    Ok(format!("{} rooms locked down and restored", rooms))
}

// ── 4. Airlock Cycle ────────────────────────────────────────────────────

fn validate_airlock_cycle(station: &StationLayout, settings: &Settings, verbose: bool) -> Vec<TestResult> {
    println!("--- Airlock Cycle ---");
    vec![record(
        "airlock_full_cycle",
        airlock_full_cycle(station, settings, verbose),
    )]
}

fn airlock_full_cycle(station: &StationLayout, settings: &Settings, verbose: bool) -> Outcome {
    let mut grid = station.build();
    let mut dock_vent = vent(&grid, "Dock Vent")?;
    let outer = door(&grid, "Dock Outer")?;
    let hall = door(&grid, "Dock/Hall")?;
    let cargo = door(&grid, "Cargo/Dock")?;
    let mut c = start(&grid, settings)?;
    tick(&mut c)?;

    // The first reading after the switch has not moved yet: the doors are
    // released for one tick and locked again by the next falling reading.
    dock_vent.set_depressurize(true);
    tick(&mut c)?;
    ensure(
        !snapshot(&c, "Dock")?.monitor_oxygen_level && outer.is_enabled(),
        "switch tick did not release the doors",
    )?;
    grid.step();
    tick(&mut c)?;
    ensure(
        snapshot(&c, "Dock")?.monitor_oxygen_level && !outer.is_enabled(),
        "outer door not relocked once oxygen started falling",
    )?;

    let mut settled_after = None;
    for n in 1..=MAX_VENT_TICKS {
        grid.step();
        let report = tick(&mut c)?;
        expect_verdict(&report, "Dock", RoomVerdict::Normal)?;
        let dock = snapshot(&c, "Dock")?;
        if verbose {
            println!("  tick {:>2}: Dock oxygen {:.5}", n, dock.oxygen_level);
        }
        if !dock.monitor_oxygen_level {
            settled_after = Some(n);
            break;
        }
        ensure(
            !outer.is_enabled(),
            format!("outer door released at oxygen {:.5}", dock.oxygen_level),
        )?;
    }
    let settled_after = settled_after
        .ok_or_else(|| format!("Dock still venting after {} ticks", MAX_VENT_TICKS))?;
    ensure(
        outer.is_enabled() && hall.is_enabled(),
        "doors not released after venting",
    )?;

    // Residual oxygen toggles the lock until the vent reaches vacuum.
    let mut vacuum = false;
    for _ in 0..10 {
        grid.step();
        tick(&mut c)?;
        if dock_vent.oxygen_level() == 0.0 && !snapshot(&c, "Dock")?.monitor_oxygen_level {
            vacuum = true;
            break;
        }
    }
    ensure(vacuum, "Dock never reached a stable vacuum")?;

    // Someone steps out through the outer door.
    ensure(outer.push_open(), "occupant could not open the outer door")?;
    tick(&mut c)?;
    ensure(
        !hall.is_enabled() && !cargo.is_enabled(),
        "inner doors enabled while the outer door is open",
    )?;
    grid.step();
    ensure(!cargo.push_open(), "Cargo/Dock opened into an open airlock")?;

    outer.push_close();
    tick(&mut c)?;
    grid.step();
    tick(&mut c)?;
    ensure(
        hall.is_enabled() && cargo.is_enabled(),
        "inner doors still locked after the outer door closed",
    )?;

    if verbose {
        print_snapshots(&c);
    }
    Ok(format!("Dock settled after {} ticks", settled_after))
}

// ── 5. Noisy Venting ────────────────────────────────────────────────────

fn validate_noisy_venting(station: &StationLayout, settings: &Settings) -> Vec<TestResult> {
    println!("--- Noisy Venting ---");
    vec![record("noisy_venting_converges", noisy_venting(station, settings))]
}

fn noisy_venting(station: &StationLayout, settings: &Settings) -> Outcome {
    // Sensor jitter well below the settle threshold.
    let noise = settings.settle_threshold * 0.2;
    let mut worst_release = 0.0_f32;
    let mut slowest = 0;

    for seed in 0..16_u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut grid = station.build();
        let mut dock_vent = vent(&grid, "Dock Vent")?;
        let outer = door(&grid, "Dock Outer")?;
        let mut c = start(&grid, settings)?;
        tick(&mut c)?;
        dock_vent.set_depressurize(true);
        tick(&mut c)?;
        ensure(
            outer.is_enabled(),
            format!("seed {}: switch tick did not release the doors", seed),
        )?;

        let mut released = None;
        for n in 1..=MAX_VENT_TICKS {
            grid.step();
            let level = dock_vent.oxygen_level();
            dock_vent.set_oxygen_level(level + rng.gen_range(-noise..=noise));
            tick(&mut c)?;
            let dock = snapshot(&c, "Dock")?;
            if n == 1 {
                ensure(
                    dock.monitor_oxygen_level && !outer.is_enabled(),
                    format!("seed {}: outer not relocked after the switch tick", seed),
                )?;
                continue;
            }
            if !dock.monitor_oxygen_level {
                released = Some((n, dock.oxygen_level));
                break;
            }
            ensure(
                !outer.is_enabled(),
                format!("seed {}: outer released at oxygen {:.5}", seed, dock.oxygen_level),
            )?;
        }

        let (n, level) = released.ok_or_else(|| format!("seed {}: never settled", seed))?;
        ensure(
            level < settings.settle_threshold * 10.0,
            format!("seed {}: released early at oxygen {:.5}", seed, level),
        )?;
        worst_release = worst_release.max(level);
        slowest = slowest.max(n);
    }

    Ok(format!(
        "16 seeds settled within {} ticks, highest release level {:.5}",
        slowest, worst_release
    ))
}

// ── 6. Occupant Fuzz ────────────────────────────────────────────────────

fn validate_occupant_fuzz(station: &StationLayout, settings: &Settings, verbose: bool) -> Vec<TestResult> {
    println!("--- Occupant Fuzz ---");
    vec![record(
        "fuzz_invariants_hold",
        occupant_fuzz(station, settings, verbose),
    )]
}

fn occupant_fuzz(station: &StationLayout, settings: &Settings, verbose: bool) -> Outcome {
    let mut rng = StdRng::seed_from_u64(0xA125_EA1);
    let mut grid = station.build();
    let doors: Vec<SimDoor> = station
        .doors
        .iter()
        .map(|name| door(&grid, name))
        .collect::<Result<_, _>>()?;
    let mut vents: Vec<SimVent> = station
        .vents
        .iter()
        .map(|v| vent(&grid, &v.name))
        .collect::<Result<_, _>>()?;
    let mut c = start(&grid, settings)?;

    let mut emergencies = 0;
    let mut recoveries = 0;
    let mut reverts = 0;

    for n in 0..FUZZ_TICKS {
        // Occupants push buttons; the operator sometimes flips a vent or a
        // hull plate fails.
        let d = &doors[rng.gen_range(0..doors.len())];
        if rng.gen_bool(0.5) {
            d.push_open();
        } else {
            d.push_close();
        }
        if rng.gen_bool(0.05) {
            let v = &mut vents[rng.gen_range(0..station.vents.len())];
            let depressurize = !v.is_depressurizing();
            v.set_depressurize(depressurize);
        }
        if rng.gen_bool(0.02) {
            let v = &vents[rng.gen_range(0..station.vents.len())];
            v.set_can_pressurize(!v.can_pressurize());
        }

        let report = tick(&mut c)?;
        for r in &report.rooms {
            match r.verdict {
                RoomVerdict::Emergency(_) => emergencies += 1,
                RoomVerdict::Recovered => recoveries += 1,
                RoomVerdict::ModeReverted => reverts += 1,
                RoomVerdict::Normal => {}
            }
        }
        check_invariants(&c, &report).map_err(|e| format!("tick {}: {}", n, e))?;
        grid.step();
    }

    if verbose {
        print_snapshots(&c);
    }
    Ok(format!(
        "{} ticks: {} emergency verdicts, {} recoveries, {} mode reverts",
        FUZZ_TICKS, emergencies, recoveries, reverts
    ))
}

fn check_invariants(c: &Controller, report: &TickReport) -> Result<(), String> {
    let registry = c.registry().ok_or("controller halted")?;

    for coord in registry.doors() {
        if coord.in_emergency() == (coord.lock_cycle() == LockCycle::Released) {
            return Err(format!(
                "door '{}' in_emergency={} but cycle {:?}",
                coord.name(),
                coord.in_emergency(),
                coord.lock_cycle()
            ));
        }
        let locked = matches!(coord.lock_cycle(), LockCycle::Sealed | LockCycle::PassThrough);
        if locked && coord.is_enabled() {
            return Err(format!("door '{}' enabled while {:?}", coord.name(), coord.lock_cycle()));
        }
    }

    for room in registry.rooms() {
        if room.in_emergency() {
            let all_locked = room
                .inner_doors()
                .iter()
                .chain(room.outer_doors())
                .filter_map(|&id| registry.door(id))
                .all(|d| d.room_in_emergency(room.name()) == Some(true));
            if !all_locked {
                return Err(format!("{} in emergency but a door does not know", room.name()));
            }
        }
    }

    for r in &report.rooms {
        if r.pressurized && r.verdict == RoomVerdict::Normal {
            let snap = registry
                .room(&r.room)
                .map(|room| room.snapshot())
                .ok_or_else(|| format!("{} missing", r.room))?;
            if snap.outer_door_open {
                return Err(format!("{} pressurized and normal with outer door open", r.room));
            }
        }
    }

    Ok(())
}

// ── 7. Topology Changes ─────────────────────────────────────────────────

fn validate_topology_changes(station: &StationLayout, settings: &Settings) -> Vec<TestResult> {
    println!("--- Topology Changes ---");
    vec![record("topology_rebuild_and_halt", topology_rebuild(station, settings))]
}

fn topology_rebuild(station: &StationLayout, settings: &Settings) -> Outcome {
    let mut grid = station.build();
    let mut c = start(&grid, settings)?;
    tick(&mut c)?;

    // Cargo loses both vents: the new generation is rejected.
    grid.remove("Cargo Air Vent");
    grid.remove("Cargo AirVent 2");
    match c.reinitialize(&grid, &NamePatterns) {
        Err(ControllerError::Topology(TopologyError::InvalidRooms(defects)))
            if defects.len() == 1 && defects[0].room == "Cargo" => {}
        other => return Err(format!("expected Cargo to be invalid, got {:?}", other)),
    }
    ensure(
        matches!(c.tick(), Err(ControllerError::Halted)),
        "controller kept ticking an invalid topology",
    )?;

    grid.add_vent("Cargo Vent");
    c.reinitialize(&grid, &NamePatterns)
        .map_err(|e| e.to_string())?;
    let report = tick(&mut c)?;
    ensure(report.rooms.len() == 2, "rebuilt station lost a room")?;
    Ok("invalid rebuild halts, fixed rebuild resumes".into())
}
