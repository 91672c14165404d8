//! End-to-end scenarios for the controller.
//!
//! Exercises: SimGrid → NamePatterns → RoomRegistry → Controller ticks,
//! with the simulated actuators stepped between ticks.
//!
//! All tests are pure logic: no device backend, no threads.

use airseal_logic::controller::Controller;
use airseal_logic::devices::{Door, DoorStatus, Vent};
use airseal_logic::door::LockCycle;
use airseal_logic::registry::RoomRegistry;
use airseal_logic::room::{EmergencyCause, Room, RoomVerdict};
use airseal_logic::settings::Settings;
use airseal_logic::sim::SimGrid;
use airseal_logic::topology::NamePatterns;

// ── Helpers ────────────────────────────────────────────────────────────

/// A single airlock "Dock" between the "Hall" and vacuum.
fn dock() -> SimGrid {
    let mut grid = SimGrid::new();
    grid.add_door("Dock Outer");
    grid.add_door("Dock/Hall");
    grid.add_vent("Dock Vent");
    grid
}

/// Two airlocks, Alpha and Bravo, sharing a partition door.
fn twin_airlocks() -> SimGrid {
    let mut grid = SimGrid::new();
    grid.add_door("Alpha Outer");
    grid.add_door("Bravo Outer");
    grid.add_door("Alpha/Bravo");
    grid.add_vent("Alpha Vent");
    grid.add_vent("Bravo Vent");
    grid
}

fn start(grid: &SimGrid) -> Controller {
    let mut controller = Controller::new(Settings::default()).unwrap();
    controller.reinitialize(grid, &NamePatterns).unwrap();
    controller
}

fn room<'a>(controller: &'a Controller, name: &str) -> &'a Room {
    controller.registry().unwrap().room(name).unwrap()
}

fn enabled(grid: &SimGrid, door: &str) -> bool {
    grid.door(door).unwrap().is_enabled()
}

// ── Documented scenarios ──────────────────────────────────────────────

#[test]
fn alpha_pressurized_with_inner_door_open() {
    let mut grid = SimGrid::new();
    grid.add_door("Alpha Outer");
    grid.add_door("Alpha/Hall");
    grid.add_vent("Alpha Vent");
    grid.door("Alpha/Hall").unwrap().force_status(DoorStatus::Open);

    let mut c = start(&grid);
    let report = c.tick().unwrap();

    assert_eq!(report.verdict("Alpha"), Some(RoomVerdict::Normal));
    assert!(!enabled(&grid, "Alpha Outer"));
    assert!(enabled(&grid, "Alpha/Hall"));
    assert!(!room(&c, "Alpha").in_emergency());
}

#[test]
fn bravo_depressurized_with_both_sides_open() {
    let grid = twin_airlocks();
    let mut vent = grid.vent("Bravo Vent").unwrap();
    vent.set_depressurize(true);
    vent.set_oxygen_level(0.0);
    grid.door("Bravo Outer").unwrap().force_status(DoorStatus::Open);
    grid.door("Alpha/Bravo").unwrap().force_status(DoorStatus::Open);

    let mut c = start(&grid);
    let report = c.tick().unwrap();

    assert_eq!(
        report.verdict("Bravo"),
        Some(RoomVerdict::Emergency(EmergencyCause::BothDoorSetsOpen))
    );
    assert!(vent.is_depressurizing());
    let shared = c.registry().unwrap().door_by_name("Alpha/Bravo").unwrap();
    assert_eq!(shared.room_in_emergency("Bravo"), Some(true));
    assert_eq!(shared.room_in_emergency("Alpha"), Some(false));
}

#[test]
fn override_for_one_tick_then_cleared() {
    let grid = dock();
    let vent = grid.vent("Dock Vent").unwrap();
    let mut c = start(&grid);
    c.tick().unwrap();

    c.run_command("-emergency");
    let report = c.tick().unwrap();
    assert_eq!(
        report.verdict("Dock"),
        Some(RoomVerdict::Emergency(EmergencyCause::UserOverride))
    );
    assert!(vent.is_depressurizing());
    assert!(room(&c, "Dock").pressurized_before_emergency());

    c.run_command("");
    let report = c.tick().unwrap();
    assert_eq!(report.verdict("Dock"), Some(RoomVerdict::Recovered));
    assert!(!vent.is_depressurizing());
    assert!(!room(&c, "Dock").in_emergency());
    assert!(c
        .registry()
        .unwrap()
        .doors()
        .iter()
        .all(|d| d.lock_cycle() == LockCycle::Released));
}

// ── Properties ────────────────────────────────────────────────────────

#[test]
fn shared_door_stays_locked_until_both_rooms_clear() {
    let grid = twin_airlocks();
    let mut c = start(&grid);
    c.tick().unwrap();

    grid.door("Alpha Outer").unwrap().force_status(DoorStatus::Open);
    grid.door("Bravo Outer").unwrap().force_status(DoorStatus::Open);
    let report = c.tick().unwrap();
    assert_eq!(report.emergencies().count(), 2);
    assert!(!enabled(&grid, "Alpha/Bravo"));

    // Alpha seals up and recovers; Bravo is still open to space.
    grid.door("Alpha Outer").unwrap().force_status(DoorStatus::Closed);
    let report = c.tick().unwrap();
    assert_eq!(report.verdict("Alpha"), Some(RoomVerdict::Recovered));
    let shared = c.registry().unwrap().door_by_name("Alpha/Bravo").unwrap();
    assert_eq!(shared.room_in_emergency("Alpha"), Some(false));
    assert!(shared.in_emergency());
    assert!(!enabled(&grid, "Alpha/Bravo"));

    grid.door("Bravo Outer").unwrap().force_status(DoorStatus::Closed);
    let report = c.tick().unwrap();
    assert_eq!(report.verdict("Bravo"), Some(RoomVerdict::Recovered));
    let shared = c.registry().unwrap().door_by_name("Alpha/Bravo").unwrap();
    assert!(!shared.in_emergency());
    assert_eq!(shared.lock_cycle(), LockCycle::Released);
    assert!(enabled(&grid, "Alpha/Bravo"));
}

#[test]
fn lockdown_allows_one_manual_pass_at_a_time() {
    let grid = dock();
    let partition = grid.door("Dock/Hall").unwrap();
    let mut c = start(&grid);
    c.run_command("-emergency");

    let cycle = |c: &Controller| {
        c.registry()
            .unwrap()
            .door_by_name("Dock/Hall")
            .unwrap()
            .lock_cycle()
    };

    c.tick().unwrap();
    assert_eq!(cycle(&c), LockCycle::AwaitingClose);
    c.tick().unwrap();
    assert_eq!(cycle(&c), LockCycle::Sealed);
    assert!(!partition.is_enabled());
    assert!(!partition.push_open());

    // Hand-cranked open.
    partition.force_status(DoorStatus::Open);
    c.tick().unwrap();
    assert_eq!(cycle(&c), LockCycle::PassThrough);
    c.tick().unwrap();
    c.tick().unwrap();
    assert_eq!(cycle(&c), LockCycle::PassThrough);

    partition.force_status(DoorStatus::Closed);
    c.tick().unwrap();
    assert_eq!(cycle(&c), LockCycle::AwaitingClose);
    assert!(!partition.is_enabled());
    c.tick().unwrap();
    assert_eq!(cycle(&c), LockCycle::Sealed);
}

#[test]
fn full_airlock_cycle_converges() {
    let mut grid = dock();
    let mut vent = grid.vent("Dock Vent").unwrap();
    let outer = grid.door("Dock Outer").unwrap();
    let inner = grid.door("Dock/Hall").unwrap();
    let mut c = start(&grid);

    c.tick().unwrap();
    assert!(!outer.is_enabled());

    // Operator switches the airlock to depressurize. The reading has not
    // moved yet, so the doors are released for this one tick.
    vent.set_depressurize(true);
    let report = c.tick().unwrap();
    assert_eq!(report.verdict("Dock"), Some(RoomVerdict::Normal));
    assert!(!room(&c, "Dock").monitor_oxygen_level());
    assert!(outer.is_enabled());

    // First falling reading locks the outer door again.
    grid.step();
    c.tick().unwrap();
    assert!(room(&c, "Dock").monitor_oxygen_level());
    assert!(!outer.is_enabled());

    let mut settled = false;
    for _ in 0..40 {
        grid.step();
        let report = c.tick().unwrap();
        assert_eq!(report.verdict("Dock"), Some(RoomVerdict::Normal));
        if !room(&c, "Dock").monitor_oxygen_level() {
            settled = true;
            break;
        }
        assert!(!outer.is_enabled(), "outer door released while venting");
        assert!(inner.is_enabled());
    }
    assert!(settled, "room never finished depressurizing");
    assert!(outer.is_enabled());
    assert!(inner.is_enabled());

    // Residual oxygen relocks and releases until the vent reaches vacuum.
    let mut vacuum = false;
    for _ in 0..10 {
        grid.step();
        c.tick().unwrap();
        if vent.oxygen_level() == 0.0 && !room(&c, "Dock").monitor_oxygen_level() {
            vacuum = true;
            break;
        }
    }
    assert!(vacuum, "room never reached a stable vacuum");
    assert!(outer.is_enabled());
    assert!(inner.is_enabled());

    // Someone steps out.
    assert!(outer.push_open());
    c.tick().unwrap();
    assert!(!inner.is_enabled());
    grid.step();
    assert!(!inner.push_open());

    assert!(outer.push_close());
    c.tick().unwrap();
    grid.step();
    c.tick().unwrap();
    assert!(inner.is_enabled());
    assert!(outer.is_enabled());
}

#[test]
fn vent_switch_with_door_open_is_reverted() {
    let mut grid = dock();
    let mut vent = grid.vent("Dock Vent").unwrap();
    let inner = grid.door("Dock/Hall").unwrap();
    let outer = grid.door("Dock Outer").unwrap();
    let mut c = start(&grid);
    c.tick().unwrap();

    inner.push_open();
    grid.step();
    c.tick().unwrap();
    let before = (inner.is_enabled(), outer.is_enabled());

    vent.set_depressurize(true);
    let report = c.tick().unwrap();
    assert_eq!(report.verdict("Dock"), Some(RoomVerdict::ModeReverted));
    assert!(!vent.is_depressurizing());
    assert_eq!((inner.is_enabled(), outer.is_enabled()), before);
}

#[test]
fn open_outer_door_in_pressurized_room_is_always_an_emergency() {
    for (oxygen, inner_open) in [(1.0, false), (1.0, true), (0.4, false), (0.0, true)] {
        let grid = dock();
        grid.vent("Dock Vent").unwrap().set_oxygen_level(oxygen);
        if inner_open {
            grid.door("Dock/Hall").unwrap().force_status(DoorStatus::Open);
        }
        grid.door("Dock Outer").unwrap().force_status(DoorStatus::Opening);

        let mut c = start(&grid);
        let report = c.tick().unwrap();
        assert_eq!(
            report.verdict("Dock"),
            Some(RoomVerdict::Emergency(
                EmergencyCause::OuterDoorOpenWhilePressurized
            )),
            "oxygen={oxygen} inner_open={inner_open}"
        );
        assert!(room(&c, "Dock").in_emergency());
    }
}

// ── Degraded modes ────────────────────────────────────────────────────

#[test]
fn hull_breach_recovers_once_sealed() {
    let grid = dock();
    let vent = grid.vent("Dock Vent").unwrap();
    let mut c = start(&grid);
    c.tick().unwrap();

    vent.set_can_pressurize(false);
    let report = c.tick().unwrap();
    assert_eq!(
        report.verdict("Dock"),
        Some(RoomVerdict::Emergency(EmergencyCause::HullBreach))
    );
    assert!(vent.is_depressurizing());

    vent.set_can_pressurize(true);
    let report = c.tick().unwrap();
    assert_eq!(report.verdict("Dock"), Some(RoomVerdict::Recovered));
    assert!(!vent.is_depressurizing());
}

#[test]
fn jammed_door_holds_the_lock_cycle() {
    let grid = dock();
    let partition = grid.door("Dock/Hall").unwrap();
    partition.force_status(DoorStatus::Open);
    let mut c = start(&grid);
    c.run_command("-emergency");

    for _ in 0..10 {
        c.tick().unwrap();
        partition.force_status(DoorStatus::Open);
    }
    let coord = c.registry().unwrap().door_by_name("Dock/Hall").unwrap();
    assert_eq!(coord.lock_cycle(), LockCycle::AwaitingClose);
    assert!(partition.is_enabled());
    assert_eq!(partition.close_commands(), 1);
}

#[test]
fn topology_change_needs_reinitialize() {
    let mut grid = dock();
    let mut c = start(&grid);
    c.tick().unwrap();

    grid.add_door("Cargo Outer");
    grid.add_door("Cargo/Hall");
    assert_eq!(c.registry().unwrap().len(), 1);

    // Cargo has no vent yet: the new topology is rejected.
    assert!(c.reinitialize(&grid, &NamePatterns).is_err());
    assert!(c.tick().is_err());

    grid.add_vent("Cargo Air Vent");
    c.reinitialize(&grid, &NamePatterns).unwrap();
    let report = c.tick().unwrap();
    assert_eq!(report.rooms.len(), 2);
}

#[test]
fn registry_report_serializes() {
    let grid = twin_airlocks();
    let mut registry = RoomRegistry::rebuild(&grid, &NamePatterns, &Settings::default()).unwrap();
    let report = registry.tick(true);
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["rooms"][0]["room"], "Alpha");
    assert_eq!(
        json["rooms"][0]["verdict"]["Emergency"],
        "UserOverride"
    );
}
