//! In-memory doors and vents for tests and the headless harness.
//!
//! Handles are reference-counted views onto shared state, the same way a real
//! device API hands out proxies: the controller holds one clone, the test or
//! scenario script holds another and plays the occupants.
//!
//! The actuator model is deliberately crude. Doors take one [`SimGrid::step`]
//! to finish opening or closing; each vent moves its own oxygen level by a
//! fixed fraction per step. There is no gas exchange between rooms.
//!
//! ```
//! use airseal_logic::devices::{Door, DoorStatus};
//! use airseal_logic::sim::SimGrid;
//!
//! let mut grid = SimGrid::new();
//! let door = grid.add_door("Bay Outer");
//! assert!(door.push_open());
//! grid.step();
//! assert_eq!(door.status(), DoorStatus::Open);
//! ```

use std::cell::RefCell;
use std::rc::Rc;

use crate::devices::{DeviceSource, Door, DoorStatus, Vent};

/// Default fraction of the remaining gradient a vent closes per step.
pub const DEFAULT_VENT_RATE: f32 = 0.5;

/// Levels below this snap to a hard vacuum.
const VACUUM_FLOOR: f32 = 1e-4;

#[derive(Debug)]
struct DoorState {
    status: DoorStatus,
    enabled: bool,
    close_commands: u32,
}

/// A simulated door. Starts closed and enabled.
#[derive(Debug, Clone)]
pub struct SimDoor {
    name: Rc<str>,
    state: Rc<RefCell<DoorState>>,
}

impl SimDoor {
    pub fn new(name: &str) -> Self {
        Self {
            name: Rc::from(name),
            state: Rc::new(RefCell::new(DoorState {
                status: DoorStatus::Closed,
                enabled: true,
                close_commands: 0,
            })),
        }
    }

    /// An occupant tries to open the door. Returns false if it is disabled.
    pub fn push_open(&self) -> bool {
        let mut s = self.state.borrow_mut();
        if !s.enabled {
            return false;
        }
        if matches!(s.status, DoorStatus::Closed | DoorStatus::Closing) {
            s.status = DoorStatus::Opening;
        }
        true
    }

    /// An occupant tries to close the door. Returns false if it is disabled.
    pub fn push_close(&self) -> bool {
        let mut s = self.state.borrow_mut();
        if !s.enabled {
            return false;
        }
        if matches!(s.status, DoorStatus::Open | DoorStatus::Opening) {
            s.status = DoorStatus::Closing;
        }
        true
    }

    /// Force the reported status, ignoring the enabled flag (jammed or
    /// hand-cranked doors).
    pub fn force_status(&self, status: DoorStatus) {
        self.state.borrow_mut().status = status;
    }

    /// Number of close commands received from the controller.
    pub fn close_commands(&self) -> u32 {
        self.state.borrow().close_commands
    }

    fn step(&self) {
        let mut s = self.state.borrow_mut();
        s.status = match s.status {
            DoorStatus::Opening => DoorStatus::Open,
            DoorStatus::Closing => DoorStatus::Closed,
            other => other,
        };
    }
}

impl Door for SimDoor {
    fn name(&self) -> &str {
        &self.name
    }

    fn status(&self) -> DoorStatus {
        self.state.borrow().status
    }

    fn is_enabled(&self) -> bool {
        self.state.borrow().enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.state.borrow_mut().enabled = enabled;
    }

    fn close(&mut self) {
        let mut s = self.state.borrow_mut();
        s.close_commands += 1;
        if s.enabled && s.status.is_open() {
            s.status = DoorStatus::Closing;
        }
    }
}

#[derive(Debug)]
struct VentState {
    oxygen: f32,
    can_pressurize: bool,
    depressurize: bool,
}

/// A simulated air vent. Starts pressurizing.
#[derive(Debug, Clone)]
pub struct SimVent {
    name: Rc<str>,
    state: Rc<RefCell<VentState>>,
}

impl SimVent {
    pub fn new(name: &str, oxygen: f32) -> Self {
        Self {
            name: Rc::from(name),
            state: Rc::new(RefCell::new(VentState {
                oxygen: oxygen.clamp(0.0, 1.0),
                can_pressurize: true,
                depressurize: false,
            })),
        }
    }

    pub fn set_oxygen_level(&self, oxygen: f32) {
        self.state.borrow_mut().oxygen = oxygen.clamp(0.0, 1.0);
    }

    /// Mark the enclosure as leaking (`false`) or sealed again (`true`).
    pub fn set_can_pressurize(&self, can_pressurize: bool) {
        self.state.borrow_mut().can_pressurize = can_pressurize;
    }

    fn step(&self, rate: f32) {
        let mut s = self.state.borrow_mut();
        if s.depressurize || !s.can_pressurize {
            s.oxygen -= s.oxygen * rate;
            if s.oxygen < VACUUM_FLOOR {
                s.oxygen = 0.0;
            }
        } else {
            s.oxygen = (s.oxygen + (1.0 - s.oxygen) * rate).min(1.0);
        }
    }
}

impl Vent for SimVent {
    fn name(&self) -> &str {
        &self.name
    }

    fn oxygen_level(&self) -> f32 {
        self.state.borrow().oxygen
    }

    fn can_pressurize(&self) -> bool {
        self.state.borrow().can_pressurize
    }

    fn is_depressurizing(&self) -> bool {
        self.state.borrow().depressurize
    }

    fn set_depressurize(&mut self, depressurize: bool) {
        self.state.borrow_mut().depressurize = depressurize;
    }
}

/// A set of simulated devices that can be queried like a live structure.
#[derive(Debug, Clone)]
pub struct SimGrid {
    doors: Vec<SimDoor>,
    vents: Vec<SimVent>,
    vent_rate: f32,
}

impl Default for SimGrid {
    fn default() -> Self {
        Self::new()
    }
}

impl SimGrid {
    pub fn new() -> Self {
        Self::with_vent_rate(DEFAULT_VENT_RATE)
    }

    pub fn with_vent_rate(vent_rate: f32) -> Self {
        Self {
            doors: Vec::new(),
            vents: Vec::new(),
            vent_rate: vent_rate.clamp(0.0, 1.0),
        }
    }

    pub fn add_door(&mut self, name: &str) -> SimDoor {
        let door = SimDoor::new(name);
        self.doors.push(door.clone());
        door
    }

    /// Add a vent at full oxygen.
    pub fn add_vent(&mut self, name: &str) -> SimVent {
        self.add_vent_at(name, 1.0)
    }

    pub fn add_vent_at(&mut self, name: &str, oxygen: f32) -> SimVent {
        let vent = SimVent::new(name, oxygen);
        self.vents.push(vent.clone());
        vent
    }

    pub fn door(&self, name: &str) -> Option<SimDoor> {
        self.doors.iter().find(|d| &*d.name == name).cloned()
    }

    pub fn vent(&self, name: &str) -> Option<SimVent> {
        self.vents.iter().find(|v| &*v.name == name).cloned()
    }

    /// Remove a device by name (dismantled block). Returns true if found.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.doors.len() + self.vents.len();
        self.doors.retain(|d| &*d.name != name);
        self.vents.retain(|v| &*v.name != name);
        before != self.doors.len() + self.vents.len()
    }

    /// Advance every actuator by one step.
    pub fn step(&mut self) {
        for door in &self.doors {
            door.step();
        }
        for vent in &self.vents {
            vent.step(self.vent_rate);
        }
    }
}

impl DeviceSource for SimGrid {
    fn doors(&self) -> Vec<Box<dyn Door>> {
        self.doors
            .iter()
            .map(|d| Box::new(d.clone()) as Box<dyn Door>)
            .collect()
    }

    fn vents(&self) -> Vec<Box<dyn Vent>> {
        self.vents
            .iter()
            .map(|v| Box::new(v.clone()) as Box<dyn Vent>)
            .collect()
    }
}
