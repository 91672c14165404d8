//! Per-room safety evaluation.
//!
//! A room is an airtight compartment with inner doors (to neighbouring rooms),
//! outer doors (to vacuum) and vents. Once per tick the registry calls
//! [`Room::refresh_observed_state`] and then [`Room::check_room_safety`],
//! which decides what the room's doors and vents should be doing:
//!
//! - a **pressurized** room keeps its outer doors disabled and inner doors
//!   enabled; an open outer door is an emergency;
//! - a **depressurized** room works as an airlock: only one side may be open
//!   at a time, and after the inner side closes the outer side stays locked
//!   until the oxygen level stops falling;
//! - a vent that can no longer pressurize with every outer door shut means the
//!   hull is breached.
//!
//! Emergencies depressurize the room and hand every owned door to its
//! coordinator's lock cycle until the room reports healthy again.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::devices::Vent;
use crate::door::{DoorCoordinator, DoorId};

/// Why a room declared an emergency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmergencyCause {
    /// The operator forced emergency mode.
    UserOverride,
    /// A vent reports the room is no longer airtight.
    HullBreach,
    /// Air is escaping through an open outer door.
    OuterDoorOpenWhilePressurized,
    /// Both sides of an airlock are open at once.
    BothDoorSetsOpen,
}

impl fmt::Display for EmergencyCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            EmergencyCause::UserOverride => "manually activated by user",
            EmergencyCause::HullBreach => "room is no longer airtight",
            EmergencyCause::OuterDoorOpenWhilePressurized => {
                "outer door open in pressurized room"
            }
            EmergencyCause::BothDoorSetsOpen => {
                "outer and inner doors open in depressurized room"
            }
        };
        f.write_str(text)
    }
}

/// Outcome of one safety check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomVerdict {
    /// Room is safe; doors and vents were commanded normally.
    Normal,
    /// Vents were switched while a door was open and have been switched back.
    ModeReverted,
    /// Room is (still) in emergency.
    Emergency(EmergencyCause),
    /// A previous emergency ended this tick.
    Recovered,
}

/// Serializable view of a room's state, for reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub name: String,
    pub pressurized: bool,
    pub oxygen_level: f32,
    pub inner_door_open: bool,
    pub outer_door_open: bool,
    pub in_emergency: bool,
    pub monitor_oxygen_level: bool,
}

/// One airtight compartment.
pub struct Room {
    name: String,
    inner_doors: Vec<DoorId>,
    outer_doors: Vec<DoorId>,
    vents: Vec<Box<dyn Vent>>,
    settle_threshold: f32,

    // Observed at the start of each tick.
    inner_door_open: bool,
    outer_door_open: bool,
    pressurized: bool,
    oxygen_level: f32,

    // Carried across ticks.
    monitor_oxygen_level: bool,
    prev_oxygen_level: f32,
    prev_pressurized: Option<bool>,
    in_emergency: bool,
    pressurized_before_emergency: bool,
}

impl fmt::Debug for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Room")
            .field("name", &self.name)
            .field("inner_doors", &self.inner_doors)
            .field("outer_doors", &self.outer_doors)
            .field("vents", &self.vents.len())
            .field("pressurized", &self.pressurized)
            .field("oxygen_level", &self.oxygen_level)
            .field("in_emergency", &self.in_emergency)
            .finish()
    }
}

impl Room {
    pub fn new(name: &str, settle_threshold: f32) -> Self {
        Self {
            name: name.to_string(),
            inner_doors: Vec::new(),
            outer_doors: Vec::new(),
            vents: Vec::new(),
            settle_threshold,
            inner_door_open: false,
            outer_door_open: false,
            pressurized: false,
            oxygen_level: 0.0,
            monitor_oxygen_level: false,
            prev_oxygen_level: 1.0,
            prev_pressurized: None,
            in_emergency: false,
            pressurized_before_emergency: false,
        }
    }

    pub fn add_inner_door(&mut self, door: DoorId) {
        if !self.inner_doors.contains(&door) {
            self.inner_doors.push(door);
        }
    }

    pub fn add_outer_door(&mut self, door: DoorId) {
        if !self.outer_doors.contains(&door) {
            self.outer_doors.push(door);
        }
    }

    pub fn add_vent(&mut self, vent: Box<dyn Vent>) {
        self.vents.push(vent);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inner_doors(&self) -> &[DoorId] {
        &self.inner_doors
    }

    pub fn outer_doors(&self) -> &[DoorId] {
        &self.outer_doors
    }

    pub fn vent_count(&self) -> usize {
        self.vents.len()
    }

    /// A room with no outer doors cannot face vacuum and is not managed.
    pub fn is_interior(&self) -> bool {
        self.outer_doors.is_empty()
    }

    pub fn is_valid(&self) -> bool {
        !self.inner_doors.is_empty() && !self.vents.is_empty()
    }

    pub fn is_pressurized(&self) -> bool {
        self.pressurized
    }

    pub fn in_emergency(&self) -> bool {
        self.in_emergency
    }

    pub fn oxygen_level(&self) -> f32 {
        self.oxygen_level
    }

    pub fn monitor_oxygen_level(&self) -> bool {
        self.monitor_oxygen_level
    }

    pub fn pressurized_before_emergency(&self) -> bool {
        self.pressurized_before_emergency
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            name: self.name.clone(),
            pressurized: self.pressurized,
            oxygen_level: self.oxygen_level,
            inner_door_open: self.inner_door_open,
            outer_door_open: self.outer_door_open,
            in_emergency: self.in_emergency,
            monitor_oxygen_level: self.monitor_oxygen_level,
        }
    }

    /// Re-read door positions and vent state. Must run before
    /// [`Room::check_room_safety`] every tick.
    pub fn refresh_observed_state(&mut self, doors: &[DoorCoordinator]) {
        self.inner_door_open = self.inner_doors.iter().any(|id| doors[id.0].is_open());
        self.outer_door_open = self.outer_doors.iter().any(|id| doors[id.0].is_open());
        self.pressurized = self.vents.iter().all(|v| !v.is_depressurizing());
        self.oxygen_level = if self.vents.is_empty() {
            0.0
        } else {
            self.vents.iter().map(|v| v.oxygen_level()).sum::<f32>() / self.vents.len() as f32
        };
    }

    /// Evaluate the room and command its doors and vents.
    ///
    /// `user_override` forces an emergency regardless of room state.
    pub fn check_room_safety(
        &mut self,
        doors: &mut [DoorCoordinator],
        user_override: bool,
    ) -> RoomVerdict {
        if user_override {
            self.declare_emergency(doors, EmergencyCause::UserOverride);
            return RoomVerdict::Emergency(EmergencyCause::UserOverride);
        }

        // An open outer door also stops vents pressurizing; that is the
        // airlock doing its job, not a breach.
        if !self.outer_door_open && self.vents.iter().any(|v| !v.can_pressurize()) {
            self.declare_emergency(doors, EmergencyCause::HullBreach);
            return RoomVerdict::Emergency(EmergencyCause::HullBreach);
        }

        match self.prev_pressurized {
            None => {
                self.prev_pressurized = Some(self.pressurized);
                self.monitor_oxygen_level = true;
            }
            Some(prev) if prev != self.pressurized && self.any_door_open() => {
                log::warn!(
                    "Vents in {} switched while a door is open, reverting to {}",
                    self.name,
                    if prev { "pressurize" } else { "depressurize" }
                );
                self.set_vents_depressurize(!prev);
                self.monitor_oxygen_level = true;
                return RoomVerdict::ModeReverted;
            }
            Some(_) => {}
        }

        let cause = if self.pressurized {
            self.check_pressurized_room(doors)
        } else {
            self.check_depressurized_room(doors)
        };

        let mut verdict = match cause {
            Some(cause) => RoomVerdict::Emergency(cause),
            None => RoomVerdict::Normal,
        };
        let mut pressurized_now = self.pressurized;
        if self.in_emergency && cause.is_none() {
            log::info!("Emergency for {} is over", self.name);
            pressurized_now = self.pressurized_before_emergency;
            self.set_vents_depressurize(!pressurized_now);
            self.set_emergency_on_doors(doors, false);
            verdict = RoomVerdict::Recovered;
        }

        self.in_emergency = cause.is_some();
        self.prev_pressurized = Some(pressurized_now);
        verdict
    }

    fn check_pressurized_room(&mut self, doors: &mut [DoorCoordinator]) -> Option<EmergencyCause> {
        if self.outer_door_open {
            self.declare_emergency(doors, EmergencyCause::OuterDoorOpenWhilePressurized);
            return Some(EmergencyCause::OuterDoorOpenWhilePressurized);
        }

        for id in &self.outer_doors {
            doors[id.0].disable();
        }
        for id in &self.inner_doors {
            doors[id.0].enable();
        }
        self.monitor_oxygen_level = true;
        None
    }

    fn check_depressurized_room(
        &mut self,
        doors: &mut [DoorCoordinator],
    ) -> Option<EmergencyCause> {
        if self.inner_door_open && self.outer_door_open {
            self.declare_emergency(doors, EmergencyCause::BothDoorSetsOpen);
            return Some(EmergencyCause::BothDoorSetsOpen);
        }

        self.set_vents_depressurize(true);

        if self.inner_door_open {
            log::debug!("Inner doors are open in {} - disabling outer doors", self.name);
            for id in &self.outer_doors {
                doors[id.0].disable();
            }
            self.monitor_oxygen_level = true;
            return None;
        }

        if self.outer_door_open {
            log::debug!("Outer doors are open in {} - disabling inner doors", self.name);
            for id in &self.inner_doors {
                doors[id.0].disable();
            }
            self.monitor_oxygen_level = true;
            return None;
        }

        // On the tick the vents switch, the previous reading predates the
        // switch; a full room reads as settled and is released for one tick
        // until the next falling reading locks the outer doors again.
        let diff = self.prev_oxygen_level - self.oxygen_level;
        let settled = self.oxygen_level == 0.0 || diff.abs() < self.settle_threshold;
        if self.monitor_oxygen_level && settled {
            log::debug!("{} has finished depressurizing, releasing doors", self.name);
            for id in self.inner_doors.iter().chain(&self.outer_doors) {
                doors[id.0].enable();
            }
            self.monitor_oxygen_level = false;
        } else if self.oxygen_level > 0.0 {
            log::debug!("Locking outer doors in {} until depressurized", self.name);
            for id in &self.inner_doors {
                doors[id.0].enable();
            }
            for id in &self.outer_doors {
                doors[id.0].disable();
            }
            self.monitor_oxygen_level = true;
        }

        self.prev_oxygen_level = self.oxygen_level;
        None
    }

    fn declare_emergency(&mut self, doors: &mut [DoorCoordinator], cause: EmergencyCause) {
        if self.in_emergency {
            log::debug!("Oxygen emergency in {} continues: {}", self.name, cause);
        } else {
            log::warn!("Oxygen emergency in {}: {}", self.name, cause);
            self.pressurized_before_emergency = self.pressurized;
        }

        self.set_vents_depressurize(true);
        self.set_emergency_on_doors(doors, true);
        self.in_emergency = true;
        self.monitor_oxygen_level = true;
    }

    fn set_emergency_on_doors(&self, doors: &mut [DoorCoordinator], in_emergency: bool) {
        for id in self.inner_doors.iter().chain(&self.outer_doors) {
            doors[id.0].update_emergency_state(&self.name, in_emergency);
        }
    }

    fn set_vents_depressurize(&mut self, depressurize: bool) {
        for vent in &mut self.vents {
            vent.set_depressurize(depressurize);
        }
    }

    fn any_door_open(&self) -> bool {
        self.inner_door_open || self.outer_door_open
    }
}
