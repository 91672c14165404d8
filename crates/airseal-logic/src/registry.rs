//! Room topology and per-tick evaluation order.
//!
//! A [`RoomRegistry`] is one generation of rooms and door coordinators built
//! from the devices visible at re-initialization. It is never patched in
//! place: a topology change builds a fresh registry and the old one is
//! dropped, together with all of its hysteresis state.
//!
//! Coordinators live in an arena (`Vec<DoorCoordinator>`) and rooms refer to
//! them by [`DoorId`], so a partition door shared by two rooms needs no
//! back-references.
//!
//! ```
//! use airseal_logic::registry::RoomRegistry;
//! use airseal_logic::settings::Settings;
//! use airseal_logic::sim::SimGrid;
//! use airseal_logic::topology::NamePatterns;
//!
//! let mut grid = SimGrid::new();
//! grid.add_door("Dock Outer");
//! grid.add_door("Dock/Hall");
//! grid.add_vent("Dock Vent");
//!
//! let mut registry = RoomRegistry::rebuild(&grid, &NamePatterns, &Settings::default()).unwrap();
//! assert_eq!(registry.len(), 1); // "Hall" has no outer door
//! let report = registry.tick(false);
//! assert!(report.emergencies().next().is_none());
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::devices::DeviceSource;
use crate::door::{DoorCoordinator, DoorId};
use crate::room::{EmergencyCause, Room, RoomVerdict};
use crate::settings::Settings;
use crate::topology::{Classifier, DoorRole};

/// A room that failed validation, with the device counts found for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomDefect {
    pub room: String,
    pub inner_doors: usize,
    pub outer_doors: usize,
    pub vents: usize,
}

impl fmt::Display for RoomDefect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} inner doors, {} outer doors, {} air vents)",
            self.room, self.inner_doors, self.outer_doors, self.vents
        )
    }
}

/// Configuration errors that stop the controller from operating.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    #[error("could not find any doors")]
    NoDoors,
    #[error("could not find any air vents")]
    NoVents,
    #[error(
        "rooms need at least 1 inner door and 1 air vent: {}",
        list_defects(.0)
    )]
    InvalidRooms(Vec<RoomDefect>),
}

fn list_defects(defects: &[RoomDefect]) -> String {
    defects
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// One room's result for a tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomReport {
    pub room: String,
    /// Whether the room was evaluated in the pressurized partition.
    pub pressurized: bool,
    pub verdict: RoomVerdict,
}

/// Results of one tick, in evaluation order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    pub rooms: Vec<RoomReport>,
}

impl TickReport {
    pub fn verdict(&self, room: &str) -> Option<RoomVerdict> {
        self.rooms.iter().find(|r| r.room == room).map(|r| r.verdict)
    }

    /// Rooms in emergency this tick and why.
    pub fn emergencies(&self) -> impl Iterator<Item = (&str, EmergencyCause)> {
        self.rooms.iter().filter_map(|r| match r.verdict {
            RoomVerdict::Emergency(cause) => Some((r.room.as_str(), cause)),
            _ => None,
        })
    }
}

/// One generation of managed rooms.
#[derive(Debug)]
pub struct RoomRegistry {
    /// Sorted by name.
    rooms: Vec<Room>,
    doors: Vec<DoorCoordinator>,
}

impl RoomRegistry {
    /// Build rooms from the devices `source` currently reports.
    pub fn rebuild<S, C>(
        source: &S,
        classifier: &C,
        settings: &Settings,
    ) -> Result<Self, TopologyError>
    where
        S: DeviceSource + ?Sized,
        C: Classifier + ?Sized,
    {
        let found_doors = source.doors();
        if found_doors.is_empty() {
            log::error!("Could not find doors.");
            return Err(TopologyError::NoDoors);
        }

        let threshold = settings.settle_threshold;
        let mut rooms: BTreeMap<String, Room> = BTreeMap::new();
        let mut doors = Vec::new();

        for door in found_doors {
            let Some(role) = classifier.classify_door(door.name()) else {
                log::debug!("Door '{}' does not match a room pattern", door.name());
                continue;
            };
            let id = DoorId(doors.len());
            match role {
                DoorRole::Outer { room } => {
                    room_mut(&mut rooms, &room, threshold).add_outer_door(id);
                    doors.push(DoorCoordinator::new(door, &room, None));
                }
                DoorRole::Inner { first, second } => {
                    room_mut(&mut rooms, &first, threshold).add_inner_door(id);
                    room_mut(&mut rooms, &second, threshold).add_inner_door(id);
                    let second = (second != first).then_some(second.as_str());
                    doors.push(DoorCoordinator::new(door, &first, second));
                }
            }
        }

        let found_vents = source.vents();
        if found_vents.is_empty() {
            log::error!("Could not find vents.");
            return Err(TopologyError::NoVents);
        }

        for vent in found_vents {
            let room = classifier
                .classify_vent(vent.name())
                .and_then(|name| rooms.get_mut(&name));
            match room {
                Some(room) => room.add_vent(vent),
                None => log::debug!("Vent '{}' does not belong to a known room", vent.name()),
            }
        }

        rooms.retain(|name, room| {
            if room.is_interior() {
                log::debug!("Skipping interior room {}", name);
            }
            !room.is_interior()
        });

        let mut defects = Vec::new();
        for room in rooms.values() {
            log::info!(
                "Room [{}] has {} inner doors, {} outer doors, and {} air vents.",
                room.name(),
                room.inner_doors().len(),
                room.outer_doors().len(),
                room.vent_count()
            );
            if !room.is_valid() {
                defects.push(RoomDefect {
                    room: room.name().to_string(),
                    inner_doors: room.inner_doors().len(),
                    outer_doors: room.outer_doors().len(),
                    vents: room.vent_count(),
                });
            }
        }

        if !defects.is_empty() {
            for defect in &defects {
                log::error!(
                    "{} room is not valid. Please check if there is at least 1 inner door and 1 air vent.",
                    defect.room
                );
            }
            return Err(TopologyError::InvalidRooms(defects));
        }

        if rooms.is_empty() {
            log::warn!("No airtight rooms with outer doors were found");
        }

        Ok(Self {
            rooms: rooms.into_values().collect(),
            doors,
        })
    }

    /// Run one safety pass over every room.
    ///
    /// Pressurized rooms go first so that the depressurized rooms, whose
    /// commands matter more, get the last word on any shared door.
    pub fn tick(&mut self, user_override: bool) -> TickReport {
        for room in &mut self.rooms {
            room.refresh_observed_state(&self.doors);
        }

        let (pressurized, depressurized): (Vec<usize>, Vec<usize>) =
            (0..self.rooms.len()).partition(|&i| self.rooms[i].is_pressurized());

        let mut report = TickReport::default();
        for i in pressurized.into_iter().chain(depressurized) {
            let room = &mut self.rooms[i];
            let was_pressurized = room.is_pressurized();
            let verdict = room.check_room_safety(&mut self.doors, user_override);
            report.rooms.push(RoomReport {
                room: room.name().to_string(),
                pressurized: was_pressurized,
                verdict,
            });
        }
        report
    }

    pub fn rooms(&self) -> &[Room] {
        &self.rooms
    }

    pub fn room(&self, name: &str) -> Option<&Room> {
        self.rooms
            .binary_search_by(|r| r.name().cmp(name))
            .ok()
            .map(|i| &self.rooms[i])
    }

    pub fn doors(&self) -> &[DoorCoordinator] {
        &self.doors
    }

    pub fn door(&self, id: DoorId) -> Option<&DoorCoordinator> {
        self.doors.get(id.0)
    }

    pub fn door_by_name(&self, name: &str) -> Option<&DoorCoordinator> {
        self.doors.iter().find(|d| d.name() == name)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

fn room_mut<'a>(
    rooms: &'a mut BTreeMap<String, Room>,
    name: &str,
    settle_threshold: f32,
) -> &'a mut Room {
    rooms
        .entry(name.to_string())
        .or_insert_with(|| Room::new(name, settle_threshold))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{Door, DoorStatus, Vent};
    use crate::door::LockCycle;
    use crate::sim::SimGrid;
    use crate::topology::NamePatterns;

    fn build(grid: &SimGrid) -> Result<RoomRegistry, TopologyError> {
        RoomRegistry::rebuild(grid, &NamePatterns, &Settings::default())
    }

    /// Two airlocks, Alpha and Bravo, sharing a partition door.
    fn twin_airlocks() -> SimGrid {
        let mut grid = SimGrid::new();
        grid.add_door("Alpha Outer");
        grid.add_door("Bravo Outer");
        grid.add_door("Alpha/Bravo");
        grid.add_vent("Alpha Vent");
        grid.add_vent("Bravo Air Vent");
        grid
    }

    #[test]
    fn builds_rooms_and_shares_partition_door() {
        let registry = build(&twin_airlocks()).unwrap();
        assert_eq!(registry.len(), 2);
        let alpha = registry.room("Alpha").unwrap();
        let bravo = registry.room("Bravo").unwrap();
        assert_eq!(alpha.inner_doors(), bravo.inner_doors());
        let shared = registry.door(alpha.inner_doors()[0]).unwrap();
        assert_eq!(shared.owners().collect::<Vec<_>>(), vec!["Alpha", "Bravo"]);
    }

    #[test]
    fn no_doors_is_an_error() {
        let mut grid = SimGrid::new();
        grid.add_vent("Alpha Vent");
        assert_eq!(build(&grid).unwrap_err(), TopologyError::NoDoors);
    }

    #[test]
    fn no_vents_is_an_error() {
        let mut grid = SimGrid::new();
        grid.add_door("Alpha Outer");
        assert_eq!(build(&grid).unwrap_err(), TopologyError::NoVents);
    }

    #[test]
    fn invalid_rooms_are_all_reported() {
        let mut grid = SimGrid::new();
        grid.add_door("Alpha Outer");
        grid.add_door("Bravo Outer");
        grid.add_door("Bravo/Hall");
        grid.add_vent("Hall Vent");
        let err = build(&grid).unwrap_err();
        assert_eq!(
            err,
            TopologyError::InvalidRooms(vec![
                RoomDefect {
                    room: "Alpha".into(),
                    inner_doors: 0,
                    outer_doors: 1,
                    vents: 0,
                },
                RoomDefect {
                    room: "Bravo".into(),
                    inner_doors: 1,
                    outer_doors: 1,
                    vents: 0,
                },
            ])
        );
        assert!(err.to_string().contains("Alpha (0 inner doors, 1 outer doors, 0 air vents)"));
    }

    #[test]
    fn interior_rooms_are_dropped() {
        let mut grid = twin_airlocks();
        grid.add_door("Bravo/Hall");
        grid.add_vent("Hall Vent");
        let registry = build(&grid).unwrap();
        assert!(registry.room("Hall").is_none());
        assert_eq!(registry.room("Bravo").unwrap().inner_doors().len(), 2);
    }

    #[test]
    fn unmatched_devices_are_ignored() {
        let mut grid = twin_airlocks();
        grid.add_door("Cargo Door");
        grid.add_vent("Spare Vent");
        let registry = build(&grid).unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.door_by_name("Cargo Door").is_none());
    }

    #[test]
    fn pressurized_rooms_are_evaluated_first() {
        let grid = twin_airlocks();
        let mut alpha_vent = grid.vent("Alpha Vent").unwrap();
        alpha_vent.set_depressurize(true);
        alpha_vent.set_oxygen_level(0.0);

        let mut registry = build(&grid).unwrap();
        let report = registry.tick(false);
        let order: Vec<_> = report.rooms.iter().map(|r| r.room.as_str()).collect();
        assert_eq!(order, vec!["Bravo", "Alpha"]);
        assert!(report.rooms[0].pressurized);
        assert!(!report.rooms[1].pressurized);
    }

    #[test]
    fn depressurized_room_has_last_word_on_shared_door() {
        let grid = twin_airlocks();
        let mut alpha_vent = grid.vent("Alpha Vent").unwrap();
        alpha_vent.set_depressurize(true);
        alpha_vent.set_oxygen_level(0.0);
        grid.door("Alpha Outer").unwrap().force_status(DoorStatus::Open);

        // Bravo (pressurized) enables the partition; Alpha, with its outer
        // door open, must leave it disabled.
        let mut registry = build(&grid).unwrap();
        registry.tick(false);
        assert!(!grid.door("Alpha/Bravo").unwrap().is_enabled());
    }

    #[test]
    fn shared_door_emergency_reaches_coordinator() {
        let grid = twin_airlocks();
        let mut bravo_vent = grid.vent("Bravo Air Vent").unwrap();
        bravo_vent.set_depressurize(true);
        bravo_vent.set_oxygen_level(0.0);
        grid.door("Bravo Outer").unwrap().force_status(DoorStatus::Open);
        grid.door("Alpha/Bravo").unwrap().force_status(DoorStatus::Open);

        let mut registry = build(&grid).unwrap();
        let report = registry.tick(false);
        assert_eq!(
            report.emergencies().collect::<Vec<_>>(),
            vec![("Bravo", EmergencyCause::BothDoorSetsOpen)]
        );
        let shared = registry.door_by_name("Alpha/Bravo").unwrap();
        assert!(shared.in_emergency());
        assert_eq!(shared.lock_cycle(), LockCycle::AwaitingClose);
        assert!(bravo_vent.is_depressurizing());
    }

    #[test]
    fn rebuild_starts_a_fresh_generation() {
        let grid = twin_airlocks();
        let mut registry = build(&grid).unwrap();
        registry.tick(true);
        assert!(registry.room("Alpha").unwrap().in_emergency());

        let registry = build(&grid).unwrap();
        assert!(!registry.room("Alpha").unwrap().in_emergency());
        assert!(registry.doors().iter().all(|d| !d.in_emergency()));
    }
}
