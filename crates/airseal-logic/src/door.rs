//! Emergency-gated door coordination.
//!
//! A partition door belongs to the two rooms on either side of it; an outer
//! door belongs to one. Both rooms command the same physical door, so the
//! coordinator, not the room, keeps the emergency bookkeeping: a small map of
//! owning room name → "declared emergency", plus the lock cycle.
//!
//! # Lock cycle
//!
//! While any owner is in emergency the door is closed and disabled, but
//! occupants are allowed one manual pass at a time:
//!
//! | State | Door | Leaves when |
//! |-------|------|-------------|
//! | `Released` | enabled, normal commands apply | an owner declares emergency |
//! | `AwaitingClose` | enabled, commanded closed | door reports closed → disabled |
//! | `Sealed` | disabled | door reports open |
//! | `PassThrough` | disabled | door reports closed → disabled again |
//!
//! Every owner clearing its emergency returns the door to `Released` and
//! re-enables it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::devices::{Door, DoorStatus};

/// Emergency sub-state of a coordinated door.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockCycle {
    /// No owning room is in emergency.
    Released,
    /// Emergency declared; waiting for the door to finish closing.
    AwaitingClose,
    /// Closed and disabled; waiting for a manual open.
    Sealed,
    /// Opened once under lock; waiting for it to close again.
    PassThrough,
}

/// Index of a coordinator within one registry generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DoorId(pub usize);

/// One physical door shared by one or two rooms.
pub struct DoorCoordinator {
    door: Box<dyn Door>,
    emergency_status: BTreeMap<String, bool>,
    cycle: LockCycle,
}

impl std::fmt::Debug for DoorCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DoorCoordinator")
            .field("door", &self.door.name())
            .field("emergency_status", &self.emergency_status)
            .field("cycle", &self.cycle)
            .finish()
    }
}

impl DoorCoordinator {
    /// Wrap a door owned by `room` and, for partition doors, `second_room`.
    ///
    /// The owner set is fixed here and never changes afterwards.
    pub fn new(door: Box<dyn Door>, room: &str, second_room: Option<&str>) -> Self {
        let mut emergency_status = BTreeMap::new();
        emergency_status.insert(room.to_string(), false);
        if let Some(second) = second_room {
            emergency_status.insert(second.to_string(), false);
        }
        Self {
            door,
            emergency_status,
            cycle: LockCycle::Released,
        }
    }

    pub fn name(&self) -> &str {
        self.door.name()
    }

    /// Names of the rooms that registered this door.
    pub fn owners(&self) -> impl Iterator<Item = &str> {
        self.emergency_status.keys().map(String::as_str)
    }

    pub fn lock_cycle(&self) -> LockCycle {
        self.cycle
    }

    pub fn is_enabled(&self) -> bool {
        self.door.is_enabled()
    }

    /// True if the door is not fully closed.
    pub fn is_open(&self) -> bool {
        self.door.status().is_open()
    }

    /// The emergency flag last reported by `room`, if it owns this door.
    pub fn room_in_emergency(&self, room: &str) -> Option<bool> {
        self.emergency_status.get(room).copied()
    }

    /// True if any owning room has declared an emergency.
    pub fn in_emergency(&self) -> bool {
        self.emergency_status.values().any(|&e| e)
    }

    /// Enable the door unless an owner is in emergency.
    ///
    /// Returns whether the command was applied.
    pub fn enable(&mut self) -> bool {
        self.set_enabled_unless_emergency(true)
    }

    /// Disable the door unless an owner is in emergency.
    ///
    /// Returns whether the command was applied.
    pub fn disable(&mut self) -> bool {
        self.set_enabled_unless_emergency(false)
    }

    fn set_enabled_unless_emergency(&mut self, enabled: bool) -> bool {
        if self.in_emergency() {
            return false;
        }
        self.door.set_enabled(enabled);
        true
    }

    /// Record `room`'s emergency flag for this tick and advance the lock cycle.
    ///
    /// Called once per tick by every owning room, so a shared door may advance
    /// twice in one tick. Rooms that do not own the door are ignored.
    pub fn update_emergency_state(&mut self, room: &str, in_emergency: bool) {
        let was_in_emergency = self.in_emergency();
        match self.emergency_status.get_mut(room) {
            Some(flag) => *flag = in_emergency,
            None => {
                log::warn!(
                    "Room {} is not an owner of door '{}', ignoring emergency update",
                    room,
                    self.door.name()
                );
                return;
            }
        }

        if !in_emergency {
            if !self.in_emergency() {
                self.door.set_enabled(true);
                self.cycle = LockCycle::Released;
            }
            return;
        }

        if !was_in_emergency {
            log::debug!("Door '{}' closing for emergency in {}", self.door.name(), room);
            self.door.set_enabled(true);
            self.door.close();
            self.cycle = LockCycle::AwaitingClose;
            return;
        }

        let closed = self.door.status() == DoorStatus::Closed;
        self.cycle = match self.cycle {
            // Occupants may still be finishing the close; keep it operable.
            LockCycle::AwaitingClose | LockCycle::Released if closed => {
                self.door.set_enabled(false);
                LockCycle::Sealed
            }
            LockCycle::AwaitingClose | LockCycle::Released => LockCycle::AwaitingClose,
            LockCycle::Sealed if !closed => LockCycle::PassThrough,
            LockCycle::Sealed => LockCycle::Sealed,
            LockCycle::PassThrough if closed => {
                self.door.set_enabled(false);
                LockCycle::AwaitingClose
            }
            LockCycle::PassThrough => LockCycle::PassThrough,
        };
    }
}
