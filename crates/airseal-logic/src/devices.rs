//! Device abstractions the controller reads and commands.
//!
//! The controller never talks to hardware directly. Everything it knows about
//! a door or a vent comes through these traits, and a [`DeviceSource`] hands
//! out fresh handles every time the topology is rebuilt.

use serde::{Deserialize, Serialize};

/// Reported door position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DoorStatus {
    Opening,
    Open,
    Closing,
    Closed,
}

impl DoorStatus {
    /// Anything short of fully closed counts as open for atmosphere purposes.
    pub fn is_open(self) -> bool {
        self != DoorStatus::Closed
    }
}

/// A physical door.
pub trait Door {
    /// Display name, used for topology classification.
    fn name(&self) -> &str;
    fn status(&self) -> DoorStatus;
    fn is_enabled(&self) -> bool;
    /// A disabled door cannot be operated by occupants.
    fn set_enabled(&mut self, enabled: bool);
    /// Start closing the door. Has no effect on a disabled door.
    fn close(&mut self);
}

/// A physical air vent.
pub trait Vent {
    /// Display name, used for topology classification.
    fn name(&self) -> &str;
    /// Oxygen level of the vent's enclosure, 0.0 (vacuum) to 1.0.
    fn oxygen_level(&self) -> f32;
    /// False when the enclosure is no longer airtight.
    fn can_pressurize(&self) -> bool;
    /// The commanded direction: true when the vent is pulling air out.
    fn is_depressurizing(&self) -> bool;
    fn set_depressurize(&mut self, depressurize: bool);
}

/// Queries the devices visible to the controller.
///
/// Each call returns new handles; handles from an older call may be dropped
/// freely once a rebuild has finished.
pub trait DeviceSource {
    fn doors(&self) -> Vec<Box<dyn Door>>;
    fn vents(&self) -> Vec<Box<dyn Vent>>;
}
