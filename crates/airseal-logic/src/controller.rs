//! Top-level entry point tying the registry to its external triggers.
//!
//! The host calls [`Controller::tick`] on every scheduled update,
//! [`Controller::reinitialize`] when the set of devices may have changed, and
//! [`Controller::run_command`] with the argument of a manual run. Neither of
//! the latter two evaluates rooms itself.
//!
//! If the topology is invalid the controller halts: [`Controller::tick`]
//! returns [`ControllerError::Halted`] until a re-initialization succeeds.

use thiserror::Error;

use crate::command::{parse_command, OverrideCommand};
use crate::devices::DeviceSource;
use crate::registry::{RoomRegistry, TickReport, TopologyError};
use crate::settings::{Settings, SettingsError};
use crate::topology::Classifier;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ControllerError {
    #[error("controller is halted until the room topology is fixed and re-initialized")]
    Halted,
    #[error(transparent)]
    Topology(#[from] TopologyError),
    #[error("invalid settings: {}", list_errors(.0))]
    InvalidSettings(Vec<SettingsError>),
}

fn list_errors(errors: &[SettingsError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug)]
pub struct Controller {
    settings: Settings,
    registry: Option<RoomRegistry>,
    user_override: bool,
}

impl Controller {
    /// Create a halted controller. Call [`Controller::reinitialize`] before
    /// the first tick.
    pub fn new(settings: Settings) -> Result<Self, ControllerError> {
        let errors = settings.validate();
        if !errors.is_empty() {
            return Err(ControllerError::InvalidSettings(errors));
        }
        Ok(Self {
            settings,
            registry: None,
            user_override: false,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn user_override(&self) -> bool {
        self.user_override
    }

    pub fn is_halted(&self) -> bool {
        self.registry.is_none()
    }

    pub fn registry(&self) -> Option<&RoomRegistry> {
        self.registry.as_ref()
    }

    /// Drop the current generation and build a new one from `source`.
    ///
    /// On failure the controller stays halted.
    pub fn reinitialize<S, C>(&mut self, source: &S, classifier: &C) -> Result<(), ControllerError>
    where
        S: DeviceSource + ?Sized,
        C: Classifier + ?Sized,
    {
        self.registry = None;
        match RoomRegistry::rebuild(source, classifier, &self.settings) {
            Ok(registry) => {
                log::info!("Managing {} airtight rooms", registry.len());
                self.registry = Some(registry);
                Ok(())
            }
            Err(e) => {
                log::error!("{}; halting until re-initialized", e);
                Err(e.into())
            }
        }
    }

    /// Apply a manual run argument to the override flag.
    ///
    /// This does not rebuild the topology: a fresh generation would forget
    /// each room's pre-emergency vent direction, so clearing the override
    /// could no longer restore it.
    pub fn run_command(&mut self, argument: &str) -> OverrideCommand {
        let command = parse_command(argument, &self.settings);
        match &command {
            OverrideCommand::Activate => {
                log::warn!("User manually activated oxygen emergency mode!");
            }
            OverrideCommand::Clear if self.user_override => {
                log::info!("User manually turned off oxygen emergency mode!");
            }
            OverrideCommand::Clear => log::info!("No argument was given."),
            OverrideCommand::Unrecognized(arg) => {
                let switches: Vec<String> = self
                    .settings
                    .emergency_switches
                    .iter()
                    .map(|s| format!("-{}", s))
                    .collect();
                log::warn!(
                    "Argument '{}' not recognized. Please use one of: {}",
                    arg,
                    switches.join(", ")
                );
            }
        }
        self.user_override = command.override_active();
        command
    }

    /// Evaluate every room once.
    pub fn tick(&mut self) -> Result<TickReport, ControllerError> {
        let registry = self.registry.as_mut().ok_or(ControllerError::Halted)?;
        Ok(registry.tick(self.user_override))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::Vent;
    use crate::room::{EmergencyCause, RoomVerdict};
    use crate::sim::SimGrid;
    use crate::topology::NamePatterns;

    fn airlock() -> SimGrid {
        let mut grid = SimGrid::new();
        grid.add_door("Lock Outer");
        grid.add_door("Lock/Hall");
        grid.add_vent("Lock Vent");
        grid
    }

    fn controller() -> Controller {
        Controller::new(Settings::default()).unwrap()
    }

    #[test]
    fn starts_halted() {
        let mut c = controller();
        assert!(c.is_halted());
        assert_eq!(c.tick().unwrap_err(), ControllerError::Halted);
    }

    #[test]
    fn rejects_invalid_settings() {
        let settings = Settings {
            settle_threshold: -1.0,
            ..Settings::default()
        };
        let err = Controller::new(settings).unwrap_err();
        assert!(matches!(err, ControllerError::InvalidSettings(ref e) if e.len() == 1));
        assert!(err.to_string().starts_with("invalid settings: settle threshold"));
    }

    #[test]
    fn failed_reinitialize_halts_previous_generation() {
        let mut c = controller();
        let mut grid = airlock();
        c.reinitialize(&grid, &NamePatterns).unwrap();
        assert!(c.tick().is_ok());

        grid.remove("Lock Vent");
        let err = c.reinitialize(&grid, &NamePatterns).unwrap_err();
        assert!(matches!(
            err,
            ControllerError::Topology(TopologyError::NoVents)
        ));
        assert_eq!(c.tick().unwrap_err(), ControllerError::Halted);
    }

    #[test]
    fn override_round_trip() {
        let mut c = controller();
        let grid = airlock();
        c.reinitialize(&grid, &NamePatterns).unwrap();
        c.tick().unwrap();

        assert_eq!(c.run_command("-emergency"), OverrideCommand::Activate);
        assert!(c.user_override());
        let report = c.tick().unwrap();
        assert_eq!(
            report.verdict("Lock"),
            Some(RoomVerdict::Emergency(EmergencyCause::UserOverride))
        );
        assert!(grid.vent("Lock Vent").unwrap().is_depressurizing());

        assert_eq!(c.run_command(""), OverrideCommand::Clear);
        assert!(!c.user_override());
        let report = c.tick().unwrap();
        assert_eq!(report.verdict("Lock"), Some(RoomVerdict::Recovered));
        assert!(!grid.vent("Lock Vent").unwrap().is_depressurizing());
    }

    #[test]
    fn unrecognized_argument_clears_override() {
        let mut c = controller();
        c.run_command("-emergency");
        let cmd = c.run_command("-panic");
        assert!(matches!(cmd, OverrideCommand::Unrecognized(_)));
        assert!(!c.user_override());
    }

    #[test]
    fn override_applies_while_halted() {
        let mut c = controller();
        c.run_command("-recovery");
        assert!(c.user_override());
        assert_eq!(c.tick().unwrap_err(), ControllerError::Halted);

        c.reinitialize(&airlock(), &NamePatterns).unwrap();
        let report = c.tick().unwrap();
        assert_eq!(
            report.verdict("Lock"),
            Some(RoomVerdict::Emergency(EmergencyCause::UserOverride))
        );
    }
}
