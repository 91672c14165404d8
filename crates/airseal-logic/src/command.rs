//! Manual override switches passed as a run argument.
//!
//! Running the controller by hand with `-emergency` (or any other configured
//! switch) forces every room into emergency mode. Running it with no argument
//! clears the override; an unknown argument also clears it, so a typo never
//! leaves the structure locked down by accident.
//!
//! ```
//! use airseal_logic::command::{parse_command, OverrideCommand};
//! use airseal_logic::settings::Settings;
//!
//! let settings = Settings::default();
//! assert_eq!(parse_command("-emergency", &settings), OverrideCommand::Activate);
//! assert_eq!(parse_command("", &settings), OverrideCommand::Clear);
//! ```

use crate::settings::Settings;

/// What a run argument asks the controller to do with the override flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverrideCommand {
    /// Force every room into emergency.
    Activate,
    /// No argument given: release the override.
    Clear,
    /// Argument present but not a known switch; the override is released.
    Unrecognized(String),
}

impl OverrideCommand {
    /// The override flag this command leaves behind.
    pub fn override_active(&self) -> bool {
        matches!(self, OverrideCommand::Activate)
    }
}

/// Parse a run argument. Switches are whitespace-separated tokens starting
/// with `-` and are compared case-insensitively.
pub fn parse_command(argument: &str, settings: &Settings) -> OverrideCommand {
    let argument = argument.trim();
    if argument.is_empty() {
        return OverrideCommand::Clear;
    }

    let activated = argument
        .split_whitespace()
        .filter_map(|token| token.strip_prefix('-'))
        .any(|switch| {
            settings
                .emergency_switches
                .iter()
                .any(|known| known.eq_ignore_ascii_case(switch))
        });

    if activated {
        OverrideCommand::Activate
    } else {
        OverrideCommand::Unrecognized(argument.to_string())
    }
}
