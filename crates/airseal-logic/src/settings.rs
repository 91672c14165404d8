//! Tunable controller settings.
//!
//! All fields have defaults, so a settings file only needs the values it
//! changes:
//!
//! ```
//! use airseal_logic::settings::Settings;
//!
//! let settings: Settings = serde_json::from_str(r#"{ "settle_threshold": 0.001 }"#).unwrap();
//! assert_eq!(settings.settle_threshold, 0.001);
//! assert_eq!(settings.emergency_switches, vec!["emergency", "recovery"]);
//! assert!(settings.validate().is_empty());
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Oxygen change per tick below which a depressurizing room counts as done.
pub const DEFAULT_SETTLE_THRESHOLD: f32 = 0.0005;

/// Run-argument switches that put every room into emergency mode.
pub const DEFAULT_EMERGENCY_SWITCHES: [&str; 2] = ["emergency", "recovery"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Hysteresis noise floor for the depressurized-room check.
    pub settle_threshold: f32,
    /// Switch names (without the leading `-`), matched case-insensitively.
    pub emergency_switches: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            settle_threshold: DEFAULT_SETTLE_THRESHOLD,
            emergency_switches: DEFAULT_EMERGENCY_SWITCHES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Settings validation error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SettingsError {
    #[error("settle threshold must be a positive finite number, got {0}")]
    InvalidSettleThreshold(f32),
    #[error("at least one emergency switch is required")]
    NoEmergencySwitches,
    #[error("emergency switch names must be non-empty words, got {0:?}")]
    InvalidSwitchName(String),
}

impl Settings {
    /// Validate the settings, returning all errors found.
    pub fn validate(&self) -> Vec<SettingsError> {
        let mut errors = Vec::new();

        if !self.settle_threshold.is_finite() || self.settle_threshold <= 0.0 {
            errors.push(SettingsError::InvalidSettleThreshold(self.settle_threshold));
        }
        if self.emergency_switches.is_empty() {
            errors.push(SettingsError::NoEmergencySwitches);
        }
        for name in &self.emergency_switches {
            if name.is_empty() || name.starts_with('-') || name.chars().any(char::is_whitespace) {
                errors.push(SettingsError::InvalidSwitchName(name.clone()));
            }
        }

        errors
    }
}
