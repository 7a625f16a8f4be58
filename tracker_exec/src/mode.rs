//! # Tracking Modes
//!
//! A mode names the targets the tracker is currently looking for. The input thread is the only
//! writer of the current mode and the control loop reads it once per cycle. Updates replace the
//! whole `Arc<Mode>` under a lock, so a reader always sees either the old or the new mode.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crate::params::ConfigError;
use crate::vision::ColorRangeConfig;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Name of the built in mode which tracks nothing.
pub const IDLE_MODE_NAME: &str = "idle";

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A tracking mode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mode {
    /// Name of the mode.
    pub name: String,

    /// Names of the candidate targets, an empty list means the robot stays still.
    pub targets: Vec<String>,

    /// Multiplier applied to the planned wheel speeds while this mode is active.
    pub speed_scale: f64,
}

/// Definition of a mode in the parameter file.
#[derive(Debug, Clone, Deserialize)]
pub struct ModeParams {
    /// Target names, each must be a configured range.
    pub targets: Vec<String>,

    /// Input device button that selects this mode.
    #[serde(default)]
    pub button: Option<u8>,

    /// Speed multiplier, between 0 and 1.
    #[serde(default = "default_speed_scale")]
    pub speed_scale: f64,
}

/// All modes known to the tracker.
#[derive(Debug, Clone)]
pub struct ModeTable {
    modes: BTreeMap<String, Mode>,
    buttons: BTreeMap<u8, String>,
    initial: String,
}

/// Writing half of the current mode cell, there is only ever one.
#[derive(Debug)]
pub struct ModeWriter {
    cell: Arc<RwLock<Arc<Mode>>>,
}

/// Reading half of the current mode cell.
#[derive(Debug, Clone)]
pub struct ModeReader {
    cell: Arc<RwLock<Arc<Mode>>>,
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Create the current mode cell, starting in `initial`.
pub fn mode_cell(initial: Mode) -> (ModeWriter, ModeReader) {
    let cell = Arc::new(RwLock::new(Arc::new(initial)));

    (
        ModeWriter { cell: cell.clone() },
        ModeReader { cell }
    )
}

fn default_speed_scale() -> f64 {
    1.0
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Mode {
    /// The mode which tracks nothing and keeps the robot still.
    pub fn idle() -> Self {
        Self {
            name: IDLE_MODE_NAME.to_string(),
            targets: Vec::new(),
            speed_scale: 0.0,
        }
    }

    /// A mode tracking the given targets at full speed.
    pub fn tracking<S: Into<String>>(name: &str, targets: Vec<S>) -> Self {
        Self {
            name: name.to_string(),
            targets: targets.into_iter().map(Into::into).collect(),
            speed_scale: 1.0,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.targets.is_empty()
    }
}

impl ModeTable {
    /// Build the table from the parameter file, checking every target exists in `ranges`.
    pub fn from_params(
        params: &BTreeMap<String, ModeParams>,
        initial: &str,
        ranges: &ColorRangeConfig
    ) -> Result<Self, ConfigError> {
        let mut modes = BTreeMap::new();
        let mut buttons: BTreeMap<u8, String> = BTreeMap::new();

        // Idle is always available
        modes.insert(IDLE_MODE_NAME.to_string(), Mode::idle());

        for (name, p) in params {
            for target in &p.targets {
                if !ranges.contains(target) {
                    return Err(ConfigError::UnknownTarget {
                        mode: name.clone(),
                        target: target.clone()
                    })
                }
            }

            if !(0.0..=1.0).contains(&p.speed_scale) {
                return Err(ConfigError::OutOfRange("speed_scale", 0.0, 1.0, p.speed_scale))
            }

            if let Some(b) = p.button {
                if let Some(other) = buttons.insert(b, name.clone()) {
                    return Err(ConfigError::DuplicateButton {
                        button: b,
                        first: other,
                        second: name.clone()
                    })
                }
            }

            modes.insert(name.clone(), Mode {
                name: name.clone(),
                targets: p.targets.clone(),
                speed_scale: p.speed_scale,
            });
        }

        if !modes.contains_key(initial) {
            return Err(ConfigError::UnknownInitialMode(initial.to_string()))
        }

        Ok(Self {
            modes,
            buttons,
            initial: initial.to_string(),
        })
    }

    pub fn get(&self, name: &str) -> Option<&Mode> {
        self.modes.get(name)
    }

    /// The mode selected by a button, if any.
    pub fn for_button(&self, button: u8) -> Option<&Mode> {
        self.buttons.get(&button).and_then(|name| self.modes.get(name))
    }

    /// The mode active at startup.
    pub fn initial(&self) -> Mode {
        self.modes.get(&self.initial).cloned().unwrap_or_else(Mode::idle)
    }

    /// Iterate over all modes in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Mode> {
        self.modes.values()
    }
}

impl ModeWriter {
    /// Publish a new current mode.
    pub fn set(&self, mode: Mode) {
        let mode = Arc::new(mode);

        match self.cell.write() {
            Ok(mut guard) => *guard = mode,
            // The lock only ever guards a pointer swap, so a poisoned lock still holds a whole
            // mode.
            Err(poisoned) => *poisoned.into_inner() = mode,
        }
    }

    /// Create another reader of the cell.
    pub fn reader(&self) -> ModeReader {
        ModeReader { cell: self.cell.clone() }
    }
}

impl ModeReader {
    /// Get the current mode.
    pub fn get(&self) -> Arc<Mode> {
        match self.cell.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}
