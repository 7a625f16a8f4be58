//! # Mechanisms Equipment Demands

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use crate::device::{DeviceHandle, Fault};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Number of drive wheels on the chassis.
pub const NUM_WHEELS: usize = 4;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Speed demand for all four wheels of the chassis.
///
/// Speeds are signed and normalised, positive drives the wheel so that the chassis moves
/// forwards. The all-zero command is the stop command.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq)]
pub struct WheelCommand {
    pub front_left: f64,
    pub front_right: f64,
    pub back_left: f64,
    pub back_right: f64,
}

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Capability to command the chassis actuators.
pub trait ActuatorPort: DeviceHandle {
    /// Set the speed of all four wheels.
    fn set_wheel_speeds(&mut self, cmd: &WheelCommand) -> Result<(), ActuatorError>;

    /// Set a positional servo channel, `value` is between 0.0 and 1.0 of the servo's travel.
    fn set_servo(&mut self, channel: u8, value: f64) -> Result<(), ActuatorError>;
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors reported by an [`ActuatorPort`].
#[derive(Debug, thiserror::Error)]
pub enum ActuatorError {
    #[error("The actuator rejected the command: {0}")]
    Rejected(String),

    #[error("Servo value must be between 0.0 and 1.0, got {0}")]
    InvalidServoValue(f64),

    #[error("Channel {0} does not exist on this actuator")]
    InvalidChannel(u8),

    #[error("Communication with the actuator failed: {0}")]
    Io(String),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl WheelCommand {
    /// The stop command, all wheels at zero speed.
    pub fn stop() -> Self {
        Self::default()
    }

    /// Build a command from an array in front-left, front-right, back-left, back-right order.
    pub fn from_array(speeds: [f64; NUM_WHEELS]) -> Self {
        Self {
            front_left: speeds[0],
            front_right: speeds[1],
            back_left: speeds[2],
            back_right: speeds[3],
        }
    }

    /// The speeds in front-left, front-right, back-left, back-right order.
    pub fn to_array(&self) -> [f64; NUM_WHEELS] {
        [
            self.front_left,
            self.front_right,
            self.back_left,
            self.back_right,
        ]
    }

    /// Returns true if every wheel is stopped.
    pub fn is_stop(&self) -> bool {
        self.to_array().iter().all(|s| *s == 0.0)
    }
}

impl Fault for ActuatorError {
    fn is_fault(&self) -> bool {
        matches!(self, ActuatorError::Io(_))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_stop_command() {
        assert!(WheelCommand::stop().is_stop());
        assert!(!WheelCommand::from_array([0.0, 0.0, 0.1, 0.0]).is_stop());
        assert_eq!(
            WheelCommand::from_array([1.0, 2.0, 3.0, 4.0]).to_array(),
            [1.0, 2.0, 3.0, 4.0]
        );
    }

    #[test]
    fn test_only_io_errors_fault_the_handle() {
        assert!(ActuatorError::Io("bus error".into()).is_fault());
        assert!(!ActuatorError::Rejected("too fast".into()).is_fault());
        assert!(!ActuatorError::InvalidServoValue(2.0).is_fault());
    }
}
