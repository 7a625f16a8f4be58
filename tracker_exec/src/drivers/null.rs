//! [`ActuatorPort`] which accepts every command and does nothing with it

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use eqpt_if::{
    device::{DeviceHandle, DeviceOpener, OpenError},
    mech::{ActuatorError, ActuatorPort, WheelCommand}
};
use log::trace;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Opener for [`NullActuator`], which never fails.
#[derive(Debug, Default)]
pub struct NullActuatorOpener;

/// Actuator that discards all commands.
#[derive(Debug, Default)]
pub struct NullActuator {
    last_cmd: Option<WheelCommand>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl DeviceOpener for NullActuatorOpener {
    type Handle = NullActuator;

    fn name(&self) -> &str {
        "null actuator"
    }

    fn open(&mut self) -> Result<Self::Handle, OpenError> {
        Ok(NullActuator::default())
    }
}

impl NullActuator {
    /// The last wheel command received.
    pub fn last_cmd(&self) -> Option<WheelCommand> {
        self.last_cmd
    }
}

impl DeviceHandle for NullActuator {}

impl ActuatorPort for NullActuator {
    fn set_wheel_speeds(&mut self, cmd: &WheelCommand) -> Result<(), ActuatorError> {
        trace!("NullActuator wheels: {:?}", cmd.to_array());
        self.last_cmd = Some(*cmd);
        Ok(())
    }

    fn set_servo(&mut self, channel: u8, value: f64) -> Result<(), ActuatorError> {
        if !(0.0..=1.0).contains(&value) {
            return Err(ActuatorError::InvalidServoValue(value))
        }

        trace!("NullActuator servo {}: {}", channel, value);
        Ok(())
    }
}
