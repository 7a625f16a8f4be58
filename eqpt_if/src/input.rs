//! # Input Device Interface

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::device::{DeviceHandle, Fault};

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A source of discrete input events, for instance a gamepad.
pub trait InputDevice: DeviceHandle {
    /// Wait up to `timeout` for the next event.
    ///
    /// Returns `Ok(None)` if no event arrived within the timeout.
    fn read_event(&mut self, timeout: Duration) -> Result<Option<InputEvent>, ReadError>;
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// A single decoded input event.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    /// A button changed state.
    Button {
        number: u8,
        pressed: bool
    },

    /// An axis moved, `value` spans the full `i16` range.
    Axis {
        number: u8,
        value: i16
    },
}

/// Errors which can occur while reading from an input device.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("The input device has been disconnected")]
    Disconnected,

    #[error("Could not read from the input device: {0}")]
    Io(std::io::Error),

    #[error("Recieved a malformed event: {0}")]
    Malformed(String),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Fault for ReadError {
    fn is_fault(&self) -> bool {
        !matches!(self, ReadError::Malformed(_))
    }
}
