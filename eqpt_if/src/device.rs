//! # Device Lifecycle Interface
//!
//! Every piece of supervised equipment is opened through a [`DeviceOpener`], which produces a
//! [`DeviceHandle`]. Errors returned from operations on a handle implement [`Fault`] so that the
//! supervisor can tell a rejected request apart from a broken connection.

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Something which can open a connection to a device.
pub trait DeviceOpener {
    /// The live connection produced by a successful open.
    type Handle: DeviceHandle;

    /// Human readable name of the device, used in logs.
    fn name(&self) -> &str;

    /// Make a single attempt at opening the device.
    ///
    /// Implementations must not retry internally, retrying is the supervisor's job.
    fn open(&mut self) -> Result<Self::Handle, OpenError>;
}

/// A live connection to a device.
pub trait DeviceHandle {
    /// Close the connection, releasing the underlying resource.
    ///
    /// After this call any blocked operation on the handle must return. The handle is dropped
    /// straight after, so the default implementation, which relies on `Drop`, is often enough.
    fn close(&mut self) {}
}

/// Classification of errors produced by device operations.
pub trait Fault {
    /// Returns `true` if the error means the connection is broken and the handle must be torn
    /// down and reopened.
    fn is_fault(&self) -> bool;
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors which can occur while opening a device.
#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    #[error("Device {0} was not found")]
    NotFound(String),

    #[error("Could not open device {0}: {1}")]
    Io(String, std::io::Error),

    #[error("Device {0} responded but could not be initialised: {1}")]
    InitFailed(String, String),

    #[error("Device {0} did not finish opening within {1:?}")]
    Timeout(String, std::time::Duration),
}
