//! Device supervision module
//!
//! A [`DeviceSupervisor`] owns the connection to one piece of equipment. It opens the device,
//! hands the live handle to consumers one operation at a time, tears the connection down when an
//! operation reports a fault and retries the open after a fixed backoff.
//!
//! Supervisors are driven by [`DeviceSupervisor::step`] with the current time, so no supervisor
//! ever sleeps or blocks beyond a single open attempt.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use params::*;
pub use state::*;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors reported by the supervisor itself.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SupervisorError {
    #[error("Device {0} is not connected")]
    NotConnected(String),

    #[error("Gave up connecting to {device} after {attempts} failed attempts")]
    RetriesExhausted {
        device: String,
        attempts: u32
    },
}

/// Errors from an operation run through [`DeviceSupervisor::with_handle`].
#[derive(Debug, thiserror::Error)]
pub enum HandleError<E: std::error::Error + 'static> {
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    #[error(transparent)]
    Op(E),
}
