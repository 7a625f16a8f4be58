//! Module interfaces
//!
//! Every cyclic processing module of the tracker (e.g. `motion_ctrl`) implements [`State`]. The
//! module is created with `Default`, initialised once at startup from its parameter file, then
//! processed once per control cycle by the main loop.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal imports
use crate::session::Session;

// ---------------------------------------------------------------------------
// MODULE STATE
// ---------------------------------------------------------------------------

/// The module's internal state.
pub trait State {
    /// Data required during initialisation, usually the parameter file name.
    type InitData;
    /// An error which can occur during initialisation.
    type InitError;

    /// Data consumed by each cycle.
    type InputData;
    /// Data produced by each cycle.
    type OutputData;
    /// Report on what happened during the cycle, for telemetry and archives.
    type StatusReport;
    /// An error which can occur during cyclic processing.
    type ProcError;

    /// Initialise the module.
    ///
    /// Initialisation errors are fatal to the executable. Archivers are created in the session
    /// directory here, so `session` must be the session of this execution.
    fn init(&mut self, init_data: Self::InitData, session: &Session)
        -> Result<(), Self::InitError>;

    /// Process one cycle.
    ///
    /// A `ProcError` only affects the current cycle, the main loop logs it and carries on with
    /// the module's safe output.
    fn proc(&mut self, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>;
}
