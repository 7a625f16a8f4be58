//! Input event loop module
//!
//! Reads events from the input device on a dedicated thread and turns button presses into mode
//! changes. The thread supervises its own device, so a stalled or disconnected input device never
//! blocks motion control.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod dispatch;
mod worker;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use dispatch::*;
pub use worker::*;
