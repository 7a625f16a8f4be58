//! # Tracker library.
//!
//! This library allows other crates in the workspace, and the benchmarks, to access items defined
//! inside the tracker crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Global data store - holds the state of the current cycle
pub mod data_store;

/// Device supervision - opens, monitors and reopens each piece of equipment
pub mod dev_sup;

/// Equipment drivers - actuator, camera and input device implementations
pub mod drivers;

/// Input loop - reads the input device on its own thread and selects the tracking mode
pub mod input_loop;

/// Tracking modes and the shared current mode cell
pub mod mode;

/// Motion control module - converts target observations into wheel commands
pub mod motion_ctrl;


/// Executable parameters and configuration errors
pub mod params;

/// Tracker - the body of the control loop
pub mod tracker;

/// Vision module - locates coloured targets in camera frames
pub mod vision;
