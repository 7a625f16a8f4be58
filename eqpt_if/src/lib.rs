//! # Equipment interface crate.
//!
//! Provides the interfaces between the tracker and its equipment: the camera
//! frames it consumes, the wheel and servo demands it produces, the input
//! events that change its mode, and the device lifecycle traits used to
//! supervise all of them.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Camera frames and frame sources
pub mod cam;

/// Device lifecycle traits and errors shared by all equipment
pub mod device;

/// Input device events
pub mod input;

/// Wheel and servo demands
pub mod mech;
