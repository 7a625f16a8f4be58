//! Vision module
//!
//! Finds coloured targets in camera frames. Frames are first normalised to a working width and
//! the HSV colour space by [`convert`], then [`select`] runs the blob locator for every target
//! of the current mode and picks the best observation.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod blob;
mod frame_conv;
mod params;
mod target_sel;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use eqpt_if::cam::{ColorSpace, FrameError};

// Internal
pub use blob::*;
pub use frame_conv::*;
pub use params::*;
pub use target_sel::*;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur during vision processing.
///
/// Not finding a target is not an error, it is reported as an absent observation.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum VisionError {
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Expected a frame in the {expected:?} colour space, found {found:?}")]
    WrongColorSpace {
        expected: ColorSpace,
        found: ColorSpace
    },

    #[error("Target width must be greater than zero")]
    InvalidTargetWidth,

    #[error("Could not build the converted frame: {0}")]
    FrameError(FrameError),
}
