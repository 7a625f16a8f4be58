//! Motion control module
//!
//! Converts the observation of the active target into a wheel speed command for the mecanum
//! chassis. The target is centred horizontally by strafing and approached by driving forward.

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

/// Possible errors that can occur during MotionCtrl operation.
///
/// These only occur for malformed observations, a missing target is planned as a stop.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum MotionCtrlError {
    #[error("Observation frame has zero size ({0}x{1})")]
    ZeroFrameSize(u32, u32),

    #[error("Observation field {0} is not finite")]
    NotFinite(&'static str),

    #[error("Centroid ({0}, {1}) lies outside the frame")]
    CentroidOutsideFrame(f64, f64),

    #[error("Negative target radius: {0}")]
    NegativeRadius(f64),

    #[error("Confidence {0} is outside [0, 1]")]
    InvalidConfidence(f64),
}
