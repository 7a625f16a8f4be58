//! Parameters structure for MotionCtrl

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use crate::params::ConfigError;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for Motion control.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Params {

    // ---- CONTROL LAW ----

    /// Gain between the normalised vertical offset of the target and the forward speed.
    pub gain_forward: f64,

    /// Gain between the normalised horizontal offset of the target and the strafe speed.
    pub gain_strafe: f64,

    // ---- CAPABILITIES ----

    /// Maximum absolute speed of any wheel.
    ///
    /// Units: normalised speed
    pub max_speed: f64,

    // ---- APPROACH ----

    /// Radius of the target at which forward motion stops. No approach gating is applied if
    /// this is not set.
    ///
    /// Units: pixels
    #[serde(default)]
    pub stop_radius_px: Option<f64>,

    /// Detections below this confidence may be strafed towards but not driven at.
    #[serde(default)]
    pub min_drive_confidence: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Params {
    /// Check the parameters are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.gain_forward > 0.0) {
            return Err(ConfigError::NotPositive("gain_forward", self.gain_forward))
        }
        if !(self.gain_strafe > 0.0) {
            return Err(ConfigError::NotPositive("gain_strafe", self.gain_strafe))
        }
        if !(self.max_speed > 0.0) {
            return Err(ConfigError::NotPositive("max_speed", self.max_speed))
        }
        if let Some(r) = self.stop_radius_px {
            if !(r > 0.0) {
                return Err(ConfigError::NotPositive("stop_radius_px", r))
            }
        }
        if !(0.0..=1.0).contains(&self.min_drive_confidence) {
            return Err(ConfigError::OutOfRange(
                "min_drive_confidence", 0.0, 1.0, self.min_drive_confidence
            ))
        }

        Ok(())
    }
}

impl Default for Params {
    fn default() -> Self {
        Self {
            gain_forward: 1.0,
            gain_strafe: 1.0,
            max_speed: 1.0,
            stop_radius_px: None,
            min_drive_confidence: 0.0,
        }
    }
}
