//! # Tracker Executable Parameters
//!
//! This module provides parameters for the tracker executable and the configuration errors shared
//! by all module parameter files.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use crate::drivers::capture_thread::CaptureTimeouts;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerExecParams {

    // ---- CYCLE ----

    /// Target period of one control cycle.
    ///
    /// Units: seconds
    #[serde(default = "default_cycle_period_s")]
    pub cycle_period_s: f64,

    /// Write module archives into the session directory.
    #[serde(default)]
    pub archive: bool,

    // ---- DEVICES ----

    /// Path to the joystick device.
    pub joystick_device: String,

    /// Path to the camera device.
    pub camera_device: String,

    /// Resolution requested from the camera.
    ///
    /// Units: pixels
    #[serde(default = "default_camera_resolution")]
    pub camera_resolution: (u32, u32),

    /// Timeout on a single input device read.
    ///
    /// Units: milliseconds
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Time without any camera frame after which the camera is restarted.
    ///
    /// Units: seconds
    #[serde(default = "default_capture_watchdog_s")]
    pub capture_watchdog_s: f64,

    // ---- INPUT ----

    /// Button which returns the tracker to idle.
    #[serde(default)]
    pub stop_button: Option<u8>,

    /// Restart the actuator whenever the input device faults.
    #[serde(default)]
    pub restart_actuator_on_input_fault: bool,

    // ---- SERVOS ----

    /// Servos driven to a home position whenever the actuator connects.
    #[serde(default)]
    pub servo_home: Vec<ServoHome>,

    // ---- PCA9685 ----

    /// I2C address of the PWM controller.
    #[serde(default = "default_pca9685_address")]
    pub pca9685_address: u8,

    /// PWM output frequency.
    ///
    /// Units: hertz
    #[serde(default = "default_pwm_freq_hz")]
    pub pwm_freq_hz: f64,

    /// Controller channel of each wheel, in front left, front right, back left, back right order.
    pub wheel_channels: [u8; 4],

    /// Reverse the direction of a wheel, in the same order as `wheel_channels`.
    #[serde(default)]
    pub wheel_reversed: [bool; 4],

    /// Pulse length at which a continuous rotation wheel servo is stationary.
    ///
    /// Units: microseconds
    #[serde(default = "default_wheel_neutral_us")]
    pub wheel_neutral_us: f64,

    /// Pulse length difference from neutral at full wheel speed.
    ///
    /// Units: microseconds
    #[serde(default = "default_wheel_span_us")]
    pub wheel_span_us: f64,

    /// Pulse length range of positional servos, `(min, max)`.
    ///
    /// Units: microseconds
    #[serde(default = "default_servo_range_us")]
    pub servo_range_us: (f64, f64),
}

/// Home position of a single servo.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ServoHome {
    /// Controller channel of the servo.
    pub channel: u8,

    /// Normalised position, between 0 and 1.
    pub position: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors found while validating parameter files.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not load the parameter file: {0}")]
    Load(#[from] util::params::LoadError),

    #[error("Range \"{name}\" has a minimum ({min:?}) above its maximum ({max:?})")]
    RangeInverted {
        name: String,
        min: [u8; 3],
        max: [u8; 3]
    },

    #[error("Range \"{0}\" has a hue above 179")]
    HueOutOfRange(String),

    #[error("Range \"{0}\" has no bands")]
    EmptyRange(String),

    #[error("Mode \"{mode}\" tracks \"{target}\" which is not a configured range")]
    UnknownTarget {
        mode: String,
        target: String
    },

    #[error("Initial mode \"{0}\" does not exist")]
    UnknownInitialMode(String),

    #[error("Button {button} is used by both the \"{first}\" and \"{second}\" modes")]
    DuplicateButton {
        button: u8,
        first: String,
        second: String
    },

    #[error("Expected {0} to be greater than zero, found {1}")]
    NotPositive(&'static str, f64),

    #[error("Expected {0} to be between {1} and {2}, found {3}")]
    OutOfRange(&'static str, f64, f64, f64),

    #[error("Channel {0} is not a valid PWM controller channel")]
    InvalidChannel(u8),
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn default_cycle_period_s() -> f64 {
    0.5
}

fn default_camera_resolution() -> (u32, u32) {
    (640, 480)
}

fn default_read_timeout_ms() -> u64 {
    100
}

fn default_capture_watchdog_s() -> f64 {
    2.0
}

fn default_pca9685_address() -> u8 {
    0x40
}

fn default_pwm_freq_hz() -> f64 {
    50.0
}

fn default_wheel_neutral_us() -> f64 {
    1500.0
}

fn default_wheel_span_us() -> f64 {
    500.0
}

fn default_servo_range_us() -> (f64, f64) {
    (500.0, 2500.0)
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl TrackerExecParams {
    /// Check the parameters are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.cycle_period_s > 0.0 && self.cycle_period_s.is_finite()) {
            return Err(ConfigError::NotPositive("cycle_period_s", self.cycle_period_s))
        }
        if !(self.capture_watchdog_s >= self.cycle_period_s
            && self.capture_watchdog_s.is_finite())
        {
            return Err(ConfigError::OutOfRange(
                "capture_watchdog_s",
                self.cycle_period_s,
                std::f64::INFINITY,
                self.capture_watchdog_s
            ))
        }
        if self.read_timeout_ms == 0 {
            return Err(ConfigError::NotPositive("read_timeout_ms", 0.0))
        }
        if !(self.pwm_freq_hz > 0.0) {
            return Err(ConfigError::NotPositive("pwm_freq_hz", self.pwm_freq_hz))
        }
        if !(self.wheel_span_us > 0.0) {
            return Err(ConfigError::NotPositive("wheel_span_us", self.wheel_span_us))
        }
        if !(self.servo_range_us.1 > self.servo_range_us.0) {
            return Err(ConfigError::NotPositive(
                "servo_range_us width", self.servo_range_us.1 - self.servo_range_us.0
            ))
        }

        for ch in self.wheel_channels.iter().chain(self.servo_home.iter().map(|s| &s.channel)) {
            if *ch > 15 {
                return Err(ConfigError::InvalidChannel(*ch))
            }
        }

        for s in &self.servo_home {
            if !(0.0..=1.0).contains(&s.position) {
                return Err(ConfigError::OutOfRange("servo_home.position", 0.0, 1.0, s.position))
            }
        }

        Ok(())
    }

    /// Timeout on a single input device read.
    pub fn read_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.read_timeout_ms)
    }

    /// Period of one control cycle.
    pub fn cycle_period(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.cycle_period_s)
    }

    /// Time limits on camera reads, one cycle per frame.
    pub fn capture_timeouts(&self) -> CaptureTimeouts {
        CaptureTimeouts {
            frame: self.cycle_period(),
            watchdog: std::time::Duration::from_secs_f64(self.capture_watchdog_s)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const EXEC_TOML: &str = r#"
        joystick_device = "/dev/input/js0"
        camera_device = "/dev/video0"
        stop_button = 3
        wheel_channels = [0, 1, 2, 3]

        [[servo_home]]
        channel = 8
        position = 0.5
    "#;

    #[test]
    fn test_defaults() {
        let params: TrackerExecParams = util::params::parse(EXEC_TOML).unwrap();
        params.validate().unwrap();

        assert_eq!(params.cycle_period_s, 0.5);
        assert_eq!(params.read_timeout(), std::time::Duration::from_millis(100));
        assert_eq!(params.stop_button, Some(3));
        assert!(!params.restart_actuator_on_input_fault);
        assert!(!params.archive);
        assert_eq!(params.pca9685_address, 0x40);
        assert_eq!(params.servo_home.len(), 1);

        let timeouts = params.capture_timeouts();
        assert_eq!(timeouts.frame, std::time::Duration::from_millis(500));
        assert_eq!(timeouts.watchdog, std::time::Duration::from_secs(2));
    }

    #[test]
    fn test_invalid() {
        let mut params: TrackerExecParams = util::params::parse(EXEC_TOML).unwrap();
        params.wheel_channels[2] = 16;
        assert!(matches!(params.validate(), Err(ConfigError::InvalidChannel(16))));

        let mut params: TrackerExecParams = util::params::parse(EXEC_TOML).unwrap();
        params.servo_home[0].position = 1.2;
        assert!(matches!(params.validate(), Err(ConfigError::OutOfRange(..))));

        let mut params: TrackerExecParams = util::params::parse(EXEC_TOML).unwrap();
        params.cycle_period_s = 0.0;
        assert!(matches!(params.validate(), Err(ConfigError::NotPositive(..))));

        let mut params: TrackerExecParams = util::params::parse(EXEC_TOML).unwrap();
        params.cycle_period_s = std::f64::INFINITY;
        assert!(matches!(params.validate(), Err(ConfigError::NotPositive(..))));

        let mut params: TrackerExecParams = util::params::parse(EXEC_TOML).unwrap();
        params.cycle_period_s = std::f64::NAN;
        assert!(matches!(params.validate(), Err(ConfigError::NotPositive(..))));

        let mut params: TrackerExecParams = util::params::parse(EXEC_TOML).unwrap();
        params.capture_watchdog_s = 0.1;
        assert!(matches!(params.validate(), Err(ConfigError::OutOfRange(..))));
    }

    #[test]
    fn test_shipped_params() {
        let exec: TrackerExecParams = util::params::parse(
            include_str!("../../params/tracker_exec.toml")
        ).unwrap();
        exec.validate().unwrap();

        let vision: crate::vision::Params = util::params::parse(
            include_str!("../../params/vision.toml")
        ).unwrap();
        let vision = vision.validate().unwrap();
        assert_eq!(vision.modes.for_button(1).unwrap().name, "red");

        let motion: crate::motion_ctrl::Params = util::params::parse(
            include_str!("../../params/motion_ctrl.toml")
        ).unwrap();
        motion.validate().unwrap();

        let sup: crate::dev_sup::Params = util::params::parse(
            include_str!("../../params/dev_sup.toml")
        ).unwrap();
        sup.validate().unwrap();
    }
}
