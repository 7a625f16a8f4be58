//! Equipment drivers
//!
//! Implementations of the equipment interfaces for the hardware carried by the robot, plus the
//! no-op actuator used when no motor controller is fitted.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

/// Frame source read on a background thread with a watchdog
pub mod capture_thread;

/// V4L2 camera frame source
#[cfg(feature = "cam")]
pub mod camera;

/// Still image frame source
pub mod image_file;

/// Linux joystick input device
pub mod joystick;

/// Actuator which accepts and discards every command
pub mod null;

/// PCA9685 PWM controller actuator
pub mod pca9685;
