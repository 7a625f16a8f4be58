//! [`ActuatorPort`] implementation for the PCA9685 16 channel PWM controller
//!
//! Wheels are driven by continuous rotation servos, whose speed is set by the pulse length's
//! offset from a neutral pulse. Other servos are positional, with the position spanning the
//! configured pulse range.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use embedded_hal::blocking::i2c::{Write, WriteRead};
use eqpt_if::{
    device::{DeviceHandle, DeviceOpener, OpenError},
    mech::{ActuatorError, ActuatorPort, WheelCommand, NUM_WHEELS}
};
use log::{trace, warn};
use pwm_pca9685::{Channel, Pca9685};
use std::fmt::Debug;

use crate::params::TrackerExecParams;
use util::maths::{clamp, lin_map};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Number of counts in one PWM period.
const MAX_PWM: u16 = 4096;

/// Frequency of the controller's internal oscillator.
///
/// Units: hertz
const OSC_FREQ_HZ: f64 = 25_000_000.0;

/// Smallest prescale value accepted by the controller.
const MIN_PRESCALE: u8 = 3;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Channel and pulse configuration of the controller.
#[derive(Debug, Clone, Copy)]
pub struct Pca9685Config {
    pub pwm_freq_hz: f64,
    pub wheel_channels: [u8; NUM_WHEELS],
    pub wheel_reversed: [bool; NUM_WHEELS],
    pub wheel_neutral_us: f64,
    pub wheel_span_us: f64,
    pub servo_range_us: (f64, f64),
}

/// Opener for [`Pca9685Actuator`].
///
/// `connect` creates a driver on a fresh I2C bus, the opener then configures the PWM frequency
/// and enables the outputs.
pub struct Pca9685Opener<F> {
    connect: F,
    config: Pca9685Config,
}

/// Live connection to the controller.
pub struct Pca9685Actuator<I2C> {
    pwm: Pca9685<I2C>,
    config: Pca9685Config,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl From<&TrackerExecParams> for Pca9685Config {
    fn from(p: &TrackerExecParams) -> Self {
        Self {
            pwm_freq_hz: p.pwm_freq_hz,
            wheel_channels: p.wheel_channels,
            wheel_reversed: p.wheel_reversed,
            wheel_neutral_us: p.wheel_neutral_us,
            wheel_span_us: p.wheel_span_us,
            servo_range_us: p.servo_range_us,
        }
    }
}

impl Pca9685Config {
    /// Prescale register value giving the configured PWM frequency.
    pub fn prescale(&self) -> u8 {
        let p = (OSC_FREQ_HZ / (MAX_PWM as f64 * self.pwm_freq_hz)).round() - 1.0;
        clamp(&p, &(MIN_PRESCALE as f64), &(u8::MAX as f64)) as u8
    }

    /// Number of counts the output is high for to produce a pulse of `pulse_us`.
    pub fn pulse_to_counts(&self, pulse_us: f64) -> u16 {
        let counts = (pulse_us * 1e-6 * self.pwm_freq_hz * MAX_PWM as f64).round();
        clamp(&counts, &0.0, &((MAX_PWM - 1) as f64)) as u16
    }

    /// Pulse length for a normalised wheel speed.
    pub fn wheel_pulse_us(&self, wheel: usize, speed: f64) -> f64 {
        let speed = clamp(&speed, &-1.0, &1.0);
        let speed = if self.wheel_reversed[wheel] { -speed } else { speed };

        lin_map(
            (-1.0, 1.0),
            (
                self.wheel_neutral_us - self.wheel_span_us,
                self.wheel_neutral_us + self.wheel_span_us
            ),
            speed
        )
    }

    /// Pulse length for a normalised servo position.
    pub fn servo_pulse_us(&self, value: f64) -> f64 {
        lin_map((0.0, 1.0), self.servo_range_us, value)
    }
}

impl<F> Pca9685Opener<F> {
    pub fn new(connect: F, config: Pca9685Config) -> Self {
        Self {
            connect,
            config
        }
    }
}

impl<I2C, E, F> DeviceOpener for Pca9685Opener<F>
where
    I2C: Write<Error = E> + WriteRead<Error = E>,
    E: Debug,
    F: FnMut() -> Result<Pca9685<I2C>, OpenError>
{
    type Handle = Pca9685Actuator<I2C>;

    fn name(&self) -> &str {
        "PCA9685"
    }

    fn open(&mut self) -> Result<Self::Handle, OpenError> {
        let mut pwm = (self.connect)()?;

        let init_failed = |e: pwm_pca9685::Error<E>| {
            OpenError::InitFailed("PCA9685".into(), format!("{:?}", e))
        };

        pwm.set_prescale(self.config.prescale()).map_err(init_failed)?;
        pwm.enable().map_err(init_failed)?;

        let mut act = Pca9685Actuator {
            pwm,
            config: self.config
        };

        // Start with the wheels stationary
        act.set_wheel_speeds(&WheelCommand::stop())
            .map_err(|e| OpenError::InitFailed("PCA9685".into(), e.to_string()))?;

        Ok(act)
    }
}

impl<I2C, E> Pca9685Actuator<I2C>
where
    I2C: Write<Error = E> + WriteRead<Error = E>,
    E: Debug
{
    fn set_pulse(&mut self, channel: u8, pulse_us: f64) -> Result<(), ActuatorError> {
        let ch = to_channel(channel).ok_or(ActuatorError::InvalidChannel(channel))?;
        let counts = self.config.pulse_to_counts(pulse_us);

        trace!("PCA9685 channel {}: {:.1} us ({} counts)", channel, pulse_us, counts);

        match self.pwm.set_channel_on_off(ch, 0, counts) {
            Ok(_) => Ok(()),
            Err(pwm_pca9685::Error::I2C(e)) => Err(ActuatorError::Io(format!("{:?}", e))),
            Err(pwm_pca9685::Error::InvalidInputData) => Err(ActuatorError::Rejected(
                format!("invalid pulse of {} counts on channel {}", counts, channel)
            ))
        }
    }
}

impl<I2C, E> DeviceHandle for Pca9685Actuator<I2C>
where
    I2C: Write<Error = E> + WriteRead<Error = E>,
    E: Debug
{
    fn close(&mut self) {
        // Best effort, the bus may be the reason the handle is being closed
        if let Err(e) = self.set_wheel_speeds(&WheelCommand::stop()) {
            warn!("Could not stop the wheels while closing the PCA9685: {}", e);
        }
    }
}

impl<I2C, E> ActuatorPort for Pca9685Actuator<I2C>
where
    I2C: Write<Error = E> + WriteRead<Error = E>,
    E: Debug
{
    fn set_wheel_speeds(&mut self, cmd: &WheelCommand) -> Result<(), ActuatorError> {
        let speeds = cmd.to_array();

        if speeds.iter().any(|s| !s.is_finite()) {
            return Err(ActuatorError::Rejected(format!("non-finite wheel speed {:?}", speeds)))
        }

        for (i, speed) in speeds.iter().enumerate() {
            let pulse = self.config.wheel_pulse_us(i, *speed);
            self.set_pulse(self.config.wheel_channels[i], pulse)?;
        }

        Ok(())
    }

    fn set_servo(&mut self, channel: u8, value: f64) -> Result<(), ActuatorError> {
        if !(0.0..=1.0).contains(&value) {
            return Err(ActuatorError::InvalidServoValue(value))
        }
        if self.config.wheel_channels.contains(&channel) {
            warn!("Servo demand on wheel channel {} ignored", channel);
            return Err(ActuatorError::InvalidChannel(channel))
        }

        let pulse = self.config.servo_pulse_us(value);
        self.set_pulse(channel, pulse)
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Get the controller channel with the given index.
fn to_channel(index: u8) -> Option<Channel> {
    let ch = match index {
        0 => Channel::C0,
        1 => Channel::C1,
        2 => Channel::C2,
        3 => Channel::C3,
        4 => Channel::C4,
        5 => Channel::C5,
        6 => Channel::C6,
        7 => Channel::C7,
        8 => Channel::C8,
        9 => Channel::C9,
        10 => Channel::C10,
        11 => Channel::C11,
        12 => Channel::C12,
        13 => Channel::C13,
        14 => Channel::C14,
        15 => Channel::C15,
        _ => return None
    };

    Some(ch)
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn config() -> Pca9685Config {
        Pca9685Config {
            pwm_freq_hz: 50.0,
            wheel_channels: [0, 1, 2, 3],
            wheel_reversed: [false, true, false, true],
            wheel_neutral_us: 1500.0,
            wheel_span_us: 500.0,
            servo_range_us: (500.0, 2500.0),
        }
    }

    #[test]
    fn test_prescale() {
        assert_eq!(config().prescale(), 121);

        let mut c = config();
        c.pwm_freq_hz = 1e6;
        assert_eq!(c.prescale(), MIN_PRESCALE);
    }

    #[test]
    fn test_pulses() {
        let c = config();

        // 20 ms period, so 1.5 ms is 7.5 % of the counts
        assert_eq!(c.pulse_to_counts(1500.0), 307);
        assert_eq!(c.pulse_to_counts(1e6), MAX_PWM - 1);

        assert_abs_diff_eq!(c.wheel_pulse_us(0, 0.0), 1500.0);
        assert_abs_diff_eq!(c.wheel_pulse_us(0, 1.0), 2000.0);
        assert_abs_diff_eq!(c.wheel_pulse_us(0, 2.0), 2000.0);
        assert_abs_diff_eq!(c.wheel_pulse_us(1, 1.0), 1000.0);
        assert_abs_diff_eq!(c.wheel_pulse_us(2, -0.5), 1250.0);

        assert_abs_diff_eq!(c.servo_pulse_us(0.0), 500.0);
        assert_abs_diff_eq!(c.servo_pulse_us(0.5), 1500.0);
    }

    #[test]
    fn test_channels() {
        assert!(matches!(to_channel(0), Some(Channel::C0)));
        assert!(matches!(to_channel(15), Some(Channel::C15)));
        assert!(to_channel(16).is_none());
    }
}
