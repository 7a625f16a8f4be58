//! Implementations for the MotionCtrl state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use eqpt_if::mech::{WheelCommand, NUM_WHEELS};
use log::trace;
use serde::Serialize;

// Internal
use super::{MotionCtrlError, Params};
use crate::params::ConfigError;
use crate::vision::{Detection, TargetObservation};
use util::{
    params,
    module::State,
    archive::{Archived, Archiver, ArchiveError},
    session::Session};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Motion control module state
#[derive(Default)]
pub struct MotionCtrl {

    pub(crate) params: Params,

    pub(crate) report: StatusReport,
    arch_report: Archiver,

    pub(crate) output: Option<WheelCommand>,
    arch_output: Archiver
}

/// Initialisation data for MotionCtrl.
pub struct InitData {
    /// Path to the parameter file, relative to the parameters directory.
    pub params_file: &'static str,

    /// If true the outputs and status reports are archived in the session.
    pub archive: bool,
}

/// Input data to Motion Control.
#[derive(Debug, Clone)]
pub struct InputData {
    /// The observation of the active target on this cycle.
    pub observation: TargetObservation,

    /// Speed multiplier of the current mode.
    pub speed_scale: f64,
}

/// Status report for MotionCtrl processing.
///
/// Kept flat so that it can be archived as a CSV record.
#[derive(Clone, Copy, Default, Serialize, Debug, PartialEq)]
pub struct StatusReport {
    /// True if a target was being tracked.
    pub target_present: bool,

    /// Unlimited forward component of the command.
    pub forward: f64,

    /// Unlimited strafe component of the command, positive to the right.
    pub strafe: f64,

    pub front_left_limited: bool,
    pub front_right_limited: bool,
    pub back_left_limited: bool,
    pub back_right_limited: bool,
}

/// Possible errors during MotionCtrl initialisation.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("Invalid MotionCtrl parameters: {0}")]
    Config(#[from] ConfigError),

    #[error("Could not create the MotionCtrl archives: {0}")]
    Archive(#[from] ArchiveError),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl State for MotionCtrl {
    type InitData = InitData;
    type InitError = InitError;

    type InputData = InputData;
    type OutputData = WheelCommand;
    type StatusReport = StatusReport;
    type ProcError = MotionCtrlError;

    /// Initialise the MotionCtrl module.
    fn init(&mut self, init_data: Self::InitData, session: &Session)
        -> Result<(), Self::InitError>
    {
        // Load the parameters
        let params: Params = params::load(init_data.params_file)
            .map_err(ConfigError::from)?;
        params.validate()?;
        self.params = params;

        // Initialise the archivers
        if init_data.archive {
            self.arch_report = Archiver::from_path(
                session, "motion_ctrl/status_report.csv"
            )?;
            self.arch_output = Archiver::from_path(
                session, "motion_ctrl/output.csv"
            )?;
        }

        Ok(())
    }

    /// Perform cyclic processing of Motion Control.
    fn proc(&mut self, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>
    {
        // Clear the status report
        self.report = StatusReport::default();

        let (output, report) = self.plan_scaled(
            &input_data.observation,
            input_data.speed_scale
        )?;

        trace!("MotionCtrl output: {:?}", output.to_array());

        self.output = Some(output);
        self.report = report;

        Ok((output, report))
    }
}

impl Archived for MotionCtrl {
    fn write(&mut self) -> Result<(), ArchiveError> {
        // Nothing to write if archiving is disabled
        if !self.arch_output.is_initialised() {
            return Ok(())
        }

        self.arch_report.serialise(self.report)?;
        self.arch_output.serialise(self.output.unwrap_or_default())?;

        Ok(())
    }
}

impl MotionCtrl {

    /// Create a new instance from already loaded parameters.
    pub fn new(params: Params) -> Result<Self, ConfigError> {
        params.validate()?;

        Ok(Self {
            params,
            ..Default::default()
        })
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Plan the wheel command for an observation at full speed.
    pub fn plan(&self, observation: &TargetObservation)
        -> Result<WheelCommand, MotionCtrlError>
    {
        self.plan_scaled(observation, 1.0).map(|(cmd, _)| cmd)
    }

    /// Plan the wheel command for an observation, scaling all wheel speeds by `speed_scale`
    /// before they are limited.
    ///
    /// An absent observation always gives the stop command.
    pub fn plan_scaled(&self, observation: &TargetObservation, speed_scale: f64)
        -> Result<(WheelCommand, StatusReport), MotionCtrlError>
    {
        let mut report = StatusReport::default();

        let det = match observation.detection {
            Some(ref d) => d,
            None => return Ok((WheelCommand::stop(), report))
        };

        if !speed_scale.is_finite() {
            return Err(MotionCtrlError::NotFinite("speed_scale"))
        }

        self.check_detection(observation, det)?;

        // Normalised offsets from the frame centre, between -1 and 1
        let (w, h) = (observation.frame_width as f64, observation.frame_height as f64);
        let dx = (det.centroid_px.0 - (w - 1.0) / 2.0) / (w / 2.0);
        let dy = (det.centroid_px.1 - (h - 1.0) / 2.0) / (h / 2.0);

        let strafe = self.params.gain_strafe * dx;

        // Image y grows downwards, so a target high in the frame is further away
        let mut forward = -self.params.gain_forward * dy;

        if let Some(stop_radius) = self.params.stop_radius_px {
            forward *= util::maths::clamp(&(1.0 - det.radius_px / stop_radius), &0.0, &1.0);
        }

        if det.confidence < self.params.min_drive_confidence {
            forward = 0.0;
        }

        report.target_present = true;
        report.forward = forward;
        report.strafe = strafe;

        // Mecanum mixing, positive strafe moves the chassis to the right
        let mut speeds = [
            forward + strafe,
            forward - strafe,
            forward - strafe,
            forward + strafe,
        ];

        let mut limited = [false; NUM_WHEELS];
        for i in 0..NUM_WHEELS {
            let s = speeds[i] * speed_scale;
            speeds[i] = util::maths::clamp(&s, &-self.params.max_speed, &self.params.max_speed);
            limited[i] = speeds[i] != s;
        }

        report.front_left_limited = limited[0];
        report.front_right_limited = limited[1];
        report.back_left_limited = limited[2];
        report.back_right_limited = limited[3];

        Ok((WheelCommand::from_array(speeds), report))
    }

    /// Output of the last processed cycle.
    pub fn output(&self) -> Option<WheelCommand> {
        self.output
    }

    /// Check that a detection can be planned on.
    fn check_detection(&self, obs: &TargetObservation, det: &Detection)
        -> Result<(), MotionCtrlError>
    {
        if obs.frame_width == 0 || obs.frame_height == 0 {
            return Err(MotionCtrlError::ZeroFrameSize(obs.frame_width, obs.frame_height))
        }

        let (cx, cy) = det.centroid_px;
        if !cx.is_finite() {
            return Err(MotionCtrlError::NotFinite("centroid_px.0"))
        }
        if !cy.is_finite() {
            return Err(MotionCtrlError::NotFinite("centroid_px.1"))
        }
        if !det.radius_px.is_finite() {
            return Err(MotionCtrlError::NotFinite("radius_px"))
        }
        if !det.confidence.is_finite() {
            return Err(MotionCtrlError::NotFinite("confidence"))
        }

        if cx < 0.0
            || cy < 0.0
            || cx > (obs.frame_width - 1) as f64
            || cy > (obs.frame_height - 1) as f64
        {
            return Err(MotionCtrlError::CentroidOutsideFrame(cx, cy))
        }

        if det.radius_px < 0.0 {
            return Err(MotionCtrlError::NegativeRadius(det.radius_px))
        }

        if !(0.0..=1.0).contains(&det.confidence) {
            return Err(MotionCtrlError::InvalidConfidence(det.confidence))
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;

    const W: u32 = 600;
    const H: u32 = 450;

    fn obs_at(cx: f64, cy: f64) -> TargetObservation {
        TargetObservation::present(W, H, Detection {
            target: "green".into(),
            centroid_px: (cx, cy),
            area_px: 400,
            radius_px: 11.3,
            confidence: 0.95,
        })
    }

    fn params() -> Params {
        Params {
            gain_forward: 0.8,
            gain_strafe: 1.5,
            max_speed: 1.0,
            stop_radius_px: None,
            min_drive_confidence: 0.0,
        }
    }

    #[test]
    fn test_absent_is_stop() {
        let mc = MotionCtrl::new(params()).unwrap();
        let cmd = mc.plan(&TargetObservation::absent(W, H)).unwrap();

        assert_eq!(cmd, WheelCommand::stop());
        assert!(cmd.is_stop());
    }

    #[test]
    fn test_centre_has_no_strafe() {
        let mc = MotionCtrl::new(params()).unwrap();
        let cmd = mc.plan(&obs_at((W - 1) as f64 / 2.0, (H - 1) as f64 / 2.0)).unwrap();

        assert_eq!(cmd.front_left, cmd.front_right);
        assert_eq!(cmd.back_left, cmd.back_right);
        assert_eq!(cmd.front_left, cmd.back_left);
        assert_abs_diff_eq!(cmd.front_left, 0.0);

        // Centred horizontally but high in the frame drives straight forward
        let cmd = mc.plan(&obs_at((W - 1) as f64 / 2.0, 50.0)).unwrap();
        assert_eq!(cmd.front_left, cmd.front_right);
        assert!(cmd.front_left > 0.0);
    }

    #[test]
    fn test_target_right_strafes_right() {
        let mc = MotionCtrl::new(params()).unwrap();
        let cmd = mc.plan(&obs_at(500.0, (H - 1) as f64 / 2.0)).unwrap();

        assert!(cmd.front_left > 0.0);
        assert!(cmd.back_right > 0.0);
        assert!(cmd.front_right < 0.0);
        assert!(cmd.back_left < 0.0);
        assert_abs_diff_eq!(cmd.front_left, -cmd.front_right);
    }

    #[test]
    fn test_output_within_limits() {
        let mut p = params();
        p.gain_forward = 3.0;
        p.gain_strafe = 4.0;
        p.max_speed = 0.6;
        let mc = MotionCtrl::new(p).unwrap();

        let steps = 20;
        for i in 0..=steps {
            for j in 0..=steps {
                let cx = (W - 1) as f64 * i as f64 / steps as f64;
                let cy = (H - 1) as f64 * j as f64 / steps as f64;

                for scale in &[0.0, 0.5, 1.0] {
                    let (cmd, report) = mc.plan_scaled(&obs_at(cx, cy), *scale).unwrap();
                    for s in cmd.to_array().iter() {
                        assert!(s.abs() <= 0.6, "speed {} at ({}, {})", s, cx, cy);
                    }
                    if *scale == 0.0 {
                        assert!(cmd.is_stop());
                        assert!(!report.front_left_limited);
                    }
                }
            }
        }

        // A corner target saturates every wheel it drives hard
        let (_, report) = mc.plan_scaled(&obs_at(0.0, 0.0), 1.0).unwrap();
        assert!(report.front_right_limited);
        assert!(report.back_left_limited);
    }

    #[test]
    fn test_approach_gating() {
        let mut p = params();
        p.stop_radius_px = Some(20.0);
        p.min_drive_confidence = 0.5;
        let mc = MotionCtrl::new(p).unwrap();

        let mut obs = obs_at((W - 1) as f64 / 2.0, 0.0);
        let full = mc.plan(&obs).unwrap().front_left;
        assert!(full > 0.0);

        // Half way to the stop radius halves the forward speed
        obs.detection.as_mut().unwrap().radius_px = 10.0;
        assert_abs_diff_eq!(
            mc.plan(&obs).unwrap().front_left,
            0.8 * (H as f64 - 1.0) / H as f64 * 0.5,
            epsilon = 1e-9
        );

        // At or past the stop radius there is no forward motion
        obs.detection.as_mut().unwrap().radius_px = 25.0;
        assert!(mc.plan(&obs).unwrap().is_stop());

        // Low confidence targets are not driven at
        obs.detection.as_mut().unwrap().radius_px = 1.0;
        obs.detection.as_mut().unwrap().confidence = 0.3;
        assert!(mc.plan(&obs).unwrap().is_stop());
    }

    #[test]
    fn test_malformed_observations() {
        let mc = MotionCtrl::new(params()).unwrap();

        let mut obs = obs_at(std::f64::NAN, 10.0);
        assert_eq!(mc.plan(&obs), Err(MotionCtrlError::NotFinite("centroid_px.0")));

        obs = obs_at(W as f64, 10.0);
        assert!(matches!(mc.plan(&obs), Err(MotionCtrlError::CentroidOutsideFrame(..))));

        obs = obs_at(10.0, 10.0);
        obs.detection.as_mut().unwrap().radius_px = -1.0;
        assert_eq!(mc.plan(&obs), Err(MotionCtrlError::NegativeRadius(-1.0)));

        obs = obs_at(10.0, 10.0);
        obs.detection.as_mut().unwrap().confidence = 1.1;
        assert_eq!(mc.plan(&obs), Err(MotionCtrlError::InvalidConfidence(1.1)));

        obs = obs_at(0.0, 0.0);
        obs.frame_width = 0;
        assert_eq!(mc.plan(&obs), Err(MotionCtrlError::ZeroFrameSize(0, H)));
    }

    #[test]
    fn test_proc_records_output() {
        let mut mc = MotionCtrl::new(params()).unwrap();

        let (cmd, report) = mc.proc(&InputData {
            observation: obs_at(100.0, 100.0),
            speed_scale: 0.5,
        }).unwrap();

        assert!(report.target_present);
        assert_eq!(mc.output(), Some(cmd));
        assert_eq!(
            cmd,
            mc.plan_scaled(&obs_at(100.0, 100.0), 0.5).unwrap().0
        );

        // Archiving disabled, nothing to write
        mc.write().unwrap();
    }

    #[test]
    fn test_invalid_params() {
        let mut p = params();
        p.max_speed = 0.0;
        assert!(MotionCtrl::new(p).is_err());

        let mut p = params();
        p.min_drive_confidence = 2.0;
        assert!(MotionCtrl::new(p).is_err());
    }
}
