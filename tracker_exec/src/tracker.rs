//! # Tracker
//!
//! Runs one control cycle of the tracker: supervise the devices, capture a frame, locate the
//! target of the current mode, plan the wheel command and send it to the actuator.
//!
//! Every hardware error is handled here, at the supervisor boundary. A cycle never fails, at worst
//! it commands a stop.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use eqpt_if::{
    cam::{Frame, FrameSource},
    device::{DeviceOpener, Fault},
    mech::{ActuatorPort, WheelCommand}
};
use log::{error, info, trace, warn};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc
};
use std::time::Instant;

use crate::{
    data_store::{DataStore, SafeModeCause},
    dev_sup::{DeviceSupervisor, HandleError, SupState},
    mode::{Mode, ModeReader},
    motion_ctrl,
    params::ServoHome,
    vision::{self, TargetObservation, VisionConfig, VisionError}
};
use util::{archive::Archived, module::State};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Behaviour settings of the tracker.
#[derive(Debug, Clone, Default)]
pub struct TrackerSettings {
    /// Servos homed whenever a new actuator handle is published.
    pub servo_home: Vec<ServoHome>,

    /// Restart the actuator whenever the input device faults.
    pub restart_actuator_on_input_fault: bool,

    /// Write the MotionCtrl archives every cycle.
    pub archive: bool,
}

/// The tracker control loop body.
pub struct Tracker<A: DeviceOpener, C: DeviceOpener> {
    actuator: DeviceSupervisor<A>,
    camera: DeviceSupervisor<C>,

    mode: ModeReader,
    vision: VisionConfig,
    settings: TrackerSettings,

    /// Fault counter of the input loop, if there is one.
    input_faults: Option<Arc<AtomicU64>>,
    last_input_faults: u64,

    /// Actuator handle the servos were last homed on.
    homed_handle: Option<u64>,

    /// A command was rejected, send a stop before anything else.
    pending_stop: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<A, C> Tracker<A, C>
where
    A: DeviceOpener,
    A::Handle: ActuatorPort,
    C: DeviceOpener,
    C::Handle: FrameSource
{
    pub fn new(
        actuator: DeviceSupervisor<A>,
        camera: DeviceSupervisor<C>,
        mode: ModeReader,
        vision: VisionConfig,
        settings: TrackerSettings
    ) -> Self {
        Self {
            actuator,
            camera,
            mode,
            vision,
            settings,
            input_faults: None,
            last_input_faults: 0,
            homed_handle: None,
            pending_stop: false,
        }
    }

    /// Watch the fault counter of the input loop.
    pub fn with_input_faults(mut self, counter: Arc<AtomicU64>) -> Self {
        self.last_input_faults = counter.load(Ordering::Relaxed);
        self.input_faults = Some(counter);
        self
    }

    /// Execute a single cycle.
    pub fn step(&mut self, ds: &mut DataStore, now: Instant) {

        // ---- DEVICE SUPERVISION ----

        self.step_supervisors(ds, now);
        self.check_input_faults(now);
        self.home_servos(now);

        // ---- PERCEPTION ----

        // Mode is read once so the whole cycle works on the same one
        let mode = self.mode.get();

        let observation = match self.capture(ds, now) {
            Some(frame) => match self.observe(&frame, &mode) {
                Ok(o) => {
                    ds.observation = Some(o.clone());
                    o
                },
                Err(e) => {
                    warn!("Skipping frame: {}", e);
                    TargetObservation::absent(0, 0)
                }
            },
            None => TargetObservation::absent(0, 0)
        };

        // ---- MOTION CONTROL ----

        let input = motion_ctrl::InputData {
            observation,
            speed_scale: mode.speed_scale
        };

        let mut cmd = match ds.motion_ctrl.proc(&input) {
            Ok((o, r)) => {
                ds.motion_ctrl_status_rpt = r;
                o
            },
            Err(e) => {
                warn!("Error during MotionCtrl processing: {}", e);
                WheelCommand::stop()
            }
        };

        if ds.safe {
            cmd = WheelCommand::stop();
        }
        ds.motion_ctrl_output = cmd;

        // ---- ACTUATION ----

        self.actuate(&cmd, now);

        // ---- WRITE ARCHIVES ----

        if self.settings.archive {
            if let Err(e) = ds.motion_ctrl.write() {
                warn!("Could not write MotionCtrl archives: {}", e);
            }
        }
    }

    /// Stop the wheels and close all devices.
    pub fn shutdown(&mut self, now: Instant) {
        if self.actuator.is_active() {
            self.send(&WheelCommand::stop(), now);
        }
        self.actuator.shutdown();
        self.camera.shutdown();
    }

    /// Returns true if either supervisor has given up on its device.
    pub fn is_exhausted(&self) -> bool {
        self.actuator.is_exhausted() || self.camera.is_exhausted()
    }

    pub fn actuator_state(&self) -> SupState {
        self.actuator.state()
    }

    pub fn camera_state(&self) -> SupState {
        self.camera.state()
    }

    fn step_supervisors(&mut self, ds: &mut DataStore, now: Instant) {
        if let Err(e) = self.actuator.step(now) {
            if !ds.safe {
                error!("{}", e);
            }
            ds.make_safe(SafeModeCause::DeviceExhausted);
        }

        match self.camera.step(now) {
            Ok(SupState::Active) => {
                ds.make_unsafe(SafeModeCause::CameraNotConnected).ok();
            },
            Ok(_) => ds.make_safe(SafeModeCause::CameraNotConnected),
            Err(e) => {
                if !ds.safe {
                    error!("{}", e);
                }
                ds.make_safe(SafeModeCause::DeviceExhausted);
            }
        }
    }

    fn check_input_faults(&mut self, now: Instant) {
        let faults = match self.input_faults {
            Some(ref c) => c.load(Ordering::Relaxed),
            None => return
        };

        if faults > self.last_input_faults {
            if self.settings.restart_actuator_on_input_fault {
                warn!("Input device faulted, restarting the actuator");
                self.actuator.restart(now);
            }
            self.last_input_faults = faults;
        }
    }

    /// Drive the servos to their home positions once per actuator handle.
    fn home_servos(&mut self, now: Instant) {
        let id = match self.actuator.handle_id() {
            Some(id) => id,
            None => return
        };
        if self.homed_handle == Some(id) || !self.actuator.is_active() {
            return
        }

        for s in &self.settings.servo_home {
            let (channel, position) = (s.channel, s.position);

            if let Err(e) = self.actuator.with_handle(now, |a| a.set_servo(channel, position)) {
                warn!("Could not home servo {}: {}", channel, e);
            }
        }

        info!("Servos homed on actuator handle {}", id);
        self.homed_handle = Some(id);
    }

    fn capture(&mut self, ds: &mut DataStore, now: Instant) -> Option<Frame> {
        match self.camera.with_handle(now, |c| c.next_frame()) {
            Ok(f) => {
                ds.num_consec_capture_errors = 0;
                Some(f)
            },
            Err(HandleError::Op(e)) => {
                ds.num_consec_capture_errors += 1;
                warn!("Could not capture a frame: {}", e);

                // Blind until the supervisor reopens the camera
                if e.is_fault() {
                    ds.make_safe(SafeModeCause::CameraNotConnected);
                }
                None
            },
            Err(HandleError::Supervisor(e)) => {
                trace!("{}", e);
                None
            }
        }
    }

    fn observe(&self, frame: &Frame, mode: &Mode) -> Result<TargetObservation, VisionError> {
        let hsv = vision::convert(frame, self.vision.target_width_px)?;

        vision::select(
            &hsv,
            mode,
            &self.vision.ranges,
            &self.vision.locator,
            self.vision.min_confidence
        )
    }

    fn actuate(&mut self, cmd: &WheelCommand, now: Instant) {
        if self.pending_stop {
            if !self.send(&WheelCommand::stop(), now) {
                return
            }
            self.pending_stop = false;

            if cmd.is_stop() {
                return
            }
        }

        self.send(cmd, now);
    }

    /// Send a wheel command, returning true if it was accepted.
    fn send(&mut self, cmd: &WheelCommand, now: Instant) -> bool {
        match self.actuator.with_handle(now, |a| a.set_wheel_speeds(cmd)) {
            Ok(()) => true,
            Err(HandleError::Op(e)) => {
                warn!("Actuator error: {}", e);
                if !e.is_fault() {
                    self.pending_stop = true;
                }
                false
            },
            Err(HandleError::Supervisor(e)) => {
                trace!("{}", e);
                false
            }
        }
    }
}

/// Locate every configured target in a single frame.
///
/// Returns the observation of each target range in name order.
pub fn analyse_frame(frame: &Frame, vision: &VisionConfig)
    -> Result<Vec<(String, TargetObservation)>, VisionError>
{
    let hsv = vision::convert(frame, vision.target_width_px)?;

    vision.ranges
        .iter()
        .map(|r| {
            vision::locate(&hsv, r, &vision.locator).map(|o| (r.name().to_string(), o))
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::dev_sup;
    use crate::mode::{mode_cell, ModeWriter};
    use crate::motion_ctrl::MotionCtrl;
    use crate::vision::Params as VisionParams;
    use eqpt_if::{
        cam::{CaptureError, ColorSpace},
        device::{DeviceHandle, OpenError},
        mech::ActuatorError
    };
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    const VISION_TOML: &str = r#"
        target_width_px = 160
        min_area_px = 20
        initial_mode = "idle"

        [ranges.green]
        min = [50, 100, 50]
        max = [70, 255, 255]

        [modes.green]
        targets = ["green"]
        button = 0
    "#;

    #[derive(Default)]
    struct ActLog {
        opens: u64,
        cmds: Vec<(u64, WheelCommand)>,
        servos: Vec<(u64, u8, f64)>,
        fail_next: Option<ActuatorError>,
    }

    struct MockActOpener(Rc<RefCell<ActLog>>);

    struct MockAct {
        serial: u64,
        log: Rc<RefCell<ActLog>>,
    }

    impl DeviceOpener for MockActOpener {
        type Handle = MockAct;

        fn name(&self) -> &str {
            "mock actuator"
        }

        fn open(&mut self) -> Result<Self::Handle, OpenError> {
            let mut log = self.0.borrow_mut();
            log.opens += 1;
            Ok(MockAct { serial: log.opens, log: self.0.clone() })
        }
    }

    impl DeviceHandle for MockAct {}

    impl ActuatorPort for MockAct {
        fn set_wheel_speeds(&mut self, cmd: &WheelCommand) -> Result<(), ActuatorError> {
            let mut log = self.log.borrow_mut();
            if let Some(e) = log.fail_next.take() {
                return Err(e)
            }
            log.cmds.push((self.serial, *cmd));
            Ok(())
        }

        fn set_servo(&mut self, channel: u8, value: f64) -> Result<(), ActuatorError> {
            self.log.borrow_mut().servos.push((self.serial, channel, value));
            Ok(())
        }
    }

    #[derive(Default)]
    struct CamLog {
        opens: u64,
        frame: Option<Frame>,
        fail_next: bool,
    }

    /// Camera producing whatever frame is currently set, or no frame.
    struct MockCamOpener(Rc<RefCell<CamLog>>);

    struct MockCam(Rc<RefCell<CamLog>>);

    impl DeviceOpener for MockCamOpener {
        type Handle = MockCam;

        fn name(&self) -> &str {
            "mock camera"
        }

        fn open(&mut self) -> Result<Self::Handle, OpenError> {
            self.0.borrow_mut().opens += 1;
            Ok(MockCam(self.0.clone()))
        }
    }

    impl DeviceHandle for MockCam {}

    impl FrameSource for MockCam {
        fn next_frame(&mut self) -> Result<Frame, CaptureError> {
            let mut log = self.0.borrow_mut();
            if log.fail_next {
                log.fail_next = false;
                return Err(CaptureError::Device(std::io::Error::new(
                    std::io::ErrorKind::Other, "VIDIOC_DQBUF failed"
                )))
            }
            log.frame.clone().ok_or(CaptureError::NoFrame)
        }
    }

    struct Rig {
        tracker: Tracker<MockActOpener, MockCamOpener>,
        ds: DataStore,
        act: Rc<RefCell<ActLog>>,
        cam: Rc<RefCell<CamLog>>,
        writer: ModeWriter,
        faults: Arc<AtomicU64>,
        vision: VisionConfig,
    }

    /// A green disc centred at `(cx, cy)` in a 320x240 RGB frame.
    fn disc_frame(cx: f64, cy: f64) -> Frame {
        Frame::from_fn(320, 240, ColorSpace::Rgb, |x, y| {
            let (dx, dy) = (x as f64 - cx, y as f64 - cy);
            if dx * dx + dy * dy <= 400.0 { [0, 200, 0] } else { [128, 128, 128] }
        })
    }

    fn rig(settings: TrackerSettings) -> Rig {
        let params: VisionParams = util::params::parse(VISION_TOML).unwrap();
        let vision = params.validate().unwrap();
        let (writer, reader) = mode_cell(vision.modes.initial());

        let act = Rc::new(RefCell::new(ActLog::default()));
        let cam = Rc::new(RefCell::new(CamLog {
            frame: Some(disc_frame(260.0, 120.0)),
            ..Default::default()
        }));
        let sup_params = dev_sup::Params { retry_backoff_s: 1.0, max_retries: None };
        let faults = Arc::new(AtomicU64::new(0));

        let tracker = Tracker::new(
            DeviceSupervisor::new(MockActOpener(act.clone()), sup_params),
            DeviceSupervisor::new(MockCamOpener(cam.clone()), sup_params),
            reader,
            vision.clone(),
            settings
        ).with_input_faults(faults.clone());

        let mc = MotionCtrl::new(motion_ctrl::Params::default()).unwrap();

        Rig {
            tracker,
            ds: DataStore::new(mc),
            act,
            cam,
            writer,
            faults,
            vision,
        }
    }

    fn green(rig: &Rig) -> Mode {
        rig.vision.modes.get("green").unwrap().clone()
    }

    fn last_cmd(rig: &Rig) -> WheelCommand {
        rig.act.borrow().cmds.last().unwrap().1
    }

    #[test]
    fn test_idle_mode_stops() {
        let mut r = rig(TrackerSettings::default());
        let t0 = Instant::now();

        r.tracker.step(&mut r.ds, t0);

        assert_eq!(r.tracker.actuator_state(), SupState::Active);
        assert!(r.ds.observation.as_ref().map_or(false, |o| !o.is_present()));
        assert!(last_cmd(&r).is_stop());
    }

    #[test]
    fn test_tracks_target_of_mode() {
        let mut r = rig(TrackerSettings::default());
        let t0 = Instant::now();

        r.writer.set(green(&r));
        r.tracker.step(&mut r.ds, t0);

        // Target right of centre at mid height strafes right
        let det = r.ds.observation.clone().unwrap().detection.unwrap();
        assert!((det.centroid_px.0 - 130.0).abs() < 1.0);
        let cmd = last_cmd(&r);
        assert!(cmd.front_left > 0.0 && cmd.front_right < 0.0);
        assert_eq!(cmd, r.ds.motion_ctrl_output);

        // Losing the frame stops the robot
        r.cam.borrow_mut().frame = None;
        r.tracker.step(&mut r.ds, t0 + Duration::from_millis(500));
        assert!(last_cmd(&r).is_stop());
        assert_eq!(r.ds.num_consec_capture_errors, 1);
    }

    #[test]
    fn test_rejected_command_sends_stop_first() {
        let mut r = rig(TrackerSettings::default());
        let t0 = Instant::now();
        r.writer.set(green(&r));

        r.act.borrow_mut().fail_next = Some(ActuatorError::Rejected("busy".into()));
        r.tracker.step(&mut r.ds, t0);
        assert!(r.act.borrow().cmds.is_empty());
        assert_eq!(r.tracker.actuator_state(), SupState::Active);

        r.tracker.step(&mut r.ds, t0 + Duration::from_millis(500));
        let cmds: Vec<WheelCommand> = r.act.borrow().cmds.iter().map(|c| c.1).collect();
        assert_eq!(cmds.len(), 2);
        assert!(cmds[0].is_stop());
        assert!(!cmds[1].is_stop());
    }

    #[test]
    fn test_actuator_fault_reconnects_and_rehomes() {
        let settings = TrackerSettings {
            servo_home: vec![ServoHome { channel: 8, position: 0.5 }],
            ..Default::default()
        };
        let mut r = rig(settings);
        let t0 = Instant::now();
        let at = |ms: u64| t0 + Duration::from_millis(ms);

        r.tracker.step(&mut r.ds, at(0));
        assert_eq!(r.act.borrow().servos, vec![(1, 8, 0.5)]);

        // Servos are homed once per handle
        r.tracker.step(&mut r.ds, at(500));
        assert_eq!(r.act.borrow().servos.len(), 1);

        r.act.borrow_mut().fail_next = Some(ActuatorError::Io("bus error".into()));
        r.tracker.step(&mut r.ds, at(1000));
        assert_eq!(r.tracker.actuator_state(), SupState::Faulted);

        // Closed on the next cycle, reopened after the backoff
        r.tracker.step(&mut r.ds, at(1500));
        assert_eq!(r.tracker.actuator_state(), SupState::Disconnected);
        r.tracker.step(&mut r.ds, at(2000));
        assert_eq!(r.tracker.actuator_state(), SupState::Active);

        assert_eq!(r.act.borrow().opens, 2);
        assert_eq!(r.act.borrow().servos, vec![(1, 8, 0.5), (2, 8, 0.5)]);
        assert_eq!(r.act.borrow().cmds.last().unwrap().0, 2);
    }

    #[test]
    fn test_camera_fault_stops_until_reconnected() {
        let mut r = rig(TrackerSettings::default());
        let t0 = Instant::now();
        let at = |ms: u64| t0 + Duration::from_millis(ms);
        r.writer.set(green(&r));

        r.tracker.step(&mut r.ds, at(0));
        assert!(!last_cmd(&r).is_stop());

        r.cam.borrow_mut().fail_next = true;
        r.tracker.step(&mut r.ds, at(500));
        assert_eq!(r.tracker.camera_state(), SupState::Faulted);
        assert_eq!(r.ds.safe_cause, Some(SafeModeCause::CameraNotConnected));
        assert!(last_cmd(&r).is_stop());

        // Torn down on the next cycle, still blind until the backoff has passed
        r.tracker.step(&mut r.ds, at(1000));
        assert_eq!(r.tracker.camera_state(), SupState::Disconnected);
        assert!(r.ds.safe);
        assert!(last_cmd(&r).is_stop());

        r.tracker.step(&mut r.ds, at(1500));
        assert_eq!(r.tracker.camera_state(), SupState::Active);
        assert!(!r.ds.safe);
        assert!(!last_cmd(&r).is_stop());
        assert_eq!(r.cam.borrow().opens, 2);

        // The actuator is unaffected
        assert_eq!(r.act.borrow().opens, 1);
    }

    #[test]
    fn test_input_fault_restart_policy() {
        let t0 = Instant::now();

        for restart in &[false, true] {
            let mut r = rig(TrackerSettings {
                restart_actuator_on_input_fault: *restart,
                ..Default::default()
            });

            r.tracker.step(&mut r.ds, t0);
            r.faults.fetch_add(1, Ordering::Relaxed);
            r.tracker.step(&mut r.ds, t0 + Duration::from_millis(500));

            let expected = if *restart { SupState::Faulted } else { SupState::Active };
            assert_eq!(r.tracker.actuator_state(), expected);
        }
    }

    #[test]
    fn test_safe_mode_without_camera() {
        let mut r = rig(TrackerSettings::default());
        r.ds.make_safe(SafeModeCause::CameraNotConnected);
        r.writer.set(green(&r));

        // Camera connects on the first step, clearing safe mode
        r.tracker.step(&mut r.ds, Instant::now());
        assert!(!r.ds.safe);
        assert_eq!(r.tracker.camera_state(), SupState::Active);
        assert!(!last_cmd(&r).is_stop());

        r.tracker.shutdown(Instant::now());
        assert!(last_cmd(&r).is_stop());
        assert_eq!(r.tracker.actuator_state(), SupState::Disconnected);
    }

    #[test]
    fn test_analyse_frame() {
        let r = rig(TrackerSettings::default());
        let results = analyse_frame(&disc_frame(60.0, 60.0), &r.vision).unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, "green");
        let det = results[0].1.detection.clone().unwrap();
        assert!((det.centroid_px.0 - 30.0).abs() < 1.0);
        assert!((det.centroid_px.1 - 30.0).abs() < 1.0);
    }
}
