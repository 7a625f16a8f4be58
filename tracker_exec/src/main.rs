//! Main tracker executable entry point.
//!
//! # Architecture
//!
//! The executable runs in one of three modes:
//!
//!     - `camera`: live tracking. The input device is read on a background thread which selects
//!       the tracking mode, while the main loop runs at a fixed cadence:
//!         - Device supervision (actuator and camera)
//!         - Frame capture and conversion
//!         - Target location for the current mode
//!         - Motion control processing
//!         - Actuation
//!     - `motor-test`: drives each wheel in turn to check the wiring.
//!     - `<image path>`: locates every configured target in a still image and reports the results.
//!
//! # Modules
//!
//! All cyclic modules (e.g. `motion_ctrl`) shall meet the following requirements:
//!     1. Provide a public struct implementing the `util::module::State` trait.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{Report, eyre::{WrapErr, eyre}};
use eqpt_if::{
    cam::FrameSource,
    device::DeviceOpener,
    mech::ActuatorPort
};
use log::{info, warn, error};
use std::path::Path;
use std::thread;
use std::time::Instant;
use structopt::StructOpt;

// Internal
use tracker_lib::{
    data_store::{DataStore, SafeModeCause},
    dev_sup::{self, DeviceSupervisor},
    drivers::{capture_thread::ThreadedOpener, joystick::JoystickOpener},
    input_loop::{Dispatcher, InputLoop, InputLoopParams},
    mode::mode_cell,
    motion_ctrl,
    motor_test,
    params::TrackerExecParams,
    tracker::{self, Tracker, TrackerSettings},
    vision::{self, VisionConfig}
};
use util::{
    host,
    module::State,
    logger::{logger_init, LevelFilter},
    session::Session
};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

/// Colour target tracker
#[derive(Debug, StructOpt)]
#[structopt(name = "tracker_exec")]
struct Opt {
    /// `camera` to track targets with the live camera, `motor-test` to run the motor self test,
    /// or the path to an image to analyse
    run: String,

    /// Wheel speed used by the motor test
    #[structopt(long, default_value = "0.2")]
    speed: f64,

    /// Number of motor test passes, runs until interrupted if not given
    #[structopt(long)]
    repeats: Option<u32>,

    /// Log at trace level
    #[structopt(short, long)]
    verbose: bool,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    let opt = Opt::from_args();

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new(
        "tracker_exec",
        "sessions"
    ).wrap_err("Failed to create the session")?;

    // Initialise logger
    let level = if opt.verbose { LevelFilter::Trace } else { LevelFilter::Debug };
    logger_init(level, &session)
        .wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Tigerbot Tracker Executable\n");
    info!(
        "Running on: {}",
        host::get_host_info().wrap_err("Failed to get host information")?
    );
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let exec_params: TrackerExecParams = util::params::load("tracker_exec.toml")
        .wrap_err("Could not load exec params")?;
    exec_params.validate().wrap_err("Invalid exec params")?;

    let vision_params: vision::Params = util::params::load("vision.toml")
        .wrap_err("Could not load vision params")?;
    let vision = vision_params.validate().wrap_err("Invalid vision params")?;

    let sup_params: dev_sup::Params = util::params::load("dev_sup.toml")
        .wrap_err("Could not load device supervision params")?;
    sup_params.validate().wrap_err("Invalid device supervision params")?;

    info!("Exec parameters loaded");

    // ---- RUN ----

    match opt.run.as_str() {
        "camera" => run_tracker(&session, &exec_params, vision, sup_params),
        "motor-test" => {
            let mut sup = DeviceSupervisor::new(actuator_opener(&exec_params), sup_params);

            info!("Running motor test at speed {}", opt.speed);
            let passes = motor_test::run_motor_test(
                &mut sup,
                opt.speed,
                opt.repeats,
                thread::sleep
            ).wrap_err("Motor test stopped")?;
            sup.shutdown();

            info!("Motor test complete after {} passes", passes);
            Ok(())
        },
        path => analyse_image(Path::new(path), &vision)
    }
}

/// Run the live tracking loop.
fn run_tracker(
    session: &Session,
    exec_params: &TrackerExecParams,
    vision: VisionConfig,
    sup_params: dev_sup::Params
) -> Result<(), Report> {

    // ---- INITIALISE DATASTORE ----

    info!("Initialising modules...");

    let mut ds = DataStore::default();

    // ---- INITIALISE MODULES ----

    ds.motion_ctrl.init(
        motion_ctrl::InitData {
            params_file: "motion_ctrl.toml",
            archive: exec_params.archive
        },
        session
    ).wrap_err("Failed to initialise MotionCtrl")?;
    info!("MotionCtrl init complete");

    // Blind until the camera connects
    ds.make_safe(SafeModeCause::CameraNotConnected);

    info!("Module initialisation complete\n");

    // ---- INITIALISE DEVICES ----

    let (mode_writer, mode_reader) = mode_cell(vision.modes.initial());
    info!("Initial mode: \"{}\"", vision.modes.initial().name);

    let input_loop = InputLoop::spawn(
        JoystickOpener::new(&exec_params.joystick_device),
        Dispatcher::new(vision.modes.clone(), exec_params.stop_button, mode_writer),
        InputLoopParams {
            sup: sup_params,
            read_timeout: exec_params.read_timeout()
        }
    ).wrap_err("Failed to start the input loop")?;
    info!("Input loop started");

    let mut tracker = Tracker::new(
        DeviceSupervisor::new(actuator_opener(exec_params), sup_params),
        DeviceSupervisor::new(camera_opener(exec_params), sup_params),
        mode_reader,
        vision,
        TrackerSettings {
            servo_home: exec_params.servo_home.clone(),
            restart_actuator_on_input_fault: exec_params.restart_actuator_on_input_fault,
            archive: exec_params.archive
        }
    ).with_input_faults(input_loop.fault_counter());

    info!("Device initialisation complete");

    // ---- MAIN LOOP ----

    info!("Begining main loop\n");

    let cycle_period = exec_params.cycle_period();
    let mut input_running = true;

    loop {

        // Get cycle start time
        let cycle_start_instant = Instant::now();

        // Clear items that need wiping at the start of the cycle
        ds.cycle_start();

        // ---- TRACKER PROCESSING ----

        tracker.step(&mut ds, cycle_start_instant);

        // Nothing will reconnect a device whose supervisor has given up
        if tracker.is_exhausted() {
            error!("A device supervisor has given up, stopping");
            break
        }

        if input_running && !input_loop.is_running() {
            warn!("Input loop is no longer running, the mode can't be changed");
            input_running = false;
        }

        // ---- CYCLE MANAGEMENT ----

        let cycle_dur = Instant::now() - cycle_start_instant;

        // Get sleep duration
        match cycle_period.checked_sub(cycle_dur) {
            Some(d) => {
                ds.num_consec_cycle_overruns = 0;
                thread::sleep(d);
            },
            None => {
                warn!(
                    "Cycle overran by {:.06} s",
                    cycle_dur.as_secs_f64() - cycle_period.as_secs_f64()
                );
                ds.num_consec_cycle_overruns += 1;
            }
        }

        ds.cycle_end();
    }

    // ---- SHUTDOWN ----

    tracker.shutdown(Instant::now());
    drop(input_loop);

    info!("End of execution after {} cycles", ds.num_cycles);

    Err(eyre!("Tracking stopped, a device could not be reopened"))
}

/// Locate every configured target in a still image and log the results.
fn analyse_image(path: &Path, vision: &VisionConfig) -> Result<(), Report> {
    info!("Analysing image {:?}", path);

    let frame = eqpt_if::cam::load_frame(path)
        .wrap_err_with(|| format!("Could not load image {:?}", path))?;

    info!("Image is {}x{}", frame.width(), frame.height());

    let results = tracker::analyse_frame(&frame, vision)
        .wrap_err("Could not analyse the image")?;

    for (name, obs) in results {
        match obs.detection {
            Some(det) => info!(
                "{}: found at ({:.1}, {:.1}) in a {}x{} frame, area {} px, radius {:.1} px, \
                 confidence {:.3}",
                name,
                det.centroid_px.0,
                det.centroid_px.1,
                obs.frame_width,
                obs.frame_height,
                det.area_px,
                det.radius_px,
                det.confidence
            ),
            None => info!("{}: not found", name)
        }
    }

    Ok(())
}

/// Opener for the wheel actuator.
///
/// On the robot this is the PCA9685 on the Pi's I2C bus, elsewhere commands are discarded.
#[cfg(target_arch = "arm")]
fn actuator_opener(params: &TrackerExecParams) -> impl DeviceOpener<Handle = impl ActuatorPort> {
    use eqpt_if::device::OpenError;
    use pwm_pca9685::{Address, Pca9685};
    use rppal::i2c::I2c;
    use tracker_lib::drivers::pca9685::{Pca9685Config, Pca9685Opener};

    let address = params.pca9685_address;

    let connect = move || {
        let i2c = I2c::new()
            .map_err(|e| OpenError::InitFailed("I2C bus".into(), e.to_string()))?;

        Pca9685::new(i2c, Address::from(address))
            .map_err(|e| OpenError::InitFailed("PCA9685".into(), format!("{:?}", e)))
    };

    Pca9685Opener::new(connect, Pca9685Config::from(params))
}

/// Opener for the wheel actuator.
///
/// On the robot this is the PCA9685 on the Pi's I2C bus, elsewhere commands are discarded.
#[cfg(not(target_arch = "arm"))]
fn actuator_opener(_params: &TrackerExecParams) -> impl DeviceOpener<Handle = impl ActuatorPort> {
    warn!("No motor controller on this platform, wheel commands will be discarded");
    tracker_lib::drivers::null::NullActuatorOpener
}

/// Opener for the camera, read on a capture thread.
#[cfg(feature = "cam")]
fn camera_opener(params: &TrackerExecParams) -> impl DeviceOpener<Handle = impl FrameSource> {
    ThreadedOpener::new(
        tracker_lib::drivers::camera::RscamOpener::new(
            &params.camera_device,
            params.camera_resolution
        ),
        params.capture_timeouts()
    )
}

/// Opener for the camera, read on a capture thread.
///
/// Without camera support `camera_device` is read as a still image.
#[cfg(not(feature = "cam"))]
fn camera_opener(params: &TrackerExecParams) -> impl DeviceOpener<Handle = impl FrameSource> {
    warn!("Built without camera support, reading frames from {}", params.camera_device);
    ThreadedOpener::new(
        tracker_lib::drivers::image_file::ImageFileOpener::new(&params.camera_device),
        params.capture_timeouts()
    )
}
