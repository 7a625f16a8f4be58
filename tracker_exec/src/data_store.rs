//! # Data Store

use eqpt_if::mech::WheelCommand;
use log::{info, warn};

use crate::{motion_ctrl, vision::TargetObservation};

// ---------------------------------------------------------------------------
// ENUMS
// ---------------------------------------------------------------------------

/// Gives the reason the tracker has been put into safe mode
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum SafeModeCause {
    /// The camera is not connected, so the tracker is blind.
    CameraNotConnected,

    /// A supervisor gave up on its device.
    DeviceExhausted,
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Global data store for the executable.
#[derive(Default)]
pub struct DataStore {
    // Cycle management
    /// Number of cycles already executed
    pub num_cycles: u128,

    /// Session elapsed time at the start of the cycle
    pub cycle_start_s: f64,

    // Safe mode variables
    /// Determines if the tracker is in safe mode, in which only stop commands are sent.
    pub safe: bool,

    /// Gives the reason for the tracker being in safe mode.
    pub safe_cause: Option<SafeModeCause>,

    // Vision
    /// Observation of the active target this cycle.
    pub observation: Option<TargetObservation>,

    // MotionCtrl
    pub motion_ctrl: motion_ctrl::MotionCtrl,
    pub motion_ctrl_output: WheelCommand,
    pub motion_ctrl_status_rpt: motion_ctrl::StatusReport,

    // Monitoring Counters
    /// Number of consecutive cycle overruns
    pub num_consec_cycle_overruns: u64,

    /// Number of consecutive cycles without a frame
    pub num_consec_capture_errors: u64,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl DataStore {
    /// Create a new store around an initialised MotionCtrl.
    pub fn new(motion_ctrl: motion_ctrl::MotionCtrl) -> Self {
        Self {
            motion_ctrl,
            ..Default::default()
        }
    }

    /// Puts the tracker into safe mode with the given cause.
    pub fn make_safe(&mut self, cause: SafeModeCause) {
        if !self.safe {
            warn!("Make safe requested, cause: {:?}", cause);
            self.safe = true;
            self.safe_cause = Some(cause);
        }
    }

    /// Attempts to disable the safe mode by clearing the given cause.
    ///
    /// Returns `Ok(())` if this cause was cleared and safe mode was disabled, or `Err(())`
    /// otherwise. To remove safe mode the provided cause must match the initial reason for safe
    /// mode being enabled.
    ///
    /// If safe mode was not enabled `Ok(())` is returned
    pub fn make_unsafe(&mut self, cause: SafeModeCause) -> Result<(), ()> {
        if !self.safe {
            return Ok(());
        }

        match self.safe_cause {
            Some(root_cause) => {
                if cause == root_cause {
                    self.safe = false;
                    self.safe_cause = None;
                    info!("Make unsafe requested, root cause match, safe mode disabled");
                    Ok(())
                } else {
                    Err(())
                }
            }
            None => Ok(()),
        }
    }

    /// Perform actions required at the start of a cycle.
    ///
    /// Clears those items that need clearing at the start of a cycle.
    pub fn cycle_start(&mut self) {
        self.observation = None;
        self.motion_ctrl_output = WheelCommand::stop();
        self.motion_ctrl_status_rpt = motion_ctrl::StatusReport::default();

        self.cycle_start_s = util::session::get_elapsed_seconds();
    }

    /// Perform actions required at the end of a cycle.
    pub fn cycle_end(&mut self) {
        self.num_cycles += 1;
    }
}
