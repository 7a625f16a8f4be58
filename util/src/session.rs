//! Session management
//!
//! Every run of an executable is a session. Its log file and archives live in
//! `$TIGERBOT_SW_ROOT/<sessions_dir>/<exec_name>_<timestamp>/`, and the time
//! the session started is the epoch all log timestamps are measured from.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use chrono::{DateTime, Utc};
use conquer_once::OnceCell;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

// Internal imports
use crate::time;

// ---------------------------------------------------------------------------
// STATICS
// ---------------------------------------------------------------------------

static SESSION_EPOCH: OnceCell<DateTime<Utc>> = OnceCell::uninit();

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// chrono format of the timestamp in session directory names, see
/// https://docs.rs/chrono/0.4/chrono/format/strftime/index.html.
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Name of the archive directory inside a session.
const ARCH_DIR_NAME: &str = "arch";

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Paths of the current session.
#[derive(Clone, Debug)]
pub struct Session {
    /// The root directory for this session
    pub session_root: PathBuf,

    /// The root directory for this session's archives
    pub arch_root: PathBuf,

    /// The path to the session's log file
    pub log_file_path: PathBuf,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors associated with the session module.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("The software root environment variable (TIGERBOT_SW_ROOT) is not set")]
    SwRootNotSet,

    #[error("Cannot create the session directory {0:?}: {1}")]
    CannotCreateDir(PathBuf, std::io::Error),

    #[error(
        "Cannot initialise the session epoch, only one session may be started per \
         process (conquer_once error: {0})"
    )]
    CannotInitEpoch(conquer_once::TryInitError),

    #[error("Cannot get the epoch time, did you forget to initialise the session?")]
    CannotGetEpoch,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Session {
    /// Start the session of this process inside `sessions_dir` of the software root.
    ///
    /// Sets the session epoch, so this may only be called once.
    pub fn new(exec_name: &str, sessions_dir: &str) -> Result<Self, SessionError> {
        SESSION_EPOCH
            .try_init_once(Utc::now)
            .map_err(SessionError::CannotInitEpoch)?;

        let epoch = SESSION_EPOCH.get().ok_or(SessionError::CannotGetEpoch)?;

        let root = crate::host::get_sw_root().map_err(|_| SessionError::SwRootNotSet)?;

        Self::create_in(&root.join(sessions_dir), exec_name, epoch)
    }

    /// Create the directories of a session started at `start` inside `dir`.
    fn create_in(dir: &Path, exec_name: &str, start: &DateTime<Utc>)
        -> Result<Self, SessionError>
    {
        let session_root = dir.join(format!(
            "{}_{}", exec_name, start.format(TIMESTAMP_FORMAT)
        ));
        let arch_root = session_root.join(ARCH_DIR_NAME);

        // Creating the archive directory creates the session root too
        fs::create_dir_all(&arch_root)
            .map_err(|e| SessionError::CannotCreateDir(arch_root.clone(), e))?;

        Ok(Session {
            log_file_path: session_root.join(format!("{}.log", exec_name)),
            session_root,
            arch_root,
        })
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Get the number of seconds elapsed since the start of the session.
///
/// If the session has not been started yet `NAN` is returned, which keeps
/// log formatting usable from unit tests that never create a session.
pub fn get_elapsed_seconds() -> f64 {
    SESSION_EPOCH
        .get()
        .and_then(|e| time::duration_to_seconds(Utc::now() - *e))
        .unwrap_or(std::f64::NAN)
}

/// Return a reference to the session's epoch, if the session has started.
pub fn get_epoch() -> Option<&'static DateTime<Utc>> {
    SESSION_EPOCH.get()
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_session_layout() {
        let dir = std::env::temp_dir().join("tigerbot_session_test");
        let start = Utc.ymd(2021, 3, 4).and_hms(5, 6, 7);

        let session = Session::create_in(&dir, "tracker_exec", &start).unwrap();

        assert_eq!(session.session_root, dir.join("tracker_exec_20210304_050607"));
        assert_eq!(session.arch_root, session.session_root.join("arch"));
        assert_eq!(session.log_file_path, session.session_root.join("tracker_exec.log"));
        assert!(session.arch_root.is_dir());

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_elapsed_without_session() {
        // No test starts the global session
        assert!(get_epoch().is_none());
        assert!(get_elapsed_seconds().is_nan());
    }
}
