//! Host platform (linux for example) utility functions

use std::env;
use std::path::PathBuf;

/// Environment variable pointing at the root of the software checkout.
pub const SW_ROOT_ENV_VAR: &str = "TIGERBOT_SW_ROOT";

/// Get the root directory of the software, from which the `params` and
/// `sessions` directories are resolved.
pub fn get_sw_root() -> Result<PathBuf, env::VarError> {
    env::var(SW_ROOT_ENV_VAR).map(PathBuf::from)
}

/// Retrieve uname information.
pub fn get_uname() -> std::io::Result<uname::Info> {
    uname::uname()
}

/// Short description of the host for the startup banner, e.g.
/// `tigerbot (Linux 5.10.17-v7+, armv7l)`.
pub fn get_host_info() -> std::io::Result<String> {
    let info = get_uname()?;

    Ok(format!("{} ({} {}, {})", info.nodename, info.sysname, info.release, info.machine))
}
