//! Parameters structure for DevSup

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::params::ConfigError;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters shared by all device supervisors.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Params {
    /// Delay between a failed open, or a fault, and the next open attempt.
    ///
    /// Units: seconds
    #[serde(default = "default_retry_backoff_s")]
    pub retry_backoff_s: f64,

    /// Number of consecutive failed opens after which the supervisor gives up. Retries forever
    /// if not set.
    #[serde(default)]
    pub max_retries: Option<u32>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Params {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.retry_backoff_s.is_finite() && self.retry_backoff_s >= 0.0) {
            return Err(ConfigError::OutOfRange(
                "retry_backoff_s", 0.0, std::f64::INFINITY, self.retry_backoff_s
            ))
        }
        if self.max_retries == Some(0) {
            return Err(ConfigError::NotPositive("max_retries", 0.0))
        }

        Ok(())
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs_f64(self.retry_backoff_s)
    }
}

impl Default for Params {
    fn default() -> Self {
        Self {
            retry_backoff_s: default_retry_backoff_s(),
            max_retries: None,
        }
    }
}

fn default_retry_backoff_s() -> f64 {
    1.0
}
