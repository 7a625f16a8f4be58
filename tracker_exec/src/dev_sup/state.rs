//! Implementations for the DeviceSupervisor state machine

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use eqpt_if::device::{DeviceHandle, DeviceOpener, Fault};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::time::Instant;

// Internal
use super::{HandleError, Params, SupervisorError};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// State of a supervised device connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SupState {
    /// No handle, waiting for the backoff deadline before the next open.
    Disconnected,

    /// An open attempt is in progress.
    Connecting,

    /// A handle is published and operations can be run on it.
    Active,

    /// An operation reported a fault, the handle will be closed on the next step.
    Faulted,
}

/// Supervisor of a single device.
pub struct DeviceSupervisor<O: DeviceOpener> {
    opener: O,
    params: Params,

    state: SupState,
    handle: Option<O::Handle>,

    /// Id of the published handle, 0 if there is none.
    handle_id: u64,
    num_published: u64,

    /// Earliest time of the next open attempt, `None` for immediately.
    next_attempt: Option<Instant>,
    consec_failures: u32,
    exhausted: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<O: DeviceOpener> DeviceSupervisor<O> {

    /// Create a new supervisor, the first open is attempted on the first step.
    pub fn new(opener: O, params: Params) -> Self {
        Self {
            opener,
            params,
            state: SupState::Disconnected,
            handle: None,
            handle_id: 0,
            num_published: 0,
            next_attempt: None,
            consec_failures: 0,
            exhausted: false,
        }
    }

    /// Advance the state machine.
    ///
    /// A faulted handle is closed and dropped. A disconnected supervisor whose backoff deadline
    /// has passed makes a single open attempt. Once `max_retries` consecutive opens have failed
    /// every step returns `RetriesExhausted`.
    pub fn step(&mut self, now: Instant) -> Result<SupState, SupervisorError> {
        if self.exhausted {
            return Err(self.exhausted_error())
        }

        if self.state == SupState::Faulted {
            self.close_handle();
            self.state = SupState::Disconnected;
            debug!("{} disconnected", self.opener.name());
        }

        if self.state == SupState::Disconnected {
            let due = match self.next_attempt {
                Some(t) => now >= t,
                None => true
            };

            if due {
                self.connect(now)?;
            }
        }

        Ok(self.state)
    }

    /// Run an operation on the published handle.
    ///
    /// The handle is only lent for the duration of `op`. If the operation fails with an error
    /// classified as a fault the supervisor moves to `Faulted` and the next open is scheduled
    /// one backoff after `now`.
    pub fn with_handle<T, E, F>(&mut self, now: Instant, op: F) -> Result<T, HandleError<E>>
    where
        F: FnOnce(&mut O::Handle) -> Result<T, E>,
        E: Fault + std::error::Error + 'static
    {
        let handle = match (self.state, self.handle.as_mut()) {
            (SupState::Active, Some(h)) => h,
            _ => return Err(SupervisorError::NotConnected(self.opener.name().to_string()).into())
        };

        match op(handle) {
            Ok(v) => Ok(v),
            Err(e) => {
                if e.is_fault() {
                    warn!("{} faulted: {}", self.opener.name(), e);
                    self.fault(now);
                }
                Err(HandleError::Op(e))
            }
        }
    }

    /// Force an active supervisor to tear down and reopen its connection.
    ///
    /// Has no effect if the supervisor is not active.
    pub fn restart(&mut self, now: Instant) {
        if self.state == SupState::Active {
            warn!("Restart of {} requested", self.opener.name());
            self.fault(now);
        }
    }

    /// Close any open handle, for use at shutdown.
    pub fn shutdown(&mut self) {
        self.close_handle();
        self.state = SupState::Disconnected;
    }

    pub fn state(&self) -> SupState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SupState::Active
    }

    /// Returns true once the supervisor has given up on the device.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Id of the currently published handle. Ids are never reused.
    pub fn handle_id(&self) -> Option<u64> {
        match self.handle {
            Some(_) => Some(self.handle_id),
            None => None
        }
    }

    /// Total number of handles published since creation.
    pub fn num_published(&self) -> u64 {
        self.num_published
    }

    pub fn name(&self) -> &str {
        self.opener.name()
    }

    fn connect(&mut self, now: Instant) -> Result<(), SupervisorError> {
        self.state = SupState::Connecting;

        match self.opener.open() {
            Ok(h) => {
                self.num_published += 1;
                self.handle_id = self.num_published;
                self.handle = Some(h);
                self.consec_failures = 0;
                self.next_attempt = None;
                self.state = SupState::Active;

                info!("{} connected (handle {})", self.opener.name(), self.handle_id);
                Ok(())
            },
            Err(e) => {
                self.consec_failures += 1;
                self.state = SupState::Disconnected;
                self.next_attempt = Some(now + self.params.retry_backoff());

                if let Some(max) = self.params.max_retries {
                    if self.consec_failures >= max {
                        error!(
                            "Could not open {} after {} attempts, giving up: {}",
                            self.opener.name(), self.consec_failures, e
                        );
                        self.exhausted = true;
                        return Err(self.exhausted_error())
                    }
                }

                warn!(
                    "Could not open {} (attempt {}), retrying in {} s: {}",
                    self.opener.name(), self.consec_failures, self.params.retry_backoff_s, e
                );
                Ok(())
            }
        }
    }

    fn fault(&mut self, now: Instant) {
        self.state = SupState::Faulted;
        self.next_attempt = Some(now + self.params.retry_backoff());
    }

    fn close_handle(&mut self) {
        if let Some(mut h) = self.handle.take() {
            h.close();
            debug!("{} handle {} closed", self.opener.name(), self.handle_id);
        }
    }

    fn exhausted_error(&self) -> SupervisorError {
        SupervisorError::RetriesExhausted {
            device: self.opener.name().to_string(),
            attempts: self.consec_failures
        }
    }
}

impl<O: DeviceOpener> Drop for DeviceSupervisor<O> {
    fn drop(&mut self) {
        self.close_handle();
    }
}
