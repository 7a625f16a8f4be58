//! Background thread running the input device supervisor

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use eqpt_if::{device::DeviceOpener, input::InputDevice};
use log::{debug, error, info, warn};
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc
};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::Dispatcher;
use crate::dev_sup::{self, DeviceSupervisor, HandleError};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Handle on the running input event loop.
///
/// Dropping the handle stops the thread and waits for it to exit.
pub struct InputLoop {
    bg_jh: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    faults: Arc<AtomicU64>,
}

/// Settings of the input event loop.
#[derive(Debug, Clone, Copy)]
pub struct InputLoopParams {
    /// Supervisor parameters of the input device.
    pub sup: dev_sup::Params,

    /// Longest time a single read may block for.
    pub read_timeout: Duration,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl InputLoop {
    /// Start the input event loop on a new thread.
    ///
    /// The thread owns the supervisor of the device opened by `opener` and the dispatcher, and
    /// runs until [`InputLoop::stop`] is called or the supervisor gives up on the device.
    pub fn spawn<O>(
        opener: O,
        dispatcher: Dispatcher,
        params: InputLoopParams
    ) -> std::io::Result<Self>
    where
        O: DeviceOpener + Send + 'static,
        O::Handle: InputDevice,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let running = Arc::new(AtomicBool::new(true));
        let faults = Arc::new(AtomicU64::new(0));

        // Create clones of these to pass to the bg thread
        let stop_clone = stop.clone();
        let running_clone = running.clone();
        let faults_clone = faults.clone();

        let bg_jh = thread::Builder::new()
            .name("input_loop".into())
            .spawn(move || {
                bg_thread(
                    DeviceSupervisor::new(opener, params.sup),
                    dispatcher,
                    params.read_timeout,
                    stop_clone,
                    faults_clone
                );
                running_clone.store(false, Ordering::Relaxed);
            })?;

        Ok(Self {
            bg_jh: Some(bg_jh),
            stop,
            running,
            faults
        })
    }

    /// Number of input device faults since the loop started.
    pub fn num_faults(&self) -> u64 {
        self.faults.load(Ordering::Relaxed)
    }

    /// Shared counter of input device faults.
    pub fn fault_counter(&self) -> Arc<AtomicU64> {
        self.faults.clone()
    }

    /// Returns true if the thread is still running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Stop the thread and wait for it to exit.
    ///
    /// The thread checks the stop flag after every read, so this returns within one read timeout.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);

        if let Some(jh) = self.bg_jh.take() {
            if jh.join().is_err() {
                error!("Input loop thread panicked");
            }
        }
    }
}

impl Drop for InputLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Background thread, reads events and dispatches them until told to stop.
fn bg_thread<O>(
    mut sup: DeviceSupervisor<O>,
    mut dispatcher: Dispatcher,
    read_timeout: Duration,
    stop: Arc<AtomicBool>,
    faults: Arc<AtomicU64>,
)
where
    O: DeviceOpener,
    O::Handle: InputDevice,
{
    info!("Input loop started");

    while !stop.load(Ordering::Relaxed) {
        let now = Instant::now();

        match sup.step(now) {
            Ok(_) => (),
            Err(e) => {
                error!("Input loop stopping: {}", e);
                break
            }
        }

        // Nothing to read from, wait before stepping again
        if !sup.is_active() {
            thread::sleep(read_timeout);
            continue
        }

        match sup.with_handle(now, |h| h.read_event(read_timeout)) {
            Ok(Some(event)) => {
                dispatcher.dispatch(&event);
            },
            Ok(None) => (),
            Err(HandleError::Op(e)) => {
                if sup.is_active() {
                    warn!("Discarding input event: {}", e);
                }
                else {
                    faults.fetch_add(1, Ordering::Relaxed);
                }
            },
            Err(HandleError::Supervisor(e)) => debug!("{}", e),
        }
    }

    sup.shutdown();

    info!("Input loop stopped");
}
