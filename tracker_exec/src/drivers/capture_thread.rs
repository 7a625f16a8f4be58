//! [`FrameSource`] which captures on a background thread
//!
//! Camera reads block in the driver with no time limit. [`ThreadedOpener`] wraps another camera
//! opener so that the camera is opened and read on its own thread, and frames are handed to the
//! control loop over a channel. A read which takes longer than the frame timeout reports
//! `NoFrame`, and once no frame has arrived for the watchdog interval the camera is reported as
//! stalled, which faults the handle.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use eqpt_if::{
    cam::{CaptureError, Frame, FrameSource},
    device::{DeviceHandle, DeviceOpener, Fault, OpenError}
};
use log::{debug, warn};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::thread;
use std::time::{Duration, Instant};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Time limits of a threaded camera.
#[derive(Debug, Clone, Copy)]
pub struct CaptureTimeouts {
    /// Longest wait for one frame before `NoFrame` is returned.
    pub frame: Duration,

    /// Longest time without any frame before the camera is considered stalled. Also bounds the
    /// wait for the camera to open.
    pub watchdog: Duration,
}

/// Opener running another opener's frame source on a capture thread.
pub struct ThreadedOpener<O> {
    inner: O,
    timeouts: CaptureTimeouts,
}

/// Handle to a frame source running on a capture thread.
pub struct ThreadedFrameSource {
    rx: Option<Receiver<Result<Frame, CaptureError>>>,
    timeouts: CaptureTimeouts,
    last_frame: Instant,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<O> ThreadedOpener<O> {
    pub fn new(inner: O, timeouts: CaptureTimeouts) -> Self {
        Self {
            inner,
            timeouts
        }
    }
}

impl<O> DeviceOpener for ThreadedOpener<O>
where
    O: DeviceOpener + Clone + Send + 'static,
    O::Handle: FrameSource
{
    type Handle = ThreadedFrameSource;

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn open(&mut self) -> Result<Self::Handle, OpenError> {
        let mut opener = self.inner.clone();
        let (open_tx, open_rx) = mpsc::channel();
        let (frame_tx, frame_rx) = mpsc::sync_channel(1);

        thread::Builder::new()
            .name("capture".into())
            .spawn(move || {
                let source = match opener.open() {
                    Ok(s) => s,
                    Err(e) => {
                        open_tx.send(Err(e)).ok();
                        return
                    }
                };

                if open_tx.send(Ok(())).is_ok() {
                    capture_thread(source, frame_tx);
                }
                else {
                    // Nobody waited for the open to finish
                    let mut source = source;
                    source.close();
                }
            })
            .map_err(|e| OpenError::Io(self.inner.name().to_string(), e))?;

        match open_rx.recv_timeout(self.timeouts.watchdog) {
            Ok(Ok(())) => Ok(ThreadedFrameSource {
                rx: Some(frame_rx),
                timeouts: self.timeouts,
                last_frame: Instant::now()
            }),
            Ok(Err(e)) => Err(e),
            Err(RecvTimeoutError::Timeout) => Err(OpenError::Timeout(
                self.inner.name().to_string(), self.timeouts.watchdog
            )),
            Err(RecvTimeoutError::Disconnected) => Err(OpenError::InitFailed(
                self.inner.name().to_string(), "capture thread exited while opening".into()
            ))
        }
    }
}

impl DeviceHandle for ThreadedFrameSource {
    fn close(&mut self) {
        // The capture thread stops once its next frame can't be delivered
        self.rx = None;
    }
}

impl FrameSource for ThreadedFrameSource {
    fn next_frame(&mut self) -> Result<Frame, CaptureError> {
        let rx = self.rx.as_ref().ok_or(CaptureError::Disconnected)?;

        match rx.recv_timeout(self.timeouts.frame) {
            Ok(Ok(frame)) => {
                self.last_frame = Instant::now();
                Ok(frame)
            },
            Ok(Err(e)) => Err(e),
            Err(RecvTimeoutError::Timeout) => {
                let since = self.last_frame.elapsed();

                if since >= self.timeouts.watchdog {
                    Err(CaptureError::Stalled(since))
                }
                else {
                    Err(CaptureError::NoFrame)
                }
            },
            Err(RecvTimeoutError::Disconnected) => Err(CaptureError::Disconnected)
        }
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Capture frames until the handle is closed or the source faults.
fn capture_thread<S: FrameSource>(mut source: S, tx: SyncSender<Result<Frame, CaptureError>>) {
    debug!("Capture thread started");

    loop {
        let result = source.next_frame();
        let fault = match result {
            Err(ref e) if e.is_fault() => {
                warn!("Capture failed, stopping the capture thread: {}", e);
                true
            },
            _ => false
        };

        if tx.send(result).is_err() || fault {
            break
        }
    }

    source.close();
    debug!("Capture thread stopped");
}
