//! [`FrameSource`] implementation for V4L2 cameras

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use chrono::Utc;
use eqpt_if::{
    cam::{CaptureError, ColorSpace, Frame, FrameSource},
    device::{DeviceHandle, DeviceOpener, OpenError}
};
use log::{debug, warn};
use std::io;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Pixel format requested from the driver, packed 8 bit RGB.
const FORMAT: &[u8] = b"RGB3";

/// Frame interval requested from the driver, as a fraction of a second.
const INTERVAL: (u32, u32) = (1, 10);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Opener for a camera device node.
///
/// Capture blocks in the driver, so the live tracker runs this opener through a
/// [`ThreadedOpener`](super::capture_thread::ThreadedOpener).
#[derive(Debug, Clone)]
pub struct RscamOpener {
    path: String,
    resolution: (u32, u32),
    name: String,
}

/// A streaming camera.
pub struct RscamCamera {
    camera: rscam::Camera,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl RscamOpener {
    pub fn new(path: &str, resolution: (u32, u32)) -> Self {
        Self {
            path: path.to_string(),
            resolution,
            name: format!("camera {}", path),
        }
    }
}

impl DeviceOpener for RscamOpener {
    type Handle = RscamCamera;

    fn name(&self) -> &str {
        &self.name
    }

    fn open(&mut self) -> Result<Self::Handle, OpenError> {
        let mut camera = rscam::Camera::new(&self.path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => OpenError::NotFound(self.path.clone()),
            _ => OpenError::Io(self.path.clone(), e)
        })?;

        camera.start(&rscam::Config {
            interval: INTERVAL,
            resolution: self.resolution,
            format: FORMAT,
            ..Default::default()
        }).map_err(|e| OpenError::InitFailed(self.path.clone(), e.to_string()))?;

        debug!("Camera {} streaming at {:?}", self.path, self.resolution);

        Ok(RscamCamera {
            camera
        })
    }
}

impl DeviceHandle for RscamCamera {
    fn close(&mut self) {
        if let Err(e) = self.camera.stop() {
            warn!("Could not stop the camera stream: {}", e);
        }
    }
}

impl FrameSource for RscamCamera {
    fn next_frame(&mut self) -> Result<Frame, CaptureError> {
        let raw = self.camera.capture().map_err(CaptureError::Device)?;
        let (width, height) = raw.resolution;

        Frame::new(width, height, ColorSpace::Rgb, raw.to_vec())
            .map(|f| f.with_timestamp(Utc::now()))
            .map_err(CaptureError::InvalidFrame)
    }
}
