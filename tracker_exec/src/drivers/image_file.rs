//! [`FrameSource`] which replays a still image

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use chrono::Utc;
use eqpt_if::{
    cam::{self, CaptureError, Frame, FrameSource, LoadError},
    device::{DeviceHandle, DeviceOpener, OpenError}
};
use std::path::PathBuf;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Opener which loads a still image from disk.
#[derive(Debug, Clone)]
pub struct ImageFileOpener {
    path: PathBuf,
    name: String,
}

/// Frame source producing the same image on every capture, timestamped at capture.
#[derive(Debug, Clone)]
pub struct ImageFileSource {
    frame: Frame,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ImageFileOpener {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        let path = path.into();
        let name = format!("image {}", path.display());

        Self {
            path,
            name
        }
    }
}

impl DeviceOpener for ImageFileOpener {
    type Handle = ImageFileSource;

    fn name(&self) -> &str {
        &self.name
    }

    fn open(&mut self) -> Result<Self::Handle, OpenError> {
        if !self.path.exists() {
            return Err(OpenError::NotFound(self.path.display().to_string()))
        }

        let frame = cam::load_frame(&self.path).map_err(|e| match e {
            LoadError::Image(image::ImageError::IoError(io)) =>
                OpenError::Io(self.path.display().to_string(), io),
            e => OpenError::InitFailed(self.path.display().to_string(), e.to_string())
        })?;

        Ok(ImageFileSource::new(frame))
    }
}

impl ImageFileSource {
    pub fn new(frame: Frame) -> Self {
        Self {
            frame
        }
    }
}

impl DeviceHandle for ImageFileSource {}

impl FrameSource for ImageFileSource {
    fn next_frame(&mut self) -> Result<Frame, CaptureError> {
        Ok(self.frame.clone().with_timestamp(Utc::now()))
    }
}
