//! # Camera Equipment Interface

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use chrono::{DateTime, Utc};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::device::{DeviceHandle, Fault};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Number of bytes used by each pixel of a frame.
pub const BYTES_PER_PIXEL: usize = 3;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A single captured image.
///
/// Pixels are stored row-major with three bytes per pixel, in the order given by the frame's
/// [`ColorSpace`]. Frames are never modified after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    width: u32,
    height: u32,
    space: ColorSpace,
    data: Vec<u8>,

    /// UTC timestamp at which the frame was acquired
    pub timestamp: DateTime<Utc>,
}

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A source of camera frames.
pub trait FrameSource: DeviceHandle {
    /// Acquire the next frame, blocking until it is available.
    fn next_frame(&mut self) -> Result<Frame, CaptureError>;
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Colour spaces a frame can be expressed in.
#[derive(Debug, Serialize, Deserialize, Copy, Clone, Hash, Eq, PartialEq)]
pub enum ColorSpace {
    /// Red, green, blue
    Rgb,

    /// Blue, green, red, as produced by many capture backends
    Bgr,

    /// Hue in [0, 180), saturation and value in [0, 255]
    Hsv,
}

/// Errors which can occur when building a frame.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum FrameError {
    #[error("Frame of {width}x{height} needs {expected} bytes but {actual} were given")]
    BadBufferLength {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize
    },
}

/// Errors which can occur while capturing a frame.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("The camera did not produce a frame")]
    NoFrame,

    #[error("The camera device failed: {0}")]
    Device(std::io::Error),

    #[error("Could not decode the captured frame: {0}")]
    Decode(image::ImageError),

    #[error("Captured frame is invalid: {0}")]
    InvalidFrame(FrameError),

    #[error("The camera has not produced a frame for {0:?}")]
    Stalled(std::time::Duration),

    #[error("The camera capture thread has stopped")]
    Disconnected,
}

/// Errors which can occur while loading a frame from a file.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Could not load image file: {0}")]
    Image(image::ImageError),
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Load a frame from a still image file.
pub fn load_frame<P: AsRef<Path>>(path: P) -> Result<Frame, LoadError> {
    let image = image::open(path).map_err(LoadError::Image)?;

    Ok(Frame::from_rgb_image(image.to_rgb8()))
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Frame {
    /// Create a new frame from raw data, checking that the buffer matches the dimensions.
    pub fn new(
        width: u32,
        height: u32,
        space: ColorSpace,
        data: Vec<u8>
    ) -> Result<Self, FrameError> {
        let expected = width as usize * height as usize * BYTES_PER_PIXEL;

        if data.len() != expected {
            return Err(FrameError::BadBufferLength {
                width,
                height,
                expected,
                actual: data.len()
            })
        }

        Ok(Self {
            width,
            height,
            space,
            data,
            timestamp: Utc::now()
        })
    }

    /// Create a frame by evaluating `f` at every pixel coordinate.
    pub fn from_fn<F>(width: u32, height: u32, space: ColorSpace, mut f: F) -> Self
    where
        F: FnMut(u32, u32) -> [u8; 3]
    {
        let mut data = Vec::with_capacity(width as usize * height as usize * BYTES_PER_PIXEL);

        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&f(x, y));
            }
        }

        Self {
            width,
            height,
            space,
            data,
            timestamp: Utc::now()
        }
    }

    /// Create a frame from an RGB image.
    pub fn from_rgb_image(image: RgbImage) -> Self {
        let (width, height) = image.dimensions();

        Self {
            width,
            height,
            space: ColorSpace::Rgb,
            data: image.into_raw(),
            timestamp: Utc::now()
        }
    }

    /// Build an `RgbImage` view of the raw data, if the frame is an RGB frame.
    pub fn to_rgb_image(&self) -> Option<RgbImage> {
        match self.space {
            ColorSpace::Rgb => RgbImage::from_raw(self.width, self.height, self.data.clone()),
            _ => None
        }
    }

    /// Replace the timestamp of the frame, used by sources which know when the frame was
    /// actually captured.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn space(&self) -> ColorSpace {
        self.space
    }

    /// Raw pixel data.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns true if the frame contains no pixels.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Get the pixel at the given coordinate, or `None` if out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None
        }

        let idx = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        Some([self.data[idx], self.data[idx + 1], self.data[idx + 2]])
    }

    /// Iterate over all pixels in row-major order.
    pub fn pixels(&self) -> impl Iterator<Item = &[u8]> {
        self.data.chunks_exact(BYTES_PER_PIXEL)
    }
}

impl Fault for CaptureError {
    fn is_fault(&self) -> bool {
        matches!(
            self,
            CaptureError::Device(_) | CaptureError::Stalled(_) | CaptureError::Disconnected
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_new_checks_buffer_length() {
        assert!(Frame::new(2, 2, ColorSpace::Rgb, vec![0; 12]).is_ok());
        assert_eq!(
            Frame::new(2, 2, ColorSpace::Rgb, vec![0; 11]),
            Err(FrameError::BadBufferLength {
                width: 2,
                height: 2,
                expected: 12,
                actual: 11
            })
        );

        // Empty frames are representable, consumers reject them
        let empty = Frame::new(0, 5, ColorSpace::Bgr, vec![]).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_pixel_access() {
        let frame = Frame::from_fn(3, 2, ColorSpace::Rgb, |x, y| [x as u8, y as u8, 7]);

        assert_eq!(frame.pixel(2, 1), Some([2, 1, 7]));
        assert_eq!(frame.pixel(3, 0), None);
        assert_eq!(frame.pixels().count(), 6);
    }

    #[test]
    fn test_rgb_image_conversion() {
        let frame = Frame::from_fn(4, 3, ColorSpace::Rgb, |x, _| [x as u8 * 10, 0, 0]);
        let image = frame.to_rgb_image().unwrap();

        assert_eq!(image.dimensions(), (4, 3));
        assert_eq!(Frame::from_rgb_image(image).data(), frame.data());

        let hsv = Frame::from_fn(1, 1, ColorSpace::Hsv, |_, _| [0, 0, 0]);
        assert!(hsv.to_rgb_image().is_none());
    }

    #[test]
    fn test_capture_fault_classification() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "dqbuf");

        assert!(CaptureError::Device(io).is_fault());
        assert!(CaptureError::Stalled(std::time::Duration::from_secs(2)).is_fault());
        assert!(CaptureError::Disconnected.is_fault());

        assert!(!CaptureError::NoFrame.is_fault());
        assert!(!CaptureError::InvalidFrame(FrameError::BadBufferLength {
            width: 1,
            height: 1,
            expected: 3,
            actual: 0
        }).is_fault());
    }
}
