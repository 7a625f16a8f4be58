//! Frame conversion into the working resolution and colour space

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use eqpt_if::cam::{ColorSpace, Frame, BYTES_PER_PIXEL};
use image::{imageops::{self, FilterType}, RgbImage};
use log::trace;

use super::VisionError;

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Scale `frame` so that its width is `target_width` and convert it into HSV.
///
/// The aspect ratio is preserved, the height is rounded to the nearest pixel. A frame which is
/// already HSV at the target width is returned as is, so converting twice changes nothing.
pub fn convert(frame: &Frame, target_width: u32) -> Result<Frame, VisionError> {
    if frame.is_empty() {
        return Err(VisionError::InvalidFrame(format!(
            "frame has no pixels ({}x{})", frame.width(), frame.height()
        )))
    }
    if target_width == 0 {
        return Err(VisionError::InvalidTargetWidth)
    }

    if frame.space() == ColorSpace::Hsv && frame.width() == target_width {
        return Ok(frame.clone())
    }

    let target_height = scaled_height(frame.width(), frame.height(), target_width);

    trace!(
        "Converting {:?} frame {}x{} to HSV {}x{}",
        frame.space(), frame.width(), frame.height(), target_width, target_height
    );

    // Channel order as an image buffer, swapping BGR so all data goes through the same resize.
    let mut data = frame.data().to_vec();
    if frame.space() == ColorSpace::Bgr {
        for px in data.chunks_exact_mut(BYTES_PER_PIXEL) {
            px.swap(0, 2);
        }
    }

    let buffer = RgbImage::from_raw(frame.width(), frame.height(), data)
        .ok_or_else(|| VisionError::InvalidFrame("buffer does not match dimensions".into()))?;

    let scaled = if frame.width() == target_width {
        buffer
    }
    else {
        // Hue is interpolated linearly when scaling HSV frames, which blurs the red wrap around
        // at blob edges only.
        imageops::resize(&buffer, target_width, target_height, FilterType::Triangle)
    };

    let mut data = scaled.into_raw();
    if frame.space() != ColorSpace::Hsv {
        for px in data.chunks_exact_mut(BYTES_PER_PIXEL) {
            let hsv = rgb_to_hsv(px[0], px[1], px[2]);
            px.copy_from_slice(&hsv);
        }
    }

    Frame::new(target_width, target_height, ColorSpace::Hsv, data)
        .map(|f| f.with_timestamp(frame.timestamp))
        .map_err(VisionError::FrameError)
}

/// Convert an 8 bit RGB pixel into HSV, with hue in [0, 180) and saturation and value in
/// [0, 255].
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> [u8; 3] {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let diff = (max - min) as f32;

    let v = max;
    let s = if max == 0 {
        0
    }
    else {
        (diff * 255.0 / max as f32).round() as u8
    };

    if diff == 0.0 {
        return [0, s, v]
    }

    let (r, g, b) = (r as f32, g as f32, b as f32);
    let mut h = if max as f32 == r {
        60.0 * (g - b) / diff
    }
    else if max as f32 == g {
        120.0 + 60.0 * (b - r) / diff
    }
    else {
        240.0 + 60.0 * (r - g) / diff
    };
    if h < 0.0 {
        h += 360.0;
    }

    let h = (h / 2.0).round() as u32 % 180;

    [h as u8, s, v]
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn scaled_height(width: u32, height: u32, target_width: u32) -> u32 {
    let h = (height as u64 * target_width as u64 + width as u64 / 2) / width as u64;
    h.max(1) as u32
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_rgb_to_hsv() {
        assert_eq!(rgb_to_hsv(255, 0, 0), [0, 255, 255]);
        assert_eq!(rgb_to_hsv(0, 200, 0), [60, 255, 200]);
        assert_eq!(rgb_to_hsv(0, 0, 255), [120, 255, 255]);
        assert_eq!(rgb_to_hsv(255, 255, 0), [30, 255, 255]);
        assert_eq!(rgb_to_hsv(128, 128, 128), [0, 0, 128]);
        assert_eq!(rgb_to_hsv(0, 0, 0), [0, 0, 0]);
        // Just short of red from the blue side wraps to the top of the hue range
        assert_eq!(rgb_to_hsv(255, 0, 10)[0], 179);
    }

    #[test]
    fn test_convert_scales_preserving_aspect() {
        let frame = Frame::from_fn(640, 480, ColorSpace::Rgb, |_, _| [0, 200, 0]);
        let hsv = convert(&frame, 600).unwrap();

        assert_eq!(hsv.width(), 600);
        assert_eq!(hsv.height(), 450);
        assert_eq!(hsv.space(), ColorSpace::Hsv);
        assert_eq!(hsv.pixel(300, 200), Some([60, 255, 200]));
    }

    #[test]
    fn test_convert_bgr() {
        let frame = Frame::from_fn(10, 10, ColorSpace::Bgr, |_, _| [255, 0, 0]);
        let hsv = convert(&frame, 10).unwrap();

        // Blue in BGR order
        assert_eq!(hsv.pixel(5, 5), Some([120, 255, 255]));
    }

    #[test]
    fn test_convert_is_idempotent() {
        let frame = Frame::from_fn(333, 97, ColorSpace::Rgb, |x, y| {
            [(x % 256) as u8, (y % 256) as u8, 40]
        });

        let once = convert(&frame, 200).unwrap();
        let twice = convert(&once, 200).unwrap();

        assert_eq!(once.width(), 200);
        assert_eq!(once.height(), 58);
        assert_eq!(twice, once);
    }

    #[test]
    fn test_convert_rejects_invalid_input() {
        let empty = Frame::new(0, 0, ColorSpace::Rgb, vec![]).unwrap();
        assert!(matches!(convert(&empty, 100), Err(VisionError::InvalidFrame(_))));

        let frame = Frame::from_fn(4, 4, ColorSpace::Rgb, |_, _| [0, 0, 0]);
        assert_eq!(convert(&frame, 0), Err(VisionError::InvalidTargetWidth));
    }

    #[test]
    fn test_scaled_height_never_zero() {
        assert_eq!(scaled_height(1000, 1, 10), 1);
        assert_eq!(scaled_height(333, 97, 200), 58);
    }
}
