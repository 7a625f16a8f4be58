//! Blob locator
//!
//! Thresholds an HSV frame against a colour range and finds the best connected region in the
//! resulting mask.
//!
//! All pixel statistics are integer sums so results do not drift between frames. Distances are
//! compared in a space scaled by the region area, i.e. for a pixel `(x, y)` in a region of area
//! `A` with coordinate sums `(Sx, Sy)` the scaled offset from the centroid is
//! `(x * A - Sx, y * A - Sy)`.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use eqpt_if::cam::{ColorSpace, Frame};
use serde::Serialize;

use super::{ColorRange, LocatorParams, VisionError};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Result of looking for a target in a frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetObservation {
    /// Width of the frame the observation was made in.
    ///
    /// Units: pixels
    pub frame_width: u32,

    /// Height of the frame the observation was made in.
    ///
    /// Units: pixels
    pub frame_height: u32,

    /// The detected target, `None` if no target was found.
    pub detection: Option<Detection>,
}

/// A located target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    /// Name of the colour range the target matched.
    pub target: String,

    /// Centroid of the target region.
    ///
    /// Units: pixels, frame coordinates
    pub centroid_px: (f64, f64),

    /// Number of pixels in the target region.
    pub area_px: u64,

    /// Radius of a circle with the same area as the region.
    ///
    /// Units: pixels
    pub radius_px: f64,

    /// Fraction of the region's bounding circle covered by the region, between 0 and 1.
    pub confidence: f64,
}

/// Binary mask of the pixels matching a colour range.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    width: u32,
    height: u32,
    bits: Vec<bool>,
}

/// Integer statistics of one connected region.
#[derive(Debug, Clone, Copy)]
struct Region {
    label: u32,
    area: u64,
    sum_x: u64,
    sum_y: u64,
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Locate the best region of `frame` matching `range`.
///
/// The best region is the largest one with at least `min_area_px` pixels, with ties going to the
/// region closest to the centre of the frame. If no region qualifies an absent observation is
/// returned.
pub fn locate(
    frame: &Frame,
    range: &ColorRange,
    params: &LocatorParams
) -> Result<TargetObservation, VisionError> {
    if frame.space() != ColorSpace::Hsv {
        return Err(VisionError::WrongColorSpace {
            expected: ColorSpace::Hsv,
            found: frame.space()
        })
    }
    if frame.is_empty() {
        return Err(VisionError::InvalidFrame("frame has no pixels".into()))
    }

    let mut mask = Mask::threshold(frame, range);
    for _ in 0..params.morph_iterations {
        mask = mask.erode();
    }
    for _ in 0..params.morph_iterations {
        mask = mask.dilate();
    }

    let (labels, regions) = mask.regions();

    let best = regions
        .iter()
        .filter(|r| r.area >= params.min_area_px.max(1))
        .fold(None, |best: Option<&Region>, r| match best {
            None => Some(r),
            Some(b) => {
                if r.area > b.area
                    || (r.area == b.area
                        && r.centre_dist_sq(frame.width(), frame.height())
                            < b.centre_dist_sq(frame.width(), frame.height()))
                {
                    Some(r)
                }
                else {
                    Some(b)
                }
            }
        });

    let detection = best.map(|r| {
        let area = r.area as f64;
        let circle_px = r.bounding_circle_pixels(&labels, frame.width(), frame.height());

        Detection {
            target: range.name().to_string(),
            centroid_px: (r.sum_x as f64 / area, r.sum_y as f64 / area),
            area_px: r.area,
            radius_px: (area / std::f64::consts::PI).sqrt(),
            confidence: r.area as f64 / circle_px as f64,
        }
    });

    Ok(TargetObservation {
        frame_width: frame.width(),
        frame_height: frame.height(),
        detection
    })
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl TargetObservation {
    /// An observation in which no target was found.
    pub fn absent(frame_width: u32, frame_height: u32) -> Self {
        Self {
            frame_width,
            frame_height,
            detection: None
        }
    }

    /// An observation of a found target.
    pub fn present(frame_width: u32, frame_height: u32, detection: Detection) -> Self {
        Self {
            frame_width,
            frame_height,
            detection: Some(detection)
        }
    }

    pub fn is_present(&self) -> bool {
        self.detection.is_some()
    }
}

impl Mask {
    /// Build the mask of the pixels of an HSV frame which lie inside `range`.
    pub fn threshold(frame: &Frame, range: &ColorRange) -> Self {
        Self {
            width: frame.width(),
            height: frame.height(),
            bits: frame.pixels().map(|px| range.contains(px)).collect()
        }
    }

    /// Number of set pixels.
    pub fn count(&self) -> usize {
        self.bits.iter().filter(|b| **b).count()
    }

    pub fn get(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height && self.bits[self.idx(x, y)]
    }

    /// Erode with a 3x3 square kernel, pixels outside the mask do not erode.
    pub fn erode(&self) -> Self {
        self.morph(true)
    }

    /// Dilate with a 3x3 square kernel.
    pub fn dilate(&self) -> Self {
        self.morph(false)
    }

    fn idx(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// Erosion keeps a pixel only if its whole in-bounds neighbourhood is set, dilation sets a
    /// pixel if any of it is.
    fn morph(&self, erode: bool) -> Self {
        let mut bits = vec![false; self.bits.len()];

        for y in 0..self.height {
            for x in 0..self.width {
                let mut all = true;
                let mut any = false;

                for (nx, ny) in self.neighbourhood(x, y) {
                    let b = self.bits[self.idx(nx, ny)];
                    all &= b;
                    any |= b;
                }

                bits[self.idx(x, y)] = if erode { all } else { any };
            }
        }

        Self {
            width: self.width,
            height: self.height,
            bits
        }
    }

    /// The in-bounds 3x3 neighbourhood of a pixel, including the pixel itself.
    fn neighbourhood(&self, x: u32, y: u32) -> impl Iterator<Item = (u32, u32)> {
        let (w, h) = (self.width, self.height);
        let xs = x.saturating_sub(1)..=(x + 1).min(w - 1);
        let ys = y.saturating_sub(1)..=(y + 1).min(h - 1);

        ys.flat_map(move |ny| xs.clone().map(move |nx| (nx, ny)))
    }

    /// Label the 8-connected regions of the mask.
    ///
    /// Returns the label image, where 0 is background and region `i` has label `i + 1`, and the
    /// statistics of each region.
    fn regions(&self) -> (Vec<u32>, Vec<Region>) {
        let mut labels = vec![0u32; self.bits.len()];
        let mut regions = Vec::new();
        let mut stack = Vec::new();

        for y in 0..self.height {
            for x in 0..self.width {
                let idx = self.idx(x, y);
                if !self.bits[idx] || labels[idx] != 0 {
                    continue
                }

                let label = regions.len() as u32 + 1;
                let mut region = Region {
                    label,
                    area: 0,
                    sum_x: 0,
                    sum_y: 0,
                    min_x: x,
                    min_y: y,
                    max_x: x,
                    max_y: y,
                };

                labels[idx] = label;
                stack.push((x, y));

                while let Some((px, py)) = stack.pop() {
                    region.add(px, py);

                    for (nx, ny) in self.neighbourhood(px, py) {
                        let nidx = self.idx(nx, ny);
                        if self.bits[nidx] && labels[nidx] == 0 {
                            labels[nidx] = label;
                            stack.push((nx, ny));
                        }
                    }
                }

                regions.push(region);
            }
        }

        (labels, regions)
    }
}

impl Region {
    fn add(&mut self, x: u32, y: u32) {
        self.area += 1;
        self.sum_x += x as u64;
        self.sum_y += y as u64;
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    /// Scaled offset of a pixel from the region centroid.
    #[inline]
    fn scaled_offset(&self, x: i128, y: i128) -> (i128, i128) {
        let a = self.area as i128;
        (x * a - self.sum_x as i128, y * a - self.sum_y as i128)
    }

    /// Squared distance of the centroid from the frame centre, scaled by `(2 * area)^2`.
    ///
    /// Only comparable between regions of equal area.
    fn centre_dist_sq(&self, width: u32, height: u32) -> i128 {
        let a = self.area as i128;
        let dx = 2 * self.sum_x as i128 - a * (width as i128 - 1);
        let dy = 2 * self.sum_y as i128 - a * (height as i128 - 1);
        dx * dx + dy * dy
    }

    /// Count the in-frame pixels inside the region's bounding circle.
    ///
    /// The circle is centred on the centroid and passes through the farthest pixel of the
    /// region, so every region pixel lies inside it and the count is never less than the area.
    fn bounding_circle_pixels(&self, labels: &[u32], width: u32, height: u32) -> u64 {
        // Farthest region pixel, searched within the bounding box
        let mut max_dist_sq: i128 = 0;
        for y in self.min_y..=self.max_y {
            for x in self.min_x..=self.max_x {
                if labels[y as usize * width as usize + x as usize] != self.label {
                    continue
                }
                let (dx, dy) = self.scaled_offset(x as i128, y as i128);
                max_dist_sq = max_dist_sq.max(dx * dx + dy * dy);
            }
        }

        // Pixel window covering the circle, widened by one pixel to absorb float rounding in the
        // bounds only, the membership test below is exact.
        let a = self.area as f64;
        let radius = (max_dist_sq as f64).sqrt() / a;
        let (cx, cy) = (self.sum_x as f64 / a, self.sum_y as f64 / a);
        let x_lo = (cx - radius - 1.0).floor().max(0.0) as u32;
        let y_lo = (cy - radius - 1.0).floor().max(0.0) as u32;
        let x_hi = ((cx + radius + 1.0).ceil() as u32).min(width - 1);
        let y_hi = ((cy + radius + 1.0).ceil() as u32).min(height - 1);

        let mut count = 0;
        for y in y_lo..=y_hi {
            for x in x_lo..=x_hi {
                let (dx, dy) = self.scaled_offset(x as i128, y as i128);
                if dx * dx + dy * dy <= max_dist_sq {
                    count += 1;
                }
            }
        }

        count
    }
}
