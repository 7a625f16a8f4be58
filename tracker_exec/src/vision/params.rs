//! Parameters structure for Vision

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::mode::{ModeParams, ModeTable};
use crate::params::ConfigError;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Largest valid hue in the working colour space.
pub const MAX_HUE: u8 = 179;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Vision parameters as stored in `vision.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct Params {

    // ---- FRAME CONVERSION ----

    /// Width that all frames are scaled to before processing.
    ///
    /// Units: pixels
    pub target_width_px: u32,

    // ---- BLOB LOCATOR ----

    /// Blobs with fewer pixels than this are discarded.
    ///
    /// Units: pixels
    pub min_area_px: u64,

    /// Number of erode then dilate passes applied to the mask.
    #[serde(default)]
    pub morph_iterations: u32,

    // ---- TARGET SELECTOR ----

    /// Observations below this confidence are not selected.
    #[serde(default)]
    pub min_confidence: f64,

    /// Acceptance range of each named target.
    pub ranges: BTreeMap<String, RangeParams>,

    /// Modes that can be selected from the input device.
    pub modes: BTreeMap<String, ModeParams>,

    /// Mode active at startup.
    pub initial_mode: String,
}

/// Acceptance range of a single target, as stored in the parameter file.
///
/// Either one band given directly by `min` and `max`, or a `bands` list for colours whose hue
/// wraps around zero.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RangeParams {
    Band(BandParams),
    Bands {
        bands: Vec<BandParams>
    },
}

/// One band of an acceptance range, as stored in the parameter file.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct BandParams {
    /// Minimum hue, saturation and value.
    pub min: [u8; 3],

    /// Maximum hue, saturation and value.
    pub max: [u8; 3],
}

/// A box in HSV space, `min <= max` on every channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HsvBand {
    pub min: [u8; 3],
    pub max: [u8; 3],
}

/// Validated acceptance range of a named target in HSV.
///
/// A pixel is inside the range if it is inside any of its bands. Red, whose hue wraps around
/// zero, is one range with a band at each end of the hue axis, so a ball straddling the wrap
/// still produces a single mask region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColorRange {
    name: String,
    bands: Vec<HsvBand>,
}

/// The immutable table of all target colour ranges.
#[derive(Debug, Clone, Default)]
pub struct ColorRangeConfig {
    ranges: BTreeMap<String, ColorRange>,
}

/// Parameters of the blob locator.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LocatorParams {
    /// Minimum region area in pixels.
    pub min_area_px: u64,

    /// Number of erode then dilate passes applied to the mask.
    pub morph_iterations: u32,
}

/// Validated vision configuration.
#[derive(Debug, Clone)]
pub struct VisionConfig {
    pub target_width_px: u32,
    pub locator: LocatorParams,
    pub min_confidence: f64,
    pub ranges: Arc<ColorRangeConfig>,
    pub modes: ModeTable,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Params {
    /// Check the parameters and build the vision configuration.
    pub fn validate(&self) -> Result<VisionConfig, ConfigError> {
        if self.target_width_px == 0 {
            return Err(ConfigError::NotPositive("target_width_px", 0.0))
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(ConfigError::OutOfRange(
                "min_confidence", 0.0, 1.0, self.min_confidence
            ))
        }

        let ranges = ColorRangeConfig::from_params(&self.ranges)?;
        let modes = ModeTable::from_params(&self.modes, &self.initial_mode, &ranges)?;

        Ok(VisionConfig {
            target_width_px: self.target_width_px,
            locator: LocatorParams {
                min_area_px: self.min_area_px,
                morph_iterations: self.morph_iterations,
            },
            min_confidence: self.min_confidence,
            ranges: Arc::new(ranges),
            modes,
        })
    }
}

impl HsvBand {
    /// Returns true if the HSV pixel lies inside the band on every channel.
    #[inline]
    pub fn contains(&self, px: &[u8]) -> bool {
        px[0] >= self.min[0] && px[0] <= self.max[0]
            && px[1] >= self.min[1] && px[1] <= self.max[1]
            && px[2] >= self.min[2] && px[2] <= self.max[2]
    }
}

impl ColorRange {
    /// Create a new single band range, checking that `min <= max` on every channel and that the
    /// hue bounds are valid.
    pub fn new(name: &str, min: [u8; 3], max: [u8; 3]) -> Result<Self, ConfigError> {
        Self::with_bands(name, &[(min, max)])
    }

    /// Create a range from several `(min, max)` bands, each checked as in [`ColorRange::new`].
    pub fn with_bands(name: &str, bands: &[([u8; 3], [u8; 3])]) -> Result<Self, ConfigError> {
        if bands.is_empty() {
            return Err(ConfigError::EmptyRange(name.to_string()))
        }

        let mut checked = Vec::with_capacity(bands.len());

        for &(min, max) in bands {
            if min.iter().zip(max.iter()).any(|(lo, hi)| lo > hi) {
                return Err(ConfigError::RangeInverted {
                    name: name.to_string(),
                    min,
                    max
                })
            }
            if max[0] > MAX_HUE {
                return Err(ConfigError::HueOutOfRange(name.to_string()))
            }
            checked.push(HsvBand { min, max });
        }

        Ok(Self {
            name: name.to_string(),
            bands: checked
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bands(&self) -> &[HsvBand] {
        &self.bands
    }

    /// Returns true if the HSV pixel lies inside any band of the range.
    #[inline]
    pub fn contains(&self, px: &[u8]) -> bool {
        self.bands.iter().any(|b| b.contains(px))
    }
}

impl RangeParams {
    fn bounds(&self) -> Vec<([u8; 3], [u8; 3])> {
        match self {
            RangeParams::Band(b) => vec![(b.min, b.max)],
            RangeParams::Bands { bands } => bands.iter().map(|b| (b.min, b.max)).collect()
        }
    }
}

impl ColorRangeConfig {
    /// Build the table from the parameter file ranges.
    pub fn from_params(params: &BTreeMap<String, RangeParams>) -> Result<Self, ConfigError> {
        let mut ranges = BTreeMap::new();

        for (name, p) in params {
            ranges.insert(name.clone(), ColorRange::with_bands(name, &p.bounds())?);
        }

        Ok(Self { ranges })
    }

    /// Build the table from already validated ranges.
    pub fn from_ranges<I: IntoIterator<Item = ColorRange>>(ranges: I) -> Self {
        Self {
            ranges: ranges.into_iter().map(|r| (r.name.clone(), r)).collect()
        }
    }

    pub fn get(&self, name: &str) -> Option<&ColorRange> {
        self.ranges.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.ranges.contains_key(name)
    }

    /// Iterate over all ranges in name order.
    pub fn iter(&self) -> impl Iterator<Item = &ColorRange> {
        self.ranges.values()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const VISION_TOML: &str = r#"
        target_width_px = 600
        min_area_px = 100
        morph_iterations = 2
        min_confidence = 0.3
        initial_mode = "green"

        [ranges.green]
        min = [50, 100, 50]
        max = [70, 255, 255]

        [ranges.red]
        bands = [
            { min = [0, 120, 70], max = [8, 255, 255] },
            { min = [172, 120, 70], max = [179, 255, 255] },
        ]

        [modes.green]
        targets = ["green"]
        button = 0

        [modes.red]
        targets = ["red"]
        button = 1
        speed_scale = 0.5
    "#;

    #[test]
    fn test_load_and_validate() {
        let params: Params = util::params::parse(VISION_TOML).unwrap();
        let cfg = params.validate().unwrap();

        assert_eq!(cfg.target_width_px, 600);
        assert_eq!(cfg.locator.min_area_px, 100);
        assert_eq!(cfg.locator.morph_iterations, 2);
        assert_eq!(cfg.ranges.len(), 2);
        assert_eq!(cfg.ranges.get("green").unwrap().bands()[0].min, [50, 100, 50]);
        assert_eq!(cfg.ranges.get("red").unwrap().bands().len(), 2);
        assert_eq!(cfg.modes.initial().name, "green");
        assert_eq!(cfg.modes.for_button(1).unwrap().targets, vec!["red"]);
    }

    #[test]
    fn test_inverted_range_rejected() {
        assert!(matches!(
            ColorRange::new("bad", [10, 0, 0], [5, 255, 255]),
            Err(ConfigError::RangeInverted { .. })
        ));
        assert!(matches!(
            ColorRange::new("bad", [0, 200, 0], [5, 100, 255]),
            Err(ConfigError::RangeInverted { .. })
        ));
        assert!(matches!(
            ColorRange::new("bad", [0, 0, 0], [180, 255, 255]),
            Err(ConfigError::HueOutOfRange(_))
        ));
        assert!(matches!(
            ColorRange::with_bands(
                "red",
                &[([0, 0, 0], [8, 255, 255]), ([179, 0, 0], [172, 255, 255])]
            ),
            Err(ConfigError::RangeInverted { .. })
        ));
        assert!(matches!(
            ColorRange::with_bands("none", &[]),
            Err(ConfigError::EmptyRange(_))
        ));
    }

    #[test]
    fn test_invalid_params_rejected() {
        let mut params: Params = util::params::parse(VISION_TOML).unwrap();
        params.min_confidence = 1.5;
        assert!(params.validate().is_err());

        let mut params: Params = util::params::parse(VISION_TOML).unwrap();
        params.target_width_px = 0;
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_contains() {
        let range = ColorRange::new("green", [50, 100, 50], [70, 255, 255]).unwrap();

        assert!(range.contains(&[60, 255, 200]));
        assert!(range.contains(&[50, 100, 50]));
        assert!(!range.contains(&[49, 255, 200]));
        assert!(!range.contains(&[60, 99, 200]));
        assert!(!range.contains(&[0, 0, 128]));

        let red = ColorRange::with_bands(
            "red",
            &[([0, 120, 70], [8, 255, 255]), ([172, 120, 70], [179, 255, 255])]
        ).unwrap();

        assert!(red.contains(&[2, 255, 255]));
        assert!(red.contains(&[177, 255, 255]));
        assert!(!red.contains(&[90, 255, 255]));
    }
}
