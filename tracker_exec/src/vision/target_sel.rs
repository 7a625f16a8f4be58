//! Target selection across the candidate targets of a mode

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use eqpt_if::cam::Frame;
use log::{trace, warn};

use super::{locate, ColorRangeConfig, LocatorParams, TargetObservation, VisionError};
use crate::mode::Mode;

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Find the active target of `mode` in an HSV frame.
///
/// Every target of the mode is located and the most confident present observation with at least
/// `min_confidence` is returned. An idle mode never finds anything.
pub fn select(
    frame: &Frame,
    mode: &Mode,
    ranges: &ColorRangeConfig,
    locator: &LocatorParams,
    min_confidence: f64
) -> Result<TargetObservation, VisionError> {
    let mut best = TargetObservation::absent(frame.width(), frame.height());

    for target in &mode.targets {
        let range = match ranges.get(target) {
            Some(r) => r,
            None => {
                warn!("Mode \"{}\" references unknown target \"{}\"", mode.name, target);
                continue
            }
        };

        let obs = locate(frame, range, locator)?;

        let det = match obs.detection {
            Some(ref d) => d,
            None => continue
        };

        trace!(
            "Target {}: centroid ({:.1}, {:.1}), area {}, confidence {:.3}",
            det.target, det.centroid_px.0, det.centroid_px.1, det.area_px, det.confidence
        );

        if det.confidence < min_confidence {
            continue
        }

        let better = match best.detection {
            Some(ref b) => det.confidence > b.confidence,
            None => true
        };
        if better {
            best = obs;
        }
    }

    Ok(best)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::vision::{convert, ColorRange};
    use eqpt_if::cam::ColorSpace;

    const LOCATOR: LocatorParams = LocatorParams {
        min_area_px: 20,
        morph_iterations: 0
    };

    fn ranges() -> ColorRangeConfig {
        ColorRangeConfig::from_ranges(vec![
            ColorRange::new("green", [50, 100, 50], [70, 255, 255]).unwrap(),
            ColorRange::new("blue", [100, 100, 50], [130, 255, 255]).unwrap(),
            ColorRange::with_bands(
                "red",
                &[([0, 120, 70], [8, 255, 255]), ([172, 120, 70], [179, 255, 255])]
            ).unwrap(),
        ])
    }

    /// A green disc on the left and a blue 30x6 bar on the right.
    fn scene() -> Frame {
        let rgb = Frame::from_fn(200, 100, ColorSpace::Rgb, |x, y| {
            let (dx, dy) = (x as f64 - 50.0, y as f64 - 50.0);
            if dx * dx + dy * dy <= 100.0 {
                [0, 200, 0]
            }
            else if (130..160).contains(&x) && (47..53).contains(&y) {
                [0, 0, 220]
            }
            else {
                [128, 128, 128]
            }
        });
        convert(&rgb, 200).unwrap()
    }

    #[test]
    fn test_most_confident_wins() {
        let mode = Mode::tracking("both", vec!["blue", "green"]);
        let obs = select(&scene(), &mode, &ranges(), &LOCATOR, 0.0).unwrap();

        // The bar is larger but the disc fills its bounding circle
        assert_eq!(obs.detection.unwrap().target, "green");
    }

    #[test]
    fn test_min_confidence_filters() {
        let mode = Mode::tracking("blue", vec!["blue"]);

        assert!(select(&scene(), &mode, &ranges(), &LOCATOR, 0.0).unwrap().is_present());
        assert!(!select(&scene(), &mode, &ranges(), &LOCATOR, 0.9).unwrap().is_present());
    }

    #[test]
    fn test_idle_and_unknown_targets_are_absent() {
        let frame = scene();

        let obs = select(&frame, &Mode::idle(), &ranges(), &LOCATOR, 0.0).unwrap();
        assert_eq!(obs, TargetObservation::absent(200, 100));

        let mode = Mode::tracking("ghost", vec!["purple"]);
        assert!(!select(&frame, &mode, &ranges(), &LOCATOR, 0.0).unwrap().is_present());
    }

    #[test]
    fn test_red_found_either_side_of_wrap() {
        let mode = Mode::tracking("red", vec!["red"]);

        for colour in &[[255u8, 0, 0], [255, 0, 30]] {
            let rgb = Frame::from_fn(100, 100, ColorSpace::Rgb, |x, y| {
                let (dx, dy) = (x as f64 - 30.0, y as f64 - 60.0);
                if dx * dx + dy * dy <= 64.0 { *colour } else { [128, 128, 128] }
            });
            let frame = convert(&rgb, 100).unwrap();

            let det = select(&frame, &mode, &ranges(), &LOCATOR, 0.5)
                .unwrap()
                .detection
                .expect("red disc should be found");
            assert_eq!(det.centroid_px, (30.0, 60.0));
        }
    }
}
