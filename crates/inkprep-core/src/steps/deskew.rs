//! Skew detection and correction.
//!
//! The skew angle is the orientation of the minimum-area rectangle enclosing
//! all dark pixels. Angles are in degrees; positive means the content is
//! rotated clockwise.

use image::{DynamicImage, Luma, LumaA, Rgb, Rgba};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use imageproc::geometry::min_area_rect;
use imageproc::point::Point;
use serde::Deserialize;

use super::pixels;
use super::{Derived, Step, Transform, Transformed, Validate};
use crate::error::{StepError, StepOutcome};
use crate::types::StepResult;

/// Angles smaller than this are left alone.
pub const MIN_CORRECTION_DEGREES: f64 = 5.0;

/// Detect the skew angle and rotate the page straight.
///
/// Corners exposed by the rotation are filled with white rather than
/// replicating the nearest edge pixel, so scanner borders do not smear
/// into the page.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Deskew {}

impl Step for Deskew {
    const NAME: &'static str = "deskew";
}

impl Transform for Deskew {
    fn transform(&self, image: &DynamicImage) -> StepOutcome<Transformed> {
        let gray = pixels::to_gray8(image)?;
        let binary = pixels::binarize_otsu_fallback(&gray);

        let points: Vec<Point<i32>> = binary
            .enumerate_pixels()
            .filter(|(_, _, p)| p.0[0] == 0)
            .map(|(x, y, _)| Point::new(x as i32, y as i32))
            .collect();
        let angle = min_area_rect_angle(&points).map_or(0.0, normalize_angle);

        let derived = Derived {
            detected_angle: Some(angle),
            ..Derived::default()
        };

        if angle.abs() < MIN_CORRECTION_DEGREES {
            tracing::debug!(angle, "skew below correction threshold");
            return Ok(Transformed::with_derived(image.clone(), derived));
        }

        tracing::debug!(angle, "rotating to correct skew");
        let rotated = rotate(image, -angle.to_radians() as f32)?;
        Ok(Transformed::with_derived(rotated, derived))
    }
}

impl Validate for Deskew {
    fn validate(&self, _original: &DynamicImage, output: &Transformed) -> StepOutcome<StepResult> {
        Ok(match output.derived.detected_angle {
            Some(angle) => {
                StepResult::success(Self::NAME).with_metric("detected_angle", pixels::round2(angle))
            }
            None => StepResult::failure(Self::NAME).with_metric("detected_angle", None::<f64>),
        })
    }
}

/// Rotate clockwise by `theta` radians about the center, filling with white.
fn rotate(image: &DynamicImage, theta: f32) -> StepOutcome<DynamicImage> {
    let bicubic = Interpolation::Bicubic;
    Ok(match image {
        DynamicImage::ImageLuma8(buf) => {
            DynamicImage::ImageLuma8(rotate_about_center(buf, theta, bicubic, Luma([255])))
        }
        DynamicImage::ImageLumaA8(buf) => DynamicImage::ImageLumaA8(rotate_about_center(
            buf,
            theta,
            bicubic,
            LumaA([255, 255]),
        )),
        DynamicImage::ImageRgb8(buf) => DynamicImage::ImageRgb8(rotate_about_center(
            buf,
            theta,
            bicubic,
            Rgb([255, 255, 255]),
        )),
        DynamicImage::ImageRgba8(buf) => DynamicImage::ImageRgba8(rotate_about_center(
            buf,
            theta,
            bicubic,
            Rgba([255, 255, 255, 255]),
        )),
        other => {
            return Err(StepError::UnsupportedPixelType {
                color: other.color(),
                reason: "deskew needs 8-bit samples",
            })
        }
    })
}

/// Fold an edge orientation into (-45, 45]. Quarter turns, including the
/// +/-90 degree artifact of axis-aligned content, fold to 0.
pub(crate) fn normalize_angle(degrees: f64) -> f64 {
    let mut angle = degrees % 90.0;
    if angle > 45.0 {
        angle -= 90.0;
    } else if angle <= -45.0 {
        angle += 90.0;
    }
    if angle.abs() < 1e-9 {
        0.0
    } else {
        angle
    }
}

/// Orientation in degrees of the longer side of the minimum-area rectangle
/// enclosing `points`, or `None` when there are no points.
pub(crate) fn min_area_rect_angle(points: &[Point<i32>]) -> Option<f64> {
    if points.is_empty() {
        return None;
    }
    let corners = min_area_rect(points);
    let origin = corners[0];
    let mut sides: Vec<(f64, f64)> = corners[1..]
        .iter()
        .map(|c| ((c.x - origin.x) as f64, (c.y - origin.y) as f64))
        .collect();
    // The farthest corner is the diagonal; the other two are sides.
    sides.sort_by(|a, b| a.0.hypot(a.1).total_cmp(&b.0.hypot(b.1)));
    let (dx, dy) = sides[1];
    if dx == 0.0 && dy == 0.0 {
        return Some(0.0);
    }
    Some(dy.atan2(dx).to_degrees())
}
