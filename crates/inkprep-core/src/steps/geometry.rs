//! Size-changing steps: resize and crop.

use image::imageops::FilterType;
use image::DynamicImage;
use serde::Deserialize;

use super::pixels;
use super::{same_dimensions, Derived, Step, Transform, Transformed, Validate};
use crate::error::{StepError, StepOutcome};
use crate::types::StepResult;

/// Aspect-preserving resize toward a target width and/or height.
///
/// When both targets are given the scale is the smaller of the two ratios
/// with `upscale_only`, the larger without it. With `upscale_only` set no
/// dimension is ever reduced; such requests leave the image untouched.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Resize {
    pub target_width: Option<i64>,
    pub target_height: Option<i64>,
    pub upscale_only: bool,
}

impl Default for Resize {
    fn default() -> Self {
        Self {
            target_width: None,
            target_height: None,
            upscale_only: true,
        }
    }
}

impl Resize {
    /// Target size for an input of `width` x `height`, or `None` for a no-op.
    pub fn plan(&self, width: u32, height: u32) -> Option<(u32, u32)> {
        // A zero target counts as absent.
        let tw = self.target_width.filter(|&v| v > 0);
        let th = self.target_height.filter(|&v| v > 0);

        let scale = match (tw, th) {
            (None, None) => return None,
            (Some(tw), None) => tw as f64 / width as f64,
            (None, Some(th)) => th as f64 / height as f64,
            (Some(tw), Some(th)) => {
                let sw = tw as f64 / width as f64;
                let sh = th as f64 / height as f64;
                if self.upscale_only {
                    sw.min(sh)
                } else {
                    sw.max(sh)
                }
            }
        };

        let new_w = ((width as f64 * scale) as u32).max(1);
        let new_h = ((height as f64 * scale) as u32).max(1);
        if new_w == width && new_h == height {
            return None;
        }
        if self.upscale_only && (new_w < width || new_h < height) {
            return None;
        }
        Some((new_w, new_h))
    }
}

impl Step for Resize {
    const NAME: &'static str = "resize";
}

impl Transform for Resize {
    fn check(&self) -> StepOutcome<()> {
        for (param, value) in [
            ("target_width", self.target_width),
            ("target_height", self.target_height),
        ] {
            if let Some(v) = value {
                if v < 0 {
                    return Err(StepError::invalid(param, format!("must not be negative, got {v}")));
                }
                if v > u32::MAX as i64 {
                    return Err(StepError::invalid(param, format!("{v} is too large")));
                }
            }
        }
        Ok(())
    }

    fn transform(&self, image: &DynamicImage) -> StepOutcome<Transformed> {
        self.check()?;
        pixels::ensure_not_empty(image)?;
        let (width, height) = (image.width(), image.height());

        let Some((new_w, new_h)) = self.plan(width, height) else {
            tracing::debug!(width, height, "resize is a no-op");
            return Ok(Transformed::new(image.clone()));
        };

        let filter = if new_w > width || new_h > height {
            FilterType::CatmullRom
        } else {
            FilterType::Triangle
        };
        let resized = image.resize_exact(new_w, new_h, filter);
        Ok(Transformed::with_derived(
            resized,
            Derived {
                resized: Some(true),
                new_width: Some(new_w),
                new_height: Some(new_h),
                ..Derived::default()
            },
        ))
    }
}

impl Validate for Resize {
    fn validate(&self, original: &DynamicImage, output: &Transformed) -> StepOutcome<StepResult> {
        let image = &output.image;
        let new_w = output.derived.new_width.unwrap_or(image.width());
        let new_h = output.derived.new_height.unwrap_or(image.height());

        let passed = if output.derived.resized == Some(true) {
            image.width() == new_w && image.height() == new_h
        } else {
            same_dimensions(original, image) && original.color() == image.color()
        };

        Ok(StepResult::check(Self::NAME, passed)
            .with_metric("new_width", new_w)
            .with_metric("new_height", new_h))
    }
}

/// Rectangle extraction. `width` and `height` default to the remainder of
/// the image past the origin; the far edges are clamped to the image.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Crop {
    pub x: i64,
    pub y: i64,
    pub width: Option<i64>,
    pub height: Option<i64>,
}

impl Step for Crop {
    const NAME: &'static str = "crop";
}

impl Transform for Crop {
    fn check(&self) -> StepOutcome<()> {
        if self.x < 0 || self.y < 0 {
            return Err(StepError::invalid(
                if self.x < 0 { "x" } else { "y" },
                "crop coordinates must be non-negative",
            ));
        }
        for (param, value) in [("width", self.width), ("height", self.height)] {
            if matches!(value, Some(v) if v <= 0) {
                return Err(StepError::invalid(param, "crop size must be positive"));
            }
        }
        Ok(())
    }

    fn transform(&self, image: &DynamicImage) -> StepOutcome<Transformed> {
        self.check()?;
        pixels::ensure_not_empty(image)?;
        let (max_w, max_h) = (image.width() as i64, image.height() as i64);

        if self.x >= max_w || self.y >= max_h {
            return Err(StepError::invalid(
                if self.x >= max_w { "x" } else { "y" },
                format!(
                    "origin ({}, {}) lies outside the {max_w}x{max_h} image",
                    self.x, self.y
                ),
            ));
        }

        let width = self.width.unwrap_or(max_w - self.x);
        let height = self.height.unwrap_or(max_h - self.y);
        let x_end = self.x.saturating_add(width).min(max_w);
        let y_end = self.y.saturating_add(height).min(max_h);
        let (crop_w, crop_h) = ((x_end - self.x) as u32, (y_end - self.y) as u32);

        let cropped = image.crop_imm(self.x as u32, self.y as u32, crop_w, crop_h);
        let orig_area = max_w * max_h;
        let removed_area = orig_area - crop_w as i64 * crop_h as i64;
        let removed = removed_area as f64 * 100.0 / orig_area as f64;

        Ok(Transformed::with_derived(
            cropped,
            Derived {
                removed_percent: Some(removed),
                ..Derived::default()
            },
        ))
    }
}

impl Validate for Crop {
    fn validate(&self, original: &DynamicImage, output: &Transformed) -> StepOutcome<StepResult> {
        let Some(removed) = output.derived.removed_percent else {
            return Ok(StepResult::failure(Self::NAME));
        };
        let orig_area = original.width() as u64 * original.height() as u64;
        let new_area = output.image.width() as u64 * output.image.height() as u64;
        Ok(StepResult::check(Self::NAME, new_area <= orig_area)
            .with_metric("removed_percent", pixels::round2(removed)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resize(width: Option<i64>, height: Option<i64>, upscale_only: bool) -> Resize {
        Resize {
            target_width: width,
            target_height: height,
            upscale_only,
        }
    }

    #[test]
    fn test_resize_both_targets_uses_larger_scale_without_upscale_only() {
        let step = resize(Some(800), Some(600), false);
        assert_eq!(step.plan(2000, 2000), Some((800, 800)));
    }

    #[test]
    fn test_resize_both_targets_with_upscale_only_uses_smaller_scale() {
        let step = resize(Some(400), Some(300), true);
        assert_eq!(step.plan(100, 200), Some((150, 300)));
        // The smaller scale would shrink, so nothing happens.
        let step = resize(Some(50), Some(400), true);
        assert_eq!(step.plan(100, 100), None);
    }

    #[test]
    fn test_resize_upscale_only_refuses_to_shrink() {
        let step = resize(Some(800), None, true);
        assert_eq!(step.plan(2000, 1000), None);
    }

    #[test]
    fn test_resize_width_only_upscales() {
        let step = resize(Some(200), None, true);
        assert_eq!(step.plan(100, 50), Some((200, 100)));
    }

    #[test]
    fn test_resize_zero_targets_are_noop() {
        assert_eq!(resize(Some(0), Some(0), false).plan(10, 10), None);
        assert_eq!(resize(None, None, false).plan(10, 10), None);
        assert_eq!(resize(Some(0), None, false).plan(10, 10), None);
    }

    #[test]
    fn test_resize_never_below_one_pixel() {
        assert_eq!(resize(None, Some(1), false).plan(10, 1000), Some((1, 1)));
    }

    #[test]
    fn test_resize_records_derived_values() {
        let step = resize(Some(40), None, false);
        let input = DynamicImage::new_rgb8(20, 10);
        let out = step.transform(&input).unwrap();
        assert_eq!(out.derived.resized, Some(true));
        assert_eq!(out.derived.new_width, Some(40));
        assert_eq!(out.derived.new_height, Some(20));
        assert_eq!((out.image.width(), out.image.height()), (40, 20));

        let result = step.validate(&input, &out).unwrap();
        assert!(result.is_success());
        assert_eq!(result.metrics["new_width"], 40);
    }

    #[test]
    fn test_resize_noop_validates_against_input() {
        let step = Resize::default();
        let input = DynamicImage::new_luma8(7, 9);
        let out = step.transform(&input).unwrap();
        assert_eq!(out.derived, Derived::default());
        let result = step.validate(&input, &out).unwrap();
        assert!(result.is_success());
        assert_eq!(result.metrics["new_height"], 9);
    }

    #[test]
    fn test_resize_rejects_negative_target() {
        assert!(resize(Some(-5), None, true).check().is_err());
    }

    #[test]
    fn test_crop_exact_rectangle() {
        let step = Crop {
            x: 10,
            y: 10,
            width: Some(20),
            height: Some(30),
        };
        let input = DynamicImage::new_luma8(100, 100);
        let out = step.transform(&input).unwrap();
        assert_eq!(out.image.width(), 20);
        assert_eq!(out.image.height(), 30);
        assert_eq!(out.derived.removed_percent, Some(94.0));

        let result = step.validate(&input, &out).unwrap();
        assert!(result.is_success());
        assert_eq!(result.metrics["removed_percent"], 94.0);
    }

    #[test]
    fn test_crop_defaults_fill_remainder_and_clamp() {
        let input = DynamicImage::new_rgb8(50, 40);
        let out = Crop {
            x: 10,
            y: 5,
            ..Crop::default()
        }
        .transform(&input)
        .unwrap();
        assert_eq!((out.image.width(), out.image.height()), (40, 35));

        let out = Crop {
            x: 45,
            y: 0,
            width: Some(100),
            height: Some(100),
        }
        .transform(&input)
        .unwrap();
        assert_eq!((out.image.width(), out.image.height()), (5, 40));
    }

    #[test]
    fn test_crop_rejects_bad_params() {
        let input = DynamicImage::new_luma8(10, 10);
        let negative = Crop {
            x: -1,
            ..Crop::default()
        };
        assert!(negative.transform(&input).is_err());

        let zero = Crop {
            width: Some(0),
            ..Crop::default()
        };
        assert!(zero.check().is_err());

        let outside = Crop {
            x: 10,
            ..Crop::default()
        };
        assert!(outside.transform(&input).is_err());
    }

    #[test]
    fn test_crop_validator_requires_removed_percent() {
        let input = DynamicImage::new_luma8(10, 10);
        let bare = Transformed::new(input.clone());
        assert!(!Crop::default().validate(&input, &bare).unwrap().is_success());
    }
}
