//! Smoothing and sharpening filters.

use image::{DynamicImage, GrayImage};
use imageproc::filter::{filter3x3, gaussian_blur_f32, median_filter};
use serde::Deserialize;

use super::pixels;
use super::{validate_same_shape, Step, Transform, Transformed, Validate};
use crate::error::{StepError, StepOutcome};
use crate::types::StepResult;

fn check_ksize(ksize: i64) -> StepOutcome<()> {
    if ksize <= 0 {
        return Err(StepError::invalid(
            "ksize",
            format!("must be a positive integer, got {ksize}"),
        ));
    }
    Ok(())
}

/// Median filter over a square window.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MedianBlur {
    pub ksize: i64,
}

impl Default for MedianBlur {
    fn default() -> Self {
        Self { ksize: 5 }
    }
}

impl Step for MedianBlur {
    const NAME: &'static str = "median_blur";
}

impl Transform for MedianBlur {
    fn check(&self) -> StepOutcome<()> {
        check_ksize(self.ksize)
    }

    fn transform(&self, image: &DynamicImage) -> StepOutcome<Transformed> {
        self.check()?;
        pixels::require_u8(image, "median blur needs 8-bit samples")?;
        let radius = (pixels::odd(self.ksize) / 2) as u32;
        let blurred = match image {
            DynamicImage::ImageLuma8(buf) => {
                DynamicImage::ImageLuma8(median_filter(buf, radius, radius))
            }
            DynamicImage::ImageLumaA8(buf) => {
                DynamicImage::ImageLumaA8(median_filter(buf, radius, radius))
            }
            DynamicImage::ImageRgb8(buf) => DynamicImage::ImageRgb8(median_filter(buf, radius, radius)),
            DynamicImage::ImageRgba8(buf) => {
                DynamicImage::ImageRgba8(median_filter(buf, radius, radius))
            }
            other => {
                return Err(StepError::UnsupportedPixelType {
                    color: other.color(),
                    reason: "median blur needs 8-bit samples",
                })
            }
        };
        Ok(Transformed::new(blurred))
    }
}

impl Validate for MedianBlur {
    fn validate(&self, original: &DynamicImage, output: &Transformed) -> StepOutcome<StepResult> {
        Ok(validate_same_shape(Self::NAME, original, &output.image))
    }
}

/// Largest accepted standard deviation; the kernel spans about six sigmas.
pub const MAX_SIGMA: f64 = 100.0;

/// Gaussian smoothing. A `sigma` of 0 derives the spread from `ksize`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GaussianBlur {
    /// Only used to derive the spread when `sigma` is 0. With a positive
    /// `sigma` the kernel size follows from `sigma` alone.
    pub ksize: i64,
    pub sigma: f64,
}

impl Default for GaussianBlur {
    fn default() -> Self {
        Self {
            ksize: 5,
            sigma: 0.0,
        }
    }
}

impl GaussianBlur {
    /// Effective standard deviation.
    pub fn effective_sigma(&self) -> f64 {
        if self.sigma > 0.0 {
            self.sigma
        } else {
            let ksize = pixels::odd(self.ksize) as f64;
            0.3 * ((ksize - 1.0) * 0.5 - 1.0) + 0.8
        }
    }
}

impl Step for GaussianBlur {
    const NAME: &'static str = "gaussian_blur";
}

impl Transform for GaussianBlur {
    fn check(&self) -> StepOutcome<()> {
        check_ksize(self.ksize)?;
        if !self.sigma.is_finite() || self.sigma < 0.0 {
            return Err(StepError::invalid(
                "sigma",
                format!("must be zero or a positive number, got {}", self.sigma),
            ));
        }
        // Values below f32 resolution would collapse to 0 in the filter.
        if self.sigma != 0.0 && (self.sigma as f32) <= 0.0 {
            return Err(StepError::invalid(
                "sigma",
                format!("{} is too small to be represented", self.sigma),
            ));
        }
        let sigma = self.effective_sigma();
        if sigma > MAX_SIGMA {
            return Err(StepError::invalid(
                "sigma",
                format!("effective sigma {sigma:.2} exceeds {MAX_SIGMA}"),
            ));
        }
        Ok(())
    }

    fn transform(&self, image: &DynamicImage) -> StepOutcome<Transformed> {
        self.check()?;
        let sigma = self.effective_sigma() as f32;
        let blurred = pixels::map_channels(image, |plane: &GrayImage| {
            gaussian_blur_f32(plane, sigma)
        })?;
        Ok(Transformed::new(blurred))
    }
}

impl Validate for GaussianBlur {
    fn validate(&self, original: &DynamicImage, output: &Transformed) -> StepOutcome<StepResult> {
        Ok(validate_same_shape(Self::NAME, original, &output.image))
    }
}

const SHARPEN: [i32; 9] = [0, -1, 0, -1, 5, -1, 0, -1, 0];

/// Fixed 3x3 high-pass sharpening kernel.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Sharpen {}

impl Step for Sharpen {
    const NAME: &'static str = "sharpen";
}

impl Transform for Sharpen {
    fn transform(&self, image: &DynamicImage) -> StepOutcome<Transformed> {
        let sharpened = pixels::map_channels(image, |plane| {
            filter3x3::<_, i32, u8>(plane, &SHARPEN)
        })?;
        Ok(Transformed::new(sharpened))
    }
}

impl Validate for Sharpen {
    fn validate(&self, original: &DynamicImage, output: &Transformed) -> StepOutcome<StepResult> {
        let (before, after) = match (
            pixels::laplacian_variance(original),
            pixels::laplacian_variance(&output.image),
        ) {
            (Ok(before), Ok(after)) => (before, after),
            _ => return Ok(StepResult::failure(Self::NAME)),
        };
        Ok(StepResult::check(Self::NAME, after >= before)
            .with_metric("input_sharpness", pixels::round2(before))
            .with_metric("output_sharpness", pixels::round2(after)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb, RgbImage};

    fn salt() -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_fn(12, 12, |x, y| {
            Luma([if (x * 5 + y * 3) % 7 == 0 { 255 } else { 100 }])
        }))
    }

    fn edge() -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_fn(12, 12, |x, _| {
            Luma([if x < 6 { 60 } else { 180 }])
        }))
    }

    #[test]
    fn test_median_preserves_shape_and_reports_variance() {
        let input = salt();
        let step = MedianBlur::default();
        let out = step.transform(&input).unwrap();
        assert_eq!(out.image.color(), input.color());
        assert_eq!(out.image.width(), 12);
        let result = step.validate(&input, &out).unwrap();
        assert!(result.is_success());
        assert!(result.metrics.contains_key("diff_variance"));
    }

    #[test]
    fn test_median_handles_rgb() {
        let rgb = DynamicImage::ImageRgb8(RgbImage::from_pixel(6, 6, Rgb([1, 2, 3])));
        let out = MedianBlur { ksize: 4 }.transform(&rgb).unwrap();
        assert_eq!(out.image, rgb);
    }

    #[test]
    fn test_median_rejects_empty() {
        let empty = DynamicImage::new_luma8(0, 3);
        assert!(MedianBlur::default().transform(&empty).is_err());
    }

    #[test]
    fn test_gaussian_sigma_from_ksize() {
        let step = GaussianBlur {
            ksize: 4,
            sigma: 0.0,
        };
        // ksize 4 normalizes to 5.
        assert!((step.effective_sigma() - 1.1).abs() < 1e-9);
    }

    #[test]
    fn test_gaussian_rejects_negative_sigma() {
        let step = GaussianBlur {
            ksize: 5,
            sigma: -1.0,
        };
        assert!(matches!(
            step.check().unwrap_err(),
            StepError::InvalidParam { param: "sigma", .. }
        ));
    }

    #[test]
    fn test_gaussian_rejects_sigma_below_f32_resolution() {
        let step = GaussianBlur {
            ksize: 5,
            sigma: 1e-50,
        };
        assert!(matches!(
            step.check().unwrap_err(),
            StepError::InvalidParam { param: "sigma", .. }
        ));
        assert!(step.transform(&edge()).is_err());
    }

    #[test]
    fn test_gaussian_rejects_oversized_spread() {
        let wide = GaussianBlur {
            ksize: 5,
            sigma: 1e6,
        };
        assert!(wide.check().is_err());
        let derived = GaussianBlur {
            ksize: 100_001,
            sigma: 0.0,
        };
        assert!(derived.check().is_err());
        assert!(GaussianBlur { ksize: 5, sigma: 2.5 }.check().is_ok());
    }

    #[test]
    fn test_gaussian_smooths_edge() {
        let input = edge();
        let step = GaussianBlur::default();
        let out = step.transform(&input).unwrap();
        let before = pixels::laplacian_variance(&input).unwrap();
        let after = pixels::laplacian_variance(&out.image).unwrap();
        assert!(after < before);
        assert!(step.validate(&input, &out).unwrap().is_success());
    }

    #[test]
    fn test_sharpen_increases_edge_response() {
        let input = edge();
        let out = Sharpen {}.transform(&input).unwrap();
        let result = Sharpen {}.validate(&input, &out).unwrap();
        assert!(result.is_success());
        assert!(
            result.metrics["output_sharpness"].as_f64() > result.metrics["input_sharpness"].as_f64()
        );
    }

    #[test]
    fn test_sharpen_leaves_flat_image() {
        let flat = DynamicImage::ImageLuma8(GrayImage::from_pixel(5, 5, Luma([128])));
        let out = Sharpen {}.transform(&flat).unwrap();
        assert_eq!(out.image, flat);
    }
}
