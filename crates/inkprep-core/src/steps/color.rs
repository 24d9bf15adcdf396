//! Intensity steps: grayscale, invert, gamma, normalization, equalization.

use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use serde::Deserialize;

use super::pixels;
use super::{same_dimensions, Step, Transform, Transformed, Validate};
use crate::error::{StepError, StepOutcome};
use crate::types::StepResult;

/// Collapse color to a single 8-bit luma channel.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Grayscale {}

impl Step for Grayscale {
    const NAME: &'static str = "grayscale";
}

impl Transform for Grayscale {
    fn transform(&self, image: &DynamicImage) -> StepOutcome<Transformed> {
        pixels::ensure_not_empty(image)?;
        let gray = match image {
            DynamicImage::ImageLuma8(_) => image.clone(),
            other => DynamicImage::ImageLuma8(other.to_luma8()),
        };
        Ok(Transformed::new(gray))
    }
}

impl Validate for Grayscale {
    fn validate(&self, _original: &DynamicImage, output: &Transformed) -> StepOutcome<StepResult> {
        let channels = output.image.color().channel_count();
        Ok(StepResult::check(Self::NAME, channels == 1).with_metric("channels", channels))
    }
}

/// Complement every color sample; alpha is kept as is.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Invert {}

impl Step for Invert {
    const NAME: &'static str = "invert";
}

impl Transform for Invert {
    fn transform(&self, image: &DynamicImage) -> StepOutcome<Transformed> {
        pixels::require_u8(image, "invert needs 8-bit samples")?;
        let inverted = pixels::map_color_channels(image, pixels::invert_plane)?;
        Ok(Transformed::new(inverted))
    }
}

impl Validate for Invert {
    fn validate(&self, original: &DynamicImage, output: &Transformed) -> StepOutcome<StepResult> {
        if !same_dimensions(original, &output.image) || original.color() != output.image.color()
        {
            return Ok(StepResult::failure(Self::NAME));
        }
        let (before, after) = match (
            pixels::split_channels(original),
            pixels::split_channels(&output.image),
        ) {
            (Ok(before), Ok(after)) => (before, after),
            _ => return Ok(StepResult::failure(Self::NAME)),
        };

        let color = pixels::color_channels(original);
        let mismatched: usize = before
            .iter()
            .zip(after.iter())
            .take(color)
            .map(|(b, a)| {
                b.pixels()
                    .zip(a.pixels())
                    .filter(|(pb, pa)| 255 - pb.0[0] != pa.0[0])
                    .count()
            })
            .sum();

        Ok(StepResult::check(Self::NAME, mismatched == 0).with_metric("mismatched_pixels", mismatched))
    }
}

/// Power-law intensity correction through a lookup table.
///
/// The table maps `i` to `(i / 255)^(1 / gamma) * 255`, so `gamma > 1`
/// brightens and `gamma < 1` darkens.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GammaCorrection {
    pub gamma: f64,
}

impl Default for GammaCorrection {
    fn default() -> Self {
        Self { gamma: 1.0 }
    }
}

impl GammaCorrection {
    fn lookup_table(&self) -> [u8; 256] {
        let mut lut = [0u8; 256];
        for (i, entry) in lut.iter_mut().enumerate() {
            // Truncation matches an integer cast of the float table.
            *entry = ((i as f64 / 255.0).powf(1.0 / self.gamma) * 255.0) as u8;
        }
        lut
    }
}

impl Step for GammaCorrection {
    const NAME: &'static str = "gamma_correction";
}

impl Transform for GammaCorrection {
    fn check(&self) -> StepOutcome<()> {
        if !self.gamma.is_finite() || self.gamma <= 0.0 {
            return Err(StepError::invalid(
                "gamma",
                format!("must be a positive number, got {}", self.gamma),
            ));
        }
        Ok(())
    }

    fn transform(&self, image: &DynamicImage) -> StepOutcome<Transformed> {
        self.check()?;
        pixels::require_u8(image, "gamma correction needs 8-bit samples")?;
        let lut = self.lookup_table();
        let corrected = pixels::map_color_channels(image, |plane| pixels::apply_lut(plane, &lut))?;
        Ok(Transformed::new(corrected))
    }
}

impl Validate for GammaCorrection {
    fn validate(&self, original: &DynamicImage, output: &Transformed) -> StepOutcome<StepResult> {
        let in_mean = pixels::mean(pixels::samples_u8(original).iter().map(|&v| v as f64));
        let out_mean = pixels::mean(pixels::samples_u8(&output.image).iter().map(|&v| v as f64));

        let passed = (self.gamma > 1.0 && out_mean >= in_mean)
            || (self.gamma < 1.0 && out_mean <= in_mean)
            || self.gamma == 1.0;

        Ok(StepResult::check(Self::NAME, passed)
            .with_metric("input_mean", pixels::round2(in_mean))
            .with_metric("output_mean", pixels::round2(out_mean)))
    }
}

/// Linear min-max rescale of all samples into `[alpha, beta]`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Normalization {
    pub alpha: i64,
    pub beta: i64,
}

impl Default for Normalization {
    fn default() -> Self {
        Self {
            alpha: 0,
            beta: 255,
        }
    }
}

impl Normalization {
    fn range(&self) -> (f64, f64) {
        let lo = self.alpha.min(self.beta) as f64;
        let hi = self.alpha.max(self.beta) as f64;
        (lo, hi)
    }
}

impl Step for Normalization {
    const NAME: &'static str = "normalization";
}

impl Transform for Normalization {
    fn check(&self) -> StepOutcome<()> {
        for (param, value) in [("alpha", self.alpha), ("beta", self.beta)] {
            if !(0..=255).contains(&value) {
                return Err(StepError::invalid(
                    param,
                    format!("must be within 0..=255, got {value}"),
                ));
            }
        }
        Ok(())
    }

    fn transform(&self, image: &DynamicImage) -> StepOutcome<Transformed> {
        self.check()?;
        pixels::require_u8(image, "normalization needs 8-bit samples")?;

        let bytes = image.as_bytes();
        let smin = bytes.iter().copied().min().unwrap_or(0) as f64;
        let smax = bytes.iter().copied().max().unwrap_or(0) as f64;
        let (lo, hi) = self.range();
        let scale = if smax > smin {
            (hi - lo) / (smax - smin)
        } else {
            0.0
        };
        let shift = lo - smin * scale;

        let mut lut = [0u8; 256];
        for (i, entry) in lut.iter_mut().enumerate() {
            *entry = pixels::clamp_u8(i as f64 * scale + shift);
        }
        let normalized = pixels::map_channels(image, |plane| pixels::apply_lut(plane, &lut))?;
        Ok(Transformed::new(normalized))
    }
}

impl Validate for Normalization {
    fn validate(&self, _original: &DynamicImage, output: &Transformed) -> StepOutcome<StepResult> {
        let samples = pixels::samples_u8(&output.image);
        let (min, max) = match (samples.iter().min(), samples.iter().max()) {
            (Some(&min), Some(&max)) => (min, max),
            _ => return Ok(StepResult::failure(Self::NAME)),
        };
        let (lo, hi) = self.range();
        let passed = min as f64 >= lo && max as f64 <= hi;
        Ok(StepResult::check(Self::NAME, passed)
            .with_metric("min_val", min)
            .with_metric("max_val", max))
    }
}

/// Histogram equalization of the luma channel.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HistEqualization {}

impl Step for HistEqualization {
    const NAME: &'static str = "hist_equalization";
}

impl Transform for HistEqualization {
    fn transform(&self, image: &DynamicImage) -> StepOutcome<Transformed> {
        pixels::ensure_not_empty(image)?;
        let equalized = match image {
            DynamicImage::ImageLuma8(gray) => {
                DynamicImage::ImageLuma8(imageproc::contrast::equalize_histogram(gray))
            }
            DynamicImage::ImageRgb8(rgb) => DynamicImage::ImageRgb8(equalize_rgb(rgb)),
            other => {
                return Err(StepError::UnsupportedPixelType {
                    color: other.color(),
                    reason: "expected 1-channel or 3-channel 8-bit input",
                })
            }
        };
        Ok(Transformed::new(equalized))
    }
}

/// Equalize luma and keep chroma.
fn equalize_rgb(rgb: &RgbImage) -> RgbImage {
    let (width, height) = rgb.dimensions();
    let ycbcr: Vec<[f64; 3]> = rgb
        .pixels()
        .map(|p| pixels::rgb_to_ycbcr(p.0[0], p.0[1], p.0[2]))
        .collect();
    let luma = GrayImage::from_fn(width, height, |x, y| {
        Luma([pixels::clamp_u8(ycbcr[(y * width + x) as usize][0])])
    });
    let equalized = imageproc::contrast::equalize_histogram(&luma);

    RgbImage::from_fn(width, height, |x, y| {
        let [_, cb, cr] = ycbcr[(y * width + x) as usize];
        let luma = equalized.get_pixel(x, y).0[0] as f64;
        Rgb(pixels::ycbcr_to_rgb(luma, cb, cr))
    })
}

impl Validate for HistEqualization {
    fn validate(&self, original: &DynamicImage, output: &Transformed) -> StepOutcome<StepResult> {
        let as_f64 = |image: &DynamicImage| -> Vec<f64> {
            pixels::samples_u8(image).iter().map(|&v| v as f64).collect()
        };
        let in_var = pixels::variance(&as_f64(original));
        let out_var = pixels::variance(&as_f64(&output.image));
        // Contrast may legitimately drop on already-equalized input.
        Ok(StepResult::success(Self::NAME)
            .with_metric("input_variance", pixels::round2(in_var))
            .with_metric("output_variance", pixels::round2(out_var)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{LumaA, Rgba, RgbaImage};

    fn ramp() -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_fn(16, 4, |x, _| Luma([(x * 10 + 40) as u8])))
    }

    #[test]
    fn test_grayscale_collapses_rgb() {
        let rgb = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([10, 200, 30])));
        let out = Grayscale {}.transform(&rgb).unwrap();
        assert_eq!(out.image.color().channel_count(), 1);
        let result = Grayscale {}.validate(&rgb, &out).unwrap();
        assert!(result.is_success());
        assert_eq!(result.metrics["channels"], 1);
    }

    #[test]
    fn test_grayscale_passes_gray_through() {
        let gray = ramp();
        let out = Grayscale {}.transform(&gray).unwrap();
        assert_eq!(out.image, gray);
    }

    #[test]
    fn test_grayscale_rejects_empty() {
        let empty = DynamicImage::new_rgb8(0, 0);
        assert!(matches!(
            Grayscale {}.transform(&empty).unwrap_err(),
            StepError::EmptyImage
        ));
    }

    #[test]
    fn test_invert_preserves_alpha() {
        let rgba = DynamicImage::ImageRgba8(RgbaImage::from_pixel(3, 3, Rgba([10, 20, 30, 77])));
        let out = Invert {}.transform(&rgba).unwrap();
        assert_eq!(out.image.to_rgba8().get_pixel(1, 1).0, [245, 235, 225, 77]);
        let result = Invert {}.validate(&rgba, &out).unwrap();
        assert!(result.is_success());
        assert_eq!(result.metrics["mismatched_pixels"], 0);
    }

    #[test]
    fn test_invert_gray_alpha_keeps_alpha() {
        let la = DynamicImage::ImageLumaA8(image::ImageBuffer::from_pixel(2, 2, LumaA([0u8, 128])));
        let out = Invert {}.transform(&la).unwrap();
        assert_eq!(out.image.to_luma_alpha8().get_pixel(0, 0).0, [255, 128]);
    }

    #[test]
    fn test_invert_rejects_16_bit() {
        let wide = DynamicImage::new_luma16(4, 4);
        assert!(matches!(
            Invert {}.transform(&wide).unwrap_err(),
            StepError::UnsupportedPixelType { .. }
        ));
    }

    #[test]
    fn test_gamma_brightens_and_validates() {
        let step = GammaCorrection { gamma: 2.2 };
        let input = ramp();
        let out = step.transform(&input).unwrap();
        let result = step.validate(&input, &out).unwrap();
        assert!(result.is_success());
        assert!(result.metrics["output_mean"].as_f64() >= result.metrics["input_mean"].as_f64());
    }

    #[test]
    fn test_gamma_lut_endpoints() {
        let lut = GammaCorrection { gamma: 0.5 }.lookup_table();
        assert_eq!(lut[0], 0);
        assert_eq!(lut[255], 255);
    }

    #[test]
    fn test_gamma_rejects_non_positive() {
        assert!(GammaCorrection { gamma: 0.0 }.check().is_err());
        assert!(GammaCorrection { gamma: -1.0 }.check().is_err());
        assert!(GammaCorrection { gamma: f64::NAN }.check().is_err());
    }

    #[test]
    fn test_gamma_non_numeric_fails_to_parse() {
        let table: toml::Table = toml::from_str("gamma = \"bright\"").unwrap();
        let parsed: Result<GammaCorrection, _> = toml::Value::Table(table).try_into();
        assert!(parsed.is_err());
    }

    #[test]
    fn test_normalization_stretches_range() {
        let step = Normalization::default();
        let input = ramp();
        let out = step.transform(&input).unwrap();
        let result = step.validate(&input, &out).unwrap();
        assert!(result.is_success());
        assert_eq!(result.metrics["min_val"], 0);
        assert_eq!(result.metrics["max_val"], 255);
    }

    #[test]
    fn test_normalization_uniform_maps_to_lower_bound() {
        let step = Normalization {
            alpha: 200,
            beta: 50,
        };
        let flat = DynamicImage::ImageLuma8(GrayImage::from_pixel(4, 4, Luma([99])));
        let out = step.transform(&flat).unwrap();
        assert!(out.image.as_bytes().iter().all(|&v| v == 50));
        assert!(step.validate(&flat, &out).unwrap().is_success());
    }

    #[test]
    fn test_normalization_range_checked() {
        let step = Normalization {
            alpha: 0,
            beta: 300,
        };
        assert!(step.check().is_err());
    }

    #[test]
    fn test_hist_equalization_gray_and_rgb() {
        let gray = ramp();
        let out = HistEqualization {}.transform(&gray).unwrap();
        assert_eq!(out.image.color(), gray.color());
        assert!(HistEqualization {}.validate(&gray, &out).unwrap().is_success());

        let rgb = DynamicImage::ImageRgb8(RgbImage::from_fn(8, 8, |x, y| {
            Rgb([(x * 20) as u8, (y * 20) as u8, 100])
        }));
        let out = HistEqualization {}.transform(&rgb).unwrap();
        assert_eq!(out.image.color(), rgb.color());
    }

    #[test]
    fn test_hist_equalization_rejects_rgba() {
        let rgba = DynamicImage::new_rgba8(4, 4);
        assert!(HistEqualization {}.transform(&rgba).is_err());
    }
}
