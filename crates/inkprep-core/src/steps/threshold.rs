//! Global and adaptive binarization.

use image::{DynamicImage, GrayImage, Luma};
use imageproc::contrast::{otsu_level, threshold, ThresholdType};
use imageproc::filter::{box_filter, gaussian_blur_f32};
use serde::Deserialize;

use super::pixels;
use super::{validate_binary, Derived, Step, Transform, Transformed, Validate};
use crate::error::{StepError, StepOutcome};
use crate::types::StepResult;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdMethod {
    /// Level chosen from the histogram
    #[default]
    Otsu,
    /// Level given by `threshold_value`
    #[serde(alias = "fixed")]
    Binary,
}

/// Global threshold: samples above the level become white, the rest black.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Threshold {
    pub method: ThresholdMethod,
    pub threshold_value: i64,
}

impl Step for Threshold {
    const NAME: &'static str = "threshold";
}

impl Transform for Threshold {
    fn check(&self) -> StepOutcome<()> {
        if !(0..=255).contains(&self.threshold_value) {
            return Err(StepError::invalid(
                "threshold_value",
                format!("{} is out of range (0-255)", self.threshold_value),
            ));
        }
        Ok(())
    }

    fn transform(&self, image: &DynamicImage) -> StepOutcome<Transformed> {
        self.check()?;
        let gray = pixels::to_gray8(image)?;
        let level = match self.method {
            ThresholdMethod::Otsu => otsu_level(&gray),
            ThresholdMethod::Binary => self.threshold_value as u8,
        };
        tracing::trace!(level, method = ?self.method, "threshold level");

        let binary = threshold(&gray, level, ThresholdType::Binary);
        Ok(Transformed::with_derived(
            DynamicImage::ImageLuma8(binary),
            Derived {
                threshold_value: Some(level),
                ..Derived::default()
            },
        ))
    }
}

impl Validate for Threshold {
    fn validate(&self, _original: &DynamicImage, output: &Transformed) -> StepOutcome<StepResult> {
        Ok(validate_binary(Self::NAME, &output.image))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdaptiveMethod {
    /// Unweighted neighbourhood mean
    Mean,
    /// Gaussian-weighted neighbourhood mean
    #[default]
    Gaussian,
}

/// Local threshold: each pixel is compared with its neighbourhood mean
/// minus `c`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdaptiveThreshold {
    pub method: AdaptiveMethod,
    pub block_size: i64,
    #[serde(alias = "C")]
    pub c: f64,
}

impl Default for AdaptiveThreshold {
    fn default() -> Self {
        Self {
            method: AdaptiveMethod::Gaussian,
            block_size: 11,
            c: 2.0,
        }
    }
}

impl AdaptiveThreshold {
    fn block(&self) -> i64 {
        pixels::odd(self.block_size)
    }

    fn local_means(&self, gray: &GrayImage) -> GrayImage {
        let block = self.block();
        match self.method {
            AdaptiveMethod::Mean => box_filter(gray, (block / 2) as u32, (block / 2) as u32),
            AdaptiveMethod::Gaussian => {
                let sigma = 0.3 * ((block as f64 - 1.0) * 0.5 - 1.0) + 0.8;
                gaussian_blur_f32(gray, sigma as f32)
            }
        }
    }
}

impl Step for AdaptiveThreshold {
    const NAME: &'static str = "adaptive_threshold";
}

impl Transform for AdaptiveThreshold {
    fn check(&self) -> StepOutcome<()> {
        if self.block() < 3 {
            return Err(StepError::invalid(
                "block_size",
                format!("must be at least 3, got {}", self.block_size),
            ));
        }
        if !self.c.is_finite() {
            return Err(StepError::invalid("c", "must be a finite number"));
        }
        Ok(())
    }

    fn transform(&self, image: &DynamicImage) -> StepOutcome<Transformed> {
        self.check()?;
        let gray = pixels::to_gray8(image)?;
        let means = self.local_means(&gray);

        let binary = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
            let src = gray.get_pixel(x, y).0[0] as f64;
            let local = means.get_pixel(x, y).0[0] as f64;
            Luma([if src > local - self.c { 255 } else { 0 }])
        });
        Ok(Transformed::new(DynamicImage::ImageLuma8(binary)))
    }
}

impl Validate for AdaptiveThreshold {
    fn validate(&self, _original: &DynamicImage, output: &Transformed) -> StepOutcome<StepResult> {
        Ok(validate_binary(Self::NAME, &output.image))
    }
}
