//! Step library: named image transforms with paired validators.
//!
//! Every step is a parameter struct deserialized from the `params` table of
//! its [`StepConfig`](crate::config::StepConfig). The struct implements
//! [`Transform`] to produce a new image and [`Validate`] to check the
//! transform's postcondition. Values measured during the transform (a skew
//! angle, a new size) travel to the validator in [`Derived`].

mod binary;
mod color;
mod deskew;
mod filter;
mod geometry;
mod morphology;
mod nlmeans;
pub(crate) mod pixels;
mod threshold;

pub use binary::{RemoveSmallComponents, Skeletonize};
pub use color::{GammaCorrection, Grayscale, HistEqualization, Invert, Normalization};
pub use deskew::Deskew;
pub use filter::{GaussianBlur, MedianBlur, Sharpen};
pub use geometry::{Crop, Resize};
pub use morphology::{Dilate, Erode, KernelShape, MorphClose, MorphOpen, Target};
pub use nlmeans::NlMeansDenoise;
pub use threshold::{AdaptiveMethod, AdaptiveThreshold, Threshold, ThresholdMethod};

use image::DynamicImage;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StepOutcome;
use crate::types::StepResult;

/// Values a transform measured or decided, handed to the same step's
/// validator for the same image.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Derived {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_angle: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resized: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reduction_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold_value: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed_components: Option<usize>,
}

/// Output of a transform.
#[derive(Debug, Clone)]
pub struct Transformed {
    pub image: DynamicImage,
    pub derived: Derived,
}

impl Transformed {
    /// An output with nothing derived.
    pub fn new(image: DynamicImage) -> Self {
        Self {
            image,
            derived: Derived::default(),
        }
    }

    /// An output with derived values.
    pub fn with_derived(image: DynamicImage, derived: Derived) -> Self {
        Self { image, derived }
    }
}

/// The image-producing half of a step.
pub trait Transform: Send + Sync {
    /// Produce a new image from `image`.
    ///
    /// Fails on empty images, out-of-range parameters and pixel types the
    /// step cannot handle; never returns silently wrong output.
    fn transform(&self, image: &DynamicImage) -> StepOutcome<Transformed>;

    /// Range-check the parameters without touching an image.
    ///
    /// Called once when the pipeline is planned.
    fn check(&self) -> StepOutcome<()> {
        Ok(())
    }
}

/// The postcondition-checking half of a step.
pub trait Validate: Send + Sync {
    /// Compare the transform's input and output and report pass/fail plus
    /// metrics. Checks that cannot be computed yield a failure result rather
    /// than an error.
    fn validate(&self, original: &DynamicImage, output: &Transformed) -> StepOutcome<StepResult>;
}

/// A complete step: typed parameters, transform and validator under one name.
pub trait Step: Transform + Validate + DeserializeOwned + 'static {
    /// Name used in configuration files and reports.
    const NAME: &'static str;
}

/// Shared validator for the two thresholding steps.
pub(crate) fn validate_binary(step: &str, output: &DynamicImage) -> StepResult {
    let samples = pixels::samples_u8(output);
    let mut present = [false; 256];
    for &v in samples.iter() {
        present[v as usize] = true;
    }
    let binary = present
        .iter()
        .enumerate()
        .all(|(v, &seen)| !seen || v == 0 || v == 255);

    if binary {
        let black = samples.iter().filter(|&&v| v == 0).count();
        let percent = if samples.is_empty() {
            0.0
        } else {
            black as f64 / samples.len() as f64 * 100.0
        };
        StepResult::success(step).with_metric("black_pixels_percent", pixels::round2(percent))
    } else {
        let unique: Vec<u8> = (0..=255u8).filter(|&v| present[v as usize]).collect();
        StepResult::failure(step).with_metric("unique_values", unique)
    }
}

/// Shared validator for the blur steps: shape and pixel type are unchanged.
pub(crate) fn validate_same_shape(
    step: &str,
    original: &DynamicImage,
    output: &DynamicImage,
) -> StepResult {
    if same_dimensions(original, output) && original.color() == output.color() {
        let a = pixels::samples_u8(original);
        let b = pixels::samples_u8(output);
        let diffs: Vec<f64> = a
            .iter()
            .zip(b.iter())
            .map(|(&x, &y)| (x as f64 - y as f64).abs())
            .collect();
        StepResult::success(step)
            .with_metric("diff_variance", pixels::round2(pixels::variance(&diffs)))
    } else {
        StepResult::failure(step)
    }
}

pub(crate) fn same_dimensions(a: &DynamicImage, b: &DynamicImage) -> bool {
    a.width() == b.width() && a.height() == b.height()
}
