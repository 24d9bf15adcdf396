//! Steps that operate on binarized ink: skeletonization and speck removal.
//!
//! Both binarize with Otsu's method unless the input is already two-level,
//! and treat dark pixels as foreground.

use std::collections::HashMap;

use image::{DynamicImage, GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::morphology::{dilate, erode};
use imageproc::region_labelling::{connected_components, Connectivity};
use serde::Deserialize;

use super::pixels;
use super::{Derived, Step, Transform, Transformed, Validate};
use crate::error::{StepError, StepOutcome};
use crate::types::StepResult;

/// Hard ceiling on thinning passes.
pub const MAX_SKELETON_ITERATIONS: usize = 1000;

/// Morphological skeleton of the dark regions.
///
/// The output is always single-channel, whatever the input layout: a
/// skeleton is binary, so color channels would only repeat it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Skeletonize {}

impl Step for Skeletonize {
    const NAME: &'static str = "skeletonize";
}

/// Skeleton of `gray` plus the percentage of foreground removed.
fn skeletonize_plane(gray: &GrayImage, limit: usize) -> StepOutcome<(GrayImage, f64)> {
    let binary = pixels::binarize_otsu_fallback(gray);
    let mut remaining = pixels::invert_plane(&binary);
    let mut skeleton = GrayImage::new(gray.width(), gray.height());

    let mut iterations = 0;
    loop {
        // L1 radius 1 is the 3x3 cross.
        let eroded = erode(&remaining, Norm::L1, 1);
        let opened = dilate(&eroded, Norm::L1, 1);
        for ((s, r), o) in skeleton
            .pixels_mut()
            .zip(remaining.pixels())
            .zip(opened.pixels())
        {
            s.0[0] |= r.0[0].saturating_sub(o.0[0]);
        }
        remaining = eroded;

        iterations += 1;
        if iterations > limit {
            return Err(StepError::IterationLimit { limit });
        }
        if remaining.pixels().all(|p| p.0[0] == 0) {
            break;
        }
    }
    tracing::trace!(iterations, "skeleton converged");

    let result = pixels::invert_plane(&skeleton);
    let orig_fg = binary.pixels().filter(|p| p.0[0] == 0).count();
    let skel_fg = result.pixels().filter(|p| p.0[0] == 0).count();
    let reduction = if orig_fg > 0 {
        (orig_fg - skel_fg) as f64 / orig_fg as f64 * 100.0
    } else {
        0.0
    };
    Ok((result, reduction))
}

impl Transform for Skeletonize {
    fn transform(&self, image: &DynamicImage) -> StepOutcome<Transformed> {
        let gray = pixels::to_gray8(image)?;
        let (skeleton, reduction) = skeletonize_plane(&gray, MAX_SKELETON_ITERATIONS)?;
        Ok(Transformed::with_derived(
            DynamicImage::ImageLuma8(skeleton),
            Derived {
                reduction_percent: Some(reduction),
                ..Derived::default()
            },
        ))
    }
}

impl Validate for Skeletonize {
    fn validate(&self, _original: &DynamicImage, output: &Transformed) -> StepOutcome<StepResult> {
        Ok(match output.derived.reduction_percent {
            Some(reduction) => StepResult::success(Self::NAME)
                .with_metric("reduction_percent", pixels::round2(reduction)),
            None => StepResult::failure(Self::NAME),
        })
    }
}

/// Drop 8-connected dark components smaller than `min_size` pixels.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RemoveSmallComponents {
    pub min_size: i64,
}

impl Default for RemoveSmallComponents {
    fn default() -> Self {
        Self { min_size: 5 }
    }
}

impl Step for RemoveSmallComponents {
    const NAME: &'static str = "remove_small_components";
}

impl Transform for RemoveSmallComponents {
    fn check(&self) -> StepOutcome<()> {
        if self.min_size < 0 {
            return Err(StepError::invalid(
                "min_size",
                format!("must not be negative, got {}", self.min_size),
            ));
        }
        Ok(())
    }

    fn transform(&self, image: &DynamicImage) -> StepOutcome<Transformed> {
        self.check()?;
        let gray = pixels::to_gray8(image)?;
        let ink = pixels::invert_plane(&pixels::binarize_otsu_fallback(&gray));
        let labels = connected_components(&ink, Connectivity::Eight, Luma([0u8]));

        let mut areas: HashMap<u32, i64> = HashMap::new();
        for label in labels.pixels().map(|p| p.0[0]).filter(|&l| l != 0) {
            *areas.entry(label).or_insert(0) += 1;
        }
        let removed = areas.values().filter(|&&area| area < self.min_size).count();

        let cleaned = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
            let label = labels.get_pixel(x, y).0[0];
            let keep = label != 0 && areas.get(&label).is_some_and(|&a| a >= self.min_size);
            Luma([if keep { 0 } else { 255 }])
        });
        tracing::trace!(components = areas.len(), removed, "component filter");

        Ok(Transformed::with_derived(
            DynamicImage::ImageLuma8(cleaned),
            Derived {
                removed_components: Some(removed),
                ..Derived::default()
            },
        ))
    }
}

impl Validate for RemoveSmallComponents {
    fn validate(&self, original: &DynamicImage, output: &Transformed) -> StepOutcome<StepResult> {
        let before = pixels::count_samples(original, 0) as i64;
        let after = pixels::count_samples(&output.image, 0) as i64;
        let removed = before - after;
        Ok(StepResult::check(Self::NAME, removed >= 0)
            .with_metric("removed_pixels", removed.max(0))
            .with_metric(
                "removed_components",
                output.derived.removed_components.unwrap_or(0),
            ))
    }
}
