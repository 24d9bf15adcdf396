//! Morphological steps: dilate, erode, opening and closing.
//!
//! `target = "dark"` (the default) inverts the image around the primitive so
//! that the operation always acts on ink rather than paper.

use image::{DynamicImage, GrayImage, Luma};
use imageproc::morphology::{grayscale_dilate, grayscale_erode, Mask};
use serde::Deserialize;

use super::pixels;
use super::{Step, Transform, Transformed, Validate};
use crate::error::{StepError, StepOutcome};
use crate::types::StepResult;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KernelShape {
    #[default]
    Rect,
    Ellipse,
    Cross,
}

/// Which regions count as foreground.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    /// Dark pixels (ink on paper)
    #[default]
    Dark,
    /// Bright pixels
    Bright,
}

impl Target {
    fn foreground_value(self) -> u8 {
        match self {
            Target::Dark => 0,
            Target::Bright => 255,
        }
    }

    fn foreground(self, image: &DynamicImage) -> i64 {
        pixels::count_samples(image, self.foreground_value()) as i64
    }
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Erode,
    Dilate,
}

/// Largest kernel side a [`Mask`] can hold.
pub const MAX_KSIZE: i64 = 511;

/// OpenCV-style structuring element of side `ksize`, centered.
fn structuring_element(shape: KernelShape, ksize: i64) -> Mask {
    let ksize = ksize.clamp(1, MAX_KSIZE);
    let r = ksize / 2;
    let side = ksize as u32;
    let kernel = GrayImage::from_fn(side, side, |col, row| {
        let (col, row) = (col as i64, row as i64);
        let inside = match shape {
            KernelShape::Rect => true,
            KernelShape::Cross => row == r || col == r,
            KernelShape::Ellipse => {
                let dy = row - r;
                let dx = if r == 0 {
                    0
                } else {
                    let ratio = (r * r - dy * dy) as f64 / (r * r) as f64;
                    (r as f64 * ratio.max(0.0).sqrt()).round() as i64
                };
                (r - dx..=r + dx).contains(&col)
            }
        };
        Luma([if inside { 255 } else { 0 }])
    });
    Mask::from_image(&kernel, r as u8, r as u8)
}

fn morph_plane(plane: &GrayImage, mask: &Mask, op: Op) -> GrayImage {
    match op {
        Op::Erode => grayscale_erode(plane, mask),
        Op::Dilate => grayscale_dilate(plane, mask),
    }
}

/// Run `ops` in order, `iterations` times each, on every channel.
fn morph_image(
    image: &DynamicImage,
    shape: KernelShape,
    ksize: i64,
    target: Target,
    ops: &[Op],
    iterations: i64,
) -> StepOutcome<DynamicImage> {
    pixels::require_u8(image, "morphology needs 8-bit samples")?;
    let mask = structuring_element(shape, ksize);
    pixels::map_channels(image, |plane| {
        let mut current = match target {
            Target::Dark => pixels::invert_plane(plane),
            Target::Bright => plane.clone(),
        };
        for &op in ops {
            for _ in 0..iterations {
                current = morph_plane(&current, &mask, op);
            }
        }
        match target {
            Target::Dark => pixels::invert_plane(&current),
            Target::Bright => current,
        }
    })
}

fn check_kernel(ksize: i64) -> StepOutcome<()> {
    if ksize <= 0 {
        return Err(StepError::invalid(
            "ksize",
            format!("kernel size must be a positive odd integer, got {ksize}"),
        ));
    }
    if pixels::odd(ksize) > MAX_KSIZE {
        return Err(StepError::invalid(
            "ksize",
            format!("kernel size {ksize} exceeds {MAX_KSIZE}"),
        ));
    }
    Ok(())
}

fn check_iterations(iterations: i64) -> StepOutcome<()> {
    if iterations < 1 {
        return Err(StepError::invalid(
            "iterations",
            format!("must be at least 1, got {iterations}"),
        ));
    }
    Ok(())
}

/// Result reporting foreground pixels gained.
fn added_result(
    step: &str,
    target: Target,
    original: &DynamicImage,
    output: &DynamicImage,
) -> StepResult {
    let added = target.foreground(output) - target.foreground(original);
    StepResult::check(step, added >= 0).with_metric("added_pixels", added.max(0))
}

/// Result reporting foreground pixels lost.
fn removed_result(
    step: &str,
    target: Target,
    original: &DynamicImage,
    output: &DynamicImage,
) -> StepResult {
    let removed = target.foreground(original) - target.foreground(output);
    StepResult::check(step, removed >= 0).with_metric("removed_pixels", removed.max(0))
}

/// Grow the target regions.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Dilate {
    pub ksize: i64,
    pub kernel_shape: KernelShape,
    pub target: Target,
    pub iterations: i64,
}

impl Default for Dilate {
    fn default() -> Self {
        Self {
            ksize: 3,
            kernel_shape: KernelShape::Rect,
            target: Target::Dark,
            iterations: 1,
        }
    }
}

impl Step for Dilate {
    const NAME: &'static str = "dilate";
}

impl Transform for Dilate {
    fn check(&self) -> StepOutcome<()> {
        check_kernel(self.ksize)?;
        check_iterations(self.iterations)
    }

    fn transform(&self, image: &DynamicImage) -> StepOutcome<Transformed> {
        self.check()?;
        pixels::require_u8(image, "dilate needs 8-bit samples")?;
        let mut ksize = pixels::odd(self.ksize);
        // Nearly blank images get a larger kernel so the effect is visible.
        let nonzero = image.as_bytes().iter().filter(|&&v| v != 0).count();
        if nonzero < 10 && ksize < 5 {
            ksize = 5;
        }
        let dilated = morph_image(
            image,
            self.kernel_shape,
            ksize,
            self.target,
            &[Op::Dilate],
            self.iterations,
        )?;
        Ok(Transformed::new(dilated))
    }
}

impl Validate for Dilate {
    fn validate(&self, original: &DynamicImage, output: &Transformed) -> StepOutcome<StepResult> {
        Ok(added_result(Self::NAME, self.target, original, &output.image))
    }
}

/// Shrink the target regions.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Erode {
    pub ksize: i64,
    pub kernel_shape: KernelShape,
    pub target: Target,
    pub iterations: i64,
}

impl Default for Erode {
    fn default() -> Self {
        Self {
            ksize: 3,
            kernel_shape: KernelShape::Rect,
            target: Target::Dark,
            iterations: 1,
        }
    }
}

impl Step for Erode {
    const NAME: &'static str = "erode";
}

impl Transform for Erode {
    fn check(&self) -> StepOutcome<()> {
        check_kernel(self.ksize)?;
        check_iterations(self.iterations)
    }

    fn transform(&self, image: &DynamicImage) -> StepOutcome<Transformed> {
        self.check()?;
        let eroded = morph_image(
            image,
            self.kernel_shape,
            pixels::odd(self.ksize),
            self.target,
            &[Op::Erode],
            self.iterations,
        )?;
        Ok(Transformed::new(eroded))
    }
}

impl Validate for Erode {
    fn validate(&self, original: &DynamicImage, output: &Transformed) -> StepOutcome<StepResult> {
        Ok(removed_result(Self::NAME, self.target, original, &output.image))
    }
}

/// Erode then dilate: removes specks smaller than the kernel.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MorphOpen {
    pub ksize: i64,
    pub kernel_shape: KernelShape,
    pub target: Target,
}

impl Default for MorphOpen {
    fn default() -> Self {
        Self {
            ksize: 3,
            kernel_shape: KernelShape::Rect,
            target: Target::Dark,
        }
    }
}

impl Step for MorphOpen {
    const NAME: &'static str = "morph_open";
}

impl Transform for MorphOpen {
    fn check(&self) -> StepOutcome<()> {
        check_kernel(self.ksize)
    }

    fn transform(&self, image: &DynamicImage) -> StepOutcome<Transformed> {
        self.check()?;
        let opened = morph_image(
            image,
            self.kernel_shape,
            pixels::odd(self.ksize),
            self.target,
            &[Op::Erode, Op::Dilate],
            1,
        )?;
        Ok(Transformed::new(opened))
    }
}

impl Validate for MorphOpen {
    fn validate(&self, original: &DynamicImage, output: &Transformed) -> StepOutcome<StepResult> {
        Ok(removed_result(Self::NAME, self.target, original, &output.image))
    }
}

/// Dilate then erode: fills gaps narrower than the kernel.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MorphClose {
    pub ksize: i64,
    pub kernel_shape: KernelShape,
    pub target: Target,
}

impl Default for MorphClose {
    fn default() -> Self {
        Self {
            ksize: 3,
            kernel_shape: KernelShape::Rect,
            target: Target::Dark,
        }
    }
}

impl Step for MorphClose {
    const NAME: &'static str = "morph_close";
}

impl Transform for MorphClose {
    fn check(&self) -> StepOutcome<()> {
        check_kernel(self.ksize)
    }

    fn transform(&self, image: &DynamicImage) -> StepOutcome<Transformed> {
        self.check()?;
        let closed = morph_image(
            image,
            self.kernel_shape,
            pixels::odd(self.ksize),
            self.target,
            &[Op::Dilate, Op::Erode],
            1,
        )?;
        Ok(Transformed::new(closed))
    }
}

impl Validate for MorphClose {
    fn validate(&self, original: &DynamicImage, output: &Transformed) -> StepOutcome<StepResult> {
        Ok(added_result(Self::NAME, self.target, original, &output.image))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// White page with a 3x3 black square and one isolated black pixel.
    fn page() -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_fn(15, 15, |x, y| {
            let square = (5..8).contains(&x) && (5..8).contains(&y);
            let speck = x == 12 && y == 2;
            Luma([if square || speck { 0 } else { 255 }])
        }))
    }

    fn dark(image: &DynamicImage) -> usize {
        pixels::count_samples(image, 0)
    }

    /// Footprint of a kernel: a lone bright pixel dilated once.
    fn footprint(shape: KernelShape, ksize: i64) -> usize {
        let dot = GrayImage::from_fn(11, 11, |x, y| Luma([if x == 5 && y == 5 { 255 } else { 0 }]));
        grayscale_dilate(&dot, &structuring_element(shape, ksize))
            .pixels()
            .filter(|p| p.0[0] == 255)
            .count()
    }

    #[test]
    fn test_structuring_elements() {
        assert_eq!(footprint(KernelShape::Rect, 3), 9);
        assert_eq!(footprint(KernelShape::Cross, 3), 5);
        // A 3x3 ellipse degenerates to a cross.
        assert_eq!(footprint(KernelShape::Ellipse, 3), 5);
        assert_eq!(footprint(KernelShape::Ellipse, 5), 17);
        assert_eq!(footprint(KernelShape::Rect, 1), 1);
    }

    #[test]
    fn test_dilate_dark_grows_ink() {
        let input = page();
        let step = Dilate::default();
        let out = step.transform(&input).unwrap();
        assert!(dark(&out.image) > dark(&input));
        let result = step.validate(&input, &out).unwrap();
        assert!(result.is_success());
        assert!(result.metrics["added_pixels"].as_i64().unwrap() > 0);
    }

    #[test]
    fn test_erode_dark_shrinks_ink() {
        let input = page();
        let step = Erode::default();
        let out = step.transform(&input).unwrap();
        // The 3x3 square keeps its center; the speck disappears.
        assert_eq!(dark(&out.image), 1);
        assert!(step.validate(&input, &out).unwrap().is_success());
    }

    #[test]
    fn test_erode_bright_target_grows_ink() {
        let input = page();
        let step = Erode {
            target: Target::Bright,
            ..Erode::default()
        };
        let out = step.transform(&input).unwrap();
        assert!(dark(&out.image) > dark(&input));
        assert!(step.validate(&input, &out).unwrap().is_success());
    }

    #[test]
    fn test_open_removes_speck_keeps_square() {
        let input = page();
        let step = MorphOpen::default();
        let out = step.transform(&input).unwrap();
        assert_eq!(dark(&out.image), 9);
        let result = step.validate(&input, &out).unwrap();
        assert_eq!(result.metrics["removed_pixels"], 1);
    }

    #[test]
    fn test_close_fills_gap() {
        let input = DynamicImage::ImageLuma8(GrayImage::from_fn(9, 5, |x, _| {
            Luma([if x == 4 { 255 } else { 0 }])
        }));
        let step = MorphClose::default();
        let out = step.transform(&input).unwrap();
        assert_eq!(dark(&out.image), 45);
        assert!(step.validate(&input, &out).unwrap().is_success());
    }

    #[test]
    fn test_iterations_compound() {
        let input = page();
        let once = Dilate::default().transform(&input).unwrap();
        let twice = Dilate {
            iterations: 2,
            ..Dilate::default()
        }
        .transform(&input)
        .unwrap();
        assert!(dark(&twice.image) > dark(&once.image));
    }

    #[test]
    fn test_dilate_small_foreground_bumps_kernel() {
        // Only a few non-zero samples: the kernel grows to 5x5.
        let input = DynamicImage::ImageLuma8(GrayImage::from_fn(11, 11, |x, y| {
            Luma([if x == 5 && y == 5 { 255 } else { 0 }])
        }));
        let step = Dilate {
            target: Target::Bright,
            ..Dilate::default()
        };
        let out = step.transform(&input).unwrap();
        assert_eq!(pixels::count_samples(&out.image, 255), 25);
    }

    #[test]
    fn test_kernel_shape_parses_lowercase() {
        let table: toml::Table = toml::from_str("kernel_shape = \"ellipse\"\ntarget = \"bright\"").unwrap();
        let step: MorphOpen = toml::Value::Table(table).try_into().unwrap();
        assert_eq!(step.kernel_shape, KernelShape::Ellipse);
        assert_eq!(step.target, Target::Bright);
    }

    #[test]
    fn test_invalid_kernel_rejected() {
        let step = Erode {
            ksize: 0,
            ..Erode::default()
        };
        assert!(step.check().is_err());
        let step = Dilate {
            iterations: 0,
            ..Dilate::default()
        };
        assert!(step.check().is_err());
        let step = MorphClose {
            ksize: 600,
            ..MorphClose::default()
        };
        assert!(step.check().is_err());
        let step = MorphOpen {
            ksize: 511,
            ..MorphOpen::default()
        };
        assert!(step.check().is_ok());
    }

    #[test]
    fn test_morphology_rejects_float() {
        let input = DynamicImage::new_rgb32f(4, 4);
        assert!(Erode::default().transform(&input).is_err());
    }
}
