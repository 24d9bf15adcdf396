//! Pixel-level helpers shared by the step implementations.
//!
//! Most steps operate on 8-bit samples. Multi-channel images are split into
//! one [`GrayImage`] per channel, processed, and merged back so that every
//! step can be written against single planes.

use image::{DynamicImage, GenericImageView, GrayImage, Luma, LumaA, Rgb, Rgba};
use imageproc::contrast::{otsu_level, threshold, ThresholdType};
use imageproc::filter::laplacian_filter;

use crate::error::{StepError, StepOutcome};

/// Fail with [`StepError::EmptyImage`] when either dimension is zero.
pub(crate) fn ensure_not_empty(image: &DynamicImage) -> StepOutcome<()> {
    if image.width() == 0 || image.height() == 0 {
        return Err(StepError::EmptyImage);
    }
    Ok(())
}

/// True for the four 8-bit layouts.
pub(crate) fn is_u8(image: &DynamicImage) -> bool {
    matches!(
        image,
        DynamicImage::ImageLuma8(_)
            | DynamicImage::ImageLumaA8(_)
            | DynamicImage::ImageRgb8(_)
            | DynamicImage::ImageRgba8(_)
    )
}

/// Reject empty images and images whose samples are not 8-bit.
pub(crate) fn require_u8(image: &DynamicImage, reason: &'static str) -> StepOutcome<()> {
    ensure_not_empty(image)?;
    if !is_u8(image) {
        return Err(StepError::UnsupportedPixelType {
            color: image.color(),
            reason,
        });
    }
    Ok(())
}

/// Single-channel 8-bit view of the image.
pub(crate) fn to_gray8(image: &DynamicImage) -> StepOutcome<GrayImage> {
    require_u8(image, "expected 8-bit samples")?;
    Ok(match image {
        DynamicImage::ImageLuma8(gray) => gray.clone(),
        other => other.to_luma8(),
    })
}

/// Number of channels of an 8-bit image that carry color, i.e. excluding alpha.
pub(crate) fn color_channels(image: &DynamicImage) -> usize {
    let channels = image.color().channel_count() as usize;
    if image.color().has_alpha() {
        channels - 1
    } else {
        channels
    }
}

/// Split an 8-bit image into one plane per channel.
pub(crate) fn split_channels(image: &DynamicImage) -> StepOutcome<Vec<GrayImage>> {
    require_u8(image, "expected 8-bit samples")?;
    let (width, height) = image.dimensions();
    let channels = image.color().channel_count() as usize;
    let bytes = image.as_bytes();
    Ok((0..channels)
        .map(|c| {
            GrayImage::from_fn(width, height, |x, y| {
                let idx = (y as usize * width as usize + x as usize) * channels + c;
                Luma([bytes[idx]])
            })
        })
        .collect())
}

/// Merge planes produced by [`split_channels`] back into an image.
///
/// The channel count selects the layout: 1 luma, 2 luma+alpha, 3 RGB, 4 RGBA.
pub(crate) fn merge_channels(planes: &[GrayImage]) -> DynamicImage {
    let p = |c: usize, x: u32, y: u32| planes[c].get_pixel(x, y).0[0];
    let (width, height) = planes[0].dimensions();
    match planes.len() {
        1 => DynamicImage::ImageLuma8(planes[0].clone()),
        2 => DynamicImage::ImageLumaA8(image::ImageBuffer::from_fn(width, height, |x, y| {
            LumaA([p(0, x, y), p(1, x, y)])
        })),
        3 => DynamicImage::ImageRgb8(image::ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([p(0, x, y), p(1, x, y), p(2, x, y)])
        })),
        _ => DynamicImage::ImageRgba8(image::ImageBuffer::from_fn(width, height, |x, y| {
            Rgba([p(0, x, y), p(1, x, y), p(2, x, y), p(3, x, y)])
        })),
    }
}

/// Apply `f` to every channel plane of an 8-bit image.
pub(crate) fn map_channels<F>(image: &DynamicImage, mut f: F) -> StepOutcome<DynamicImage>
where
    F: FnMut(&GrayImage) -> GrayImage,
{
    let planes: Vec<GrayImage> = split_channels(image)?.iter().map(&mut f).collect();
    Ok(merge_channels(&planes))
}

/// Apply `f` to the color planes of an 8-bit image, leaving alpha untouched.
pub(crate) fn map_color_channels<F>(image: &DynamicImage, mut f: F) -> StepOutcome<DynamicImage>
where
    F: FnMut(&GrayImage) -> GrayImage,
{
    let color = color_channels(image);
    let planes: Vec<GrayImage> = split_channels(image)?
        .into_iter()
        .enumerate()
        .map(|(c, plane)| if c < color { f(&plane) } else { plane })
        .collect();
    Ok(merge_channels(&planes))
}

/// Apply a 256-entry lookup table to every sample of a plane.
pub(crate) fn apply_lut(plane: &GrayImage, lut: &[u8; 256]) -> GrayImage {
    let mut out = plane.clone();
    for p in out.pixels_mut() {
        p.0[0] = lut[p.0[0] as usize];
    }
    out
}

/// Increment even kernel sizes so they have a center pixel.
pub(crate) fn odd(ksize: i64) -> i64 {
    if ksize % 2 == 0 {
        ksize + 1
    } else {
        ksize
    }
}

/// Both 0 and 255 occur and nothing else does.
fn is_two_level(gray: &GrayImage) -> bool {
    let (mut black, mut white) = (false, false);
    for p in gray.pixels() {
        match p.0[0] {
            0 => black = true,
            255 => white = true,
            _ => return false,
        }
    }
    black && white
}

/// Return the plane unchanged when it is already two-level, otherwise
/// binarize it with Otsu's method.
pub(crate) fn binarize_otsu_fallback(gray: &GrayImage) -> GrayImage {
    if is_two_level(gray) {
        gray.clone()
    } else {
        threshold(gray, otsu_level(gray), ThresholdType::Binary)
    }
}

pub(crate) fn invert_plane(gray: &GrayImage) -> GrayImage {
    let mut out = gray.clone();
    for p in out.pixels_mut() {
        p.0[0] = 255 - p.0[0];
    }
    out
}

/// Count samples equal to `value` across every channel.
pub(crate) fn count_samples(image: &DynamicImage, value: u8) -> usize {
    if is_u8(image) {
        image.as_bytes().iter().filter(|&&v| v == value).count()
    } else {
        image.to_luma8().pixels().filter(|p| p.0[0] == value).count()
    }
}

/// 8-bit samples of the image, converting wider types to 8-bit luma.
pub(crate) fn samples_u8(image: &DynamicImage) -> std::borrow::Cow<'_, [u8]> {
    if is_u8(image) {
        std::borrow::Cow::Borrowed(image.as_bytes())
    } else {
        std::borrow::Cow::Owned(image.to_luma8().into_raw())
    }
}

pub(crate) fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

/// Population variance.
pub(crate) fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values.iter().copied());
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}

/// Round a metric to two decimal places.
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Variance of the Laplacian response across all channels, a focus measure.
pub(crate) fn laplacian_variance(image: &DynamicImage) -> StepOutcome<f64> {
    let planes = if is_u8(image) {
        split_channels(image)?
    } else {
        ensure_not_empty(image)?;
        vec![image.to_luma8()]
    };
    let responses: Vec<f64> = planes
        .iter()
        .flat_map(|plane| laplacian_filter(plane).into_raw())
        .map(f64::from)
        .collect();
    Ok(variance(&responses))
}

/// Convert an RGB pixel to BT.601 full-range YCbCr.
pub(crate) fn rgb_to_ycbcr(r: u8, g: u8, b: u8) -> [f64; 3] {
    let (r, g, b) = (r as f64, g as f64, b as f64);
    let y = 0.299 * r + 0.587 * g + 0.114 * b;
    let cb = 128.0 + (b - y) * 0.564;
    let cr = 128.0 + (r - y) * 0.713;
    [y, cb, cr]
}

/// Inverse of [`rgb_to_ycbcr`], clamped to 8-bit.
pub(crate) fn ycbcr_to_rgb(y: f64, cb: f64, cr: f64) -> [u8; 3] {
    let r = y + 1.403 * (cr - 128.0);
    let g = y - 0.714 * (cr - 128.0) - 0.344 * (cb - 128.0);
    let b = y + 1.773 * (cb - 128.0);
    [clamp_u8(r), clamp_u8(g), clamp_u8(b)]
}

pub(crate) fn clamp_u8(value: f64) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
