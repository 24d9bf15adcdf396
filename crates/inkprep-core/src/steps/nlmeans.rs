//! Non-local means denoising.
//!
//! Each pixel becomes a weighted average of the pixels in its search window,
//! weighted by how closely their surrounding patches match its own. Patch
//! distances for one search offset are computed for the whole plane at once
//! through a summed-area table, so the cost grows with the search window
//! area and not with the patch area.

use image::{DynamicImage, GrayImage, Luma, LumaA, Rgb, Rgba};
use serde::Deserialize;

use super::pixels;
use super::{Step, Transform, Transformed, Validate};
use crate::error::{StepError, StepOutcome};
use crate::types::StepResult;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NlMeansDenoise {
    /// Filter strength for luminance
    pub h: f64,
    /// Filter strength for chroma; defaults to `h`
    #[serde(alias = "hColor")]
    pub h_color: Option<f64>,
    #[serde(alias = "templateWindowSize")]
    pub template_window_size: i64,
    #[serde(alias = "searchWindowSize")]
    pub search_window_size: i64,
}

impl Default for NlMeansDenoise {
    fn default() -> Self {
        Self {
            h: 10.0,
            h_color: None,
            template_window_size: 7,
            search_window_size: 21,
        }
    }
}

impl NlMeansDenoise {
    fn radii(&self) -> (usize, usize) {
        let template = pixels::odd(self.template_window_size) / 2;
        let search = pixels::odd(self.search_window_size) / 2;
        (template as usize, search as usize)
    }

    fn denoise(&self, plane: &Plane, strength: f64) -> Plane {
        let (template, search) = self.radii();
        denoise_plane(plane, strength, template, search)
    }
}

impl Step for NlMeansDenoise {
    const NAME: &'static str = "nlmeans_denoise";
}

impl Transform for NlMeansDenoise {
    fn check(&self) -> StepOutcome<()> {
        let strengths = [("h", Some(self.h)), ("h_color", self.h_color)];
        for (param, value) in strengths {
            if let Some(v) = value {
                if !v.is_finite() || v <= 0.0 {
                    return Err(StepError::invalid(param, format!("must be positive, got {v}")));
                }
            }
        }
        let windows = [
            ("template_window_size", self.template_window_size),
            ("search_window_size", self.search_window_size),
        ];
        for (param, value) in windows {
            if value <= 0 {
                return Err(StepError::invalid(param, format!("must be positive, got {value}")));
            }
        }
        Ok(())
    }

    fn transform(&self, image: &DynamicImage) -> StepOutcome<Transformed> {
        self.check()?;
        pixels::require_u8(image, "non-local means needs 8-bit samples")?;
        let h_color = self.h_color.unwrap_or(self.h);

        let denoised = match image {
            DynamicImage::ImageLuma8(gray) => {
                let luma = self.denoise(&Plane::from_gray(gray), self.h);
                DynamicImage::ImageLuma8(luma.to_gray())
            }
            DynamicImage::ImageLumaA8(buf) => {
                let gray = GrayImage::from_fn(buf.width(), buf.height(), |x, y| {
                    Luma([buf.get_pixel(x, y).0[0]])
                });
                let luma = self.denoise(&Plane::from_gray(&gray), self.h).to_gray();
                DynamicImage::ImageLumaA8(image::ImageBuffer::from_fn(
                    buf.width(),
                    buf.height(),
                    |x, y| LumaA([luma.get_pixel(x, y).0[0], buf.get_pixel(x, y).0[1]]),
                ))
            }
            DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => {
                let rgba = image.to_rgba8();
                let [y, cb, cr] = Plane::ycbcr_from_rgba(&rgba);
                let y = self.denoise(&y, self.h);
                let cb = self.denoise(&cb, h_color);
                let cr = self.denoise(&cr, h_color);

                let (width, height) = rgba.dimensions();
                let rgb_at = |px: u32, py: u32| {
                    let i = py as usize * width as usize + px as usize;
                    pixels::ycbcr_to_rgb(y.data[i] as f64, cb.data[i] as f64, cr.data[i] as f64)
                };
                if matches!(image, DynamicImage::ImageRgb8(_)) {
                    DynamicImage::ImageRgb8(image::ImageBuffer::from_fn(width, height, |px, py| {
                        Rgb(rgb_at(px, py))
                    }))
                } else {
                    DynamicImage::ImageRgba8(image::ImageBuffer::from_fn(width, height, |px, py| {
                        let [r, g, b] = rgb_at(px, py);
                        Rgba([r, g, b, rgba.get_pixel(px, py).0[3]])
                    }))
                }
            }
            other => {
                return Err(StepError::UnsupportedPixelType {
                    color: other.color(),
                    reason: "non-local means needs 8-bit samples",
                })
            }
        };
        Ok(Transformed::new(denoised))
    }
}

impl Validate for NlMeansDenoise {
    fn validate(&self, original: &DynamicImage, output: &Transformed) -> StepOutcome<StepResult> {
        let (before, after) = match (
            pixels::laplacian_variance(original),
            pixels::laplacian_variance(&output.image),
        ) {
            (Ok(before), Ok(after)) => (before, after),
            _ => return Ok(StepResult::failure(Self::NAME)),
        };
        Ok(StepResult::check(Self::NAME, after <= before)
            .with_metric("laplacian_var_before", pixels::round2(before))
            .with_metric("laplacian_var_after", pixels::round2(after)))
    }
}

/// A single channel of floating-point samples.
struct Plane {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl Plane {
    fn from_gray(gray: &GrayImage) -> Self {
        Self {
            width: gray.width() as usize,
            height: gray.height() as usize,
            data: gray.pixels().map(|p| p.0[0] as f32).collect(),
        }
    }

    fn ycbcr_from_rgba(rgba: &image::RgbaImage) -> [Self; 3] {
        let (width, height) = (rgba.width() as usize, rgba.height() as usize);
        let mut planes: [Vec<f32>; 3] = Default::default();
        for p in rgba.pixels() {
            let ycc = pixels::rgb_to_ycbcr(p.0[0], p.0[1], p.0[2]);
            for (plane, value) in planes.iter_mut().zip(ycc) {
                plane.push(value as f32);
            }
        }
        planes.map(|data| Self {
            width,
            height,
            data,
        })
    }

    fn to_gray(&self) -> GrayImage {
        GrayImage::from_fn(self.width as u32, self.height as u32, |x, y| {
            let v = self.data[y as usize * self.width + x as usize];
            Luma([pixels::clamp_u8(v as f64)])
        })
    }

    fn at_clamped(&self, x: isize, y: isize) -> f32 {
        let x = x.clamp(0, self.width as isize - 1) as usize;
        let y = y.clamp(0, self.height as isize - 1) as usize;
        self.data[y * self.width + x]
    }
}

fn denoise_plane(plane: &Plane, strength: f64, template: usize, search: usize) -> Plane {
    let (w, h) = (plane.width, plane.height);
    let stride = w + 1;
    let h2 = strength * strength;
    let mut numerator = vec![0f64; w * h];
    let mut denominator = vec![0f64; w * h];
    let mut table = vec![0f64; stride * (h + 1)];
    let (s, t) = (search as isize, template as isize);

    for dy in -s..=s {
        for dx in -s..=s {
            // Summed-area table of squared differences against this offset.
            for y in 0..h {
                let mut row = 0f64;
                for x in 0..w {
                    let a = plane.data[y * w + x];
                    let b = plane.at_clamped(x as isize + dx, y as isize + dy);
                    row += ((a - b) as f64).powi(2);
                    table[(y + 1) * stride + x + 1] = row + table[y * stride + x + 1];
                }
            }

            for y in 0..h {
                let y1 = (y as isize - t).max(0) as usize;
                let y2 = (y + template + 1).min(h);
                for x in 0..w {
                    let x1 = (x as isize - t).max(0) as usize;
                    let x2 = (x + template + 1).min(w);
                    let area = ((x2 - x1) * (y2 - y1)) as f64;
                    let sum = table[y2 * stride + x2] - table[y1 * stride + x2]
                        - table[y2 * stride + x1]
                        + table[y1 * stride + x1];
                    let weight = (-(sum / area) / h2).exp();
                    let i = y * w + x;
                    numerator[i] += weight * plane.at_clamped(x as isize + dx, y as isize + dy) as f64;
                    denominator[i] += weight;
                }
            }
        }
    }

    let data = numerator
        .iter()
        .zip(&denominator)
        .zip(&plane.data)
        .map(|((n, d), &orig)| if *d > 0.0 { (n / d) as f32 } else { orig })
        .collect();
    Plane {
        width: w,
        height: h,
        data,
    }
}
