//! Writing processed and intermediate images.

use std::borrow::Cow;
use std::path::Path;

use image::{DynamicImage, ImageFormat};

use crate::error::PipelineError;

/// Write `image` in the format implied by the path's extension.
///
/// Pixel layouts the encoder cannot take are converted first: JPEG drops
/// alpha, BMP narrows to 8-bit and PNG narrows float samples to 8-bit.
pub fn write_image(image: &DynamicImage, path: &Path) -> Result<(), PipelineError> {
    let format = ImageFormat::from_path(path).map_err(|_| PipelineError::UnsupportedFormat {
        path: path.to_path_buf(),
        format: path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("unknown")
            .to_string(),
    })?;
    encodable(image, format)
        .save_with_format(path, format)
        .map_err(|e| PipelineError::Write {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

/// Write a per-step snapshot as `<stem>_<step>.png` into `dir`.
pub fn write_intermediate(
    image: &DynamicImage,
    dir: &Path,
    stem: &str,
    step: &str,
) -> Result<(), PipelineError> {
    write_image(image, &dir.join(format!("{stem}_{step}.png")))
}

fn encodable(image: &DynamicImage, format: ImageFormat) -> Cow<'_, DynamicImage> {
    use DynamicImage::*;

    let has_alpha = image.color().has_alpha();
    let gray = image.color().channel_count() <= 2;
    match (format, image) {
        (ImageFormat::Jpeg, ImageLuma8(_) | ImageRgb8(_)) => Cow::Borrowed(image),
        (ImageFormat::Jpeg, _) if gray => Cow::Owned(ImageLuma8(image.to_luma8())),
        (ImageFormat::Jpeg, _) => Cow::Owned(ImageRgb8(image.to_rgb8())),

        (ImageFormat::Bmp, ImageLuma8(_) | ImageLumaA8(_) | ImageRgb8(_) | ImageRgba8(_)) => {
            Cow::Borrowed(image)
        }
        (ImageFormat::Png, ImageRgb32F(_) | ImageRgba32F(_)) | (ImageFormat::Bmp, _) => {
            match (gray, has_alpha) {
                (true, false) => Cow::Owned(ImageLuma8(image.to_luma8())),
                (true, true) => Cow::Owned(ImageLumaA8(image.to_luma_alpha8())),
                (false, false) => Cow::Owned(ImageRgb8(image.to_rgb8())),
                (false, true) => Cow::Owned(ImageRgba8(image.to_rgba8())),
            }
        }
        _ => Cow::Borrowed(image),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgba, RgbaImage};

    #[test]
    fn test_jpeg_drops_alpha() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.jpg");
        let rgba = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([10, 20, 30, 128])));
        write_image(&rgba, &path).unwrap();

        let back = image::open(&path).unwrap();
        assert_eq!(back.color().channel_count(), 3);
    }

    #[test]
    fn test_intermediate_name() {
        let dir = tempfile::tempdir().unwrap();
        let gray = DynamicImage::ImageLuma8(GrayImage::from_pixel(3, 3, Luma([7])));
        write_intermediate(&gray, dir.path(), "page", "threshold").unwrap();

        let back = image::open(dir.path().join("page_threshold.png")).unwrap();
        assert_eq!(back, gray);
    }

    #[test]
    fn test_float_png_is_narrowed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("float.png");
        let float = DynamicImage::ImageRgb32F(image::Rgb32FImage::new(2, 2));
        write_image(&float, &path).unwrap();
        assert_eq!(image::open(&path).unwrap().color(), image::ColorType::Rgb8);
    }

    #[test]
    fn test_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let gray = DynamicImage::new_luma8(2, 2);
        let err = write_image(&gray, &dir.path().join("page.xyz")).unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedFormat { .. }));
    }
}
