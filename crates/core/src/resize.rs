//! Image resampling to the engine's input dimensions.

use anyhow::{bail, Result};
use image::imageops::{self, FilterType};

use crate::types::DecodedImage;

/// Supported resize algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResizeFilter {
    Nearest,
    Bilinear,
    #[default]
    Bicubic,
    Lanczos3,
}

impl ResizeFilter {
    /// Parse from string (case-insensitive). Returns `Bicubic` for unknown values.
    pub fn from_str_lossy(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "nearest" | "neighbor" | "nn" => Self::Nearest,
            "bilinear" | "linear" | "triangle" => Self::Bilinear,
            "lanczos" | "lanczos3" => Self::Lanczos3,
            _ => Self::Bicubic,
        }
    }

    fn filter_type(self) -> FilterType {
        match self {
            Self::Nearest => FilterType::Nearest,
            Self::Bilinear => FilterType::Triangle,
            Self::Bicubic => FilterType::CatmullRom,
            Self::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

impl std::fmt::Display for ResizeFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Nearest => write!(f, "nearest"),
            Self::Bilinear => write!(f, "bilinear"),
            Self::Bicubic => write!(f, "bicubic"),
            Self::Lanczos3 => write!(f, "lanczos3"),
        }
    }
}

/// Resample `image` to exactly `width` x `height`. The source is left untouched.
pub fn resize_image(
    image: &DecodedImage,
    width: u32,
    height: u32,
    filter: ResizeFilter,
) -> Result<DecodedImage> {
    if image.width() == 0 || image.height() == 0 {
        bail!(
            "cannot resize an empty image ({}x{})",
            image.width(),
            image.height()
        );
    }
    if width == 0 || height == 0 {
        bail!("resize dimensions must be positive, got {width}x{height}");
    }

    Ok(imageops::resize(image, width, height, filter.filter_type()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn make_solid_image(w: u32, h: u32, r: u16, g: u16, b: u16) -> DecodedImage {
        DecodedImage::from_pixel(w, h, Rgba([r, g, b, u16::MAX]))
    }

    #[test]
    fn test_resize_filter_from_str() {
        assert_eq!(ResizeFilter::from_str_lossy("nearest"), ResizeFilter::Nearest);
        assert_eq!(ResizeFilter::from_str_lossy("NN"), ResizeFilter::Nearest);
        assert_eq!(
            ResizeFilter::from_str_lossy("bilinear"),
            ResizeFilter::Bilinear
        );
        assert_eq!(
            ResizeFilter::from_str_lossy("triangle"),
            ResizeFilter::Bilinear
        );
        assert_eq!(
            ResizeFilter::from_str_lossy("Lanczos3"),
            ResizeFilter::Lanczos3
        );
        assert_eq!(ResizeFilter::from_str_lossy("bicubic"), ResizeFilter::Bicubic);
        assert_eq!(ResizeFilter::from_str_lossy("unknown"), ResizeFilter::Bicubic);
        assert_eq!(ResizeFilter::from_str_lossy(""), ResizeFilter::Bicubic);
    }

    #[test]
    fn test_resize_filter_default_and_display() {
        assert_eq!(ResizeFilter::default(), ResizeFilter::Bicubic);
        assert_eq!(ResizeFilter::Bicubic.to_string(), "bicubic");
        assert_eq!(ResizeFilter::Nearest.to_string(), "nearest");
    }

    #[test]
    fn test_resize_nearest_solid_color() {
        let image = make_solid_image(4, 4, 51400, 25700, 12850);
        let resized = resize_image(&image, 8, 8, ResizeFilter::Nearest).unwrap();

        assert_eq!(resized.dimensions(), (8, 8));
        for pixel in resized.pixels() {
            assert_eq!(pixel.0, [51400, 25700, 12850, u16::MAX]);
        }
    }

    #[test]
    fn test_resize_bicubic_solid_color() {
        let image = make_solid_image(7, 5, 32896, 32896, 32896);
        let resized = resize_image(&image, 3, 3, ResizeFilter::Bicubic).unwrap();

        assert_eq!(resized.dimensions(), (3, 3));
        for pixel in resized.pixels() {
            for channel in &pixel.0[..3] {
                assert!((*channel as i32 - 32896).abs() <= 1, "got {channel}");
            }
        }
    }

    #[test]
    fn test_resize_does_not_mutate_source() {
        let mut image = make_solid_image(2, 2, 0, 0, 0);
        image.put_pixel(1, 1, Rgba([u16::MAX, 0, 0, u16::MAX]));
        let before = image.clone();

        let _ = resize_image(&image, 5, 5, ResizeFilter::Bicubic).unwrap();
        assert_eq!(image, before);
    }

    #[test]
    fn test_resize_rejects_zero_target() {
        let image = make_solid_image(4, 4, 0, 0, 0);
        let err = resize_image(&image, 0, 4, ResizeFilter::Bicubic)
            .err()
            .expect("should fail");
        assert!(err.to_string().contains("must be positive"));
    }

    #[test]
    fn test_resize_rejects_empty_source() {
        let image = DecodedImage::new(0, 0);
        let err = resize_image(&image, 4, 4, ResizeFilter::Bicubic)
            .err()
            .expect("should fail");
        assert!(err.to_string().contains("empty image"));
    }
}
