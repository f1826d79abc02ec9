//! Image decoding into alpha-premultiplied 16-bit RGBA pixel grids.

use std::io::Cursor;
use std::path::Path;

use anyhow::{bail, Context, Result};
use image::ImageReader;

use crate::types::DecodedImage;

/// Open and decode an image file. The format is sniffed from the content,
/// not the extension.
pub fn decode_image(path: &Path) -> Result<DecodedImage> {
    let reader = ImageReader::open(path)
        .with_context(|| format!("failed to open image file: {}", path.display()))?
        .with_guessed_format()
        .with_context(|| format!("failed to read image file: {}", path.display()))?;

    let decoded = reader
        .decode()
        .with_context(|| format!("failed to decode image: {}", path.display()))?;

    ensure_non_empty(premultiply_alpha(decoded.to_rgba16()))
}

/// Decode an in-memory encoded image.
pub fn decode_image_bytes(bytes: &[u8]) -> Result<DecodedImage> {
    let decoded = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .context("failed to read image bytes")?
        .decode()
        .context("failed to decode image bytes")?;

    ensure_non_empty(premultiply_alpha(decoded.to_rgba16()))
}

/// Scale color channels by alpha so samples come out alpha-premultiplied.
/// Opaque pixels are untouched.
fn premultiply_alpha(mut image: DecodedImage) -> DecodedImage {
    for pixel in image.pixels_mut() {
        let [r, g, b, a] = pixel.0;
        if a == u16::MAX {
            continue;
        }
        let scale = |c: u16| (c as u32 * a as u32 / u16::MAX as u32) as u16;
        pixel.0 = [scale(r), scale(g), scale(b), a];
    }
    image
}

fn ensure_non_empty(image: DecodedImage) -> Result<DecodedImage> {
    if image.width() == 0 || image.height() == 0 {
        bail!(
            "decoded image is empty ({}x{})",
            image.width(),
            image.height()
        );
    }
    Ok(image)
}
