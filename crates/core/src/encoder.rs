//! Image to input-tensor encoding.
//!
//! The decoded image is resampled to the engine's spatial size and written
//! out row-major with interleaved channels (`(y * width + x) * 3 + c`).
//! Alpha is dropped.

use anyhow::{bail, Result};

use crate::resize::{resize_image, ResizeFilter};
use crate::types::{DecodedImage, ElementType, QuantizationParams, TensorBuffer, TensorSpec};

pub const DEFAULT_MEAN: f32 = 127.5;
pub const DEFAULT_STD: f32 = 127.5;

const RGB_CHANNELS: u32 = 3;

/// How pixels are written into a `uint8` input tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteEncoding {
    /// `floor(channel16 / 255)` truncated to a byte. Full intensity lands on
    /// 257 and wraps to 1.
    #[default]
    Literal,
    /// Normalize the 8-bit intensity with the configured mean/std, then
    /// quantize with the tensor's scale and zero point. Falls back to the raw
    /// 8-bit intensity when the tensor declares no quantization.
    Quantized,
}

impl ByteEncoding {
    /// Parse from string (case-insensitive). Returns `Literal` for unknown values.
    pub fn from_str_lossy(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "quantized" | "quant" | "affine" => Self::Quantized,
            _ => Self::Literal,
        }
    }
}

impl std::fmt::Display for ByteEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Literal => write!(f, "literal"),
            Self::Quantized => write!(f, "quantized"),
        }
    }
}

/// Mean/std normalization. The float path applies it to `channel16 / 255`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalization {
    pub mean: f32,
    pub std: f32,
}

impl Default for Normalization {
    fn default() -> Self {
        Self {
            mean: DEFAULT_MEAN,
            std: DEFAULT_STD,
        }
    }
}

impl Normalization {
    #[inline]
    fn apply(&self, channel: u16) -> f32 {
        self.apply_intensity(channel as f32 / 255.0)
    }

    #[inline]
    fn apply_intensity(&self, intensity: f32) -> f32 {
        (intensity - self.mean) / self.std
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TensorEncoder {
    pub filter: ResizeFilter,
    pub byte_encoding: ByteEncoding,
    pub normalization: Normalization,
}

impl TensorEncoder {
    pub fn new(
        filter: ResizeFilter,
        byte_encoding: ByteEncoding,
        normalization: Normalization,
    ) -> Self {
        Self {
            filter,
            byte_encoding,
            normalization,
        }
    }

    /// Build the input tensor contents for `spec` from `image`.
    pub fn encode(&self, image: &DecodedImage, spec: &TensorSpec) -> Result<TensorBuffer> {
        if let ElementType::Unsupported(name) = &spec.element_type {
            bail!("unsupported input tensor type '{name}': only uint8 or float32 accepted");
        }
        if spec.channels != RGB_CHANNELS {
            bail!(
                "unsupported input channel count {}: only {RGB_CHANNELS}-channel RGB tensors accepted",
                spec.channels
            );
        }
        if self.normalization.std == 0.0 {
            bail!("normalization std must be non-zero");
        }

        let resized = resize_image(image, spec.width, spec.height, self.filter)?;

        let buffer = match spec.element_type {
            ElementType::Float32 => {
                TensorBuffer::Float32(encode_float(&resized, &self.normalization))
            }
            ElementType::UInt8 => TensorBuffer::UInt8(match self.byte_encoding {
                ByteEncoding::Literal => encode_bytes_literal(&resized),
                ByteEncoding::Quantized => {
                    encode_bytes_quantized(&resized, &self.normalization, spec.quantization)
                }
            }),
            ElementType::Unsupported(_) => unreachable!("rejected above"),
        };

        debug_assert_eq!(buffer.len(), spec.element_count());
        Ok(buffer)
    }
}

fn encode_float(image: &DecodedImage, norm: &Normalization) -> Vec<f32> {
    encode_with(image, |channel| norm.apply(channel))
}

fn encode_bytes_literal(image: &DecodedImage) -> Vec<u8> {
    encode_with(image, literal_byte)
}

fn encode_bytes_quantized(
    image: &DecodedImage,
    norm: &Normalization,
    quantization: QuantizationParams,
) -> Vec<u8> {
    if !quantization.is_declared() {
        return encode_with(image, |channel| (channel >> 8) as u8);
    }

    encode_with(image, |channel| {
        let real = norm.apply_intensity((channel >> 8) as f32);
        let q = (real / quantization.scale).round() + quantization.zero_point as f32;
        q.clamp(0.0, 255.0) as u8
    })
}

#[inline]
fn literal_byte(channel: u16) -> u8 {
    // Truncate, not saturate: 257 becomes 1.
    (channel as f64 / 255.0) as u32 as u8
}

fn encode_with<T, F>(image: &DecodedImage, mut encode: F) -> Vec<T>
where
    F: FnMut(u16) -> T,
{
    let (width, height) = image.dimensions();
    let mut out = Vec::with_capacity(width as usize * height as usize * RGB_CHANNELS as usize);

    for y in 0..height {
        for x in 0..width {
            let [r, g, b, _] = image.get_pixel(x, y).0;
            out.push(encode(r));
            out.push(encode(g));
            out.push(encode(b));
        }
    }

    out
}
