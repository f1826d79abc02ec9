use std::fmt;

use image::{ImageBuffer, Rgba};

/// Decoded image at 16-bit scale per channel (8-bit sources are widened by x257).
pub type DecodedImage = ImageBuffer<Rgba<u16>, Vec<u16>>;

/// Element type of an engine tensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementType {
    Float32,
    UInt8,
    /// Any other element type the engine reports, kept by name for diagnostics.
    Unsupported(String),
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float32 => write!(f, "float32"),
            Self::UInt8 => write!(f, "uint8"),
            Self::Unsupported(name) => write!(f, "{name}"),
        }
    }
}

/// Affine mapping between a byte-encoded tensor value and its real value:
/// `real = (q - zero_point) * scale`.
///
/// A `scale` of zero means the engine did not declare any quantization.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct QuantizationParams {
    pub scale: f32,
    pub zero_point: i64,
}

impl QuantizationParams {
    pub fn new(scale: f32, zero_point: i64) -> Self {
        Self { scale, zero_point }
    }

    pub fn is_declared(&self) -> bool {
        self.scale > 0.0
    }

    /// Scale used for reporting; an undeclared scale reads as 1.
    pub fn effective_scale(&self) -> f32 {
        if self.scale == 0.0 {
            1.0
        } else {
            self.scale
        }
    }
}

/// Shape and encoding the engine demands for an input tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorSpec {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub element_type: ElementType,
    pub quantization: QuantizationParams,
}

impl TensorSpec {
    pub fn element_count(&self) -> usize {
        self.width as usize * self.height as usize * self.channels as usize
    }
}

/// Flat tensor contents in one of the two supported encodings.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorBuffer {
    Float32(Vec<f32>),
    UInt8(Vec<u8>),
}

impl TensorBuffer {
    pub fn len(&self) -> usize {
        match self {
            Self::Float32(data) => data.len(),
            Self::UInt8(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            Self::Float32(_) => ElementType::Float32,
            Self::UInt8(_) => ElementType::UInt8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_type_display() {
        assert_eq!(ElementType::Float32.to_string(), "float32");
        assert_eq!(ElementType::UInt8.to_string(), "uint8");
        assert_eq!(
            ElementType::Unsupported("int64".to_string()).to_string(),
            "int64"
        );
    }

    #[test]
    fn test_quantization_undeclared_scale_reads_as_one() {
        let params = QuantizationParams::default();
        assert!(!params.is_declared());
        assert_eq!(params.effective_scale(), 1.0);

        let declared = QuantizationParams::new(0.0078125, 128);
        assert!(declared.is_declared());
        assert_eq!(declared.effective_scale(), 0.0078125);
    }

    #[test]
    fn test_tensor_spec_element_count() {
        let spec = TensorSpec {
            width: 224,
            height: 224,
            channels: 3,
            element_type: ElementType::UInt8,
            quantization: QuantizationParams::default(),
        };
        assert_eq!(spec.element_count(), 224 * 224 * 3);
    }

    #[test]
    fn test_tensor_buffer_len_and_type() {
        let floats = TensorBuffer::Float32(vec![0.0; 6]);
        assert_eq!(floats.len(), 6);
        assert_eq!(floats.element_type(), ElementType::Float32);

        let bytes = TensorBuffer::UInt8(Vec::new());
        assert!(bytes.is_empty());
        assert_eq!(bytes.element_type(), ElementType::UInt8);
    }
}
