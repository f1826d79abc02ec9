//! Capability interface for the inference engine.
//!
//! The classifier only talks to the engine through [`InferenceEngine`], so the
//! encoding and selection logic can run against a fake engine in tests.

use anyhow::Result;

use crate::types::{TensorBuffer, TensorSpec};

pub trait InferenceEngine {
    /// Prepare input and output tensors for the loaded model.
    fn allocate_tensors(&mut self) -> Result<()>;

    fn input_tensor_count(&self) -> usize;

    fn output_tensor_count(&self) -> usize;

    /// Shape, element type and quantization of input tensor `index`.
    fn input_tensor(&self, index: usize) -> Result<TensorSpec>;

    /// Copy `buffer` into input tensor `index`. The buffer length must equal
    /// the tensor's element count.
    fn copy_input(&mut self, index: usize, buffer: TensorBuffer) -> Result<()>;

    /// Run inference on the current inputs.
    fn invoke(&mut self) -> Result<()>;

    /// Flat contents of output tensor `index` from the last `invoke`.
    fn output_tensor(&self, index: usize) -> Result<TensorBuffer>;
}

impl<E: InferenceEngine + ?Sized> InferenceEngine for Box<E> {
    fn allocate_tensors(&mut self) -> Result<()> {
        (**self).allocate_tensors()
    }

    fn input_tensor_count(&self) -> usize {
        (**self).input_tensor_count()
    }

    fn output_tensor_count(&self) -> usize {
        (**self).output_tensor_count()
    }

    fn input_tensor(&self, index: usize) -> Result<TensorSpec> {
        (**self).input_tensor(index)
    }

    fn copy_input(&mut self, index: usize, buffer: TensorBuffer) -> Result<()> {
        (**self).copy_input(index, buffer)
    }

    fn invoke(&mut self) -> Result<()> {
        (**self).invoke()
    }

    fn output_tensor(&self, index: usize) -> Result<TensorBuffer> {
        (**self).output_tensor(index)
    }
}
