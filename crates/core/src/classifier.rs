//! Single-image classification pipeline: encode, invoke, select.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::encoder::TensorEncoder;
use crate::engine::InferenceEngine;
use crate::selector::{score_range, select, LabeledScore, SelectionPolicy};
use crate::types::DecodedImage;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClassifierOptions {
    pub encoder: TensorEncoder,
    pub policy: SelectionPolicy,
}

/// What the run looked like, for the caller to log.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceDiagnostics {
    pub input_width: u32,
    pub input_height: u32,
    pub input_channels: u32,
    pub input_type: String,
    /// Quantization scale, with an undeclared scale reported as 1.
    pub quant_scale: f32,
    pub quant_zero_point: i64,
    pub input_tensor_count: usize,
    pub output_tensor_count: usize,
    pub class_count: usize,
    /// Min/max of float outputs; not used for scoring.
    pub score_range: Option<(f32, f32)>,
    pub encode_elapsed: Duration,
    pub invoke_elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub results: Vec<LabeledScore>,
    pub diagnostics: InferenceDiagnostics,
}

pub struct Classifier<E> {
    engine: E,
    options: ClassifierOptions,
    allocated: bool,
}

impl<E: InferenceEngine> Classifier<E> {
    pub fn new(engine: E, options: ClassifierOptions) -> Self {
        Self {
            engine,
            options,
            allocated: false,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn into_engine(self) -> E {
        self.engine
    }

    /// Classify `image` and pair the surviving scores with `labels`.
    pub fn classify(&mut self, image: &DecodedImage, labels: &[String]) -> Result<Classification> {
        if !self.allocated {
            self.engine
                .allocate_tensors()
                .context("failed to allocate tensors")?;
            self.allocated = true;
        }

        let spec = self
            .engine
            .input_tensor(0)
            .context("failed to read input tensor")?;

        let encode_started = Instant::now();
        let buffer = self
            .options
            .encoder
            .encode(image, &spec)
            .context("failed to encode input tensor")?;
        let encode_elapsed = encode_started.elapsed();

        self.engine
            .copy_input(0, buffer)
            .context("failed to copy input tensor")?;

        let invoke_started = Instant::now();
        self.engine.invoke().context("inference invoke failed")?;
        let invoke_elapsed = invoke_started.elapsed();

        let output = self
            .engine
            .output_tensor(0)
            .context("failed to read output tensor")?;

        let results = select(&output, labels, &self.options.policy)?;

        let diagnostics = InferenceDiagnostics {
            input_width: spec.width,
            input_height: spec.height,
            input_channels: spec.channels,
            input_type: spec.element_type.to_string(),
            quant_scale: spec.quantization.effective_scale(),
            quant_zero_point: spec.quantization.zero_point,
            input_tensor_count: self.engine.input_tensor_count(),
            output_tensor_count: self.engine.output_tensor_count(),
            class_count: output.len(),
            score_range: score_range(&output),
            encode_elapsed,
            invoke_elapsed,
        };

        Ok(Classification {
            results,
            diagnostics,
        })
    }
}
