//! ONNX Runtime implementation of [`InferenceEngine`].
//!
//! Provides [`SessionConfig`] / [`build_session`] to create a CPU `ort::Session`
//! and [`OrtEngine`], which adapts the session to the engine capability trait.

use std::path::Path;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use ndarray::{Array3, Array4, Axis};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    tensor::TensorElementType,
    value::{Tensor, ValueType},
};
use tracing::{debug, info};

use crate::engine::InferenceEngine;
use crate::types::{ElementType, QuantizationParams, TensorBuffer, TensorSpec};

pub const DEFAULT_NUM_THREADS: usize = 4;

pub struct SessionConfig<'a> {
    pub model_path: &'a Path,
    pub num_threads: usize,
}

/// Build an `ort::Session` on the CPU execution provider.
pub fn build_session(config: &SessionConfig<'_>) -> Result<Session> {
    let started = Instant::now();
    debug!(
        model = %config.model_path.display(),
        num_threads = config.num_threads,
        "Building ONNX Runtime session"
    );

    let session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(config.num_threads.max(1))?
        .commit_from_file(config.model_path)
        .with_context(|| format!("failed to load ONNX model: {}", config.model_path.display()))?;

    info!(
        model = %config.model_path.display(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Model loaded"
    );
    Ok(session)
}

/// Memory order of a 4-D image input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorLayout {
    /// `[batch, height, width, channels]`
    Nhwc,
    /// `[batch, channels, height, width]`
    Nchw,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputGeometry {
    pub layout: TensorLayout,
    pub height: u32,
    pub width: u32,
    pub channels: u32,
}

fn is_channel_dim(dim: i64) -> bool {
    matches!(dim, 1 | 3 | 4)
}

/// Work out layout and spatial size from a model's declared input shape.
/// `-1` marks a dynamic dimension; only the batch may be dynamic.
pub fn resolve_input_geometry(shape: &[i64]) -> Result<InputGeometry> {
    if shape.len() != 4 {
        bail!("expected a 4-D image input, got shape {shape:?}");
    }
    if shape[0] > 1 {
        bail!("batched inputs are not supported, got batch size {}", shape[0]);
    }

    let layout = if is_channel_dim(shape[3]) || !is_channel_dim(shape[1]) {
        TensorLayout::Nhwc
    } else {
        TensorLayout::Nchw
    };

    let (h, w, c) = match layout {
        TensorLayout::Nhwc => (shape[1], shape[2], shape[3]),
        TensorLayout::Nchw => (shape[2], shape[3], shape[1]),
    };

    if h <= 0 || w <= 0 || c <= 0 {
        bail!("dynamic spatial dimensions are not supported, got shape {shape:?}");
    }

    Ok(InputGeometry {
        layout,
        height: h as u32,
        width: w as u32,
        channels: c as u32,
    })
}

pub fn element_type_of(ty: TensorElementType) -> ElementType {
    match ty {
        TensorElementType::Float32 => ElementType::Float32,
        TensorElementType::Uint8 => ElementType::UInt8,
        other => ElementType::Unsupported(format!("{other:?}").to_ascii_lowercase()),
    }
}

/// Reorder an interleaved HWC buffer into the model's 4-D layout.
pub fn to_model_array<T: Clone>(data: Vec<T>, geometry: &InputGeometry) -> Result<Array4<T>> {
    let (h, w, c) = (
        geometry.height as usize,
        geometry.width as usize,
        geometry.channels as usize,
    );
    let hwc = Array3::from_shape_vec((h, w, c), data)
        .context("input buffer does not match the tensor shape")?;

    let array = match geometry.layout {
        TensorLayout::Nhwc => hwc.insert_axis(Axis(0)),
        TensorLayout::Nchw => hwc
            .permuted_axes([2, 0, 1])
            .as_standard_layout()
            .into_owned()
            .insert_axis(Axis(0)),
    };
    Ok(array)
}

#[derive(Debug, Clone)]
struct IoInfo {
    name: String,
    shape: Vec<i64>,
    element_type: ElementType,
}

fn io_info(name: &str, dtype: &ValueType) -> IoInfo {
    match dtype {
        ValueType::Tensor { ty, shape, .. } => IoInfo {
            name: name.to_string(),
            shape: shape.iter().copied().collect(),
            element_type: element_type_of(*ty),
        },
        other => IoInfo {
            name: name.to_string(),
            shape: Vec::new(),
            element_type: ElementType::Unsupported(format!("{other:?}")),
        },
    }
}

/// Tensor bookkeeping between allocation, staging and invoke, independent
/// of the session itself.
#[derive(Debug)]
struct IoState {
    inputs: Vec<IoInfo>,
    outputs: Vec<IoInfo>,
    geometry: Option<InputGeometry>,
    staged_input: Option<TensorBuffer>,
    results: Vec<Option<TensorBuffer>>,
}

impl IoState {
    fn new(inputs: Vec<IoInfo>, outputs: Vec<IoInfo>) -> Self {
        Self {
            inputs,
            outputs,
            geometry: None,
            staged_input: None,
            results: Vec::new(),
        }
    }

    fn allocate(&mut self) -> Result<()> {
        if self.inputs.len() != 1 {
            bail!(
                "expected a model with exactly one input, found {}",
                self.inputs.len()
            );
        }
        if self.outputs.is_empty() {
            bail!("model declares no outputs");
        }

        let input = &self.inputs[0];
        let geometry = resolve_input_geometry(&input.shape)
            .with_context(|| format!("input '{}' has an unusable shape", input.name))?;

        debug!(
            input = %input.name,
            shape = ?input.shape,
            layout = ?geometry.layout,
            element_type = %input.element_type,
            "Resolved model input"
        );

        self.geometry = Some(geometry);
        self.staged_input = None;
        self.results = vec![None; self.outputs.len()];
        Ok(())
    }

    fn geometry(&self) -> Result<&InputGeometry> {
        self.geometry
            .as_ref()
            .context("tensors not allocated; call allocate_tensors() first")
    }

    fn input_spec(&self, index: usize) -> Result<TensorSpec> {
        if index != 0 {
            bail!("input tensor index {index} out of range");
        }
        let geometry = self.geometry()?;
        Ok(TensorSpec {
            width: geometry.width,
            height: geometry.height,
            channels: geometry.channels,
            element_type: self.inputs[0].element_type.clone(),
            // ONNX keeps quantization in QuantizeLinear nodes, not on the graph input.
            quantization: QuantizationParams::default(),
        })
    }

    fn stage_input(&mut self, index: usize, buffer: TensorBuffer) -> Result<()> {
        let spec = self.input_spec(index)?;
        if buffer.element_type() != spec.element_type {
            bail!(
                "input buffer type {} does not match tensor type {}",
                buffer.element_type(),
                spec.element_type
            );
        }
        if buffer.len() != spec.element_count() {
            bail!(
                "input buffer has {} elements, tensor expects {}",
                buffer.len(),
                spec.element_count()
            );
        }

        self.staged_input = Some(buffer);
        Ok(())
    }

    fn take_staged(&mut self) -> Result<(InputGeometry, TensorBuffer)> {
        let geometry = self.geometry()?.clone();
        let staged = self
            .staged_input
            .take()
            .context("no input copied before invoke")?;
        Ok((geometry, staged))
    }

    fn output(&self, index: usize) -> Result<TensorBuffer> {
        let info = self
            .outputs
            .get(index)
            .with_context(|| format!("output tensor index {index} out of range"))?;
        match self.results.get(index) {
            Some(Some(buffer)) => Ok(buffer.clone()),
            Some(None) if matches!(info.element_type, ElementType::Unsupported(_)) => bail!(
                "output '{}' has unsupported type {}",
                info.name,
                info.element_type
            ),
            _ => bail!("output '{}' is not available; invoke() has not run", info.name),
        }
    }
}

pub struct OrtEngine {
    session: Session,
    io: IoState,
}

impl OrtEngine {
    pub fn new(session: Session) -> Self {
        let inputs = session
            .inputs()
            .iter()
            .map(|input| io_info(input.name(), input.dtype()))
            .collect();
        let outputs = session
            .outputs()
            .iter()
            .map(|output| io_info(output.name(), output.dtype()))
            .collect();

        Self {
            session,
            io: IoState::new(inputs, outputs),
        }
    }

    pub fn from_config(config: &SessionConfig<'_>) -> Result<Self> {
        Ok(Self::new(build_session(config)?))
    }
}

impl InferenceEngine for OrtEngine {
    fn allocate_tensors(&mut self) -> Result<()> {
        self.io.allocate()
    }

    fn input_tensor_count(&self) -> usize {
        self.io.inputs.len()
    }

    fn output_tensor_count(&self) -> usize {
        self.io.outputs.len()
    }

    fn input_tensor(&self, index: usize) -> Result<TensorSpec> {
        self.io.input_spec(index)
    }

    fn copy_input(&mut self, index: usize, buffer: TensorBuffer) -> Result<()> {
        self.io.stage_input(index, buffer)
    }

    fn invoke(&mut self) -> Result<()> {
        let (geometry, staged) = self.io.take_staged()?;

        let input_name = self.io.inputs[0].name.as_str();
        let outputs = match staged {
            TensorBuffer::Float32(data) => {
                let tensor = Tensor::from_array(to_model_array(data, &geometry)?)?;
                self.session.run(ort::inputs![input_name => &tensor])?
            }
            TensorBuffer::UInt8(data) => {
                let tensor = Tensor::from_array(to_model_array(data, &geometry)?)?;
                self.session.run(ort::inputs![input_name => &tensor])?
            }
        };

        let mut results = Vec::with_capacity(self.io.outputs.len());
        for info in &self.io.outputs {
            let value = &outputs[info.name.as_str()];
            let buffer = match info.element_type {
                ElementType::Float32 => {
                    let view = value.try_extract_array::<f32>()?;
                    Some(TensorBuffer::Float32(view.iter().copied().collect()))
                }
                ElementType::UInt8 => {
                    let view = value.try_extract_array::<u8>()?;
                    Some(TensorBuffer::UInt8(view.iter().copied().collect()))
                }
                ElementType::Unsupported(_) => None,
            };
            results.push(buffer);
        }

        self.io.results = results;
        Ok(())
    }

    fn output_tensor(&self, index: usize) -> Result<TensorBuffer> {
        self.io.output(index)
    }
}
