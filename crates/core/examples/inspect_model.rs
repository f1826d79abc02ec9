//! Print a model's IO and run one inference on a flat gray image.
//! Usage: `cargo run --example inspect_model -- <model.onnx>`

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use image::Rgba;

use toplabel_core::backend::{build_session, OrtEngine, SessionConfig, DEFAULT_NUM_THREADS};
use toplabel_core::encoder::TensorEncoder;
use toplabel_core::engine::InferenceEngine;
use toplabel_core::selector::{decode_scores, score_range};
use toplabel_core::types::DecodedImage;

const DEFAULT_MODEL_PATH: &str = "mobilenet_quant_v1_224.onnx";

fn main() -> Result<()> {
    toplabel_core::runtime::setup_runtime_libs();

    let model_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH));

    println!("Loading model: {}", model_path.display());
    let t_load = Instant::now();
    let session = build_session(&SessionConfig {
        model_path: &model_path,
        num_threads: DEFAULT_NUM_THREADS,
    })?;
    let load_elapsed = t_load.elapsed();
    println!("Model loaded in {load_elapsed:.2?}");

    println!("\nModel inputs:");
    for input in session.inputs() {
        println!("  name={}, type={:?}", input.name(), input.dtype());
    }
    println!("Model outputs:");
    for output in session.outputs() {
        println!("  name={}, type={:?}", output.name(), output.dtype());
    }

    let mut engine = OrtEngine::new(session);
    engine
        .allocate_tensors()
        .context("failed to allocate tensors")?;
    let spec = engine.input_tensor(0)?;
    println!(
        "\nInput tensor: {}x{}x{} {}",
        spec.width, spec.height, spec.channels, spec.element_type
    );

    let gray = DecodedImage::from_pixel(
        spec.width,
        spec.height,
        Rgba([0x8080, 0x8080, 0x8080, u16::MAX]),
    );
    let buffer = TensorEncoder::default().encode(&gray, &spec)?;
    engine.copy_input(0, buffer)?;

    let t_infer = Instant::now();
    engine.invoke()?;
    let infer_elapsed = t_infer.elapsed();

    let output = engine.output_tensor(0)?;
    let scores = decode_scores(&output);
    let best = scores
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1));

    println!("\n=== Results ===");
    println!("Classes:          {}", scores.len());
    println!("Inference time:   {infer_elapsed:.2?}");
    if let Some((min, max)) = score_range(&output) {
        println!("Output range:     [{min:.4}, {max:.4}]");
    }
    if let Some((index, score)) = best {
        println!("Best class:       {index} ({score:.6})");
    }
    Ok(())
}
