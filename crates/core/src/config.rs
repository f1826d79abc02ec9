use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::backend::DEFAULT_NUM_THREADS;
use crate::classifier::ClassifierOptions;
use crate::encoder::{ByteEncoding, Normalization, TensorEncoder, DEFAULT_MEAN, DEFAULT_STD};
use crate::resize::ResizeFilter;
use crate::selector::{SelectionPolicy, DEFAULT_MIN_CONFIDENCE, DEFAULT_TOP_K};

pub const ENV_CONFIG_PATH: &str = "TOPLABEL_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ClassifierConfig {
    pub paths: PathsConfig,
    pub engine: EngineConfig,
    pub preprocess: PreprocessConfig,
    pub selection: SelectionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub model: PathBuf,
    pub label: PathBuf,
    pub image: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    pub num_threads: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PreprocessConfig {
    pub resize_filter: String,
    pub byte_encoding: String,
    pub mean: f32,
    pub std: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SelectionConfig {
    pub min_confidence: f64,
    pub top_k: usize,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            model: PathBuf::from("mobilenet_quant_v1_224.onnx"),
            label: PathBuf::from("labels.txt"),
            image: PathBuf::from("peacock.png"),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            num_threads: DEFAULT_NUM_THREADS,
        }
    }
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            resize_filter: ResizeFilter::default().to_string(),
            byte_encoding: ByteEncoding::default().to_string(),
            mean: DEFAULT_MEAN,
            std: DEFAULT_STD,
        }
    }
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            top_k: DEFAULT_TOP_K,
        }
    }
}

impl ClassifierConfig {
    /// Load from `path`. A missing or blank file yields defaults.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        if raw.trim().is_empty() {
            return Ok(Self::default());
        }

        toml::from_str(&raw)
            .with_context(|| format!("failed to parse config TOML: {}", path.display()))
    }

    pub fn classifier_options(&self) -> ClassifierOptions {
        ClassifierOptions {
            encoder: TensorEncoder::new(
                ResizeFilter::from_str_lossy(&self.preprocess.resize_filter),
                ByteEncoding::from_str_lossy(&self.preprocess.byte_encoding),
                Normalization {
                    mean: self.preprocess.mean,
                    std: self.preprocess.std,
                },
            ),
            policy: SelectionPolicy {
                min_confidence: self.selection.min_confidence,
                top_k: self.selection.top_k,
            },
        }
    }
}

/// Load the config named on the command line, else the one in
/// `TOPLABEL_CONFIG`, else defaults. A path given explicitly must exist.
pub fn load_config(cli_path: Option<&Path>) -> Result<ClassifierConfig> {
    if let Some(path) = cli_path {
        if !path.exists() {
            bail!("config file not found: {}", path.display());
        }
        return ClassifierConfig::load_from_path(path);
    }

    match env::var_os(ENV_CONFIG_PATH).filter(|value| !value.is_empty()) {
        Some(path) => ClassifierConfig::load_from_path(Path::new(&path)),
        None => Ok(ClassifierConfig::default()),
    }
}
