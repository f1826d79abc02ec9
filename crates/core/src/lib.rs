//! Core crate for single-image classification: decode, encode, infer, select.

pub mod backend;
pub mod classifier;
pub mod config;
pub mod encoder;
pub mod engine;
pub mod image_source;
pub mod labels;
pub mod logging;
pub mod resize;
pub mod runtime;
pub mod selector;
pub mod types;
