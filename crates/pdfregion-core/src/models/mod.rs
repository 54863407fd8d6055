//! Run configuration.

pub mod config;

pub use config::{ExtractionConfig, ImageSelection, ModelConfig, OcrConfig, PdfRegionConfig};
