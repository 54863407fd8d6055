//! Core library for region-based PDF extraction.
//!
//! This crate provides:
//! - Region specifications in page space (`RegionSpec`)
//! - PDF access: clipped text-layer extraction and embedded images (lopdf)
//! - OCR through a shared, lazily loaded recognizer (`pure-onnx-ocr`)
//! - Page-by-page record assembly with a per-region strategy
//! - Delimited output with atomic file replacement

pub mod error;
pub mod extract;
pub mod models;
pub mod ocr;
pub mod output;
pub mod pdf;
pub mod region;
pub mod selection;

pub use error::{ErrorKind, ExtractionError, OcrError, PdfError, PdfRegionError, Result};
pub use extract::{
    CancelFlag, ExtractionResult, OutputRow, PageRecordBuilder, RecordStream, RegionExtractor,
};
pub use models::config::{ImageSelection, PdfRegionConfig};
#[cfg(feature = "native")]
pub use ocr::PureOcrEngine;
pub use ocr::{OcrService, Recognizer};
pub use output::{OutputLayout, TabularWriter};
pub use pdf::{DocumentSource, EmbeddedImage, PdfDocument};
pub use region::{PageSize, Rect, RegionSpec, Strategy};
pub use selection::{PageRasterizer, PixelRect, RegionSelection, RenderedPage};
