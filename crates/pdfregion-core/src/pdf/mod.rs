//! PDF processing module.

mod document;
pub mod text_layer;

pub use document::PdfDocument;

use std::io::Cursor;

use image::DynamicImage;

use crate::error::{OcrError, PdfError};
use crate::region::{PageSize, Rect};

/// Result type for PDF operations.
pub type Result<T> = std::result::Result<T, PdfError>;

/// Encoding of an embedded image's byte buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// DCT-encoded stream passed through untouched.
    Jpeg,
    /// Raw samples re-encoded as PNG.
    Png,
}

/// A raster image embedded in a page.
#[derive(Debug, Clone)]
pub struct EmbeddedImage {
    /// Encoded image bytes.
    pub data: Vec<u8>,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Encoding of `data`.
    pub format: ImageFormat,
}

impl EmbeddedImage {
    /// Decode the image bytes into a bitmap.
    pub fn decode(&self) -> std::result::Result<DynamicImage, OcrError> {
        let format = match self.format {
            ImageFormat::Jpeg => image::ImageFormat::Jpeg,
            ImageFormat::Png => image::ImageFormat::Png,
        };
        image::load(Cursor::new(&self.data), format)
            .map_err(|e| OcrError::InvalidImage(e.to_string()))
    }
}

/// Provider of page geometry, clipped text and embedded images.
///
/// Page indices are 0-based.
pub trait DocumentSource {
    /// Number of pages in the document.
    fn page_count(&self) -> usize;

    /// Size of a page in points.
    fn page_size(&self, page: usize) -> Result<PageSize>;

    /// Text from the page's text layer clipped to `rect`, in reading order.
    fn extract_text(&self, page: usize, rect: Rect) -> Result<String>;

    /// Raster images embedded in the page, in resource order.
    fn embedded_images(&self, page: usize) -> Result<Vec<EmbeddedImage>>;
}

impl<T: DocumentSource + ?Sized> DocumentSource for &T {
    fn page_count(&self) -> usize {
        (**self).page_count()
    }

    fn page_size(&self, page: usize) -> Result<PageSize> {
        (**self).page_size(page)
    }

    fn extract_text(&self, page: usize, rect: Rect) -> Result<String> {
        (**self).extract_text(page, rect)
    }

    fn embedded_images(&self, page: usize) -> Result<Vec<EmbeddedImage>> {
        (**self).embedded_images(page)
    }
}
