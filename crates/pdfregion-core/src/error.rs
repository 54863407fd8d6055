//! Error types for the pdfregion-core library.

use std::time::Duration;

use thiserror::Error;

/// Main error type for the pdfregion library.
#[derive(Error, Debug)]
pub enum PdfRegionError {
    /// PDF processing error.
    #[error("PDF error: {0}")]
    Pdf(#[from] PdfError),

    /// OCR processing error.
    #[error("OCR error: {0}")]
    Ocr(#[from] OcrError),

    /// Region extraction error.
    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// Delimited output error.
    #[error("output error: {0}")]
    Output(#[from] csv::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors related to PDF processing.
#[derive(Error, Debug)]
pub enum PdfError {
    /// Failed to open/parse the PDF file.
    #[error("failed to parse PDF: {0}")]
    Parse(String),

    /// Failed to extract text from a page.
    #[error("failed to extract text: {0}")]
    TextExtraction(String),

    /// The PDF is encrypted and cannot be processed.
    #[error("PDF is encrypted")]
    Encrypted,

    /// The PDF is empty or has no pages.
    #[error("PDF has no pages")]
    NoPages,

    /// Invalid page index requested (0-based).
    #[error("invalid page index: {0}")]
    InvalidPage(usize),
}

/// Errors related to OCR processing.
#[derive(Error, Debug)]
pub enum OcrError {
    /// Failed to load OCR models.
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    /// Text detection failed.
    #[error("text detection failed: {0}")]
    Detection(String),

    /// Text recognition failed.
    #[error("text recognition failed: {0}")]
    Recognition(String),

    /// Invalid image format or dimensions.
    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// The engine was not built for the requested languages.
    #[error("unsupported language set: {0}")]
    UnsupportedLanguages(String),

    /// Recognition did not finish within the configured budget.
    #[error("recognition timed out after {0:?}")]
    Timeout(Duration),
}

/// Classification of [`ExtractionError`] used by the propagation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidRegion,
    NoImageOnPage,
    Timeout,
    DocumentOpenFailure,
    RecognitionEngineFailure,
    PageReadFailure,
    EngineUnavailable,
    Cancelled,
}

/// Errors raised while extracting a region from a page.
///
/// Region-local failures carry the page index and region label so a failed
/// run can report exactly where it went wrong.
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// Rectangle is malformed or lies outside the page.
    #[error("invalid region {:?}{}: {}", .label, page_suffix(.page), .reason)]
    InvalidRegion {
        label: String,
        page: Option<usize>,
        reason: String,
    },

    /// OCR requested but the page carries no embedded image.
    #[error("no embedded image on page {page} for region {label:?}")]
    NoImageOnPage { label: String, page: usize },

    /// OCR exceeded its time budget.
    #[error("OCR timed out after {elapsed:?} on page {page} for region {label:?}")]
    Timeout {
        label: String,
        page: usize,
        elapsed: Duration,
    },

    /// Source file unreadable or not a valid document.
    #[error("failed to open document: {0}")]
    DocumentOpen(#[source] PdfError),

    /// The recognizer failed on a single image.
    #[error("recognition failed on page {page} for region {label:?}: {message}")]
    RecognitionEngine {
        label: String,
        page: usize,
        message: String,
    },

    /// The page content could not be decoded.
    #[error("failed to read page {page} for region {label:?}: {message}")]
    PageRead {
        label: String,
        page: usize,
        message: String,
    },

    /// The OCR engine could not be initialised.
    #[error("OCR engine unavailable: {0}")]
    EngineUnavailable(String),

    /// The run was cancelled before the page was processed.
    #[error("extraction cancelled before page {page}")]
    Cancelled { page: usize },
}

fn page_suffix(page: &Option<usize>) -> String {
    page.map(|p| format!(" on page {p}")).unwrap_or_default()
}

impl ExtractionError {
    /// Create an `InvalidRegion` error not tied to a page.
    pub fn invalid_region(label: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRegion {
            label: label.into(),
            page: None,
            reason: reason.into(),
        }
    }

    /// Tag identifying the failure class.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRegion { .. } => ErrorKind::InvalidRegion,
            Self::NoImageOnPage { .. } => ErrorKind::NoImageOnPage,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::DocumentOpen(_) => ErrorKind::DocumentOpenFailure,
            Self::RecognitionEngine { .. } => ErrorKind::RecognitionEngineFailure,
            Self::PageRead { .. } => ErrorKind::PageReadFailure,
            Self::EngineUnavailable(_) => ErrorKind::EngineUnavailable,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    /// Whether the record builder substitutes an empty value instead of
    /// aborting the run.
    pub fn is_recoverable(&self, timeout_is_fatal: bool) -> bool {
        match self.kind() {
            ErrorKind::NoImageOnPage
            | ErrorKind::RecognitionEngineFailure
            | ErrorKind::PageReadFailure => true,
            ErrorKind::Timeout => !timeout_is_fatal,
            ErrorKind::InvalidRegion
            | ErrorKind::DocumentOpenFailure
            | ErrorKind::EngineUnavailable
            | ErrorKind::Cancelled => false,
        }
    }
}

/// Result type for the pdfregion library.
pub type Result<T> = std::result::Result<T, PdfRegionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_local_failures_are_recoverable() {
        let no_image = ExtractionError::NoImageOnPage {
            label: "addr".to_string(),
            page: 3,
        };
        assert!(no_image.is_recoverable(false));

        let engine = ExtractionError::RecognitionEngine {
            label: "addr".to_string(),
            page: 0,
            message: "corrupt jpeg".to_string(),
        };
        assert!(engine.is_recoverable(true));
    }

    #[test]
    fn test_timeout_follows_policy() {
        let timeout = ExtractionError::Timeout {
            label: "addr".to_string(),
            page: 1,
            elapsed: Duration::from_secs(5),
        };
        assert!(timeout.is_recoverable(false));
        assert!(!timeout.is_recoverable(true));
    }

    #[test]
    fn test_configuration_failures_are_fatal() {
        let invalid = ExtractionError::invalid_region("addr", "x0 >= x1");
        assert_eq!(invalid.kind(), ErrorKind::InvalidRegion);
        assert!(!invalid.is_recoverable(false));
        assert!(!ExtractionError::Cancelled { page: 2 }.is_recoverable(false));
    }

    #[test]
    fn test_invalid_region_message_names_page() {
        let err = ExtractionError::InvalidRegion {
            label: "소재지".to_string(),
            page: Some(4),
            reason: "outside page bounds".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid region \"소재지\" on page 4: outside page bounds"
        );
        assert_eq!(
            ExtractionError::invalid_region("a", "empty").to_string(),
            "invalid region \"a\": empty"
        );
    }
}
