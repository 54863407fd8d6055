//! Region extraction with a switchable strategy.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use image::DynamicImage;
use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::error::{ExtractionError, OcrError, PdfError};
use crate::models::config::{ExtractionConfig, ImageSelection};
use crate::ocr::OcrService;
use crate::pdf::DocumentSource;
use crate::region::{RegionSpec, Strategy};

/// Text extracted from one region of one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionResult {
    /// Region label.
    pub label: String,
    /// Extracted text; empty when the region holds nothing.
    pub value: String,
    /// Page the value came from (0-based).
    pub page_index: usize,
    /// Strategy that produced the value.
    pub strategy_used: Strategy,
}

/// Applies a [`RegionSpec`] to a page using the spec's strategy.
#[derive(Debug, Clone)]
pub struct RegionExtractor {
    ocr: Arc<OcrService>,
    image_selection: ImageSelection,
    image_dump_dir: Option<PathBuf>,
}

impl RegionExtractor {
    /// Create an extractor sharing `ocr` with other extractors of the run.
    pub fn new(ocr: Arc<OcrService>) -> Self {
        Self {
            ocr,
            image_selection: ImageSelection::default(),
            image_dump_dir: None,
        }
    }

    /// Create an extractor with the image policy from `config`.
    pub fn from_config(ocr: Arc<OcrService>, config: &ExtractionConfig) -> Self {
        Self::new(ocr)
            .with_image_selection(config.image_selection)
            .with_image_dump_dir(config.image_dump_dir.clone())
    }

    pub fn with_image_selection(mut self, selection: ImageSelection) -> Self {
        self.image_selection = selection;
        self
    }

    /// Save every image sent to OCR under `dir`.
    pub fn with_image_dump_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.image_dump_dir = dir;
        self
    }

    /// The OCR service used for image regions.
    pub fn ocr(&self) -> &OcrService {
        &self.ocr
    }

    /// Extract the region described by `spec` from page `page_index`.
    ///
    /// Fails with `InvalidRegion` when the rectangle does not fit the page.
    /// Region-local failures are reported as errors too; deciding whether
    /// they abort the run is left to the caller.
    pub fn extract<D>(
        &self,
        doc: &D,
        page_index: usize,
        spec: &RegionSpec,
    ) -> Result<ExtractionResult, ExtractionError>
    where
        D: DocumentSource + ?Sized,
    {
        let size = doc
            .page_size(page_index)
            .map_err(|e| page_read(spec, page_index, e))?;
        spec.check_bounds(page_index, size)?;

        let start = Instant::now();
        let value = match spec.strategy() {
            Strategy::TextLayer => doc
                .extract_text(page_index, spec.rect())
                .map_err(|e| page_read(spec, page_index, e))?,
            Strategy::ImageOcr => self.recognize_page(doc, page_index, spec)?,
        };

        debug!(
            "Page {} region {:?} ({}): {} chars in {}ms",
            page_index,
            spec.label(),
            spec.strategy(),
            value.chars().count(),
            start.elapsed().as_millis()
        );

        Ok(ExtractionResult {
            label: spec.label().to_string(),
            value,
            page_index,
            strategy_used: spec.strategy(),
        })
    }

    fn recognize_page<D>(&self, doc: &D, page: usize, spec: &RegionSpec) -> Result<String, ExtractionError>
    where
        D: DocumentSource + ?Sized,
    {
        let images = doc
            .embedded_images(page)
            .map_err(|e| page_read(spec, page, e))?;

        if images.is_empty() {
            return Err(ExtractionError::NoImageOnPage {
                label: spec.label().to_string(),
                page,
            });
        }

        let selected = match self.image_selection {
            ImageSelection::First => &images[..1],
            ImageSelection::All => &images[..],
        };
        trace!("Running OCR on {} of {} images on page {}", selected.len(), images.len(), page);

        let mut fragments = Vec::new();
        for (index, embedded) in selected.iter().enumerate() {
            let bitmap = embedded.decode().map_err(|e| ocr_failure(spec, page, e))?;
            if let Some(dir) = &self.image_dump_dir {
                dump_image(dir, page, index, &bitmap);
            }
            let texts = self.ocr.recognize(&bitmap).map_err(|e| ocr_failure(spec, page, e))?;
            fragments.extend(texts);
        }

        Ok(fragments.join(" "))
    }
}

fn page_read(spec: &RegionSpec, page: usize, err: PdfError) -> ExtractionError {
    ExtractionError::PageRead {
        label: spec.label().to_string(),
        page,
        message: err.to_string(),
    }
}

fn ocr_failure(spec: &RegionSpec, page: usize, err: OcrError) -> ExtractionError {
    let label = spec.label().to_string();
    match err {
        OcrError::Timeout(elapsed) => ExtractionError::Timeout { label, page, elapsed },
        OcrError::ModelLoad(message) => ExtractionError::EngineUnavailable(message),
        other => ExtractionError::RecognitionEngine {
            label,
            page,
            message: other.to_string(),
        },
    }
}

/// File name for a dumped OCR input image; `page` is 0-based, names are 1-based.
pub fn dump_file_name(page: usize, image_index: usize) -> String {
    if image_index == 0 {
        format!("page_{}_img.png", page + 1)
    } else {
        format!("page_{}_img_{}.png", page + 1, image_index + 1)
    }
}

fn dump_image(dir: &Path, page: usize, image_index: usize, bitmap: &DynamicImage) {
    let path = dir.join(dump_file_name(page, image_index));
    let saved = std::fs::create_dir_all(dir)
        .map_err(|e| e.to_string())
        .and_then(|_| bitmap.save(&path).map_err(|e| e.to_string()));
    match saved {
        Ok(()) => trace!("Saved OCR input to {}", path.display()),
        Err(e) => warn!("Could not save {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::ocr::Recognizer;
    use crate::pdf::{EmbeddedImage, ImageFormat};
    use crate::region::{PageSize, Rect};
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    struct FakePage {
        text: &'static str,
        images: Vec<EmbeddedImage>,
    }

    impl DocumentSource for FakePage {
        fn page_count(&self) -> usize {
            1
        }

        fn page_size(&self, page: usize) -> crate::pdf::Result<PageSize> {
            match page {
                0 => Ok(PageSize::new(612.0, 792.0)),
                _ => Err(PdfError::InvalidPage(page)),
            }
        }

        fn extract_text(&self, _page: usize, _rect: Rect) -> crate::pdf::Result<String> {
            Ok(self.text.to_string())
        }

        fn embedded_images(&self, _page: usize) -> crate::pdf::Result<Vec<EmbeddedImage>> {
            Ok(self.images.clone())
        }
    }

    /// Reports the width of every image it sees.
    struct WidthReader;

    impl Recognizer for WidthReader {
        fn recognize(&self, image: &DynamicImage, _languages: &[String]) -> Result<Vec<String>, OcrError> {
            Ok(vec!["w".to_string(), image.width().to_string()])
        }
    }

    fn png(width: u32) -> EmbeddedImage {
        let mut data = Vec::new();
        DynamicImage::new_luma8(width, 2)
            .write_to(&mut Cursor::new(&mut data), image::ImageFormat::Png)
            .unwrap();
        EmbeddedImage {
            data,
            width,
            height: 2,
            format: ImageFormat::Png,
        }
    }

    fn extractor() -> RegionExtractor {
        RegionExtractor::new(Arc::new(OcrService::new(Arc::new(WidthReader), vec!["ko".to_string()])))
    }

    fn spec(strategy: Strategy) -> RegionSpec {
        RegionSpec::new("소재지", Rect::new(103.0, 141.0, 325.0, 163.0), strategy).unwrap()
    }

    #[test]
    fn test_text_layer_strategy() {
        let page = FakePage {
            text: "Seoul",
            images: vec![],
        };
        let result = extractor().extract(&page, 0, &spec(Strategy::TextLayer)).unwrap();
        assert_eq!(
            result,
            ExtractionResult {
                label: "소재지".to_string(),
                value: "Seoul".to_string(),
                page_index: 0,
                strategy_used: Strategy::TextLayer,
            }
        );
    }

    #[test]
    fn test_ocr_joins_fragments_with_space() {
        let page = FakePage {
            text: "",
            images: vec![png(7), png(9)],
        };
        let result = extractor().extract(&page, 0, &spec(Strategy::ImageOcr)).unwrap();
        assert_eq!(result.value, "w 7");
        assert_eq!(result.strategy_used, Strategy::ImageOcr);

        let all = extractor()
            .with_image_selection(ImageSelection::All)
            .extract(&page, 0, &spec(Strategy::ImageOcr))
            .unwrap();
        assert_eq!(all.value, "w 7 w 9");
    }

    #[test]
    fn test_no_image_on_page() {
        let page = FakePage {
            text: "",
            images: vec![],
        };
        let err = extractor().extract(&page, 0, &spec(Strategy::ImageOcr)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoImageOnPage);
    }

    #[test]
    fn test_corrupt_image_is_recognition_failure() {
        let page = FakePage {
            text: "",
            images: vec![EmbeddedImage {
                data: vec![0xFF, 0xD8, 0x00],
                width: 1,
                height: 1,
                format: ImageFormat::Jpeg,
            }],
        };
        let err = extractor().extract(&page, 0, &spec(Strategy::ImageOcr)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RecognitionEngineFailure);
        assert!(err.is_recoverable(true));
    }

    #[test]
    fn test_region_outside_page() {
        let page = FakePage {
            text: "Seoul",
            images: vec![],
        };
        let wide = RegionSpec::new("a", Rect::new(0.0, 0.0, 700.0, 10.0), Strategy::TextLayer).unwrap();
        let err = extractor().extract(&page, 0, &wide).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRegion);
    }

    #[test]
    fn test_model_load_failure_is_fatal() {
        let ocr = OcrService::lazy(
            || Err(OcrError::ModelLoad("missing det.onnx".to_string())),
            vec!["ko".to_string()],
        );
        let extractor = RegionExtractor::new(Arc::new(ocr));
        let page = FakePage {
            text: "",
            images: vec![png(3)],
        };
        let err = extractor.extract(&page, 0, &spec(Strategy::ImageOcr)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EngineUnavailable);
        assert!(!err.is_recoverable(false));
    }

    #[test]
    fn test_image_dump() {
        let dir = tempfile::tempdir().unwrap();
        let page = FakePage {
            text: "",
            images: vec![png(5)],
        };
        extractor()
            .with_image_dump_dir(Some(dir.path().to_path_buf()))
            .extract(&page, 0, &spec(Strategy::ImageOcr))
            .unwrap();

        let saved = image::open(dir.path().join("page_1_img.png")).unwrap();
        assert_eq!(saved.width(), 5);
        assert_eq!(dump_file_name(2, 1), "page_3_img_2.png");
    }
}
