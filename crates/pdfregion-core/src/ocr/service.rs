//! Shared, lazily loaded OCR service.

use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{RecvTimeoutError, bounded};
use image::DynamicImage;
use tracing::{debug, info, warn};

use super::Recognizer;
use crate::error::OcrError;

type Factory = Box<dyn Fn() -> Result<Arc<dyn Recognizer>, OcrError> + Send + Sync>;

/// A recognizer shared by reference across every OCR call of a run.
///
/// The recognizer is built on first use, so runs that only touch text-layer
/// regions never load models. A failed load is remembered and reported to
/// every later caller. The service is `Send + Sync`; concurrent calls go
/// straight to the recognizer, which must be safe for concurrent use.
pub struct OcrService {
    recognizer: OnceLock<Result<Arc<dyn Recognizer>, String>>,
    factory: Option<Factory>,
    languages: Vec<String>,
    timeout: Option<Duration>,
}

impl OcrService {
    /// Wrap an already constructed recognizer.
    pub fn new(recognizer: Arc<dyn Recognizer>, languages: Vec<String>) -> Self {
        Self {
            recognizer: OnceLock::from(Ok(recognizer)),
            factory: None,
            languages,
            timeout: None,
        }
    }

    /// Build the recognizer with `factory` on first use.
    pub fn lazy<F>(factory: F, languages: Vec<String>) -> Self
    where
        F: Fn() -> Result<Arc<dyn Recognizer>, OcrError> + Send + Sync + 'static,
    {
        Self {
            recognizer: OnceLock::new(),
            factory: Some(Box::new(factory)),
            languages,
            timeout: None,
        }
    }

    /// Lazily load the `pure-onnx-ocr` engine described by `config`.
    #[cfg(feature = "native")]
    pub fn from_config(config: &crate::models::config::PdfRegionConfig) -> Self {
        let models = config.models.clone();
        let ocr = config.ocr.clone();
        let timeout = config.extraction.ocr_timeout_ms.map(Duration::from_millis);

        Self::lazy(
            move || {
                let engine = super::PureOcrEngine::from_dir(&models, &ocr)?;
                Ok(Arc::new(engine) as Arc<dyn Recognizer>)
            },
            config.ocr.languages.clone(),
        )
        .with_timeout(timeout)
    }

    /// Bound each recognition call. `None` waits indefinitely.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Language codes passed to the recognizer.
    pub fn languages(&self) -> &[String] {
        &self.languages
    }

    /// Whether the recognizer has been built (successfully or not).
    pub fn is_loaded(&self) -> bool {
        self.recognizer.get().is_some()
    }

    fn recognizer(&self) -> Result<Arc<dyn Recognizer>, OcrError> {
        let loaded = self.recognizer.get_or_init(|| {
            let Some(factory) = &self.factory else {
                return Err("no recognizer configured".to_string());
            };
            let start = Instant::now();
            match factory() {
                Ok(recognizer) => {
                    info!("OCR recognizer ready in {}ms", start.elapsed().as_millis());
                    Ok(recognizer)
                }
                Err(e) => {
                    warn!("OCR recognizer failed to load: {}", e);
                    Err(e.to_string())
                }
            }
        });

        loaded.clone().map_err(OcrError::ModelLoad)
    }

    /// Recognize text fragments in an image.
    ///
    /// With a timeout set, the call runs on its own thread. A call that
    /// overruns is abandoned and keeps running in the background until the
    /// recognizer returns.
    pub fn recognize(&self, image: &DynamicImage) -> Result<Vec<String>, OcrError> {
        let recognizer = self.recognizer()?;

        let Some(timeout) = self.timeout else {
            return recognizer.recognize(image, &self.languages);
        };

        let (tx, rx) = bounded(1);
        let image = image.clone();
        let languages = self.languages.clone();
        thread::Builder::new()
            .name("ocr-recognize".to_string())
            .spawn(move || {
                // The receiver may have given up already.
                let _ = tx.send(recognizer.recognize(&image, &languages));
            })
            .map_err(|e| OcrError::Recognition(format!("failed to spawn OCR thread: {}", e)))?;

        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                debug!("OCR call exceeded {:?}", timeout);
                Err(OcrError::Timeout(timeout))
            }
            Err(RecvTimeoutError::Disconnected) => Err(OcrError::Recognition(
                "recognizer thread terminated without a result".to_string(),
            )),
        }
    }
}

impl std::fmt::Debug for OcrService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OcrService")
            .field("languages", &self.languages)
            .field("timeout", &self.timeout)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Echo(Duration);

    impl Recognizer for Echo {
        fn recognize(&self, image: &DynamicImage, languages: &[String]) -> Result<Vec<String>, OcrError> {
            thread::sleep(self.0);
            Ok(vec![format!("{}x{}", image.width(), image.height()), languages.join("+")])
        }
    }

    fn langs() -> Vec<String> {
        vec!["ko".to_string(), "en".to_string()]
    }

    #[test]
    fn test_recognizer_built_once() {
        let builds = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&builds);
        let service = OcrService::lazy(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(Echo(Duration::ZERO)) as Arc<dyn Recognizer>)
            },
            langs(),
        );

        assert!(!service.is_loaded());
        let image = DynamicImage::new_luma8(4, 3);
        for _ in 0..3 {
            assert_eq!(service.recognize(&image).unwrap(), vec!["4x3", "ko+en"]);
        }
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_load_failure_is_remembered() {
        let builds = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&builds);
        let service = OcrService::lazy(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(OcrError::ModelLoad("det.onnx missing".to_string()))
            },
            langs(),
        );

        let image = DynamicImage::new_luma8(1, 1);
        for _ in 0..2 {
            assert!(matches!(service.recognize(&image), Err(OcrError::ModelLoad(_))));
        }
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_timeout_fires() {
        let service = OcrService::new(Arc::new(Echo(Duration::from_millis(500))), langs())
            .with_timeout(Some(Duration::from_millis(20)));

        let result = service.recognize(&DynamicImage::new_luma8(1, 1));
        assert!(matches!(result, Err(OcrError::Timeout(d)) if d == Duration::from_millis(20)));
    }

    #[test]
    fn test_fast_call_within_timeout() {
        let service = OcrService::new(Arc::new(Echo(Duration::ZERO)), langs())
            .with_timeout(Some(Duration::from_secs(10)));

        let result = service.recognize(&DynamicImage::new_luma8(2, 2)).unwrap();
        assert_eq!(result[0], "2x2");
    }
}
