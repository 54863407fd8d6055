//! Pure Rust OCR engine wrapper using `pure-onnx-ocr`.
//!
//! The `pure-onnx-ocr` engine keeps per-session caches that cannot cross
//! threads, so it lives on a dedicated thread and serves recognition jobs
//! over a channel. [`PureOcrEngine`] is the `Send + Sync` handle to it.

use std::path::Path;
use std::thread;
use std::time::Instant;

use crossbeam_channel::{Sender, bounded, unbounded};
use image::{DynamicImage, GenericImageView};
use tracing::{debug, info};

use crate::error::OcrError;
use crate::models::config::{ModelConfig, OcrConfig};

use super::{Recognizer, TextBox, sort_by_reading_order};

/// One recognition request for the engine thread.
struct Job {
    image: DynamicImage,
    reply: Sender<Result<Vec<TextBox>, OcrError>>,
}

/// OCR engine backed by `pure-onnx-ocr` (pure Rust, no external ONNX Runtime).
///
/// The engine is built for one language set, which selects the recognition
/// model and dictionary. Jobs are served one at a time in submission order;
/// the engine thread exits once every handle is dropped.
pub struct PureOcrEngine {
    jobs: Sender<Job>,
    languages: Vec<String>,
}

impl PureOcrEngine {
    /// Create an engine from model files in a directory.
    pub fn from_dir(models: &ModelConfig, config: &OcrConfig) -> Result<Self, OcrError> {
        let model_dir: &Path = &models.model_dir;
        let (rec_name, dict_name) = models.recognition_files(&config.languages);

        let det_path = model_dir.join(&models.detection_model);
        let rec_path = model_dir.join(&rec_name);
        let dict_path = model_dir.join(&dict_name);

        for path in [&det_path, &rec_path, &dict_path] {
            if !path.exists() {
                return Err(OcrError::ModelLoad(format!(
                    "model file not found: {}",
                    path.display()
                )));
            }
        }

        let (jobs, queue) = unbounded::<Job>();
        let (ready_tx, ready_rx) = bounded(1);
        let keep_unk = config.keep_unk;

        thread::Builder::new()
            .name("ocr-engine".to_string())
            .spawn(move || {
                let built = pure_onnx_ocr::engine::OcrEngineBuilder::new()
                    .det_model_path(&det_path)
                    .rec_model_path(&rec_path)
                    .dictionary_path(&dict_path)
                    .build()
                    .map_err(|e| OcrError::ModelLoad(format!("pure-onnx-ocr: {}", e)));
                let engine = match built {
                    Ok(engine) => {
                        let _ = ready_tx.send(Ok(()));
                        engine
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                for job in queue {
                    // The caller may have timed out and dropped its receiver.
                    let _ = job.reply.send(run_job(&engine, &job.image, keep_unk));
                }
                debug!("OCR engine thread shutting down");
            })
            .map_err(|e| OcrError::ModelLoad(format!("failed to spawn OCR engine thread: {}", e)))?;

        ready_rx
            .recv()
            .map_err(|_| OcrError::ModelLoad("OCR engine thread exited during load".to_string()))??;

        info!(
            "Loaded pure-onnx-ocr engine from {} ({}, languages {:?})",
            model_dir.display(),
            rec_name,
            config.languages
        );

        Ok(Self {
            jobs,
            languages: config.languages.clone(),
        })
    }

    /// Process an image and return text boxes in reading order.
    pub fn process(&self, image: &DynamicImage) -> Result<Vec<TextBox>, OcrError> {
        let (reply, result) = bounded(1);
        self.jobs
            .send(Job {
                image: image.clone(),
                reply,
            })
            .map_err(|_| OcrError::Recognition("OCR engine thread has stopped".to_string()))?;

        result
            .recv()
            .map_err(|_| OcrError::Recognition("OCR engine dropped the job".to_string()))?
    }
}

fn run_job(
    engine: &pure_onnx_ocr::engine::OcrEngine,
    image: &DynamicImage,
    keep_unk: bool,
) -> Result<Vec<TextBox>, OcrError> {
    let start = Instant::now();
    let (width, height) = image.dimensions();

    debug!("Processing image: {}x{}", width, height);

    let results = engine
        .run_from_image(image)
        .map_err(|e| OcrError::Detection(format!("pure-onnx-ocr: {}", e)))?;

    let mut text_boxes: Vec<TextBox> = results
        .iter()
        .map(|r| TextBox {
            bbox: polygon_to_bbox(&r.bounding_box),
            text: if keep_unk {
                r.text.clone()
            } else {
                r.text.replace("[UNK]", " ")
            },
            confidence: r.confidence,
        })
        .collect();

    sort_by_reading_order(&mut text_boxes);

    info!(
        "OCR complete: {} text boxes in {}ms",
        text_boxes.len(),
        start.elapsed().as_millis()
    );

    Ok(text_boxes)
}

impl Recognizer for PureOcrEngine {
    fn recognize(&self, image: &DynamicImage, languages: &[String]) -> Result<Vec<String>, OcrError> {
        if let Some(missing) = languages.iter().find(|l| !self.languages.contains(l)) {
            return Err(OcrError::UnsupportedLanguages(format!(
                "engine built for {:?}, asked for {:?}",
                self.languages, missing
            )));
        }

        Ok(self
            .process(image)?
            .into_iter()
            .map(|b| b.text.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect())
    }
}

/// Convert a `Polygon<f64>` to our `[f32; 8]` bbox format.
///
/// Extracts the first 4 exterior points (quadrilateral) as
/// `[x1, y1, x2, y2, x3, y3, x4, y4]`.
fn polygon_to_bbox(polygon: &pure_onnx_ocr::Polygon<f64>) -> [f32; 8] {
    let mut bbox = [0.0f32; 8];
    for (i, coord) in polygon.exterior().coords().take(4).enumerate() {
        bbox[i * 2] = coord.x as f32;
        bbox[i * 2 + 1] = coord.y as f32;
    }
    bbox
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_engine_handle_is_send_sync() {
        assert_send_sync::<PureOcrEngine>();
    }

    #[test]
    fn test_missing_models_fail_before_spawning() {
        let models = ModelConfig {
            model_dir: PathBuf::from("/nonexistent/pdfregion-models"),
            ..ModelConfig::default()
        };
        let err = PureOcrEngine::from_dir(&models, &OcrConfig::default()).err().unwrap();
        assert!(matches!(err, OcrError::ModelLoad(msg) if msg.contains("model file not found")));
    }
}
