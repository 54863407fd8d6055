//! Configuration structures for region extraction.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PdfRegionError, Result};
use crate::region::RegionSpec;

/// Main configuration for a pdfregion run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfRegionConfig {
    /// Regions to extract, in column order.
    pub regions: Vec<RegionSpec>,

    /// OCR configuration.
    pub ocr: OcrConfig,

    /// Model configuration.
    pub models: ModelConfig,

    /// Extraction policy.
    pub extraction: ExtractionConfig,
}

/// OCR recognizer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Language codes the recognizer is built for.
    pub languages: Vec<String>,

    /// Keep the recognizer's `[UNK]` marker for unknown glyphs.
    pub keep_unk: bool,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            languages: vec!["ko".to_string(), "en".to_string()],
            keep_unk: false,
        }
    }
}

/// Model file locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Directory containing model files.
    pub model_dir: PathBuf,

    /// Text detection model file name.
    pub detection_model: String,

    /// Recognition model file name; chosen from the language set when unset.
    pub recognition_model: Option<String>,

    /// Character dictionary file name; chosen from the language set when unset.
    pub dictionary: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            detection_model: "det.onnx".to_string(),
            recognition_model: None,
            dictionary: None,
        }
    }
}

impl ModelConfig {
    /// Recognition model and dictionary file names for a language set.
    ///
    /// Explicit overrides win. Otherwise the first CJK language picks its
    /// script's model and anything else falls back to Latin.
    pub fn recognition_files(&self, languages: &[String]) -> (String, String) {
        let script = languages
            .iter()
            .find_map(|lang| match lang.as_str() {
                "ko" => Some("korean"),
                "ja" => Some("japan"),
                "zh" => Some("chinese"),
                _ => None,
            })
            .unwrap_or("latin");

        (
            self.recognition_model
                .clone()
                .unwrap_or_else(|| format!("{script}_rec.onnx")),
            self.dictionary
                .clone()
                .unwrap_or_else(|| format!("{script}_dict.txt")),
        )
    }
}

/// Which embedded images feed the recognizer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageSelection {
    /// Only the first image on the page.
    #[default]
    First,
    /// Every image, fragments concatenated in image order.
    All,
}

/// Extraction policy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Images used for OCR regions.
    pub image_selection: ImageSelection,

    /// OCR time budget per region in milliseconds.
    pub ocr_timeout_ms: Option<u64>,

    /// Abort the run when OCR times out instead of leaving the value empty.
    pub timeout_is_fatal: bool,

    /// Pages processed in parallel.
    pub workers: usize,

    /// Save every image sent to OCR as `page_{n}_img.png` here.
    pub image_dump_dir: Option<PathBuf>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            image_selection: ImageSelection::First,
            ocr_timeout_ms: None,
            timeout_is_fatal: false,
            workers: 1,
            image_dump_dir: None,
        }
    }
}

impl PdfRegionConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| PdfRegionError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| PdfRegionError::Config(e.to_string()))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check settings that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let mut labels = HashSet::new();
        for region in &self.regions {
            if !labels.insert(region.label()) {
                return Err(PdfRegionError::Config(format!(
                    "duplicate region label {:?}",
                    region.label()
                )));
            }
        }
        if self.ocr.languages.is_empty() {
            return Err(PdfRegionError::Config("no OCR languages configured".to_string()));
        }
        if self.extraction.workers == 0 {
            return Err(PdfRegionError::Config("workers must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = PdfRegionConfig::default();
        assert!(config.regions.is_empty());
        assert_eq!(config.ocr.languages, vec!["ko", "en"]);
        assert_eq!(config.extraction.image_selection, ImageSelection::First);
        assert_eq!(config.extraction.workers, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: PdfRegionConfig = serde_json::from_str(
            r#"{
                "regions": [{"label": "소재지", "rect": [103.0, 141.0, 325.0, 163.0]}],
                "extraction": {"image_selection": "all", "ocr_timeout_ms": 5000}
            }"#,
        )
        .unwrap();

        assert_eq!(config.regions.len(), 1);
        assert_eq!(config.regions[0].label(), "소재지");
        assert_eq!(config.extraction.image_selection, ImageSelection::All);
        assert_eq!(config.extraction.ocr_timeout_ms, Some(5000));
        assert!(!config.extraction.timeout_is_fatal);
        assert_eq!(config.models.detection_model, "det.onnx");
    }

    #[test]
    fn test_malformed_region_rejected_at_load() {
        let result: std::result::Result<PdfRegionConfig, _> = serde_json::from_str(
            r#"{"regions": [{"label": "a", "rect": [10.0, 0.0, 5.0, 20.0]}]}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_duplicate_labels_rejected() {
        let config: PdfRegionConfig = serde_json::from_str(
            r#"{"regions": [
                {"label": "a", "rect": [0.0, 0.0, 5.0, 5.0]},
                {"label": "a", "rect": [10.0, 10.0, 15.0, 15.0]}
            ]}"#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(PdfRegionError::Config(_))));
    }

    #[test]
    fn test_recognition_files_follow_languages() {
        let models = ModelConfig::default();
        let langs = |l: &[&str]| l.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        assert_eq!(
            models.recognition_files(&langs(&["ko", "en"])),
            ("korean_rec.onnx".to_string(), "korean_dict.txt".to_string())
        );
        assert_eq!(
            models.recognition_files(&langs(&["en"])),
            ("latin_rec.onnx".to_string(), "latin_dict.txt".to_string())
        );

        let overridden = ModelConfig {
            recognition_model: Some("custom.onnx".to_string()),
            ..ModelConfig::default()
        };
        assert_eq!(overridden.recognition_files(&langs(&["ja"])).0, "custom.onnx");
        assert_eq!(overridden.recognition_files(&langs(&["ja"])).1, "japan_dict.txt");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = PdfRegionConfig::default();
        config.regions.push("addr=1,2,30,40@ocr".parse().unwrap());
        config.extraction.workers = 4;
        config.save(&path).unwrap();

        let loaded = PdfRegionConfig::from_file(&path).unwrap();
        assert_eq!(loaded.regions, config.regions);
        assert_eq!(loaded.extraction.workers, 4);
    }
}
