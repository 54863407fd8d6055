//! Region specifications: a labelled rectangle in page space plus the
//! strategy used to extract its content.
//!
//! Page space is measured in PDF points with the origin at the top-left
//! corner of the page and y growing downward, the same orientation as a
//! rendered bitmap. A bitmap rendered at scale `s` maps point `p` to pixel
//! `p * s`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ExtractionError;

/// Tolerance applied when comparing a rectangle against page bounds.
const BOUNDS_EPSILON: f32 = 1e-3;

/// Axis-aligned rectangle `(x0, y0, x1, y1)` in page-space points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct Rect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Rect {
    pub const fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    /// Whether a point lies inside the rectangle (edges included).
    pub fn contains_point(&self, x: f32, y: f32) -> bool {
        x >= self.x0 && x <= self.x1 && y >= self.y0 && y <= self.y1
    }

    /// Check the rectangle is well formed: finite, non-negative, and with
    /// `x0 < x1`, `y0 < y1`.
    pub fn validate(&self) -> Result<(), String> {
        let coords = [self.x0, self.y0, self.x1, self.y1];
        if coords.iter().any(|c| !c.is_finite()) {
            return Err("coordinates must be finite".to_string());
        }
        if coords.iter().any(|c| *c < 0.0) {
            return Err(format!("coordinates must be non-negative, got {self}"));
        }
        if self.x0 >= self.x1 {
            return Err(format!("x0 ({}) must be less than x1 ({})", self.x0, self.x1));
        }
        if self.y0 >= self.y1 {
            return Err(format!("y0 ({}) must be less than y1 ({})", self.y0, self.y1));
        }
        Ok(())
    }

    /// Whether the rectangle lies entirely within a page of the given size.
    pub fn fits_within(&self, size: PageSize) -> bool {
        self.x1 <= size.width + BOUNDS_EPSILON && self.y1 <= size.height + BOUNDS_EPSILON
    }
}

impl From<[f32; 4]> for Rect {
    fn from(c: [f32; 4]) -> Self {
        Self::new(c[0], c[1], c[2], c[3])
    }
}

impl From<Rect> for [f32; 4] {
    fn from(r: Rect) -> Self {
        [r.x0, r.y0, r.x1, r.y1]
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {}, {})", self.x0, self.y0, self.x1, self.y1)
    }
}

/// Page dimensions in points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Extraction strategy for a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Clip the PDF's text layer to the rectangle.
    #[default]
    TextLayer,
    /// Recognize text in the page's embedded raster image.
    ImageOcr,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::TextLayer => write!(f, "text_layer"),
            Strategy::ImageOcr => write!(f, "image_ocr"),
        }
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" | "text_layer" | "textlayer" => Ok(Strategy::TextLayer),
            "ocr" | "image_ocr" | "imageocr" => Ok(Strategy::ImageOcr),
            other => Err(format!("unknown strategy: {other}")),
        }
    }
}

/// An immutable, validated region specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRegionSpec", into = "RawRegionSpec")]
pub struct RegionSpec {
    label: String,
    rect: Rect,
    strategy: Strategy,
}

impl RegionSpec {
    /// Create a region, rejecting empty labels and malformed rectangles.
    pub fn new(
        label: impl Into<String>,
        rect: Rect,
        strategy: Strategy,
    ) -> Result<Self, ExtractionError> {
        let label = label.into();
        if label.trim().is_empty() {
            return Err(ExtractionError::invalid_region(label, "label must not be empty"));
        }
        rect.validate()
            .map_err(|reason| ExtractionError::invalid_region(label.clone(), reason))?;
        Ok(Self {
            label,
            rect,
            strategy,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Check the region against a page's bounds.
    pub fn check_bounds(&self, page: usize, size: PageSize) -> Result<(), ExtractionError> {
        if self.rect.fits_within(size) {
            Ok(())
        } else {
            Err(ExtractionError::InvalidRegion {
                label: self.label.clone(),
                page: Some(page),
                reason: format!(
                    "rectangle {} lies outside the page bounds {}x{}",
                    self.rect, size.width, size.height
                ),
            })
        }
    }
}

/// Parses `label=x0,y0,x1,y1` with an optional `@text` / `@ocr` suffix.
impl FromStr for RegionSpec {
    type Err = ExtractionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (label, geometry) = s
            .split_once('=')
            .ok_or_else(|| ExtractionError::invalid_region(s, "expected label=x0,y0,x1,y1"))?;

        let (coords, strategy) = match geometry.rsplit_once('@') {
            Some((coords, strategy)) => (
                coords,
                strategy
                    .parse::<Strategy>()
                    .map_err(|e| ExtractionError::invalid_region(label, e))?,
            ),
            None => (geometry, Strategy::TextLayer),
        };

        let values = coords
            .split(',')
            .map(|v| v.trim().parse::<f32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ExtractionError::invalid_region(label, format!("bad coordinate: {e}")))?;

        let [x0, y0, x1, y1] = values[..] else {
            return Err(ExtractionError::invalid_region(
                label,
                format!("expected 4 coordinates, got {}", values.len()),
            ));
        };

        RegionSpec::new(label.trim(), Rect::new(x0, y0, x1, y1), strategy)
    }
}

/// Serialized form of [`RegionSpec`]; validated on conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawRegionSpec {
    label: String,
    rect: Rect,
    #[serde(default)]
    strategy: Strategy,
}

impl TryFrom<RawRegionSpec> for RegionSpec {
    type Error = ExtractionError;

    fn try_from(raw: RawRegionSpec) -> Result<Self, Self::Error> {
        RegionSpec::new(raw.label, raw.rect, raw.strategy)
    }
}

impl From<RegionSpec> for RawRegionSpec {
    fn from(spec: RegionSpec) -> Self {
        Self {
            label: spec.label,
            rect: spec.rect,
            strategy: spec.strategy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_new_rejects_inverted_rect() {
        let err = RegionSpec::new("a", Rect::new(10.0, 0.0, 10.0, 5.0), Strategy::TextLayer)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRegion);

        let err = RegionSpec::new("a", Rect::new(0.0, 9.0, 10.0, 5.0), Strategy::TextLayer)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRegion);
    }

    #[test]
    fn test_new_rejects_negative_and_nan() {
        assert!(RegionSpec::new("a", Rect::new(-1.0, 0.0, 10.0, 5.0), Strategy::TextLayer).is_err());
        assert!(RegionSpec::new("a", Rect::new(0.0, 0.0, f32::NAN, 5.0), Strategy::TextLayer).is_err());
        assert!(RegionSpec::new(" ", Rect::new(0.0, 0.0, 1.0, 1.0), Strategy::TextLayer).is_err());
    }

    #[test]
    fn test_parse_region_argument() {
        let spec: RegionSpec = "소재지=103,141,325,163".parse().unwrap();
        assert_eq!(spec.label(), "소재지");
        assert_eq!(spec.rect(), Rect::new(103.0, 141.0, 325.0, 163.0));
        assert_eq!(spec.strategy(), Strategy::TextLayer);

        let spec: RegionSpec = "scan=0,0,612,792@ocr".parse().unwrap();
        assert_eq!(spec.strategy(), Strategy::ImageOcr);
    }

    #[test]
    fn test_parse_region_argument_errors() {
        assert!("nolabel".parse::<RegionSpec>().is_err());
        assert!("a=1,2,3".parse::<RegionSpec>().is_err());
        assert!("a=1,2,3,x".parse::<RegionSpec>().is_err());
        assert!("a=1,2,3,4@fax".parse::<RegionSpec>().is_err());
    }

    #[test]
    fn test_check_bounds() {
        let spec = RegionSpec::new("a", Rect::new(103.0, 141.0, 325.0, 163.0), Strategy::TextLayer)
            .unwrap();
        assert!(spec.check_bounds(0, PageSize::new(612.0, 792.0)).is_ok());

        let err = spec.check_bounds(2, PageSize::new(300.0, 792.0)).unwrap_err();
        match err {
            ExtractionError::InvalidRegion { page, .. } => assert_eq!(page, Some(2)),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_json_form() {
        let json = r#"{"label":"소재지","rect":[103.0,141.0,325.0,163.0],"strategy":"image_ocr"}"#;
        let spec: RegionSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.strategy(), Strategy::ImageOcr);
        assert_eq!(serde_json::to_string(&spec).unwrap(), json);

        let defaulted: RegionSpec =
            serde_json::from_str(r#"{"label":"a","rect":[0,0,1,1]}"#).unwrap();
        assert_eq!(defaulted.strategy(), Strategy::TextLayer);

        let malformed = serde_json::from_str::<RegionSpec>(r#"{"label":"a","rect":[5,0,1,1]}"#);
        assert!(malformed.is_err());
    }
}
