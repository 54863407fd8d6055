//! Turning a rectangle drawn on a rendered page into a page-space region.
//!
//! Rendering itself is left to a [`PageRasterizer`] implementation supplied
//! by the interactive front end. A bitmap rendered at `dpi` maps a page
//! point to `dpi / 72` pixels, with the same top-left origin as page space.

use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::error::{ExtractionError, PdfError};
use crate::region::{Rect, RegionSpec, Strategy};

/// Points per inch in PDF user space.
pub const POINTS_PER_INCH: f32 = 72.0;

/// Pixels per page point at `dpi`.
pub fn scale_for_dpi(dpi: f32) -> f32 {
    dpi / POINTS_PER_INCH
}

/// Renders a page to a bitmap for interactive region drawing.
pub trait PageRasterizer {
    fn render(&self, page_index: usize, dpi: f32) -> Result<RenderedPage, PdfError>;
}

/// A page bitmap together with its pixel-per-point scale.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub page_index: usize,
    pub image: DynamicImage,
    pub scale: f32,
}

impl RenderedPage {
    pub fn new(page_index: usize, image: DynamicImage, dpi: f32) -> Self {
        Self {
            page_index,
            image,
            scale: scale_for_dpi(dpi),
        }
    }

    /// Page-space rectangle for a pixel rectangle drawn on this bitmap.
    pub fn to_page_rect(&self, rect: PixelRect) -> Rect {
        rect.to_page_rect(self.scale)
    }
}

/// Rectangle in bitmap pixels, normalised so that `x0 <= x1` and `y0 <= y1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelRect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl PixelRect {
    /// Rectangle spanned by two corners given in any order.
    pub fn from_corners(a: (f32, f32), b: (f32, f32)) -> Self {
        Self {
            x0: a.0.min(b.0),
            y0: a.1.min(b.1),
            x1: a.0.max(b.0),
            y1: a.1.max(b.1),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.x1 <= self.x0 || self.y1 <= self.y0
    }

    /// Inverse-scale to page points. Corners dragged past the top or left
    /// edge of the bitmap are clamped to zero.
    pub fn to_page_rect(&self, scale: f32) -> Rect {
        Rect::new(
            (self.x0 / scale).max(0.0),
            (self.y0 / scale).max(0.0),
            (self.x1 / scale).max(0.0),
            (self.y1 / scale).max(0.0),
        )
    }
}

/// Mouse-drag selection state.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum SelectionState {
    #[default]
    Idle,
    Dragging {
        start: (f32, f32),
        current: (f32, f32),
    },
    Committed(PixelRect),
}

/// Drag-to-select state machine: `Idle -> Dragging -> Committed`.
#[derive(Debug, Clone, Default)]
pub struct RegionSelection {
    state: SelectionState,
}

impl RegionSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SelectionState {
        self.state
    }

    /// Start a drag. A committed selection is discarded.
    pub fn press(&mut self, x: f32, y: f32) {
        self.state = SelectionState::Dragging {
            start: (x, y),
            current: (x, y),
        };
    }

    /// Move the free corner; returns the live rectangle while dragging.
    pub fn drag_to(&mut self, x: f32, y: f32) -> Option<PixelRect> {
        match &mut self.state {
            SelectionState::Dragging { start, current } => {
                *current = (x, y);
                Some(PixelRect::from_corners(*start, *current))
            }
            _ => None,
        }
    }

    /// Finish the drag. A zero-area drag returns to `Idle`.
    pub fn release(&mut self, x: f32, y: f32) -> Option<PixelRect> {
        let SelectionState::Dragging { start, .. } = self.state else {
            return None;
        };

        let rect = PixelRect::from_corners(start, (x, y));
        if rect.is_empty() {
            self.state = SelectionState::Idle;
            return None;
        }
        self.state = SelectionState::Committed(rect);
        Some(rect)
    }

    pub fn reset(&mut self) {
        self.state = SelectionState::Idle;
    }

    /// Rectangle currently shown: live while dragging, final once committed.
    pub fn current_rect(&self) -> Option<PixelRect> {
        match self.state {
            SelectionState::Idle => None,
            SelectionState::Dragging { start, current } => Some(PixelRect::from_corners(start, current)),
            SelectionState::Committed(rect) => Some(rect),
        }
    }

    /// Turn the committed selection into a region on a bitmap at `scale`.
    pub fn to_region_spec(
        &self,
        label: &str,
        scale: f32,
        strategy: Strategy,
    ) -> Result<RegionSpec, ExtractionError> {
        match self.state {
            SelectionState::Committed(rect) => RegionSpec::new(label, rect.to_page_rect(scale), strategy),
            _ => Err(ExtractionError::invalid_region(label, "no committed selection")),
        }
    }
}
