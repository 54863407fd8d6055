//! Text-layer positioning and clipping.
//!
//! The page content stream is interpreted just far enough to place every
//! shown glyph on the page: graphics state (`q`, `Q`, `cm`), text objects,
//! text positioning and text state operators, and form XObjects drawn with
//! `Do`. Glyph boxes are converted to page space (top-left origin of the
//! visible, rotated page) so they can be tested against a region.

use std::collections::{BTreeMap, HashMap};

use lopdf::content::Content;
use lopdf::{Dictionary, Document, Encoding, Object, ObjectId};
use tracing::trace;

use crate::error::PdfError;
use crate::region::Rect;

/// Affine matrix `[a, b, c, d, e, f]` in PDF row-vector convention.
type Matrix = [f32; 6];

const IDENTITY: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// Glyph extent above and below the baseline, as a fraction of font size.
const ASCENT: f32 = 0.8;
const DESCENT: f32 = -0.2;

/// Horizontal gap, relative to font size, that reads as a word break.
const WORD_GAP_RATIO: f32 = 0.2;

/// Nesting limit for form XObjects and page-tree inheritance.
const MAX_DEPTH: usize = 16;

/// CID font width when neither `/W` nor `/DW` gives one, in em.
const DEFAULT_CID_WIDTH: f32 = 1.0;

/// A glyph placed on the page, in page space (top-left origin).
#[derive(Debug, Clone, PartialEq)]
pub struct Glyph {
    pub text: String,
    pub x0: f32,
    pub x1: f32,
    pub top: f32,
    pub bottom: f32,
    /// Baseline position measured from the top of the page.
    pub baseline: f32,
    /// Rendered font size in points.
    pub size: f32,
}

impl Glyph {
    fn center(&self) -> (f32, f32) {
        ((self.x0 + self.x1) / 2.0, (self.top + self.bottom) / 2.0)
    }
}

/// Visible page box used to convert PDF user space into page space.
///
/// The box is the CropBox clipped to the MediaBox; `rotation` is the page's
/// `/Rotate` normalised to 0, 90, 180 or 270 degrees clockwise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageBox {
    pub llx: f32,
    pub lly: f32,
    pub urx: f32,
    pub ury: f32,
    pub rotation: u16,
}

impl PageBox {
    /// Width of the page as displayed.
    pub fn width(&self) -> f32 {
        if self.is_sideways() {
            self.ury - self.lly
        } else {
            self.urx - self.llx
        }
    }

    /// Height of the page as displayed.
    pub fn height(&self) -> f32 {
        if self.is_sideways() {
            self.urx - self.llx
        } else {
            self.ury - self.lly
        }
    }

    fn is_sideways(&self) -> bool {
        self.rotation == 90 || self.rotation == 270
    }

    /// Map a user-space point to page space (top-left origin, y down).
    pub fn to_page_space(&self, x: f32, y: f32) -> (f32, f32) {
        match self.rotation {
            90 => (y - self.lly, x - self.llx),
            180 => (self.urx - x, y - self.lly),
            270 => (self.ury - y, self.urx - x),
            _ => (x - self.llx, self.ury - y),
        }
    }
}

/// Text of all glyphs whose centre lies inside `rect`, in reading order.
///
/// Lines are ordered top-to-bottom and glyphs left-to-right; lines are
/// joined with `\n`. Returns an empty string when nothing falls inside.
pub fn clip_text(glyphs: &[Glyph], rect: Rect) -> String {
    let mut inside: Vec<&Glyph> = glyphs
        .iter()
        .filter(|g| !g.text.trim().is_empty())
        .filter(|g| {
            let (cx, cy) = g.center();
            rect.contains_point(cx, cy)
        })
        .collect();

    if inside.is_empty() {
        return String::new();
    }

    inside.sort_by(|a, b| {
        a.baseline
            .total_cmp(&b.baseline)
            .then(a.x0.total_cmp(&b.x0))
    });

    let mut lines: Vec<Vec<&Glyph>> = Vec::new();
    let mut line_baseline = f32::NAN;
    for glyph in inside {
        let same_line = lines.last().is_some_and(|line| {
            let size = line.iter().map(|g| g.size).fold(glyph.size, f32::max);
            (glyph.baseline - line_baseline).abs() <= size * 0.5
        });
        if same_line {
            if let Some(line) = lines.last_mut() {
                line.push(glyph);
            }
        } else {
            line_baseline = glyph.baseline;
            lines.push(vec![glyph]);
        }
    }

    lines
        .into_iter()
        .map(assemble_line)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn assemble_line(mut glyphs: Vec<&Glyph>) -> String {
    glyphs.sort_by(|a, b| a.x0.total_cmp(&b.x0));

    let mut out = String::new();
    let mut prev: Option<&Glyph> = None;
    for glyph in glyphs {
        if let Some(p) = prev {
            let gap = glyph.x0 - p.x1;
            let threshold = p.size.max(glyph.size) * WORD_GAP_RATIO;
            let spaceless = p.text.chars().last().is_some_and(is_spaceless_script_char)
                && glyph.text.chars().next().is_some_and(is_spaceless_script_char);
            if gap > threshold && !spaceless && !out.ends_with(' ') {
                out.push(' ');
            }
        }
        out.push_str(glyph.text.trim());
        prev = Some(glyph);
    }
    out.trim_end().to_string()
}

/// Scripts written without spaces between words. Hangul is not included.
fn is_spaceless_script_char(c: char) -> bool {
    let code = c as u32;
    (0x4E00..=0x9FFF).contains(&code)
        || (0x3400..=0x4DBF).contains(&code)
        || (0x20000..=0x2EBEF).contains(&code)
        || (0x3040..=0x309F).contains(&code)
        || (0x30A0..=0x30FF).contains(&code)
        || (0x3000..=0x303F).contains(&code)
}

/// Glyphs rendered full-width when no font metrics are available.
fn is_wide_char(c: char) -> bool {
    let code = c as u32;
    is_spaceless_script_char(c)
        || (0xAC00..=0xD7AF).contains(&code)
        || (0x1100..=0x11FF).contains(&code)
        || (0x3130..=0x318F).contains(&code)
        || (0xFF00..=0xFFEF).contains(&code)
}

/// Look up a page attribute, following `/Parent` for inheritable keys.
fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut node = Some(page_id);
    let mut depth = 0;
    while let Some(id) = node {
        let dict = doc.get_dictionary(id).ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(resolve(doc, value));
        }
        depth += 1;
        if depth > MAX_DEPTH {
            return None;
        }
        node = dict.get(b"Parent").and_then(Object::as_reference).ok();
    }
    None
}

/// Resources dictionary of a page, inherited from the page tree if needed.
pub fn page_resources(doc: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    inherited(doc, page_id, b"Resources").and_then(|o| o.as_dict().ok())
}

fn rectangle(doc: &Document, obj: &Object, key: &str) -> Result<[f32; 4], PdfError> {
    let values = obj
        .as_array()
        .map_err(|e| PdfError::Parse(format!("{key}: {e}")))?
        .iter()
        .filter_map(|o| number(resolve(doc, o)))
        .collect::<Vec<_>>();
    match values[..] {
        [x0, y0, x1, y1] => Ok([x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1)]),
        _ => Err(PdfError::Parse(format!(
            "{key} has {} numeric entries",
            values.len()
        ))),
    }
}

/// Resolve the visible page box from the (possibly inherited) MediaBox,
/// CropBox and Rotate entries.
pub fn page_box(doc: &Document, page_id: ObjectId) -> Result<PageBox, PdfError> {
    doc.get_dictionary(page_id)
        .map_err(|e| PdfError::Parse(format!("page dictionary: {e}")))?;

    let media = inherited(doc, page_id, b"MediaBox")
        .ok_or_else(|| PdfError::Parse("page has no MediaBox".to_string()))?;
    let [mut llx, mut lly, mut urx, mut ury] = rectangle(doc, media, "MediaBox")?;

    if let Some(crop) = inherited(doc, page_id, b"CropBox") {
        match rectangle(doc, crop, "CropBox") {
            Ok([cx0, cy0, cx1, cy1]) if cx0.max(llx) < cx1.min(urx) && cy0.max(lly) < cy1.min(ury) => {
                llx = cx0.max(llx);
                lly = cy0.max(lly);
                urx = cx1.min(urx);
                ury = cy1.min(ury);
            }
            _ => trace!("Ignoring unusable CropBox on page object {:?}", page_id),
        }
    }

    let rotation = inherited(doc, page_id, b"Rotate")
        .and_then(|o| o.as_i64().ok())
        .map(|r| r.rem_euclid(360))
        .filter(|r| r % 90 == 0)
        .unwrap_or(0) as u16;

    Ok(PageBox {
        llx,
        lly,
        urx,
        ury,
        rotation,
    })
}

/// Per-font data needed to decode and advance glyphs.
struct FontInfo<'a> {
    encoding: Option<Encoding<'a>>,
    kind: FontKind,
}

enum FontKind {
    /// Single-byte font with `/Widths` indexed from `/FirstChar`.
    Simple { first_char: i64, widths: Vec<f32> },
    /// Type0 font with two-byte codes and CID widths from its descendant.
    Composite {
        identity: bool,
        widths: HashMap<u32, f32>,
        default_width: f32,
    },
}

impl<'a> FontInfo<'a> {
    fn new(doc: &'a Document, dict: &'a Dictionary) -> Self {
        let encoding = dict.get_font_encoding(doc).ok();
        let composite = dict
            .get(b"Subtype")
            .and_then(Object::as_name)
            .is_ok_and(|s| s == b"Type0");

        let kind = if composite {
            composite_kind(doc, dict)
        } else {
            let first_char = dict
                .get(b"FirstChar")
                .ok()
                .and_then(|o| number(resolve(doc, o)))
                .unwrap_or(0.0) as i64;
            let widths = dict
                .get(b"Widths")
                .ok()
                .and_then(|o| resolve(doc, o).as_array().ok())
                .map(|arr| {
                    arr.iter()
                        .map(|w| number(resolve(doc, w)).unwrap_or(0.0) / 1000.0)
                        .collect()
                })
                .unwrap_or_default();
            FontKind::Simple { first_char, widths }
        };

        Self { encoding, kind }
    }

    fn simple_width(&self, code: u8) -> Option<f32> {
        let FontKind::Simple { first_char, widths } = &self.kind else {
            return None;
        };
        let idx = i64::from(code) - first_char;
        usize::try_from(idx)
            .ok()
            .and_then(|i| widths.get(i))
            .copied()
            .filter(|w| *w > 0.0)
    }
}

fn composite_kind(doc: &Document, dict: &Dictionary) -> FontKind {
    let identity = dict
        .get(b"Encoding")
        .and_then(Object::as_name)
        .is_ok_and(|e| e == b"Identity-H" || e == b"Identity-V");

    let descendant = dict
        .get(b"DescendantFonts")
        .ok()
        .and_then(|o| resolve(doc, o).as_array().ok())
        .and_then(|arr| arr.first())
        .and_then(|o| resolve(doc, o).as_dict().ok());

    let default_width = descendant
        .and_then(|d| d.get(b"DW").ok())
        .and_then(|o| number(resolve(doc, o)))
        .map(|w| w / 1000.0)
        .unwrap_or(DEFAULT_CID_WIDTH);
    let widths = descendant
        .and_then(|d| d.get(b"W").ok())
        .and_then(|o| resolve(doc, o).as_array().ok())
        .map(|arr| parse_cid_widths(doc, arr))
        .unwrap_or_default();

    FontKind::Composite {
        identity,
        widths,
        default_width,
    }
}

/// Parse a CID font `/W` array into widths in em.
///
/// Entries are either `c [w1 w2 ...]` (consecutive CIDs from `c`) or
/// `c_first c_last w` (one width for a range).
fn parse_cid_widths(doc: &Document, items: &[Object]) -> HashMap<u32, f32> {
    let mut widths = HashMap::new();
    let mut i = 0;
    while i < items.len() {
        let Some(start) = number(resolve(doc, &items[i])).map(|n| n as u32) else {
            i += 1;
            continue;
        };
        let Some(next) = items.get(i + 1).map(|o| resolve(doc, o)) else {
            break;
        };

        if let Ok(list) = next.as_array() {
            for (offset, w) in list.iter().enumerate() {
                if let Some(w) = number(resolve(doc, w)) {
                    widths.insert(start + offset as u32, w / 1000.0);
                }
            }
            i += 2;
        } else if let Some(end) = number(next).map(|n| n as u32) {
            let width = items.get(i + 2).and_then(|o| number(resolve(doc, o)));
            if let Some(w) = width {
                // Guard against absurd ranges in damaged files.
                for cid in start..=end.min(start.saturating_add(0xFFFF)) {
                    widths.insert(cid, w / 1000.0);
                }
            }
            i += 3;
        } else {
            i += 2;
        }
    }
    widths
}

/// Fonts named in a resources dictionary, or `None` when it has no `/Font`.
fn resource_fonts<'a>(doc: &'a Document, resources: &'a Dictionary) -> Option<BTreeMap<Vec<u8>, FontInfo<'a>>> {
    let fonts = resources
        .get(b"Font")
        .ok()
        .and_then(|o| resolve(doc, o).as_dict().ok())?;
    Some(
        fonts
            .iter()
            .filter_map(|(name, obj)| {
                let dict = resolve(doc, obj).as_dict().ok()?;
                Some((name.clone(), FontInfo::new(doc, dict)))
            })
            .collect(),
    )
}

/// Graphics and text state saved by `q` and restored by `Q`.
#[derive(Debug, Clone)]
struct GraphicsState {
    ctm: Matrix,
    font: Vec<u8>,
    font_size: f32,
    char_spacing: f32,
    word_spacing: f32,
    horiz_scale: f32,
    leading: f32,
    rise: f32,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            ctm: IDENTITY,
            font: Vec::new(),
            font_size: 12.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horiz_scale: 1.0,
            leading: 0.0,
            rise: 0.0,
        }
    }
}

/// A decoded glyph: text, advance width in em, and whether it came from
/// the single-byte code 32 (which word spacing applies to).
struct DecodedGlyph {
    text: String,
    width: f32,
    is_space_code: bool,
}

/// Content-stream interpreter producing page-space glyphs.
struct GlyphCollector<'a> {
    doc: &'a Document,
    resources: Option<&'a Dictionary>,
    fonts: BTreeMap<Vec<u8>, FontInfo<'a>>,
    page_box: PageBox,
    state: GraphicsState,
    stack: Vec<GraphicsState>,
    text_matrix: Matrix,
    line_matrix: Matrix,
    depth: usize,
    glyphs: Vec<Glyph>,
}

/// Place every glyph shown on a page.
pub fn page_glyphs(doc: &Document, page_id: ObjectId) -> Result<Vec<Glyph>, PdfError> {
    let page_box = page_box(doc, page_id)?;
    let resources = page_resources(doc, page_id);
    let fonts = resources
        .and_then(|r| resource_fonts(doc, r))
        .unwrap_or_default();

    let raw = doc
        .get_page_content(page_id)
        .map_err(|e| PdfError::TextExtraction(format!("content stream: {e}")))?;
    let content =
        Content::decode(&raw).map_err(|e| PdfError::TextExtraction(format!("content: {e}")))?;

    let mut collector = GlyphCollector {
        doc,
        resources,
        fonts,
        page_box,
        state: GraphicsState::default(),
        stack: Vec::new(),
        text_matrix: IDENTITY,
        line_matrix: IDENTITY,
        depth: 0,
        glyphs: Vec::new(),
    };
    for op in &content.operations {
        collector.apply(&op.operator, &op.operands);
    }

    trace!("Placed {} glyphs on page object {:?}", collector.glyphs.len(), page_id);
    Ok(collector.glyphs)
}

impl<'a> GlyphCollector<'a> {
    fn apply(&mut self, operator: &str, operands: &[Object]) {
        let num = |i: usize| operands.get(i).and_then(number);
        match operator {
            "q" => self.stack.push(self.state.clone()),
            "Q" => {
                if let Some(saved) = self.stack.pop() {
                    self.state = saved;
                }
            }
            "cm" => {
                if let Some(m) = matrix_operands(operands) {
                    self.state.ctm = concat(&m, &self.state.ctm);
                }
            }
            "Do" => {
                if let Some(Object::Name(name)) = operands.first() {
                    self.draw_form(name);
                }
            }
            "BT" => {
                self.text_matrix = IDENTITY;
                self.line_matrix = IDENTITY;
            }
            "Tf" => {
                if let Some(Object::Name(name)) = operands.first() {
                    self.state.font = name.clone();
                }
                if let Some(size) = num(1) {
                    self.state.font_size = size;
                }
            }
            "Tc" => self.state.char_spacing = num(0).unwrap_or(0.0),
            "Tw" => self.state.word_spacing = num(0).unwrap_or(0.0),
            "Tz" => self.state.horiz_scale = num(0).unwrap_or(100.0) / 100.0,
            "TL" => self.state.leading = num(0).unwrap_or(0.0),
            "Ts" => self.state.rise = num(0).unwrap_or(0.0),
            "Td" => {
                if let (Some(tx), Some(ty)) = (num(0), num(1)) {
                    self.move_line(tx, ty);
                }
            }
            "TD" => {
                if let (Some(tx), Some(ty)) = (num(0), num(1)) {
                    self.state.leading = -ty;
                    self.move_line(tx, ty);
                }
            }
            "Tm" => {
                if let Some(m) = matrix_operands(operands) {
                    self.text_matrix = m;
                    self.line_matrix = m;
                }
            }
            "T*" => self.next_line(),
            "Tj" => {
                if let Some(Object::String(bytes, _)) = operands.first() {
                    self.show(bytes);
                }
            }
            "'" => {
                self.next_line();
                if let Some(Object::String(bytes, _)) = operands.first() {
                    self.show(bytes);
                }
            }
            "\"" => {
                self.state.word_spacing = num(0).unwrap_or(self.state.word_spacing);
                self.state.char_spacing = num(1).unwrap_or(self.state.char_spacing);
                self.next_line();
                if let Some(Object::String(bytes, _)) = operands.get(2) {
                    self.show(bytes);
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = operands.first() {
                    for item in items {
                        match item {
                            Object::String(bytes, _) => self.show(bytes),
                            other => {
                                if let Some(adjust) = number(other) {
                                    let tx = -adjust / 1000.0
                                        * self.state.font_size
                                        * self.state.horiz_scale;
                                    self.advance(tx);
                                }
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }

    /// Interpret a form XObject in place: its `/Matrix` applies on top of
    /// the current CTM and its own resources supply fonts and nested forms.
    fn draw_form(&mut self, name: &[u8]) {
        let doc = self.doc;
        let Some(stream) = self
            .resources
            .and_then(|r| r.get(b"XObject").ok())
            .and_then(|x| resolve(doc, x).as_dict().ok())
            .and_then(|x| x.get(name).ok())
            .and_then(|o| resolve(doc, o).as_stream().ok())
        else {
            return;
        };
        let is_form = stream
            .dict
            .get(b"Subtype")
            .and_then(Object::as_name)
            .is_ok_and(|s| s == b"Form");
        if !is_form {
            return;
        }
        if self.depth >= MAX_DEPTH {
            trace!("Form XObject {} nested too deeply", String::from_utf8_lossy(name));
            return;
        }

        let content = match stream
            .get_plain_content()
            .map_err(|e| e.to_string())
            .and_then(|raw| Content::decode(&raw).map_err(|e| e.to_string()))
        {
            Ok(content) => content,
            Err(e) => {
                trace!("Skipping form XObject {}: {}", String::from_utf8_lossy(name), e);
                return;
            }
        };

        let form_resources = stream
            .dict
            .get(b"Resources")
            .ok()
            .and_then(|r| resolve(doc, r).as_dict().ok());

        let saved_state = self.state.clone();
        let saved_stack = self.stack.len();
        let saved_text = (self.text_matrix, self.line_matrix);
        let outer_resources = self.resources;
        let outer_fonts = form_resources
            .and_then(|r| resource_fonts(doc, r))
            .map(|fonts| std::mem::replace(&mut self.fonts, fonts));

        if let Some(m) = stream
            .dict
            .get(b"Matrix")
            .ok()
            .and_then(|o| resolve(doc, o).as_array().ok())
            .and_then(|arr| matrix_operands(arr))
        {
            self.state.ctm = concat(&m, &self.state.ctm);
        }
        if form_resources.is_some() {
            self.resources = form_resources;
        }
        self.depth += 1;

        for op in &content.operations {
            self.apply(&op.operator, &op.operands);
        }

        self.depth -= 1;
        self.resources = outer_resources;
        if let Some(fonts) = outer_fonts {
            self.fonts = fonts;
        }
        self.stack.truncate(saved_stack);
        self.state = saved_state;
        (self.text_matrix, self.line_matrix) = saved_text;
    }

    fn move_line(&mut self, tx: f32, ty: f32) {
        self.line_matrix = concat(&[1.0, 0.0, 0.0, 1.0, tx, ty], &self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    fn next_line(&mut self) {
        let leading = self.state.leading;
        self.move_line(0.0, -leading);
    }

    fn advance(&mut self, tx: f32) {
        self.text_matrix = concat(&[1.0, 0.0, 0.0, 1.0, tx, 0.0], &self.text_matrix);
    }

    fn show(&mut self, bytes: &[u8]) {
        for glyph in self.decode_glyphs(bytes) {
            let mut tx = glyph.width * self.state.font_size + self.state.char_spacing;
            if glyph.is_space_code {
                tx += self.state.word_spacing;
            }
            self.place_glyph(glyph.text, glyph.width);
            self.advance(tx * self.state.horiz_scale);
        }
    }

    fn decode_glyphs(&self, bytes: &[u8]) -> Vec<DecodedGlyph> {
        let font = self.fonts.get(&self.state.font);
        match font {
            Some(f) if matches!(f.kind, FontKind::Composite { .. }) => decode_composite(f, bytes),
            _ => decode_simple(font, bytes),
        }
    }

    fn place_glyph(&mut self, text: String, w0: f32) {
        let s = &self.state;
        let text_render = [s.font_size * s.horiz_scale, 0.0, 0.0, s.font_size, 0.0, s.rise];
        let trm = concat(&concat(&text_render, &self.text_matrix), &s.ctm);

        let pb = self.page_box;
        let to_page = |x: f32, y: f32| {
            let (ux, uy) = transform(&trm, x, y);
            pb.to_page_space(ux, uy)
        };
        let corners = [
            to_page(0.0, DESCENT),
            to_page(w0, DESCENT),
            to_page(0.0, ASCENT),
            to_page(w0, ASCENT),
        ];
        let x0 = corners.iter().map(|p| p.0).fold(f32::INFINITY, f32::min);
        let x1 = corners.iter().map(|p| p.0).fold(f32::NEG_INFINITY, f32::max);
        let top = corners.iter().map(|p| p.1).fold(f32::INFINITY, f32::min);
        let bottom = corners.iter().map(|p| p.1).fold(f32::NEG_INFINITY, f32::max);
        let (_, baseline) = to_page(0.0, 0.0);
        let size = (trm[2] * trm[2] + trm[3] * trm[3]).sqrt();

        self.glyphs.push(Glyph {
            text,
            x0,
            x1,
            top,
            bottom,
            baseline,
            size,
        });
    }
}

/// Decode a string shown with a simple (single-byte) font.
fn decode_simple(font: Option<&FontInfo<'_>>, bytes: &[u8]) -> Vec<DecodedGlyph> {
    let text = font
        .and_then(|f| f.encoding.as_ref())
        .and_then(|enc| Document::decode_text(enc, bytes).ok())
        .unwrap_or_else(|| decode_text_simple(bytes));

    // One byte per char lets widths and word spacing be looked up by code.
    let codes = (text.chars().count() == bytes.len()).then_some(bytes);

    text.chars()
        .enumerate()
        .map(|(i, ch)| {
            let code = codes.map(|c| c[i]);
            let width = code
                .and_then(|c| font.and_then(|f| f.simple_width(c)))
                .unwrap_or(if is_wide_char(ch) { 1.0 } else { 0.5 });
            DecodedGlyph {
                text: ch.to_string(),
                width,
                is_space_code: code == Some(b' '),
            }
        })
        .collect()
}

/// Decode a string shown with a Type0 font, two bytes per code.
fn decode_composite(font: &FontInfo<'_>, bytes: &[u8]) -> Vec<DecodedGlyph> {
    let FontKind::Composite {
        identity,
        widths,
        default_width,
    } = &font.kind
    else {
        return Vec::new();
    };

    bytes
        .chunks(2)
        .map(|chunk| {
            let code = chunk.iter().fold(0u32, |acc, b| (acc << 8) | u32::from(*b));
            let text = font
                .encoding
                .as_ref()
                .and_then(|enc| Document::decode_text(enc, chunk).ok())
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| {
                    // Non-identity CMaps used with Korean fonts are UCS-2.
                    let fallback = if *identity { None } else { char::from_u32(code) };
                    fallback.unwrap_or(char::REPLACEMENT_CHARACTER).to_string()
                });
            // Identity encodings use the code as the CID.
            let width = if *identity {
                widths.get(&code).copied().unwrap_or(*default_width)
            } else {
                *default_width
            };
            DecodedGlyph {
                text,
                width,
                is_space_code: false,
            }
        })
        .collect()
}

/// `a × b` in row-vector convention (apply `a` first, then `b`).
fn concat(a: &Matrix, b: &Matrix) -> Matrix {
    [
        a[0] * b[0] + a[1] * b[2],
        a[0] * b[1] + a[1] * b[3],
        a[2] * b[0] + a[3] * b[2],
        a[2] * b[1] + a[3] * b[3],
        a[4] * b[0] + a[5] * b[2] + b[4],
        a[4] * b[1] + a[5] * b[3] + b[5],
    ]
}

fn transform(m: &Matrix, x: f32, y: f32) -> (f32, f32) {
    (x * m[0] + y * m[2] + m[4], x * m[1] + y * m[3] + m[5])
}

fn matrix_operands(operands: &[Object]) -> Option<Matrix> {
    if operands.len() < 6 {
        return None;
    }
    let mut m = IDENTITY;
    for (slot, obj) in m.iter_mut().zip(operands) {
        *slot = number(obj)?;
    }
    Some(m)
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        _ => obj,
    }
}

/// Fallback decoding when the font encoding is unavailable.
fn decode_text_simple(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let utf16: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        return String::from_utf16_lossy(&utf16);
    }
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}
