//! PDF document provider backed by lopdf.

use std::collections::HashSet;
use std::io::Cursor;
use std::path::Path;

use image::{DynamicImage, ImageBuffer, Luma, Rgb};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use tracing::{debug, trace};

use super::text_layer::{self, clip_text};
use super::{DocumentSource, EmbeddedImage, ImageFormat, Result};
use crate::error::{ExtractionError, PdfError};
use crate::region::{PageSize, Rect};

/// Nesting limit for form XObjects.
const MAX_DEPTH: usize = 16;

/// An open PDF document.
pub struct PdfDocument {
    document: Document,
    pages: Vec<ObjectId>,
}

impl PdfDocument {
    /// Open a PDF from a file path.
    pub fn open(path: &Path) -> std::result::Result<Self, ExtractionError> {
        let data = std::fs::read(path).map_err(|e| {
            ExtractionError::DocumentOpen(PdfError::Parse(format!("{}: {}", path.display(), e)))
        })?;
        Self::from_bytes(&data)
    }

    /// Open a PDF from its bytes.
    pub fn from_bytes(data: &[u8]) -> std::result::Result<Self, ExtractionError> {
        Self::load(data).map_err(ExtractionError::DocumentOpen)
    }

    fn load(data: &[u8]) -> Result<Self> {
        let mut document = Document::load_mem(data).map_err(|e| PdfError::Parse(e.to_string()))?;

        // Handle PDFs with empty password encryption
        if document.is_encrypted() {
            if document.decrypt("").is_err() {
                return Err(PdfError::Encrypted);
            }
            debug!("Decrypted PDF with empty password");
        }

        let pages: Vec<ObjectId> = document.get_pages().into_values().collect();
        if pages.is_empty() {
            return Err(PdfError::NoPages);
        }

        debug!("Loaded PDF with {} pages", pages.len());
        Ok(Self { document, pages })
    }

    fn page_id(&self, page: usize) -> Result<ObjectId> {
        self.pages.get(page).copied().ok_or(PdfError::InvalidPage(page))
    }

    fn try_extract_image_from_object(&self, obj: &Object) -> Option<EmbeddedImage> {
        let Object::Stream(stream) = obj else {
            return None;
        };
        let dict = &stream.dict;

        if dict.get(b"Subtype").ok()?.as_name().ok()? != b"Image" {
            return None;
        }

        let width = dict.get(b"Width").ok()?.as_i64().ok()? as u32;
        let height = dict.get(b"Height").ok()?.as_i64().ok()? as u32;

        trace!("Found image object: {}x{}", width, height);

        let filters: Vec<&[u8]> = match dict.get(b"Filter") {
            Ok(Object::Name(name)) => vec![name.as_slice()],
            Ok(Object::Array(arr)) => arr.iter().filter_map(|o| o.as_name().ok()).collect(),
            _ => Vec::new(),
        };

        match filters.split_last() {
            Some((&b"DCTDecode", outer)) => {
                // JPEG data, possibly wrapped in further filters
                let data = match undo_filters(stream, outer) {
                    Ok(data) => data,
                    Err(e) => {
                        trace!("Could not undo filters around JPEG image: {}", e);
                        return None;
                    }
                };
                return Some(EmbeddedImage {
                    data,
                    width,
                    height,
                    format: ImageFormat::Jpeg,
                });
            }
            Some((&b"JPXDecode", _)) => {
                trace!("Found JPEG2000 image (not supported)");
                return None;
            }
            Some((&b"CCITTFaxDecode", _)) | Some((&b"JBIG2Decode", _)) => {
                trace!("Found fax/JBIG2 image (not supported)");
                return None;
            }
            _ => {}
        }

        let data = match stream.decompressed_content() {
            Ok(d) => d,
            Err(_) => stream.content.clone(),
        };

        let color_space = dict
            .get(b"ColorSpace")
            .ok()
            .and_then(|o| match o {
                Object::Name(name) => Some(name.as_slice()),
                Object::Array(arr) => arr.first().and_then(|o| o.as_name().ok()),
                Object::Reference(r) => self
                    .document
                    .get_object(*r)
                    .ok()
                    .and_then(|o| o.as_name().ok()),
                _ => None,
            })
            .unwrap_or(b"DeviceRGB");

        let bits = dict
            .get(b"BitsPerComponent")
            .ok()
            .and_then(|o| o.as_i64().ok())
            .unwrap_or(8) as u8;

        let bitmap = create_image_from_raw(&data, width, height, color_space, bits)?;
        let mut png = Vec::new();
        if let Err(e) = bitmap.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png) {
            trace!("Could not re-encode image as PNG: {}", e);
            return None;
        }

        Some(EmbeddedImage {
            data: png,
            width,
            height,
            format: ImageFormat::Png,
        })
    }

    /// Collect image XObjects from a resources dictionary, descending into
    /// form XObjects.
    fn collect_images(
        &self,
        resources: &Dictionary,
        seen: &mut HashSet<ObjectId>,
        images: &mut Vec<EmbeddedImage>,
        depth: usize,
    ) {
        if depth > MAX_DEPTH {
            return;
        }
        let Ok(xobjects) = resources.get(b"XObject") else {
            return;
        };
        let Ok((_, Object::Dictionary(xobj_dict))) = self.document.dereference(xobjects) else {
            return;
        };

        for (name, obj_ref) in xobj_dict.iter() {
            if let Object::Reference(id) = obj_ref {
                if !seen.insert(*id) {
                    continue;
                }
            }
            let Ok((_, obj)) = self.document.dereference(obj_ref) else {
                continue;
            };

            if let Some(img) = self.try_extract_image_from_object(obj) {
                trace!(
                    "XObject {} -> {}x{} image",
                    String::from_utf8_lossy(name),
                    img.width,
                    img.height
                );
                images.push(img);
                continue;
            }

            if let Object::Stream(stream) = obj {
                let is_form = stream
                    .dict
                    .get(b"Subtype")
                    .and_then(Object::as_name)
                    .is_ok_and(|s| s == b"Form");
                if is_form {
                    if let Ok((_, Object::Dictionary(form_resources))) = stream
                        .dict
                        .get(b"Resources")
                        .and_then(|r| self.document.dereference(r))
                    {
                        self.collect_images(form_resources, seen, images, depth + 1);
                    }
                }
            }
        }
    }
}

impl DocumentSource for PdfDocument {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_size(&self, page: usize) -> Result<PageSize> {
        let page_box = text_layer::page_box(&self.document, self.page_id(page)?)?;
        Ok(PageSize::new(page_box.width(), page_box.height()))
    }

    fn extract_text(&self, page: usize, rect: Rect) -> Result<String> {
        let glyphs = text_layer::page_glyphs(&self.document, self.page_id(page)?)?;
        let text = clip_text(&glyphs, rect);
        trace!(
            "Clipped {} of {} glyphs on page {} to {}",
            text.chars().filter(|c| !c.is_whitespace()).count(),
            glyphs.len(),
            page,
            rect
        );
        Ok(text)
    }

    fn embedded_images(&self, page: usize) -> Result<Vec<EmbeddedImage>> {
        let page_id = self.page_id(page)?;

        let mut images = Vec::new();
        if let Some(resources) = text_layer::page_resources(&self.document, page_id) {
            let mut seen = HashSet::new();
            self.collect_images(resources, &mut seen, &mut images, 0);
        }

        debug!("Extracted {} images from page {}", images.len(), page);
        Ok(images)
    }
}

/// Apply the decode filters that precede the image's own encoding.
fn undo_filters(stream: &Stream, filters: &[&[u8]]) -> lopdf::Result<Vec<u8>> {
    if filters.is_empty() {
        return Ok(stream.content.clone());
    }
    let mut dict = stream.dict.clone();
    dict.set(
        "Filter",
        Object::Array(filters.iter().map(|f| Object::Name(f.to_vec())).collect()),
    );
    Stream::new(dict, stream.content.clone()).decompressed_content()
}

fn create_image_from_raw(
    data: &[u8],
    width: u32,
    height: u32,
    color_space: &[u8],
    bits_per_component: u8,
) -> Option<DynamicImage> {
    trace!(
        "Creating image from raw data: {}x{}, colorspace={:?}, bits={}",
        width,
        height,
        String::from_utf8_lossy(color_space),
        bits_per_component
    );

    if bits_per_component != 8 {
        trace!("Unsupported bits per component: {}", bits_per_component);
        return None;
    }

    let expected_rgb = (width as usize) * (height as usize) * 3;
    let expected_gray = (width as usize) * (height as usize);

    match color_space {
        b"DeviceRGB" | b"RGB" if data.len() >= expected_rgb => {
            ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, data[..expected_rgb].to_vec())
                .map(DynamicImage::ImageRgb8)
        }
        b"DeviceGray" | b"G" if data.len() >= expected_gray => {
            ImageBuffer::<Luma<u8>, _>::from_raw(width, height, data[..expected_gray].to_vec())
                .map(DynamicImage::ImageLuma8)
        }
        _ => {
            trace!(
                "Could not decode image: data_len={}, expected_rgb={}, expected_gray={}",
                data.len(),
                expected_rgb,
                expected_gray
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    #[test]
    fn test_from_bytes_rejects_garbage() {
        let err = PdfDocument::from_bytes(b"not a pdf").err().unwrap();
        assert_eq!(err.kind(), crate::error::ErrorKind::DocumentOpenFailure);
    }

    #[test]
    fn test_create_image_from_raw_gray() {
        let img = create_image_from_raw(&[0, 64, 128, 255], 2, 2, b"DeviceGray", 8).unwrap();
        assert_eq!((img.width(), img.height()), (2, 2));
        assert_eq!(img.to_luma8().get_pixel(1, 1).0, [255]);
    }

    #[test]
    fn test_create_image_from_raw_rejects_short_data() {
        assert!(create_image_from_raw(&[0, 1, 2], 2, 2, b"DeviceRGB", 8).is_none());
        assert!(create_image_from_raw(&[0; 16], 2, 2, b"DeviceGray", 1).is_none());
    }

    #[test]
    fn test_jpeg_behind_flate_is_unwrapped() {
        let mut jpeg = Vec::new();
        DynamicImage::new_luma8(64, 64)
            .write_to(&mut Cursor::new(&mut jpeg), image::ImageFormat::Jpeg)
            .unwrap();

        let mut stream = Stream::new(
            lopdf::dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 64,
                "Height" => 64,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            jpeg.clone(),
        );
        stream.compress().unwrap();
        assert_ne!(stream.content, jpeg);
        stream.dict.set(
            "Filter",
            Object::Array(vec![Object::Name(b"FlateDecode".to_vec()), Object::Name(b"DCTDecode".to_vec())]),
        );

        let doc = PdfDocument {
            document: Document::with_version("1.5"),
            pages: Vec::new(),
        };
        let image = doc.try_extract_image_from_object(&Object::Stream(stream)).unwrap();
        assert_eq!(image.format, ImageFormat::Jpeg);
        assert_eq!(image.data, jpeg);
        assert_eq!(image.decode().unwrap().width(), 64);
    }
}
