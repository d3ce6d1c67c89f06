//! PDF text and image extraction using lopdf and pdf-extract.

use std::collections::HashSet;

use image::{DynamicImage, GrayImage, RgbImage};
use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::{debug, trace};

use super::{PdfProcessor, Result};
use crate::error::PdfError;

/// PDF content extractor using lopdf.
#[derive(Default)]
pub struct PdfExtractor {
    document: Option<Document>,
    raw_data: Vec<u8>,
}

impl PdfExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    fn document(&self) -> Result<&Document> {
        self.document
            .as_ref()
            .ok_or_else(|| PdfError::Parse("No document loaded".to_string()))
    }

    /// Every decodable image object in the document, regardless of page.
    ///
    /// Used when page resources do not reference the scanned images directly.
    pub fn extract_all_images(&self) -> Vec<DynamicImage> {
        let Some(doc) = self.document.as_ref() else {
            return Vec::new();
        };

        let images: Vec<DynamicImage> = doc
            .objects
            .values()
            .filter_map(|object| decode_image_object(doc, object))
            .collect();

        debug!("Found {} images in document", images.len());
        images
    }
}

impl PdfProcessor for PdfExtractor {
    fn load(&mut self, data: &[u8]) -> Result<()> {
        let mut doc = Document::load_mem(data).map_err(|e| PdfError::Parse(e.to_string()))?;

        // Receipts exported by POS software are often encrypted with an empty password
        if doc.is_encrypted() {
            if doc.decrypt("").is_err() {
                return Err(PdfError::Encrypted);
            }
            debug!("Decrypted PDF with empty password");

            let mut decrypted = Vec::new();
            doc.save_to(&mut decrypted)
                .map_err(|e| PdfError::Parse(format!("Failed to save decrypted PDF: {}", e)))?;
            self.raw_data = decrypted;
        } else {
            self.raw_data = data.to_vec();
        }

        let page_count = doc.get_pages().len();
        if page_count == 0 {
            return Err(PdfError::NoPages);
        }

        debug!("Loaded PDF with {} pages", page_count);
        self.document = Some(doc);
        Ok(())
    }

    fn page_count(&self) -> u32 {
        self.document
            .as_ref()
            .map(|doc| doc.get_pages().len() as u32)
            .unwrap_or(0)
    }

    fn extract_text(&self) -> Result<String> {
        let doc = self.document()?;
        // pdf-extract resolves inherited attributes recursively
        if doc
            .get_pages()
            .values()
            .any(|page_id| parent_chain(doc, *page_id).is_none())
        {
            return Err(PdfError::TextExtraction("page tree loops".to_string()));
        }
        pdf_extract::extract_text_from_mem(&self.raw_data)
            .map_err(|e| PdfError::TextExtraction(e.to_string()))
    }

    fn extract_images(&self, page: u32) -> Result<Vec<DynamicImage>> {
        let doc = self.document()?;
        let page_id = *doc
            .get_pages()
            .get(&page)
            .ok_or(PdfError::InvalidPage(page))?;

        let mut images = Vec::new();

        if let Some(resources) = page_resources(doc, page_id) {
            if let Ok(xobjects) = resources.get(b"XObject") {
                if let Ok((_, Object::Dictionary(xobj_dict))) = doc.dereference(xobjects) {
                    for (_name, obj_ref) in xobj_dict.iter() {
                        if let Ok((_, obj)) = doc.dereference(obj_ref) {
                            if let Some(img) = decode_image_object(doc, obj) {
                                images.push(img);
                            }
                        }
                    }
                }
            }
        }

        debug!("Extracted {} images from page {}", images.len(), page);
        Ok(images)
    }
}

/// Deepest page tree walked when looking for inherited resources.
const MAX_PAGE_TREE_DEPTH: usize = 64;

/// Ids from a page up to the root of its page tree, or `None` when the
/// `Parent` links loop or run deeper than [`MAX_PAGE_TREE_DEPTH`].
fn parent_chain(doc: &Document, page_id: ObjectId) -> Option<Vec<ObjectId>> {
    let mut chain = vec![page_id];
    let mut visited = HashSet::from([page_id]);
    let mut node_id = page_id;

    loop {
        let parent_id = match doc.get_object(node_id) {
            Ok(Object::Dictionary(dict)) => match dict.get(b"Parent") {
                Ok(Object::Reference(id)) => *id,
                _ => return Some(chain),
            },
            _ => return Some(chain),
        };

        if chain.len() >= MAX_PAGE_TREE_DEPTH || !visited.insert(parent_id) {
            return None;
        }
        chain.push(parent_id);
        node_id = parent_id;
    }
}

/// Resources dictionary of a page, following `Parent` inheritance.
fn page_resources(doc: &Document, page_id: ObjectId) -> Option<Dictionary> {
    let Some(chain) = parent_chain(doc, page_id) else {
        debug!("Page tree above {:?} loops or is too deep", page_id);
        return None;
    };

    chain.into_iter().find_map(|id| {
        let Ok(Object::Dictionary(dict)) = doc.get_object(id) else {
            return None;
        };
        match doc.dereference(dict.get(b"Resources").ok()?) {
            Ok((_, Object::Dictionary(res_dict))) => Some(res_dict.clone()),
            _ => None,
        }
    })
}

fn decode_image_object(doc: &Document, obj: &Object) -> Option<DynamicImage> {
    let Object::Stream(stream) = obj else {
        return None;
    };
    let dict = &stream.dict;

    if dict.get(b"Subtype").ok()?.as_name().ok()? != b"Image" {
        return None;
    }

    let width = u32::try_from(dict.get(b"Width").ok()?.as_i64().ok()?).ok()?;
    let height = u32::try_from(dict.get(b"Height").ok()?.as_i64().ok()?).ok()?;

    trace!("Found image object: {}x{}", width, height);

    let filter = dict.get(b"Filter").ok().and_then(|filter| match filter {
        Object::Name(name) => Some(name.as_slice()),
        Object::Array(arr) => arr.first().and_then(|o| o.as_name().ok()),
        _ => None,
    });

    match filter {
        // JPEG: the raw stream is the encoded file
        Some(b"DCTDecode") => {
            return image::load_from_memory_with_format(&stream.content, image::ImageFormat::Jpeg)
                .ok();
        }
        Some(b"JPXDecode") | Some(b"CCITTFaxDecode") | Some(b"JBIG2Decode") => {
            trace!("Unsupported image filter");
            return None;
        }
        _ => {}
    }

    let data = stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone());

    let color_space = dict
        .get(b"ColorSpace")
        .ok()
        .and_then(|o| match o {
            Object::Name(name) => Some(name.as_slice()),
            Object::Array(arr) => arr.first().and_then(|o| o.as_name().ok()),
            Object::Reference(r) => doc.get_object(*r).ok().and_then(|o| o.as_name().ok()),
            _ => None,
        })
        .unwrap_or(b"DeviceRGB");

    let bits = dict
        .get(b"BitsPerComponent")
        .ok()
        .and_then(|o| o.as_i64().ok())
        .unwrap_or(8);

    raw_to_image(data, width, height, color_space, bits)
}

fn raw_to_image(
    mut data: Vec<u8>,
    width: u32,
    height: u32,
    color_space: &[u8],
    bits_per_component: i64,
) -> Option<DynamicImage> {
    if bits_per_component != 8 {
        trace!("Unsupported bits per component: {}", bits_per_component);
        return None;
    }

    let pixels = (width as usize).checked_mul(height as usize)?;
    let channels = match color_space {
        b"DeviceRGB" | b"RGB" => 3,
        b"DeviceGray" | b"G" => 1,
        _ => 0,
    };
    let expected = pixels.checked_mul(channels)?;

    match channels {
        3 if data.len() >= expected => {
            data.truncate(expected);
            RgbImage::from_raw(width, height, data).map(DynamicImage::ImageRgb8)
        }
        1 if data.len() >= expected => {
            data.truncate(expected);
            GrayImage::from_raw(width, height, data).map(DynamicImage::ImageLuma8)
        }
        _ => {
            trace!(
                "Could not decode image: colorspace={:?}, data_len={}",
                String::from_utf8_lossy(color_space),
                data.len()
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GenericImageView;
    use lopdf::{dictionary, Stream};

    fn scanned_receipt_pdf() -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 2,
                "Height" => 2,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            vec![0, 255, 255, 0],
        ));
        let resources_id = doc.add_object(dictionary! {
            "XObject" => dictionary! { "Im1" => image_id },
        });
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 200.into(), 400.into()],
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn test_pdf_extractor_new() {
        let extractor = PdfExtractor::new();
        assert!(extractor.document.is_none());
        assert_eq!(extractor.page_count(), 0);
        assert!(extractor.extract_images(1).is_err());
    }

    #[test]
    fn test_load_garbage() {
        let mut extractor = PdfExtractor::new();
        assert!(matches!(
            extractor.load(b"definitely not a pdf"),
            Err(PdfError::Parse(_))
        ));
    }

    #[test]
    fn test_extract_page_image() {
        let mut extractor = PdfExtractor::new();
        extractor.load(&scanned_receipt_pdf()).unwrap();

        assert_eq!(extractor.page_count(), 1);
        let images = extractor.extract_images(1).unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].dimensions(), (2, 2));
        assert!(matches!(extractor.extract_images(2), Err(PdfError::InvalidPage(2))));
    }

    #[test]
    fn test_raw_rgb_image() {
        let img = raw_to_image(vec![255; 12], 2, 2, b"DeviceRGB", 8).unwrap();
        assert_eq!(img.dimensions(), (2, 2));
        assert!(raw_to_image(vec![255; 3], 2, 2, b"DeviceRGB", 8).is_none());
        assert!(raw_to_image(vec![255; 12], 2, 2, b"DeviceRGB", 1).is_none());
        assert!(raw_to_image(vec![255; 12], u32::MAX, u32::MAX, b"DeviceRGB", 8).is_none());
    }

    fn cyclic_page_tree_pdf() -> (Document, ObjectId) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        // No Resources anywhere, and the Pages node points back at its own kid
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 200.into(), 400.into()],
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "Parent" => page_id,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        (doc, page_id)
    }

    #[test]
    fn test_page_tree_parent_cycle() {
        let (mut doc, page_id) = cyclic_page_tree_pdf();
        assert!(parent_chain(&doc, page_id).is_none());
        assert!(page_resources(&doc, page_id).is_none());

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        let mut extractor = PdfExtractor::new();
        extractor.load(&bytes).unwrap();

        assert!(extractor.extract_images(1).unwrap().is_empty());
        assert!(matches!(
            extractor.extract_text(),
            Err(PdfError::TextExtraction(_))
        ));
    }

    #[test]
    fn test_parent_chain_of_flat_tree() {
        let mut doc = Document::load_mem(&scanned_receipt_pdf()).unwrap();
        let page_id = *doc.get_pages().get(&1).unwrap();
        let chain = parent_chain(&doc, page_id).unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0], page_id);
        doc.objects.clear();
        assert_eq!(parent_chain(&doc, page_id), Some(vec![page_id]));
    }

    #[test]
    fn test_negative_image_width_skipped() {
        let doc = Document::with_version("1.5");
        let stream = Object::Stream(Stream::new(
            dictionary! {
                "Subtype" => "Image",
                "Width" => -2,
                "Height" => 2,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            vec![0; 16],
        ));
        assert!(decode_image_object(&doc, &stream).is_none());
    }
}
