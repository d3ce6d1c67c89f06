//! Pure Rust OCR engine wrapper using `pure-onnx-ocr`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use image::{DynamicImage, GenericImageView};
use pure_onnx_ocr::engine::{OcrEngine, OcrEngineBuilder};
use tracing::{debug, info, warn};

use crate::error::OcrError;
use crate::models::config::{ModelConfig, OcrConfig, PdfConfig};
use crate::pdf::{PdfExtractor, PdfProcessor};

use super::{EngineOutput, Language, LocalEngine, TextBox};

thread_local! {
    // `OcrEngine` caches execution plans in `RefCell`s and cannot leave the
    // thread that built it. Each blocking worker keeps its own copy, keyed by
    // the model files it was loaded from.
    static ENGINES: RefCell<HashMap<[PathBuf; 3], OcrEngine>> = RefCell::new(HashMap::new());
}

/// OCR engine backed by `pure-onnx-ocr` (pure Rust, no external ONNX Runtime).
///
/// Only configuration lives here. Models are loaded on first use by each
/// thread that calls [`LocalEngine::recognize`], so concurrent documents never
/// wait on one another and constructing the engine never touches the
/// filesystem.
pub struct PureOcrEngine {
    models: ModelConfig,
    ocr: OcrConfig,
    pdf: PdfConfig,
}

impl PureOcrEngine {
    pub fn new(models: ModelConfig, ocr: OcrConfig, pdf: PdfConfig) -> Self {
        Self { models, ocr, pdf }
    }

    fn model_paths(&self) -> [PathBuf; 3] {
        [
            self.models.detection_path(),
            self.models.recognition_path(),
            self.models.dictionary_path(),
        ]
    }

    fn load(&self) -> Result<OcrEngine, OcrError> {
        let [det_path, rec_path, dict_path] = self.model_paths();

        for path in [&det_path, &rec_path, &dict_path] {
            if !path.exists() {
                return Err(OcrError::ModelLoad(format!(
                    "model file not found: {}",
                    path.display()
                )));
            }
        }

        let engine = OcrEngineBuilder::new()
            .det_model_path(&det_path)
            .rec_model_path(&rec_path)
            .dictionary_path(&dict_path)
            .build()
            .map_err(|e| OcrError::ModelLoad(format!("pure-onnx-ocr: {}", e)))?;

        info!(
            "Loaded pure-onnx-ocr engine from {} on {:?}",
            self.models.model_dir.display(),
            std::thread::current().id()
        );
        Ok(engine)
    }

    /// Run `f` with this thread's engine, loading it on first use.
    ///
    /// A failed load is not cached; the next call retries.
    fn with_engine<R>(
        &self,
        f: impl FnOnce(&OcrEngine) -> Result<R, OcrError>,
    ) -> Result<R, OcrError> {
        ENGINES.with(|cell| {
            let mut engines = cell.borrow_mut();
            let engine = match engines.entry(self.model_paths()) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => entry.insert(self.load()?),
            };
            f(engine)
        })
    }

    /// Detect and recognize text boxes in one image.
    fn process_image(&self, image: &DynamicImage) -> Result<Vec<TextBox>, OcrError> {
        let start = Instant::now();
        let (width, height) = image.dimensions();

        debug!("Processing image: {}x{}", width, height);

        let results = self.with_engine(|engine| {
            engine
                .run_from_image(image)
                .map_err(|e| OcrError::Recognition(format!("pure-onnx-ocr: {}", e)))
        })?;

        let boxes: Vec<TextBox> = results
            .iter()
            .map(|r| TextBox {
                bbox: polygon_to_bbox(&r.bounding_box),
                text: if self.ocr.keep_unk {
                    r.text.clone()
                } else {
                    r.text.replace("[UNK]", " ")
                },
                score: r.confidence,
            })
            .collect();

        debug!(
            "OCR found {} text boxes in {}ms",
            boxes.len(),
            start.elapsed().as_millis()
        );

        Ok(boxes)
    }

    fn recognize_pdf(&self, bytes: &[u8], cancelled: &AtomicBool) -> Result<EngineOutput, OcrError> {
        let mut extractor = PdfExtractor::new();
        extractor.load(bytes)?;

        let embedded = if self.pdf.prefer_embedded_text {
            extractor.extract_text().unwrap_or_default()
        } else {
            String::new()
        };

        if embedded.trim().chars().count() >= self.pdf.min_text_length {
            debug!("Using {} chars of embedded PDF text", embedded.len());
            return Ok(EngineOutput {
                text: embedded,
                confidence: 100.0,
                boxes: Vec::new(),
            });
        }

        let page_count = extractor.page_count() as usize;
        let pages = if self.pdf.max_pages == 0 {
            page_count
        } else {
            page_count.min(self.pdf.max_pages)
        };

        let mut page_images: Vec<Vec<DynamicImage>> = Vec::with_capacity(pages);
        for page in 1..=pages as u32 {
            check_cancelled(cancelled)?;
            match extractor.extract_images(page) {
                Ok(images) => page_images.push(images),
                Err(e) => warn!("Failed to extract images from page {}: {}", page, e),
            }
        }
        if page_images.iter().all(Vec::is_empty) {
            page_images = vec![extractor.extract_all_images()];
        }

        let mut page_texts = Vec::new();
        let mut all_boxes = Vec::new();

        for image in page_images.iter().flatten() {
            check_cancelled(cancelled)?;
            let output = EngineOutput::from_boxes(self.process_image(image)?);
            if !output.text.trim().is_empty() {
                page_texts.push(output.text);
            }
            all_boxes.extend(output.boxes);
        }

        if page_texts.is_empty() && !embedded.trim().is_empty() {
            return Ok(EngineOutput {
                text: embedded,
                confidence: 100.0,
                boxes: Vec::new(),
            });
        }

        let confidence = EngineOutput::from_boxes(all_boxes.clone()).confidence;
        Ok(EngineOutput {
            text: page_texts.join("\n\n"),
            confidence,
            boxes: all_boxes,
        })
    }
}

impl LocalEngine for PureOcrEngine {
    fn recognize(
        &self,
        bytes: &[u8],
        mime_type: &str,
        languages: &[Language],
        cancelled: &AtomicBool,
    ) -> Result<EngineOutput, OcrError> {
        check_cancelled(cancelled)?;
        debug!(
            "Recognizing {} ({})",
            mime_type,
            languages.iter().map(Language::code).collect::<Vec<_>>().join("+")
        );

        if mime_type == "application/pdf" {
            return self.recognize_pdf(bytes, cancelled);
        }

        let image = image::load_from_memory(bytes)
            .map_err(|e| OcrError::InvalidImage(e.to_string()))?;

        check_cancelled(cancelled)?;
        Ok(EngineOutput::from_boxes(self.process_image(&image)?))
    }
}

fn check_cancelled(cancelled: &AtomicBool) -> Result<(), OcrError> {
    if cancelled.load(Ordering::Relaxed) {
        Err(OcrError::Cancelled)
    } else {
        Ok(())
    }
}

/// Convert a `Polygon<f64>` to our `[f32; 8]` bbox format.
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
    use lopdf::{Document, Object, dictionary};

    fn engine_without_models() -> PureOcrEngine {
        let models = ModelConfig {
            model_dir: PathBuf::from("/nonexistent/rcpt-models"),
            ..Default::default()
        };
        PureOcrEngine::new(models, OcrConfig::default(), PdfConfig::default())
    }

    fn png() -> Vec<u8> {
        let mut png = Vec::new();
        DynamicImage::new_rgb8(32, 32)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        png
    }

    #[test]
    fn test_engine_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PureOcrEngine>();
    }

    #[test]
    fn test_missing_models_fail_on_first_use() {
        let engine = engine_without_models();
        let err = engine
            .recognize(
                &png(),
                "image/png",
                &[Language::English, Language::Vietnamese],
                &AtomicBool::new(false),
            )
            .unwrap_err();
        assert!(matches!(err, OcrError::ModelLoad(_)));

        // Not cached: a second call reports the same failure
        let err = engine
            .recognize(&png(), "image/png", &[Language::English], &AtomicBool::new(false))
            .unwrap_err();
        assert!(matches!(err, OcrError::ModelLoad(_)));
    }

    #[test]
    fn test_concurrent_callers_do_not_share_engine() {
        let engine = std::sync::Arc::new(engine_without_models());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let engine = std::sync::Arc::clone(&engine);
                std::thread::spawn(move || {
                    engine.recognize(&png(), "image/png", &[Language::English], &AtomicBool::new(false))
                })
            })
            .collect();

        for handle in handles {
            assert!(matches!(handle.join().unwrap(), Err(OcrError::ModelLoad(_))));
        }
    }

    #[test]
    fn test_undecodable_image() {
        let engine = engine_without_models();
        let err = engine
            .recognize(b"not an image", "image/jpeg", &[Language::English], &AtomicBool::new(false))
            .unwrap_err();
        assert!(matches!(err, OcrError::InvalidImage(_)));
    }

    #[test]
    fn test_cancelled_before_loading_models() {
        let engine = engine_without_models();
        let err = engine
            .recognize(&png(), "image/png", &[Language::English], &AtomicBool::new(true))
            .unwrap_err();
        assert!(matches!(err, OcrError::Cancelled));
    }

    #[test]
    fn test_pdf_with_cyclic_page_tree() {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
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
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();

        // No images and no text: an empty result, never a crash
        let output = engine_without_models()
            .recognize(&bytes, "application/pdf", &[Language::English], &AtomicBool::new(false))
            .unwrap();
        assert!(output.text.trim().is_empty());
    }
}
