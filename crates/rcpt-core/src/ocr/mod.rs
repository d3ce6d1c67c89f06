//! On-device OCR using PaddleOCR models.

mod pure_engine;

pub use pure_engine::PureOcrEngine;

use std::sync::atomic::AtomicBool;

use serde::{Deserialize, Serialize};

use crate::error::OcrError;

/// Languages the on-device engine can be asked to read.
///
/// Vietnamese is written in Latin script with diacritics, so one Latin
/// recognizer reads every member in a single pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    #[serde(rename = "eng")]
    English,
    #[serde(rename = "vie")]
    Vietnamese,
}

impl Language {
    /// ISO 639-2 code.
    pub fn code(&self) -> &'static str {
        match self {
            Language::English => "eng",
            Language::Vietnamese => "vie",
        }
    }
}

/// A detected text box with its coordinates and content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextBox {
    /// Bounding box coordinates (x1, y1, x2, y2, x3, y3, x4, y4) for quadrilateral.
    pub bbox: [f32; 8],

    /// Recognized text content.
    pub text: String,

    /// Recognition confidence score (0.0 - 1.0).
    pub score: f32,
}

impl TextBox {
    /// Get the axis-aligned bounding rectangle.
    pub fn rect(&self) -> (f32, f32, f32, f32) {
        let xs = [self.bbox[0], self.bbox[2], self.bbox[4], self.bbox[6]];
        let ys = [self.bbox[1], self.bbox[3], self.bbox[5], self.bbox[7]];

        let min_x = xs.iter().cloned().fold(f32::INFINITY, f32::min);
        let max_x = xs.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let min_y = ys.iter().cloned().fold(f32::INFINITY, f32::min);
        let max_y = ys.iter().cloned().fold(f32::NEG_INFINITY, f32::max);

        (min_x, min_y, max_x, max_y)
    }
}

/// Text recognized by the on-device engine for one document.
#[derive(Debug, Clone, Default)]
pub struct EngineOutput {
    /// Full text, boxes joined with newlines in reading order.
    pub text: String,

    /// Mean recognition confidence on a 0-100 scale.
    pub confidence: f32,

    /// Individual text boxes (empty for PDFs read from embedded text).
    pub boxes: Vec<TextBox>,
}

impl EngineOutput {
    /// Build an output from boxes, sorting them into reading order.
    pub fn from_boxes(mut boxes: Vec<TextBox>) -> Self {
        sort_by_reading_order(&mut boxes);

        let text = boxes
            .iter()
            .map(|b| b.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let confidence = if boxes.is_empty() {
            0.0
        } else {
            boxes.iter().map(|b| b.score).sum::<f32>() / boxes.len() as f32 * 100.0
        };

        Self {
            text,
            confidence,
            boxes,
        }
    }
}

/// Binding to an on-device recognition engine. Calls block the current thread.
pub trait LocalEngine: Send + Sync {
    /// Recognize every language in `languages` in one pass over the document.
    ///
    /// Implementations check `cancelled` between units of work and return
    /// [`OcrError::Cancelled`] once it is set.
    fn recognize(
        &self,
        bytes: &[u8],
        mime_type: &str,
        languages: &[Language],
        cancelled: &AtomicBool,
    ) -> Result<EngineOutput, OcrError>;
}

/// Sort boxes top-to-bottom, then left-to-right within ~20px rows.
pub fn sort_by_reading_order(boxes: &mut [TextBox]) {
    boxes.sort_by(|a, b| {
        let (ax, ay, _, _) = a.rect();
        let (bx, by, _, _) = b.rect();

        let row_a = (ay / 20.0) as i32;
        let row_b = (by / 20.0) as i32;

        if row_a != row_b {
            row_a.cmp(&row_b)
        } else {
            ax.partial_cmp(&bx).unwrap_or(std::cmp::Ordering::Equal)
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_box(text: &str, x: f32, y: f32, score: f32) -> TextBox {
        TextBox {
            bbox: [x, y, x + 50.0, y, x + 50.0, y + 12.0, x, y + 12.0],
            text: text.to_string(),
            score,
        }
    }

    #[test]
    fn test_reading_order() {
        let output = EngineOutput::from_boxes(vec![
            text_box("42.50", 200.0, 103.0, 0.9),
            text_box("COFFEE HOUSE", 10.0, 5.0, 0.8),
            text_box("TOTAL", 10.0, 100.0, 1.0),
        ]);

        assert_eq!(output.text, "COFFEE HOUSE\nTOTAL\n42.50");
        assert!((output.confidence - 90.0).abs() < 0.01);
    }

    #[test]
    fn test_empty_boxes() {
        let output = EngineOutput::from_boxes(Vec::new());
        assert!(output.text.is_empty());
        assert_eq!(output.confidence, 0.0);
    }

    #[test]
    fn test_language_codes() {
        assert_eq!(Language::Vietnamese.code(), "vie");
        let parsed: Vec<Language> = serde_json::from_str(r#"["eng", "vie"]"#).unwrap();
        assert_eq!(parsed, vec![Language::English, Language::Vietnamese]);
    }
}
