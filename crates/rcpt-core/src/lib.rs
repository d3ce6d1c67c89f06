//! Core library for receipt and invoice OCR processing.
//!
//! This crate provides:
//! - Recognition backends (on-device PaddleOCR models, hosted OCR.space API)
//! - Backend orchestration with explicit `local | remote | auto` policies
//! - Deterministic cleanup of recognized text
//! - Structured receipt extraction through a generative completion backend
//! - The end-to-end receipt pipeline tying the stages together

pub mod document;
pub mod error;
pub mod models;
pub mod ocr;
pub mod pdf;
pub mod pipeline;
pub mod recognition;
pub mod structured;
pub mod text;

#[cfg(test)]
pub(crate) mod testing;

pub use document::{Document, MAX_DOCUMENT_BYTES};
pub use error::{OcrError, PdfError, RcptError, RecognitionError, Result, StructuringError};
pub use models::config::RcptConfig;
pub use models::credentials::{ApiKey, Credentials};
pub use models::receipt::{LineItem, StructuredReceipt};
pub use ocr::{EngineOutput, Language, LocalEngine, PureOcrEngine, TextBox};
pub use pipeline::{OcrResult, ProcessingOptions, ReceiptPipeline, StructuringOutcome};
pub use recognition::{
    BackendKind, BackendPolicy, LocalBackend, OcrSpaceClient, ParsedSegment, RecognitionBackend,
    RecognitionOutcome, RemoteBackend, RemoteOcrClient, TextExtractionCoordinator,
};
pub use structured::{CompletionClient, CompletionRequest, OpenAiClient, StructuredDataExtractor};
pub use text::normalize;
