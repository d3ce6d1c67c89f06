//! Error types for the rcpt-core library.

use thiserror::Error;

use crate::recognition::BackendKind;

/// Main error type for the rcpt library.
#[derive(Error, Debug)]
pub enum RcptError {
    /// The document is missing or exceeds the size limit. No backend was invoked.
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// A single recognition attempt failed under an explicit policy.
    #[error(transparent)]
    Recognition(#[from] RecognitionError),

    /// Every backend attempted under the `auto` policy failed.
    #[error("all recognition backends failed: {}", join_failures(.0))]
    AllBackendsFailed(Vec<RecognitionError>),

    /// Structured extraction error (only surfaced by direct extraction calls).
    #[error("structured extraction error: {0}")]
    Structuring(#[from] StructuringError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl RcptError {
    /// Underlying recognition failures, in the order they were attempted.
    pub fn recognition_failures(&self) -> &[RecognitionError] {
        match self {
            RcptError::Recognition(e) => std::slice::from_ref(e),
            RcptError::AllBackendsFailed(failures) => failures,
            _ => &[],
        }
    }
}

fn join_failures(failures: &[RecognitionError]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Failure of one recognition backend attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecognitionError {
    /// Required credential or model is absent, or the service cannot be reached.
    #[error("{backend} backend unavailable: {reason}")]
    BackendUnavailable { backend: BackendKind, reason: String },

    /// The backend ran but produced no usable text.
    #[error("{backend} recognition failed: {reason}")]
    RecognitionFailed { backend: BackendKind, reason: String },

    /// The attempt exceeded its deadline.
    #[error("{backend} recognition timed out after {elapsed_ms}ms")]
    Timeout { backend: BackendKind, elapsed_ms: u64 },
}

impl RecognitionError {
    /// Backend that produced this failure.
    pub fn backend(&self) -> BackendKind {
        match self {
            RecognitionError::BackendUnavailable { backend, .. }
            | RecognitionError::RecognitionFailed { backend, .. }
            | RecognitionError::Timeout { backend, .. } => *backend,
        }
    }

    /// Whether the `auto` policy moves on to the next backend after this failure.
    ///
    /// Every failure kind qualifies; only successes stop the chain.
    pub fn is_fallback_trigger(&self) -> bool {
        matches!(
            self,
            RecognitionError::BackendUnavailable { .. }
                | RecognitionError::RecognitionFailed { .. }
                | RecognitionError::Timeout { .. }
        )
    }

    pub(crate) fn unavailable(backend: BackendKind, reason: impl Into<String>) -> Self {
        RecognitionError::BackendUnavailable {
            backend,
            reason: reason.into(),
        }
    }

    pub(crate) fn failed(backend: BackendKind, reason: impl Into<String>) -> Self {
        RecognitionError::RecognitionFailed {
            backend,
            reason: reason.into(),
        }
    }
}

/// Errors from structured receipt extraction.
#[derive(Error, Debug)]
pub enum StructuringError {
    /// No completion credential is configured.
    #[error("completion backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The backend answered without any content.
    #[error("completion backend returned no content")]
    EmptyResponse,

    /// The content could not be parsed as a receipt object.
    #[error("malformed completion response: {reason}")]
    MalformedResponse { reason: String },

    /// The completion request itself failed.
    #[error("completion request failed: {0}")]
    CompletionFailed(String),
}

/// Errors raised inside the on-device OCR engine.
#[derive(Error, Debug)]
pub enum OcrError {
    /// Failed to load OCR models.
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    /// Text detection or recognition failed.
    #[error("text recognition failed: {0}")]
    Recognition(String),

    /// Invalid image format or dimensions.
    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// The caller stopped waiting for the result.
    #[error("recognition cancelled")]
    Cancelled,

    /// PDF handling failed.
    #[error("PDF error: {0}")]
    Pdf(#[from] PdfError),
}

/// Errors related to PDF processing.
#[derive(Error, Debug)]
pub enum PdfError {
    /// Failed to open/parse the PDF file.
    #[error("failed to parse PDF: {0}")]
    Parse(String),

    /// Failed to extract text from PDF.
    #[error("failed to extract text: {0}")]
    TextExtraction(String),

    /// Failed to extract images from PDF.
    #[error("failed to extract images: {0}")]
    ImageExtraction(String),

    /// The PDF is encrypted and cannot be processed.
    #[error("PDF is encrypted")]
    Encrypted,

    /// The PDF is empty or has no pages.
    #[error("PDF has no pages")]
    NoPages,

    /// Invalid page number requested.
    #[error("invalid page number: {0}")]
    InvalidPage(u32),
}

/// Result type for the rcpt library.
pub type Result<T> = std::result::Result<T, RcptError>;
