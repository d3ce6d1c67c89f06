//! End-to-end receipt processing: extract, clean, structure.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::document::Document;
use crate::error::{RcptError, Result, StructuringError};
use crate::models::config::{PipelineConfig, RcptConfig};
use crate::models::credentials::Credentials;
use crate::models::receipt::StructuredReceipt;
use crate::ocr::PureOcrEngine;
use crate::recognition::{
    BackendKind, BackendPolicy, LocalBackend, OcrSpaceClient, RecognitionOutcome, RemoteBackend,
    TextExtractionCoordinator,
};
use crate::structured::{CompletionClient, OpenAiClient, StructuredDataExtractor};
use crate::text::normalize;

/// Per-request options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingOptions {
    pub policy: BackendPolicy,
    pub extract_structured: bool,
    pub clean_text: bool,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self {
            policy: BackendPolicy::Auto,
            extract_structured: true,
            clean_text: true,
        }
    }
}

impl From<&PipelineConfig> for ProcessingOptions {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            policy: config.policy,
            extract_structured: config.extract_structured,
            clean_text: config.clean_text,
        }
    }
}

/// Result of processing one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrResult {
    pub raw_text: String,

    /// `normalize(raw_text)` when cleaning was requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_text: Option<String>,

    /// Recognition confidence (0-100). The hosted service reports none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_data: Option<StructuredReceipt>,

    /// Elapsed time of the successful recognition attempt.
    pub processing_time_ms: u64,

    pub backend: BackendKind,
}

impl OcrResult {
    fn from_outcome(outcome: RecognitionOutcome) -> Self {
        Self {
            raw_text: outcome.raw_text,
            processed_text: None,
            confidence: outcome.confidence,
            extracted_data: None,
            processing_time_ms: outcome.elapsed_ms,
            backend: outcome.backend,
        }
    }

    /// Cleaned text if present, raw text otherwise.
    pub fn text(&self) -> &str {
        self.processed_text.as_deref().unwrap_or(&self.raw_text)
    }
}

/// What happened in the optional structuring stage.
#[derive(Debug)]
pub enum StructuringOutcome {
    /// Not requested, or no completion backend configured.
    Skipped,
    Extracted(StructuredReceipt),
    /// Absorbed failure; the result carries no extracted data.
    Failed(StructuringError),
}

impl StructuringOutcome {
    pub fn into_option(self) -> Option<StructuredReceipt> {
        match self {
            StructuringOutcome::Extracted(receipt) => Some(receipt),
            StructuringOutcome::Skipped | StructuringOutcome::Failed(_) => None,
        }
    }
}

/// Composes text extraction, normalization, and structured extraction.
pub struct ReceiptPipeline {
    coordinator: TextExtractionCoordinator,
    extractor: StructuredDataExtractor,
}

impl ReceiptPipeline {
    pub fn new(coordinator: TextExtractionCoordinator, extractor: StructuredDataExtractor) -> Self {
        Self {
            coordinator,
            extractor,
        }
    }

    /// Wire up the production backends.
    ///
    /// Nothing is loaded or contacted here: on-device models load on first
    /// use and absent credentials surface as `BackendUnavailable` per call.
    pub fn from_config(config: &RcptConfig, credentials: &Credentials) -> Result<Self> {
        let engine = PureOcrEngine::new(
            config.models.clone(),
            config.ocr.clone(),
            config.pdf.clone(),
        );
        let local = LocalBackend::new(Arc::new(engine), config.ocr.languages.clone());

        let ocr_space = OcrSpaceClient::new(&config.remote)
            .map_err(|e| RcptError::Config(format!("cannot build OCR service client: {}", e)))?;
        let remote = RemoteBackend::new(Arc::new(ocr_space), credentials.remote_ocr_key().cloned());

        let coordinator = TextExtractionCoordinator::new(Arc::new(local), Arc::new(remote))
            .with_attempt_timeout(config.pipeline.attempt_timeout());

        let completion: Option<Arc<dyn CompletionClient>> = match credentials.completion_key() {
            Some(key) => {
                let client = OpenAiClient::new(key.clone(), &config.structuring).map_err(|e| {
                    RcptError::Config(format!("cannot build completion client: {}", e))
                })?;
                Some(Arc::new(client) as Arc<dyn CompletionClient>)
            }
            None => None,
        };
        let extractor = StructuredDataExtractor::new(completion, config.structuring.clone());

        debug!(
            "Pipeline ready (remote key: {}, completion key: {})",
            credentials.has_remote_ocr_key(),
            credentials.has_completion_key()
        );

        Ok(Self::new(coordinator, extractor))
    }

    pub fn coordinator(&self) -> &TextExtractionCoordinator {
        &self.coordinator
    }

    pub fn extractor(&self) -> &StructuredDataExtractor {
        &self.extractor
    }

    /// Recognize text with the given backend policy.
    pub async fn extract_text(
        &self,
        document: &Document,
        policy: BackendPolicy,
    ) -> Result<RecognitionOutcome> {
        self.coordinator.extract_text(document, policy).await
    }

    /// Extract receipt fields from already recognized text.
    pub async fn extract_structured(&self, text: &str) -> Result<StructuredReceipt> {
        Ok(self.extractor.extract_structured(text).await?)
    }

    /// Run the full workflow on one document.
    ///
    /// Recognition failures abort processing. Structuring failures are
    /// logged and leave `extracted_data` empty.
    pub async fn process(&self, document: &Document, options: ProcessingOptions) -> Result<OcrResult> {
        let outcome = self.coordinator.extract_text(document, options.policy).await?;
        let mut result = OcrResult::from_outcome(outcome);

        if options.clean_text {
            result.processed_text = Some(normalize(&result.raw_text));
        }

        result.extracted_data = self.structure(&result, options).await.into_option();

        info!(
            "Processed {} via {} backend in {}ms (structured: {})",
            document.file_name(),
            result.backend,
            result.processing_time_ms,
            result.extracted_data.is_some()
        );

        Ok(result)
    }

    async fn structure(&self, result: &OcrResult, options: ProcessingOptions) -> StructuringOutcome {
        if !options.extract_structured {
            return StructuringOutcome::Skipped;
        }
        if !self.extractor.is_configured() {
            debug!("Skipping structured extraction: no completion backend configured");
            return StructuringOutcome::Skipped;
        }

        match self.extractor.extract_structured(result.text()).await {
            Ok(receipt) => StructuringOutcome::Extracted(receipt),
            Err(e) => {
                warn!("Structured extraction failed, returning text only: {}", e);
                StructuringOutcome::Failed(e)
            }
        }
    }
}
