//! Structured receipt extraction through a generative completion backend.

mod openai;

pub use openai::OpenAiClient;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::StructuringError;
use crate::models::config::StructuringConfig;
use crate::models::receipt::StructuredReceipt;

/// A single-turn completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Client for a generative completion backend.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Run one completion. `Ok(None)` means the backend answered without content.
    async fn complete(&self, request: &CompletionRequest) -> Result<Option<String>, StructuringError>;
}

/// Turns recognized receipt text into a [`StructuredReceipt`].
pub struct StructuredDataExtractor {
    client: Option<Arc<dyn CompletionClient>>,
    config: StructuringConfig,
}

impl StructuredDataExtractor {
    /// `client` is `None` when no completion credential is configured.
    pub fn new(client: Option<Arc<dyn CompletionClient>>, config: StructuringConfig) -> Self {
        Self { client, config }
    }

    /// An extractor with no completion backend. Every call fails with
    /// [`StructuringError::BackendUnavailable`].
    pub fn unconfigured(config: StructuringConfig) -> Self {
        Self::new(None, config)
    }

    pub fn is_configured(&self) -> bool {
        self.client.is_some()
    }

    pub fn config(&self) -> &StructuringConfig {
        &self.config
    }

    /// Extract receipt fields from `text` with exactly one completion request.
    pub async fn extract_structured(&self, text: &str) -> Result<StructuredReceipt, StructuringError> {
        let Some(client) = self.client.as_ref() else {
            return Err(StructuringError::BackendUnavailable(
                "OPENAI_API_KEY is not configured".to_string(),
            ));
        };

        let request = CompletionRequest {
            model: self.config.model.clone(),
            prompt: build_prompt(text),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        debug!(model = %request.model, chars = text.len(), "Requesting structured extraction");

        let content = match client.complete(&request).await? {
            Some(content) if !content.trim().is_empty() => content,
            _ => return Err(StructuringError::EmptyResponse),
        };

        let receipt = parse_receipt(&content)?;
        info!(
            "Extracted receipt fields ({} line items)",
            receipt.line_items().len()
        );
        Ok(receipt)
    }
}

/// Instruction prompt embedding the recognized text verbatim.
pub fn build_prompt(text: &str) -> String {
    format!(
        r#"Extract important information from this receipt/invoice OCR text and return ONLY a JSON object with the following structure:
{{
  "vendorName": "string",
  "invoiceNumber": "string",
  "date": "YYYY-MM-DD format",
  "totalAmount": number,
  "items": [{{"name": "string", "quantity": number, "price": number}}],
  "taxAmount": number,
  "subtotal": number,
  "currency": "string"
}}

OCR Text:
{text}

Return only valid JSON, no explanations:"#
    )
}

/// Strict parse of the completion content. Anything but a receipt object fails.
fn parse_receipt(content: &str) -> Result<StructuredReceipt, StructuringError> {
    serde_json::from_str(content).map_err(|e| StructuringError::MalformedResponse {
        reason: e.to_string(),
    })
}
