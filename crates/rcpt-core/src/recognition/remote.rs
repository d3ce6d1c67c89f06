//! Hosted recognition backend (OCR.space).

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use crate::document::Document;
use crate::error::RecognitionError;
use crate::models::config::RemoteConfig;
use crate::models::credentials::ApiKey;

use super::{BackendKind, RecognitionBackend, RecognitionOutcome};

/// One block of text parsed by the hosted service.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSegment {
    pub text: String,
}

/// Client for a hosted OCR service.
#[async_trait]
pub trait RemoteOcrClient: Send + Sync {
    /// Submit a document and return every parsed segment (possibly none).
    async fn parse(
        &self,
        document: &Document,
        api_key: &ApiKey,
    ) -> Result<Vec<ParsedSegment>, RecognitionError>;
}

/// Recognition through a hosted OCR service. Reports no confidence.
pub struct RemoteBackend {
    client: Arc<dyn RemoteOcrClient>,
    api_key: Option<ApiKey>,
}

impl RemoteBackend {
    pub fn new(client: Arc<dyn RemoteOcrClient>, api_key: Option<ApiKey>) -> Self {
        Self { client, api_key }
    }
}

#[async_trait]
impl RecognitionBackend for RemoteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    async fn recognize(&self, document: &Document) -> Result<RecognitionOutcome, RecognitionError> {
        let Some(api_key) = self.api_key.as_ref() else {
            return Err(RecognitionError::unavailable(
                BackendKind::Remote,
                "OCR_SPACE_API_KEY is not configured",
            ));
        };

        let start = Instant::now();
        let segments = self.client.parse(document, api_key).await?;

        debug!("Remote service returned {} parsed segments", segments.len());

        let first = segments.into_iter().next().ok_or_else(|| {
            RecognitionError::failed(BackendKind::Remote, "no text found in document")
        })?;

        Ok(RecognitionOutcome {
            raw_text: first.text,
            confidence: None,
            elapsed_ms: start.elapsed().as_millis() as u64,
            backend: BackendKind::Remote,
        })
    }
}

/// HTTP client for the OCR.space parse API.
pub struct OcrSpaceClient {
    client: Client,
    endpoint: String,
    language: String,
    timeout_ms: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ParseResponse {
    #[serde(default)]
    parsed_results: Option<Vec<ParsedResult>>,
    #[serde(default)]
    is_errored_on_processing: bool,
    #[serde(default)]
    error_message: Option<serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ParsedResult {
    #[serde(default)]
    parsed_text: String,
}

impl OcrSpaceClient {
    pub fn new(config: &RemoteConfig) -> Result<Self, reqwest::Error> {
        let timeout = Duration::from_secs(config.request_timeout_secs);
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            language: config.language.clone(),
            timeout_ms: timeout.as_millis() as u64,
        })
    }

    fn classify_transport_error(&self, error: reqwest::Error) -> RecognitionError {
        if error.is_timeout() {
            RecognitionError::Timeout {
                backend: BackendKind::Remote,
                elapsed_ms: self.timeout_ms,
            }
        } else if error.is_connect() {
            RecognitionError::unavailable(BackendKind::Remote, format!("service unreachable: {}", error))
        } else {
            RecognitionError::failed(BackendKind::Remote, format!("request failed: {}", error))
        }
    }
}

#[async_trait]
impl RemoteOcrClient for OcrSpaceClient {
    async fn parse(
        &self,
        document: &Document,
        api_key: &ApiKey,
    ) -> Result<Vec<ParsedSegment>, RecognitionError> {
        let bytes = document.read().await.map_err(|e| {
            RecognitionError::failed(BackendKind::Remote, format!("cannot read document: {}", e))
        })?;

        let file = Part::bytes(bytes)
            .file_name(document.file_name())
            .mime_str(document.mime_type())
            .map_err(|e| RecognitionError::failed(BackendKind::Remote, e.to_string()))?;

        let mut form = Form::new()
            .text("language", self.language.clone())
            .text("isOverlayRequired", "false")
            .part("file", file);
        if let Some(filetype) = filetype_for_mime(document.mime_type()) {
            form = form.text("filetype", filetype);
        }

        debug!("Posting {} to {}", document.file_name(), self.endpoint);

        let response = self
            .client
            .post(&self.endpoint)
            .header("apikey", api_key.expose())
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.classify_transport_error(e))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(RecognitionError::unavailable(
                BackendKind::Remote,
                format!("credential rejected ({})", status),
            ));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RecognitionError::failed(
                BackendKind::Remote,
                format!("service returned {}: {}", status, body),
            ));
        }

        let body: ParseResponse = response
            .json()
            .await
            .map_err(|e| self.classify_transport_error(e))?;

        segments_from_response(body)
    }
}

fn segments_from_response(body: ParseResponse) -> Result<Vec<ParsedSegment>, RecognitionError> {
    let results = body.parsed_results.unwrap_or_default();

    if body.is_errored_on_processing && results.is_empty() {
        let reason = body
            .error_message
            .as_ref()
            .map(error_message_text)
            .unwrap_or_else(|| "processing error".to_string());
        return Err(RecognitionError::failed(BackendKind::Remote, reason));
    }

    Ok(results
        .into_iter()
        .map(|r| ParsedSegment { text: r.parsed_text })
        .collect())
}

/// `ErrorMessage` is either a string or an array of strings.
fn error_message_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str())
            .collect::<Vec<_>>()
            .join("; "),
        other => other.to_string(),
    }
}

fn filetype_for_mime(mime_type: &str) -> Option<&'static str> {
    match mime_type {
        "application/pdf" => Some("PDF"),
        "image/png" => Some("PNG"),
        "image/jpeg" => Some("JPG"),
        "image/gif" => Some("GIF"),
        "image/bmp" => Some("BMP"),
        "image/tiff" => Some("TIF"),
        _ => None,
    }
}
