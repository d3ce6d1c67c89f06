//! On-device recognition backend.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use tracing::debug;

use crate::document::Document;
use crate::error::{OcrError, RecognitionError};
use crate::ocr::{Language, LocalEngine};

use super::{BackendKind, RecognitionBackend, RecognitionOutcome};

/// Runs a [`LocalEngine`] off the async executor.
pub struct LocalBackend {
    engine: Arc<dyn LocalEngine>,
    languages: Vec<Language>,
}

impl LocalBackend {
    pub fn new(engine: Arc<dyn LocalEngine>, languages: Vec<Language>) -> Self {
        Self { engine, languages }
    }
}

/// Raises the engine's cancellation flag when the awaiting future goes away,
/// e.g. when the coordinator's deadline drops it.
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

#[async_trait]
impl RecognitionBackend for LocalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    async fn recognize(&self, document: &Document) -> Result<RecognitionOutcome, RecognitionError> {
        let start = Instant::now();

        let bytes = document
            .read()
            .await
            .map_err(|e| RecognitionError::failed(BackendKind::Local, format!("cannot read document: {}", e)))?;

        let engine = Arc::clone(&self.engine);
        let languages = self.languages.clone();
        let mime_type = document.mime_type().to_string();
        let cancelled = Arc::new(AtomicBool::new(false));
        let _cancel = CancelOnDrop(Arc::clone(&cancelled));

        // Recognition is CPU-bound and can take tens of seconds.
        let output = tokio::task::spawn_blocking(move || {
            engine.recognize(&bytes, &mime_type, &languages, &cancelled)
        })
        .await
        .map_err(|e| RecognitionError::failed(BackendKind::Local, format!("engine task aborted: {}", e)))?
        .map_err(classify_engine_error)?;

        if output.text.trim().is_empty() {
            return Err(RecognitionError::failed(BackendKind::Local, "no text detected"));
        }

        debug!(
            "Local engine returned {} text boxes (confidence {:.1})",
            output.boxes.len(),
            output.confidence
        );

        Ok(RecognitionOutcome {
            raw_text: output.text,
            confidence: Some(output.confidence),
            elapsed_ms: start.elapsed().as_millis() as u64,
            backend: BackendKind::Local,
        })
    }
}

fn classify_engine_error(error: OcrError) -> RecognitionError {
    match error {
        OcrError::ModelLoad(reason) => RecognitionError::unavailable(BackendKind::Local, reason),
        other => RecognitionError::failed(BackendKind::Local, other.to_string()),
    }
}
