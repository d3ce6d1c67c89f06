//! Backend selection, fallback, and per-attempt deadlines.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::document::Document;
use crate::error::{RcptError, RecognitionError, Result};
use crate::models::config::PipelineConfig;

use super::{BackendKind, BackendPolicy, RecognitionBackend, RecognitionOutcome};

/// Runs the backend(s) selected by a [`BackendPolicy`].
pub struct TextExtractionCoordinator {
    local: Arc<dyn RecognitionBackend>,
    remote: Arc<dyn RecognitionBackend>,
    attempt_timeout: Duration,
}

impl TextExtractionCoordinator {
    pub fn new(local: Arc<dyn RecognitionBackend>, remote: Arc<dyn RecognitionBackend>) -> Self {
        Self {
            local,
            remote,
            attempt_timeout: PipelineConfig::default().attempt_timeout(),
        }
    }

    /// Set the deadline applied to each backend attempt.
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    /// Extract text from a document according to `policy`.
    ///
    /// The document is validated first; an invalid document fails with
    /// [`RcptError::InvalidDocument`] and no backend runs. Under `local` and
    /// `remote` the single attempt's failure is returned as is. Under `auto`
    /// the remote attempt runs first and any failure moves on to the local
    /// backend; only when both fail is [`RcptError::AllBackendsFailed`] raised.
    /// A successful remote result is accepted regardless of its confidence.
    pub async fn extract_text(
        &self,
        document: &Document,
        policy: BackendPolicy,
    ) -> Result<RecognitionOutcome> {
        document.validate().await?;

        info!("Extracting text from {} with {} policy", document.file_name(), policy);

        let mut failures: Vec<RecognitionError> = Vec::new();

        for &kind in policy.attempt_order() {
            match self.attempt(kind, document).await {
                Ok(outcome) => {
                    info!(
                        "{} backend recognized {} chars in {}ms",
                        kind,
                        outcome.raw_text.chars().count(),
                        outcome.elapsed_ms
                    );
                    return Ok(outcome);
                }
                Err(e) if policy == BackendPolicy::Auto && e.is_fallback_trigger() => {
                    warn!("{} attempt failed: {}", kind, e);
                    failures.push(e);
                }
                Err(e) => return Err(RcptError::Recognition(e)),
            }
        }

        Err(RcptError::AllBackendsFailed(failures))
    }

    /// Run one backend under the attempt deadline.
    ///
    /// The returned outcome's `elapsed_ms` covers this attempt only. On
    /// timeout the backend future is dropped, which signals the local engine
    /// to stop at its next checkpoint.
    async fn attempt(
        &self,
        kind: BackendKind,
        document: &Document,
    ) -> std::result::Result<RecognitionOutcome, RecognitionError> {
        let backend = self.backend(kind);
        let start = Instant::now();

        debug!("Starting {} attempt (deadline {:?})", kind, self.attempt_timeout);

        let result = tokio::time::timeout(self.attempt_timeout, backend.recognize(document)).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(mut outcome)) => {
                outcome.elapsed_ms = elapsed_ms;
                outcome.backend = kind;
                Ok(outcome)
            }
            Ok(Err(e)) => {
                debug!("{} attempt failed after {}ms", kind, elapsed_ms);
                Err(e)
            }
            Err(_) => Err(RecognitionError::Timeout {
                backend: kind,
                elapsed_ms,
            }),
        }
    }

    fn backend(&self, kind: BackendKind) -> &dyn RecognitionBackend {
        match kind {
            BackendKind::Local => self.local.as_ref(),
            BackendKind::Remote => self.remote.as_ref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CallLog, ScriptedBackend};

    fn image_document() -> Document {
        Document::from_bytes(vec![0u8; 128], "image/png")
    }

    fn coordinator(
        local: &Arc<ScriptedBackend>,
        remote: &Arc<ScriptedBackend>,
    ) -> TextExtractionCoordinator {
        TextExtractionCoordinator::new(local.clone(), remote.clone())
    }

    #[tokio::test]
    async fn test_auto_accepts_remote_result() {
        let log = CallLog::default();
        let local = ScriptedBackend::succeeding(BackendKind::Local, "local text", &log);
        let remote = ScriptedBackend::succeeding(BackendKind::Remote, "TOTAL: 42.50", &log);

        let outcome = coordinator(&local, &remote)
            .extract_text(&image_document(), BackendPolicy::Auto)
            .await
            .unwrap();

        assert_eq!(outcome.raw_text, "TOTAL: 42.50");
        assert_eq!(outcome.backend, BackendKind::Remote);
        assert_eq!(remote.calls(), 1);
        assert_eq!(local.calls(), 0);
    }

    #[tokio::test]
    async fn test_auto_accepts_low_confidence_remote_result() {
        let log = CallLog::default();
        let local = ScriptedBackend::succeeding(BackendKind::Local, "local text", &log);
        let remote = ScriptedBackend::succeeding(BackendKind::Remote, "T0TAL 4Z.5", &log)
            .with_confidence(3.0);

        let outcome = coordinator(&local, &remote)
            .extract_text(&image_document(), BackendPolicy::Auto)
            .await
            .unwrap();

        assert_eq!(outcome.confidence, Some(3.0));
        assert_eq!(local.calls(), 0);
    }

    #[tokio::test]
    async fn test_auto_falls_back_when_remote_unavailable() {
        let log = CallLog::default();
        let local = ScriptedBackend::succeeding(BackendKind::Local, "local text", &log)
            .with_confidence(87.5);
        let remote = ScriptedBackend::failing(
            RecognitionError::unavailable(BackendKind::Remote, "OCR_SPACE_API_KEY is not configured"),
            &log,
        );

        let outcome = coordinator(&local, &remote)
            .extract_text(&image_document(), BackendPolicy::Auto)
            .await
            .unwrap();

        assert_eq!(outcome.raw_text, "local text");
        assert_eq!(outcome.confidence, Some(87.5));
        assert_eq!(outcome.backend, BackendKind::Local);
        assert_eq!(remote.calls(), 1);
        assert_eq!(local.calls(), 1);
    }

    #[tokio::test]
    async fn test_auto_falls_back_on_recognition_failure() {
        let log = CallLog::default();
        let local = ScriptedBackend::succeeding(BackendKind::Local, "local text", &log);
        let remote = ScriptedBackend::failing(
            RecognitionError::failed(BackendKind::Remote, "no text found in document"),
            &log,
        );

        let outcome = coordinator(&local, &remote)
            .extract_text(&image_document(), BackendPolicy::Auto)
            .await
            .unwrap();

        assert_eq!(outcome.backend, BackendKind::Local);
        assert_eq!(local.calls(), 1);
    }

    #[tokio::test]
    async fn test_auto_both_fail() {
        let log = CallLog::default();
        let local = ScriptedBackend::failing(
            RecognitionError::failed(BackendKind::Local, "no text detected"),
            &log,
        );
        let remote = ScriptedBackend::failing(
            RecognitionError::unavailable(BackendKind::Remote, "missing key"),
            &log,
        );

        let err = coordinator(&local, &remote)
            .extract_text(&image_document(), BackendPolicy::Auto)
            .await
            .unwrap_err();

        match &err {
            RcptError::AllBackendsFailed(failures) => {
                assert_eq!(failures.len(), 2);
                assert_eq!(failures[0].backend(), BackendKind::Remote);
                assert_eq!(failures[1].backend(), BackendKind::Local);
            }
            other => panic!("expected AllBackendsFailed, got {:?}", other),
        }

        // local starts only after the remote attempt has finished
        assert_eq!(
            log.events(),
            vec!["remote:start", "remote:end", "local:start", "local:end"]
        );
    }

    #[tokio::test]
    async fn test_auto_falls_back_on_timeout() {
        let log = CallLog::default();
        let local = ScriptedBackend::succeeding(BackendKind::Local, "local text", &log);
        let remote = ScriptedBackend::succeeding(BackendKind::Remote, "late", &log)
            .with_delay(Duration::from_secs(5));

        let outcome = coordinator(&local, &remote)
            .with_attempt_timeout(Duration::from_millis(50))
            .extract_text(&image_document(), BackendPolicy::Auto)
            .await
            .unwrap();

        assert_eq!(outcome.backend, BackendKind::Local);
        assert!(outcome.elapsed_ms < 5_000);
    }

    #[tokio::test]
    async fn test_explicit_policies_do_not_fall_back() {
        let log = CallLog::default();
        let local = ScriptedBackend::succeeding(BackendKind::Local, "local text", &log);
        let remote = ScriptedBackend::failing(
            RecognitionError::unavailable(BackendKind::Remote, "missing key"),
            &log,
        );

        let err = coordinator(&local, &remote)
            .extract_text(&image_document(), BackendPolicy::Remote)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RcptError::Recognition(RecognitionError::BackendUnavailable { .. })
        ));
        assert_eq!(local.calls(), 0);

        let outcome = coordinator(&local, &remote)
            .extract_text(&image_document(), BackendPolicy::Local)
            .await
            .unwrap();
        assert_eq!(outcome.raw_text, "local text");
        assert_eq!(remote.calls(), 1);
    }

    #[tokio::test]
    async fn test_explicit_timeout_is_reported() {
        let log = CallLog::default();
        let local = ScriptedBackend::succeeding(BackendKind::Local, "slow", &log)
            .with_delay(Duration::from_secs(5));
        let remote = ScriptedBackend::succeeding(BackendKind::Remote, "unused", &log);

        let err = coordinator(&local, &remote)
            .with_attempt_timeout(Duration::from_millis(20))
            .extract_text(&image_document(), BackendPolicy::Local)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RcptError::Recognition(RecognitionError::Timeout {
                backend: BackendKind::Local,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_oversized_document_invokes_no_backend() {
        let log = CallLog::default();
        let local = ScriptedBackend::succeeding(BackendKind::Local, "local text", &log);
        let remote = ScriptedBackend::succeeding(BackendKind::Remote, "remote text", &log);
        let huge = Document::from_bytes(
            vec![0u8; crate::MAX_DOCUMENT_BYTES as usize + 1],
            "image/jpeg",
        );

        for policy in [BackendPolicy::Local, BackendPolicy::Remote, BackendPolicy::Auto] {
            let err = coordinator(&local, &remote)
                .extract_text(&huge, policy)
                .await
                .unwrap_err();
            assert!(matches!(err, RcptError::InvalidDocument(_)));
        }

        assert_eq!(local.calls(), 0);
        assert_eq!(remote.calls(), 0);
    }

    #[tokio::test]
    async fn test_elapsed_reflects_successful_attempt_only() {
        let log = CallLog::default();
        let local = ScriptedBackend::succeeding(BackendKind::Local, "local text", &log);
        let remote = ScriptedBackend::failing(
            RecognitionError::failed(BackendKind::Remote, "no text"),
            &log,
        )
        .with_delay(Duration::from_millis(300));

        let outcome = coordinator(&local, &remote)
            .extract_text(&image_document(), BackendPolicy::Auto)
            .await
            .unwrap();

        assert_eq!(outcome.backend, BackendKind::Local);
        assert!(outcome.elapsed_ms < 300, "elapsed {}ms", outcome.elapsed_ms);
    }
}
