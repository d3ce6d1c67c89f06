//! Recognition backends and the coordinator that chooses between them.

mod coordinator;
mod local;
mod remote;

pub use coordinator::TextExtractionCoordinator;
pub use local::LocalBackend;
pub use remote::{OcrSpaceClient, ParsedSegment, RemoteBackend, RemoteOcrClient};

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::error::RecognitionError;

/// Which recognition backend produced (or failed to produce) a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// On-device OCR engine.
    Local,
    /// Hosted OCR service.
    Remote,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Local => "local",
            BackendKind::Remote => "remote",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-chosen strategy for which backend(s) to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendPolicy {
    /// On-device engine only.
    #[serde(alias = "tesseract")]
    Local,
    /// Hosted service only.
    #[serde(alias = "ocrspace")]
    Remote,
    /// Hosted service first, on-device engine if it fails.
    #[default]
    #[serde(alias = "both")]
    Auto,
}

impl BackendPolicy {
    /// Backends tried under this policy, in order.
    pub fn attempt_order(&self) -> &'static [BackendKind] {
        match self {
            BackendPolicy::Local => &[BackendKind::Local],
            BackendPolicy::Remote => &[BackendKind::Remote],
            BackendPolicy::Auto => &[BackendKind::Remote, BackendKind::Local],
        }
    }
}

impl FromStr for BackendPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" | "tesseract" => Ok(BackendPolicy::Local),
            "remote" | "ocrspace" => Ok(BackendPolicy::Remote),
            "auto" | "both" => Ok(BackendPolicy::Auto),
            other => Err(format!(
                "unknown backend policy '{}' (expected local, remote or auto)",
                other
            )),
        }
    }
}

impl fmt::Display for BackendPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendPolicy::Local => f.write_str("local"),
            BackendPolicy::Remote => f.write_str("remote"),
            BackendPolicy::Auto => f.write_str("auto"),
        }
    }
}

/// Result of one successful backend attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionOutcome {
    /// Text exactly as the backend returned it.
    pub raw_text: String,

    /// Confidence on a 0-100 scale, when the backend reports one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,

    /// Duration of this attempt in milliseconds.
    pub elapsed_ms: u64,

    /// Backend that produced the text.
    pub backend: BackendKind,
}

/// A recognition backend.
///
/// Implemented by [`LocalBackend`] (on-device) and [`RemoteBackend`] (hosted).
#[async_trait]
pub trait RecognitionBackend: Send + Sync {
    /// Which backend this is.
    fn kind(&self) -> BackendKind;

    /// Recognize the text of a document that has already passed validation.
    async fn recognize(&self, document: &Document) -> Result<RecognitionOutcome, RecognitionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_parsing() {
        assert_eq!("auto".parse::<BackendPolicy>(), Ok(BackendPolicy::Auto));
        assert_eq!("Remote".parse::<BackendPolicy>(), Ok(BackendPolicy::Remote));
        assert_eq!("tesseract".parse::<BackendPolicy>(), Ok(BackendPolicy::Local));
        assert_eq!("both".parse::<BackendPolicy>(), Ok(BackendPolicy::Auto));
        assert!("gpu".parse::<BackendPolicy>().is_err());
    }

    #[test]
    fn test_policy_serde_aliases() {
        let policy: BackendPolicy = serde_json::from_str(r#""ocrspace""#).unwrap();
        assert_eq!(policy, BackendPolicy::Remote);
        assert_eq!(serde_json::to_string(&BackendPolicy::Auto).unwrap(), r#""auto""#);
    }

    #[test]
    fn test_auto_tries_remote_first() {
        assert_eq!(
            BackendPolicy::Auto.attempt_order(),
            &[BackendKind::Remote, BackendKind::Local]
        );
        assert_eq!(BackendPolicy::default(), BackendPolicy::Auto);
    }
}
