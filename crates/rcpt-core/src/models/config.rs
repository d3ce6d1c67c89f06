//! Configuration structures for the receipt pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::ocr::Language;
use crate::recognition::BackendPolicy;

/// Main configuration for the rcpt pipeline.
///
/// Credentials are not stored here; see [`crate::Credentials`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RcptConfig {
    /// On-device OCR configuration.
    pub ocr: OcrConfig,

    /// On-device model files.
    pub models: ModelConfig,

    /// PDF handling for the on-device engine.
    pub pdf: PdfConfig,

    /// Hosted OCR service.
    pub remote: RemoteConfig,

    /// Completion backend used for structured extraction.
    pub structuring: StructuringConfig,

    /// Pipeline defaults and deadlines.
    pub pipeline: PipelineConfig,
}

/// On-device OCR engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Languages recognized in a single pass.
    pub languages: Vec<Language>,

    /// Keep `[UNK]` tokens emitted by the recognizer instead of blanking them.
    pub keep_unk: bool,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            languages: vec![Language::English, Language::Vietnamese],
            keep_unk: false,
        }
    }
}

/// Model file locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Directory containing model files.
    pub model_dir: PathBuf,

    /// Text detection model file name.
    pub detection_model: String,

    /// Text recognition model file name.
    pub recognition_model: String,

    /// Character dictionary file name.
    pub dictionary: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            detection_model: "det.onnx".to_string(),
            recognition_model: "latin_rec.onnx".to_string(),
            dictionary: "latin_dict.txt".to_string(),
        }
    }
}

impl ModelConfig {
    pub fn detection_path(&self) -> PathBuf {
        self.model_dir.join(&self.detection_model)
    }

    pub fn recognition_path(&self) -> PathBuf {
        self.model_dir.join(&self.recognition_model)
    }

    pub fn dictionary_path(&self) -> PathBuf {
        self.model_dir.join(&self.dictionary)
    }

    /// Whether every model file is present on disk.
    pub fn is_complete(&self) -> bool {
        self.detection_path().exists()
            && self.recognition_path().exists()
            && self.dictionary_path().exists()
    }
}

/// PDF processing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfConfig {
    /// Use embedded text instead of OCR when the PDF has enough of it.
    pub prefer_embedded_text: bool,

    /// Minimum embedded text length to consider the PDF text-based.
    pub min_text_length: usize,

    /// Maximum pages to OCR (0 = unlimited).
    pub max_pages: usize,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            prefer_embedded_text: true,
            min_text_length: 50,
            max_pages: 10,
        }
    }
}

/// Hosted OCR service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Parse endpoint of the OCR service.
    pub endpoint: String,

    /// Language code sent to the service.
    pub language: String,

    /// HTTP timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.ocr.space/parse/image".to_string(),
            language: "eng".to_string(),
            request_timeout_secs: 60,
        }
    }
}

/// Completion backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StructuringConfig {
    /// Base URL of the chat-completions API.
    pub base_url: String,

    /// Model identifier.
    pub model: String,

    /// Sampling temperature. Kept low so fields are copied literally.
    pub temperature: f32,

    /// Upper bound on generated tokens.
    pub max_tokens: u32,

    /// HTTP timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for StructuringConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            temperature: 0.1,
            max_tokens: 1000,
            request_timeout_secs: 60,
        }
    }
}

/// Pipeline defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Deadline for a single recognition attempt, in seconds.
    pub attempt_timeout_secs: u64,

    /// Default backend policy.
    pub policy: BackendPolicy,

    /// Clean recognized text by default.
    pub clean_text: bool,

    /// Run structured extraction by default.
    pub extract_structured: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            attempt_timeout_secs: 120,
            policy: BackendPolicy::Auto,
            clean_text: true,
            extract_structured: true,
        }
    }
}

impl PipelineConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }
}

impl RcptConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        std::fs::write(path, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RcptConfig::default();
        assert_eq!(config.pipeline.policy, BackendPolicy::Auto);
        assert!(config.pipeline.clean_text);
        assert!(config.pipeline.extract_structured);
        assert_eq!(config.structuring.model, "gpt-3.5-turbo");
        assert_eq!(config.ocr.languages, vec![Language::English, Language::Vietnamese]);
        assert_eq!(config.models.recognition_path(), PathBuf::from("models/latin_rec.onnx"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: RcptConfig = serde_json::from_str(
            r#"{"pipeline": {"policy": "local", "attempt_timeout_secs": 5}, "remote": {"language": "vnm"}}"#,
        )
        .unwrap();

        assert_eq!(config.pipeline.policy, BackendPolicy::Local);
        assert_eq!(config.pipeline.attempt_timeout(), Duration::from_secs(5));
        assert!(config.pipeline.clean_text);
        assert_eq!(config.remote.language, "vnm");
        assert_eq!(config.remote.endpoint, "https://api.ocr.space/parse/image");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = RcptConfig::default();
        config.structuring.max_tokens = 512;
        config.save(&path).unwrap();

        let loaded = RcptConfig::from_file(&path).unwrap();
        assert_eq!(loaded.structuring.max_tokens, 512);
    }
}
