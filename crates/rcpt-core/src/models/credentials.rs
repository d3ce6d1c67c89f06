//! API credentials for the hosted backends.

use std::fmt;

/// Environment variable holding the OCR.space API key.
pub const OCR_SPACE_API_KEY_VAR: &str = "OCR_SPACE_API_KEY";

/// Environment variable holding the completion backend API key.
pub const OPENAI_API_KEY_VAR: &str = "OPENAI_API_KEY";

/// An API key. `Debug` and `Display` never print the value.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wrap a key, treating blank values as absent.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            None
        } else {
            Some(Self(value.trim().to_string()))
        }
    }

    /// The raw key, for handing to an HTTP client.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(****)")
    }
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}

/// Credentials established at process start.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    remote_ocr_key: Option<ApiKey>,
    completion_key: Option<ApiKey>,
}

impl Credentials {
    /// Read credentials from the process environment.
    pub fn from_env() -> Self {
        Self {
            remote_ocr_key: std::env::var(OCR_SPACE_API_KEY_VAR).ok().and_then(ApiKey::new),
            completion_key: std::env::var(OPENAI_API_KEY_VAR).ok().and_then(ApiKey::new),
        }
    }

    pub fn with_remote_ocr_key(mut self, key: impl Into<String>) -> Self {
        self.remote_ocr_key = ApiKey::new(key);
        self
    }

    pub fn with_completion_key(mut self, key: impl Into<String>) -> Self {
        self.completion_key = ApiKey::new(key);
        self
    }

    pub fn has_remote_ocr_key(&self) -> bool {
        self.remote_ocr_key.is_some()
    }

    pub fn has_completion_key(&self) -> bool {
        self.completion_key.is_some()
    }

    pub(crate) fn remote_ocr_key(&self) -> Option<&ApiKey> {
        self.remote_ocr_key.as_ref()
    }

    pub(crate) fn completion_key(&self) -> Option<&ApiKey> {
        self.completion_key.as_ref()
    }
}
