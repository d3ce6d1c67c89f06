//! Readable handle to an uploaded receipt image or PDF.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::error::{RcptError, Result};

/// Largest document the pipeline accepts (10 MiB).
pub const MAX_DOCUMENT_BYTES: u64 = 10 * 1024 * 1024;

/// Where the document bytes live.
#[derive(Debug, Clone)]
enum DocumentSource {
    /// A file on disk. The pipeline reads it but never moves or deletes it.
    Path(PathBuf),
    /// An in-memory buffer.
    Bytes(Arc<[u8]>),
}

/// A receipt document: its bytes plus declared MIME type.
#[derive(Debug, Clone)]
pub struct Document {
    source: DocumentSource,
    mime_type: String,
    name: Option<String>,
}

impl Document {
    /// Reference a file on disk, deriving the MIME type from its extension.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mime_type = mime_type_for_path(&path).to_string();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string);

        Self {
            source: DocumentSource::Path(path),
            mime_type,
            name,
        }
    }

    /// Wrap an in-memory buffer with an explicit MIME type.
    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>, mime_type: impl Into<String>) -> Self {
        Self {
            source: DocumentSource::Bytes(bytes.into()),
            mime_type: mime_type.into(),
            name: None,
        }
    }

    /// Attach a display/file name (used for multipart uploads).
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// File name, falling back to a name derived from the MIME type.
    pub fn file_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("document.{}", extension_for_mime(&self.mime_type)))
    }

    /// Read the full document contents.
    pub async fn read(&self) -> std::io::Result<Vec<u8>> {
        match &self.source {
            DocumentSource::Path(path) => tokio::fs::read(path).await,
            DocumentSource::Bytes(bytes) => Ok(bytes.to_vec()),
        }
    }

    /// Check that the document exists and is within [`MAX_DOCUMENT_BYTES`].
    pub async fn validate(&self) -> Result<u64> {
        let size = match &self.source {
            DocumentSource::Path(path) => {
                let metadata = tokio::fs::metadata(path).await.map_err(|e| {
                    if e.kind() == std::io::ErrorKind::NotFound {
                        RcptError::InvalidDocument(format!("file not found: {}", path.display()))
                    } else {
                        RcptError::InvalidDocument(format!(
                            "cannot read {}: {}",
                            path.display(),
                            e
                        ))
                    }
                })?;
                if !metadata.is_file() {
                    return Err(RcptError::InvalidDocument(format!(
                        "not a file: {}",
                        path.display()
                    )));
                }
                metadata.len()
            }
            DocumentSource::Bytes(bytes) => bytes.len() as u64,
        };

        if size > MAX_DOCUMENT_BYTES {
            return Err(RcptError::InvalidDocument(format!(
                "file too large: {} bytes (max {} bytes)",
                size, MAX_DOCUMENT_BYTES
            )));
        }

        debug!("Document {} accepted ({} bytes, {})", self.file_name(), size, self.mime_type);
        Ok(size)
    }
}

/// MIME type for a file path, based on its extension.
pub fn mime_type_for_path(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

fn extension_for_mime(mime_type: &str) -> &'static str {
    match mime_type {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/bmp" => "bmp",
        "image/tiff" => "tif",
        "image/webp" => "webp",
        "application/pdf" => "pdf",
        _ => "bin",
    }
}
