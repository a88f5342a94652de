//! Blob storage for uploaded files and decoded signatures.

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Errors from a blob store.
#[derive(Debug)]
pub enum BlobError {
    Io(std::io::Error),
    /// The store refused the write.
    Rejected(String),
}

impl fmt::Display for BlobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlobError::Io(e) => write!(f, "blob store I/O error: {}", e),
            BlobError::Rejected(msg) => write!(f, "blob store rejected write: {}", msg),
        }
    }
}

impl std::error::Error for BlobError {}

impl From<std::io::Error> for BlobError {
    fn from(e: std::io::Error) -> Self {
        BlobError::Io(e)
    }
}

/// Opaque blob store. Returns the locator (relative path) of the stored blob.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, directory: &str, extension: &str, bytes: &[u8]) -> Result<String, BlobError>;
}

/// Filesystem store writing `<root>/<directory>/<sha256>.<ext>`.
///
/// Content-addressed names make repeated uploads of the same bytes land on
/// the same path.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsBlobStore { root: root.into() }
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, directory: &str, extension: &str, bytes: &[u8]) -> Result<String, BlobError> {
        if directory.contains("..") || extension.contains(['/', '\\', '.']) {
            return Err(BlobError::Rejected(format!(
                "unsafe location {}/*.{}",
                directory, extension
            )));
        }
        let digest = hex(&Sha256::digest(bytes));
        let name = if extension.is_empty() {
            digest
        } else {
            format!("{}.{}", digest, extension)
        };
        let relative = format!("{}/{}", directory, name);
        let dir = self.root.join(directory);
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join(&name), bytes).await?;
        tracing::debug!(path = %relative, size = bytes.len(), "stored blob");
        Ok(relative)
    }
}

pub(crate) fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// An in-memory upload as received from the transport layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub bytes: Vec<u8>,
    pub original_name: String,
    pub mime_type: String,
}

impl Upload {
    /// Lowercased extension of the original file name, if any.
    pub fn extension(&self) -> String {
        std::path::Path::new(&self.original_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default()
    }
}

/// A submitted field value: plain JSON, or a file upload.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmittedValue {
    Json(Value),
    Upload(Upload),
}

impl From<Value> for SubmittedValue {
    fn from(v: Value) -> Self {
        SubmittedValue::Json(v)
    }
}

impl From<Upload> for SubmittedValue {
    fn from(u: Upload) -> Self {
        SubmittedValue::Upload(u)
    }
}

impl SubmittedValue {
    /// JSON view used by conditions and rules. Uploads are seen as the
    /// descriptor they will be stored as (minus the path).
    pub fn as_json(&self) -> Value {
        match self {
            SubmittedValue::Json(v) => v.clone(),
            SubmittedValue::Upload(u) => serde_json::json!({
                "original_name": u.original_name,
                "mime_type": u.mime_type,
                "size": u.bytes.len(),
                "extension": u.extension(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fs_store_writes_content_addressed_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        let a = store.put("files", "txt", b"hello").await.unwrap();
        let b = store.put("files", "txt", b"hello").await.unwrap();
        assert_eq!(a, b);
        assert!(a.starts_with("files/"));
        assert!(a.ends_with(".txt"));
        let written = std::fs::read(dir.path().join(&a)).unwrap();
        assert_eq!(written, b"hello");
    }

    #[tokio::test]
    async fn fs_store_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        assert!(matches!(
            store.put("../etc", "txt", b"x").await,
            Err(BlobError::Rejected(_))
        ));
    }

    #[test]
    fn upload_extension_is_lowercased() {
        let u = Upload {
            bytes: vec![],
            original_name: "Scan.PDF".into(),
            mime_type: "application/pdf".into(),
        };
        assert_eq!(u.extension(), "pdf");
    }
}
