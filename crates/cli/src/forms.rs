//! Loading form-version documents from disk into a store.

use std::path::{Path, PathBuf};

use formflow_engine::FormVersion;
use formflow_interchange::{from_interchange, FormVersionDoc};
use formflow_storage::{FormStorage, NewFormVersion, StorageError};

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("error reading '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("error parsing JSON in '{path}': {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid form document '{path}': {message}")]
    Invalid { path: PathBuf, message: String },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Read one document and check that it loads as a form version.
pub fn read_form(path: &Path) -> Result<(FormVersionDoc, FormVersion), LoadError> {
    let text = std::fs::read_to_string(path).map_err(|source| LoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let json: serde_json::Value = serde_json::from_str(&text).map_err(|source| LoadError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    let invalid = |message: String| LoadError::Invalid {
        path: path.to_path_buf(),
        message,
    };
    let doc = from_interchange(&json).map_err(|e| invalid(e.to_string()))?;
    let form = FormVersion::from_doc(&doc).map_err(|e| invalid(e.to_string()))?;
    Ok((doc, form))
}

/// Every `*.json` file of `dir`, sorted by name.
pub fn form_files(dir: &Path) -> Result<Vec<PathBuf>, LoadError> {
    let read_err = |source| LoadError::Read {
        path: dir.to_path_buf(),
        source,
    };
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(read_err)? {
        let path = entry.map_err(read_err)?.path();
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Store documents under their own ids, keeping their status.
pub async fn seed<S: FormStorage>(storage: &S, docs: Vec<FormVersionDoc>) -> Result<usize, LoadError> {
    let mut snapshot = storage.begin_snapshot().await?;
    let count = docs.len();
    for doc in docs {
        let version = NewFormVersion {
            id: Some(doc.id),
            form_id: doc.form_id,
            version_number: doc.version_number.max(1),
            status: doc.status,
            document: doc,
        };
        if let Err(e) = storage.insert_form_version(&mut snapshot, version).await {
            let _ = storage.abort_snapshot(snapshot).await;
            return Err(e.into());
        }
    }
    storage.commit_snapshot(snapshot).await?;
    Ok(count)
}

/// Load every document of `dir` into `storage`.
pub async fn load_dir<S: FormStorage>(storage: &S, dir: &Path) -> Result<usize, LoadError> {
    let mut docs = Vec::new();
    for path in form_files(dir)? {
        let (doc, form) = read_form(&path)?;
        tracing::info!(
            form_version_id = form.id,
            form = %form.form_name,
            path = %path.display(),
            "loaded form version"
        );
        docs.push(doc);
    }
    seed(storage, docs).await
}
