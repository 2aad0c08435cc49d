//! Input materialisation: turn a [`DocumentSource`] into a readable file.
//!
//! pdfium and the office converter both need a file-system path. Byte
//! buffers are written into a `TempDir` owned by the returned
//! [`MaterializedInput`]; dropping it removes the file, whichever way the
//! run ends.

use crate::error::Doc2MdError;
use crate::job::DocumentSource;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

/// A document that is readable on disk for the rest of the run.
#[derive(Debug)]
pub enum MaterializedInput {
    /// The caller's own file.
    Local(PathBuf),
    /// A buffer written to a private temp directory.
    Written { path: PathBuf, _temp_dir: TempDir },
}

impl MaterializedInput {
    pub fn path(&self) -> &Path {
        match self {
            MaterializedInput::Local(p) => p,
            MaterializedInput::Written { path, .. } => path,
        }
    }
}

/// Make `source` available as a file named after `filename`.
pub async fn materialize(
    source: &DocumentSource,
    filename: &str,
) -> Result<MaterializedInput, Doc2MdError> {
    match source {
        DocumentSource::Path(path) => resolve_local(path),
        DocumentSource::Bytes(bytes) => write_temp(bytes, filename).await,
    }
}

fn resolve_local(path: &Path) -> Result<MaterializedInput, Doc2MdError> {
    let path = path.to_path_buf();

    if !path.exists() {
        return Err(Doc2MdError::FileNotFound { path });
    }
    if path.is_dir() {
        return Err(Doc2MdError::InvalidInput {
            input: path.display().to_string(),
            reason: "is a directory".into(),
        });
    }

    // Check read permission by attempting to open
    match std::fs::File::open(&path) {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(Doc2MdError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(Doc2MdError::FileNotFound { path });
        }
    }

    debug!("Resolved local document: {}", path.display());
    Ok(MaterializedInput::Local(path))
}

async fn write_temp(bytes: &[u8], filename: &str) -> Result<MaterializedInput, Doc2MdError> {
    let temp_dir = tempfile::Builder::new()
        .prefix("doc2md-")
        .tempdir()
        .map_err(|e| Doc2MdError::Internal(format!("Failed to create temp dir: {e}")))?;
    let path = temp_dir.path().join(sanitize_filename(filename));

    tokio::fs::write(&path, bytes)
        .await
        .map_err(|e| Doc2MdError::Internal(format!("Failed to write temp file: {e}")))?;

    debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(MaterializedInput::Written {
        path,
        _temp_dir: temp_dir,
    })
}

/// Reduce an uploaded name to a safe single path component.
///
/// Keeps letters and digits of any script plus `.`, `-`, `_`; drops
/// directories and leading dots.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "document".to_string()
    } else {
        cleaned.to_string()
    }
}
