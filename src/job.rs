//! Per-request input: the document, its declared name and the model credentials.

use crate::error::Doc2MdError;
use std::fmt;
use std::path::{Path, PathBuf};

/// Default rasterisation resolution.
pub const DEFAULT_DPI: u32 = 200;
/// Azure OpenAI REST API version used when the caller does not pick one.
pub const DEFAULT_API_VERSION: &str = "2024-02-01";

const MIN_DPI: u32 = 72;
const MAX_DPI: u32 = 600;

/// Where the document bytes come from.
#[derive(Clone)]
pub enum DocumentSource {
    /// A file already materialised on disk.
    Path(PathBuf),
    /// An in-memory buffer (e.g. an upload body).
    Bytes(Vec<u8>),
}

impl fmt::Debug for DocumentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentSource::Path(p) => f.debug_tuple("Path").field(p).finish(),
            DocumentSource::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
        }
    }
}

/// Endpoint credentials for the vision model.
#[derive(Clone, Default)]
pub struct ModelCredentials {
    pub endpoint: String,
    pub api_key: String,
    pub deployment: String,
    pub api_version: String,
}

impl ModelCredentials {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        deployment: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            deployment: deployment.into(),
            api_version: DEFAULT_API_VERSION.to_string(),
        }
    }

    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    /// Check that every required field is present and the endpoint parses.
    pub fn validate(&self) -> Result<(), Doc2MdError> {
        let missing: Vec<&str> = [
            ("endpoint", &self.endpoint),
            ("api_key", &self.api_key),
            ("deployment_name", &self.deployment),
        ]
        .into_iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(k, _)| k)
        .collect();

        if !missing.is_empty() {
            return Err(Doc2MdError::MissingCredentials(missing.join(", ")));
        }

        let url = reqwest::Url::parse(self.endpoint.trim()).map_err(|e| {
            Doc2MdError::MissingCredentials(format!("endpoint '{}' is not a URL: {e}", self.endpoint))
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(Doc2MdError::MissingCredentials(format!(
                "endpoint '{}' must be http or https",
                self.endpoint
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for ModelCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelCredentials")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .field("deployment", &self.deployment)
            .field("api_version", &self.api_version)
            .finish()
    }
}

/// One conversion request, owned by exactly one pipeline run.
#[derive(Debug, Clone)]
pub struct ConversionJob {
    pub document: DocumentSource,
    /// Declared file name; the extension drives strategy selection.
    pub filename: String,
    pub dpi: u32,
    pub credentials: ModelCredentials,
    pub enhance: bool,
}

impl ConversionJob {
    /// A job for a file on disk; the declared name is the path's file name.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            document: DocumentSource::Path(path),
            filename,
            dpi: DEFAULT_DPI,
            credentials: ModelCredentials::default(),
            enhance: true,
        }
    }

    /// A job for an in-memory buffer with an explicit declared name.
    pub fn from_bytes(bytes: Vec<u8>, filename: impl Into<String>) -> Self {
        Self {
            document: DocumentSource::Bytes(bytes),
            filename: filename.into(),
            dpi: DEFAULT_DPI,
            credentials: ModelCredentials::default(),
            enhance: true,
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.dpi = dpi;
        self
    }

    pub fn with_credentials(mut self, credentials: ModelCredentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_enhance(mut self, enhance: bool) -> Self {
        self.enhance = enhance;
        self
    }

    /// Lower-cased extension including the dot, e.g. `".pdf"`.
    pub fn extension(&self) -> Option<String> {
        extension_of(&self.filename)
    }

    /// File name without any directory part, as shown on placeholder pages.
    pub fn base_filename(&self) -> String {
        Path::new(&self.filename)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.filename.clone())
    }

    /// Validate the parts of the job that do not touch the file system.
    ///
    /// Credentials are checked separately by the model connector, since what
    /// counts as "complete" depends on the client being built.
    pub fn validate(&self) -> Result<(), Doc2MdError> {
        if self.filename.trim().is_empty() {
            return Err(Doc2MdError::InvalidInput {
                input: String::new(),
                reason: "no file name given".into(),
            });
        }
        if !(MIN_DPI..=MAX_DPI).contains(&self.dpi) {
            return Err(Doc2MdError::InvalidInput {
                input: self.filename.clone(),
                reason: format!("dpi must be {MIN_DPI}–{MAX_DPI}, got {}", self.dpi),
            });
        }
        if let DocumentSource::Bytes(b) = &self.document {
            if b.is_empty() {
                return Err(Doc2MdError::InvalidInput {
                    input: self.filename.clone(),
                    reason: "document is empty".into(),
                });
            }
        }
        Ok(())
    }
}

/// Lower-cased `.ext` of a file name, if it has one.
pub fn extension_of(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
}
