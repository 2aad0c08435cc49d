//! Error types for the doc2md library.
//!
//! Four distinct error types reflect four distinct failure scopes:
//!
//! * [`Doc2MdError`] — **Fatal**: the run cannot proceed (bad input file,
//!   missing credentials, no renderer at all). Returned as `Err` from
//!   [`crate::Orchestrator::run_sync`] and delivered as the terminal `error`
//!   event on the streaming path.
//!
//! * [`RasterError`] — **Recoverable**: one rasterisation strategy failed
//!   (converter missing, corrupt PDF). The rasterizer substitutes a
//!   placeholder page unless the fallback policy says otherwise.
//!
//! * [`PageError`] — **Non-fatal**: a single page's model call failed.
//!   Stored inside [`crate::output::PageResult`] and rendered as an error
//!   fragment; sibling pages are unaffected.
//!
//! * [`ModelError`] — transport-level failure of a vision-model call. The
//!   page analyzer converts it into a [`PageError`]; it never reaches the
//!   caller directly.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification of a fatal error, used on the event wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Input,
    Rasterization,
    Transport,
    Internal,
}

/// All fatal errors returned by the doc2md library.
#[derive(Debug, Error)]
pub enum Doc2MdError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    /// The job does not describe a usable document.
    #[error("Invalid input '{input}': {reason}")]
    InvalidInput { input: String, reason: String },

    /// The declared extension is not in the permitted set.
    #[error("Unsupported file format '{extension}' for '{filename}'")]
    UnsupportedExtension { filename: String, extension: String },

    /// Endpoint, key or deployment missing or malformed.
    #[error("Missing model configuration: {0}\nendpoint, api_key and deployment_name are required.")]
    MissingCredentials(String),

    /// The model client could not be constructed from the credentials.
    #[error("Model client error for '{provider}': {reason}")]
    ModelClient { provider: String, reason: String },

    // ── Rasterisation errors ──────────────────────────────────────────────
    /// No strategy, including the placeholder, could produce a page.
    #[error("Document could not be rasterised: {reason}")]
    RasterisationUnavailable { reason: String },

    /// A strategy failed and the fallback policy forbids the placeholder.
    #[error("Rasterisation failed for '{filename}': {source}")]
    RasterisationFailed {
        filename: String,
        #[source]
        source: RasterError,
    },

    // ── Transport errors ──────────────────────────────────────────────────
    /// The event consumer went away, or the producer task died.
    #[error("Event stream closed: {0}")]
    Transport(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Doc2MdError {
    /// Which bucket of the error taxonomy this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Doc2MdError::FileNotFound { .. }
            | Doc2MdError::PermissionDenied { .. }
            | Doc2MdError::InvalidInput { .. }
            | Doc2MdError::UnsupportedExtension { .. }
            | Doc2MdError::MissingCredentials(_)
            | Doc2MdError::ModelClient { .. }
            | Doc2MdError::InvalidConfig(_) => ErrorKind::Input,
            Doc2MdError::RasterisationUnavailable { .. }
            | Doc2MdError::RasterisationFailed { .. } => ErrorKind::Rasterization,
            Doc2MdError::Transport(_) => ErrorKind::Transport,
            Doc2MdError::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// A failure of one rasterisation strategy.
///
/// Never surfaces on its own: the rasterizer either falls back to a
/// placeholder page or wraps it in [`Doc2MdError::RasterisationFailed`].
#[derive(Debug, Error)]
pub enum RasterError {
    /// The external converter binary could not be started.
    #[error("converter '{program}' is unavailable: {reason}")]
    ConverterUnavailable { program: String, reason: String },

    /// The external converter ran but exited unsuccessfully.
    #[error("converter '{program}' exited with {status}: {stderr}")]
    ConverterFailed {
        program: String,
        status: String,
        stderr: String,
    },

    /// The external converter did not finish in time and was killed.
    #[error("converter '{program}' timed out after {secs}s")]
    ConverterTimeout { program: String, secs: u64 },

    /// The converter succeeded but left no PDF in its workspace.
    #[error("no PDF produced in {dir}")]
    NoOutput { dir: PathBuf },

    /// The strategy ran but produced no pages.
    #[error("no pages produced")]
    NoPages,

    /// pdfium could not be bound.
    #[error("pdfium library unavailable: {0}")]
    PdfiumUnavailable(String),

    /// pdfium opened the library but not the document, or a page failed.
    #[error("pdfium failed: {0}")]
    Pdfium(String),

    /// Image decoding or encoding failed.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The blocking render task panicked or was cancelled.
    #[error("render task failed: {0}")]
    Join(String),
}

/// A non-fatal error for a single page.
///
/// Stored alongside [`crate::output::PageResult`] when a page fails.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum PageError {
    /// The model call failed (network, auth, malformed response, …).
    #[error("Page {page}: analysis failed: {detail}")]
    AnalysisFailed { page: usize, detail: String },

    /// The model answered with no content at all.
    #[error("Page {page}: model returned an empty response")]
    EmptyResponse { page: usize },
}

impl PageError {
    /// The human-readable reason without the page prefix.
    pub fn reason(&self) -> String {
        match self {
            PageError::AnalysisFailed { detail, .. } => detail.clone(),
            PageError::EmptyResponse { .. } => "model returned an empty response".to_string(),
        }
    }
}

/// Failure of one vision-model call.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Connection refused, DNS failure, reset mid-body, …
    #[error("HTTP transport error: {0}")]
    Http(String),

    /// Bad or missing key.
    #[error("authentication rejected: {detail}")]
    Auth { detail: String },

    #[error("rate limited: {0}")]
    RateLimited(String),

    /// The body could not be parsed or had no content.
    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("request timed out after {secs}s")]
    Timeout { secs: u64 },

    /// Error reported by an edgequake-llm provider.
    #[error("provider error: {0}")]
    Provider(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_errors_classify_as_input() {
        let e = Doc2MdError::MissingCredentials("api_key".into());
        assert_eq!(e.kind(), ErrorKind::Input);
        assert!(e.to_string().contains("api_key"));

        let e = Doc2MdError::UnsupportedExtension {
            filename: "a.exe".into(),
            extension: ".exe".into(),
        };
        assert_eq!(e.kind(), ErrorKind::Input);
    }

    #[test]
    fn rasterisation_failed_keeps_source() {
        let e = Doc2MdError::RasterisationFailed {
            filename: "deck.pptx".into(),
            source: RasterError::ConverterTimeout {
                program: "libreoffice".into(),
                secs: 5,
            },
        };
        assert_eq!(e.kind(), ErrorKind::Rasterization);
        let msg = e.to_string();
        assert!(msg.contains("deck.pptx"), "got: {msg}");
        assert!(msg.contains("timed out after 5s"), "got: {msg}");
    }

    #[test]
    fn page_error_reason_strips_prefix() {
        let e = PageError::AnalysisFailed {
            page: 2,
            detail: "HTTP 500".into(),
        };
        assert_eq!(e.reason(), "HTTP 500");
        assert!(e.to_string().starts_with("Page 2"));
    }

    #[test]
    fn error_kind_serialises_snake_case() {
        let v = serde_json::to_value(ErrorKind::Rasterization).unwrap();
        assert_eq!(v, "rasterization");
    }

    #[test]
    fn auth_error_display() {
        let e = ModelError::Auth {
            detail: "invalid key".into(),
        };
        assert_eq!(e.to_string(), "authentication rejected: invalid key");
    }
}
