//! Data types flowing through and out of the pipeline.

use crate::error::PageError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a page image came to exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum PageOrigin {
    /// Rasterised from a paged document (directly or via the office converter).
    Rendered,
    /// The input itself was an image.
    Passthrough,
    /// Synthetic stand-in; `label` is the text drawn on it.
    Placeholder { label: String },
}

/// One page of the document as an encoded image.
#[derive(Clone)]
pub struct PageImage {
    /// 1-based, contiguous.
    pub index: usize,
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
    pub origin: PageOrigin,
}

impl PageImage {
    pub fn new(index: usize, bytes: Vec<u8>, mime_type: &'static str, origin: PageOrigin) -> Self {
        Self {
            index,
            bytes,
            mime_type,
            origin,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self.origin, PageOrigin::Placeholder { .. })
    }
}

impl fmt::Debug for PageImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageImage")
            .field("index", &self.index)
            .field("bytes", &self.bytes.len())
            .field("mime_type", &self.mime_type)
            .field("origin", &self.origin)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageStatus {
    Success,
    Error,
}

/// Outcome of analysing one page.
///
/// On failure `markdown` holds the rendered error fragment, so aggregation
/// never has to special-case failed pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResult {
    /// 1-indexed page number.
    pub page_num: usize,
    pub markdown: String,
    pub duration_ms: u64,
    pub error: Option<PageError>,
}

impl PageResult {
    pub fn status(&self) -> PageStatus {
        if self.error.is_none() {
            PageStatus::Success
        } else {
            PageStatus::Error
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn content_length(&self) -> usize {
        self.markdown.chars().count()
    }

    pub fn summary(&self) -> PageSummary {
        PageSummary {
            page: self.page_num,
            status: self.status(),
            content_length: self.is_success().then(|| self.content_length()),
            error: self.error.as_ref().map(PageError::reason),
        }
    }
}

/// Per-page line of the final report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageSummary {
    pub page: usize,
    pub status: PageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub original_filename: String,
    pub converted_size: usize,
    pub enhanced: bool,
    pub method: String,
    pub llm_model: String,
    pub endpoint: String,
    pub dpi: u32,
    pub duration_ms: u64,
}

/// Terminal result of a successful run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionReport {
    /// Final Markdown (enhanced when requested).
    pub markdown: String,
    /// Aggregated Markdown before enhancement.
    pub original_markdown: String,
    pub analysis_results: Vec<PageSummary>,
    pub pages_processed: usize,
    pub successful_pages: usize,
    pub failed_pages: usize,
    pub metadata: ReportMetadata,
}
