//! Configuration types for document-to-Markdown conversion.
//!
//! Per-request values (document, dpi, credentials, enhancement flag) live on
//! [`crate::job::ConversionJob`]. Everything that is a property of the
//! deployment rather than of one request — concurrency, model sampling, the
//! external converter, fallback policy — is controlled through
//! [`ConversionConfig`], built via its [`ConversionConfigBuilder`].

use crate::error::Doc2MdError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Deployment-wide configuration for the conversion pipeline.
///
/// # Example
/// ```rust
/// use doc2md::{ConversionConfig, FallbackPolicy};
///
/// let config = ConversionConfig::builder()
///     .concurrency(4)
///     .fallback_policy(FallbackPolicy::Fail)
///     .build()
///     .unwrap();
/// assert_eq!(config.concurrency, 4);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionConfig {
    /// Number of pages analysed at once. Default: 1 (sequential).
    ///
    /// Sequential mode is the only mode that forwards model output as
    /// `ai_chunk` events; with more workers each page is analysed with a
    /// blocking call and results are released in page order.
    pub concurrency: usize,

    /// Maximum tokens the model may generate per page. Default: 2000.
    pub max_tokens: usize,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Custom system prompt. If None, uses the built-in default.
    pub system_prompt: Option<String>,

    /// Longest edge of a rendered page in pixels. Default: 4000.
    ///
    /// Applied on top of the requested DPI so an A0 poster at 200 DPI does
    /// not allocate a 6 600 × 9 400 px bitmap.
    pub max_rendered_pixels: u32,

    /// What to do when a rasterisation strategy fails. Default: placeholder.
    pub fallback_policy: FallbackPolicy,

    /// Program used to turn office documents into PDF. Default: `libreoffice`.
    pub office_converter: String,

    /// Kill the office converter after this many seconds. Default: 120.
    pub converter_timeout_secs: u64,

    /// TrueType font used to label placeholder pages.
    ///
    /// Tried first, then common system font locations, then the font
    /// bundled with the crate.
    pub placeholder_font: Option<PathBuf>,

    /// Path to the pdfium shared library (file or directory).
    ///
    /// When None, `PDFIUM_LIB_PATH` is consulted, then the system library.
    pub pdfium_library: Option<PathBuf>,

    /// Capacity of the event channel on the streaming path. Default: 32.
    pub event_buffer: usize,

    /// Per-request timeout for model HTTP calls in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Forward model output incrementally when analysing sequentially. Default: true.
    pub stream_chunks: bool,

    /// Apply the fragment tidy pass to successful pages. Default: true.
    pub tidy_fragments: bool,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            max_tokens: 2000,
            temperature: 0.1,
            system_prompt: None,
            max_rendered_pixels: 4000,
            fallback_policy: FallbackPolicy::default(),
            office_converter: "libreoffice".to_string(),
            converter_timeout_secs: 120,
            placeholder_font: None,
            pdfium_library: None,
            event_buffer: 32,
            api_timeout_secs: 120,
            stream_chunks: true,
            tidy_fragments: true,
        }
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn fallback_policy(mut self, policy: FallbackPolicy) -> Self {
        self.config.fallback_policy = policy;
        self
    }

    pub fn office_converter(mut self, program: impl Into<String>) -> Self {
        self.config.office_converter = program.into();
        self
    }

    pub fn converter_timeout_secs(mut self, secs: u64) -> Self {
        self.config.converter_timeout_secs = secs.max(1);
        self
    }

    pub fn placeholder_font(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.placeholder_font = Some(path.into());
        self
    }

    pub fn pdfium_library(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library = Some(path.into());
        self
    }

    pub fn event_buffer(mut self, n: usize) -> Self {
        self.config.event_buffer = n.max(1);
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn stream_chunks(mut self, v: bool) -> Self {
        self.config.stream_chunks = v;
        self
    }

    pub fn tidy_fragments(mut self, v: bool) -> Self {
        self.config.tidy_fragments = v;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Doc2MdError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(Doc2MdError::InvalidConfig("Concurrency must be ≥ 1".into()));
        }
        if c.max_tokens == 0 {
            return Err(Doc2MdError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if c.office_converter.trim().is_empty() {
            return Err(Doc2MdError::InvalidConfig(
                "office converter program must not be empty".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(Doc2MdError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Behaviour when a rasterisation strategy fails for a document.
///
/// | Policy | Effect |
/// |--------|--------|
/// | `Placeholder` | substitute one placeholder page and continue (default) |
/// | `Fail` | stop the run with a rasterisation error |
///
/// Documents with no strategy at all (e.g. `.txt`) always get the
/// placeholder; the policy only governs strategies that were tried and failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    #[default]
    Placeholder,
    Fail,
}
