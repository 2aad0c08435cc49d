//! # doc2md
//!
//! Convert documents to Markdown by letting a vision language model read
//! rendered page images.
//!
//! ## Why images?
//!
//! Text extraction fails on scanned certificates, slides and multi-column
//! layouts. Instead every document is turned into page images (PDF via
//! pdfium, Office files through LibreOffice first, images as-is) and a
//! vision model transcribes each page into Markdown, describing figures as
//! `[Image: …]`.
//!
//! ## Pipeline Overview
//!
//! ```text
//! document
//!  │
//!  ├─ 1. Validate   job, extension, credentials, model client
//!  ├─ 2. Rasterize  strategy by format; placeholder page on failure
//!  ├─ 3. Analyze    one model call per page, sequential (streamed) or
//!  │                bounded-concurrent with in-order release
//!  ├─ 4. Aggregate  fragments joined by `---`
//!  └─ 5. Enhance    optional heading / bold / mail-link heuristics
//! ```
//!
//! A failed page never fails the run: it becomes an error fragment and an
//! error entry in the report.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use doc2md::{ConversionConfig, ConversionJob, ModelCredentials, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let job = ConversionJob::from_path("certificate.pdf").with_credentials(
//!         ModelCredentials::new("https://my-resource.openai.azure.com", "key", "gpt-4o"),
//!     );
//!     let report = Orchestrator::new(ConversionConfig::default()).run_sync(job).await?;
//!     println!("{}", report.markdown);
//!     eprintln!("{}/{} pages ok", report.successful_pages, report.pages_processed);
//!     Ok(())
//! }
//! ```
//!
//! ## Streaming
//!
//! [`Orchestrator::run_streaming`] returns an [`EventStream`] of
//! [`PipelineEvent`]s (`connection`, `progress`, `ai_chunk`, `page_result`,
//! `page_error`, then one `result` or `error`). [`emit::to_sse`] frames them
//! for Server-Sent Events. Dropping the stream cancels the run.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `doc2md` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! doc2md = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod emit;
pub mod error;
pub mod events;
pub mod job;
pub mod model;
pub mod orchestrator;
pub mod output;
pub mod pipeline;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionConfig, ConversionConfigBuilder, FallbackPolicy};
pub use error::{Doc2MdError, ErrorKind, ModelError, PageError, RasterError};
pub use events::{PipelineEvent, PipelineState, Progress};
pub use job::{ConversionJob, DocumentSource, ModelCredentials};
pub use model::{
    AzureConnector, ChunkStream, ModelConnector, ProviderConnector,
    ProviderModel, VisionModel, VisionRequest,
};
pub use orchestrator::{EventSink, EventStream, Orchestrator};
pub use output::{ConversionReport, PageImage, PageOrigin, PageResult, PageStatus, PageSummary};
pub use pipeline::aggregate::{aggregate, AggregatedDocument, PAGE_SEPARATOR};
pub use pipeline::analyze::{PageAnalyzer, PageChunk};
pub use pipeline::enhance::enhance_markdown;
pub use pipeline::format::FormatClass;
pub use pipeline::rasterize::{DocumentRasterizer, RasterInput, RasterStrategy};
