//! Integration tests for the conversion pipeline.
//!
//! The vision model and the PDF renderer are replaced with in-process fakes,
//! so these run without network access or a pdfium library.
//!
//! Run with:
//!   cargo test --test pipeline -- --nocapture

use async_trait::async_trait;
use doc2md::error::ErrorKind;
use doc2md::pipeline::encode::{encode_png, PNG_MIME};
use doc2md::pipeline::placeholder::PlaceholderRenderer;
use doc2md::pipeline::office::OfficeStrategy;
use doc2md::{
    ChunkStream, ConversionConfig, ConversionJob, Doc2MdError, DocumentRasterizer, FallbackPolicy,
    FormatClass, ModelCredentials, ModelError, Orchestrator, PageImage, PageOrigin,
    PipelineEvent, PipelineState, RasterInput, RasterStrategy, VisionModel, VisionRequest,
    PAGE_SEPARATOR,
};
use futures::StreamExt;
use image::{DynamicImage, RgbImage};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── Test doubles ─────────────────────────────────────────────────────────────

/// Stands in for pdfium: `pages` blank PNG pages for any paged document.
struct FakePaged {
    pages: usize,
}

#[async_trait]
impl RasterStrategy for FakePaged {
    fn name(&self) -> &'static str {
        "fake-paged"
    }

    async fn rasterize(
        &self,
        _input: RasterInput<'_>,
    ) -> Result<Vec<PageImage>, doc2md::RasterError> {
        let img = DynamicImage::ImageRgb8(RgbImage::new(8, 8));
        let png = encode_png(&img)?;
        Ok((1..=self.pages)
            .map(|i| PageImage::new(i, png.clone(), PNG_MIME, PageOrigin::Rendered))
            .collect())
    }
}

/// Page number the instruction was built for.
fn page_of(prompt: &str) -> usize {
    prompt
        .split("this page ")
        .nth(1)
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

/// Answers `Content of page N`, fails the configured pages and sleeps
/// `delay_ms(N)` first.
struct PageModel {
    failing: BTreeSet<usize>,
    delay_ms: fn(usize) -> u64,
}

impl PageModel {
    fn ok() -> Self {
        Self {
            failing: BTreeSet::new(),
            delay_ms: |_| 0,
        }
    }

    fn failing(pages: &[usize]) -> Self {
        Self {
            failing: pages.iter().copied().collect(),
            delay_ms: |_| 0,
        }
    }
}

#[async_trait]
impl VisionModel for PageModel {
    fn name(&self) -> &str {
        "page-model"
    }

    fn endpoint(&self) -> &str {
        "https://fake.openai.azure.com"
    }

    async fn complete(&self, request: &VisionRequest) -> Result<String, ModelError> {
        let page = page_of(&request.prompt);
        tokio::time::sleep(Duration::from_millis((self.delay_ms)(page))).await;
        if self.failing.contains(&page) {
            return Err(ModelError::Provider("API error 500: internal server error".into()));
        }
        Ok(format!("Content of page {page}"))
    }
}

/// Repeats the prompt back, so tests can see what the model was told.
struct Echo;

#[async_trait]
impl VisionModel for Echo {
    fn name(&self) -> &str {
        "echo"
    }

    async fn complete(&self, request: &VisionRequest) -> Result<String, ModelError> {
        Ok(request.prompt.clone())
    }
}

/// Always answers with the same text.
struct Fixed(&'static str);

#[async_trait]
impl VisionModel for Fixed {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn complete(&self, _request: &VisionRequest) -> Result<String, ModelError> {
        Ok(self.0.to_string())
    }
}

/// Streams two chunks of page text, then loses the connection.
struct BreaksMidStream;

#[async_trait]
impl VisionModel for BreaksMidStream {
    fn name(&self) -> &str {
        "breaks-mid-stream"
    }

    async fn complete(&self, _request: &VisionRequest) -> Result<String, ModelError> {
        Err(ModelError::Http("connection reset".into()))
    }

    async fn complete_stream(&self, _request: &VisionRequest) -> Result<ChunkStream, ModelError> {
        let items = vec![
            Ok("# Par".to_string()),
            Ok("tial".to_string()),
            Err(ModelError::Http("connection reset".into())),
        ];
        Ok(Box::pin(futures::stream::iter(items)))
    }
}

/// Never answers; records when its in-flight call is dropped.
struct Hanging {
    started: Arc<AtomicBool>,
    dropped: Arc<AtomicBool>,
}

struct SetOnDrop(Arc<AtomicBool>);

impl Drop for SetOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl VisionModel for Hanging {
    fn name(&self) -> &str {
        "hanging"
    }

    async fn complete(&self, _request: &VisionRequest) -> Result<String, ModelError> {
        let _guard = SetOnDrop(Arc::clone(&self.dropped));
        self.started.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(300)).await;
        Ok(String::new())
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Route pipeline logs to the test harness (`RUST_LOG=doc2md=debug`).
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn config() -> ConversionConfig {
    ConversionConfig::default()
}

fn rasterizer(config: &ConversionConfig, pages: usize) -> DocumentRasterizer {
    DocumentRasterizer::builder(config)
        .strategy(FormatClass::Paged, Arc::new(FakePaged { pages }))
        .placeholder(PlaceholderRenderer::without_font())
        .build()
}

fn orchestrator(
    config: ConversionConfig,
    pages: usize,
    model: Arc<dyn VisionModel>,
) -> Orchestrator {
    let rasterizer = rasterizer(&config, pages);
    Orchestrator::new(config)
        .with_rasterizer(rasterizer)
        .with_model(model)
}

fn pdf_job() -> ConversionJob {
    ConversionJob::from_bytes(b"%PDF-1.7 fake".to_vec(), "report.pdf").with_enhance(false)
}

fn sections(markdown: &str) -> Vec<&str> {
    markdown.split(PAGE_SEPARATOR).collect()
}

// ── Page-level failure isolation ─────────────────────────────────────────────

#[tokio::test]
async fn failed_page_does_not_abort_document() {
    init_tracing();
    let o = orchestrator(config(), 3, Arc::new(PageModel::failing(&[2])));
    let report = tokio_test::assert_ok!(o.run_sync(pdf_job()).await);

    assert_eq!(report.pages_processed, 3);
    assert_eq!(report.successful_pages, 2);
    assert_eq!(report.failed_pages, 1);

    let parts = sections(&report.markdown);
    assert_eq!(parts.len(), 3, "markdown: {}", report.markdown);
    assert_eq!(parts[0], "Content of page 1");
    assert!(parts[1].starts_with("# Page 2"));
    assert!(parts[1].contains("[Error: Failed to analyze this page - "));
    assert!(parts[1].contains("500"));
    assert_eq!(parts[2], "Content of page 3");

    let summary = &report.analysis_results[1];
    assert_eq!(summary.page, 2);
    assert!(summary.error.as_deref().unwrap_or_default().contains("500"));
    assert!(report.analysis_results[0].error.is_none());
}

#[tokio::test]
async fn all_pages_failing_still_produces_a_result() {
    let o = orchestrator(config(), 3, Arc::new(PageModel::failing(&[1, 2, 3])));
    let report = o.run_sync(pdf_job()).await.unwrap();

    assert_eq!(report.pages_processed, 3);
    assert_eq!(report.successful_pages, 0);
    assert_eq!(report.failed_pages, 3);
    assert_eq!(report.analysis_results.len(), 3);
    assert_eq!(report.markdown.matches("[Error: ").count(), 3);
}

#[tokio::test]
async fn report_metadata_describes_the_run() {
    let o = orchestrator(config(), 2, Arc::new(PageModel::ok()));
    let report = o.run_sync(pdf_job().with_dpi(150)).await.unwrap();

    let m = &report.metadata;
    assert_eq!(m.original_filename, "report.pdf");
    assert_eq!(m.method, "ai_image_analysis");
    assert_eq!(m.llm_model, "page-model");
    assert_eq!(m.endpoint, "https://fake.openai.azure.com");
    assert_eq!(m.dpi, 150);
    assert!(!m.enhanced);
    assert_eq!(m.converted_size, report.markdown.chars().count());
    assert_eq!(report.markdown, report.original_markdown);
}

// ── Concurrency ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn concurrent_analysis_keeps_page_order() {
    let config = ConversionConfig::builder().concurrency(4).build().unwrap();
    let model = PageModel {
        failing: BTreeSet::new(),
        // Page 1 finishes last.
        delay_ms: |page| 20 * (7 - page as u64),
    };
    let o = orchestrator(config, 6, Arc::new(model));

    let events: Vec<PipelineEvent> = o.run_streaming(pdf_job()).collect().await;
    let pages: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::PageResult { page, total_pages, .. } => {
                assert_eq!(*total_pages, 6);
                Some(*page)
            }
            _ => None,
        })
        .collect();
    assert_eq!(pages, vec![1, 2, 3, 4, 5, 6]);

    let report = match events.last() {
        Some(PipelineEvent::Result(report)) => report,
        other => panic!("expected result last, got {other:?}"),
    };
    let expected: Vec<String> = (1..=6).map(|p| format!("Content of page {p}")).collect();
    assert_eq!(sections(&report.markdown), expected);
}

// ── Streaming ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn stream_starts_with_connection_and_ends_with_result() {
    let o = orchestrator(config(), 2, Arc::new(PageModel::failing(&[2])));
    let events: Vec<PipelineEvent> = o.run_streaming(pdf_job()).collect().await;

    assert!(matches!(events.first(), Some(PipelineEvent::Connection { .. })));
    assert!(matches!(events.last(), Some(PipelineEvent::Result(_))));
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);

    let kinds: Vec<&str> = events.iter().map(PipelineEvent::kind).collect();
    let first_chunk = kinds.iter().position(|k| *k == "ai_chunk").unwrap();
    let first_page = kinds.iter().position(|k| *k == "page_result").unwrap();
    assert!(first_chunk < first_page, "kinds: {kinds:?}");
    assert!(kinds.contains(&"page_error"));

    let stages: Vec<PipelineState> = events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::Progress(p) => Some(p.stage),
            _ => None,
        })
        .collect();
    assert_eq!(stages.first(), Some(&PipelineState::Validating));
    assert!(stages.contains(&PipelineState::Rasterizing));
    assert!(stages.contains(&PipelineState::AnalyzingPages));
    assert_eq!(stages.last(), Some(&PipelineState::Aggregating));

    // Chunks for page 1 add up to its fragment.
    let streamed: String = events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::AiChunk { page: 1, chunk } => Some(chunk.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(streamed, "Content of page 1");
}

#[tokio::test]
async fn into_report_matches_run_sync() {
    let o = orchestrator(config(), 3, Arc::new(PageModel::ok()));
    let streamed = o.run_streaming(pdf_job()).into_report().await.unwrap();
    let synced = o.run_sync(pdf_job()).await.unwrap();
    assert_eq!(streamed.markdown, synced.markdown);
    assert_eq!(streamed.pages_processed, synced.pages_processed);
}

#[tokio::test]
async fn dropping_the_stream_cancels_the_model_call() {
    let started = Arc::new(AtomicBool::new(false));
    let dropped = Arc::new(AtomicBool::new(false));
    let model = Hanging {
        started: Arc::clone(&started),
        dropped: Arc::clone(&dropped),
    };
    let o = orchestrator(config(), 1, Arc::new(model));

    let mut events = o.run_streaming(pdf_job());
    while let Some(event) = events.next().await {
        if let PipelineEvent::Progress(p) = &event {
            if p.page.is_some() {
                break;
            }
        }
    }
    for _ in 0..200 {
        if started.load(Ordering::SeqCst) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(started.load(Ordering::SeqCst));

    drop(events);
    for _ in 0..200 {
        if dropped.load(Ordering::SeqCst) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(dropped.load(Ordering::SeqCst), "model call outlived the stream");
}

#[tokio::test]
async fn stream_broken_mid_page_becomes_error_fragment() {
    init_tracing();
    let o = orchestrator(config(), 1, Arc::new(BreaksMidStream));
    let events: Vec<PipelineEvent> = o.run_streaming(pdf_job()).collect().await;

    let kinds: Vec<&str> = events.iter().map(PipelineEvent::kind).collect();
    let chunk_positions: Vec<usize> = kinds
        .iter()
        .enumerate()
        .filter(|(_, k)| **k == "ai_chunk")
        .map(|(i, _)| i)
        .collect();
    let page_error = kinds.iter().position(|k| *k == "page_error").unwrap();
    assert_eq!(chunk_positions.len(), 2, "kinds: {kinds:?}");
    assert!(chunk_positions.iter().all(|&i| i < page_error), "kinds: {kinds:?}");
    assert!(!kinds.contains(&"page_result"));

    match &events[page_error] {
        PipelineEvent::PageError { page, error, .. } => {
            assert_eq!(*page, 1);
            assert!(error.contains("connection reset"), "error: {error}");
        }
        other => panic!("expected page_error, got {other:?}"),
    }

    let report = match events.last() {
        Some(PipelineEvent::Result(report)) => report,
        other => panic!("expected result last, got {other:?}"),
    };
    assert_eq!(report.failed_pages, 1);
    let section = sections(&report.markdown)[0];
    assert!(section.starts_with("# Page 1"), "section: {section}");
    assert!(section.contains("[Error: Failed to analyze this page - "));
    assert!(!section.contains("Partial"));
}

#[cfg(unix)]
#[tokio::test]
async fn dropping_the_stream_removes_office_workspace() {
    use std::os::unix::fs::PermissionsExt;

    init_tracing();
    let bin = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let converter = bin.path().join("convert.sh");
    std::fs::write(&converter, "#!/bin/sh\nexec sleep 30\n").unwrap();
    std::fs::set_permissions(&converter, std::fs::Permissions::from_mode(0o755)).unwrap();

    let config = config();
    let office = OfficeStrategy::new(
        converter.to_string_lossy(),
        60,
        Arc::new(FakePaged { pages: 1 }),
    )
    .with_scratch_dir(scratch.path());
    let rasterizer = DocumentRasterizer::builder(&config)
        .strategy(FormatClass::Office, Arc::new(office))
        .placeholder(PlaceholderRenderer::without_font())
        .build();
    let o = Orchestrator::new(config)
        .with_rasterizer(rasterizer)
        .with_model(Arc::new(PageModel::ok()));

    let listing = |dir: &std::path::Path| std::fs::read_dir(dir).unwrap().count();
    let job = ConversionJob::from_bytes(b"PK\x03\x04".to_vec(), "minutes.docx");
    let events = o.run_streaming(job);
    for _ in 0..200 {
        if listing(scratch.path()) > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(listing(scratch.path()), 1, "converter workspace never appeared");

    drop(events);
    for _ in 0..200 {
        if listing(scratch.path()) == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(listing(scratch.path()), 0, "workspace outlived the stream");
}

// ── Validation ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_credentials_fail_before_rasterizing() {
    let config = config();
    let o = Orchestrator::new(config.clone()).with_rasterizer(rasterizer(&config, 1));

    let job = pdf_job().with_credentials(ModelCredentials::new("", "", ""));
    let err = tokio_test::assert_err!(o.run_sync(job).await);
    match err {
        Doc2MdError::MissingCredentials(fields) => {
            assert!(fields.contains("endpoint"));
            assert!(fields.contains("api_key"));
        }
        other => panic!("expected missing credentials, got {other:?}"),
    }

    let job = pdf_job().with_credentials(ModelCredentials::new("", "", ""));
    let events: Vec<PipelineEvent> = o.run_streaming(job).collect().await;
    assert!(!events.iter().any(|e| matches!(
        e,
        PipelineEvent::Progress(p) if p.stage == PipelineState::Rasterizing
    )));
    match events.last() {
        Some(PipelineEvent::Error { kind, message }) => {
            assert_eq!(*kind, ErrorKind::Input);
            assert!(message.contains("api_key"));
        }
        other => panic!("expected error last, got {other:?}"),
    }
}

#[tokio::test]
async fn unsupported_extension_is_an_input_error() {
    let o = orchestrator(config(), 1, Arc::new(PageModel::ok()));
    let job = ConversionJob::from_bytes(b"MZ".to_vec(), "setup.exe");
    let events: Vec<PipelineEvent> = o.run_streaming(job).collect().await;
    assert!(matches!(
        events.last(),
        Some(PipelineEvent::Error { kind: ErrorKind::Input, .. })
    ));
}

#[tokio::test]
async fn missing_file_is_reported() {
    let o = orchestrator(config(), 1, Arc::new(PageModel::ok()));
    let job = ConversionJob::from_path("/definitely/not/here.pdf");
    let err = o.run_sync(job).await.unwrap_err();
    assert!(matches!(err, Doc2MdError::FileNotFound { .. }));
}

// ── Placeholder fallback ─────────────────────────────────────────────────────

#[tokio::test]
async fn text_file_goes_through_placeholder_page() {
    let o = orchestrator(config(), 3, Arc::new(Echo));
    let job = ConversionJob::from_bytes(b"hello".to_vec(), "meeting-notes.txt").with_enhance(false);
    let report = o.run_sync(job).await.unwrap();

    assert_eq!(report.pages_processed, 1);
    assert_eq!(report.successful_pages, 1);
    assert!(report.markdown.contains("meeting-notes.txt"));
}

#[tokio::test]
async fn office_document_without_converter_falls_back() {
    let config = ConversionConfig::builder()
        .office_converter("doc2md-no-such-converter")
        .build()
        .unwrap();
    let o = orchestrator(config, 3, Arc::new(Echo));
    let job = ConversionJob::from_bytes(b"PK\x03\x04".to_vec(), "minutes.docx").with_enhance(false);
    let report = o.run_sync(job).await.unwrap();

    assert_eq!(report.pages_processed, 1);
    assert!(report.markdown.contains("minutes.docx"));
}

#[tokio::test]
async fn strict_policy_surfaces_rasterisation_failure() {
    let config = ConversionConfig::builder()
        .office_converter("doc2md-no-such-converter")
        .fallback_policy(FallbackPolicy::Fail)
        .build()
        .unwrap();
    let o = orchestrator(config, 3, Arc::new(Echo));
    let job = ConversionJob::from_bytes(b"PK\x03\x04".to_vec(), "minutes.docx");
    let err = o.run_sync(job).await.unwrap_err();
    assert!(matches!(err, Doc2MdError::RasterisationFailed { .. }));
    assert_eq!(err.kind(), ErrorKind::Rasterization);
}

#[tokio::test]
async fn image_input_is_a_single_page() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scan.png");
    let png = encode_png(&DynamicImage::ImageRgb8(RgbImage::new(4, 4))).unwrap();
    std::fs::write(&path, png).unwrap();

    let o = orchestrator(config(), 3, Arc::new(PageModel::ok()));
    let report = o
        .run_sync(ConversionJob::from_path(&path).with_enhance(false))
        .await
        .unwrap();
    assert_eq!(report.pages_processed, 1);
    assert_eq!(report.markdown, "Content of page 1");
}

// ── Enhancement ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn enhancement_applies_heuristics_and_keeps_original() {
    let answer = "# Attendance\n\nName: Kim\nContact <kim@example.org>\n2024-03-01";
    let o = orchestrator(config(), 1, Arc::new(Fixed(answer)));
    let report = o.run_sync(pdf_job().with_enhance(true)).await.unwrap();

    assert!(report.metadata.enhanced);
    assert_eq!(report.original_markdown, answer);
    assert!(report.markdown.starts_with("# Attendance\n"));
    assert!(report.markdown.contains("**Name**: Kim"));
    assert!(report.markdown.contains("[kim@example.org](mailto:kim@example.org)"));
    assert!(report.markdown.contains("**2024-03-01**"));
}

#[tokio::test]
async fn enhancement_leaves_error_fragments_readable() {
    let o = orchestrator(config(), 2, Arc::new(PageModel::failing(&[1])));
    let report = o.run_sync(pdf_job().with_enhance(true)).await.unwrap();

    assert!(report.markdown.contains("# Page 1"));
    assert!(report
        .markdown
        .contains("[Error: Failed to analyze this page - "));
    assert!(!report.markdown.contains("# # "));
}
