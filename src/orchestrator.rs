//! The conversion run: validate → rasterize → analyze → aggregate.
//!
//! Both entry points share one driver. [`Orchestrator::run_sync`] discards
//! events and returns the report; [`Orchestrator::run_streaming`] spawns the
//! driver on a task that feeds a bounded channel and hands back an
//! [`EventStream`]. Dropping that stream aborts the task, which drops the
//! in-flight model request, kills any converter child and removes temp
//! workspaces.

use crate::config::ConversionConfig;
use crate::error::Doc2MdError;
use crate::events::{PipelineEvent, PipelineState, Progress};
use crate::job::ConversionJob;
use crate::model::{AzureConnector, ModelConnector, VisionModel};
use crate::output::{ConversionReport, PageImage, PageResult, ReportMetadata};
use crate::pipeline::aggregate::aggregate;
use crate::pipeline::analyze::{PageAnalyzer, PageChunk};
use crate::pipeline::enhance::enhance_markdown;
use crate::pipeline::format::classify;
use crate::pipeline::input::materialize;
use crate::pipeline::rasterize::DocumentRasterizer;
use crate::pipeline::reorder::ReorderBuffer;
use futures::stream::{self, Stream, StreamExt};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

const METHOD: &str = "ai_image_analysis";

/// Where events go.
#[derive(Debug, Clone)]
pub enum EventSink {
    Discard,
    Channel(mpsc::Sender<PipelineEvent>),
}

impl EventSink {
    /// Deliver `event`, waiting for channel capacity.
    ///
    /// A closed channel means the consumer is gone and the run should stop.
    pub async fn emit(&self, event: PipelineEvent) -> Result<(), Doc2MdError> {
        match self {
            EventSink::Discard => Ok(()),
            EventSink::Channel(tx) => tx
                .send(event)
                .await
                .map_err(|_| Doc2MdError::Transport("event consumer went away".into())),
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, EventSink::Channel(_))
    }
}

/// Events of one streaming run. Dropping it cancels the run.
pub struct EventStream {
    inner: ReceiverStream<PipelineEvent>,
    handle: JoinHandle<()>,
}

impl Stream for EventStream {
    type Item = PipelineEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().inner).poll_next(cx)
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl EventStream {
    /// Drain the stream and return the terminal outcome.
    pub async fn into_report(mut self) -> Result<ConversionReport, Doc2MdError> {
        while let Some(event) = self.next().await {
            match event {
                PipelineEvent::Result(report) => return Ok(*report),
                PipelineEvent::Error { message, .. } => return Err(Doc2MdError::Internal(message)),
                _ => {}
            }
        }
        Err(Doc2MdError::Transport("stream ended without a result".into()))
    }
}

/// Tracks and logs state transitions of one run.
struct RunState {
    current: PipelineState,
    filename: String,
}

impl RunState {
    fn new(filename: &str) -> Self {
        Self {
            current: PipelineState::Idle,
            filename: filename.to_string(),
        }
    }

    fn advance(&mut self, next: PipelineState) {
        debug_assert!(
            self.current.can_transition_to(next),
            "illegal transition {:?} → {:?}",
            self.current,
            next
        );
        debug!("{}: {} → {}", self.filename, self.current.as_str(), next.as_str());
        self.current = next;
    }
}

/// Drives conversion jobs. Cheap to clone; holds no per-job state.
#[derive(Clone)]
pub struct Orchestrator {
    config: ConversionConfig,
    rasterizer: Arc<DocumentRasterizer>,
    analyzer: PageAnalyzer,
    connector: Arc<dyn ModelConnector>,
}

impl Orchestrator {
    /// Standard rasterizer and the Azure OpenAI connector.
    pub fn new(config: ConversionConfig) -> Self {
        let rasterizer = DocumentRasterizer::from_config(&config);
        let connector = AzureConnector::new(config.api_timeout_secs);
        Self {
            analyzer: PageAnalyzer::new(&config),
            rasterizer: Arc::new(rasterizer),
            connector: Arc::new(connector),
            config,
        }
    }

    pub fn with_connector(mut self, connector: Arc<dyn ModelConnector>) -> Self {
        self.connector = connector;
        self
    }

    /// Use a pre-built model for every job, ignoring job credentials.
    pub fn with_model(self, model: Arc<dyn VisionModel>) -> Self {
        self.with_connector(Arc::new(model))
    }

    pub fn with_rasterizer(mut self, rasterizer: DocumentRasterizer) -> Self {
        self.rasterizer = Arc::new(rasterizer);
        self
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    /// Run `job` to completion; events are discarded.
    pub async fn run_sync(&self, job: ConversionJob) -> Result<ConversionReport, Doc2MdError> {
        self.drive(job, &EventSink::Discard).await
    }

    /// Run `job` on a background task, yielding its events.
    ///
    /// Exactly one terminal event (`result` or `error`) ends the stream,
    /// unless the consumer goes away first.
    pub fn run_streaming(&self, job: ConversionJob) -> EventStream {
        let (tx, rx) = mpsc::channel(self.config.event_buffer);
        let this = self.clone();

        let handle = tokio::spawn(async move {
            let sink = EventSink::Channel(tx);
            let outcome = match AssertUnwindSafe(this.drive(job, &sink)).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(_) => {
                    error!("Conversion task panicked");
                    Err(Doc2MdError::Internal("conversion task panicked".into()))
                }
            };

            match outcome {
                Err(Doc2MdError::Transport(reason)) => {
                    debug!("Stopping run: {reason}");
                }
                outcome => {
                    if sink.emit(PipelineEvent::terminal(&outcome)).await.is_err() {
                        debug!("Consumer left before the terminal event");
                    }
                }
            }
        });

        EventStream {
            inner: ReceiverStream::new(rx),
            handle,
        }
    }

    async fn drive(
        &self,
        job: ConversionJob,
        sink: &EventSink,
    ) -> Result<ConversionReport, Doc2MdError> {
        let mut state = RunState::new(&job.filename);
        let outcome = self.run_stages(&job, sink, &mut state).await;

        if let Err(e) = &outcome {
            match e {
                Doc2MdError::Transport(_) => {}
                _ if state.current.can_transition_to(PipelineState::Failed) => {
                    state.advance(PipelineState::Failed);
                    warn!("Conversion of '{}' failed: {}", job.filename, e);
                }
                _ => error!("Conversion of '{}' failed after {:?}: {}", job.filename, state.current, e),
            }
        }
        outcome
    }

    async fn run_stages(
        &self,
        job: &ConversionJob,
        sink: &EventSink,
        state: &mut RunState,
    ) -> Result<ConversionReport, Doc2MdError> {
        let start = Instant::now();
        info!("Starting conversion: {}", job.filename);
        sink.emit(PipelineEvent::connection("Connected to conversion stream"))
            .await?;

        // ── Validating ───────────────────────────────────────────────────
        state.advance(PipelineState::Validating);
        sink.emit(PipelineEvent::Progress(
            Progress::new(PipelineState::Validating, "Validating request").filename(&job.filename),
        ))
        .await?;

        job.validate()?;
        classify(&job.filename)?;
        self.connector.validate(&job.credentials)?;
        let model = self.connector.connect(&job.credentials)?;
        let input = materialize(&job.document, &job.filename).await?;

        // ── Rasterizing ──────────────────────────────────────────────────
        state.advance(PipelineState::Rasterizing);
        sink.emit(PipelineEvent::Progress(
            Progress::new(PipelineState::Rasterizing, "Converting document to images")
                .filename(&job.filename),
        ))
        .await?;

        let pages = self
            .rasterizer
            .convert(input.path(), &job.filename, job.dpi)
            .await?;
        drop(input);
        let total = pages.len();
        info!("{}: {} page image(s) ready", job.filename, total);

        // ── Analyzing ────────────────────────────────────────────────────
        state.advance(PipelineState::AnalyzingPages);
        sink.emit(PipelineEvent::Progress(
            Progress::new(
                PipelineState::AnalyzingPages,
                format!("Converted to {total} image(s); starting analysis"),
            )
            .total_pages(total),
        ))
        .await?;

        let results = self.analyze_pages(&pages, model.as_ref(), sink).await?;

        // ── Aggregating ──────────────────────────────────────────────────
        state.advance(PipelineState::Aggregating);
        sink.emit(PipelineEvent::Progress(
            Progress::new(PipelineState::Aggregating, "Combining page results").total_pages(total),
        ))
        .await?;

        let doc = aggregate(&results);
        let markdown = if job.enhance {
            sink.emit(PipelineEvent::Progress(Progress::new(
                PipelineState::Aggregating,
                "Enhancing markdown structure",
            )))
            .await?;
            enhance_markdown(&doc.markdown)
        } else {
            doc.markdown.clone()
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let report = ConversionReport {
            metadata: ReportMetadata {
                original_filename: job.filename.clone(),
                converted_size: markdown.chars().count(),
                enhanced: job.enhance,
                method: METHOD.to_string(),
                llm_model: model.name().to_string(),
                endpoint: model.endpoint().to_string(),
                dpi: job.dpi,
                duration_ms,
            },
            markdown,
            original_markdown: doc.markdown,
            analysis_results: results.iter().map(PageResult::summary).collect(),
            pages_processed: doc.pages_processed,
            successful_pages: doc.successful_pages,
            failed_pages: doc.failed_pages,
        };

        state.advance(PipelineState::Completed);
        info!(
            "Converted {}: {}/{} pages in {}ms",
            job.filename, report.successful_pages, report.pages_processed, duration_ms
        );
        Ok(report)
    }

    /// One result per page, in page order.
    async fn analyze_pages(
        &self,
        pages: &[PageImage],
        model: &dyn VisionModel,
        sink: &EventSink,
    ) -> Result<Vec<PageResult>, Doc2MdError> {
        let total = pages.len();
        let workers = self.config.concurrency.max(1);
        let mut results = Vec::with_capacity(total);

        if workers == 1 {
            for page in pages {
                sink.emit(PipelineEvent::Progress(
                    Progress::new(
                        PipelineState::AnalyzingPages,
                        format!("Analyzing page {}/{}", page.index, total),
                    )
                    .page(page.index, total),
                ))
                .await?;

                let result = if sink.is_streaming() && self.config.stream_chunks {
                    self.analyze_streaming(page, model, sink).await?
                } else {
                    self.analyzer.analyze(page, model).await
                };
                sink.emit(PipelineEvent::for_page(&result, total)).await?;
                results.push(result);
            }
            return Ok(results);
        }

        debug!("Analyzing {} pages with {} workers", total, workers);
        let pending: Vec<_> = pages
            .iter()
            .map(|page| self.analyzer.analyze(page, model))
            .collect();
        let mut completed = stream::iter(pending).buffer_unordered(workers);
        let mut reorder = ReorderBuffer::new(1);

        while let Some(result) = completed.next().await {
            for ready in reorder.push(result.page_num, result) {
                sink.emit(PipelineEvent::for_page(&ready, total)).await?;
                results.push(ready);
            }
        }
        Ok(results)
    }

    /// Forward model output as `ai_chunk` events while it arrives.
    async fn analyze_streaming(
        &self,
        page: &PageImage,
        model: &dyn VisionModel,
        sink: &EventSink,
    ) -> Result<PageResult, Doc2MdError> {
        let start = Instant::now();
        let mut text = String::new();
        let mut chunks = self.analyzer.analyze_stream(page, model);

        while let Some(chunk) = chunks.next().await {
            match chunk {
                PageChunk::Delta(delta) => {
                    text.push_str(&delta);
                    sink.emit(PipelineEvent::AiChunk {
                        page: page.index,
                        chunk: delta,
                    })
                    .await?;
                }
                PageChunk::Failed { error, .. } => {
                    return Ok(self.analyzer.failure(page.index, error, start.elapsed()));
                }
            }
        }
        Ok(self.analyzer.finish(page.index, &text, start.elapsed()))
    }
}
