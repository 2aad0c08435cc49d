//! Lifecycle events emitted by the orchestrator.
//!
//! Every event has a tag ([`PipelineEvent::kind`]) and a status string
//! ([`PipelineEvent::status`]); [`PipelineEvent::data`] renders the status
//! merged with the event payload, which is what goes on the wire.

use crate::error::{Doc2MdError, ErrorKind};
use crate::output::{ConversionReport, PageResult};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Where a run is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Validating,
    Rasterizing,
    AnalyzingPages,
    Aggregating,
    Completed,
    Failed,
}

impl PipelineState {
    /// Legal forward moves. Failure is only reachable before analysis:
    /// once pages exist, page errors are recorded instead.
    pub fn can_transition_to(self, next: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Idle, Validating)
                | (Validating, Rasterizing)
                | (Validating, Failed)
                | (Rasterizing, AnalyzingPages)
                | (Rasterizing, Failed)
                | (AnalyzingPages, Aggregating)
                | (Aggregating, Completed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Completed | PipelineState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PipelineState::Idle => "idle",
            PipelineState::Validating => "validating",
            PipelineState::Rasterizing => "rasterizing",
            PipelineState::AnalyzingPages => "analyzing_pages",
            PipelineState::Aggregating => "aggregating",
            PipelineState::Completed => "completed",
            PipelineState::Failed => "failed",
        }
    }
}

/// Payload of a `progress` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub stage: PipelineState,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<usize>,
}

impl Progress {
    pub fn new(stage: PipelineState, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            filename: None,
            page: None,
            total_pages: None,
        }
    }

    pub fn filename(mut self, name: impl Into<String>) -> Self {
        self.filename = Some(name.into());
        self
    }

    pub fn page(mut self, page: usize, total: usize) -> Self {
        self.page = Some(page);
        self.total_pages = Some(total);
        self
    }

    pub fn total_pages(mut self, total: usize) -> Self {
        self.total_pages = Some(total);
        self
    }
}

/// One lifecycle notification.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    Connection { message: String },
    Progress(Progress),
    AiChunk { page: usize, chunk: String },
    PageResult { page: usize, total_pages: usize, content_length: usize },
    PageError { page: usize, total_pages: usize, error: String },
    Result(Box<ConversionReport>),
    Error { kind: ErrorKind, message: String },
}

impl PipelineEvent {
    pub fn connection(message: impl Into<String>) -> Self {
        PipelineEvent::Connection {
            message: message.into(),
        }
    }

    /// `page_result` or `page_error` for a finished page.
    pub fn for_page(result: &PageResult, total_pages: usize) -> Self {
        match &result.error {
            None => PipelineEvent::PageResult {
                page: result.page_num,
                total_pages,
                content_length: result.content_length(),
            },
            Some(e) => PipelineEvent::PageError {
                page: result.page_num,
                total_pages,
                error: e.reason(),
            },
        }
    }

    /// The terminal event for a finished run.
    pub fn terminal(outcome: &Result<ConversionReport, Doc2MdError>) -> Self {
        match outcome {
            Ok(report) => PipelineEvent::Result(Box::new(report.clone())),
            Err(e) => PipelineEvent::error(e),
        }
    }

    pub fn error(e: &Doc2MdError) -> Self {
        PipelineEvent::Error {
            kind: e.kind(),
            message: e.to_string(),
        }
    }

    /// Event tag, also the SSE `event:` name.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineEvent::Connection { .. } => "connection",
            PipelineEvent::Progress(_) => "progress",
            PipelineEvent::AiChunk { .. } => "ai_chunk",
            PipelineEvent::PageResult { .. } => "page_result",
            PipelineEvent::PageError { .. } => "page_error",
            PipelineEvent::Result(_) => "result",
            PipelineEvent::Error { .. } => "error",
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            PipelineEvent::Connection { .. } => "connected",
            PipelineEvent::Progress(_) => "processing",
            PipelineEvent::AiChunk { .. } => "streaming",
            PipelineEvent::PageResult { .. } => "page_completed",
            PipelineEvent::PageError { .. } => "page_failed",
            PipelineEvent::Result(_) => "completed",
            PipelineEvent::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineEvent::Result(_) | PipelineEvent::Error { .. })
    }

    /// Status merged with the payload.
    pub fn data(&self) -> Value {
        let mut data = match self {
            PipelineEvent::Connection { message } => json!({ "message": message }),
            PipelineEvent::Progress(p) => serde_json::to_value(p).unwrap_or_else(|_| json!({})),
            PipelineEvent::AiChunk { page, chunk } => json!({ "page": page, "chunk": chunk }),
            PipelineEvent::PageResult {
                page,
                total_pages,
                content_length,
            } => json!({
                "page": page,
                "total_pages": total_pages,
                "content_length": content_length,
            }),
            PipelineEvent::PageError {
                page,
                total_pages,
                error,
            } => json!({ "page": page, "total_pages": total_pages, "error": error }),
            PipelineEvent::Result(report) => json!({
                "message": format!(
                    "Converted {} page(s): {} succeeded, {} failed",
                    report.pages_processed, report.successful_pages, report.failed_pages
                ),
                "result": report,
            }),
            PipelineEvent::Error { kind, message } => json!({ "kind": kind, "message": message }),
        };
        if let Value::Object(map) = &mut data {
            map.insert("status".into(), Value::from(self.status()));
        }
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PageError;

    #[test]
    fn states_only_fail_before_analysis() {
        use PipelineState::*;
        assert!(Idle.can_transition_to(Validating));
        assert!(Validating.can_transition_to(Failed));
        assert!(Rasterizing.can_transition_to(Failed));
        assert!(!AnalyzingPages.can_transition_to(Failed));
        assert!(!Completed.can_transition_to(Validating));
        assert!(Failed.is_terminal());
    }

    #[test]
    fn page_events_follow_status() {
        let ok = PageResult {
            page_num: 1,
            markdown: "abc".into(),
            duration_ms: 0,
            error: None,
        };
        let ev = PipelineEvent::for_page(&ok, 3);
        assert_eq!(ev.kind(), "page_result");
        let data = ev.data();
        assert_eq!(data["status"], "page_completed");
        assert_eq!(data["content_length"], 3);
        assert_eq!(data["total_pages"], 3);

        let failed = PageResult {
            error: Some(PageError::EmptyResponse { page: 2 }),
            page_num: 2,
            ..ok
        };
        let data = PipelineEvent::for_page(&failed, 3).data();
        assert_eq!(data["status"], "page_failed");
        assert_eq!(data["error"], "model returned an empty response");
    }

    #[test]
    fn progress_omits_absent_fields() {
        let ev = PipelineEvent::Progress(
            Progress::new(PipelineState::Rasterizing, "Converting document to images")
                .filename("a.pdf"),
        );
        let data = ev.data();
        assert_eq!(data["status"], "processing");
        assert_eq!(data["stage"], "rasterizing");
        assert_eq!(data["filename"], "a.pdf");
        assert!(data.get("page").is_none());
    }

    #[test]
    fn terminal_error_carries_kind() {
        let outcome: Result<ConversionReport, _> =
            Err(Doc2MdError::MissingCredentials("api_key".into()));
        let ev = PipelineEvent::terminal(&outcome);
        assert!(ev.is_terminal());
        assert_eq!(ev.kind(), "error");
        let data = ev.data();
        assert_eq!(data["kind"], "input");
        assert!(data["message"].as_str().unwrap().contains("api_key"));
    }
}
