//! Page analysis: one page image → one Markdown fragment via the vision model.
//!
//! This module is intentionally thin. All prompt text lives in
//! [`crate::prompts`]; this module builds requests, applies the failure
//! policy and tidies successful output.
//!
//! ## Failure policy
//!
//! Analysis never returns an error. A failed model call becomes a
//! [`PageResult`] whose `markdown` is the error fragment and whose `error`
//! is set, so one bad page never aborts the document. There is no
//! automatic retry.

use super::encode::to_base64;
use super::postprocess::tidy_fragment;
use crate::config::ConversionConfig;
use crate::error::{ModelError, PageError};
use crate::model::{ChunkStream, VisionModel, VisionRequest};
use crate::output::{PageImage, PageOrigin, PageResult};
use crate::prompts::{error_fragment, page_instruction, placeholder_note, DEFAULT_SYSTEM_PROMPT};
use futures::stream::{self, BoxStream, StreamExt};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// One item of incremental page output.
#[derive(Debug, Clone, PartialEq)]
pub enum PageChunk {
    /// A piece of model output, in arrival order.
    Delta(String),
    /// The call failed; always the last item when present.
    Failed { fragment: String, error: PageError },
}

/// Builds requests and turns model answers into [`PageResult`]s.
#[derive(Debug, Clone)]
pub struct PageAnalyzer {
    system_prompt: String,
    max_tokens: usize,
    temperature: f32,
    tidy: bool,
}

enum StreamState {
    Start(VisionRequest),
    Streaming(ChunkStream),
    Done,
}

impl PageAnalyzer {
    pub fn new(config: &ConversionConfig) -> Self {
        Self {
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            tidy: config.tidy_fragments,
        }
    }

    /// The request sent for `page`.
    pub fn request(&self, page: &PageImage) -> VisionRequest {
        let mut prompt = page_instruction(page.index);
        if let PageOrigin::Placeholder { label } = &page.origin {
            prompt.push_str(&placeholder_note(label));
        }
        VisionRequest {
            system: self.system_prompt.clone(),
            prompt,
            image_base64: to_base64(&page.bytes),
            mime_type: page.mime_type.to_string(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }

    /// Blocking analysis: one model call, whole answer.
    pub async fn analyze(&self, page: &PageImage, model: &dyn VisionModel) -> PageResult {
        let start = Instant::now();
        let request = self.request(page);
        debug!("Page {}: sending {:?}", page.index, request);

        match model.complete(&request).await {
            Ok(text) => self.finish(page.index, &text, start.elapsed()),
            Err(e) => self.failure(page.index, model_failure(page.index, &e), start.elapsed()),
        }
    }

    /// Incremental analysis.
    ///
    /// Yields [`PageChunk::Delta`] items as the model produces them, and a
    /// single trailing [`PageChunk::Failed`] if the call fails at any point.
    /// Callers concatenate the deltas and hand them to [`Self::finish`].
    pub fn analyze_stream<'a>(
        &'a self,
        page: &PageImage,
        model: &'a dyn VisionModel,
    ) -> BoxStream<'a, PageChunk> {
        let page_num = page.index;
        let request = self.request(page);

        stream::unfold(StreamState::Start(request), move |state| async move {
            let mut chunks = match state {
                StreamState::Done => return None,
                StreamState::Streaming(s) => s,
                StreamState::Start(request) => match model.complete_stream(&request).await {
                    Ok(s) => s,
                    Err(e) => {
                        let chunk = self.failed_chunk(page_num, model_failure(page_num, &e));
                        return Some((chunk, StreamState::Done));
                    }
                },
            };
            loop {
                match chunks.next().await {
                    Some(Ok(text)) if text.is_empty() => continue,
                    Some(Ok(text)) => {
                        return Some((PageChunk::Delta(text), StreamState::Streaming(chunks)))
                    }
                    Some(Err(e)) => {
                        let chunk = self.failed_chunk(page_num, model_failure(page_num, &e));
                        return Some((chunk, StreamState::Done));
                    }
                    None => return None,
                }
            }
        })
        .boxed()
    }

    /// Turn a complete model answer into a result.
    pub fn finish(&self, page_num: usize, raw: &str, elapsed: Duration) -> PageResult {
        let markdown = if self.tidy {
            tidy_fragment(raw)
        } else {
            raw.trim().to_string()
        };
        if markdown.is_empty() {
            return self.failure(page_num, PageError::EmptyResponse { page: page_num }, elapsed);
        }
        debug!("Page {}: {} chars in {:?}", page_num, markdown.chars().count(), elapsed);
        PageResult {
            page_num,
            markdown,
            duration_ms: elapsed.as_millis() as u64,
            error: None,
        }
    }

    /// A failed result carrying the error fragment.
    pub fn failure(&self, page_num: usize, error: PageError, elapsed: Duration) -> PageResult {
        warn!("{error}");
        PageResult {
            page_num,
            markdown: error_fragment(page_num, &error.reason()),
            duration_ms: elapsed.as_millis() as u64,
            error: Some(error),
        }
    }

    fn failed_chunk(&self, page_num: usize, error: PageError) -> PageChunk {
        debug!("{error}");
        PageChunk::Failed {
            fragment: error_fragment(page_num, &error.reason()),
            error,
        }
    }
}

fn model_failure(page: usize, e: &ModelError) -> PageError {
    PageError::AnalysisFailed {
        page,
        detail: e.to_string(),
    }
}
