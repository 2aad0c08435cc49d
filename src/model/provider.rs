//! Adapter from any edgequake-llm provider to [`VisionModel`].
//!
//! Azure OpenAI, OpenAI, Anthropic, Gemini, Ollama, … all go through here.
//! Providers that stream message requests feed `ai_chunk` events; the rest
//! answer in one chunk.

use super::{ChunkStream, ModelConnector, VisionModel, VisionRequest};
use crate::error::{Doc2MdError, ModelError};
use crate::job::ModelCredentials;
use async_trait::async_trait;
use edgequake_llm::traits::StreamChunk;
use edgequake_llm::{
    ChatMessage, CompletionOptions, ImageData, LLMProvider, LlmError, ProviderFactory,
};
use futures::future;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// A provider bound to one model, with a per-call timeout.
pub struct ProviderModel {
    provider: Arc<dyn LLMProvider>,
    model: String,
    endpoint: String,
    timeout: Duration,
}

impl ProviderModel {
    /// The reported endpoint defaults to the provider's name.
    pub fn new(provider: Arc<dyn LLMProvider>, model: impl Into<String>) -> Self {
        let endpoint = provider.name().to_string();
        Self {
            provider,
            model: model.into(),
            endpoint,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs.max(1));
        self
    }

    fn timed_out(&self) -> ModelError {
        ModelError::Timeout {
            secs: self.timeout.as_secs(),
        }
    }

    fn map_error(&self, e: LlmError) -> ModelError {
        map_llm_error(e, self.timeout.as_secs())
    }

    async fn single_chunk(&self, request: &VisionRequest) -> Result<ChunkStream, ModelError> {
        let text = self.complete(request).await?;
        Ok(Box::pin(stream::once(future::ready(Ok(text)))))
    }
}

fn build_messages(request: &VisionRequest) -> Vec<ChatMessage> {
    let image = ImageData::new(request.image_base64.clone(), request.mime_type.as_str())
        .with_detail("high");
    vec![
        ChatMessage::system(request.system.as_str()),
        ChatMessage::user_with_images(request.prompt.as_str(), vec![image]),
    ]
}

fn build_options(request: &VisionRequest) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(request.temperature),
        max_tokens: Some(request.max_tokens),
        ..Default::default()
    }
}

fn map_llm_error(e: LlmError, timeout_secs: u64) -> ModelError {
    match e {
        LlmError::AuthError(detail) => ModelError::Auth { detail },
        LlmError::NetworkError(detail) => ModelError::Http(detail),
        LlmError::RateLimited(detail) => ModelError::RateLimited(detail),
        LlmError::SerializationError(e) => ModelError::Malformed(e.to_string()),
        LlmError::Timeout => ModelError::Timeout { secs: timeout_secs },
        other => ModelError::Provider(other.to_string()),
    }
}

/// A streamed item failed either at the provider or on our side.
enum StreamError {
    Llm(LlmError),
    Model(ModelError),
}

fn content_filtered() -> ModelError {
    ModelError::Malformed("response blocked by content filter".into())
}

#[async_trait]
impl VisionModel for ProviderModel {
    fn name(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn complete(&self, request: &VisionRequest) -> Result<String, ModelError> {
        let messages = build_messages(request);
        let options = build_options(request);
        let response = tokio::time::timeout(self.timeout, self.provider.chat(&messages, Some(&options)))
            .await
            .map_err(|_| self.timed_out())?
            .map_err(|e| self.map_error(e))?;

        if response.finish_reason.as_deref() == Some("content_filter") {
            return Err(content_filtered());
        }
        debug!(
            "{}: {} input tokens, {} output tokens",
            self.model, response.prompt_tokens, response.completion_tokens
        );
        Ok(response.content)
    }

    async fn complete_stream(&self, request: &VisionRequest) -> Result<ChunkStream, ModelError> {
        if !self.provider.supports_tool_streaming() {
            return self.single_chunk(request).await;
        }

        let messages = build_messages(request);
        let options = build_options(request);
        let opened = tokio::time::timeout(
            self.timeout,
            self.provider
                .chat_with_tools_stream(&messages, &[], None, Some(&options)),
        )
        .await
        .map_err(|_| self.timed_out())?;

        let raw = match opened {
            Ok(raw) => raw,
            Err(e) => {
                debug!("{}: streaming unavailable ({e}); using a blocking call", self.model);
                return self.single_chunk(request).await;
            }
        };

        let mut text = raw
            .filter_map(|item| {
                future::ready(match item {
                    Ok(StreamChunk::Content(t)) if !t.is_empty() => Some(Ok(t)),
                    Ok(StreamChunk::Finished { reason, .. }) if reason == "content_filter" => {
                        Some(Err(StreamError::Model(content_filtered())))
                    }
                    Ok(_) => None,
                    Err(e) => Some(Err(StreamError::Llm(e))),
                })
            })
            .boxed();

        // Some deployments refuse a streamed request without tools only once
        // the body arrives; a failure before the first chunk gets one
        // blocking attempt instead.
        let first = tokio::time::timeout(self.timeout, text.next())
            .await
            .map_err(|_| self.timed_out())?;

        match first {
            None => Ok(Box::pin(stream::empty::<Result<String, ModelError>>())),
            Some(Ok(t)) => {
                let secs = self.timeout.as_secs();
                let rest = text.map(move |item| {
                    item.map_err(|e| match e {
                        StreamError::Llm(e) => map_llm_error(e, secs),
                        StreamError::Model(e) => e,
                    })
                });
                Ok(Box::pin(stream::once(future::ready(Ok(t))).chain(rest)))
            }
            Some(Err(StreamError::Model(e))) => Err(e),
            Some(Err(StreamError::Llm(e))) => {
                debug!("{}: stream failed before output ({e}); using a blocking call", self.model);
                self.single_chunk(request).await
            }
        }
    }
}

/// Connects to a named edgequake-llm provider.
///
/// Only the deployment (model) name is taken from the job; keys and
/// endpoints come from the provider's usual environment variables.
#[derive(Debug, Clone)]
pub struct ProviderConnector {
    pub provider: String,
    pub timeout_secs: u64,
}

impl ProviderConnector {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

impl ModelConnector for ProviderConnector {
    fn validate(&self, credentials: &ModelCredentials) -> Result<(), Doc2MdError> {
        if credentials.deployment.trim().is_empty() {
            return Err(Doc2MdError::MissingCredentials("deployment_name".into()));
        }
        Ok(())
    }

    fn connect(&self, credentials: &ModelCredentials) -> Result<Arc<dyn VisionModel>, Doc2MdError> {
        self.validate(credentials)?;
        let model = credentials.deployment.trim();
        let provider = ProviderFactory::create_llm_provider(&self.provider, model).map_err(|e| {
            Doc2MdError::ModelClient {
                provider: self.provider.clone(),
                reason: e.to_string(),
            }
        })?;
        Ok(Arc::new(
            ProviderModel::new(provider, model).with_timeout_secs(self.timeout_secs),
        ))
    }
}
