//! Vision-model clients.
//!
//! The pipeline talks to the model through two seams:
//!
//! * [`VisionModel`] — one request in, Markdown out (whole or as a chunk
//!   stream). Implemented by [`provider::ProviderModel`] over any
//!   edgequake-llm provider; tests plug in scripted mocks.
//! * [`ModelConnector`] — turns per-job [`ModelCredentials`] into a
//!   `VisionModel` handle. Validation lives here because what counts as
//!   complete credentials depends on the client being built.

pub mod azure;
pub mod provider;

use crate::error::{Doc2MdError, ModelError};
use crate::job::ModelCredentials;
use async_trait::async_trait;
use futures::stream::{self, Stream};
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

pub use azure::AzureConnector;
pub use provider::{ProviderConnector, ProviderModel};

/// Incremental model output.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String, ModelError>> + Send>>;

/// One page worth of model input.
#[derive(Clone)]
pub struct VisionRequest {
    pub system: String,
    pub prompt: String,
    /// Base64 of the page image, without the `data:` prefix.
    pub image_base64: String,
    pub mime_type: String,
    pub max_tokens: usize,
    pub temperature: f32,
}

impl VisionRequest {
    /// `data:<mime>;base64,<payload>`
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.image_base64)
    }
}

impl fmt::Debug for VisionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisionRequest")
            .field("prompt_len", &self.prompt.len())
            .field("image_base64", &format_args!("{} bytes", self.image_base64.len()))
            .field("mime_type", &self.mime_type)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .finish()
    }
}

/// A vision-capable chat model.
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Model or deployment name, reported in result metadata.
    fn name(&self) -> &str;

    /// Endpoint reported in result metadata.
    fn endpoint(&self) -> &str {
        ""
    }

    /// Blocking completion: the whole answer at once.
    async fn complete(&self, request: &VisionRequest) -> Result<String, ModelError>;

    /// Incremental completion.
    ///
    /// The default yields the blocking answer as a single chunk.
    async fn complete_stream(&self, request: &VisionRequest) -> Result<ChunkStream, ModelError> {
        let text = self.complete(request).await?;
        Ok(Box::pin(stream::once(async move { Ok(text) })))
    }
}

/// Builds a model handle from per-job credentials.
pub trait ModelConnector: Send + Sync {
    /// Reject credentials this connector cannot use.
    fn validate(&self, credentials: &ModelCredentials) -> Result<(), Doc2MdError> {
        credentials.validate()
    }

    fn connect(&self, credentials: &ModelCredentials) -> Result<Arc<dyn VisionModel>, Doc2MdError>;
}

/// A pre-built handle ignores the job's credentials entirely.
impl ModelConnector for Arc<dyn VisionModel> {
    fn validate(&self, _credentials: &ModelCredentials) -> Result<(), Doc2MdError> {
        Ok(())
    }

    fn connect(&self, _credentials: &ModelCredentials) -> Result<Arc<dyn VisionModel>, Doc2MdError> {
        Ok(Arc::clone(self))
    }
}
