//! Azure OpenAI, built per job from the request's credentials.

use super::{ModelConnector, ProviderModel, VisionModel};
use crate::error::Doc2MdError;
use crate::job::ModelCredentials;
use edgequake_llm::AzureOpenAIProvider;
use std::sync::Arc;
use tracing::debug;

/// Builds an Azure-backed [`ProviderModel`] per job.
#[derive(Debug, Clone)]
pub struct AzureConnector {
    pub timeout_secs: u64,
}

impl AzureConnector {
    pub fn new(timeout_secs: u64) -> Self {
        Self { timeout_secs }
    }
}

impl Default for AzureConnector {
    fn default() -> Self {
        Self::new(120)
    }
}

impl ModelConnector for AzureConnector {
    fn connect(&self, credentials: &ModelCredentials) -> Result<Arc<dyn VisionModel>, Doc2MdError> {
        credentials.validate()?;
        let endpoint = credentials.endpoint.trim();
        let deployment = credentials.deployment.trim();
        debug!(
            "Azure OpenAI: deployment {deployment} at {endpoint} (api-version {})",
            credentials.api_version
        );

        let provider = AzureOpenAIProvider::new(endpoint, credentials.api_key.as_str(), deployment)
            .with_api_version(credentials.api_version.as_str());
        Ok(Arc::new(
            ProviderModel::new(Arc::new(provider), deployment)
                .with_endpoint(endpoint)
                .with_timeout_secs(self.timeout_secs),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connector_rejects_incomplete_credentials() {
        let err = AzureConnector::default()
            .connect(&ModelCredentials::new("https://x", "", "d"))
            .err()
            .unwrap();
        assert!(matches!(err, Doc2MdError::MissingCredentials(_)));
    }

    #[test]
    fn connected_model_reports_deployment_and_endpoint() {
        let creds = ModelCredentials::new("https://res.openai.azure.com ", "key", " gpt-4o ")
            .with_api_version("2024-10-21");
        let model = AzureConnector::new(30).connect(&creds).unwrap();
        assert_eq!(model.name(), "gpt-4o");
        assert_eq!(model.endpoint(), "https://res.openai.azure.com");
    }
}
