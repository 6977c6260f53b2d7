pub mod providers;
pub mod retry;

use std::sync::Arc;

use swarmflow_core::config::ModelConfig;
use swarmflow_core::error::{Result, SwarmError};
use swarmflow_core::traits::ModelClient;

pub use providers::openai::OpenAiClient;
pub use retry::RetryingClient;

/// Create a model client based on the provider name.
pub fn create_client(config: &ModelConfig) -> Result<Arc<dyn ModelClient>> {
    match config.provider.as_str() {
        "anthropic" | "claude" | "gemini" | "bedrock" | "cohere" => {
            Err(SwarmError::UnsupportedProvider(config.provider.clone()))
        }
        // Everything else uses the OpenAI-compatible client
        _ => {
            let inner = Box::new(OpenAiClient::new(config.clone()));
            let retry = config.retry.clone().unwrap_or_default();
            Ok(Arc::new(RetryingClient::new(inner, retry)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model_config(provider: &str) -> ModelConfig {
        toml::from_str(&format!("provider = \"{}\"\nmodel_id = \"m\"", provider)).unwrap()
    }

    #[test]
    fn test_openai_compatible_providers() {
        assert!(create_client(&model_config("openai")).is_ok());
        assert!(create_client(&model_config("ollama")).is_ok());
        assert!(create_client(&model_config("groq")).is_ok());
    }

    #[test]
    fn test_unsupported_provider() {
        match create_client(&model_config("anthropic")) {
            Err(SwarmError::UnsupportedProvider(p)) => assert_eq!(p, "anthropic"),
            _ => panic!("expected UnsupportedProvider"),
        }
    }
}
