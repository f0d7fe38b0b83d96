use anyhow::{Context, Result};
use async_trait::async_trait;
use studyguard_storage::models::{AiConfig, AiProvider};

use crate::providers::{ollama::OllamaProvider, openai::OpenAiProvider};

/// Shared system prompt for every provider
pub(crate) const SYSTEM_PROMPT: &str = "You review a student's browser activity for a study \
     supervision tool. Answer only with what is asked, without markdown formatting.";

/// Trait for AI providers
#[async_trait]
pub trait AiProviderTrait: Send + Sync {
    /// Generate text response for a given prompt
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Get the model name being used
    fn model_name(&self) -> &str;

    /// Check if the provider is reachable
    async fn is_available(&self) -> bool {
        true
    }
}

/// Create a provider instance based on configuration
///
/// # Errors
///
/// Returns an error if the API key is missing for `OpenAI` or the HTTP client cannot be built
pub fn create_provider(config: &AiConfig) -> Result<Box<dyn AiProviderTrait>> {
    let model = config.effective_model();
    let base_url = config.effective_base_url();

    match config.provider {
        AiProvider::OpenAi => {
            let api_key = config
                .effective_api_key()
                .context("API Key required for OpenAI (set ai.api_key or OPENAI_API_KEY)")?;
            Ok(Box::new(OpenAiProvider::new(
                &api_key,
                model,
                base_url,
                config.temperature,
            )?))
        }
        AiProvider::Ollama => Ok(Box::new(OllamaProvider::new(
            base_url,
            model,
            config.temperature,
        )?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_ollama_provider() {
        let config = AiConfig {
            enabled: true,
            provider: AiProvider::Ollama,
            model: Some("qwen2.5".to_string()),
            ..AiConfig::default()
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.model_name(), "qwen2.5");
    }

    #[test]
    fn test_create_openai_provider_with_key() {
        let config = AiConfig {
            enabled: true,
            provider: AiProvider::OpenAi,
            api_key: Some("sk-test".to_string()),
            ..AiConfig::default()
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.model_name(), "gpt-4o");
    }
}
