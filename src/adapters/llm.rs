use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub model_name: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub temperature: f32,
    pub max_tokens: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_name: "gpt-4o".to_string(),
            api_key: None,
            base_url: None,
            temperature: 0.2,
            max_tokens: 4000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMResponse {
    pub content: String,
    pub model: String,
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

#[async_trait]
pub trait LLMAdapter: Send + Sync {
    async fn complete(&self, request: LLMRequest) -> Result<LLMResponse>;
    fn model_name(&self) -> &str;
}

pub fn create_adapter(config: &ModelConfig) -> Result<Box<dyn LLMAdapter>> {
    match config.model_name.as_str() {
        name if name.starts_with("claude") => {
            Ok(Box::new(crate::adapters::AnthropicAdapter::new(config.clone())?))
        }
        // Ollama serves an OpenAI-compatible API under /v1
        name if name.starts_with("ollama:") => {
            let mut local = config.clone();
            local.model_name = name.trim_start_matches("ollama:").to_string();
            local.api_key = Some(local.api_key.unwrap_or_else(|| "ollama".to_string()));
            local.base_url = Some(
                local
                    .base_url
                    .unwrap_or_else(|| "http://localhost:11434/v1".to_string()),
            );
            Ok(Box::new(crate::adapters::OpenAIAdapter::new(local)?))
        }
        _ => Ok(Box::new(crate::adapters::OpenAIAdapter::new(config.clone())?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(model: &str) -> ModelConfig {
        ModelConfig {
            model_name: model.to_string(),
            api_key: Some("key".to_string()),
            ..ModelConfig::default()
        }
    }

    #[test]
    fn test_create_adapter_routes_by_model_prefix() {
        assert_eq!(
            create_adapter(&config("claude-3-5-sonnet")).unwrap().model_name(),
            "claude-3-5-sonnet"
        );
        assert_eq!(create_adapter(&config("gpt-4o")).unwrap().model_name(), "gpt-4o");
        assert_eq!(
            create_adapter(&config("ollama:codellama")).unwrap().model_name(),
            "codellama"
        );
    }
}
