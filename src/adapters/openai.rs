use crate::adapters::http::send_with_retry;
use crate::adapters::llm::{LLMAdapter, LLMRequest, LLMResponse, ModelConfig, Usage};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub struct OpenAIAdapter {
    client: Client,
    config: ModelConfig,
    api_key: String,
    base_url: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: usize,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
    model: String,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: usize,
    completion_tokens: usize,
    total_tokens: usize,
}

impl OpenAIAdapter {
    pub fn new(config: ModelConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .context("OpenAI API key not found. Set OPENAI_API_KEY environment variable or provide in config")?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());

        // Local models can be slow to answer a full-file rewrite.
        let timeout = if base_url.contains("11434") { 300 } else { 60 };
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout))
            .build()?;

        Ok(Self {
            client,
            config,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl LLMAdapter for OpenAIAdapter {
    async fn complete(&self, request: LLMRequest) -> Result<LLMResponse> {
        let chat_request = ChatRequest {
            model: &self.config.model_name,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: request.system_prompt,
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: request.user_prompt,
                },
            ],
            temperature: request.temperature.unwrap_or(self.config.temperature),
            max_tokens: request.max_tokens.unwrap_or(self.config.max_tokens),
        };

        let url = format!("{}/chat/completions", self.base_url);
        let response = send_with_retry("OpenAI", || {
            self.client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&chat_request)
        })
        .await
        .context("Failed to send request to OpenAI")?;

        let chat_response: ChatResponse = response
            .json()
            .await
            .context("Failed to parse OpenAI response")?;

        let content = chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        Ok(LLMResponse {
            content,
            model: chat_response.model,
            usage: chat_response.usage.map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
        })
    }

    fn model_name(&self) -> &str {
        &self.config.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    #[tokio::test]
    async fn test_complete_sends_system_and_user_messages() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(Matcher::PartialJson(json!({
                "model": "gpt-4o",
                "messages": [
                    { "role": "system", "content": "sys" },
                    { "role": "user", "content": "hello" }
                ],
                "max_tokens": 4000
            })))
            .with_status(200)
            .with_body(
                json!({
                    "model": "gpt-4o",
                    "choices": [{ "message": { "role": "assistant", "content": "hi there" } }],
                    "usage": { "prompt_tokens": 3, "completion_tokens": 2, "total_tokens": 5 }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let adapter = OpenAIAdapter::new(ModelConfig {
            api_key: Some("sk-test".to_string()),
            base_url: Some(server.url()),
            ..ModelConfig::default()
        })
        .unwrap();

        let response = adapter
            .complete(LLMRequest {
                system_prompt: "sys".to_string(),
                user_prompt: "hello".to_string(),
                temperature: None,
                max_tokens: None,
            })
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.content, "hi there");
        assert_eq!(response.usage.unwrap().total_tokens, 5);
    }
}
