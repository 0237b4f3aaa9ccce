use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::AnswerRequester;
use crate::error::{ChatError, Result};
use crate::provider::Provider;

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";

#[derive(Serialize)]
struct ClaudeMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ClaudeRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<ClaudeMessage>,
    temperature: f32,
}

#[derive(Deserialize)]
struct ClaudeContent {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct ClaudeResponse {
    content: Vec<ClaudeContent>,
}

#[derive(Clone)]
pub struct ClaudeClient {
    client: Client,
    api_key: Option<String>,
    model: String,
    temperature: f32,
}

impl ClaudeClient {
    pub fn new(api_key: Option<String>, model: &str, temperature: f32) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model: model.to_string(),
            temperature,
        }
    }

    fn request(&self, question: &str, context: &str) -> ClaudeRequest {
        ClaudeRequest {
            model: self.model.clone(),
            max_tokens: 4096,
            system: context.to_string(),
            messages: vec![ClaudeMessage {
                role: "user".to_string(),
                content: question.to_string(),
            }],
            // Anthropic accepts 0.0..=1.0
            temperature: self.temperature.clamp(0.0, 1.0),
        }
    }

    pub fn list_models() -> Vec<String> {
        vec![
            "claude-3-5-haiku-20241022".to_string(),
            "claude-sonnet-4-20250514".to_string(),
            "claude-3-5-sonnet-20241022".to_string(),
            "claude-3-opus-20240229".to_string(),
        ]
    }
}

#[async_trait]
impl AnswerRequester for ClaudeClient {
    async fn ask(&self, question: &str, context: &str) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(ChatError::MissingApiKey(Provider::Claude))?;

        let response = self.client
            .post(MESSAGES_URL)
            .header("x-api-key", api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&self.request(question, context))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ChatError::Provider {
                provider: Provider::Claude,
                message: format!("API error {}: {}", status, text),
            });
        }

        let claude_response: ClaudeResponse = response.json().await?;
        Ok(claude_response.content.first()
            .map(|c| c.text.clone())
            .unwrap_or_default())
    }

    fn describe(&self) -> String {
        format!("Claude: {}", self.model)
    }
}
