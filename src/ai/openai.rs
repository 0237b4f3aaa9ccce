use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::AnswerRequester;
use crate::error::{ChatError, Result};
use crate::provider::Provider;

const CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Serialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    temperature: f32,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Clone)]
pub struct OpenAIClient {
    client: Client,
    api_key: Option<String>,
    model: String,
    temperature: f32,
}

impl OpenAIClient {
    pub fn new(api_key: Option<String>, model: &str, temperature: f32) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model: model.to_string(),
            temperature,
        }
    }

    fn request(&self, question: &str, context: &str) -> OpenAIRequest {
        OpenAIRequest {
            model: self.model.clone(),
            messages: vec![
                OpenAIMessage {
                    role: "system".to_string(),
                    content: context.to_string(),
                },
                OpenAIMessage {
                    role: "user".to_string(),
                    content: question.to_string(),
                },
            ],
            temperature: self.temperature,
        }
    }

    pub fn list_models() -> Vec<String> {
        vec![
            "gpt-4o-mini".to_string(),
            "gpt-4o".to_string(),
            "gpt-4-turbo".to_string(),
            "gpt-3.5-turbo".to_string(),
        ]
    }
}

#[async_trait]
impl AnswerRequester for OpenAIClient {
    async fn ask(&self, question: &str, context: &str) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(ChatError::MissingApiKey(Provider::OpenAI))?;

        let response = self.client
            .post(CHAT_COMPLETIONS_URL)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&self.request(question, context))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ChatError::Provider {
                provider: Provider::OpenAI,
                message: format!("API error {}: {}", status, text),
            });
        }

        let openai_response: OpenAIResponse = response.json().await?;
        Ok(openai_response.choices.into_iter().next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }

    fn describe(&self) -> String {
        format!("OpenAI: {}", self.model)
    }
}
