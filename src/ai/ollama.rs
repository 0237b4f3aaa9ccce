use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::AnswerRequester;
use crate::error::{ChatError, Result};
use crate::provider::Provider;

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    system: String,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
}

#[derive(Deserialize)]
struct OllamaModel {
    name: String,
}

#[derive(Deserialize)]
struct OllamaModelsResponse {
    models: Vec<OllamaModel>,
}

#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    temperature: f32,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str, temperature: f32) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            temperature,
        }
    }

    fn request(&self, question: &str, context: &str) -> OllamaRequest {
        OllamaRequest {
            model: self.model.clone(),
            prompt: question.to_string(),
            system: context.to_string(),
            stream: false,
            options: OllamaOptions {
                temperature: self.temperature,
            },
        }
    }

    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(ChatError::Provider {
                provider: Provider::Ollama,
                message: format!("Failed to list models: {}", response.status()),
            });
        }

        let models_response: OllamaModelsResponse = response.json().await?;
        Ok(models_response
            .models
            .into_iter()
            .map(|model| model.name)
            .collect())
    }
}

#[async_trait]
impl AnswerRequester for OllamaClient {
    async fn ask(&self, question: &str, context: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&self.request(question, context))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ChatError::Provider {
                provider: Provider::Ollama,
                message: format!(
                    "request failed with status: {}. Make sure Ollama is running with: ollama serve",
                    response.status()
                ),
            });
        }

        let ollama_response: OllamaResponse = response.json().await?;
        Ok(ollama_response.response)
    }

    fn describe(&self) -> String {
        format!("Ollama: {}", self.model)
    }
}
