//! Language-model backends that turn a question plus assembled prompt into
//! an answer.

pub mod claude;
pub mod ollama;
pub mod openai;

use std::sync::Arc;

use async_trait::async_trait;

pub use claude::ClaudeClient;
pub use ollama::OllamaClient;
pub use openai::OpenAIClient;

use crate::config::Config;
use crate::error::Result;
use crate::provider::Provider;

/// Asks a language model to answer `question` under the instructions and
/// context in `context`.
///
/// Failures are returned, never swallowed; the dispatcher turns them into
/// `Error: ` chat entries.
#[async_trait]
pub trait AnswerRequester: Send + Sync {
    async fn ask(&self, question: &str, context: &str) -> Result<String>;

    /// Short label for the chat header, e.g. `OpenAI: gpt-4o-mini`.
    fn describe(&self) -> String;
}

/// Build the answer requester for the configured provider.
///
/// A missing API key is not an error here: the client is still built and
/// every question gets an `Error: ` answer explaining what to set.
pub fn from_config(config: &Config) -> Arc<dyn AnswerRequester> {
    let provider = config.provider();
    let model = config.model();
    let temperature = config.temperature();

    match provider {
        Provider::OpenAI => Arc::new(OpenAIClient::new(
            config.api_key(provider),
            &model,
            temperature,
        )),
        Provider::Claude => Arc::new(ClaudeClient::new(
            config.api_key(provider),
            &model,
            temperature,
        )),
        Provider::Ollama => Arc::new(OllamaClient::new(&config.ollama_url(), &model, temperature)),
    }
}

/// List models the provider offers (fetched for Ollama, fixed otherwise).
pub async fn list_models(config: &Config) -> Result<Vec<String>> {
    match config.provider() {
        Provider::OpenAI => Ok(OpenAIClient::list_models()),
        Provider::Claude => Ok(ClaudeClient::list_models()),
        Provider::Ollama => {
            OllamaClient::new(&config.ollama_url(), &config.model(), config.temperature())
                .list_models()
                .await
        }
    }
}
